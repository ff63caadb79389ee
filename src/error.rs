use thiserror::Error;
use url::ParseError;

pub type Result<T, E = ConnectorError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Invalid Configuration: {0}")]
    InvalidConfig(String),

    #[error("Environment Variable Error: '{name}' {reason}")]
    EnvVarError { name: String, reason: String },

    #[error("Client Shut Down: the connection controller is no longer running")]
    ClientShutDown,

    #[error("HTTP Request Error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON Serialization/Deserialization Error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("URL Parsing Error: {0}")]
    UrlParseError(#[from] ParseError),

    #[error("Invalid HTTP Header: {0}")]
    InvalidHeader(String),
}
