use super::{Transport, TransportFactory, TransportSink};
use crate::error::{ConnectorError, Result};
use crate::types::{ErrorEvent, ErrorKind, MessageEvent};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use log::*;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CACHE_CONTROL};
use reqwest::Client as HttpClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;
const LAST_EVENT_ID: &str = "last-event-id";
const DEFAULT_EVENT_TYPE: &str = "message";

/// Settings shared by every [`HttpTransport`] a factory creates.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Timeout for establishing the TCP/TLS connection. The stream itself
    /// has no overall timeout.
    pub connect_timeout: Duration,
    /// Extra request headers, e.g. authorization.
    pub headers: Vec<(String, String)>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECONDS),
            headers: Vec::new(),
        }
    }
}

impl HttpTransportConfig {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ConnectorError::InvalidHeader(format!("{}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ConnectorError::InvalidHeader(format!("{}: {}", name, e)))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

/// Creates [`HttpTransport`]s sharing one HTTP client and the id of the last
/// event any of them received.
#[derive(Clone)]
pub struct HttpTransportFactory {
    http_client: HttpClient,
    headers: HeaderMap,
    last_event_id: Arc<Mutex<Option<String>>>,
}

impl HttpTransportFactory {
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let headers = config.header_map()?;
        let http_client = HttpClient::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            headers,
            last_event_id: Arc::new(Mutex::new(None)),
        })
    }

    /// Id of the most recent event that carried one, sent back to the server
    /// as `Last-Event-ID` on the next connection.
    pub fn last_event_id(&self) -> Option<String> {
        self.last_event_id.lock().clone()
    }
}

impl TransportFactory for HttpTransportFactory {
    fn create(&self, url: &Url) -> Box<dyn Transport> {
        Box::new(HttpTransport {
            url: url.clone(),
            http_client: self.http_client.clone(),
            headers: self.headers.clone(),
            last_event_id: Arc::clone(&self.last_event_id),
            reader: None,
        })
    }
}

/// One streaming `GET` request, read by a background task.
pub struct HttpTransport {
    url: Url,
    http_client: HttpClient,
    headers: HeaderMap,
    last_event_id: Arc<Mutex<Option<String>>>,
    reader: Option<JoinHandle<()>>,
}

impl Transport for HttpTransport {
    fn open(&mut self, sink: TransportSink) {
        if self.reader.is_some() {
            return;
        }

        let mut headers = self.headers.clone();
        if let Some(id) = self.last_event_id.lock().as_deref() {
            match HeaderValue::from_str(id) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static(LAST_EVENT_ID), value);
                }
                Err(e) => warn!("Skipping unusable Last-Event-ID '{}': {}", id, e),
            }
        }

        let request = self.http_client.get(self.url.clone()).headers(headers);
        let last_event_id = Arc::clone(&self.last_event_id);
        let url = self.url.clone();

        self.reader = Some(tokio::spawn(async move {
            read_stream(url, request, last_event_id, sink).await;
        }));
    }

    fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            debug!("Aborting event stream reader for {}", self.url);
            reader.abort();
        }
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn read_stream(
    url: Url,
    request: reqwest::RequestBuilder,
    last_event_id: Arc<Mutex<Option<String>>>,
    sink: TransportSink,
) {
    info!("Connecting to event stream: {}", url);
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            let _ = sink.error(ErrorEvent::new(
                ErrorKind::Connect,
                format!("Event stream connection failed: {}", e),
            ));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let _ = sink.error(ErrorEvent::new(
            ErrorKind::Status(status.as_u16()),
            format!("Event stream request failed with status {}", status),
        ));
        return;
    }

    if sink.open().is_err() {
        return;
    }

    let mut events = Box::pin(response.bytes_stream().eventsource());
    while let Some(item) = events.next().await {
        match item {
            Ok(event) => {
                trace!("Received SSE event '{}' id='{}'", event.event, event.id);
                if !event.id.is_empty() {
                    *last_event_id.lock() = Some(event.id.clone());
                }
                let event_type = if event.event.is_empty() {
                    DEFAULT_EVENT_TYPE.to_string()
                } else {
                    event.event
                };
                let message = MessageEvent::new(event.data)
                    .with_event(event_type)
                    .with_id(event.id);
                if sink.message(message).is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = sink.error(ErrorEvent::new(
                    ErrorKind::Stream,
                    format!("Event stream read error: {}", e),
                ));
                return;
            }
        }
    }

    info!("Event stream ended: {}", url);
    let _ = sink.error(ErrorEvent::new(ErrorKind::EndOfStream, "Event stream ended"));
}
