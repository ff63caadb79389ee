// demos/listen.rs
use sse_connector_rs::config::ClientConfig;
use sse_connector_rs::types::MessageEvent;
use sse_connector_rs::Client;

fn init_logging() {
    if std::env::var("SSE_TRACING").map(|v| v == "1").unwrap_or(false) {
        // tracing-subscriber also installs a bridge for `log` records
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    } else {
        env_logger::init();
    }
}

#[tokio::main]
async fn main() {
    // Optional: Load .env file if you have one
    dotenv::dotenv().ok();
    init_logging();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            eprintln!(
                "Set SSE_URL (and optionally SSE_RECONNECT_MAX_ATTEMPTS, SSE_RECONNECT_DELAY_MS)."
            );
            return;
        }
    };

    let options = config
        .options()
        .status_observer(|status| println!("Status: {}", status))
        .fault_observer(|fault| {
            eprintln!("Handler fault in {:?}: {}", fault.source, fault.message)
        });

    let client = match Client::new(&config.url, options) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to create client: {}", e);
            return;
        }
    };

    client.on(|message: MessageEvent| async move {
        match &message.parsed {
            Some(json) => println!("[{}] {}", message.event, json),
            None => println!("[{}] {}", message.event, message.data),
        }
    });
    client.catch(|error| eprintln!("Stream error: {}", error));

    println!("Connecting to {}...", client.url());
    if let Err(e) = client.connect().await {
        eprintln!("Failed to connect: {}", e);
        return;
    }

    println!("Listening until Ctrl-C...");
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Failed to listen for Ctrl-C: {}", e);
    }

    println!("Closing...");
    if let Err(e) = client.close().await {
        eprintln!("Error closing client: {}", e);
    }
    if let Err(e) = client.wait_idle().await {
        eprintln!("Error draining messages: {}", e);
    }
    println!("Finished.");
}
