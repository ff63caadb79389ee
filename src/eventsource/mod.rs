//! Server-sent event stream client.
//!
//! This module provides [`Client`], which consumes an event stream and hands
//! every message to a user-supplied handler.
//!
//! # Architecture
//!
//! Two cooperating parts, each running as its own task:
//!
//! - [`SequentialProcessor`]: owns the message queue and the single in-flight
//!   handler invocation. A message is not handed to the handler until the
//!   previous invocation, including its `.await`s, has finished.
//! - The connection controller (internal): owns the transport, the
//!   [`ConnectionStatus`](crate::types::ConnectionStatus) state machine and
//!   reconnection. Transport notifications, commands from `Client` handles and
//!   reconnect timers are handled strictly one at a time.
//!
//! ```text
//! CLOSED      --connect()-->       CONNECTING
//! CONNECTING  --transport open-->  OPEN
//! CONNECTING  --transport error--> CLOSED (then maybe scheduled reconnect -> CONNECTING)
//! OPEN        --transport error--> CLOSED (then maybe scheduled reconnect -> CONNECTING)
//! OPEN        --close()-->         CLOSED
//! CONNECTING  --close()-->         CLOSED
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use sse_connector_rs::config::{ClientOptions, ReconnectPolicy};
//! use sse_connector_rs::eventsource::Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = ClientOptions::new()
//!         .status_observer(|status| println!("Status: {}", status))
//!         .reconnect(ReconnectPolicy::new(5, Duration::from_secs(2)));
//!
//!     let client = Client::new("http://localhost:8080/events", options)
//!         .expect("Failed to create client");
//!
//!     // Slow handlers are fine: the next message waits for this one.
//!     client.on(|message| async move {
//!         tokio::time::sleep(Duration::from_millis(100)).await;
//!         println!("Received: {}", message.data);
//!     });
//!     client.catch(|error| eprintln!("Stream error: {}", error));
//!
//!     client.connect().await.expect("Client shut down");
//!
//!     tokio::signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
//!     client.close().await.expect("Client shut down");
//! }
//! ```
//!
//! # Reconnection Behavior
//!
//! With a [`ReconnectPolicy`](crate::config::ReconnectPolicy):
//!
//! - Every transport error closes the connection, then schedules one reconnect
//!   after `delay` while fewer than `max_attempts` have been used.
//! - Reaching OPEN resets the attempt counter to 0.
//! - Once the budget is spent the client stays CLOSED until `connect()` is
//!   called again.
//! - An explicit `connect()` or `close()` supersedes a pending reconnect.
//!
//! # Handler Faults
//!
//! A panic in the message handler, the error handler or the status observer is
//! caught, logged, and passed to the optional fault observer. Later messages are
//! still delivered.

pub mod client;
pub mod processor;
mod reconnect;

// Re-export for easier access
pub use client::{Client, ErrorHandler};
pub use processor::{MessageHandler, SequentialProcessor};
