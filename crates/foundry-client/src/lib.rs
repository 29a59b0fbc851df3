//! # Foundry Client
//!
//! Session client for Foundry VTT servers. It speaks the cookie based join
//! handshake over HTTP and the Engine.IO v4 / Socket.IO subset Foundry uses
//! on its websocket, and multiplexes any number of outstanding document and
//! file requests over that one socket.
//!
//! ## Architecture
//!
//! ```text
//! FoundryClient (operations)
//!        ↓
//! Correlator ── PendingRegistry ◄── dispatcher (one task per socket)
//!        ↓                               ↑
//! Supervisor (single owner of the Session, reconnects on close)
//!        ↓
//! SessionNegotiator (GET/POST /join)  +  Connection (SocketConnector)
//! ```
//!
//! - [`session`]: the two-step join handshake
//! - [`connection`]: socket opening, the handshake reply, inbound routing
//! - [`supervisor`]: the active [`Session`] and the reconnection state machine
//! - [`correlator`]: ack ids, response matchers, timeouts
//! - [`credentials`]: the configured instances
//! - [`filter`]: client-side reads over the world snapshot
//!
//! ## Usage
//!
//! ```rust,no_run
//! use foundry_client::{ClientConfig, DocumentOptions, FoundryClient};
//! use serde_json::json;
//!
//! # async fn example() -> foundry_client::FoundryResult<()> {
//! let client = FoundryClient::new(ClientConfig::default())?;
//! client.connect().await?;
//!
//! let world = client.world(&["actors", "items"]).await?;
//! println!("world: {}", world.get("title").unwrap_or(&json!(null)));
//!
//! let ack = client
//!     .modify_document("Actor", "abc123", vec![json!({"name": "Renamed"})], &DocumentOptions::default())
//!     .await?;
//! if let Some(error) = ack.get("error") {
//!     eprintln!("server rejected the update: {error}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Frame log
//!
//! Every frame sent or received is logged at `DEBUG` on the
//! [`FRAME_LOG_TARGET`] target with a `direction` field, so a subscriber can
//! route raw traffic to its own sink.

#![deny(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]

pub mod client;
pub mod clock;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod credentials;
pub mod error;
pub mod filter;
pub mod session;
pub mod supervisor;

/// `tracing` target carrying raw websocket frames.
pub const FRAME_LOG_TARGET: &str = "foundry_frames";

pub use client::operations::{BrowseRequest, DocumentOptions, UploadOutcome, UploadSource};
pub use client::{FoundryClient, FoundryClientBuilder};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::ClientConfig;
pub use connection::{SocketConnector, SocketHandle, TungsteniteConnector};
pub use credentials::{Credential, CredentialInfo, CredentialStore, Selector};
pub use error::{FoundryError, FoundryResult};
pub use filter::{DocumentLookup, DocumentQuery};
pub use session::{HttpNegotiator, SessionNegotiator};
pub use supervisor::{Session, SupervisorEvent, SupervisorState};
