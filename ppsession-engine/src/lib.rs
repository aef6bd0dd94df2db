//! ppsession engine - session negotiation state machine and candidate exchange.
//!
//! A [`Session`] is sans-IO: local operations and inbound stanzas mutate it,
//! and everything it wants to say comes back out as [`SessionEvent`]s. The
//! [`SessionManager`] owns many sessions and the [`driver`] runs a manager on
//! a tokio task.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ppsession_core::{ContentInfo, SessionDescription};
//! use ppsession_engine::{driver, MemoryTransportFactory, SessionConfig, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = SessionManager::new(
//!         SessionConfig::with_local_name("alice@example.net"),
//!         Arc::new(MemoryTransportFactory::new()),
//!     );
//!     let (handle, mut events, _task) = driver::spawn(manager);
//!
//!     let sid = handle.create_session("bob@example.net").await?;
//!     let offer = SessionDescription::default()
//!         .with_content(ContentInfo::new("audio", "urn:xmpp:jingle:apps:rtp:1"));
//!     handle.initiate(&sid, offer).await?;
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{}: {:?}", event.session_id, event.signal);
//!     }
//!     Ok(())
//! }
//! ```

mod candidates;
mod dispatch;

pub mod config;
pub mod driver;
pub mod manager;
pub mod memory;
pub mod queue;
pub mod session;
pub mod signal;
pub mod transport;

pub use config::SessionConfig;
pub use driver::{Command, DriverHandle};
pub use manager::SessionManager;
pub use memory::{MemoryTransport, MemoryTransportFactory};
pub use queue::TaskQueue;
pub use session::Session;
pub use signal::{SessionEvent, SessionSignal};
pub use transport::{ProxyRegistry, Transport, TransportFactory, TransportNotice, TransportProxy};
