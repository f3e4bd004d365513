//! Asynchronous HTTP/1.1 client-server building blocks centered on a
//! forward proxy: a session/timeout engine, a relay engine that rewrites
//! only what RFC 7230 requires of an intermediary, and a tunnel dispatcher
//! that routes CONNECT and absolute-form requests.
//!
//! Ported from `cmazakas/foxy` (Boost.Asio/Beast, C++) to the `tokio`
//! ecosystem. Module layout:
//!
//! - [`uri`] — RFC 3986 URI grammar and percent-encoding.
//! - [`fields`] — hop-by-hop header handling and `Via` loop detection.
//! - [`stream`] — plain/TLS stream erasure.
//! - [`session`] — per-operation timeouts, connect/accept, graceful
//!   shutdown.
//! - [`message`] — HTTP/1.1 header parsing and serialization.
//! - [`relay`] — forwards one message between two sessions.
//! - [`tunnel`] — classifies a request-target and dispatches it.
//! - [`listener`] — accepts connections and spawns dispatchers.

pub mod error;
pub mod fields;
pub mod listener;
pub mod message;
pub mod relay;
pub mod session;
pub mod stream;
pub mod tunnel;
pub mod uri;

pub use error::{Error, Result};
pub use listener::{Listener, ListenerOptions, ListenerShutdown};
pub use session::{Session, SessionOptions};
