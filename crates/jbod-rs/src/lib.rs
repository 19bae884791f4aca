//! Client-side JBOD block layer: address translation, LRU block cache and the
//! framed request/response protocol to a remote array server.
#![allow(clippy::cargo_common_metadata)]

pub mod cache;
pub mod client;
pub mod error;
pub mod geometry;
pub mod net;
pub mod proto;
pub mod sim;

pub use cache::{BlockCache, CacheStats};
pub use client::{ArrayClient, CacheFill, MountState};
pub use error::{ErrorKind, JbodError, Result};
pub use net::{Payload, TcpTransport, Transport};
