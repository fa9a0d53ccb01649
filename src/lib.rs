//! cleanwk-registry: service registry for the cleanwk RPC framework
//!
//! Two halves of one small HTTP protocol:
//!
//! - **Registry**: an address table with TTL-based liveness, served over HTTP
//!   (`POST` registers, `GET` lists the alive set)
//! - **Heartbeat**: a background task that keeps one instance registered by
//!   re-posting its address on a fixed interval
//!
//! Discovery clients read the alive set with [`discovery::fetch_alive`] and
//! apply their own selection policy.

pub mod config;
pub mod discovery;
pub mod error;
pub mod heartbeat;
pub mod registry;

pub use config::Config;
pub use error::RegistryError;
pub use heartbeat::{HeartbeatHandle, HeartbeatSender, HeartbeatState, StopReason};
pub use registry::{Registry, DEFAULT_PATH, DEFAULT_TIMEOUT, SERVERS_HEADER};
