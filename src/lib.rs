//! # LiteKV - A Miniature In-Memory Key-Value Server
//!
//! LiteKV speaks a Redis-like wire protocol over TCP. Clients send encoded
//! command arrays; the server runs them against an in-memory store with
//! per-key expiry and replies with one encoded value per request.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              LiteKV                              │
//! │                                                                  │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────────┐  │
//! │  │ TCP Server  │───>│ Connection  │───>│ Mutex<Command        │  │
//! │  │ (Listener)  │    │ (per task)  │    │       Processor>     │  │
//! │  └─────────────┘    └─────────────┘    └──────────┬───────────┘  │
//! │                                                   │              │
//! │         ┌─────────────────┬───────────────────────┼──────────┐   │
//! │         ▼                 ▼                       ▼          │   │
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐    │   │
//! │  │  Protocol   │   │    Store    │   │ Persistence /    │    │   │
//! │  │  codec      │   │ data+expiry │   │ Host introspect. │    │   │
//! │  └─────────────┘   └─────────────┘   └──────────────────┘    │   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value [EX s] [PX ms] [EXAT unix-s] [PXAT unix-ms]`
//! - `GET key`, `EXISTS key`, `DEL key [key ...]`
//! - `INCR key`, `DECR key`
//! - `LPUSH key value [value ...]`, `RPUSH key value [value ...]`
//! - `INFO`, `SAVE`, `LOAD`, `COMMAND <probe>`
//!
//! ## Design Highlights
//!
//! ### One Lock per Request
//!
//! Every request holds the processor lock from decode to encode. Two clients'
//! requests never interleave, which caps throughput at one request at a time.
//! `SAVE` and `LOAD` do their file I/O under the same lock, so all other
//! clients wait while a snapshot is written or read.
//!
//! ### Lazy Expiry
//!
//! Expired keys are removed only when `GET` touches them. `EXISTS`, `INCR`,
//! `DECR` and the list pushes see a key until then.
//!
//! ## Quick Start
//!
//! ```no_run
//! use litekv::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::bind(&Config::default()).await?;
//!     server
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod config;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::{CommandProcessor, HostIntrospection, ProcessHost};
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats, SharedProcessor};
pub use persistence::{FileSnapshot, PersistError, Persistence};
pub use protocol::{DecodeError, Value};
pub use server::Server;
pub use storage::{Store, StoredValue};

/// The default port LiteKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host LiteKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Snapshot file used when none is given
pub const DEFAULT_SNAPSHOT_PATH: &str = "data.bin";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
