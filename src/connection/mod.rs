//! Connection Module
//!
//! Each accepted client runs in its own task. Requests from every task go
//! through one [`SharedProcessor`], locked for the whole
//! decode → execute → encode cycle of a request, so no two requests ever
//! interleave their effects on the store.
//!
//! ## Example
//!
//! ```ignore
//! let processor = Arc::new(Mutex::new(processor));
//! let stats = Arc::new(ConnectionStats::new());
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(
//!     stream,
//!     addr,
//!     Arc::clone(&processor),
//!     Arc::clone(&stats),
//!     shutdown_rx.clone(),
//! ));
//! ```

pub mod handler;

pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionStats, SharedProcessor,
};
