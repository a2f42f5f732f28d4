//! Command Module
//!
//! Interprets decoded requests against the store.
//!
//! ```text
//! request bytes
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  decode         │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandProcessor│  dispatch on name + arity
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐      ┌──────────────────┐
//! │ Store           │      │ Persistence      │  SAVE / LOAD
//! └─────────────────┘      │ HostIntrospection│  INFO
//!                          └──────────────────┘
//! ```

pub mod handler;
pub mod info;

pub use handler::{CommandError, CommandProcessor};
pub use info::{HostIntrospection, ProcessHost, StatusReport};
