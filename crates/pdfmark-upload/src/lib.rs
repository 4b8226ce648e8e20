//! HTTP transport for pdfmark
//!
//! Implements the core's `DocumentSource` and `PersistenceGateway` over
//! reqwest, and installs a tracing subscriber for host applications.

pub mod client;
pub mod telemetry;

pub use client::{HttpGateway, HttpSource};
pub use telemetry::{init_tracing, LogFormat};
