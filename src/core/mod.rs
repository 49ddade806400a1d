//! Core types of the request lifecycle.
//!
//! - [`Request`] - incoming request with a buffered body
//! - [`ResponseWriter`] - write-once headers, status and byte tracking
//! - [`Context`] - per-request carrier threaded through the handler chain
//! - [`ContextPool`] - lock-free pool the engine draws contexts from
//!
//! # Example
//!
//! ```rust,ignore
//! use kumi::core::Context;
//!
//! async fn hello(ctx: &mut Context) {
//!     let name = ctx.param("name").unwrap_or("world").to_owned();
//!     ctx.header_mut().insert("x-greeting", "1".parse().unwrap());
//!     let _ = ctx.write_str(&format!("hello {name}"));
//! }
//! ```

mod context;
mod pool;
mod request;
mod writer;

pub use context::{Context, Params, Query};
pub use pool::{ContextPool, DEFAULT_POOL_CAPACITY};
pub use request::{Request, X_REQUEST_ID};
pub use writer::ResponseWriter;

pub(crate) use writer::header_values;
