//! Middleware handlers.
//!
//! Middleware are ordinary [`Handler`](crate::handler::Handler)s that wrap
//! the rest of the chain: work before `ctx.next().await` runs on the way in,
//! work after it runs on the way out, innermost first.
//!
//! | Handler | Effect |
//! |---------|--------|
//! | [`Recoverer`] | catches panics, answers 500 |
//! | [`Timeout`] | bounds the downstream chain, answers 504 |
//! | [`CloseNotify`] | cancels the request token when the client goes away |
//! | [`Gzip`] | gzip-encodes bodies for clients that accept it |
//! | [`AccessLog`] | one `access` log line per request |
//!
//! Put [`Recoverer`] first so it also covers the other middleware.
//!
//! # Example
//!
//! ```rust,ignore
//! use kumi::middleware::{AccessLog, Gzip, Recoverer};
//!
//! engine
//!     .use_handler(Recoverer::new())
//!     .use_handler(AccessLog::new())
//!     .use_handler(Gzip::new(6));
//! ```

pub mod access_log;
pub mod close_notify;
pub mod compression;
pub mod recoverer;
pub mod timeout;

pub use access_log::AccessLog;
pub use close_notify::CloseNotify;
pub use compression::Gzip;
pub use recoverer::Recoverer;
pub use timeout::Timeout;
