//! Integration tests for kumi
//!
//! Every test serves an in-process engine on an ephemeral 127.0.0.1 port
//! and talks to it over real TCP with reqwest.
//!
//! Run with: cargo test --test integration

mod helpers;

mod compression;
mod cors;
mod http_basic;
mod shutdown;
mod validation;
