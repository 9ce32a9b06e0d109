//! sqlmux-core - Shared abstractions for the sqlmux batching stack
//!
//! This crate provides the types and traits the batching crates depend on:
//!
//! - `Connection` / `Transaction` - Traits for the caller-owned execution target
//! - `ScriptReader` - Trait for reading ordered result sets from one script
//! - Common types like `Value`, `Row`, `QueryResult`, `QueryParameter`

mod connection;
mod error;
mod types;

pub use connection::*;
pub use error::*;
pub use types::*;
