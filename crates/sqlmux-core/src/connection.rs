//! Connection and script execution traits
//!
//! The database itself is an external collaborator: drivers implement
//! these traits, the batching layer only consumes them. A `Connection`
//! (or a caller-managed `Transaction`) accepts one multi-statement script
//! with a merged parameter set and yields its result sets in submission
//! order through a `ScriptReader`.

use crate::{QueryParameter, QueryResult, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Options passed through to the script executor
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Optional timeout for the whole script; the driver enforces it,
    /// there is no internal retry
    pub timeout: Option<Duration>,
    /// Cooperative cancellation, checked between result sets
    pub cancellation: Option<CancellationToken>,
}

impl ExecuteOptions {
    /// Create options with no timeout and no cancellation
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the script timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

/// Reader over the ordered result sets of one executed script.
///
/// Each `next_result` call advances to the next result set and buffers it
/// fully. `None` means the script produced no further result sets.
#[async_trait]
pub trait ScriptReader: Send {
    /// Advance to the next result set
    async fn next_result(&mut self) -> Result<Option<QueryResult>>;
}

/// A database connection owned by the caller
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite", "postgresql", "mysql")
    fn driver_name(&self) -> &str;

    /// Open the connection
    async fn open(&self) -> Result<()>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;

    /// Execute a multi-statement script with a merged parameter set,
    /// returning a reader over its result sets in submission order
    async fn execute_script(
        &self,
        script: &str,
        parameters: &[QueryParameter],
        options: &ExecuteOptions,
    ) -> Result<Box<dyn ScriptReader>>;
}

/// A database transaction owned and finished by the caller.
///
/// The batching layer only executes through it; commit and rollback stay
/// with whoever began the transaction.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Execute a multi-statement script within the transaction
    async fn execute_script(
        &self,
        script: &str,
        parameters: &[QueryParameter],
        options: &ExecuteOptions,
    ) -> Result<Box<dyn ScriptReader>>;
}

/// The caller-supplied execution target for one batch
#[derive(Clone, Copy)]
pub enum ExecutionTarget<'a> {
    /// A plain connection; the batch opens it if closed and restores that state
    Connection(&'a dyn Connection),
    /// A caller-managed transaction; connection lifetime is entirely the caller's
    Transaction(&'a dyn Transaction),
}

impl<'a> From<&'a dyn Connection> for ExecutionTarget<'a> {
    fn from(conn: &'a dyn Connection) -> Self {
        ExecutionTarget::Connection(conn)
    }
}

impl<'a> From<&'a dyn Transaction> for ExecutionTarget<'a> {
    fn from(tx: &'a dyn Transaction) -> Self {
        ExecutionTarget::Transaction(tx)
    }
}

impl ExecutionTarget<'_> {
    /// Execute a script against whichever target the caller supplied
    pub async fn execute_script(
        &self,
        script: &str,
        parameters: &[QueryParameter],
        options: &ExecuteOptions,
    ) -> Result<Box<dyn ScriptReader>> {
        match self {
            ExecutionTarget::Connection(conn) => {
                conn.execute_script(script, parameters, options).await
            }
            ExecutionTarget::Transaction(tx) => {
                tx.execute_script(script, parameters, options).await
            }
        }
    }
}
