//! sqlmux - Multi-query batching over one database round trip
//!
//! Batches several independently declared queries - raw parameterized SQL
//! or declarative (ORM-style) queries - into a single multi-statement
//! script with a merged, collision-free parameter set, executes it in one
//! round trip, and hands each query's result set back separately and
//! strongly typed.
//!
//! The moving parts:
//!
//! - `QueryDescriptor` - a user-defined value representing one query,
//!   either `Direct` SQL or a `Declarative` query materialized by an
//!   external subsystem
//! - `BatchEngine` - owns the capture/replay template cache; declarative
//!   descriptors pay the declarative-compilation cost once per type and
//!   are replayed from a compiled template afterwards
//! - `Batch` - fluent `add(..)*` registration, then `execute(..)` against
//!   a caller-supplied connection or transaction
//! - `BatchResults` - typed, positional, descriptor-keyed and sequential
//!   access to the ordered result sets
//!
//! ```no_run
//! # use sqlmux::{BatchEngine, FromRow, Parameters, QueryDefinition, QueryDescriptor, QuerySource};
//! # use sqlmux_core::{Connection, Result, Row, Value};
//! # use indexmap::IndexMap;
//! struct UserById { id: i64 }
//!
//! impl QueryDescriptor for UserById {
//!     fn source(&self) -> QuerySource<'_> {
//!         QuerySource::Direct(QueryDefinition::new(
//!             "SELECT id, name FROM users WHERE id = @id",
//!             Parameters::Fields(IndexMap::from([
//!                 ("id".to_string(), Value::Int64(self.id)),
//!             ])),
//!         ))
//!     }
//! }
//!
//! # struct User;
//! # impl FromRow for User {
//! #     fn from_row(_: &Row) -> Result<Self> { Ok(User) }
//! # }
//! # async fn run(conn: &dyn Connection) -> Result<()> {
//! let engine = BatchEngine::new();
//! let results = engine
//!     .batch()
//!     .add::<User, _>(UserById { id: 1 })
//!     .add::<User, _>(UserById { id: 2 })
//!     .execute(conn)
//!     .await?;
//!
//! let first: User = results.next::<User>()?.single()?;
//! let second: User = results.next::<User>()?.single()?;
//! # Ok(())
//! # }
//! ```

mod capture;
mod compiler;
mod descriptor;
mod engine;
mod results;

pub use capture::{CompiledTemplate, ParameterBinding};
pub use compiler::SqlBatch;
pub use descriptor::{
    CommandSink, CorrelationId, DeclarativeQuery, Parameters, QueryDefinition, QueryDescriptor,
    QuerySource,
};
pub use engine::{Batch, BatchEngine};
pub use results::{BatchResults, FromRow, TypedRows};
