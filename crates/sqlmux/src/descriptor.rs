//! Query descriptors and the declarative-subsystem boundary
//!
//! A descriptor is a user-defined, constructor-parameterized value that
//! represents one query. It either carries raw parameterized SQL
//! (`QuerySource::Direct`) or defers to the external declarative-query
//! subsystem (`QuerySource::Declarative`), whose about-to-execute command
//! is observed through the `CommandSink` interception hook.

use indexmap::IndexMap;
use sqlmux_core::{QueryParameter, QueryResult, Result, Value};
use std::any::Any;
use std::collections::HashMap;
use uuid::Uuid;

/// Tag correlating one in-flight capture with the command it produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub(crate) fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The parameter container a query definition hands to the batch compiler.
///
/// `Fields`, `Map`, `Flat` and `None` are batchable. `Positional` and
/// `Scalar` exist so that unsupported containers fail compilation with a
/// shape-specific error instead of producing a corrupt script.
#[derive(Debug, Clone)]
pub enum Parameters {
    /// No parameters
    None,
    /// Named fields of a typed aggregate, in declaration order
    Fields(IndexMap<String, Value>),
    /// An arbitrary name-to-value dictionary
    Map(HashMap<String, Value>),
    /// Already-flat named parameters
    Flat(Vec<QueryParameter>),
    /// Positional values; not batchable
    Positional(Vec<Value>),
    /// A bare scalar; not batchable
    Scalar(Value),
}

impl Parameters {
    /// Shape name used in `UnsupportedParameterShape` errors
    pub fn shape_name(&self) -> &'static str {
        match self {
            Parameters::None => "none",
            Parameters::Fields(_) => "fields",
            Parameters::Map(_) => "map",
            Parameters::Flat(_) => "flat",
            Parameters::Positional(_) => "positional",
            Parameters::Scalar(_) => "scalar",
        }
    }
}

/// One query's SQL text and parameter container
#[derive(Debug, Clone)]
pub struct QueryDefinition {
    /// Parameterized SQL with named placeholder tokens (`@name`, `:name`, `$name`)
    pub sql: String,
    /// The parameter container
    pub parameters: Parameters,
}

impl QueryDefinition {
    /// Create a new definition
    pub fn new(sql: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            sql: sql.into(),
            parameters,
        }
    }

    /// Create a parameterless definition
    pub fn bare(sql: impl Into<String>) -> Self {
        Self::new(sql, Parameters::None)
    }
}

/// How a descriptor produces its SQL and parameters
pub enum QuerySource<'a> {
    /// Raw parameterized SQL carried by the descriptor itself
    Direct(QueryDefinition),
    /// A query materialized by the external declarative subsystem,
    /// captured or replayed by the engine
    Declarative(&'a dyn DeclarativeQuery),
}

/// A user-defined, constructor-parameterized object representing one query
pub trait QueryDescriptor: Send + Sync + 'static {
    /// How this descriptor builds its query
    fn source(&self) -> QuerySource<'_>;

    /// The descriptor's parameter fields as a name-to-value mapping.
    ///
    /// Field order must be stable across instances of the same type:
    /// compiled templates store field indices into this list and replay
    /// them against later instances. Declarative descriptors must expose
    /// every field their query depends on; direct descriptors may leave
    /// the default empty mapping.
    fn parameter_fields(&self) -> IndexMap<String, Value> {
        IndexMap::new()
    }
}

/// Interception hook through which the declarative subsystem issues its
/// about-to-execute command.
///
/// During capture the sink records the command's SQL and parameter
/// snapshot under the tag and returns an always-empty result set instead
/// of executing anything.
pub trait CommandSink {
    /// Receive the outgoing command
    fn execute(
        &self,
        tag: CorrelationId,
        sql: &str,
        parameters: &[QueryParameter],
    ) -> Result<QueryResult>;
}

/// The opaque declarative-query subsystem, as seen from the batching layer.
///
/// Implementations compile their query expression against the optional
/// caller-supplied session, then attempt to execute the resulting command
/// through `sink`, tagging it with `tag`. The subsystem's own error type
/// is unknown here, so errors cross this boundary as `anyhow::Error`; a
/// wrapped `SqlmuxError::Configuration` is recognized and propagated
/// as-is when no command was captured.
pub trait DeclarativeQuery: Send + Sync {
    /// Materialize the query and issue its command through the sink
    fn materialize(
        &self,
        session: Option<&(dyn Any + Send + Sync)>,
        tag: CorrelationId,
        sink: &dyn CommandSink,
    ) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_names() {
        assert_eq!(Parameters::None.shape_name(), "none");
        assert_eq!(Parameters::Fields(IndexMap::new()).shape_name(), "fields");
        assert_eq!(Parameters::Map(HashMap::new()).shape_name(), "map");
        assert_eq!(Parameters::Flat(vec![]).shape_name(), "flat");
        assert_eq!(Parameters::Positional(vec![]).shape_name(), "positional");
        assert_eq!(Parameters::Scalar(Value::Int64(1)).shape_name(), "scalar");
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = CorrelationId::fresh();
        let b = CorrelationId::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn test_bare_definition_has_no_parameters() {
        let definition = QueryDefinition::bare("SELECT 1");
        assert!(matches!(definition.parameters, Parameters::None));
        assert_eq!(definition.sql, "SELECT 1");
    }
}
