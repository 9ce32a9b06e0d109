//! Capture/replay cache
//!
//! First call per descriptor type: the declarative subsystem materializes
//! its query inside a capture scope, the `CaptureSink` records the
//! outgoing command and short-circuits execution, and a reusable template
//! is compiled that binds each synthesized parameter to a descriptor
//! field. Later calls replay the template against the new instance's
//! fields and never touch the declarative subsystem.

use crate::descriptor::{CommandSink, CorrelationId};
use dashmap::DashMap;
use indexmap::IndexMap;
use regex::Regex;
use sqlmux_core::{ParameterMeta, QueryParameter, QueryResult, Result, SqlmuxError, Value};
use std::any::TypeId;
use std::sync::{Arc, LazyLock};

/// A captured about-to-execute command: SQL plus a parameter snapshot.
/// Single-use; the inserting call removes it before returning.
#[derive(Debug, Clone)]
pub(crate) struct CapturedQuery {
    pub(crate) sql: String,
    pub(crate) parameters: Vec<QueryParameter>,
}

/// Engine-owned map of in-flight captures, keyed by correlation id
#[derive(Debug, Default)]
pub(crate) struct CaptureMap {
    inner: DashMap<CorrelationId, CapturedQuery>,
}

impl CaptureMap {
    /// Remove and return the capture for `tag`, if any
    pub(crate) fn take(&self, tag: CorrelationId) -> Option<CapturedQuery> {
        self.inner.remove(&tag).map(|(_, captured)| captured)
    }

    /// Number of in-flight captures (test/diagnostic use)
    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }
}

/// `CommandSink` that records the command instead of executing it
pub(crate) struct CaptureSink<'a> {
    captures: &'a CaptureMap,
}

impl<'a> CaptureSink<'a> {
    pub(crate) fn new(captures: &'a CaptureMap) -> Self {
        Self { captures }
    }
}

impl CommandSink for CaptureSink<'_> {
    fn execute(
        &self,
        tag: CorrelationId,
        sql: &str,
        parameters: &[QueryParameter],
    ) -> Result<QueryResult> {
        tracing::trace!(%tag, parameters = parameters.len(), "captured outgoing command");
        self.captures.inner.insert(
            tag,
            CapturedQuery {
                sql: sql.to_string(),
                parameters: parameters.to_vec(),
            },
        );
        Ok(QueryResult::empty())
    }
}

/// Binds one synthesized parameter to one descriptor field
#[derive(Debug, Clone)]
pub struct ParameterBinding {
    /// Synthesized parameter name as captured
    pub parameter: String,
    /// Resolved descriptor field name
    pub field: String,
    /// Pre-resolved index into the descriptor's stable field list
    pub(crate) field_index: usize,
    /// Type metadata carried over from the captured parameter
    pub meta: Option<ParameterMeta>,
}

/// The reusable template for one descriptor type: fixed SQL plus field
/// bindings that refresh parameter values from a new instance.
#[derive(Debug)]
pub struct CompiledTemplate {
    sql: String,
    bindings: Vec<ParameterBinding>,
}

impl CompiledTemplate {
    /// The cached SQL, byte-identical to the originally captured SQL
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The field bindings in captured parameter order
    pub fn bindings(&self) -> &[ParameterBinding] {
        &self.bindings
    }

    /// Build fresh parameter values from a new instance's fields.
    ///
    /// Bindings access fields by their pre-resolved index; a descriptor
    /// whose field list changed shape since compilation is a contract
    /// violation surfaced as a configuration error.
    pub(crate) fn replay(&self, fields: &IndexMap<String, Value>) -> Result<Vec<QueryParameter>> {
        self.bindings
            .iter()
            .map(|binding| {
                let (name, value) = fields.get_index(binding.field_index).ok_or_else(|| {
                    SqlmuxError::Configuration(format!(
                        "descriptor no longer exposes field index {} bound to parameter {}",
                        binding.field_index, binding.parameter
                    ))
                })?;
                if name != &binding.field {
                    return Err(SqlmuxError::Configuration(format!(
                        "descriptor field order changed: expected {} at index {}, found {}",
                        binding.field, binding.field_index, name
                    )));
                }
                Ok(QueryParameter {
                    name: binding.parameter.clone(),
                    value: value.clone(),
                    meta: binding.meta,
                })
            })
            .collect()
    }
}

/// Template cache keyed by descriptor type.
///
/// A present `None` marks the type permanently non-cacheable (until the
/// cache is cleared). The cache stores whichever query shape was captured
/// first for a type; a declarative query whose structure varies with
/// instance state is replayed through that first-seen shape.
#[derive(Debug, Default)]
pub(crate) struct TemplateCache {
    inner: DashMap<TypeId, Option<Arc<CompiledTemplate>>>,
}

impl TemplateCache {
    /// Current entry for a type: `None` = uncompiled, `Some(None)` =
    /// non-cacheable, `Some(Some(_))` = compiled
    pub(crate) fn get(&self, type_id: TypeId) -> Option<Option<Arc<CompiledTemplate>>> {
        self.inner.get(&type_id).map(|entry| entry.value().clone())
    }

    /// First-writer-wins insertion; a redundant concurrent compile's
    /// result is discarded, never merged
    pub(crate) fn insert_if_absent(
        &self,
        type_id: TypeId,
        template: Option<Arc<CompiledTemplate>>,
    ) {
        self.inner.entry(type_id).or_insert(template);
    }

    pub(crate) fn clear(&self) {
        self.inner.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether a compiled template is stored for the type
    pub(crate) fn has_template(&self, type_id: TypeId) -> bool {
        matches!(self.get(type_id), Some(Some(_)))
    }

    /// False only when the type is marked non-cacheable
    pub(crate) fn is_cacheable(&self, type_id: TypeId) -> bool {
        !matches!(self.get(type_id), Some(None))
    }
}

// Synthesized parameter names embed the source field name between a
// marker and an ordinal: marker + "__" + field + "_" + ordinal.
static SYNTHESIZED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*?__(?<stem>.+)_(?<ordinal>\d+)$").expect("valid regex"));

/// Placeholder stem some subsystems synthesize when no field name is known
const GENERIC_PLACEHOLDER: &str = "p";

/// Extract the embedded field-name stem from a synthesized parameter name
fn parse_synthesized_name(name: &str) -> Option<&str> {
    let captures = SYNTHESIZED_NAME.captures(name)?;
    let stem = captures.name("stem")?;
    let stem = &name[stem.range()];
    if stem.eq_ignore_ascii_case(GENERIC_PLACEHOLDER) {
        None
    } else {
        Some(stem)
    }
}

/// Compile a template binding every captured parameter to a distinct
/// descriptor field, or `None` when any parameter cannot be resolved
/// unambiguously (the type is then marked non-cacheable).
pub(crate) fn compile_template(
    captured: &CapturedQuery,
    fields: &IndexMap<String, Value>,
) -> Option<CompiledTemplate> {
    let mut claimed = vec![false; fields.len()];
    let mut bindings = Vec::with_capacity(captured.parameters.len());

    for parameter in &captured.parameters {
        let index = resolve_field(&parameter.name, &parameter.value, fields, &claimed)?;
        claimed[index] = true;
        let (field, _) = fields.get_index(index).expect("resolved index in range");
        bindings.push(ParameterBinding {
            parameter: parameter.name.clone(),
            field: field.clone(),
            field_index: index,
            meta: parameter.meta,
        });
    }

    Some(CompiledTemplate {
        sql: captured.sql.clone(),
        bindings,
    })
}

/// Resolve one captured parameter to an unclaimed field: name inference
/// first (exact, then unique substring), value inference as fallback.
fn resolve_field(
    name: &str,
    value: &Value,
    fields: &IndexMap<String, Value>,
    claimed: &[bool],
) -> Option<usize> {
    let unclaimed = || {
        fields
            .iter()
            .enumerate()
            .filter(|(index, _)| !claimed[*index])
    };

    if let Some(stem) = parse_synthesized_name(name) {
        if let Some((index, _)) = unclaimed().find(|(_, (field, _))| field.eq_ignore_ascii_case(stem))
        {
            return Some(index);
        }

        let stem_lower = stem.to_ascii_lowercase();
        let substring_matches: Vec<usize> = unclaimed()
            .filter(|(_, (field, _))| {
                let field_lower = field.to_ascii_lowercase();
                stem_lower.contains(&field_lower) || field_lower.contains(&stem_lower)
            })
            .map(|(index, _)| index)
            .collect();
        if let [index] = substring_matches[..] {
            return Some(index);
        }
    }

    let value_matches: Vec<usize> = unclaimed()
        .filter(|(_, (_, field_value))| field_value.loosely_equals(value))
        .map(|(index, _)| index)
        .collect();
    match value_matches[..] {
        [index] => Some(index),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fields(entries: &[(&str, Value)]) -> IndexMap<String, Value> {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn captured(sql: &str, parameters: Vec<QueryParameter>) -> CapturedQuery {
        CapturedQuery {
            sql: sql.to_string(),
            parameters,
        }
    }

    mod synthesized_name_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_parses_marker_stem_ordinal() {
            assert_eq!(parse_synthesized_name("__id_0"), Some("id"));
            assert_eq!(parse_synthesized_name("ef__user_id_12"), Some("user_id"));
        }

        #[test]
        fn test_ignores_generic_placeholder() {
            assert_eq!(parse_synthesized_name("__p_0"), None);
            assert_eq!(parse_synthesized_name("__P_3"), None);
        }

        #[test]
        fn test_rejects_unsynthesized_names() {
            assert_eq!(parse_synthesized_name("id"), None);
            assert_eq!(parse_synthesized_name("user_id"), None);
        }
    }

    mod compile_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_name_inference_exact() {
            let captured = captured(
                "SELECT * FROM users WHERE id = @__Id_0",
                vec![QueryParameter::new("__Id_0", 5i64)],
            );
            let fields = fields(&[("id", Value::Int64(5)), ("limit", Value::Int64(10))]);

            let template = compile_template(&captured, &fields).unwrap();

            assert_eq!(template.bindings().len(), 1);
            assert_eq!(template.bindings()[0].field, "id");
            assert_eq!(template.bindings()[0].field_index, 0);
        }

        #[test]
        fn test_name_inference_substring() {
            let captured = captured(
                "SELECT 1",
                vec![QueryParameter::new("__request_user_id_0", 5i64)],
            );
            let fields = fields(&[("user_id", Value::Int64(99)), ("flag", Value::Bool(true))]);

            let template = compile_template(&captured, &fields).unwrap();

            assert_eq!(template.bindings()[0].field, "user_id");
        }

        #[test]
        fn test_value_inference_fallback() {
            // Generic placeholder names carry no field hint.
            let captured = captured("SELECT 1", vec![QueryParameter::new("__p_0", 42i64)]);
            let fields = fields(&[("a", Value::Int64(7)), ("b", Value::Int64(42))]);

            let template = compile_template(&captured, &fields).unwrap();

            assert_eq!(template.bindings()[0].field, "b");
            assert_eq!(template.bindings()[0].field_index, 1);
        }

        #[test]
        fn test_value_inference_tolerates_width() {
            let captured = captured("SELECT 1", vec![QueryParameter::new("__p_0", 42i64)]);
            let fields = fields(&[("a", Value::Int32(42))]);

            let template = compile_template(&captured, &fields).unwrap();

            assert_eq!(template.bindings()[0].field, "a");
        }

        #[test]
        fn test_ambiguous_value_aborts() {
            let captured = captured("SELECT 1", vec![QueryParameter::new("__p_0", 42i64)]);
            let fields = fields(&[("a", Value::Int64(42)), ("b", Value::Int64(42))]);

            assert!(compile_template(&captured, &fields).is_none());
        }

        #[test]
        fn test_unresolvable_parameter_aborts() {
            let captured = captured("SELECT 1", vec![QueryParameter::new("__p_0", 42i64)]);
            let fields = fields(&[("a", Value::Int64(7))]);

            assert!(compile_template(&captured, &fields).is_none());
        }

        #[test]
        fn test_field_claimed_once() {
            // Two parameters with the same value: the second cannot claim
            // the already-claimed field, and aborts compilation.
            let captured = captured(
                "SELECT 1",
                vec![
                    QueryParameter::new("__p_0", 1i64),
                    QueryParameter::new("__p_1", 1i64),
                ],
            );
            let fields = fields(&[("a", Value::Int64(1))]);

            assert!(compile_template(&captured, &fields).is_none());
        }

        #[test]
        fn test_two_same_valued_fields_resolved_by_name() {
            // Name inference claims the right fields even when value
            // inference alone would be ambiguous.
            let captured = captured(
                "SELECT 1",
                vec![
                    QueryParameter::new("__from_id_0", 1i64),
                    QueryParameter::new("__to_id_1", 1i64),
                ],
            );
            let fields = fields(&[("from_id", Value::Int64(1)), ("to_id", Value::Int64(1))]);

            let template = compile_template(&captured, &fields).unwrap();

            assert_eq!(template.bindings()[0].field, "from_id");
            assert_eq!(template.bindings()[1].field, "to_id");
        }

        #[test]
        fn test_parameterless_template() {
            let captured = captured("SELECT count(*) FROM logs", vec![]);
            let template = compile_template(&captured, &fields(&[])).unwrap();

            assert!(template.bindings().is_empty());
            assert_eq!(template.sql(), "SELECT count(*) FROM logs");
        }
    }

    mod replay_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_replay_refreshes_values() {
            let captured = captured(
                "SELECT * FROM users WHERE id = @__id_0",
                vec![QueryParameter::new("__id_0", 1i64)],
            );
            let first = fields(&[("id", Value::Int64(1))]);
            let template = compile_template(&captured, &first).unwrap();

            let second = fields(&[("id", Value::Int64(2))]);
            let parameters = template.replay(&second).unwrap();

            assert_eq!(parameters.len(), 1);
            assert_eq!(parameters[0].name, "__id_0");
            assert_eq!(parameters[0].value, Value::Int64(2));
        }

        #[test]
        fn test_replay_rejects_reordered_fields() {
            let captured = captured("SELECT 1", vec![QueryParameter::new("__id_0", 1i64)]);
            let first = fields(&[("id", Value::Int64(1)), ("x", Value::Int64(9))]);
            let template = compile_template(&captured, &first).unwrap();

            let reordered = fields(&[("x", Value::Int64(9)), ("id", Value::Int64(1))]);
            let err = template.replay(&reordered).unwrap_err();

            assert!(matches!(err, SqlmuxError::Configuration(_)));
        }
    }

    mod cache_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_first_writer_wins() {
            let cache = TemplateCache::default();
            let type_id = TypeId::of::<u32>();
            let first = Arc::new(CompiledTemplate {
                sql: "SELECT 1".to_string(),
                bindings: vec![],
            });

            cache.insert_if_absent(type_id, Some(first.clone()));
            cache.insert_if_absent(
                type_id,
                Some(Arc::new(CompiledTemplate {
                    sql: "SELECT 2".to_string(),
                    bindings: vec![],
                })),
            );

            let stored = cache.get(type_id).unwrap().unwrap();
            assert_eq!(stored.sql(), "SELECT 1");
            assert_eq!(cache.len(), 1);
        }

        #[test]
        fn test_non_cacheable_marker() {
            let cache = TemplateCache::default();
            let type_id = TypeId::of::<u32>();

            assert!(cache.is_cacheable(type_id));
            cache.insert_if_absent(type_id, None);
            assert!(!cache.is_cacheable(type_id));
            assert!(!cache.has_template(type_id));

            cache.clear();
            assert!(cache.is_cacheable(type_id));
        }

        #[test]
        fn test_capture_map_take_is_single_use() {
            let map = CaptureMap::default();
            let sink = CaptureSink::new(&map);
            let tag = CorrelationId::fresh();

            sink.execute(tag, "SELECT 1", &[]).unwrap();
            assert_eq!(map.len(), 1);

            let first = map.take(tag);
            assert!(first.is_some());
            assert!(map.take(tag).is_none());
            assert_eq!(map.len(), 0);
        }
    }
}
