//! Batch compiler
//!
//! Merges N query definitions into one collision-free multi-statement
//! script. Every parameter token is rewritten to a position-prefixed name
//! in a single forward character scan over the SQL text; string literals
//! and comments are passed through untouched, and a token is only
//! rewritten when its full identifier matches a declared parameter, so
//! unrelated tokens sharing a suffix or prefix are never corrupted.

use crate::descriptor::{Parameters, QueryDefinition};
use sqlmux_core::{QueryParameter, Result, SqlmuxError};
use std::any::TypeId;
use std::collections::HashMap;

/// Statement separator appended after each rewritten statement
const STATEMENT_SEPARATOR: &str = ";\n";

/// Per-slot type information recorded while compiling
#[derive(Debug, Clone)]
pub struct SlotInfo {
    pub(crate) result_type: TypeId,
    pub(crate) result_name: &'static str,
    pub(crate) descriptor_type: TypeId,
    pub(crate) descriptor_name: &'static str,
}

/// A compiled multi-statement batch with its merged parameter set
#[derive(Debug, Clone, Default)]
pub struct SqlBatch {
    /// The full script, one statement per registration, in slot order
    pub script: String,
    /// Merged, collision-free named parameters
    pub parameters: Vec<QueryParameter>,
    pub(crate) slots: Vec<SlotInfo>,
}

impl SqlBatch {
    /// Number of statements in the batch
    pub fn statement_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether the batch contains no statements
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for SlotInfo {
    fn default() -> Self {
        Self {
            result_type: TypeId::of::<()>(),
            result_name: "()",
            descriptor_type: TypeId::of::<()>(),
            descriptor_name: "()",
        }
    }
}

/// Append one definition to the batch as slot `position`.
///
/// Validates the parameter container shape, renames parameters to
/// `p{position}__{name}`, rewrites the SQL tokens accordingly and records
/// the slot. Fails before any database activity on unsupported shapes.
pub(crate) fn append_statement(
    batch: &mut SqlBatch,
    position: usize,
    definition: QueryDefinition,
    slot: SlotInfo,
) -> Result<()> {
    let parameters = flatten_parameters(definition.parameters, slot.descriptor_name)?;

    let renames: HashMap<String, String> = parameters
        .iter()
        .map(|p| (p.name.clone(), format!("p{position}__{}", p.name)))
        .collect();

    let rewritten = if renames.is_empty() {
        definition.sql
    } else {
        rewrite_parameter_tokens(&definition.sql, &renames)
    };

    tracing::trace!(
        position,
        descriptor = slot.descriptor_name,
        parameters = parameters.len(),
        "appended statement to batch"
    );

    batch.script.push_str(&rewritten);
    batch.script.push_str(STATEMENT_SEPARATOR);
    for parameter in parameters {
        let name = renames
            .get(&parameter.name)
            .expect("every flattened parameter was renamed")
            .clone();
        batch.parameters.push(QueryParameter {
            name,
            value: parameter.value,
            meta: parameter.meta,
        });
    }
    batch.slots.push(slot);
    Ok(())
}

/// Normalize a parameter container into flat named parameters.
///
/// `Map` entries are sorted by name so the merged set is deterministic.
/// `Positional` and `Scalar` containers are rejected with a
/// shape-specific error.
fn flatten_parameters(parameters: Parameters, descriptor: &str) -> Result<Vec<QueryParameter>> {
    match parameters {
        Parameters::None => Ok(Vec::new()),
        Parameters::Fields(fields) => Ok(fields
            .into_iter()
            .map(|(name, value)| QueryParameter::new(name, value))
            .collect()),
        Parameters::Map(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Ok(entries
                .into_iter()
                .map(|(name, value)| QueryParameter::new(name, value))
                .collect())
        }
        Parameters::Flat(parameters) => Ok(parameters),
        unsupported @ (Parameters::Positional(_) | Parameters::Scalar(_)) => {
            Err(SqlmuxError::UnsupportedParameterShape {
                shape: unsupported.shape_name(),
                descriptor: descriptor.to_string(),
            })
        }
    }
}

/// Rewrite named parameter tokens (`@name`, `:name`, `$name`) whose
/// identifier appears in `renames`, in one forward scan.
///
/// String literals (single- or double-quoted, with doubled-quote escapes),
/// line comments and block comments are copied through verbatim. A token
/// is matched on its complete identifier, so `@id` never rewrites part of
/// `@identifier` and `@order_id` is untouched when only `id` is declared.
pub(crate) fn rewrite_parameter_tokens(sql: &str, renames: &HashMap<String, String>) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let len = chars.len();
    let mut out = String::with_capacity(sql.len() + renames.len() * 4);
    let mut i = 0;

    while i < len {
        let c = chars[i];
        let next = if i + 1 < len { Some(chars[i + 1]) } else { None };

        // Line comments
        if c == '-' && next == Some('-') {
            while i < len && chars[i] != '\n' {
                out.push(chars[i]);
                i += 1;
            }
            continue;
        }

        // Block comments
        if c == '/' && next == Some('*') {
            out.push(chars[i]);
            out.push(chars[i + 1]);
            i += 2;
            while i < len {
                if chars[i] == '*' && i + 1 < len && chars[i + 1] == '/' {
                    out.push(chars[i]);
                    out.push(chars[i + 1]);
                    i += 2;
                    break;
                }
                out.push(chars[i]);
                i += 1;
            }
            continue;
        }

        // String literals, with doubled-quote escapes
        if c == '\'' || c == '"' {
            let quote = c;
            out.push(c);
            i += 1;
            while i < len {
                out.push(chars[i]);
                if chars[i] == quote {
                    if i + 1 < len && chars[i + 1] == quote {
                        out.push(chars[i + 1]);
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                i += 1;
            }
            continue;
        }

        // Parameter tokens
        if c == '@' || c == ':' || c == '$' {
            let start = i + 1;
            let mut end = start;
            while end < len && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                end += 1;
            }
            if end > start {
                let name: String = chars[start..end].iter().collect();
                if let Some(renamed) = renames.get(&name) {
                    out.push(c);
                    out.push_str(renamed);
                    i = end;
                    continue;
                }
            }
            out.push(c);
            i += 1;
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}
