//! Batch engine and execution
//!
//! `BatchEngine` owns the process-wide mutable state (template cache,
//! capture map, cache-hit counter, optional declarative session) so that
//! tests and embedders run in isolation; batches are created from an
//! engine and executed against a caller-supplied connection or
//! transaction in a single round trip.

use crate::capture::{self, CaptureMap, CaptureSink, CapturedQuery, TemplateCache};
use crate::compiler::{self, SlotInfo, SqlBatch};
use crate::descriptor::{
    CorrelationId, DeclarativeQuery, Parameters, QueryDefinition, QueryDescriptor, QuerySource,
};
use crate::results::{BatchResults, FromRow};
use sqlmux_core::{ExecuteOptions, ExecutionTarget, Result, SqlmuxError};
use std::any::{Any, TypeId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Owns the capture/replay caches and creates batches.
///
/// One engine is meant to live for the process (or per test); its caches
/// are shared by all concurrent batches created from it.
#[derive(Default)]
pub struct BatchEngine {
    templates: TemplateCache,
    captures: CaptureMap,
    session: Option<Arc<dyn Any + Send + Sync>>,
    cache_hits: AtomicU64,
}

impl BatchEngine {
    /// Create an engine with no declarative session
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine carrying the session the declarative subsystem
    /// materializes its queries against
    pub fn with_session(session: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            session: Some(session),
            ..Self::default()
        }
    }

    /// Start a new batch
    pub fn batch(&self) -> Batch<'_> {
        Batch {
            engine: self,
            registrations: Vec::new(),
            options: ExecuteOptions::default(),
        }
    }

    /// Drop every compiled template and non-cacheable marker
    pub fn clear_templates(&self) {
        self.templates.clear();
    }

    /// Whether a compiled template is stored for descriptor type `D`
    pub fn has_template<D: QueryDescriptor>(&self) -> bool {
        self.templates.has_template(TypeId::of::<D>())
    }

    /// False only when `D` is marked permanently non-cacheable
    pub fn is_cacheable<D: QueryDescriptor>(&self) -> bool {
        self.templates.is_cacheable(TypeId::of::<D>())
    }

    /// Number of cached entries, non-cacheable markers included
    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Number of template replays that bypassed the declarative subsystem
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Number of in-flight capture entries. Entries are single-use and
    /// removed within the call that inserted them, so anything other
    /// than zero between batches indicates a leak.
    pub fn pending_captures(&self) -> usize {
        self.captures.len()
    }

    fn definition_for(&self, registration: &Registration) -> Result<QueryDefinition> {
        match registration.descriptor.source() {
            QuerySource::Direct(definition) => Ok(definition),
            QuerySource::Declarative(query) => self.declarative_definition(registration, query),
        }
    }

    fn declarative_definition(
        &self,
        registration: &Registration,
        query: &dyn DeclarativeQuery,
    ) -> Result<QueryDefinition> {
        let type_id = registration.slot.descriptor_type;
        match self.templates.get(type_id) {
            Some(Some(template)) => {
                let fields = registration.descriptor.parameter_fields();
                let parameters = template.replay(&fields)?;
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    descriptor = registration.slot.descriptor_name,
                    "replayed compiled template"
                );
                Ok(QueryDefinition::new(
                    template.sql().to_string(),
                    Parameters::Flat(parameters),
                ))
            }
            Some(None) => {
                // Known non-cacheable: capture on every call.
                let captured = self.capture(registration, query)?;
                Ok(QueryDefinition::new(
                    captured.sql,
                    Parameters::Flat(captured.parameters),
                ))
            }
            None => {
                let captured = self.capture(registration, query)?;
                let fields = registration.descriptor.parameter_fields();
                let template = capture::compile_template(&captured, &fields).map(Arc::new);
                if template.is_none() {
                    tracing::debug!(
                        descriptor = registration.slot.descriptor_name,
                        "descriptor type is not cacheable"
                    );
                }
                self.templates.insert_if_absent(type_id, template);
                Ok(QueryDefinition::new(
                    captured.sql,
                    Parameters::Flat(captured.parameters),
                ))
            }
        }
    }

    /// Run the declarative query inside a capture scope and pull the
    /// command it issued. The subsystem's own error is suppressed once
    /// the command is in hand; without a command it becomes either the
    /// wrapped configuration error or a descriptive capture failure.
    fn capture(
        &self,
        registration: &Registration,
        query: &dyn DeclarativeQuery,
    ) -> Result<CapturedQuery> {
        let tag = CorrelationId::fresh();
        let sink = CaptureSink::new(&self.captures);
        let outcome = query.materialize(self.session.as_deref(), tag, &sink);

        match self.captures.take(tag) {
            Some(captured) => {
                if let Err(error) = outcome {
                    tracing::debug!(%tag, error = %error, "suppressed declarative error after capture");
                }
                Ok(captured)
            }
            None => {
                let descriptor = registration.slot.descriptor_name.to_string();
                match outcome {
                    Err(error) => match error.downcast::<SqlmuxError>() {
                        Ok(config @ SqlmuxError::Configuration(_)) => Err(config),
                        Ok(other) => Err(SqlmuxError::CaptureFailed {
                            descriptor,
                            reason: other.to_string(),
                        }),
                        Err(error) => Err(SqlmuxError::CaptureFailed {
                            descriptor,
                            reason: error.to_string(),
                        }),
                    },
                    Ok(()) => Err(SqlmuxError::CaptureFailed {
                        descriptor,
                        reason: "declarative subsystem issued no command".to_string(),
                    }),
                }
            }
        }
    }
}

struct Registration {
    descriptor: Box<dyn QueryDescriptor>,
    slot: SlotInfo,
}

/// One batch of registrations, compiled and executed together
pub struct Batch<'e> {
    engine: &'e BatchEngine,
    registrations: Vec<Registration>,
    options: ExecuteOptions,
}

impl Batch<'_> {
    /// Register a descriptor whose result rows decode as `T`.
    /// Registration order defines the result slot order.
    pub fn add<T, D>(&mut self, descriptor: D) -> &mut Self
    where
        T: FromRow + 'static,
        D: QueryDescriptor,
    {
        self.registrations.push(Registration {
            descriptor: Box::new(descriptor),
            slot: SlotInfo {
                result_type: TypeId::of::<T>(),
                result_name: std::any::type_name::<T>(),
                descriptor_type: TypeId::of::<D>(),
                descriptor_name: std::any::type_name::<D>(),
            },
        });
        self
    }

    /// Set timeout/cancellation passed through to the executor
    pub fn options(&mut self, options: ExecuteOptions) -> &mut Self {
        self.options = options;
        self
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Compile every registration into one collision-free script.
    ///
    /// Declarative descriptors go through the engine's capture/replay
    /// cache here; nothing touches the database.
    pub fn compile(&self) -> Result<SqlBatch> {
        let mut batch = SqlBatch::default();
        for (position, registration) in self.registrations.iter().enumerate() {
            let definition = self.engine.definition_for(registration)?;
            compiler::append_statement(&mut batch, position, definition, registration.slot.clone())?;
        }
        Ok(batch)
    }

    /// Compile, execute in one round trip, and demultiplex.
    ///
    /// A closed connection is opened for the call and closed again after
    /// it; an open connection (or a transaction) is left untouched.
    /// Exactly one result set is read per registration, in order.
    #[tracing::instrument(skip_all, fields(registrations = self.registrations.len()))]
    pub async fn execute<'a>(
        &self,
        target: impl Into<ExecutionTarget<'a>>,
    ) -> Result<BatchResults> {
        let target = target.into();
        let batch = self.compile()?;
        if batch.is_empty() {
            tracing::debug!("empty batch, skipping round trip");
            return Ok(BatchResults::empty());
        }
        tracing::debug!(
            statements = batch.statement_count(),
            parameters = batch.parameters.len(),
            "executing batch"
        );

        match target {
            ExecutionTarget::Connection(conn) => {
                let opened_here = conn.is_closed();
                if opened_here {
                    conn.open().await?;
                }
                let outcome = self.read_results(&target, &batch).await;
                if opened_here {
                    match (conn.close().await, &outcome) {
                        (Err(error), Ok(_)) => return Err(error),
                        (Err(error), Err(_)) => {
                            tracing::debug!(error = %error, "close failed after failed batch");
                        }
                        (Ok(()), _) => {}
                    }
                }
                outcome
            }
            ExecutionTarget::Transaction(_) => self.read_results(&target, &batch).await,
        }
    }

    async fn read_results(
        &self,
        target: &ExecutionTarget<'_>,
        batch: &SqlBatch,
    ) -> Result<BatchResults> {
        let expected = batch.statement_count();
        let mut reader = target
            .execute_script(&batch.script, &batch.parameters, &self.options)
            .await?;

        let mut sets = Vec::with_capacity(expected);
        for received in 0..expected {
            if self.options.is_cancelled() {
                return Err(SqlmuxError::Cancelled);
            }
            match reader.next_result().await? {
                Some(set) => sets.push(set),
                None => {
                    return Err(SqlmuxError::ResultSetCountMismatch { expected, received });
                }
            }
        }
        Ok(BatchResults::new(batch.slots.clone(), sets))
    }
}
