//! Engine handle and operation boundary
//!
//! A `RollupEngine` borrows a host and its schema for the duration of a
//! call sequence. Every public operation runs through [`observe`], which
//! logs exactly one start and one end event for the request context it is
//! given.

use std::time::Instant;

use rollup_core::errors::ExError;
use rollup_core::metadata::MetadataResolver;
use rollup_core::{log_op_end, log_op_error, log_op_start, EngineConfig, RollupHost, SchemaRegistry};
use rollup_core_types::RequestContext;
use rollup_store::errors::Result;

pub struct RollupEngine<'a, H: RollupHost> {
    pub(crate) host: &'a mut H,
    pub(crate) schema: &'a SchemaRegistry,
    pub(crate) config: EngineConfig,
}

impl<'a, H: RollupHost> RollupEngine<'a, H> {
    pub fn new(host: &'a mut H, schema: &'a SchemaRegistry, config: EngineConfig) -> Self {
        Self { host, schema, config }
    }

    pub fn host(&self) -> &H {
        &*self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut *self.host
    }

    pub fn schema(&self) -> &SchemaRegistry {
        self.schema
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn resolver(&self) -> MetadataResolver<'a> {
        MetadataResolver::new(self.schema, &self.config)
    }
}

impl<H: RollupHost> std::fmt::Debug for RollupEngine<'_, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollupEngine")
            .field("objects", &self.schema.objects().count())
            .field("config", &self.config)
            .finish()
    }
}

/// Context for a new public call, tagged with the calling surface
pub(crate) fn request_context(invocation: Option<&str>) -> RequestContext {
    match invocation {
        Some(tag) => RequestContext::new().with_invocation(tag),
        None => RequestContext::new(),
    }
}

/// Run `f` as the public operation `op`
///
/// Errors leave with `op` and the request id attached.
pub(crate) fn observe<T>(op: &'static str, ctx: &RequestContext, f: impl FnOnce() -> Result<T>) -> Result<T> {
    log_op_start!(
        op,
        request_id = %ctx.request_id,
        invocation = ctx.invocation_or_default()
    );
    let start = Instant::now();

    let result = f().map_err(|e| with_context(e, op, ctx));

    let elapsed = start.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => log_op_end!(op, duration_ms = elapsed, request_id = %ctx.request_id),
        Err(e) => {
            let e_clone = e.clone();
            log_op_error!(op, e_clone, duration_ms = elapsed, request_id = %ctx.request_id);
        }
    }
    result
}

fn with_context(err: ExError, op: &str, ctx: &RequestContext) -> ExError {
    let err = if err.op().is_none() { err.with_op(op) } else { err };
    err.with_request_id(ctx.request_id.clone())
}
