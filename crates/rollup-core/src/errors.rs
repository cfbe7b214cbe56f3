use rollup_core_types::RequestId;
use thiserror::Error;

/// Result type alias using RollupError
pub type Result<T> = std::result::Result<T, RollupError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every error surfaced by the engine maps to exactly one kind, and every
/// kind has a stable code that callers (UI surfaces, schedulers, tests) can
/// match on without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Validation (raised before any data access)
    InvalidInput,
    Configuration,
    PathResolution,
    InvalidFilter,

    // Lookup
    NotFound,

    // Runtime
    DataAccess,
    PartialWrite,
    Arithmetic,
    InvalidTransition,
    DispatchFailed,

    // Integration/IO
    Io,
    Serialization,
    Persistence,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::Configuration => "ERR_CONFIGURATION",
            ExErrorKind::PathResolution => "ERR_PATH_RESOLUTION",
            ExErrorKind::InvalidFilter => "ERR_INVALID_FILTER",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::DataAccess => "ERR_DATA_ACCESS",
            ExErrorKind::PartialWrite => "ERR_PARTIAL_WRITE",
            ExErrorKind::Arithmetic => "ERR_ARITHMETIC",
            ExErrorKind::InvalidTransition => "ERR_INVALID_TRANSITION",
            ExErrorKind::DispatchFailed => "ERR_DISPATCH_FAILED",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Validation kinds are rejected before any record is read or written
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExErrorKind::InvalidInput
                | ExErrorKind::Configuration
                | ExErrorKind::PathResolution
                | ExErrorKind::InvalidFilter
        )
    }
}

/// Canonical structured error type
///
/// Structured representation with classification fields for programmatic
/// handling and enough context (definition, parent, job) to act on it.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    definition_id: Option<String>,
    parent_id: Option<String>,
    job_id: Option<String>,
    request_id: Option<RequestId>,
    message: String,
    failed_ids: Option<Vec<String>>,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            definition_id: None,
            parent_id: None,
            job_id: None,
            request_id: None,
            message: String::new(),
            failed_ids: None,
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add rollup definition context
    pub fn with_definition_id(mut self, id: impl Into<String>) -> Self {
        self.definition_id = Some(id.into());
        self
    }

    /// Add parent record context
    pub fn with_parent_id(mut self, id: impl Into<String>) -> Self {
        self.parent_id = Some(id.into());
        self
    }

    /// Add job context
    pub fn with_job_id(mut self, id: impl Into<String>) -> Self {
        self.job_id = Some(id.into());
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attach the ids of the records that failed (partial write failures)
    pub fn with_failed_ids(mut self, ids: Vec<String>) -> Self {
        self.failed_ids = Some(ids);
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the definition context, if any
    pub fn definition_id(&self) -> Option<&str> {
        self.definition_id.as_deref()
    }

    /// Get the parent record context, if any
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// Get the job context, if any
    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    /// Get the request ID context, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Ids of the records that failed, if any
    pub fn failed_ids(&self) -> Option<&[String]> {
        self.failed_ids.as_deref()
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(definition_id) = &self.definition_id {
            write!(f, " (definition: {})", definition_id)?;
        }
        if let Some(parent_id) = &self.parent_id {
            write!(f, " (parent: {})", parent_id)?;
        }
        if let Some(job_id) = &self.job_id {
            write!(f, " (job: {})", job_id)?;
        }
        if let Some(ids) = &self.failed_ids {
            write!(f, " (failed ids: {})", ids.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Domain error taxonomy for the rollup kernel
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RollupError {
    // ===== Configuration Errors =====
    /// The payload is not a usable rollup definition at all
    #[error("Invalid rollup definition: {reason}")]
    InvalidDefinition { reason: String },

    /// A required definition field is absent or blank
    #[error("Definition {definition} is missing required field '{field}'")]
    MissingField { definition: String, field: String },

    /// Operation name is not one of the supported operations
    #[error("Definition {definition} has unknown operation '{operation}'")]
    UnknownOperation {
        definition: String,
        operation: String,
    },

    /// Object type is not described by the host schema
    #[error("Definition {definition} references unknown object type '{object_type}'")]
    UnknownObjectType {
        definition: String,
        object_type: String,
    },

    /// Field does not exist on the object type
    #[error("Definition {definition} references unknown field {object_type}.{field}")]
    UnknownField {
        definition: String,
        object_type: String,
        field: String,
    },

    /// Source/target field types cannot carry the operation
    #[error("Definition {definition}: field {field} ({field_type}) is incompatible with {operation}: {reason}")]
    IncompatibleField {
        definition: String,
        field: String,
        field_type: String,
        operation: String,
        reason: String,
    },

    /// The host marks the field read-protected
    #[error("Definition {definition}: field {object_type}.{field} is not readable")]
    FieldNotReadable {
        definition: String,
        object_type: String,
        field: String,
    },

    /// The host marks the target field read-only
    #[error("Definition {definition}: target field {object_type}.{field} is not updateable")]
    TargetNotUpdateable {
        definition: String,
        object_type: String,
        field: String,
    },

    /// An order-dependent operation has no order-by criteria and explicit ones are required
    #[error("Definition {definition}: {operation} requires at least one order-by criterion")]
    MissingOrderBy {
        definition: String,
        operation: String,
    },

    /// An order-by criterion cannot be used as a tie-break
    #[error("Definition {definition}: order-by on '{field}' is unusable: {reason}")]
    UnusableOrderBy {
        definition: String,
        field: String,
        reason: String,
    },

    /// Limit is zero or negative
    #[error("Definition {definition}: limit must be positive, got {limit}")]
    InvalidLimit { definition: String, limit: i64 },

    /// Bulk request exceeds the configured definition cap
    #[error("Too many definitions in one request: {count} (maximum {max})")]
    TooManyDefinitions { count: usize, max: usize },

    // ===== Path Resolution Errors =====
    /// A relationship path hop does not exist or is not a to-one lookup
    #[error("Cannot resolve relationship path '{path}' at '{hop}': {reason}")]
    PathResolution {
        path: String,
        hop: String,
        reason: String,
    },

    // ===== Filter Errors =====
    /// Filter clause could not be parsed or bound to fields
    #[error("Invalid filter '{filter}' at position {position}: {reason}")]
    InvalidFilter {
        filter: String,
        position: usize,
        reason: String,
    },

    // ===== Runtime Errors =====
    /// Host read or write failed
    #[error("Data access failed during {op}: {message}")]
    DataAccess { op: String, message: String },

    /// Some parent writes failed while others succeeded
    #[error("{} of {attempted} parent writes failed", failed_ids.len())]
    PartialWrite {
        attempted: usize,
        failed_ids: Vec<String>,
        message: String,
    },

    /// Decimal arithmetic overflowed
    #[error("Numeric overflow while evaluating definition {definition}")]
    NumericOverflow { definition: String },

    // ===== Job Errors =====
    /// No job record exists for the id
    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    /// No chunk record exists for the id/index pair
    #[error("Chunk {index} of job {job_id} not found")]
    ChunkNotFound { job_id: String, index: u32 },

    /// Chunk status transition is not allowed
    #[error("Chunk {index} of job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        index: u32,
        from: String,
        to: String,
    },

    /// The host refused to enqueue work
    #[error("Failed to enqueue chunk: {reason}")]
    DispatchFailed { reason: String },

    // ===== Generic Errors =====
    /// Serialization error (JSON/TOML encoding/decoding)
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RollupError {
    /// Shorthand for a host data access failure
    pub fn data_access(op: impl Into<String>, message: impl Into<String>) -> Self {
        RollupError::DataAccess {
            op: op.into(),
            message: message.into(),
        }
    }

    /// The canonical kind this error maps to
    pub fn kind(&self) -> ExErrorKind {
        ExError::from(self.clone()).kind()
    }
}

/// Conversion from RollupError to ExError
impl From<RollupError> for ExError {
    fn from(err: RollupError) -> Self {
        let message = err.to_string();
        match err {
            RollupError::InvalidDefinition { .. } | RollupError::TooManyDefinitions { .. } => {
                ExError::new(ExErrorKind::Configuration).with_message(message)
            }

            RollupError::MissingField { definition, .. }
            | RollupError::UnknownOperation { definition, .. }
            | RollupError::UnknownObjectType { definition, .. }
            | RollupError::UnknownField { definition, .. }
            | RollupError::IncompatibleField { definition, .. }
            | RollupError::FieldNotReadable { definition, .. }
            | RollupError::TargetNotUpdateable { definition, .. }
            | RollupError::MissingOrderBy { definition, .. }
            | RollupError::UnusableOrderBy { definition, .. }
            | RollupError::InvalidLimit { definition, .. } => {
                ExError::new(ExErrorKind::Configuration)
                    .with_definition_id(definition)
                    .with_message(message)
            }

            RollupError::PathResolution { .. } => ExError::new(ExErrorKind::PathResolution)
                .with_op("resolve_path")
                .with_message(message),

            RollupError::InvalidFilter { .. } => ExError::new(ExErrorKind::InvalidFilter)
                .with_op("parse_filter")
                .with_message(message),

            RollupError::DataAccess { op, .. } => ExError::new(ExErrorKind::DataAccess)
                .with_op(op)
                .with_message(message),

            RollupError::PartialWrite { failed_ids, .. } => {
                ExError::new(ExErrorKind::PartialWrite)
                    .with_op("write_parents")
                    .with_failed_ids(failed_ids)
                    .with_message(message)
            }

            RollupError::NumericOverflow { definition } => ExError::new(ExErrorKind::Arithmetic)
                .with_definition_id(definition)
                .with_message(message),

            RollupError::JobNotFound { job_id } => ExError::new(ExErrorKind::NotFound)
                .with_job_id(job_id)
                .with_message(message),

            RollupError::ChunkNotFound { job_id, .. } => ExError::new(ExErrorKind::NotFound)
                .with_job_id(job_id)
                .with_message(message),

            RollupError::InvalidTransition { job_id, .. } => {
                ExError::new(ExErrorKind::InvalidTransition)
                    .with_job_id(job_id)
                    .with_message(message)
            }

            RollupError::DispatchFailed { .. } => ExError::new(ExErrorKind::DispatchFailed)
                .with_op("enqueue")
                .with_message(message),

            RollupError::Serialization { .. } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }

            RollupError::Internal { .. } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}

impl From<serde_json::Error> for RollupError {
    fn from(err: serde_json::Error) -> Self {
        RollupError::Serialization {
            message: err.to_string(),
        }
    }
}
