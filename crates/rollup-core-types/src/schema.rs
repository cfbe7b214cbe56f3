//! Names used in boundary log events
//!
//! The `log_op_*` macros emit these as tracing field names and values;
//! log consumers and the test capture layer read them back by name.

/// Module path of the emitting code
pub const FIELD_COMPONENT: &str = "component";
/// Public operation name, e.g. `recalculate_bulk`
pub const FIELD_OP: &str = "op";
/// One of the `EVENT_*` values
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";
pub const FIELD_INVOCATION: &str = "invocation";
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
