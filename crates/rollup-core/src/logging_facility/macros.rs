//! Boundary logging macros
//!
//! All three expand through `__rollup_op_event!`, which stamps the
//! component, op and event fields before any caller-supplied ones.

#[doc(hidden)]
#[macro_export]
macro_rules! __rollup_op_event {
    ($level:ident, $event:expr, $op:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            component = module_path!(),
            op = $op,
            event = $event,
            $($($field)*)?
        )
    };
}

/// Log the start of an engine operation
///
/// ```
/// # use rollup_core::log_op_start;
/// log_op_start!("recalculate_bulk");
/// log_op_start!("recalculate_bulk", definition_count = 3);
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr $(, $($field:tt)*)?) => {
        $crate::__rollup_op_event!(
            info,
            rollup_core_types::schema::EVENT_START,
            $op
            $(, $($field)*)?
        )
    };
}

/// Log the successful end of an engine operation; `duration_ms` is mandatory
///
/// ```
/// # use rollup_core::log_op_end;
/// log_op_end!("recalculate_parent", duration_ms = 12);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {
        $crate::__rollup_op_event!(
            info,
            rollup_core_types::schema::EVENT_END,
            $op,
            duration_ms = $duration
            $(, $($field)*)?
        )
    };
}

/// Log the failed end of an engine operation
///
/// The error goes through `ExError` so the kind and stable code are always
/// present on the event.
///
/// ```ignore
/// # use rollup_core::{log_op_error, errors::RollupError};
/// let err = RollupError::JobNotFound { job_id: "job-1".to_string() };
/// log_op_error!("get_job_status", err, duration_ms = 3);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr $(, $($field:tt)*)?) => {{
        let failure: $crate::errors::ExError = $err.into();
        $crate::__rollup_op_event!(
            error,
            rollup_core_types::schema::EVENT_END_ERROR,
            $op,
            duration_ms = $duration,
            err_kind = ?failure.kind(),
            err_code = failure.code(),
            message = %failure
            $(, $($field)*)?
        )
    }};
}
