//! Canonical logging macros
//!
//! These macros provide a structured, consistent way to log boundary
//! operations such as commits and deletes.

/// Log the start of an operation
///
/// # Example
///
/// ```
/// # use trellis_core::log_op_start;
/// log_op_start!("session_commit");
/// log_op_start!("entity_delete", entity = "Issue[1]");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::trellis_core_types::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::trellis_core_types::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// # Example
///
/// ```
/// # use trellis_core::log_op_end;
/// log_op_end!("session_commit", duration_ms = 42);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::trellis_core_types::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::trellis_core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log an operation error
///
/// Link and session context carried on the error are recorded when present.
///
/// # Example
///
/// ```
/// # use trellis_core::{log_op_error, errors::TrellisError};
/// let err = TrellisError::domain("refused");
/// log_op_error!("entity_delete", err, duration_ms = 10);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::trellis_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?ex_err.kind(),
            err_code = ex_err.code(),
            link_name = ex_err.link_name(),
            session_id = ex_err.session_id().map(tracing::field::display),
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::trellis_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?ex_err.kind(),
            err_code = ex_err.code(),
            link_name = ex_err.link_name(),
            session_id = ex_err.session_id().map(tracing::field::display),
            $($field)*
        );
    }};
}
