//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Own every unit of work: services open transactions through
//!   [`crate::store::Store`], repositories only borrow them.

use crate::error::CoreResult;
use log::{info, warn};
use std::time::Instant;

pub mod attachment_service;
pub mod backup_service;
pub mod folder_service;
pub mod note_service;

/// Emits the terminal `status=ok|error` event of one service operation and
/// passes the result through.
pub(crate) fn log_outcome<T>(
    event: &str,
    module: &str,
    started_at: Instant,
    result: CoreResult<T>,
) -> CoreResult<T> {
    let duration_ms = started_at.elapsed().as_millis();
    match &result {
        Ok(_) => info!(
            "event={} module={} status=ok duration_ms={}",
            event, module, duration_ms
        ),
        Err(err) => warn!(
            "event={} module={} status=error duration_ms={} error_code={} error={}",
            event,
            module,
            duration_ms,
            err.kind().as_str(),
            err
        ),
    }
    result
}
