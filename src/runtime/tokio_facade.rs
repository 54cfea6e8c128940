//! Async wrappers that run blocking resource calls on tokio's blocking pool.

use std::sync::Arc;

use crate::core::{BosError, BosResult, Directory};
use crate::runtime::api::{status_of, submit_schedule, ScheduleResponse, ScheduleSubmission, StatusResponse};

fn joined<T>(result: Result<BosResult<T>, tokio::task::JoinError>) -> BosResult<T> {
    result.unwrap_or_else(|e| Err(BosError::Driver(format!("blocking task failed: {e}"))))
}

/// Async [`status_of`].
///
/// # Errors
///
/// As [`status_of`].
pub async fn get_status_async(directory: Arc<Directory>, name: String) -> BosResult<StatusResponse> {
    joined(tokio::task::spawn_blocking(move || status_of(&directory, &name)).await)
}

/// Async [`submit_schedule`].
///
/// # Errors
///
/// As [`submit_schedule`].
pub async fn schedule_async(
    directory: Arc<Directory>,
    name: String,
    submission: ScheduleSubmission,
) -> BosResult<ScheduleResponse> {
    joined(tokio::task::spawn_blocking(move || submit_schedule(&directory, &name, &submission)).await)
}
