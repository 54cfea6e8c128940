//! Request/response models for callers outside the resource tree.

use serde::{Deserialize, Serialize};

use crate::core::{BosResult, Directory, ResourceKind, ScheduleRequest, Status};

/// A schedule request as a client submits it. The sequence number is
/// assigned by the directory unless the client updates an existing
/// reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSubmission {
    /// Target current in mA.
    pub target_ma: f64,
    /// Floor rather than ceiling.
    #[serde(default)]
    pub is_floor: bool,
    /// Window start, ms since epoch.
    pub start_ms: u128,
    /// Window end, ms since epoch.
    pub end_ms: u128,
    /// Requester; defaults to the target resource itself.
    #[serde(default)]
    pub requester: Option<String>,
    /// Sequence of a reservation to update.
    #[serde(default)]
    pub sequence: Option<u64>,
}

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleResponse {
    /// Resource the request was made on.
    pub name: String,
    /// Sequence number of the reservation.
    pub sequence: u64,
    /// Whether it was accepted.
    pub accepted: bool,
    /// Rejection reason.
    pub reason: Option<String>,
}

/// Status of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Resource name.
    pub name: String,
    /// Variant.
    pub kind: ResourceKind,
    /// Snapshot.
    pub status: Status,
}

/// Resolve `name` and read its status.
///
/// # Errors
///
/// `UnknownName` or the resource's own failure.
pub fn status_of(directory: &Directory, name: &str) -> BosResult<StatusResponse> {
    let resource = directory.require(name)?;
    Ok(StatusResponse {
        name: name.to_string(),
        kind: resource.kind(),
        status: resource.get_status()?,
    })
}

/// Resolve `name` and submit a schedule request to it.
///
/// # Errors
///
/// `UnknownName`; scheduling failures are reported in the response.
pub fn submit_schedule(
    directory: &Directory,
    name: &str,
    submission: &ScheduleSubmission,
) -> BosResult<ScheduleResponse> {
    let resource = directory.require(name)?;
    let sequence = submission
        .sequence
        .unwrap_or_else(|| directory.sequences().next());
    let request = ScheduleRequest::new(
        submission.requester.clone().unwrap_or_else(|| name.to_string()),
        sequence,
        submission.target_ma,
        submission.start_ms,
        submission.end_ms,
    )
    .with_floor(submission.is_floor);

    let outcome = resource.schedule(&request);
    Ok(ScheduleResponse {
        name: name.to_string(),
        sequence,
        accepted: outcome.is_ok(),
        reason: outcome.err().map(|e| e.to_string()),
    })
}
