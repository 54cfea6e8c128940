//! Tests for the client-facing request surface and its async facade

use std::sync::Arc;

use battery_os::builders::ResourceFactory;
use battery_os::config::ResourceConfig;
use battery_os::core::{BosError, Directory, ResourceKind, Status};
use battery_os::infra::FixedStatusDriver;
use battery_os::runtime::{get_status_async, schedule_async, status_of, submit_schedule, ScheduleSubmission};
use battery_os::util::now_ms;

fn directory_with_cell() -> Arc<Directory> {
    let directory = Arc::new(Directory::default());
    let factory = ResourceFactory::new(Arc::clone(&directory));
    let status = Status {
        voltage_mv: 3_700.0,
        capacity_mah: 1_000.0,
        max_capacity_mah: 2_000.0,
        max_charge_current_ma: 500.0,
        max_discharge_current_ma: 500.0,
        ..Status::default()
    };
    factory
        .create_physical("cell", Box::new(FixedStatusDriver::new(status)), ResourceConfig::default())
        .unwrap();
    directory
}

fn submission(target_ma: f64) -> ScheduleSubmission {
    let start = now_ms() + 1_000;
    ScheduleSubmission {
        target_ma,
        is_floor: false,
        start_ms: start,
        end_ms: start + 1_000,
        requester: None,
        sequence: None,
    }
}

#[test]
fn test_status_of() {
    let directory = directory_with_cell();
    let response = status_of(&directory, "cell").unwrap();
    assert_eq!(response.kind, ResourceKind::Leaf);
    assert_eq!(response.status.capacity_mah, 1_000.0);
    assert_eq!(status_of(&directory, "nope").unwrap_err(), BosError::UnknownName("nope".into()));
    directory.shutdown();
}

#[test]
fn test_submit_schedule_reports_rejections() {
    let directory = directory_with_cell();

    let accepted = submit_schedule(&directory, "cell", &submission(200.0)).unwrap();
    assert!(accepted.accepted);
    assert!(accepted.reason.is_none());

    // the requester defaults to the resource itself, so its limit applies
    let rejected = submit_schedule(&directory, "cell", &submission(900.0)).unwrap();
    assert!(!rejected.accepted);
    assert!(rejected.reason.unwrap().contains("out of range"));
    assert_ne!(rejected.sequence, accepted.sequence);

    let update = ScheduleSubmission {
        sequence: Some(accepted.sequence),
        ..submission(100.0)
    };
    let updated = submit_schedule(&directory, "cell", &update).unwrap();
    assert_eq!(updated.sequence, accepted.sequence);
    let reservations = directory.require("cell").unwrap().reservations();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].magnitude_ma, 300.0);

    directory.shutdown();
}

#[test]
fn test_submission_json_defaults() {
    let sub: ScheduleSubmission =
        serde_json::from_str(r#"{"target_ma": 12.5, "start_ms": 10, "end_ms": 20}"#).unwrap();
    assert!(!sub.is_floor);
    assert!(sub.requester.is_none());
    assert!(sub.sequence.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_facade() {
    let directory = directory_with_cell();

    let status = get_status_async(Arc::clone(&directory), "cell".to_string())
        .await
        .unwrap();
    assert_eq!(status.name, "cell");

    let response = schedule_async(Arc::clone(&directory), "cell".to_string(), submission(50.0))
        .await
        .unwrap();
    assert!(response.accepted);

    let missing = get_status_async(Arc::clone(&directory), "ghost".to_string()).await;
    assert!(matches!(missing, Err(BosError::UnknownName(_))));

    directory.shutdown();
}
