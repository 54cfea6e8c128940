//! Tests for builder modules

use std::sync::Arc;
use std::time::Duration;

use battery_os::builders::{build_topology, load_topology, simulated_driver, ResourceFactory};
use battery_os::config::{PhysicalSpec, ResourceConfig, TopologyConfig};
use battery_os::core::{BosError, DeviceDriver, Directory, ResourceKind, ScheduleRequest, SequenceSource, Status};
use battery_os::infra::{FixedStatusDriver, SimulatedBattery};
use battery_os::util::now_ms;

fn cell(capacity: f64) -> Status {
    Status {
        voltage_mv: 3_700.0,
        current_ma: 0.0,
        capacity_mah: capacity,
        max_capacity_mah: 2_000.0,
        max_charge_current_ma: 500.0,
        max_discharge_current_ma: 800.0,
        timestamp_ms: 0,
    }
}

fn factory() -> ResourceFactory {
    ResourceFactory::new(Arc::new(Directory::default()))
}

#[test]
fn test_simulated_driver_needs_initial_status() {
    let spec = PhysicalSpec {
        name: "cell".to_string(),
        resource: ResourceConfig::default(),
        initial: None,
    };
    assert!(matches!(simulated_driver(&spec), Err(BosError::Config(_))));

    let spec = PhysicalSpec {
        initial: Some(cell(1_000.0)),
        ..spec
    };
    let driver = simulated_driver(&spec).unwrap();
    assert_eq!(driver.type_name(), "simulated");
    assert_eq!(driver.refresh().unwrap().capacity_mah, 1_000.0);
}

#[test]
fn test_build_topology_uses_driver_factory() {
    let cfg = TopologyConfig::from_json_str(
        r#"{ "physical": [ {"name": "x"}, {"name": "y", "resource": {"refresh_mode": "active", "max_staleness_ms": 200}} ] }"#,
    )
    .unwrap();
    let factory = factory();
    let mut seen = Vec::new();
    let created = build_topology(&cfg, &factory, |spec| {
        seen.push(spec.name.clone());
        Ok(Box::new(FixedStatusDriver::new(cell(1_000.0))) as Box<dyn DeviceDriver>)
    })
    .unwrap();

    assert_eq!(seen, vec!["x", "y"]);
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|r| r.kind() == ResourceKind::Leaf));
    assert!(created[1]
        .pending_events()
        .iter()
        .any(|e| e.kind == battery_os::core::EventKind::Refresh));

    factory.directory().shutdown();
}

#[test]
fn test_build_topology_stops_at_first_failure() {
    let cfg = TopologyConfig::from_json_str(r#"{ "physical": [ {"name": "x"}, {"name": "y"} ] }"#).unwrap();
    let factory = factory();
    let result = build_topology(&cfg, &factory, |spec| {
        if spec.name == "y" {
            Err(BosError::Driver("no such device".into()))
        } else {
            Ok(Box::new(FixedStatusDriver::new(cell(1_000.0))) as Box<dyn DeviceDriver>)
        }
    });
    assert_eq!(result.unwrap_err(), BosError::Driver("no such device".into()));
    assert_eq!(factory.directory().names(), vec!["x"]);

    factory.directory().shutdown();
}

#[test]
fn test_factory_remove_unknown() {
    let factory = factory();
    assert_eq!(factory.remove("nope"), Err(BosError::UnknownName("nope".into())));
}

#[test]
fn test_simulated_battery_follows_commands() {
    let battery = SimulatedBattery::new(cell(1_000.0));
    let factory = factory();
    let resource = factory
        .create_physical("sim", Box::new(battery.clone()), ResourceConfig::lazy(10))
        .unwrap();

    let start = now_ms() + 50;
    let seq = factory.directory().sequences().next();
    // well above the 800 mA limit; the device clamps, the resource does not check forwards
    resource
        .schedule(&ScheduleRequest::new("upstream", seq, 5_000.0, start, start + 200))
        .unwrap();

    std::thread::sleep(Duration::from_millis(150));
    let during = battery.peek();
    assert_eq!(during.current_ma, 800.0);

    std::thread::sleep(Duration::from_millis(300));
    let after = battery.peek();
    assert_eq!(after.current_ma, 0.0);
    assert!(after.capacity_mah < 1_000.0);
    assert!(after.capacity_mah > 999.0);

    factory.directory().shutdown();
}

#[test]
fn test_load_topology_from_file() {
    let dir = std::env::temp_dir().join(format!("bos-topology-{}-{}", std::process::id(), now_ms()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("topology.json");
    std::fs::write(
        &path,
        r#"{
            "physical": [
                {"name": "p", "initial": {"voltage_mv": 3700.0, "current_ma": 0.0, "capacity_mah": 1000.0,
                 "max_capacity_mah": 2000.0, "max_charge_current_ma": 500.0,
                 "max_discharge_current_ma": 800.0, "timestamp_ms": 0}}
            ],
            "aggregates": [ {"name": "agg", "parents": ["p"]} ]
        }"#,
    )
    .unwrap();

    let factory = factory();
    let created = load_topology(&path, &factory, simulated_driver).unwrap();
    assert_eq!(created.len(), 2);
    assert!(factory.directory().contains("agg"));
    factory.directory().shutdown();

    let missing = load_topology(dir.join("missing.json"), &factory, simulated_driver).unwrap_err();
    assert!(format!("{missing:#}").contains("reading topology"));

    std::fs::write(&path, "{ not json").unwrap();
    let garbled = load_topology(&path, &factory, simulated_driver).unwrap_err();
    assert!(format!("{garbled:#}").contains("parsing topology"));

    std::fs::remove_dir_all(&dir).unwrap();
}
