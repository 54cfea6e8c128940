//! Tests for configuration validation

use std::time::Duration;

use battery_os::config::{
    AggregateConfig, PartitionChildSpec, PartitionSpec, ResourceConfig, TopologyConfig,
    DEFAULT_VOLTAGE_TOLERANCE_MV, MIN_ACTIVE_STALENESS_MS,
};
use battery_os::core::{PartitionPolicy, RefreshMode, Scale};

#[test]
fn test_resource_config_defaults() {
    let cfg = ResourceConfig::default();
    assert_eq!(cfg.refresh_mode, RefreshMode::Lazy);
    assert_eq!(cfg.max_staleness(), Duration::from_secs(1));
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_resource_config_active_minimum() {
    assert!(ResourceConfig::active(MIN_ACTIVE_STALENESS_MS - 1).validate().is_err());
    assert!(ResourceConfig::active(MIN_ACTIVE_STALENESS_MS).validate().is_ok());
    assert!(ResourceConfig::lazy(1).validate().is_ok());
}

#[test]
fn test_resource_config_from_env() {
    std::env::remove_var("BOS_MAX_STALENESS_MS");
    std::env::remove_var("BOS_REFRESH_MODE");
    assert_eq!(ResourceConfig::from_env().unwrap(), ResourceConfig::default());

    std::env::set_var("BOS_MAX_STALENESS_MS", "250");
    std::env::set_var("BOS_REFRESH_MODE", "Active");
    assert_eq!(ResourceConfig::from_env().unwrap(), ResourceConfig::active(250));

    std::env::set_var("BOS_MAX_STALENESS_MS", "20");
    assert!(ResourceConfig::from_env().is_err());

    std::env::set_var("BOS_REFRESH_MODE", "sometimes");
    assert!(ResourceConfig::from_env().is_err());

    std::env::remove_var("BOS_MAX_STALENESS_MS");
    std::env::remove_var("BOS_REFRESH_MODE");
}

#[test]
fn test_aggregate_config_validation() {
    let cfg = AggregateConfig::default();
    assert_eq!(cfg.voltage_tolerance_mv, DEFAULT_VOLTAGE_TOLERANCE_MV);
    assert!(cfg.validate().is_ok());

    let negative = AggregateConfig {
        voltage_tolerance_mv: -1.0,
        ..AggregateConfig::default()
    };
    assert!(negative.validate().is_err());

    let too_eager = AggregateConfig {
        resource: ResourceConfig::active(10),
        ..AggregateConfig::default()
    };
    assert!(too_eager.validate().is_err());
}

#[test]
fn test_partition_spec_scales() {
    let spec = PartitionSpec {
        source: "pack".to_string(),
        policy: PartitionPolicy::Tranche,
        children: vec![
            PartitionChildSpec {
                name: "low".to_string(),
                scale: vec![0.25, 0.75],
            },
            PartitionChildSpec {
                name: "high".to_string(),
                scale: vec![0.75, 0.25],
            },
        ],
        resource: ResourceConfig::default(),
    };
    let scales = spec.scales().unwrap();
    assert_eq!(scales[0].0, "low");
    assert_eq!(scales[0].1, Scale::new(0.25, 0.25, 0.75, 0.75));
    assert!(Scale::validate_set(&scales.iter().map(|(_, s)| *s).collect::<Vec<_>>()).is_ok());

    let mut bad = spec;
    bad.children[1].scale = vec![0.1, 0.2, 0.3, 0.4, 0.5];
    assert!(bad.scales().is_err());
}

#[test]
fn test_topology_from_json() {
    let cfg = TopologyConfig::from_json_str(
        r#"{
            "physical": [{"name": "cell"}],
            "partitions": [{
                "source": "cell",
                "policy": "reservation",
                "children": [
                    {"name": "backup", "scale": [0.2, 0.2, 0.2, 0.2]},
                    {"name": "daily", "scale": [0.8, 0.8, 0.8, 0.8]}
                ]
            }]
        }"#,
    )
    .unwrap();
    assert!(cfg.aggregates.is_empty());
    assert_eq!(cfg.partitions[0].policy, PartitionPolicy::Reservation);
    assert!(cfg.physical[0].initial.is_none());

    assert!(TopologyConfig::from_json_str("{").is_err());
    assert!(TopologyConfig::from_json_str(r#"{"physical": [{"name": ""}]}"#).is_err());
}
