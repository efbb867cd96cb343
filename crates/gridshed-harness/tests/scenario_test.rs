//! Integration test: bundled scenarios replay cleanly and their logs
//! satisfy the structured log contract.

use std::path::{Path, PathBuf};

use gridshed_harness::scenario::{Scenario, StepOp, replay};
use gridshed_harness::structured_log::{LogEmitter, validate_log_line};

fn scenarios_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios")
}

fn load(name: &str) -> Scenario {
    Scenario::from_file(&scenarios_dir().join(name)).expect("scenario parses")
}

fn all_scenarios() -> Vec<Scenario> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(scenarios_dir())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    paths.sort();
    paths
        .iter()
        .map(|p| Scenario::from_file(p).unwrap())
        .collect()
}

#[test]
fn bundled_scenarios_pass() {
    let scenarios = all_scenarios();
    assert!(scenarios.len() >= 4, "scenarios A-D must be bundled");
    for scenario in &scenarios {
        let (mut log, _buffer) = LogEmitter::to_buffer("it", &scenario.name);
        let report = replay(scenario, &mut log).unwrap();
        assert!(
            report.passed(),
            "{} failed: {:#?}",
            scenario.name,
            report.failures
        );
    }
}

#[test]
fn every_step_carries_an_expectation_somewhere() {
    for scenario in all_scenarios() {
        assert!(
            scenario.steps.iter().any(|s| s.expect.is_some()),
            "{} checks nothing",
            scenario.name
        );
        assert!(
            scenario
                .steps
                .iter()
                .any(|s| matches!(s.op, StepOp::Tick { .. })),
            "{} never ticks",
            scenario.name
        );
    }
}

#[test]
fn scenario_b_report_counts() {
    let (mut log, _buffer) = LogEmitter::to_buffer("it", "b");
    let report = replay(&load("b_expiries_keep_shedding.json"), &mut log).unwrap();
    assert_eq!(report.final_state, "monitoring_unstable");
    assert_eq!(report.counters.sheds, 3);
    assert_eq!(report.counters.reconnects, 0);
    assert_eq!(report.connected, 0b11000);
    assert_eq!(report.latency.events, 1);
    assert_eq!(report.latency.last_us, Some(5_000));
}

#[test]
fn scenario_c_ends_in_normal_with_balanced_counters() {
    let (mut log, _buffer) = LogEmitter::to_buffer("it", "c");
    let report = replay(&load("c_recovery_reconnects_highest_first.json"), &mut log).unwrap();
    assert_eq!(report.final_state, "normal");
    assert_eq!(report.counters.sheds, report.counters.reconnects);
    assert_eq!(report.shed_indicator, 0);
}

#[test]
fn replay_logs_validate() {
    let (mut log, buffer) = LogEmitter::to_buffer("it", "-");
    for scenario in all_scenarios() {
        replay(&scenario, &mut log).unwrap();
    }
    let lines = buffer.lines();
    assert!(!lines.is_empty());
    for (i, line) in lines.iter().enumerate() {
        if let Err(errors) = validate_log_line(line, i + 1) {
            panic!("line {} invalid: {errors:?}\n{line}", i + 1);
        }
    }

    let shed_first = lines
        .iter()
        .filter(|l| l.contains("\"action\":\"shed_first\""))
        .count();
    assert_eq!(shed_first, 5, "A, B, C, E and F each shed once out of normal");
    assert!(
        lines
            .iter()
            .any(|l| l.contains("\"state\":\"maintenance\"") && l.contains("state_change"))
    );
}

#[test]
fn trace_ids_are_sequential_across_scenarios() {
    let (mut log, buffer) = LogEmitter::to_buffer("seq", "-");
    replay(&load("a_instability_sheds_first_load.json"), &mut log).unwrap();
    replay(&load("d_maintenance_round_trip.json"), &mut log).unwrap();
    let ids: Vec<String> = buffer
        .lines()
        .iter()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            v["trace_id"].as_str().unwrap().to_owned()
        })
        .collect();
    assert!(ids[0].starts_with("seq::a_instability_sheds_first_load::"));
    assert!(ids.last().unwrap().starts_with("seq::d_maintenance_round_trip::"));
    for (i, id) in ids.iter().enumerate() {
        assert!(id.ends_with(&format!("::{:04}", i + 1)), "{id}");
    }
}
