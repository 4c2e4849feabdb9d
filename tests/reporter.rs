mod common;
use common::tmp_dir;

use chrono::Utc;
use fleet::managers::executor::OperationResult;
use fleet::managers::orchestrator::BatchRun;
use fleet::managers::resolver::HostSpec;
use fleet::services::logger::Logger;
use fleet::services::reporter::{Reporter, ReportSinks};
use std::fs;

fn host(name: &str) -> HostSpec {
    HostSpec {
        raw_token: name.to_string(),
        canonical_address: format!("{}.lan", name),
        domain_applied: true,
    }
}

fn sample_run() -> BatchRun {
    let results = vec![
        OperationResult::remote(host("alpha"), 0, "ram_mb=3792\n".to_string(), Utc::now()),
        OperationResult::remote(host("beta"), 1, "apt broke\n".to_string(), Utc::now()),
        OperationResult::remote(host("gamma"), 0, "ok\n".to_string(), Utc::now()),
    ];
    BatchRun::from_results(uuid::Uuid::new_v4(), results)
}

fn sinks_in(dir: &std::path::Path, truncate: bool) -> ReportSinks {
    ReportSinks {
        summary_path: dir.join("summary.log"),
        detail_path: dir.join("detail.log"),
        truncate,
    }
}

#[test]
fn detail_log_has_one_header_per_host_in_order() {
    let dir = tmp_dir("fleet-report");
    let sinks = sinks_in(&dir, false);
    let reporter = Reporter::new(Logger::new("test"), Vec::new());
    reporter.report(&sample_run(), &sinks, &|_| None).unwrap();

    let detail = fs::read_to_string(&sinks.detail_path).unwrap();
    let headers: Vec<&str> = detail
        .lines()
        .filter(|line| line.starts_with("==== "))
        .collect();
    assert_eq!(headers.len(), 3);
    assert!(headers[0].contains("alpha.lan"));
    assert!(headers[1].contains("beta.lan"));
    assert!(headers[2].contains("gamma.lan"));
    assert!(detail.contains("apt broke"));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn summary_lines_are_tagged_and_annotated() {
    let dir = tmp_dir("fleet-report");
    let sinks = sinks_in(&dir, false);
    let reporter = Reporter::new(Logger::new("test"), Vec::new());
    reporter
        .report(&sample_run(), &sinks, &|result| {
            result
                .combined_output
                .strip_prefix("ram_mb=")
                .map(|ram| format!("ram={}MB", ram.trim()))
        })
        .unwrap();

    let summary = fs::read_to_string(&sinks.summary_path).unwrap();
    let lines: Vec<&str> = summary.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains(" OK alpha.lan ram=3792MB"));
    assert!(lines[1].contains(" FAIL beta.lan"));
    assert!(lines[2].contains(" OK gamma.lan"));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn logs_append_across_runs_unless_truncated() {
    let dir = tmp_dir("fleet-report");
    let sinks = sinks_in(&dir, false);
    let reporter = Reporter::new(Logger::new("test"), Vec::new());
    reporter.report(&sample_run(), &sinks, &|_| None).unwrap();
    reporter.report(&sample_run(), &sinks, &|_| None).unwrap();
    let summary = fs::read_to_string(&sinks.summary_path).unwrap();
    assert_eq!(summary.lines().count(), 6, "history must accumulate");

    let truncating = sinks_in(&dir, true);
    reporter.report(&sample_run(), &truncating, &|_| None).unwrap();
    let summary = fs::read_to_string(&truncating.summary_path).unwrap();
    assert_eq!(summary.lines().count(), 3, "truncation starts fresh");
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn secret_values_never_reach_the_logs() {
    let dir = tmp_dir("fleet-report");
    let sinks = sinks_in(&dir, false);
    let results = vec![OperationResult::remote(
        host("alpha"),
        0,
        "password=hunter2 plus literal t0ps3cret value\n".to_string(),
        Utc::now(),
    )];
    let run = BatchRun::from_results(uuid::Uuid::new_v4(), results);
    let reporter = Reporter::new(Logger::new("test"), vec!["t0ps3cret".to_string()]);
    reporter.report(&run, &sinks, &|_| None).unwrap();

    let detail = fs::read_to_string(&sinks.detail_path).unwrap();
    assert!(!detail.contains("hunter2"));
    assert!(!detail.contains("t0ps3cret"));
    assert!(detail.contains("***REDACTED***"));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn unwritable_sink_is_fatal() {
    let dir = tmp_dir("fleet-report");
    let sinks = ReportSinks {
        // A directory in place of the log file makes the open fail.
        summary_path: dir.clone(),
        detail_path: dir.join("detail.log"),
        truncate: false,
    };
    let reporter = Reporter::new(Logger::new("test"), Vec::new());
    let err = reporter.report(&sample_run(), &sinks, &|_| None).unwrap_err();
    assert_eq!(err.code, "IO");
    let _ = fs::remove_dir_all(&dir);
}
