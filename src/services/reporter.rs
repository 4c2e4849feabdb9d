use crate::errors::FleetError;
use crate::managers::executor::OperationResult;
use crate::managers::orchestrator::BatchRun;
use crate::services::logger::Logger;
use crate::utils::fs_atomic::ensure_dir_for_file;
use crate::utils::redact::redact_text;
use crate::utils::text::truncate_annotation;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Caller-supplied log destinations. Both files accumulate history across
/// runs unless `truncate` is set.
#[derive(Debug, Clone)]
pub struct ReportSinks {
    pub summary_path: PathBuf,
    pub detail_path: PathBuf,
    pub truncate: bool,
}

/// Writes the forensic trail: a full transcript per host in the detail log,
/// one tagged line per host in the summary log, and a console recap. A sink
/// that cannot be written aborts the run — the audit trail is the product.
pub struct Reporter {
    logger: Logger,
    extra_secrets: Vec<String>,
}

impl Reporter {
    pub fn new(logger: Logger, extra_secrets: Vec<String>) -> Self {
        Self {
            logger: logger.child("report"),
            extra_secrets,
        }
    }

    pub fn report(
        &self,
        run: &BatchRun,
        sinks: &ReportSinks,
        annotate: &dyn Fn(&OperationResult) -> Option<String>,
    ) -> Result<(), FleetError> {
        let mut summary = self.open_sink(&sinks.summary_path, sinks.truncate)?;
        let mut detail = self.open_sink(&sinks.detail_path, sinks.truncate)?;

        for result in &run.results {
            let timestamp = result.finished_at.to_rfc3339();
            let tag = if result.success() { "OK" } else { "FAIL" };

            writeln!(
                detail,
                "==== {} | {} | run {} | exit {} ====",
                result.host.canonical_address, timestamp, run.run_id, result.exit_code
            )
            .map_err(|err| self.sink_error(&sinks.detail_path, err))?;
            let transcript = redact_text(&result.combined_output, Some(&self.extra_secrets));
            writeln!(detail, "{}", transcript.trim_end_matches('\n'))
                .map_err(|err| self.sink_error(&sinks.detail_path, err))?;
            writeln!(detail).map_err(|err| self.sink_error(&sinks.detail_path, err))?;

            let mut line = format!("{} {} {}", timestamp, tag, result.host.canonical_address);
            if let Some(annotation) = annotate(result) {
                let annotation = truncate_annotation(&redact_text(
                    &annotation,
                    Some(&self.extra_secrets),
                ));
                if !annotation.is_empty() {
                    line.push(' ');
                    line.push_str(&annotation);
                }
            }
            writeln!(summary, "{}", line)
                .map_err(|err| self.sink_error(&sinks.summary_path, err))?;
        }
        summary
            .flush()
            .map_err(|err| self.sink_error(&sinks.summary_path, err))?;
        detail
            .flush()
            .map_err(|err| self.sink_error(&sinks.detail_path, err))?;

        self.print_console(run, sinks);
        Ok(())
    }

    fn open_sink(&self, path: &PathBuf, truncate: bool) -> Result<std::fs::File, FleetError> {
        ensure_dir_for_file(path).map_err(|err| self.sink_error(path, err))?;
        let mut options = OpenOptions::new();
        options.create(true).write(true);
        if truncate {
            options.truncate(true);
        } else {
            options.append(true);
        }
        options.open(path).map_err(|err| self.sink_error(path, err))
    }

    fn sink_error(&self, path: &PathBuf, err: std::io::Error) -> FleetError {
        self.logger.error(
            "log sink failed",
            Some(&serde_json::json!({ "path": path.display().to_string() })),
        );
        FleetError::io(format!("Cannot write log {}: {}", path.display(), err))
    }

    fn print_console(&self, run: &BatchRun, sinks: &ReportSinks) {
        let succeeded = run.succeeded_hosts();
        let failed = run.failed_hosts();
        println!();
        println!(
            "{} host(s) succeeded, {} failed",
            run.success_count, run.failure_count
        );
        if !succeeded.is_empty() {
            println!("  ok:   {}", succeeded.join(" "));
        }
        if !failed.is_empty() {
            println!("  fail: {}", failed.join(" "));
        }
        println!("summary: {}", sinks.summary_path.display());
        println!("detail:  {}", sinks.detail_path.display());
    }
}
