//! Top-level engine: script execution, result recording, determinism
//! auditing, and batch verification of stored results.

use uuid::Uuid;

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use crate::{
    BitfluxError, BitfluxResult, Config, ExecutionResult, ExecutionStatus, MetricRegistry,
    OpRegistry, ResultFile, RunSummary, Session, SessionOptions, VerificationReport, VerifyOptions,
    result_schema_warnings,
};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Default seed preferred over content derivation for operations whose
    /// seed the command line left implicit. `None` keeps the pure
    /// content-derived behavior.
    pub seed: Option<u64>,
    /// Record the execution result (`.bfx`) to this path.
    pub record_to: Option<PathBuf>,
    /// Strategy identifier stored in the result; defaults to the script
    /// file stem or `"adhoc"`.
    pub strategy_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub result: ExecutionResult,
}

/// Execute a strategy script (one command per line; `#` comments and blank
/// lines ignored) against `initial_bits`.
pub fn run_script(
    config: &Config,
    script: &Path,
    initial_bits: &str,
    opt: &RunOptions,
) -> BitfluxResult<RunOutcome> {
    let text = std::fs::read_to_string(script).map_err(|e| {
        BitfluxError::Script(format!("failed to read script {}: {e}", script.display()))
    })?;
    let lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();
    let strategy_id = opt.strategy_id.clone().unwrap_or_else(|| {
        script
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("script")
            .to_string()
    });
    run_lines(config, &strategy_id, &lines, initial_bits, opt)
}

/// Execute a single command line (the `exec` subcommand).
pub fn exec_command(
    config: &Config,
    line: &str,
    initial_bits: &str,
    opt: &RunOptions,
) -> BitfluxResult<RunOutcome> {
    let strategy_id = opt.strategy_id.clone().unwrap_or_else(|| "adhoc".to_string());
    let lines = vec![line.to_string()];
    run_lines(config, &strategy_id, &lines, initial_bits, opt)
}

pub fn run_lines(
    config: &Config,
    strategy_id: &str,
    lines: &[String],
    initial_bits: &str,
    opt: &RunOptions,
) -> BitfluxResult<RunOutcome> {
    crate::validate(initial_bits).map_err(BitfluxError::InvalidArgument)?;

    let ops = OpRegistry::standard();
    let metrics = MetricRegistry::standard();
    let mut session = Session::new(
        &ops,
        &metrics,
        SessionOptions {
            default_seed: opt.seed,
            cost_ceiling: config.cost_ceiling,
            script_step_budget: config.script_step_budget,
        },
    );

    let started_at = wall_time_iso_utc();
    let started = Instant::now();

    let mut current = initial_bits.to_string();
    let mut status = ExecutionStatus::Completed;
    let mut error = None;

    for line in lines {
        let outcome = session.execute_line(line, &current);
        current = outcome.bits;
        if !outcome.success {
            status = if session.cost_exhausted() {
                ExecutionStatus::Cancelled
            } else {
                ExecutionStatus::Failed
            };
            error = outcome.error;
            break;
        }
    }

    let finished_at = wall_time_iso_utc();
    let duration_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;

    let result = ExecutionResult {
        id: Uuid::new_v4().to_string(),
        strategy_id: strategy_id.to_string(),
        initial_bits: initial_bits.to_string(),
        final_bits: current,
        steps: session.take_steps(),
        status,
    };

    let mut summary =
        RunSummary::from_result(&result, started_at.clone(), finished_at.clone(), duration_ms);
    summary.error = error;

    if let Some(record_to) = &opt.record_to {
        let file = ResultFile::new(result.clone(), started_at, finished_at);
        file.write_json(record_to)?;
        summary.result_path = Some(record_to.to_string_lossy().to_string());
        tracing::debug!(path = %record_to.display(), "recorded execution result");
    }

    Ok(RunOutcome { summary, result })
}

#[derive(Debug, Clone)]
pub struct AuditOptions {
    pub runs: u32,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuditReport {
    pub script: String,
    pub runs: u32,
    pub consistent: bool,
    pub signatures: Vec<String>,
    #[serde(rename = "firstMismatchRun", skip_serializing_if = "Option::is_none")]
    pub first_mismatch_run: Option<u32>,
}

/// Re-run the same script and input N times and compare run signatures.
/// Any divergence means something nondeterministic leaked into the engine.
pub fn audit(
    config: &Config,
    script: &Path,
    initial_bits: &str,
    opt: &AuditOptions,
) -> BitfluxResult<AuditReport> {
    let runs = opt.runs.max(2);
    let run_opt = RunOptions {
        seed: opt.seed,
        record_to: None,
        strategy_id: None,
    };

    let mut signatures = Vec::with_capacity(runs as usize);
    let mut consistent = true;
    let mut first_mismatch_run = None;
    let mut baseline: Option<String> = None;

    for i in 0..runs {
        let outcome = run_script(config, script, initial_bits, &run_opt)?;
        let sig = run_signature(&outcome.result);
        if let Some(b) = &baseline {
            if b != &sig && first_mismatch_run.is_none() {
                consistent = false;
                first_mismatch_run = Some(i + 1);
            }
        } else {
            baseline = Some(sig.clone());
        }
        signatures.push(sig);
    }

    Ok(AuditReport {
        script: script.display().to_string(),
        runs,
        consistent,
        signatures,
        first_mismatch_run,
    })
}

/// Deterministic digest of everything replay depends on. Run ids and step
/// durations are deliberately excluded.
fn run_signature(result: &ExecutionResult) -> String {
    let steps: Vec<serde_json::Value> = result
        .steps
        .iter()
        .map(|s| {
            serde_json::json!({
                "operation": s.operation,
                "params": s.params,
                "bitRange": s.bit_range,
                "after": s.full_after_bits,
                "cost": s.cost,
            })
        })
        .collect();
    let payload = serde_json::json!({
        "status": result.status,
        "initialBits": result.initial_bits,
        "finalBits": result.final_bits,
        "steps": steps,
    });
    let encoded = serde_json::to_vec(&payload).unwrap_or_default();
    blake3::hash(&encoded).to_hex().to_string()
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FileVerification {
    pub path: String,
    pub report: VerificationReport,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Verify one stored result file.
pub fn verify_result_file(path: &Path, opt: &VerifyOptions) -> BitfluxResult<FileVerification> {
    let file = ResultFile::read_json(path)?;
    let ops = OpRegistry::standard();
    let report = crate::verify_result(&ops, &file.result, opt);
    Ok(FileVerification {
        path: path.display().to_string(),
        report,
        warnings: result_schema_warnings(file.version),
    })
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BatchVerifyEntry {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<VerificationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BatchVerifyReport {
    pub total: usize,
    pub verified: usize,
    pub failed: usize,
    pub entries: Vec<BatchVerifyEntry>,
}

/// Verify every result file matching `globs`. Results are independent, so
/// verification is parallel across files; within one result the step walk
/// stays sequential.
pub fn verify_batch(
    globs: &[String],
    opt: &VerifyOptions,
    jobs: Option<usize>,
) -> BitfluxResult<BatchVerifyReport> {
    let patterns = if globs.is_empty() {
        vec!["**/*.bfx".to_string()]
    } else {
        globs.to_vec()
    };
    let paths = crate::find_matching_files(&patterns)?;
    if paths.is_empty() {
        return Err(BitfluxError::InvalidArgument(format!(
            "no result files matched (patterns={patterns:?})"
        )));
    }

    let workers = jobs
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
        .clamp(1, paths.len());

    let entries = Mutex::new(Vec::with_capacity(paths.len()));
    std::thread::scope(|scope| {
        let entries = &entries;
        for chunk in paths.chunks(paths.len().div_ceil(workers)) {
            scope.spawn(move || {
                let mut local = Vec::with_capacity(chunk.len());
                for path in chunk {
                    local.push(verify_one_entry(path, opt));
                }
                if let Ok(mut shared) = entries.lock() {
                    shared.extend(local);
                }
            });
        }
    });

    let mut entries = entries.into_inner().unwrap_or_default();
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    let verified = entries
        .iter()
        .filter(|e| e.report.as_ref().is_some_and(|r| r.verified))
        .count();
    Ok(BatchVerifyReport {
        total: entries.len(),
        verified,
        failed: entries.len() - verified,
        entries,
    })
}

fn verify_one_entry(path: &Path, opt: &VerifyOptions) -> BatchVerifyEntry {
    match verify_result_file(path, opt) {
        Ok(v) => BatchVerifyEntry {
            path: v.path,
            report: Some(v.report),
            error: None,
            warnings: v.warnings,
        },
        Err(err) => BatchVerifyEntry {
            path: path.display().to_string(),
            report: None,
            error: Some(err.to_string()),
            warnings: Vec::new(),
        },
    }
}

/// Wall-clock metadata (startedAt/finishedAt), never an execution input.
/// `SystemTime` avoids the `time` crate's implicit local timezone issues.
pub fn wall_time_iso_utc() -> String {
    let now = std::time::SystemTime::now();
    let dt: time::OffsetDateTime = now.into();
    dt.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
