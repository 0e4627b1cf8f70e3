//! Replay verification: prove a recorded execution reconstructs the
//! expected final buffer.
//!
//! Two strategies, both first-class:
//!
//! - `TrustStored` walks the recorded steps taking each step's own `after`
//!   buffer as ground truth and compares only the final reconstruction.
//!   The tolerance policy applies here.
//! - `Reexecute` (the default) re-applies every step's operation with its
//!   *recorded* resolved parameters and demands an exact match at every
//!   step and at the end; any drift is a hard failure naming the offending
//!   step.
//!
//! A mismatch is a result value, never an error, so batch verification can
//! sweep many results without interruption.

use serde::{Deserialize, Serialize};

use crate::{ExecutionResult, OpRegistry, Params, TransformationStep, content_hash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStrategy {
    TrustStored,
    Reexecute,
}

impl clap::ValueEnum for ReplayStrategy {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::TrustStored, Self::Reexecute]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::TrustStored => clap::builder::PossibleValue::new("trust-stored"),
            Self::Reexecute => clap::builder::PossibleValue::new("reexecute"),
        })
    }
}

/// Named tolerance configuration instead of an inline heuristic. Only
/// `TrustStored` honors `ToleratePercent`; re-execution is always exact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TolerancePolicy {
    Exact,
    ToleratePercent(f64),
}

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub strategy: ReplayStrategy,
    pub tolerance: TolerancePolicy,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            strategy: ReplayStrategy::Reexecute,
            tolerance: TolerancePolicy::Exact,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub verified: bool,
    pub strategy: ReplayStrategy,
    #[serde(rename = "mismatchCount")]
    pub mismatch_count: u64,
    #[serde(rename = "lengthDelta")]
    pub length_delta: i64,
    #[serde(rename = "firstMismatch", skip_serializing_if = "Option::is_none")]
    pub first_mismatch: Option<usize>,
    #[serde(rename = "failedStep", skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
    #[serde(rename = "failedOperation", skip_serializing_if = "Option::is_none")]
    pub failed_operation: Option<String>,
    #[serde(rename = "stepsChecked")]
    pub steps_checked: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl VerificationReport {
    fn pass(strategy: ReplayStrategy, steps_checked: u64, warning: Option<String>) -> Self {
        Self {
            verified: true,
            strategy,
            mismatch_count: 0,
            length_delta: 0,
            first_mismatch: None,
            failed_step: None,
            failed_operation: None,
            steps_checked,
            warning,
        }
    }
}

/// Positional diff between two buffers: differing positions over the
/// common prefix, the length delta, and the first differing index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDiff {
    pub mismatch_count: u64,
    pub length_delta: i64,
    pub first_mismatch: Option<usize>,
}

pub fn diff_buffers(actual: &str, expected: &str) -> BufferDiff {
    // Hash short-circuit: identical content almost always returns here.
    if actual.len() == expected.len() && content_hash(actual) == content_hash(expected) && actual == expected {
        return BufferDiff {
            mismatch_count: 0,
            length_delta: 0,
            first_mismatch: None,
        };
    }

    let mut mismatch_count = 0u64;
    let mut first_mismatch = None;
    for (i, (a, b)) in actual.bytes().zip(expected.bytes()).enumerate() {
        if a != b {
            mismatch_count += 1;
            if first_mismatch.is_none() {
                first_mismatch = Some(i);
            }
        }
    }
    let length_delta = actual.len() as i64 - expected.len() as i64;
    if first_mismatch.is_none() && length_delta != 0 {
        first_mismatch = Some(actual.len().min(expected.len()));
    }
    BufferDiff {
        mismatch_count,
        length_delta,
        first_mismatch,
    }
}

pub fn verify(
    ops: &OpRegistry,
    initial_bits: &str,
    steps: &[TransformationStep],
    expected_final_bits: &str,
    opt: &VerifyOptions,
) -> VerificationReport {
    match opt.strategy {
        ReplayStrategy::TrustStored => trust_stored(initial_bits, steps, expected_final_bits, opt),
        ReplayStrategy::Reexecute => reexecute(ops, initial_bits, steps, expected_final_bits),
    }
}

/// Convenience wrapper over a whole recorded result.
pub fn verify_result(
    ops: &OpRegistry,
    result: &ExecutionResult,
    opt: &VerifyOptions,
) -> VerificationReport {
    verify(ops, &result.initial_bits, &result.steps, &result.final_bits, opt)
}

fn trust_stored(
    initial_bits: &str,
    steps: &[TransformationStep],
    expected_final_bits: &str,
    opt: &VerifyOptions,
) -> VerificationReport {
    let reconstructed = steps
        .last()
        .map(|s| s.full_after_bits.as_str())
        .unwrap_or(initial_bits);
    let diff = diff_buffers(reconstructed, expected_final_bits);

    if diff.mismatch_count == 0 && diff.length_delta == 0 {
        return VerificationReport::pass(ReplayStrategy::TrustStored, steps.len() as u64, None);
    }

    if let TolerancePolicy::ToleratePercent(percent) = opt.tolerance
        && diff.length_delta == 0
        && !expected_final_bits.is_empty()
    {
        let ratio = diff.mismatch_count as f64 / expected_final_bits.len() as f64 * 100.0;
        if ratio < percent {
            return VerificationReport::pass(
                ReplayStrategy::TrustStored,
                steps.len() as u64,
                Some(format!(
                    "passed with warning: {} of {} bit(s) differ ({ratio:.3}% < {percent}%)",
                    diff.mismatch_count,
                    expected_final_bits.len()
                )),
            );
        }
    }

    VerificationReport {
        verified: false,
        strategy: ReplayStrategy::TrustStored,
        mismatch_count: diff.mismatch_count,
        length_delta: diff.length_delta,
        first_mismatch: diff.first_mismatch,
        failed_step: None,
        failed_operation: None,
        steps_checked: steps.len() as u64,
        warning: None,
    }
}

fn reexecute(
    ops: &OpRegistry,
    initial_bits: &str,
    steps: &[TransformationStep],
    expected_final_bits: &str,
) -> VerificationReport {
    let mut current = initial_bits.to_string();

    for (checked, step) in steps.iter().enumerate() {
        let replayed = match replay_step(ops, &current, step) {
            Ok(bits) => bits,
            Err(err) => {
                return VerificationReport {
                    verified: false,
                    strategy: ReplayStrategy::Reexecute,
                    mismatch_count: 0,
                    length_delta: 0,
                    first_mismatch: None,
                    failed_step: Some(step.index),
                    failed_operation: Some(step.operation.clone()),
                    steps_checked: checked as u64,
                    warning: Some(format!("step {} failed to re-execute: {err}", step.index)),
                };
            }
        };

        let diff = diff_buffers(&replayed, &step.full_after_bits);
        if diff.mismatch_count != 0 || diff.length_delta != 0 {
            return VerificationReport {
                verified: false,
                strategy: ReplayStrategy::Reexecute,
                mismatch_count: diff.mismatch_count,
                length_delta: diff.length_delta,
                first_mismatch: diff.first_mismatch,
                failed_step: Some(step.index),
                failed_operation: Some(step.operation.clone()),
                steps_checked: checked as u64 + 1,
                warning: None,
            };
        }
        current = replayed;
    }

    let diff = diff_buffers(&current, expected_final_bits);
    if diff.mismatch_count != 0 || diff.length_delta != 0 {
        return VerificationReport {
            verified: false,
            strategy: ReplayStrategy::Reexecute,
            mismatch_count: diff.mismatch_count,
            length_delta: diff.length_delta,
            first_mismatch: diff.first_mismatch,
            failed_step: None,
            failed_operation: None,
            steps_checked: steps.len() as u64,
            warning: None,
        };
    }

    VerificationReport::pass(ReplayStrategy::Reexecute, steps.len() as u64, None)
}

/// Re-apply one recorded step with its recorded resolved parameters,
/// never re-resolved, so implicit choices made at record time are honored
/// exactly. The reserved `exec` step id re-evaluates its recorded script
/// under the recorded budget.
fn replay_step(
    ops: &OpRegistry,
    current: &str,
    step: &TransformationStep,
) -> Result<String, String> {
    if step.operation == "exec" {
        let code = step
            .params
            .value
            .as_deref()
            .ok_or_else(|| "exec step is missing its recorded script".to_string())?;
        let budget = step.params.count.unwrap_or(4096);
        return crate::script::evaluate(code, current, budget).map_err(|e| e.to_string());
    }
    let mut params: Params = step.params.clone();
    params.range = step.bit_range;
    ops.apply(&step.operation, current, &params)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MetricRegistry, Session, SessionOptions};

    fn record(script: &[&str], bits: &str) -> (Vec<TransformationStep>, String) {
        let ops = OpRegistry::standard();
        let metrics = MetricRegistry::standard();
        let mut session = Session::new(&ops, &metrics, SessionOptions::default());
        let mut current = bits.to_string();
        for line in script {
            let out = session.execute_line(line, &current);
            assert!(out.success, "recording setup failed on {line:?}: {:?}", out.error);
            current = out.bits;
        }
        (session.take_steps(), current)
    }

    #[test]
    fn reexecute_passes_on_faithful_recording() {
        let ops = OpRegistry::standard();
        let (steps, final_bits) = record(
            &["not | rol 3", "shuffle", "REPEAT 2 { scramble }", "EXEC { rev(bits) }"],
            "1011001110001111",
        );
        let report = verify(&ops, "1011001110001111", &steps, &final_bits, &VerifyOptions::default());
        assert!(report.verified, "report: {report:?}");
        assert_eq!(report.mismatch_count, 0);
        assert_eq!(report.steps_checked, steps.len() as u64);
    }

    #[test]
    fn reexecute_flags_tampered_step_with_its_index() {
        let ops = OpRegistry::standard();
        let (mut steps, final_bits) = record(&["not", "rev", "not"], "110010");
        steps[1].full_after_bits = "111111".to_string();
        let report = verify(&ops, "110010", &steps, &final_bits, &VerifyOptions::default());
        assert!(!report.verified);
        assert_eq!(report.failed_step, Some(1));
        assert_eq!(report.failed_operation.as_deref(), Some("rev"));
        assert!(report.mismatch_count > 0);
    }

    #[test]
    fn reexecute_requires_exact_final_match() {
        let ops = OpRegistry::standard();
        let (steps, final_bits) = record(&["not"], "1010");
        let mut wrong = final_bits.clone();
        wrong.replace_range(0..1, if &final_bits[0..1] == "0" { "1" } else { "0" });
        let report = verify(&ops, "1010", &steps, &wrong, &VerifyOptions::default());
        assert!(!report.verified);
        assert_eq!(report.mismatch_count, 1);
        assert_eq!(report.first_mismatch, Some(0));
    }

    #[test]
    fn trust_stored_tolerates_small_drift_with_warning() {
        let ops = OpRegistry::standard();
        let (steps, final_bits) = record(&["not"], &"10".repeat(100));
        let mut drifted = final_bits.clone();
        drifted.replace_range(0..1, if &final_bits[0..1] == "0" { "1" } else { "0" });

        let exact = verify(
            &ops,
            &"10".repeat(100),
            &steps,
            &drifted,
            &VerifyOptions {
                strategy: ReplayStrategy::TrustStored,
                tolerance: TolerancePolicy::Exact,
            },
        );
        assert!(!exact.verified);
        assert_eq!(exact.mismatch_count, 1);

        let tolerant = verify(
            &ops,
            &"10".repeat(100),
            &steps,
            &drifted,
            &VerifyOptions {
                strategy: ReplayStrategy::TrustStored,
                tolerance: TolerancePolicy::ToleratePercent(1.0),
            },
        );
        assert!(tolerant.verified);
        assert!(tolerant.warning.unwrap().contains("passed with warning"));
    }

    #[test]
    fn trust_stored_never_tolerates_length_drift() {
        let ops = OpRegistry::standard();
        let (steps, final_bits) = record(&["not"], "1010");
        let longer = format!("{final_bits}0");
        let report = verify(
            &ops,
            "1010",
            &steps,
            &longer,
            &VerifyOptions {
                strategy: ReplayStrategy::TrustStored,
                tolerance: TolerancePolicy::ToleratePercent(50.0),
            },
        );
        assert!(!report.verified);
        assert_eq!(report.length_delta, -1);
    }

    #[test]
    fn empty_step_list_verifies_against_initial() {
        let ops = OpRegistry::standard();
        let report = verify(&ops, "0101", &[], "0101", &VerifyOptions::default());
        assert!(report.verified);
        let report = verify(&ops, "0101", &[], "1111", &VerifyOptions::default());
        assert!(!report.verified);
    }

    #[test]
    fn diff_buffers_reports_positions_and_length() {
        let d = diff_buffers("10101", "10001");
        assert_eq!(d.mismatch_count, 1);
        assert_eq!(d.first_mismatch, Some(2));
        assert_eq!(d.length_delta, 0);

        let d = diff_buffers("101", "10");
        assert_eq!(d.length_delta, 1);
        assert_eq!(d.first_mismatch, Some(2));
    }
}
