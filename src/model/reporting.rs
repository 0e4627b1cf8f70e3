//! Reporting types and the run summary renderer.

use serde::{Deserialize, Serialize};

use crate::{ExecutionResult, ExecutionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reporter {
    Pretty,
    Json,
}

impl clap::ValueEnum for Reporter {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Pretty, Self::Json]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Pretty => clap::builder::PossibleValue::new("pretty"),
            Self::Json => clap::builder::PossibleValue::new("json"),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: ExecutionStatus,
    #[serde(rename = "runId")]
    pub run_id: String,
    #[serde(rename = "strategyId")]
    pub strategy_id: String,
    #[serde(rename = "initialLength")]
    pub initial_length: usize,
    #[serde(rename = "finalLength")]
    pub final_length: usize,
    #[serde(rename = "operationsExecuted")]
    pub operations_executed: u64,
    #[serde(rename = "totalCost")]
    pub total_cost: u64,
    #[serde(rename = "startedAt")]
    pub started_at: String,
    #[serde(rename = "finishedAt")]
    pub finished_at: String,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    #[serde(rename = "resultPath", skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(rename = "finalBits")]
    pub final_bits: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    pub fn from_result(result: &ExecutionResult, started_at: String, finished_at: String, duration_ms: u64) -> Self {
        Self {
            status: result.status,
            run_id: result.id.clone(),
            strategy_id: result.strategy_id.clone(),
            initial_length: result.initial_bits.len(),
            final_length: result.final_bits.len(),
            operations_executed: result.steps.len() as u64,
            total_cost: result.total_cost(),
            started_at,
            finished_at,
            duration_ms,
            result_path: None,
            final_bits: result.final_bits.clone(),
            error: None,
        }
    }

    pub fn pretty(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "status={:?} runId={} strategy={}\n",
            self.status, self.run_id, self.strategy_id
        ));
        out.push_str(&format!(
            "ops={} cost={} length {} -> {} in {}ms\n",
            self.operations_executed,
            self.total_cost,
            self.initial_length,
            self.final_length,
            self.duration_ms
        ));
        out.push_str(&format!("final={}\n", self.final_bits));
        if let Some(path) = &self.result_path {
            out.push_str(&format!("result={path}\n"));
        }
        if let Some(error) = &self.error {
            out.push_str(&format!("error={error}\n"));
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_summary_mentions_the_essentials() {
        let result = ExecutionResult {
            id: "run-9".to_string(),
            strategy_id: "demo".to_string(),
            initial_bits: "1010".to_string(),
            final_bits: "0101".to_string(),
            steps: Vec::new(),
            status: ExecutionStatus::Completed,
        };
        let summary = RunSummary::from_result(
            &result,
            "2026-01-01T00:00:00Z".to_string(),
            "2026-01-01T00:00:01Z".to_string(),
            12,
        );
        let text = summary.pretty();
        assert!(text.contains("runId=run-9"));
        assert!(text.contains("final=0101"));
    }
}
