//! Recorded execution results and the `.bfx` result file format.
//!
//! A result carries everything replay verification needs: the initial
//! buffer, every step's fully resolved parameters and before/after
//! snapshots, and the final buffer. Steps are never mutated after they are
//! recorded.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::path::Path;

use crate::{BitRange, BitfluxError, BitfluxResult, VersionInfo};

pub const CURRENT_RESULT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    Cancelled,
}

/// One executed operation, snapshotted by the recorder after the operation
/// finished. `params` is always the *resolved* set: the exact mask/seed
/// that was applied, never the caller's partial input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationStep {
    pub index: usize,
    pub operation: String,
    pub params: crate::Params,
    #[serde(rename = "bitRange", skip_serializing_if = "Option::is_none")]
    pub bit_range: Option<BitRange>,
    #[serde(rename = "fullBeforeBits")]
    pub full_before_bits: String,
    #[serde(rename = "fullAfterBits")]
    pub full_after_bits: String,
    pub metrics: BTreeMap<String, f64>,
    pub cost: u64,
    #[serde(rename = "durationMicros")]
    pub duration_micros: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub id: String,
    #[serde(rename = "strategyId")]
    pub strategy_id: String,
    #[serde(rename = "initialBits")]
    pub initial_bits: String,
    #[serde(rename = "finalBits")]
    pub final_bits: String,
    pub steps: Vec<TransformationStep>,
    pub status: ExecutionStatus,
}

impl ExecutionResult {
    pub fn total_cost(&self) -> u64 {
        self.steps.iter().map(|s| s.cost).sum()
    }
}

/// On-disk wrapper: format tag, schema version, engine version, payload,
/// whole-file checksum over the canonical (checksum-less) encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultFile {
    pub format: String,
    pub version: u32,
    pub engine: VersionInfo,
    #[serde(rename = "startedAt")]
    pub started_at: String,
    #[serde(rename = "finishedAt")]
    pub finished_at: String,
    pub result: ExecutionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl ResultFile {
    pub fn new(result: ExecutionResult, started_at: String, finished_at: String) -> Self {
        Self {
            format: "bitflux-result".to_string(),
            version: CURRENT_RESULT_VERSION,
            engine: crate::version_info(),
            started_at,
            finished_at,
            result,
            checksum: None,
        }
    }

    pub fn write_json(&self, path: &Path) -> BitfluxResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut with_checksum = self.clone();
        with_checksum.checksum = None;
        let canonical = serde_json::to_vec(&with_checksum)?;
        with_checksum.checksum = Some(blake3::hash(&canonical).to_hex().to_string());
        let bytes = serde_json::to_vec_pretty(&with_checksum)?;

        // Atomic replace to avoid concurrent writer corruption on shared paths.
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("result.bfx");
        let tmp_name = format!(
            ".{file_name}.{}.{}.tmp",
            std::process::id(),
            uuid::Uuid::new_v4()
        );
        let tmp_path = parent.join(tmp_name);
        std::fs::write(&tmp_path, bytes)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> BitfluxResult<Self> {
        let bytes = std::fs::read(path)?;
        let file: ResultFile = serde_json::from_slice(&bytes).map_err(|e| {
            BitfluxError::ResultFile(format!("failed to parse result {}: {e}", path.display()))
        })?;
        verify_checksum(&file, path)?;
        Ok(file)
    }
}

pub fn result_schema_warnings(version: u32) -> Vec<String> {
    if version < CURRENT_RESULT_VERSION {
        vec![format!(
            "result schema v{version} is stale; current schema is v{CURRENT_RESULT_VERSION}"
        )]
    } else {
        Vec::new()
    }
}

fn verify_checksum(file: &ResultFile, path: &Path) -> BitfluxResult<()> {
    let Some(expected) = file.checksum.as_ref() else {
        return Ok(());
    };
    let mut canonical = file.clone();
    canonical.checksum = None;
    let bytes = serde_json::to_vec(&canonical)?;
    let got = blake3::hash(&bytes).to_hex().to_string();
    if &got != expected {
        return Err(BitfluxError::ResultFile(format!(
            "result checksum mismatch for {} (expected {expected}, got {got})",
            path.display()
        )));
    }
    Ok(())
}
