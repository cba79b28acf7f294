//! Validation, apply and compilation outcomes exposed to downstream callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of the validation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Format,
    Analyze,
    Compile,
}

impl Stage {
    /// Fixed execution order
    pub const ALL: [Stage; 3] = [Stage::Format, Stage::Analyze, Stage::Compile];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Format => "format",
            Stage::Analyze => "analyze",
            Stage::Compile => "compile",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one attempted stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub stage: Stage,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_output: Option<String>,
    /// The stage was killed after exceeding its time budget
    #[serde(default)]
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ValidationResult {
    pub fn passed(stage: Stage, duration_ms: u64) -> Self {
        Self {
            stage,
            success: true,
            error_output: None,
            timed_out: false,
            duration_ms,
        }
    }

    pub fn failed(stage: Stage, log: impl Into<String>, timed_out: bool, duration_ms: u64) -> Self {
        Self {
            stage,
            success: false,
            error_output: Some(log.into()),
            timed_out,
            duration_ms,
        }
    }
}

/// Aggregate of the stages attempted by a validator.
///
/// `failing_stage` is set iff `success` is false; no stage after it was run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failing_stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub results: Vec<ValidationResult>,
}

impl PipelineOutcome {
    /// Fold stage results in order, stopping at the first failure.
    pub fn from_results(results: Vec<ValidationResult>) -> Self {
        match results.iter().find(|r| !r.success) {
            Some(failed) => Self {
                success: false,
                failing_stage: Some(failed.stage),
                log: failed.error_output.clone(),
                timed_out: failed.timed_out,
                results,
            },
            None => Self {
                success: true,
                failing_stage: None,
                log: None,
                timed_out: false,
                results,
            },
        }
    }

    /// Stages that were actually run, in order
    pub fn attempted(&self) -> Vec<Stage> {
        self.results.iter().map(|r| r.stage).collect()
    }
}

/// Response of an `apply` call as seen by downstream collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_log: Option<String>,
    /// `validation`, `timeout`, `infrastructure` or `invalid_patch`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Project-relative paths written into the live tree
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied_files: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

impl ApplyResponse {
    pub fn applied(applied_files: Vec<String>) -> Self {
        Self {
            success: true,
            stage: None,
            error_log: None,
            error_kind: None,
            applied_files,
            finished_at: Utc::now(),
        }
    }

    pub fn rejected(kind: &str, stage: Option<Stage>, error_log: impl Into<String>) -> Self {
        Self {
            success: false,
            stage,
            error_log: Some(error_log.into()),
            error_kind: Some(kind.to_string()),
            applied_files: Vec::new(),
            finished_at: Utc::now(),
        }
    }
}

/// A compiler error located in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub code: String,
    pub message: String,
}

/// Totals from a structured test-results document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Full names of failing test cases
    #[serde(default)]
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArtifact {
    pub path: String,
    pub size_bytes: u64,
}

/// Result of a full build + test run.
///
/// `test_output` is absent when the build failed before tests could run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationResponse {
    pub success: bool,
    pub compilation_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_output: Option<String>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_summary: Option<TestSummary>,
    #[serde(default)]
    pub artifacts: Vec<BuildArtifact>,
    #[serde(default)]
    pub timed_out: bool,
}
