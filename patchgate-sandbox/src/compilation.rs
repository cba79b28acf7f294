//! Full project build and test runs (CI style)

use crate::config::GateConfig;
use crate::error::{PatchResult, SandboxError};
use crate::profile::CompileProfile;
use crate::runtime::ContainerRunner;
use crate::staging::FileStager;
use crate::types::{ContainerJob, RunOutput};
use crate::workspace::{Sandbox, SandboxManager};
use patchgate_common::{BuildArtifact, CompilationResponse, Diagnostic, Engine, TestSummary};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

fn diagnostic_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^(?P<file>[^\r\n(]+)\((?P<line>\d+),(?P<column>\d+)\): error (?P<code>[A-Za-z0-9]+): (?P<message>[^\r\n]*)\r?$",
        )
        .ok()
    })
    .as_ref()
}

fn element_regex(tag: &'static str) -> Option<Regex> {
    Regex::new(&format!(r#"<{tag}\b((?:[^>"']|"[^"]*"|'[^']*')*)>"#)).ok()
}

fn test_run_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| element_regex("test-run")).as_ref()
}

fn test_case_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| element_regex("test-case")).as_ref()
}

fn attribute_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][\w.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).ok()
    })
    .as_ref()
}

fn entity_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&(#[xX][0-9A-Fa-f]+|#[0-9]+|lt|gt|amp|quot|apos);").ok())
        .as_ref()
}

/// Compiler errors of the form `file(line,column): error CODE: message`
pub fn parse_diagnostics(log: &str) -> Vec<Diagnostic> {
    let Some(re) = diagnostic_regex() else {
        return Vec::new();
    };
    re.captures_iter(log)
        .filter_map(|caps| {
            Some(Diagnostic {
                file: caps["file"].trim().to_string(),
                line: caps["line"].parse().ok()?,
                column: caps["column"].parse().ok()?,
                code: caps["code"].to_string(),
                message: caps["message"].trim_end().to_string(),
            })
        })
        .collect()
}

/// Totals and failing cases from an NUnit 3 results document.
///
/// Returns `None` when the document has no `<test-run>` element.
pub fn parse_test_results(xml: &str) -> Option<TestSummary> {
    let run = test_run_regex()?.captures(xml)?;
    let attrs = attributes(&run[1]);
    let count = |key: &str| attrs.get(key).and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);

    let failures = test_case_regex()?
        .captures_iter(xml)
        .map(|caps| attributes(&caps[1]))
        .filter(|case| case.get("result").map(String::as_str) == Some("Failed"))
        .filter_map(|mut case| case.remove("fullname").or_else(|| case.remove("name")))
        .collect();

    Some(TestSummary {
        total: count("total"),
        passed: count("passed"),
        failed: count("failed"),
        skipped: count("skipped"),
        failures,
    })
}

fn attributes(raw: &str) -> HashMap<String, String> {
    let Some(re) = attribute_regex() else {
        return HashMap::new();
    };
    re.captures_iter(raw)
        .map(|caps| {
            let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            (caps[1].to_string(), unescape(value))
        })
        .collect()
}

/// Resolve predefined and numeric character references in one pass
fn unescape(value: &str) -> String {
    let Some(re) = entity_regex() else {
        return value.to_string();
    };
    re.replace_all(value, |caps: &regex::Captures| {
        let entity = &caps[1];
        let resolved = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .map(|hex| u32::from_str_radix(hex, 16))
                .unwrap_or_else(|| entity[1..].parse::<u32>())
                .ok()
                .and_then(char::from_u32),
        };
        resolved.map_or_else(|| caps[0].to_string(), String::from)
    })
    .into_owned()
}

/// Files under `dir` with their sizes, relative to `root`, sorted by path
pub fn collect_artifacts(root: &Path, dir: &str, max_depth: usize) -> Vec<BuildArtifact> {
    let base = root.join(dir);
    if !base.is_dir() {
        return Vec::new();
    }
    let mut artifacts: Vec<BuildArtifact> = WalkDir::new(&base)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let size_bytes = entry.metadata().ok()?.len();
            let rel = entry.path().strip_prefix(root).ok()?;
            Some(BuildArtifact {
                path: rel.to_string_lossy().replace('\\', "/"),
                size_bytes,
            })
        })
        .collect();
    artifacts.sort_by(|a, b| a.path.cmp(&b.path));
    artifacts
}

/// Build then test a whole project in a disposable sandbox.
///
/// Tests only run when the build succeeded. The live tree is never written.
pub struct CompilationService {
    sandboxes: SandboxManager,
    stager: FileStager,
    runner: Arc<dyn ContainerRunner>,
    config: GateConfig,
}

impl CompilationService {
    pub fn new(sandboxes: SandboxManager, runner: Arc<dyn ContainerRunner>, config: GateConfig) -> Self {
        Self {
            sandboxes,
            stager: FileStager::new(),
            runner,
            config,
        }
    }

    pub async fn run(&self, live_root: &Path, engine: Engine) -> PatchResult<CompilationResponse> {
        let profile = CompileProfile::for_engine(engine, &self.config);
        let sandbox = self.sandboxes.create(&format!("compile-{engine}")).await?;
        info!(sandbox_id = %sandbox.id(), engine = %engine, "Starting compilation");

        let result = self.run_in(&sandbox, live_root, &profile).await;
        self.sandboxes.destroy(sandbox).await;
        result
    }

    async fn run_in(
        &self,
        sandbox: &Sandbox,
        live_root: &Path,
        profile: &CompileProfile,
    ) -> PatchResult<CompilationResponse> {
        self.stager
            .copy_in(live_root, sandbox.root(), &profile.stage_patterns)
            .await?;

        let build = self
            .exec(sandbox.root(), profile, &profile.build_commands, profile.build_timeout)
            .await?;
        let diagnostics = parse_diagnostics(&build.log);
        if !build.success() {
            warn!(
                sandbox_id = %sandbox.id(),
                exit_code = build.exit_code,
                timed_out = build.timed_out,
                errors = diagnostics.len(),
                "Build failed"
            );
            return Ok(CompilationResponse {
                success: false,
                compilation_output: build.log,
                test_output: None,
                diagnostics,
                test_summary: None,
                artifacts: Vec::new(),
                timed_out: build.timed_out,
            });
        }

        let artifacts = collect_artifacts(sandbox.root(), &profile.artifact_dir, profile.artifact_depth);
        let test = self
            .exec(sandbox.root(), profile, &profile.test_commands, profile.test_timeout)
            .await?;
        let test_summary = match profile.results_file(sandbox.root()) {
            Some(path) => read_results(&path).await,
            None => None,
        };
        let tests_passed = test.success() && test_summary.as_ref().map_or(true, |s| s.failed == 0);

        info!(
            sandbox_id = %sandbox.id(),
            success = tests_passed,
            artifacts = artifacts.len(),
            "Compilation finished"
        );
        Ok(CompilationResponse {
            success: tests_passed,
            compilation_output: build.log,
            test_output: Some(test.log),
            diagnostics,
            test_summary,
            artifacts,
            timed_out: test.timed_out,
        })
    }

    async fn exec(
        &self,
        sandbox_root: &Path,
        profile: &CompileProfile,
        commands: &[String],
        timeout: std::time::Duration,
    ) -> PatchResult<RunOutput> {
        let job = ContainerJob::new(&profile.image, sandbox_root)
            .with_commands(commands.iter().cloned())
            .with_work_dir(&profile.work_dir)
            .with_timeout(timeout)
            .with_limits(self.config.docker.limits.clone());
        debug!(image = %job.image, script = %job.script(), "Running compile job");
        Ok(self.runner.run(&job).await?)
    }
}

async fn read_results(path: &Path) -> Option<TestSummary> {
    let xml = match tokio::fs::read_to_string(path).await {
        Ok(xml) => xml,
        Err(e) => {
            warn!(error = %SandboxError::io(path, e), "Test results not available");
            return None;
        }
    };
    let summary = parse_test_results(&xml);
    if summary.is_none() {
        warn!(path = %path.display(), "Test results document has no test-run element");
    }
    summary
}
