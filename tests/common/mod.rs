//! Common test utilities shared across integration tests

pub mod fixtures;

pub use fixtures::*;

use patchgate_sandbox::testing::{StubContainerRunner, StubHostRunner};
use patchgate_sandbox::{
    CompilationService, EngineRegistry, GateConfig, HttpAssetFetcher, PatchApplier, SandboxManager,
};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Setup logging for tests
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// SHA-256 of every regular file under `root`, keyed by `/`-separated relative path
pub fn hash_tree(root: &Path) -> BTreeMap<String, String> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            let bytes = std::fs::read(e.path()).unwrap();
            let digest = Sha256::digest(&bytes);
            let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
            (rel, hex)
        })
        .collect()
}

/// Paths added, removed or modified between two tree hashes
pub fn changed_paths(
    before: &BTreeMap<String, String>,
    after: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut changed: Vec<String> = after
        .iter()
        .filter(|(path, hash)| before.get(*path) != Some(*hash))
        .map(|(path, _)| path.clone())
        .chain(before.keys().filter(|p| !after.contains_key(*p)).cloned())
        .collect();
    changed.sort();
    changed.dedup();
    changed
}

pub fn test_config() -> GateConfig {
    let mut config = GateConfig::default();
    config.unity.editor_path = Some("/opt/unity/Editor/Unity".to_string());
    config
}

/// Wires stub runners into the real orchestrators.
pub struct Harness {
    pub sandbox_dir: TempDir,
    pub containers: Arc<StubContainerRunner>,
    pub host: Arc<StubHostRunner>,
    pub config: GateConfig,
}

impl Harness {
    pub fn new(containers: StubContainerRunner, host: StubHostRunner) -> Self {
        setup_test_logging();
        Self {
            sandbox_dir: tempfile::tempdir().unwrap(),
            containers: Arc::new(containers),
            host: Arc::new(host),
            config: test_config(),
        }
    }

    /// Every stage succeeds
    pub fn passing() -> Self {
        Self::new(StubContainerRunner::new(), StubHostRunner::new())
    }

    pub fn sandbox_root(&self) -> PathBuf {
        self.sandbox_dir.path().join("sandboxes")
    }

    pub fn applier(&self) -> PatchApplier {
        let registry =
            EngineRegistry::from_config(&self.config, self.containers.clone(), self.host.clone());
        let assets = HttpAssetFetcher::new(&self.config.assets).unwrap();
        PatchApplier::new(SandboxManager::new(self.sandbox_root()), registry, Arc::new(assets))
    }

    pub fn compiler(&self) -> CompilationService {
        CompilationService::new(
            SandboxManager::new(self.sandbox_root()),
            self.containers.clone(),
            self.config.clone(),
        )
    }

    /// Sandboxes still present on disk
    pub fn live_sandboxes(&self) -> usize {
        std::fs::read_dir(self.sandbox_root())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}
