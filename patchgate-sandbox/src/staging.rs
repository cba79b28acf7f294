//! Glob-driven copying between a project tree and a sandbox

use crate::error::SandboxError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directories never descended into, at any depth
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "Library",
    "Temp",
    "Logs",
    "obj",
    "target",
    "node_modules",
];

/// Copies bounded subsets of a tree selected by include patterns.
///
/// Patterns are matched against `/`-separated paths relative to the source
/// root; `*` stays within one path component, `**` spans several. A pattern
/// matching nothing is not an error. Symlinks are never followed or copied.
#[derive(Debug, Clone)]
pub struct FileStager {
    excluded_dirs: Vec<String>,
}

impl Default for FileStager {
    fn default() -> Self {
        Self {
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FileStager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_excluded_dirs<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded_dirs: excluded.into_iter().map(Into::into).collect(),
        }
    }

    /// Copy the files required for validation from the live tree into a sandbox
    pub async fn copy_in(
        &self,
        live_root: &Path,
        sandbox_root: &Path,
        patterns: &[String],
    ) -> Result<Vec<PathBuf>, SandboxError> {
        self.copy_async(live_root, sandbox_root, patterns).await
    }

    /// Copy validated files from a sandbox back into the live tree.
    ///
    /// `files` are the relative paths the patch itself introduced; they are
    /// copied as named, without pattern matching or directory exclusions.
    /// Every file is first written next to its destination and then renamed
    /// into place. If any step fails, renames already done are undone and
    /// replaced files are restored before the error is returned.
    pub async fn copy_out(
        &self,
        sandbox_root: &Path,
        live_root: &Path,
        files: &[PathBuf],
    ) -> Result<Vec<PathBuf>, SandboxError> {
        let from = sandbox_root.to_path_buf();
        let to = live_root.to_path_buf();
        let mut files = files.to_vec();
        files.sort();
        files.dedup();
        tokio::task::spawn_blocking(move || {
            commit(&from, &to, &files)?;
            debug!(files = files.len(), to = %to.display(), "Committed patch files");
            Ok(files)
        })
        .await
        .map_err(|e| SandboxError::Join(e.to_string()))?
    }

    async fn copy_async(
        &self,
        from: &Path,
        to: &Path,
        patterns: &[String],
    ) -> Result<Vec<PathBuf>, SandboxError> {
        let stager = self.clone();
        let from = from.to_path_buf();
        let to = to.to_path_buf();
        let patterns = patterns.to_vec();
        tokio::task::spawn_blocking(move || stager.copy_matching(&from, &to, &patterns))
            .await
            .map_err(|e| SandboxError::Join(e.to_string()))?
    }

    /// Synchronous core of [`copy_in`](Self::copy_in).
    ///
    /// Returns the copied paths relative to the roots, sorted.
    pub fn copy_matching(
        &self,
        from: &Path,
        to: &Path,
        patterns: &[String],
    ) -> Result<Vec<PathBuf>, SandboxError> {
        let files = self.collect_matches(from, patterns)?;
        for rel in &files {
            let dest = to.join(rel);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| SandboxError::io(parent, e))?;
            }
            std::fs::copy(from.join(rel), &dest).map_err(|e| SandboxError::io(&dest, e))?;
        }
        debug!(
            files = files.len(),
            from = %from.display(),
            to = %to.display(),
            "Staged files"
        );
        Ok(files)
    }

    /// Regular files under `from` matching any pattern, relative and sorted
    pub fn collect_matches(
        &self,
        from: &Path,
        patterns: &[String],
    ) -> Result<Vec<PathBuf>, SandboxError> {
        if patterns.is_empty() {
            return Ok(Vec::new());
        }
        let set = build_globset(patterns)?;
        let mut hits = vec![0usize; patterns.len()];
        let mut matched_files = Vec::new();

        let walker = WalkDir::new(from)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !self
                        .excluded_dirs
                        .iter()
                        .any(|d| entry.file_name().to_string_lossy() == d.as_str())
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| from.to_path_buf());
                SandboxError::io(path, std::io::Error::other(e.to_string()))
            })?;
            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }

            let rel = match entry.path().strip_prefix(from) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let rel_str = to_slash(rel);
            let matched = set.matches(&rel_str);
            if matched.is_empty() {
                continue;
            }
            if file_type.is_symlink() {
                warn!(path = %rel_str, "Skipping symlink during staging");
                continue;
            }
            for idx in matched {
                hits[idx] += 1;
            }
            matched_files.push(rel.to_path_buf());
        }

        for (pattern, count) in patterns.iter().zip(&hits) {
            if *count == 0 {
                debug!(pattern = %pattern, from = %from.display(), "Pattern matched no files");
            }
        }

        matched_files.sort();
        Ok(matched_files)
    }
}

/// A destination moved aside while its replacement is renamed in
struct Committed {
    dest: PathBuf,
    backup: Option<PathBuf>,
}

/// Two-phase copy: stage every file beside its destination, then rename.
fn commit(from: &Path, to: &Path, files: &[PathBuf]) -> Result<(), SandboxError> {
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());
    if let Err(e) = stage_beside(from, to, files, &mut staged) {
        discard(staged.iter().map(|(tmp, _)| tmp));
        return Err(e);
    }

    let mut committed: Vec<Committed> = Vec::with_capacity(staged.len());
    for (idx, (tmp, dest)) in staged.iter().enumerate() {
        if let Err(e) = swap_in(tmp, dest, &mut committed) {
            rollback(&committed);
            discard(staged[idx..].iter().map(|(tmp, _)| tmp));
            return Err(e);
        }
    }
    discard(committed.iter().filter_map(|c| c.backup.as_ref()));
    Ok(())
}

fn swap_in(tmp: &Path, dest: &Path, committed: &mut Vec<Committed>) -> Result<(), SandboxError> {
    let backup = match std::fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_file() => {
            let backup = sibling(dest, "patchgate-bak");
            std::fs::rename(dest, &backup).map_err(|e| SandboxError::io(dest, e))?;
            Some(backup)
        }
        _ => None,
    };
    if let Err(e) = std::fs::rename(tmp, dest) {
        if let Some(backup) = &backup {
            let _ = std::fs::rename(backup, dest);
        }
        return Err(SandboxError::io(dest, e));
    }
    committed.push(Committed {
        dest: dest.to_path_buf(),
        backup,
    });
    Ok(())
}

fn rollback(committed: &[Committed]) {
    for entry in committed.iter().rev() {
        let restored = match &entry.backup {
            Some(backup) => std::fs::rename(backup, &entry.dest),
            None => std::fs::remove_file(&entry.dest),
        };
        if let Err(e) = restored {
            warn!(path = %entry.dest.display(), error = %e, "Failed to roll back patch file");
        }
    }
}

fn discard<'a>(paths: impl Iterator<Item = &'a PathBuf>) {
    for path in paths {
        let _ = std::fs::remove_file(path);
    }
}

/// `dir/.name.<suffix>` next to `path`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    path.with_file_name(format!(".{file_name}.{suffix}"))
}

fn stage_beside(
    from: &Path,
    to: &Path,
    files: &[PathBuf],
    staged: &mut Vec<(PathBuf, PathBuf)>,
) -> Result<(), SandboxError> {
    for rel in files {
        let src = from.join(rel);
        match std::fs::symlink_metadata(&src) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(SandboxError::NotAFile(rel.clone())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SandboxError::NotAFile(rel.clone()))
            }
            Err(e) => return Err(SandboxError::io(&src, e)),
        }
        let dest = to.join(rel);
        let parent = dest.parent().unwrap_or(to);
        std::fs::create_dir_all(parent).map_err(|e| SandboxError::io(parent, e))?;
        let tmp = sibling(&dest, "patchgate-tmp");
        std::fs::copy(&src, &tmp).map_err(|e| SandboxError::io(&tmp, e))?;
        staged.push((tmp, dest));
    }
    Ok(())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, SandboxError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| SandboxError::Pattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| SandboxError::Pattern {
        pattern: patterns.join(", "),
        reason: e.to_string(),
    })
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
