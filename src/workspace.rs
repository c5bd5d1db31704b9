//! Workspace access: enumerating mentionable files and reading them.
//!
//! The editor normally supplies these; `LocalWorkspace` is the filesystem
//! version used by the terminal front end.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::config::IndexConfig;

/// File access the mention resolver and the index depend on.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Every location that may be referenced by `@name.ext`, in enumeration order.
    async fn list_candidate_files(&self) -> Result<Vec<String>>;

    /// Read a location's text content.
    async fn read_file(&self, location: &str) -> Result<String>;
}

/// A directory tree on the local filesystem.
pub struct LocalWorkspace {
    root: PathBuf,
    exclude: IndexConfig,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>, exclude: IndexConfig) -> Self {
        Self {
            root: root.into(),
            exclude,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_excluded_dir(&self, name: &str) -> bool {
        self.exclude.exclude_dirs.iter().any(|d| d == name)
    }

    fn is_excluded_file(&self, name: &str) -> bool {
        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        self.exclude
            .exclude_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
            || self
                .exclude
                .exclude_name_fragments
                .iter()
                .any(|f| name.contains(f.as_str()))
    }
}

#[async_trait]
impl Workspace for LocalWorkspace {
    async fn list_candidate_files(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        if !root.is_dir() {
            anyhow::bail!("Workspace root is not a directory: {}", root.display());
        }
        // read_dir is blocking; keep it off the async workers.
        let walker = LocalWorkspace {
            root: root.clone(),
            exclude: self.exclude.clone(),
        };
        tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            collect_files(&walker, &root, &mut files)?;
            Ok(files)
        })
        .await
        .context("File enumeration task panicked")?
    }

    async fn read_file(&self, location: &str) -> Result<String> {
        tokio::fs::read_to_string(location)
            .await
            .with_context(|| format!("Failed to read file: {}", location))
    }
}

fn collect_files(workspace: &LocalWorkspace, dir: &Path, files: &mut Vec<String>) -> Result<()> {
    let mut dir_entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|e| e.ok())
        .collect();

    dir_entries.sort_by_key(|e| e.file_name());

    for entry in dir_entries {
        let name = entry.file_name().to_string_lossy().to_string();
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(_) => continue,
        };

        if file_type.is_dir() {
            if !workspace.is_excluded_dir(&name) {
                collect_files(workspace, &entry.path(), files)?;
            }
        } else if file_type.is_file() && !workspace.is_excluded_file(&name) {
            files.push(entry.path().to_string_lossy().to_string());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    fn touch(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_lists_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.ts"), "b");
        touch(&dir.path().join("a.ts"), "a");
        touch(&dir.path().join("src/main.rs"), "fn main() {}");
        touch(&dir.path().join("node_modules/dep/index.js"), "x");
        touch(&dir.path().join("logo.png"), "png");
        touch(&dir.path().join("my_module.rs"), "skip");
        touch(&dir.path().join("tsconfig.json"), "{}");

        let workspace = LocalWorkspace::new(dir.path(), IndexConfig::default());
        let files = rt().block_on(workspace.list_candidate_files()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| {
                Path::new(f)
                    .strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();

        assert_eq!(names, vec!["a.ts", "b.ts", "src/main.rs"]);
    }

    #[test]
    fn test_read_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.ts");
        touch(&path, "export x");
        let workspace = LocalWorkspace::new(dir.path(), IndexConfig::default());

        let rt = rt();
        let text = rt
            .block_on(workspace.read_file(path.to_str().unwrap()))
            .unwrap();
        assert_eq!(text, "export x");

        let missing = dir.path().join("nope.ts");
        let err = rt
            .block_on(workspace.read_file(missing.to_str().unwrap()))
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read file"));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let workspace = LocalWorkspace::new("/tmp/__sidechat_no_such_root__", IndexConfig::default());
        assert!(rt().block_on(workspace.list_candidate_files()).is_err());
    }
}
