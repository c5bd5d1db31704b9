//! Bare file name → locations index used to resolve `@name.ext` mentions.

use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};
use tracing::debug;

use crate::workspace::Workspace;

/// Names the index (and the mention syntax) understands: letters and
/// brackets, a dot, a letters-only extension.
static BARE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\[\]a-zA-Z]+\.[a-zA-Z]+").expect("valid bare name pattern"));

/// Extract the bare name (`name.ext`) from a path or URI.
///
/// Returns `None` when the final component doesn't start with the
/// `name.ext` pattern.
pub fn bare_name_of(location: &str) -> Option<&str> {
    let file_name = location.rsplit(['/', '\\']).next()?;
    BARE_NAME.find(file_name).map(|m| m.as_str())
}

/// Immutable snapshot mapping bare names to their locations.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    titles: HashMap<String, Vec<String>>,
}

impl FileIndex {
    /// Build an index from an enumeration of locations. Bucket order follows
    /// the enumeration; repeated locations are kept once.
    pub fn build<I, S>(locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut titles: HashMap<String, Vec<String>> = HashMap::new();
        for location in locations {
            let location = location.as_ref();
            let Some(name) = bare_name_of(location) else {
                continue;
            };
            let bucket = titles.entry(name.to_string()).or_default();
            if !bucket.iter().any(|l| l == location) {
                bucket.push(location.to_string());
            }
        }
        Self { titles }
    }

    /// Locations carrying `bare_name`; empty when unknown.
    pub fn candidates(&self, bare_name: &str) -> &[String] {
        self.titles
            .get(bare_name)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Number of distinct bare names.
    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

/// File system notifications forwarded by the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEvent {
    Created,
    Deleted,
    Changed,
}

/// Shared handle whose index is swapped wholesale on rebuild.
#[derive(Debug, Default)]
pub struct FileIndexHandle {
    current: RwLock<Arc<FileIndex>>,
}

impl FileIndexHandle {
    pub fn new(index: FileIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// The index as of now. Later rebuilds don't affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<FileIndex> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, index: FileIndex) {
        let index = Arc::new(index);
        match self.current.write() {
            Ok(mut guard) => *guard = index,
            Err(poisoned) => *poisoned.into_inner() = index,
        }
    }

    /// Re-enumerate the workspace and swap in a fresh index.
    /// Returns the number of bare names now indexed.
    pub async fn rebuild(&self, workspace: &dyn Workspace) -> Result<usize> {
        let files = workspace.list_candidate_files().await?;
        let index = FileIndex::build(&files);
        let names = index.len();
        debug!(files = files.len(), names, "rebuilt file index");
        self.replace(index);
        Ok(names)
    }

    /// React to a watcher notification. Returns whether a rebuild happened.
    pub async fn on_file_event(&self, event: FileEvent, workspace: &dyn Workspace) -> Result<bool> {
        match event {
            FileEvent::Created | FileEvent::Deleted => {
                self.rebuild(workspace).await?;
                Ok(true)
            }
            FileEvent::Changed => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ListedFiles(Mutex<Vec<String>>);

    #[async_trait]
    impl Workspace for ListedFiles {
        async fn list_candidate_files(&self) -> Result<Vec<String>> {
            Ok(self.0.lock().unwrap().clone())
        }

        async fn read_file(&self, location: &str) -> Result<String> {
            anyhow::bail!("not readable: {}", location)
        }
    }

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    #[test]
    fn test_bare_name_of() {
        assert_eq!(bare_name_of("/home/u/proj/src/foo.ts"), Some("foo.ts"));
        assert_eq!(bare_name_of("C:\\proj\\Bar.Rs"), Some("Bar.Rs"));
        assert_eq!(bare_name_of("/p/[id].tsx"), Some("[id].tsx"));
        assert_eq!(bare_name_of("/p/foo.test.ts"), Some("foo.test"));
        assert_eq!(bare_name_of("/p/Makefile"), None);
        assert_eq!(bare_name_of("/p/v2.ts"), None);
        assert_eq!(bare_name_of("/p/.env"), None);
    }

    #[test]
    fn test_build_groups_by_bare_name_in_order() {
        let index = FileIndex::build([
            "/a/foo.ts",
            "/b/bar.ts",
            "/c/foo.ts",
            "/a/foo.ts",
            "/d/README",
        ]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.candidates("foo.ts"), ["/a/foo.ts", "/c/foo.ts"]);
        assert_eq!(index.candidates("bar.ts"), ["/b/bar.ts"]);
        assert!(index.candidates("README").is_empty());
    }

    #[test]
    fn test_build_empty() {
        let index = FileIndex::build(Vec::<String>::new());
        assert!(index.is_empty());
    }

    #[test]
    fn test_names_are_case_preserving() {
        let index = FileIndex::build(["/a/Foo.ts", "/b/foo.ts"]);
        assert_eq!(index.candidates("Foo.ts"), ["/a/Foo.ts"]);
        assert_eq!(index.candidates("foo.ts"), ["/b/foo.ts"]);
    }

    #[test]
    fn test_rebuild_on_create_and_delete_only() {
        let workspace = ListedFiles(Mutex::new(vec!["/a/foo.ts".to_string()]));
        let handle = FileIndexHandle::default();
        let rt = rt();

        assert!(rt
            .block_on(handle.on_file_event(FileEvent::Created, &workspace))
            .unwrap());
        let before = handle.snapshot();
        assert_eq!(before.candidates("foo.ts").len(), 1);

        workspace.0.lock().unwrap().push("/b/foo.ts".to_string());
        assert!(!rt
            .block_on(handle.on_file_event(FileEvent::Changed, &workspace))
            .unwrap());
        assert_eq!(handle.snapshot().candidates("foo.ts").len(), 1);

        rt.block_on(handle.on_file_event(FileEvent::Created, &workspace))
            .unwrap();
        assert_eq!(handle.snapshot().candidates("foo.ts").len(), 2);
        // Old snapshots are untouched by the swap.
        assert_eq!(before.candidates("foo.ts").len(), 1);

        workspace.0.lock().unwrap().clear();
        rt.block_on(handle.on_file_event(FileEvent::Deleted, &workspace))
            .unwrap();
        assert!(handle.snapshot().is_empty());
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let workspace = ListedFiles(Mutex::new(vec![
            "/a/foo.ts".to_string(),
            "/b/foo.ts".to_string(),
        ]));
        let handle = FileIndexHandle::default();
        let rt = rt();
        let first = rt.block_on(handle.rebuild(&workspace)).unwrap();
        let second = rt.block_on(handle.rebuild(&workspace)).unwrap();
        assert_eq!(first, second);
        assert_eq!(handle.snapshot().candidates("foo.ts"), ["/a/foo.ts", "/b/foo.ts"]);
    }
}
