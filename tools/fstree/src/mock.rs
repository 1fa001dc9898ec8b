use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{BufRead, Cursor};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::filesystem::{FileSystem, FileSystemError, NodeKind, NodeMetadata, Result};

const MAX_LINK_HOPS: usize = 40;

#[derive(Debug, Clone)]
enum MockContent {
    File(Vec<u8>),
    Directory,
    Link(PathBuf),
    Special(NodeKind),
}

#[derive(Debug, Clone)]
struct MockNode {
    content: MockContent,
    mode: u32,
    uid: u32,
    gid: u32,
    modified: SystemTime,
    accessed: SystemTime,
}

impl MockNode {
    fn new(content: MockContent, mode: u32) -> Self {
        let now = SystemTime::now();
        Self {
            content,
            mode,
            uid: 1000,
            gid: 1000,
            modified: now,
            accessed: now,
        }
    }

    fn kind(&self) -> NodeKind {
        match &self.content {
            MockContent::File(_) => NodeKind::Regular,
            MockContent::Directory => NodeKind::Directory,
            MockContent::Link(_) => NodeKind::Link,
            MockContent::Special(kind) => *kind,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    nodes: BTreeMap<PathBuf, MockNode>,
    denied: BTreeSet<PathBuf>,
    users: HashMap<String, u32>,
    groups: HashMap<String, u32>,
}

impl MockState {
    fn node(&self, path: &Path) -> Result<&MockNode> {
        self.nodes
            .get(path)
            .ok_or_else(|| FileSystemError::NotFound(path.to_path_buf()))
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let mut current = path.to_path_buf();
        for _ in 0..MAX_LINK_HOPS {
            match &self.node(&current)?.content {
                MockContent::Link(target) => {
                    current = resolve_target(&current, target);
                }
                _ => return Ok(current),
            }
        }
        Err(FileSystemError::PathError(format!(
            "too many levels of symbolic links: {}",
            path.display()
        )))
    }

    fn ensure_writable(&self, path: &Path) -> Result<()> {
        if self.denied.contains(path) {
            return Err(FileSystemError::PermissionDenied(path.to_path_buf()));
        }
        Ok(())
    }

    fn ensure_parent_directory(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| FileSystemError::PathError(format!("no parent: {}", path.display())))?;
        match self.nodes.get(parent).map(MockNode::kind) {
            Some(NodeKind::Directory) => Ok(()),
            Some(_) => Err(FileSystemError::NotADirectory(parent.to_path_buf())),
            None => Err(FileSystemError::NotFound(parent.to_path_buf())),
        }
    }

    fn metadata_of(&self, path: &Path, node: &MockNode) -> NodeMetadata {
        let len = match &node.content {
            MockContent::File(content) => content.len() as u64,
            MockContent::Link(target) => target.as_os_str().len() as u64,
            _ => 0,
        };
        NodeMetadata {
            path: path.to_path_buf(),
            kind: node.kind(),
            mode: node.mode,
            uid: node.uid,
            gid: node.gid,
            len,
            modified: node.modified,
            accessed: node.accessed,
        }
    }
}

fn resolve_target(link: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        return target.to_path_buf();
    }
    let base = link.parent().unwrap_or_else(|| Path::new("/"));
    crate::path_utils::normalize_lossy(&base.join(target))
}

/// In-memory [`FileSystem`] used by tests.
///
/// Clones share the same state, so a test can keep a handle while the code
/// under test owns another.
#[derive(Debug, Clone)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut state = MockState::default();
        state
            .nodes
            .insert(PathBuf::from("/"), MockNode::new(MockContent::Directory, 0o755));
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a directory, creating missing ancestors.
    pub fn add_directory(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut state = self.state();
        for ancestor in path.ancestors().collect::<Vec<_>>().into_iter().rev() {
            state
                .nodes
                .entry(ancestor.to_path_buf())
                .or_insert_with(|| MockNode::new(MockContent::Directory, 0o755));
        }
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.add_directory(parent);
        }
        self.state().nodes.insert(
            path,
            MockNode::new(MockContent::File(content.into()), 0o644),
        );
    }

    pub fn add_link(&self, path: impl Into<PathBuf>, target: impl Into<PathBuf>) {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.add_directory(parent);
        }
        self.state()
            .nodes
            .insert(path, MockNode::new(MockContent::Link(target.into()), 0o777));
    }

    /// Adds a socket, fifo or device node.
    pub fn add_special(&self, path: impl Into<PathBuf>, kind: NodeKind) {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.add_directory(parent);
        }
        self.state()
            .nodes
            .insert(path, MockNode::new(MockContent::Special(kind), 0o644));
    }

    pub fn set_mode(&self, path: &Path, mode: u32) {
        if let Some(node) = self.state().nodes.get_mut(path) {
            node.mode = mode;
        }
    }

    /// Makes every mutating call on `path` fail with `PermissionDenied`.
    pub fn deny_writes(&self, path: impl Into<PathBuf>) {
        self.state().denied.insert(path.into());
    }

    pub fn allow_writes(&self, path: &Path) {
        self.state().denied.remove(path);
    }

    pub fn add_user(&self, name: &str, uid: u32) {
        self.state().users.insert(name.to_string(), uid);
    }

    pub fn add_group(&self, name: &str, gid: u32) {
        self.state().groups.insert(name.to_string(), gid);
    }

    pub fn get_file_content(&self, path: &Path) -> Option<Vec<u8>> {
        match &self.state().nodes.get(path)?.content {
            MockContent::File(content) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.state().nodes.contains_key(path)
    }

    pub fn list_all_paths(&self) -> Vec<PathBuf> {
        self.state().nodes.keys().cloned().collect()
    }
}

impl FileSystem for MockFileSystem {
    fn stat(&self, path: &Path) -> Result<NodeMetadata> {
        let state = self.state();
        let node = state.node(path)?;
        Ok(state.metadata_of(path, node))
    }

    fn metadata(&self, path: &Path) -> Result<NodeMetadata> {
        let state = self.state();
        let resolved = state.resolve(path)?;
        let node = state.node(&resolved)?;
        Ok(state.metadata_of(path, node))
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.state().nodes.contains_key(path))
    }

    fn list_children(&self, path: &Path) -> Result<Vec<String>> {
        let state = self.state();
        match state.node(path)?.kind() {
            NodeKind::Directory => {}
            _ => return Err(FileSystemError::NotADirectory(path.to_path_buf())),
        }

        // BTreeMap keys are sorted, so children come out in name order.
        Ok(state
            .nodes
            .keys()
            .filter(|candidate| candidate.parent() == Some(path))
            .filter_map(|candidate| candidate.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        match &self.state().node(path)?.content {
            MockContent::Link(target) => Ok(target.clone()),
            _ => Err(FileSystemError::PathError(format!(
                "not a link: {}",
                path.display()
            ))),
        }
    }

    fn mkdir(&self, path: &Path, mode: u32) -> Result<()> {
        let mut state = self.state();
        state.ensure_writable(path)?;
        if state.nodes.contains_key(path) {
            return Err(FileSystemError::AlreadyExists(path.to_path_buf()));
        }
        state.ensure_parent_directory(path)?;
        state
            .nodes
            .insert(path.to_path_buf(), MockNode::new(MockContent::Directory, mode));
        Ok(())
    }

    fn symlink(&self, source: &Path, dest: &Path) -> Result<()> {
        let mut state = self.state();
        state.ensure_writable(dest)?;
        if state.nodes.contains_key(dest) {
            return Err(FileSystemError::AlreadyExists(dest.to_path_buf()));
        }
        state.ensure_parent_directory(dest)?;
        state.nodes.insert(
            dest.to_path_buf(),
            MockNode::new(MockContent::Link(source.to_path_buf()), 0o777),
        );
        Ok(())
    }

    fn unlink(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        state.ensure_writable(path)?;
        if state.node(path)?.kind() == NodeKind::Directory {
            return Err(FileSystemError::PathError(format!(
                "is a directory: {}",
                path.display()
            )));
        }
        state.nodes.remove(path);
        Ok(())
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        state.ensure_writable(path)?;
        if state.node(path)?.kind() != NodeKind::Directory {
            return Err(FileSystemError::NotADirectory(path.to_path_buf()));
        }
        if state.nodes.keys().any(|p| p.parent() == Some(path)) {
            return Err(FileSystemError::PathError(format!(
                "directory not empty: {}",
                path.display()
            )));
        }
        state.nodes.remove(path);
        Ok(())
    }

    fn chmod(&self, path: &Path, mode: u32) -> Result<()> {
        let mut state = self.state();
        state.ensure_writable(path)?;
        let resolved = state.resolve(path)?;
        if let Some(node) = state.nodes.get_mut(&resolved) {
            node.mode = mode & 0o7777;
        }
        Ok(())
    }

    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<()> {
        let mut state = self.state();
        state.ensure_writable(path)?;
        let node = state
            .nodes
            .get_mut(path)
            .ok_or_else(|| FileSystemError::NotFound(path.to_path_buf()))?;
        if let Some(uid) = uid {
            node.uid = uid;
        }
        if let Some(gid) = gid {
            node.gid = gid;
        }
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let state = self.state();
        let resolved = state.resolve(path)?;
        match &state.node(&resolved)?.content {
            MockContent::File(content) => Ok(content.clone()),
            _ => Err(FileSystemError::PathError(format!(
                "not a regular file: {}",
                path.display()
            ))),
        }
    }

    fn open(&self, path: &Path) -> Result<Box<dyn BufRead + Send>> {
        let content = self.read_file(path)?;
        Ok(Box::new(Cursor::new(content)))
    }

    fn write_file(&self, path: &Path, contents: &[u8], append: bool) -> Result<()> {
        let mut state = self.state();
        let resolved = match state.resolve(path) {
            Ok(resolved) => resolved,
            Err(FileSystemError::NotFound(_)) => path.to_path_buf(),
            Err(e) => return Err(e),
        };
        state.ensure_writable(&resolved)?;

        if !state.nodes.contains_key(&resolved) {
            state.ensure_parent_directory(&resolved)?;
            state
                .nodes
                .insert(resolved.clone(), MockNode::new(MockContent::File(Vec::new()), 0o644));
        }

        let node = state
            .nodes
            .get_mut(&resolved)
            .ok_or_else(|| FileSystemError::NotFound(resolved.clone()))?;
        match &mut node.content {
            MockContent::File(existing) => {
                if !append {
                    existing.clear();
                }
                existing.extend_from_slice(contents);
                node.modified = SystemTime::now();
                Ok(())
            }
            _ => Err(FileSystemError::PathError(format!(
                "not a regular file: {}",
                path.display()
            ))),
        }
    }

    fn copy_file(&self, source: &Path, dest: &Path) -> Result<()> {
        let mut state = self.state();
        let resolved = state.resolve(source)?;
        let source_node = state.node(&resolved)?.clone();
        let content = match source_node.content {
            MockContent::File(content) => content,
            _ => {
                return Err(FileSystemError::PathError(format!(
                    "not a regular file: {}",
                    source.display()
                )))
            }
        };

        state.ensure_writable(dest)?;
        match state.nodes.get(dest).map(MockNode::kind) {
            Some(NodeKind::Directory) => {
                return Err(FileSystemError::PathError(format!(
                    "is a directory: {}",
                    dest.display()
                )))
            }
            Some(_) => {}
            None => state.ensure_parent_directory(dest)?,
        }

        state.nodes.insert(
            dest.to_path_buf(),
            MockNode::new(MockContent::File(content), source_node.mode),
        );
        Ok(())
    }

    fn is_readable(&self, path: &Path) -> bool {
        let state = self.state();
        state
            .resolve(path)
            .ok()
            .and_then(|resolved| state.nodes.get(&resolved))
            .map(|node| node.mode & 0o400 != 0)
            .unwrap_or(false)
    }

    fn is_writable(&self, path: &Path) -> bool {
        let state = self.state();
        if state.denied.contains(path) {
            return false;
        }
        state
            .resolve(path)
            .ok()
            .and_then(|resolved| state.nodes.get(&resolved))
            .map(|node| node.mode & 0o200 != 0)
            .unwrap_or(false)
    }

    fn resolve_user(&self, name: &str) -> Result<u32> {
        self.state()
            .users
            .get(name)
            .copied()
            .ok_or_else(|| FileSystemError::PathError(format!("unknown user: {name}")))
    }

    fn resolve_group(&self, name: &str) -> Result<u32> {
        self.state()
            .groups
            .get(name)
            .copied()
            .ok_or_else(|| FileSystemError::PathError(format!("unknown group: {name}")))
    }

    fn set_times(&self, path: &Path, accessed: SystemTime, modified: SystemTime) -> Result<()> {
        let mut state = self.state();
        let node = state
            .nodes
            .get_mut(path)
            .ok_or_else(|| FileSystemError::NotFound(path.to_path_buf()))?;
        node.accessed = accessed;
        node.modified = modified;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_file_creates_parent_directories() {
        let fs = MockFileSystem::new();
        fs.add_file("/a/b/c.txt", "hello");

        assert_eq!(fs.stat(Path::new("/a")).unwrap().kind, NodeKind::Directory);
        assert_eq!(fs.stat(Path::new("/a/b")).unwrap().kind, NodeKind::Directory);
        assert_eq!(fs.list_children(Path::new("/a/b")).unwrap(), vec!["c.txt"]);
    }

    #[test]
    fn test_relative_link_targets_resolve_against_the_link_directory() {
        let fs = MockFileSystem::new();
        fs.add_file("/data/real.txt", "payload");
        fs.add_link("/data/links/alias", "../real.txt");

        let alias = Path::new("/data/links/alias");
        assert_eq!(fs.stat(alias).unwrap().kind, NodeKind::Link);
        assert_eq!(fs.metadata(alias).unwrap().kind, NodeKind::Regular);
        assert_eq!(fs.read_file(alias).unwrap(), b"payload");
    }

    #[test]
    fn test_denied_paths_reject_mutation() {
        let fs = MockFileSystem::new();
        fs.add_file("/locked.txt", "x");
        fs.deny_writes("/locked.txt");

        let path = Path::new("/locked.txt");
        assert!(!fs.is_writable(path));
        assert!(matches!(
            fs.unlink(path),
            Err(FileSystemError::PermissionDenied(_))
        ));
        assert!(fs.contains(path));
    }

    #[test]
    fn test_rmdir_refuses_non_empty_directories() {
        let fs = MockFileSystem::new();
        fs.add_file("/dir/file.txt", "x");

        assert!(fs.rmdir(Path::new("/dir")).is_err());
        fs.unlink(Path::new("/dir/file.txt")).unwrap();
        fs.rmdir(Path::new("/dir")).unwrap();
        assert!(!fs.contains(Path::new("/dir")));
    }
}
