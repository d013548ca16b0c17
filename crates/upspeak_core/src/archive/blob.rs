//! File-per-node blob store.
//!
//! # Layout
//! - `<root>/<node-id>`: body of a standalone node.
//! - `<root>/<thread-id>/<node-id>`: body of a node relocated into a thread.
//!   A thread root lives at `<root>/<thread-id>/<thread-id>`.
//!
//! # Invariants
//! - Relocation removes the top-level file, so a top-level blob is never older
//!   than a relocated copy of the same node.
//! - Removing an absent file or directory is not an error.
//! - Which thread directory holds a relocated blob is recorded by the caller;
//!   the store never searches for it.

use crate::archive::{ArchiveError, ArchiveResult};
use crate::model::node::NodeId;
use crate::model::thread::ThreadId;
use log::{debug, warn};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const PROMOTING_SUFFIX: &str = ".promoting";

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Opens the store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> ArchiveResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(io_error("failed to create archive directory", &root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn top_level_path(&self, node_id: NodeId) -> PathBuf {
        self.root.join(node_id.to_string())
    }

    pub fn thread_dir(&self, thread_id: ThreadId) -> PathBuf {
        self.root.join(thread_id.to_string())
    }

    pub fn thread_path(&self, thread_id: ThreadId, node_id: NodeId) -> PathBuf {
        self.thread_dir(thread_id).join(node_id.to_string())
    }

    fn path_for(&self, node_id: NodeId, location: Option<ThreadId>) -> PathBuf {
        match location {
            Some(thread_id) => self.thread_path(thread_id, node_id),
            None => self.top_level_path(node_id),
        }
    }

    /// Writes the node's blob at `location`, the top level when `None`.
    ///
    /// Writing into a thread directory also drops a leftover top-level copy so
    /// it cannot shadow the new content.
    pub fn write(
        &self,
        node_id: NodeId,
        location: Option<ThreadId>,
        bytes: &[u8],
    ) -> ArchiveResult<()> {
        if let Some(thread_id) = location {
            self.create_thread_dir(thread_id)?;
            remove_optional(&self.top_level_path(node_id))?;
        }
        let path = self.path_for(node_id, location);
        fs::write(&path, bytes).map_err(io_error("failed to save node content", &path))
    }

    /// Reads the node's blob: the top level first, then `location`.
    pub fn read_first(
        &self,
        node_id: NodeId,
        location: Option<ThreadId>,
    ) -> ArchiveResult<Option<Vec<u8>>> {
        if let Some(bytes) = read_optional(&self.top_level_path(node_id))? {
            return Ok(Some(bytes));
        }
        match location {
            Some(thread_id) => read_optional(&self.thread_path(thread_id, node_id)),
            None => Ok(None),
        }
    }

    /// Removes the node's blob from the top level and from `location`.
    pub fn remove(&self, node_id: NodeId, location: Option<ThreadId>) -> ArchiveResult<()> {
        remove_optional(&self.top_level_path(node_id))?;
        if let Some(thread_id) = location {
            remove_optional(&self.thread_path(thread_id, node_id))?;
        }
        Ok(())
    }

    pub fn create_thread_dir(&self, thread_id: ThreadId) -> ArchiveResult<()> {
        let dir = self.thread_dir(thread_id);
        fs::create_dir_all(&dir).map_err(io_error("failed to create thread directory", &dir))
    }

    /// Turns `<root>/<thread-id>` into the thread directory.
    ///
    /// A root node saved standalone owns a file at that path. The file is moved
    /// aside, the directory created, and the file moved in as
    /// `<root>/<thread-id>/<thread-id>`. A file left aside by an interrupted
    /// promotion is moved in on the next call.
    pub fn promote_thread_dir(&self, thread_id: ThreadId) -> ArchiveResult<()> {
        let dir = self.thread_dir(thread_id);
        let aside = self.root.join(format!("{thread_id}{PROMOTING_SUFFIX}"));
        if dir.is_file() {
            fs::rename(&dir, &aside).map_err(io_error("failed to move root content aside", &aside))?;
        }
        self.create_thread_dir(thread_id)?;
        if aside.is_file() {
            let to = self.thread_path(thread_id, thread_id);
            fs::rename(&aside, &to).map_err(io_error("failed to move root content into thread", &to))?;
            debug!("event=blob_promote module=archive status=ok thread_id={thread_id}");
        }
        Ok(())
    }

    pub fn remove_thread_dir(&self, thread_id: ThreadId) -> ArchiveResult<()> {
        let dir = self.thread_dir(thread_id);
        if !dir.is_dir() {
            return Ok(());
        }
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error("failed to delete thread directory", &dir)(err)),
        }
    }

    /// Moves the top-level blob of `node_id` into the thread directory.
    ///
    /// Returns `false` when there is no top-level blob to move. Falls back to
    /// copy-then-delete when a rename is not possible.
    pub fn relocate_into_thread(&self, thread_id: ThreadId, node_id: NodeId) -> ArchiveResult<bool> {
        let from = self.top_level_path(node_id);
        if !from.is_file() {
            return Ok(false);
        }
        let to = self.thread_path(thread_id, node_id);

        if let Err(err) = fs::rename(&from, &to) {
            warn!(
                "event=blob_relocate module=archive status=fallback node_id={} thread_id={} error={}",
                node_id, thread_id, err
            );
            fs::copy(&from, &to).map_err(io_error("failed to copy node content into thread", &to))?;
            remove_optional(&from)?;
        }
        Ok(true)
    }
}

/// A thread root's top-level path is its thread directory, so directories
/// read and remove as absent blobs.
fn read_optional(path: &Path) -> ArchiveResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound || path.is_dir() => Ok(None),
        Err(err) => Err(io_error("failed to read node content", path)(err)),
    }
}

fn remove_optional(path: &Path) -> ArchiveResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound || path.is_dir() => Ok(()),
        Err(err) => Err(io_error("failed to delete node content", path)(err)),
    }
}

fn io_error(context: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError {
    let path = path.to_path_buf();
    move |source| ArchiveError::Io {
        context,
        path,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::BlobStore;
    use crate::model::new_id;

    #[test]
    fn relocation_moves_blob_and_reads_fall_back_to_thread_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        let (thread_id, node_id) = (new_id(), new_id());

        store.write(node_id, None, b"\"body\"").unwrap();
        store.create_thread_dir(thread_id).unwrap();
        assert!(store.relocate_into_thread(thread_id, node_id).unwrap());
        assert!(!store.top_level_path(node_id).exists());
        assert!(store.thread_path(thread_id, node_id).exists());

        assert_eq!(store.read_first(node_id, None).unwrap(), None);
        assert_eq!(
            store.read_first(node_id, Some(thread_id)).unwrap().as_deref(),
            Some(&b"\"body\""[..])
        );
        assert!(!store.relocate_into_thread(thread_id, node_id).unwrap());
    }

    #[test]
    fn promoting_a_standalone_root_moves_its_file_inside() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        let thread_id = new_id();
        store.write(thread_id, None, b"\"root\"").unwrap();

        store.promote_thread_dir(thread_id).unwrap();

        assert!(store.thread_dir(thread_id).is_dir());
        assert_eq!(
            store.read_first(thread_id, Some(thread_id)).unwrap().as_deref(),
            Some(&b"\"root\""[..])
        );
        store.promote_thread_dir(thread_id).unwrap();
    }

    #[test]
    fn thread_directory_reads_and_removes_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        let thread_id = new_id();
        store.create_thread_dir(thread_id).unwrap();

        assert_eq!(store.read_first(thread_id, None).unwrap(), None);
        store.remove(thread_id, Some(thread_id)).unwrap();
        assert!(store.thread_dir(thread_id).is_dir());
    }

    #[test]
    fn removing_absent_blobs_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        store.remove(new_id(), Some(new_id())).unwrap();
        store.remove_thread_dir(new_id()).unwrap();
    }
}
