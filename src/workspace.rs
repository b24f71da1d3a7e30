//! Per-job working directories for the local engine.
//!
//! Every job gets a directory named by a fresh random UUID under the
//! configured root. The directory is created with `create_dir` (not
//! `create_dir_all`), so an existing path is an error rather than a silent
//! reuse: two jobs can never end up sharing a workspace.
//!
//! ```text
//! /tmp/cloakjob/
//! ├── 3f0c…e1/            # one job
//! │   ├── input.png       # staged, normalized input
//! │   └── input_cloaked.png
//! └── 9a41…07/            # another, concurrently running job
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File name the normalized input is staged under.
pub const INPUT_FILENAME: &str = "input.png";

/// Exclusive handle to one job's directory.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    path: PathBuf,
}

impl Workspace {
    /// Create a new, empty workspace under `root`.
    ///
    /// `root` is created if missing. The returned path is absolute so it can
    /// be handed to a child process regardless of its working directory.
    pub fn allocate(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let id = Uuid::new_v4();
        let path = root.join(id.to_string());
        fs::create_dir(&path)?;
        let path = fs::canonicalize(&path)?;
        tracing::debug!(workspace = %path.display(), "allocated workspace");
        Ok(Self { id, path })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `bytes` to `name` directly inside the workspace.
    pub fn stage(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let target = self.path.join(name);
        fs::write(&target, bytes)?;
        Ok(target)
    }

    /// Remove every subdirectory (recursively), keeping top-level files.
    ///
    /// Run before each engine invocation so nested output left by an earlier
    /// attempt in this workspace can't be mistaken for the current result.
    pub fn reset(&self) -> io::Result<()> {
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                tracing::debug!(dir = %entry.path().display(), "removing stale output directory");
                fs::remove_dir_all(entry.path())?;
            }
        }
        Ok(())
    }

    /// Delete the workspace and everything in it.
    pub fn remove(self) -> io::Result<()> {
        fs::remove_dir_all(&self.path)
    }
}
