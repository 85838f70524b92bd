//! Filesystem actions and the journal that applies and undoes them.

use std::{
    fs::Permissions,
    io,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::fs_util;

/// One change to the target areas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsAction {
    /// Create (or repoint) a symlink at `path` to `target`.
    Link { path: PathBuf, target: PathBuf },
    /// Create (or replace) the file at `path` with `contents`. Without
    /// explicit `permissions` the replaced file's permissions are kept.
    Write {
        path: PathBuf,
        contents: Vec<u8>,
        permissions: Option<Permissions>,
    },
}

impl FsAction {
    pub fn path(&self) -> &Path {
        match self {
            Self::Link { path, .. } | Self::Write { path, .. } => path,
        }
    }
}

/// What occupied a path before an action touched it.
#[derive(Debug, Clone)]
enum Prior {
    Absent,
    File {
        bytes: Vec<u8>,
        permissions: Permissions,
    },
    Link(PathBuf),
}

#[derive(Debug)]
enum Entry {
    Dir(PathBuf),
    Path { path: PathBuf, prior: Prior },
}

/// Applied actions, in order, with enough state to undo them.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<Entry>,
    applied: usize,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of actions applied so far.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Apply `action`, recording what it replaced.
    pub fn apply(&mut self, action: &FsAction) -> io::Result<()> {
        let path = action.path();
        if let Some(parent) = path.parent() {
            self.create_dirs(parent)?;
        }

        let prior = capture(path)?;
        let kept = match &prior {
            Prior::File { permissions, .. } => Some(permissions.clone()),
            _ => None,
        };
        if !matches!(prior, Prior::Absent) {
            fs_util::remove_path(path)?;
        }
        // Recorded before the write so a half-written file is still undone.
        self.entries.push(Entry::Path {
            path: path.to_path_buf(),
            prior,
        });

        match action {
            FsAction::Link { path, target } => fs_util::symlink_dir(target, path)?,
            FsAction::Write {
                path,
                contents,
                permissions,
            } => write_atomic(path, contents, permissions.as_ref().or(kept.as_ref()))?,
        }
        self.applied += 1;
        debug!(path = %path.display(), "applied action");
        Ok(())
    }

    /// Undo every applied action in reverse order. Best effort: failures are
    /// logged and returned.
    pub fn rollback(self) -> Vec<(PathBuf, io::Error)> {
        let mut failures = Vec::new();
        for entry in self.entries.into_iter().rev() {
            match entry {
                Entry::Dir(dir) => {
                    // Only empty directories are removed; anything else was
                    // populated outside this run.
                    let _ = std::fs::remove_dir(&dir);
                },
                Entry::Path { path, prior } => {
                    if let Err(e) = restore(&path, prior) {
                        warn!(path = %path.display(), error = %e, "rollback step failed");
                        failures.push((path, e));
                    }
                },
            }
        }
        failures
    }

    fn create_dirs(&mut self, dir: &Path) -> io::Result<()> {
        let missing: Vec<&Path> = dir
            .ancestors()
            .take_while(|d| !d.as_os_str().is_empty() && std::fs::symlink_metadata(d).is_err())
            .collect();
        for d in missing.into_iter().rev() {
            match std::fs::create_dir(d) {
                Ok(()) => self.entries.push(Entry::Dir(d.to_path_buf())),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {},
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn capture(path: &Path) -> io::Result<Prior> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Prior::Absent),
        Err(e) => return Err(e),
    };
    if meta.file_type().is_symlink() {
        Ok(Prior::Link(std::fs::read_link(path)?))
    } else if meta.is_dir() {
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} is a directory", path.display()),
        ))
    } else {
        Ok(Prior::File {
            bytes: std::fs::read(path)?,
            permissions: meta.permissions(),
        })
    }
}

fn restore(path: &Path, prior: Prior) -> io::Result<()> {
    fs_util::remove_path(path)?;
    match prior {
        Prior::Absent => Ok(()),
        Prior::File { bytes, permissions } => {
            std::fs::write(path, bytes)?;
            std::fs::set_permissions(path, permissions)
        },
        Prior::Link(target) => fs_util::symlink_dir(&target, path),
    }
}

/// Write via a sibling temp file and rename into place. `permissions` are
/// applied to the temp file before the rename.
pub(crate) fn write_atomic(
    path: &Path,
    contents: &[u8],
    permissions: Option<&Permissions>,
) -> io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    std::fs::write(&tmp, contents)?;
    let placed = match permissions {
        Some(permissions) => std::fs::set_permissions(&tmp, permissions.clone()),
        None => Ok(()),
    }
    .and_then(|()| std::fs::rename(&tmp, path));
    placed.inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}
