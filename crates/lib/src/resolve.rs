//! Path resolution: pick the directory a validated command lists and check it is usable.
//!
//! The target is the first positional argument joined onto the sandbox root (absolute
//! positionals replace the root), or the root itself when there is none. The child runs
//! from the root with the caller's own tokens, so relative paths mean the same thing to
//! the checks here and to the child, and the root's host path never shows up in output.

use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

use crate::command::{Arg, ValidatedCommand};
use crate::error::ListingError;

/// Per-request result of resolution: where to run and with which argv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// The listed directory; exists and is a directory.
    pub dir: PathBuf,
    /// Working directory for the child: the sandbox root.
    pub cwd: PathBuf,
    /// Arguments after the program name, exactly as the caller wrote them.
    pub args: Vec<OsString>,
}

/// Resolve `cmd` against `root`. `root` must already be absolute and canonical.
/// With `confine`, the target and every other positional must stay under `root` once symlinks
/// are followed.
pub async fn resolve(
    cmd: &ValidatedCommand,
    root: &Path,
    confine: bool,
) -> Result<ResolvedTarget, ListingError> {
    let dir = match cmd.first_positional() {
        Some(p) => root.join(p),
        None => root.to_path_buf(),
    };

    let meta = match tokio::fs::metadata(&dir).await {
        Ok(m) => m,
        Err(e) => {
            log::debug!("stat {} failed: {}", dir.display(), e);
            return Err(ListingError::NotFound(dir));
        }
    };
    if !meta.is_dir() {
        return Err(ListingError::NotADirectory(dir));
    }

    let mut args = Vec::with_capacity(cmd.args().len());
    for arg in cmd.args() {
        match arg {
            Arg::Positional(p) => {
                let joined = root.join(p);
                if confine && !physical_path(&joined).await.starts_with(root) {
                    return Err(ListingError::OutsideSandbox(joined));
                }
                args.push(OsString::from(p));
            }
            Arg::Long(s) | Arg::Short(s) => args.push(OsString::from(s)),
        }
    }

    Ok(ResolvedTarget {
        dir,
        cwd: root.to_path_buf(),
        args,
    })
}

/// Where `path` lands once symlinks are followed. The longest existing prefix is canonicalized and
/// any missing tail is folded lexically; a lookup through a missing component fails in the child anyway.
async fn physical_path(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut missing: Vec<&OsStr> = Vec::new();
    loop {
        if let Ok(canonical) = tokio::fs::canonicalize(existing).await {
            let mut out = canonical;
            out.extend(missing.iter().rev());
            return normalize_path(&out);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => return normalize_path(path),
        }
    }
}

/// Lexical normalization (no filesystem access): drops `.` and folds `..`.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
