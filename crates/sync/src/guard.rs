//! Path confinement for everything the reconciler reads.
//!
//! Both sides of a check are resolved first: `.` and `..` are collapsed and
//! every existing prefix is canonicalized, so symlinks are followed to their
//! real targets.  Components that do not exist yet are appended as-is.
//! Containment is then a component-wise prefix test, which means
//! `/root/teams-evil` is never "inside" `/root/teams`.

use std::env;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Resolve `path` to an absolute form with symlinks followed wherever the
/// filesystem allows.
pub fn resolve(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };

    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => {
                resolved.push(part);
                if resolved.exists() {
                    resolved = resolved.canonicalize()?;
                }
            }
        }
    }
    Ok(resolved)
}

/// The part of `candidate` below `root`, or `None` when `candidate` resolves
/// outside of it (or either side cannot be resolved).
pub fn relative_within(root: &Path, candidate: &Path) -> Option<PathBuf> {
    let root = resolve(root).ok()?;
    let candidate = resolve(candidate).ok()?;
    candidate
        .strip_prefix(&root)
        .ok()
        .map(Path::to_path_buf)
}

/// True iff `candidate` resolves to `root` itself or a descendant of it.
pub fn confine(root: &Path, candidate: &Path) -> bool {
    relative_within(root, candidate).is_some()
}
