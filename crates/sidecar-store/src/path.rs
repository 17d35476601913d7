//! Lexical path arithmetic for link targets.
//!
//! Paths are compared component-wise without touching the filesystem, the
//! same way a symlink target is resolved relative to the directory that
//! contains the link.

use std::path::{Component, Path, PathBuf};

use crate::error::{StoreError, StoreResult};

/// Compute the path of `target` relative to the directory `base`.
///
/// Both paths are normalized lexically (`.` removed, `name/..` folded).
/// If exactly one of them is absolute, the other is made absolute against
/// the current directory first.
///
/// Fails with [`StoreError::Path`] when no relative path exists: the two
/// paths live under different roots (e.g. drive letters), or `base` climbs
/// above the common ancestor with `..` so the way back down is unknown.
pub fn relative_path(base: &Path, target: &Path) -> StoreResult<PathBuf> {
    let (base_abs, target_abs) = match (base.is_absolute(), target.is_absolute()) {
        (true, false) => (base.to_path_buf(), absolute(base, target)?),
        (false, true) => (absolute(target, base)?, target.to_path_buf()),
        _ => (base.to_path_buf(), target.to_path_buf()),
    };
    let base_parts = normalize(&base_abs);
    let target_parts = normalize(&target_abs);

    let common = base_parts
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let base_rest = &base_parts[common..];
    let target_rest = &target_parts[common..];

    let fail = |reason: &str| StoreError::Path {
        from: base.to_path_buf(),
        to: target.to_path_buf(),
        reason: reason.to_string(),
    };

    if base_rest
        .iter()
        .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
        || target_rest
            .iter()
            .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    {
        return Err(fail("paths do not share a root"));
    }
    if base_rest.iter().any(|c| matches!(c, Component::ParentDir)) {
        return Err(fail("base directory climbs above the target's ancestor"));
    }

    let mut out = PathBuf::new();
    for _ in base_rest {
        out.push("..");
    }
    for part in target_rest {
        out.push(part.as_os_str());
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    Ok(out)
}

fn absolute(context: &Path, path: &Path) -> StoreResult<PathBuf> {
    std::path::absolute(path).map_err(|e| StoreError::Path {
        from: context.to_path_buf(),
        to: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Lexically normalize a path into its components.
fn normalize(path: &Path) -> Vec<Component<'_>> {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                // `/..` is `/`.
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            _ => parts.push(component),
        }
    }
    parts
}
