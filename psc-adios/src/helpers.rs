use std::{
    env, io,
    path::{Component, Path, PathBuf},
};

/// Reverse axis order.
///
/// The container stores arrays with the fastest varying axis last, while this crate presents
/// them with the fastest varying axis first. Every shape, start and count crosses that boundary
/// through this function.
///
pub(crate) fn reversed(axes: &[usize]) -> Vec<usize> {
    axes.iter().rev().copied().collect()
}

/// Make a path absolute and drop `.` and `..` components, without touching the filesystem.
///
/// Used to key cached files and engine IO names, so two spellings of the same path share one
/// open file. Symlinks are not resolved, and `..` never climbs above the root.
///
pub(crate) fn normalize_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if normalized.parent().is_some() {
                    normalized.pop();
                }
            }
            component => normalized.push(component),
        }
    }

    Ok(normalized)
}
