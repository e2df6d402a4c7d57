//! Symlink-aware path canonicalization that tolerates missing tails.
//!
//! `std::fs::canonicalize` fails on paths that do not exist yet, which a
//! guard running before file creation must accept. This resolver walks the
//! path one component at a time: existing symlinks are expanded in place,
//! `..` pops the already-resolved (symlink-free) prefix, and once a
//! component is missing the remainder is normalized lexically.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR};

/// Upper bound on symlink expansions for one path (matches Linux MAXSYMLINKS).
pub const MAX_SYMLINK_HOPS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub path: PathBuf,
    /// At least one symlink was traversed.
    pub followed_symlink: bool,
}

#[derive(Debug)]
pub enum ResolveError {
    /// More than `MAX_SYMLINK_HOPS` expansions.
    SymlinkLoop,
    /// Candidate was not absolute.
    NotAbsolute,
    Io(io::Error),
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::SymlinkLoop => f.write_str("too many levels of symbolic links"),
            ResolveError::NotAbsolute => f.write_str("path is not absolute"),
            ResolveError::Io(e) => write!(f, "{e}"),
        }
    }
}

enum Part {
    Prefix(OsString),
    Root,
    Parent,
    Normal(OsString),
}

fn parts(path: &Path) -> Vec<Part> {
    path.components()
        .filter_map(|c| match c {
            Component::Prefix(p) => Some(Part::Prefix(p.as_os_str().to_os_string())),
            Component::RootDir => Some(Part::Root),
            Component::CurDir => None,
            Component::ParentDir => Some(Part::Parent),
            Component::Normal(n) => Some(Part::Normal(n.to_os_string())),
        })
        .collect()
}

fn is_missing(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory)
}

/// Resolve an absolute path. Performs blocking filesystem I/O.
pub fn resolve(path: &Path) -> Result<Resolved, ResolveError> {
    if !path.is_absolute() {
        return Err(ResolveError::NotAbsolute);
    }

    let mut pending: VecDeque<Part> = parts(path).into();
    let mut resolved = PathBuf::new();
    let mut hops = 0usize;
    let mut followed_symlink = false;

    while let Some(part) = pending.pop_front() {
        match part {
            Part::Prefix(p) => resolved = PathBuf::from(p),
            Part::Root => resolved.push(MAIN_SEPARATOR_STR),
            Part::Parent => {
                resolved.pop();
            }
            Part::Normal(name) => {
                let next = resolved.join(&name);
                match fs::symlink_metadata(&next) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        hops += 1;
                        if hops > MAX_SYMLINK_HOPS {
                            return Err(ResolveError::SymlinkLoop);
                        }
                        followed_symlink = true;
                        let target = fs::read_link(&next).map_err(ResolveError::Io)?;
                        // Relative targets resolve against the link's parent,
                        // which is `resolved` as it stands; absolute targets
                        // carry their own root part.
                        for p in parts(&target).into_iter().rev() {
                            pending.push_front(p);
                        }
                        if target.is_absolute() {
                            resolved = PathBuf::new();
                        }
                    }
                    Ok(_) => resolved = next,
                    Err(e) if is_missing(&e) => resolved = next,
                    Err(e) => return Err(ResolveError::Io(e)),
                }
            }
        }
    }

    Ok(Resolved {
        path: resolved,
        followed_symlink,
    })
}

/// Lexical containment: equal to, or a descendant of, `root` on component
/// boundaries (`/srv/data-evil` is not inside `/srv/data`).
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}
