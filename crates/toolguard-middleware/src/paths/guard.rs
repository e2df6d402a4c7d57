//! Path boundary guard.
//!
//! Roots are canonicalized once at construction. Candidates are resolved
//! (symlinks included) before the boundary check, so a link inside a root
//! that points outside it is rejected.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::{Map, Value};
use toolguard_core::error::{Result, ToolGuardError};

use super::resolve::{is_within, resolve, ResolveError};
use crate::config::schema::PathSection;

/// Compiled path policy. Immutable after construction; share via Arc.
#[derive(Debug, Clone)]
pub struct PathGuard {
    roots: Vec<PathBuf>,
    /// Configured spelling -> canonical root, for roots reached through a symlink.
    aliases: Vec<(PathBuf, PathBuf)>,
    base_dir: PathBuf,
    allow_symlinks: bool,
    blocked: Vec<Regex>,
    arguments: HashSet<String>,
    suffixes: Vec<String>,
}

fn canonical_dir(p: &Path, what: &str) -> Result<PathBuf> {
    let canonical = fs::canonicalize(p).map_err(|e| {
        ToolGuardError::Config(format!("{what} {} cannot be canonicalized: {e}", p.display()))
    })?;
    if !canonical.is_dir() {
        return Err(ToolGuardError::Config(format!(
            "{what} {} is not a directory",
            p.display()
        )));
    }
    Ok(canonical)
}

fn denied(path: &str, reason: impl Into<String>) -> ToolGuardError {
    ToolGuardError::PathDenied {
        path: path.to_string(),
        reason: reason.into(),
    }
}

impl PathGuard {
    pub fn new(section: &PathSection) -> Result<Self> {
        section.validate()?;

        let roots = section
            .roots
            .iter()
            .map(|r| canonical_dir(r, "paths.roots entry"))
            .collect::<Result<Vec<_>>>()?;
        let aliases = section
            .roots
            .iter()
            .zip(&roots)
            .filter(|(raw, canonical)| raw.is_absolute() && raw != canonical)
            .map(|(raw, canonical)| (raw.clone(), canonical.clone()))
            .collect();

        let base_dir = match &section.base_dir {
            Some(b) => canonical_dir(b, "paths.base_dir")?,
            None => roots
                .first()
                .cloned()
                .ok_or_else(|| ToolGuardError::Config("paths.roots must not be empty".into()))?,
        };

        let blocked = section
            .blocked_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    ToolGuardError::Config(format!("paths.blocked_patterns: invalid regex {p}: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            roots,
            aliases,
            base_dir,
            allow_symlinks: section.allow_symlinks,
            blocked,
            arguments: section.arguments.iter().cloned().collect(),
            suffixes: section.argument_suffixes.clone(),
        })
    }

    /// Canonical roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn is_path_argument(&self, name: &str) -> bool {
        self.arguments.contains(name) || self.suffixes.iter().any(|s| name.ends_with(s.as_str()))
    }

    /// Whether any argument needs the path stage at all.
    pub fn has_path_arguments(&self, arguments: &Map<String, Value>) -> bool {
        arguments
            .iter()
            .any(|(k, v)| self.is_path_argument(k) && !v.is_null())
    }

    /// Validate one candidate. On success returns its canonical form.
    /// Denials carry the caller's original string, never the resolved path.
    /// Performs blocking filesystem I/O.
    pub fn validate(&self, candidate: &str) -> Result<PathBuf> {
        if candidate.trim().is_empty() {
            return Err(denied(candidate, "empty path"));
        }
        if candidate.contains('\0') {
            return Err(denied(candidate, "invalid path"));
        }

        let raw = Path::new(candidate);
        let absolute = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.base_dir.join(raw)
        };
        let absolute = self.rebase_on_root(absolute);

        let resolved = match resolve(&absolute) {
            Ok(r) => r,
            Err(ResolveError::SymlinkLoop) => return Err(denied(candidate, "symlink loop")),
            Err(ResolveError::NotAbsolute) => return Err(denied(candidate, "path is not absolute")),
            Err(ResolveError::Io(e)) => {
                return Err(ToolGuardError::Io(format!("resolving {candidate}: {e}")))
            }
        };

        if !self.roots.iter().any(|root| is_within(&resolved.path, root)) {
            return Err(denied(candidate, "outside permitted roots"));
        }
        if resolved.followed_symlink && !self.allow_symlinks {
            return Err(denied(candidate, "symlinks are not permitted"));
        }

        let text = resolved.path.to_string_lossy();
        if self.blocked.iter().any(|re| re.is_match(&text)) {
            return Err(denied(candidate, "matches a blocked pattern"));
        }

        Ok(resolved.path)
    }

    // A candidate written through a root's configured spelling is resolved
    // from the canonical root, so symlinks in the root's own path do not
    // count against `allow_symlinks`.
    fn rebase_on_root(&self, absolute: PathBuf) -> PathBuf {
        for (alias, canonical) in &self.aliases {
            if let Ok(rest) = absolute.strip_prefix(alias) {
                return canonical.join(rest);
            }
        }
        absolute
    }

    /// Validate every path-like argument. Returns canonical paths keyed by
    /// argument name (`name[i]` for array elements). The first failure wins.
    pub fn validate_arguments(
        &self,
        arguments: &Map<String, Value>,
    ) -> Result<BTreeMap<String, PathBuf>> {
        let mut out = BTreeMap::new();
        for (name, value) in arguments {
            if !self.is_path_argument(name) {
                continue;
            }
            match value {
                Value::Null => {}
                Value::String(s) => {
                    out.insert(name.clone(), self.validate(s)?);
                }
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        let s = item.as_str().ok_or_else(|| {
                            denied(&format!("{name}[{i}]"), "path argument must be a string")
                        })?;
                        out.insert(format!("{name}[{i}]"), self.validate(s)?);
                    }
                }
                _ => return Err(denied(name, "path argument must be a string")),
            }
        }
        Ok(out)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn section(roots: Vec<PathBuf>) -> PathSection {
        serde_yaml::from_str::<PathSection>("roots: []")
            .map(|mut s| {
                s.roots = roots;
                s
            })
            .unwrap()
    }

    fn setup() -> (tempfile::TempDir, PathBuf, PathGuard) {
        let tmp = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap().join("data");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        let guard = PathGuard::new(&section(vec![root.clone()])).unwrap();
        (tmp, root, guard)
    }

    fn reason(e: ToolGuardError) -> String {
        match e {
            ToolGuardError::PathDenied { reason, .. } => reason,
            other => panic!("expected path denial, got {other:?}"),
        }
    }

    #[test]
    fn root_itself_and_descendants_are_allowed() {
        let (_tmp, root, guard) = setup();
        assert_eq!(guard.validate(root.to_str().unwrap()).unwrap(), root);
        let with_slash = format!("{}/", root.display());
        assert_eq!(guard.validate(&with_slash).unwrap(), root);
        assert_eq!(guard.validate("a.txt").unwrap(), root.join("a.txt"));
        assert_eq!(
            guard.validate(&format!("{}/new/file.txt", root.display())).unwrap(),
            root.join("new/file.txt")
        );
    }

    #[test]
    fn traversal_and_sibling_prefix_are_denied() {
        let (_tmp, root, guard) = setup();
        let escape = format!("{}/../../etc/passwd", root.display());
        assert_eq!(reason(guard.validate(&escape).unwrap_err()), "outside permitted roots");

        let evil = root.with_file_name("data-evil");
        fs::create_dir_all(&evil).unwrap();
        assert!(guard.validate(evil.join("x").to_str().unwrap()).is_err());
    }

    #[test]
    fn symlink_escaping_root_is_denied() {
        let (tmp, root, guard) = setup();
        let outside = fs::canonicalize(tmp.path()).unwrap().join("secret");
        fs::create_dir_all(&outside).unwrap();
        symlink(&outside, root.join("link")).unwrap();
        let err = guard.validate(&format!("{}/link/key", root.display())).unwrap_err();
        assert_eq!(reason(err), "outside permitted roots");
    }

    #[test]
    fn symlinks_can_be_forbidden_outright() {
        let (_tmp, root, _guard) = setup();
        symlink(root.join("a.txt"), root.join("alias")).unwrap();
        let mut sec = section(vec![root.clone()]);
        sec.allow_symlinks = false;
        let strict = PathGuard::new(&sec).unwrap();
        assert!(strict.validate(root.join("a.txt").to_str().unwrap()).is_ok());
        assert_eq!(
            reason(strict.validate(root.join("alias").to_str().unwrap()).unwrap_err()),
            "symlinks are not permitted"
        );
    }

    #[test]
    fn root_spelled_through_a_symlink_is_not_a_symlink_traversal() {
        let (tmp, root, _guard) = setup();
        let alias = fs::canonicalize(tmp.path()).unwrap().join("data-alias");
        symlink(&root, &alias).unwrap();
        symlink(root.join("a.txt"), root.join("inner")).unwrap();

        let mut sec = section(vec![alias.clone()]);
        sec.allow_symlinks = false;
        let strict = PathGuard::new(&sec).unwrap();
        assert_eq!(strict.roots(), &[root.clone()]);

        assert_eq!(
            strict.validate(alias.join("a.txt").to_str().unwrap()).unwrap(),
            root.join("a.txt")
        );
        assert_eq!(strict.validate(alias.to_str().unwrap()).unwrap(), root);
        // links below the root still count
        assert_eq!(
            reason(strict.validate(alias.join("inner").to_str().unwrap()).unwrap_err()),
            "symlinks are not permitted"
        );
    }

    #[test]
    fn symlink_cycle_is_denied() {
        let (_tmp, root, guard) = setup();
        symlink(root.join("ping"), root.join("pong")).unwrap();
        symlink(root.join("pong"), root.join("ping")).unwrap();
        let err = guard.validate(&format!("{}/ping/file.txt", root.display())).unwrap_err();
        assert_eq!(err.reason_code(), toolguard_core::ReasonCode::PathDenied);
        assert_eq!(reason(err), "symlink loop");
    }

    #[test]
    fn resolution_failure_is_an_error_not_a_denial() {
        let (_tmp, root, guard) = setup();
        // ENAMETOOLONG fails lookup regardless of privileges
        let long = format!("{}/{}/f.txt", root.display(), "x".repeat(300));
        let err = guard.validate(&long).unwrap_err();
        assert!(matches!(err, ToolGuardError::Io(_)), "got {err:?}");
        assert_eq!(err.reason_code(), toolguard_core::ReasonCode::Error);
    }

    #[test]
    fn blocked_patterns_apply_inside_roots() {
        let (_tmp, root, _guard) = setup();
        let mut sec = section(vec![root.clone()]);
        sec.blocked_patterns = vec![r"\.git(?:/|$)".into(), r"\.pem$".into()];
        let guard = PathGuard::new(&sec).unwrap();
        assert!(guard.validate(".git/config").is_err());
        assert!(guard.validate("certs/server.pem").is_err());
        assert!(guard.validate("gitignore.txt").is_ok());
    }

    #[test]
    fn empty_path_is_denied() {
        let (_tmp, _root, guard) = setup();
        assert_eq!(reason(guard.validate("").unwrap_err()), "empty path");
        assert_eq!(reason(guard.validate("   ").unwrap_err()), "empty path");
    }

    #[test]
    fn missing_root_is_a_config_fault() {
        let sec = section(vec![PathBuf::from("/definitely/not/here/toolguard")]);
        assert!(matches!(PathGuard::new(&sec), Err(ToolGuardError::Config(_))));
    }

    #[test]
    fn argument_detection_and_arrays() {
        let (_tmp, root, guard) = setup();
        assert!(guard.is_path_argument("path"));
        assert!(guard.is_path_argument("output_path"));
        assert!(guard.is_path_argument("model_dir"));
        assert!(!guard.is_path_argument("limit"));

        let mut args = Map::new();
        args.insert("output_path".into(), Value::String("out.json".into()));
        args.insert("files".into(), Value::Null);
        args.insert("path".into(), serde_json::json!(["a.txt", "b.txt"]));
        args.insert("limit".into(), serde_json::json!(3));
        let paths = guard.validate_arguments(&args).unwrap();
        assert_eq!(paths["output_path"], root.join("out.json"));
        assert_eq!(paths["path[1]"], root.join("b.txt"));
        assert_eq!(paths.len(), 3);

        args.insert("config_path".into(), serde_json::json!(7));
        assert!(guard.validate_arguments(&args).is_err());
    }
}
