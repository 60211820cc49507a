//! Location of new artifacts.
//!
//! In relative mode a candidate is reduced to its final path component and
//! nested under the parent container (or the default storage root). In absolute
//! mode the candidate is used as given, and a local parent directory is created
//! for it.

use std::fs;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::ParentRef;
use crate::error::SomaError;

static REMOTE_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UriMode {
    #[default]
    Relative,
    Absolute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUri {
    pub uri: String,
    /// Set when leading path components were dropped from the candidate.
    pub basename_applied: bool,
}

pub fn is_remote_uri(uri: &str) -> bool {
    REMOTE_URI.is_match(uri)
}

pub fn resolve_uri(
    candidate: &str,
    parent: Option<&ParentRef>,
    mode: UriMode,
    default_root: &Utf8Path,
) -> Result<ResolvedUri, SomaError> {
    if candidate.trim().is_empty() {
        return Err(SomaError::Configuration(
            "uri must be a non-empty string".to_string(),
        ));
    }
    if let Some(parent) = parent {
        if !parent.object_type().is_container() {
            return Err(SomaError::Configuration(format!(
                "parent must be a collection, got {} at {}",
                parent.object_type(),
                parent.uri()
            )));
        }
    }

    match mode {
        UriMode::Absolute => {
            if let Some(path) = local_path(candidate) {
                ensure_parent_dir(Utf8Path::new(path))?;
            }
            Ok(ResolvedUri {
                uri: candidate.to_string(),
                basename_applied: false,
            })
        }
        UriMode::Relative => {
            let name = basename(candidate).ok_or_else(|| {
                SomaError::Configuration(format!("uri '{candidate}' has no final component"))
            })?;
            let basename_applied = name != candidate.trim_end_matches(['/', '\\']);
            if basename_applied {
                tracing::warn!(
                    uri = candidate,
                    name,
                    "uri paths are relative to the parent; using the final component only"
                );
            }
            let uri = match parent {
                Some(parent) => join_uri(parent.uri(), name),
                None => join_uri(default_root.as_str(), name),
            };
            Ok(ResolvedUri {
                uri,
                basename_applied,
            })
        }
    }
}

/// Filesystem path of a local candidate, with any `file://` scheme removed.
fn local_path(candidate: &str) -> Option<&str> {
    match candidate.strip_prefix("file://") {
        Some(path) => Some(path),
        None if is_remote_uri(candidate) => None,
        None => Some(candidate),
    }
}

fn basename(candidate: &str) -> Option<&str> {
    let path = if is_remote_uri(candidate) {
        candidate.split_once("://").map_or(candidate, |(_, rest)| rest)
    } else {
        candidate
    };
    path.split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .last()
        .filter(|part| *part != "..")
}

fn join_uri(base: &str, name: &str) -> String {
    if is_remote_uri(base) {
        format!("{}/{name}", base.trim_end_matches('/'))
    } else {
        Utf8PathBuf::from(base).join(name).into_string()
    }
}

fn ensure_parent_dir(path: &Utf8Path) -> Result<(), SomaError> {
    let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) else {
        return Ok(());
    };
    if !parent.as_std_path().exists() {
        tracing::debug!(dir = %parent, "creating parent directory");
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| SomaError::Filesystem(format!("create {parent}: {err}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::ObjectType;

    #[test]
    fn remote_detection() {
        assert!(is_remote_uri("s3://bucket/key"));
        assert!(is_remote_uri("tiledb://ns/name"));
        assert!(!is_remote_uri("/tmp/data"));
        assert!(!is_remote_uri("C:\\data"));
    }

    #[test]
    fn relative_uses_basename_under_parent() {
        let parent = ParentRef::new("/data/exp", ObjectType::Experiment);
        let resolved =
            resolve_uri("nested/dir/obs", Some(&parent), UriMode::Relative, Utf8Path::new("/root"))
                .unwrap();
        assert_eq!(resolved.uri, "/data/exp/obs");
        assert!(resolved.basename_applied);
    }

    #[test]
    fn relative_without_parent_uses_default_root() {
        let resolved = resolve_uri("obs", None, UriMode::Relative, Utf8Path::new("/root")).unwrap();
        assert_eq!(resolved.uri, "/root/obs");
        assert!(!resolved.basename_applied);
    }

    #[test]
    fn trailing_separator_is_not_flagged() {
        let root = Utf8Path::new("/root");
        let resolved = resolve_uri("obs/", None, UriMode::Relative, root).unwrap();
        assert_eq!(resolved.uri, "/root/obs");
        assert!(!resolved.basename_applied);
        let resolved = resolve_uri("data/obs/", None, UriMode::Relative, root).unwrap();
        assert_eq!(resolved.uri, "/root/obs");
        assert!(resolved.basename_applied);
    }

    #[test]
    fn file_scheme_is_local() {
        assert_eq!(local_path("file:///tmp/x"), Some("/tmp/x"));
        assert_eq!(local_path("/tmp/x"), Some("/tmp/x"));
        assert_eq!(local_path("s3://bucket/x"), None);
    }

    #[test]
    fn remote_parent_joins_with_slash() {
        let parent = ParentRef::new("s3://bucket/exp/", ObjectType::Collection);
        let resolved =
            resolve_uri("X", Some(&parent), UriMode::Relative, Utf8Path::new("/root")).unwrap();
        assert_eq!(resolved.uri, "s3://bucket/exp/X");
    }

    #[test]
    fn rejects_empty_and_non_container_parent() {
        let root = Utf8Path::new("/root");
        assert_matches!(
            resolve_uri("  ", None, UriMode::Relative, root),
            Err(SomaError::Configuration(_))
        );
        let parent = ParentRef::new("/data/df", ObjectType::DataFrame);
        assert_matches!(
            resolve_uri("obs", Some(&parent), UriMode::Relative, root),
            Err(SomaError::Configuration(_))
        );
        assert_matches!(
            resolve_uri("a/..", None, UriMode::Relative, root),
            Err(SomaError::Configuration(_))
        );
    }
}
