use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use soma_ingest::domain::{ObjectType, ParentRef};
use soma_ingest::error::SomaError;
use soma_ingest::uri::{UriMode, resolve_uri};

#[test]
fn relative_strips_leading_components_and_flags_it() {
    let parent = ParentRef::new("/data/pbmc/ms/RNA", ObjectType::Measurement);
    let resolved = resolve_uri(
        "/some/where/else/X",
        Some(&parent),
        UriMode::Relative,
        Utf8Path::new("/unused"),
    )
    .unwrap();
    assert_eq!(resolved.uri, "/data/pbmc/ms/RNA/X");
    assert!(resolved.basename_applied);
}

#[test]
fn relative_strips_windows_separators() {
    let resolved =
        resolve_uri("dir\\obs", None, UriMode::Relative, Utf8Path::new("/root")).unwrap();
    assert_eq!(resolved.uri, "/root/obs");
    assert!(resolved.basename_applied);
}

#[test]
fn absolute_creates_missing_parent_directory() {
    let temp = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let candidate = base.join("deep").join("nested").join("obs");
    assert!(!candidate.parent().unwrap().as_std_path().exists());

    let resolved = resolve_uri(candidate.as_str(), None, UriMode::Absolute, &base).unwrap();
    assert_eq!(resolved.uri, candidate.as_str());
    assert!(!resolved.basename_applied);
    assert!(candidate.parent().unwrap().as_std_path().is_dir());
    assert!(!candidate.as_std_path().exists());
}

#[test]
fn absolute_remote_touches_nothing() {
    let resolved = resolve_uri(
        "s3://bucket/pbmc/obs",
        None,
        UriMode::Absolute,
        Utf8Path::new("/root"),
    )
    .unwrap();
    assert_eq!(resolved.uri, "s3://bucket/pbmc/obs");
    assert!(!resolved.basename_applied);
}

#[test]
fn absolute_still_checks_parent_type() {
    let parent = ParentRef::new("/data/X", ObjectType::SparseNdarray);
    let err = resolve_uri("obs", Some(&parent), UriMode::Absolute, Utf8Path::new("/root"))
        .unwrap_err();
    assert_matches!(err, SomaError::Configuration(_));
}

#[test]
fn absolute_file_scheme_creates_parent_directory() {
    let temp = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let path = base.join("runs").join("X");
    let candidate = format!("file://{path}");

    let resolved = resolve_uri(&candidate, None, UriMode::Absolute, &base).unwrap();
    assert_eq!(resolved.uri, candidate);
    assert!(base.join("runs").as_std_path().is_dir());
}
