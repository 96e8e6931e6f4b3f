//! End-to-end resolution against catalog files on disk.

use std::io::Write as _;

use chrono::{DateTime, Utc};
use courier::{Dependency, Error, FileTransport, ResolveError, Service};
use tempfile::NamedTempFile;

const CATALOG: &str = r#"
[[metadata.dependencies]]
cpe = "cpe:2.3:a:acme:runtime:1.2.3:*:*:*:*:*:*:*"
cpes = ["cpe:2.3:a:acme:runtime:1.2.3:*:*:*:*:*:*:*", "cpe:2.3:a:acme:rt:1.2.3:*:*:*:*:*:*:*"]
deprecation_date = 2024-04-01T00:00:00Z
id = "runtime"
sha256 = "runtime-sha-1.2.3"
stacks = ["base-stack"]
uri = "https://deps.example.com/runtime-1.2.3.tgz"
version = "1.2.3"

[[metadata.dependencies]]
id = "sdk"
sha256 = "sdk-sha-1.2.4"
stacks = ["base-stack"]
uri = "https://deps.example.com/sdk-1.2.4.tgz"
version = "1.2.4"

[[metadata.dependencies]]
id = "runtime"
sha256 = "runtime-sha-1.2.5"
stacks = ["alt-stack"]
uri = "https://deps.example.com/runtime-1.2.5.tgz"
version = "1.2.5"

[[metadata.dependencies]]
id = "runtime"
sha256 = "runtime-sha-4.5.6"
stacks = ["base-stack"]
strip-components = 1
uri = "https://deps.example.com/runtime-4.5.6.tgz"
version = "4.5.6"

[[metadata.dependencies]]
id = "sdk"
sha256 = "sdk-sha-4.5.6"
stacks = ["*"]
strip-components = 1
uri = "https://deps.example.com/sdk-4.5.6.tgz"
version = "4.5.6"
"#;

fn write_catalog(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create catalog file");
    file.write_all(content.as_bytes())
        .expect("failed to write catalog");
    file.flush().expect("failed to flush catalog");
    file
}

fn service() -> Service {
    Service::new(FileTransport)
}

#[test]
fn finds_the_best_match_for_a_version_line() {
    let catalog = write_catalog(CATALOG);

    let dependency = service()
        .resolve(catalog.path(), "runtime", "1.2.*", "base-stack")
        .unwrap();

    assert_eq!(
        dependency,
        Dependency {
            cpe: "cpe:2.3:a:acme:runtime:1.2.3:*:*:*:*:*:*:*".to_string(),
            cpes: vec![
                "cpe:2.3:a:acme:runtime:1.2.3:*:*:*:*:*:*:*".to_string(),
                "cpe:2.3:a:acme:rt:1.2.3:*:*:*:*:*:*:*".to_string(),
            ],
            deprecation_date: Some(
                DateTime::parse_from_rfc3339("2024-04-01T00:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc)
            ),
            id: "runtime".to_string(),
            sha256: "runtime-sha-1.2.3".to_string(),
            stacks: vec!["base-stack".to_string()],
            uri: "https://deps.example.com/runtime-1.2.3.tgz".to_string(),
            version: "1.2.3".to_string(),
            ..Dependency::default()
        }
    );
}

#[test]
fn a_wildcard_stack_record_serves_any_stack() {
    let catalog = write_catalog(CATALOG);

    let dependency = service()
        .resolve(catalog.path(), "sdk", "", "random-stack")
        .unwrap();

    assert_eq!(dependency.version, "4.5.6");
    assert_eq!(dependency.stacks, vec!["*"]);
    assert_eq!(dependency.strip_components, 1);
}

#[test]
fn empty_constraint_without_a_default_picks_the_highest_version() {
    let catalog = write_catalog(CATALOG);

    for constraint in ["", "default"] {
        let dependency = service()
            .resolve(catalog.path(), "runtime", constraint, "base-stack")
            .unwrap();
        assert_eq!(dependency.version, "4.5.6");
        assert_eq!(dependency.strip_components, 1);
    }
}

#[test]
fn pessimistic_operators_pin_the_specified_components() {
    let catalog = write_catalog(CATALOG);

    for constraint in ["~> 1.2.0", "~> 1.1", "~> 1"] {
        let dependency = service()
            .resolve(catalog.path(), "runtime", constraint, "base-stack")
            .unwrap();
        assert_eq!(dependency.version, "1.2.3", "constraint {constraint}");
    }
}

#[test]
fn the_default_versions_table_governs_empty_and_default_constraints() {
    let catalog = write_catalog(
        r#"
[metadata]
[metadata.default-versions]
runtime = "1.2.x"

[[metadata.dependencies]]
id = "runtime"
sha256 = "runtime-sha-1.2.3"
stacks = ["base-stack"]
uri = "https://deps.example.com/runtime-1.2.3.tgz"
version = "1.2.3"

[[metadata.dependencies]]
id = "runtime"
sha256 = "runtime-sha-4.5.6"
stacks = ["base-stack"]
uri = "https://deps.example.com/runtime-4.5.6.tgz"
version = "4.5.6"
"#,
    );

    for constraint in ["", "default"] {
        let dependency = service()
            .resolve(catalog.path(), "runtime", constraint, "base-stack")
            .unwrap();
        assert_eq!(dependency.version, "1.2.3");
    }
}

#[test]
fn a_specific_stack_wins_over_a_wildcard_at_the_same_version() {
    let catalog = write_catalog(
        r#"
[[metadata.dependencies]]
id = "runtime"
sha256 = "some-sha"
stacks = ["base-stack"]
uri = "https://deps.example.com/specific-1.2.1.tgz"
version = "1.2.1"

[[metadata.dependencies]]
id = "runtime"
sha256 = "some-sha"
stacks = ["*"]
uri = "https://deps.example.com/wildcard-1.2.1.tgz"
version = "1.2.1"

[[metadata.dependencies]]
id = "runtime"
sha256 = "some-sha"
stacks = ["base-stack", "*"]
uri = "https://deps.example.com/wildcard-1.2.3.tgz"
version = "1.2.3"

[[metadata.dependencies]]
id = "runtime"
sha256 = "some-sha"
stacks = ["base-stack"]
uri = "https://deps.example.com/specific-1.2.3.tgz"
version = "1.2.3"
"#,
    );

    let dependency = service()
        .resolve(catalog.path(), "runtime", "*", "base-stack")
        .unwrap();

    assert_eq!(dependency.uri, "https://deps.example.com/specific-1.2.3.tgz");
    assert_eq!(dependency.stacks, vec!["base-stack"]);
}

#[test]
fn two_wildcard_records_at_the_same_version_are_an_error() {
    let catalog = write_catalog(
        r#"
[[metadata.dependencies]]
id = "runtime"
sha256 = "sha-a"
stacks = ["base-stack", "*"]
uri = "https://deps.example.com/a.tgz"
version = "1.2.3"

[[metadata.dependencies]]
id = "runtime"
sha256 = "sha-b"
stacks = ["base-stack", "other-stack", "*"]
uri = "https://deps.example.com/b.tgz"
version = "1.2.3"
"#,
    );

    let err = service()
        .resolve(catalog.path(), "runtime", "1.2.3", "base-stack")
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Resolve(ResolveError::AmbiguousWildcard { .. })
    ));
    assert!(err
        .to_string()
        .contains("multiple dependencies support wildcard stack for version: \"1.2.3\""));
}

#[test]
fn unsatisfiable_constraints_report_the_supported_versions() {
    let catalog = write_catalog(CATALOG);

    let err = service()
        .resolve(catalog.path(), "runtime", "9.9.9", "base-stack")
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Resolve(ResolveError::NoCompatibleVersion { .. })
    ));

    let message = err.to_string();
    assert!(message.contains("failed to satisfy \"runtime\" dependency version constraint \"9.9.9\""));
    assert!(message.contains("no compatible versions on \"base-stack\" stack"));
    assert!(message.contains("Supported versions are: [1.2.3, 4.5.6]"));
}

#[test]
fn malformed_catalogs_are_a_parse_error() {
    let catalog = write_catalog("this is not toml");

    let err = service()
        .resolve(catalog.path(), "runtime", "1.2.3", "base-stack")
        .unwrap_err();

    assert!(err.to_string().contains("failed to parse buildpack metadata"));
}

#[test]
fn invalid_constraints_are_rejected() {
    let catalog = write_catalog(CATALOG);

    let err = service()
        .resolve(catalog.path(), "runtime", "this-is-not-semver", "base-stack")
        .unwrap_err();

    assert!(err.to_string().contains("improper constraint"));
}

#[test]
fn invalid_record_versions_fail_resolution() {
    let catalog = write_catalog(
        r#"
[[metadata.dependencies]]
id = "runtime"
sha256 = "some-sha"
stacks = ["base-stack"]
uri = "https://deps.example.com/runtime.tgz"
version = "this is super not semver"
"#,
    );

    let err = service()
        .resolve(catalog.path(), "runtime", "1.2.3", "base-stack")
        .unwrap_err();

    assert!(err.to_string().contains("invalid semantic version"));
}

#[test]
fn a_missing_catalog_file_is_an_io_error() {
    let err = service()
        .resolve("/definitely/not/here/buildpack.toml", "runtime", "*", "base-stack")
        .unwrap_err();

    assert!(matches!(err, Error::Catalog(_)));
}
