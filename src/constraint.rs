//! Version constraint grammar for catalog entries.
//!
//! Builds on [`semver::VersionReq`] and adds the operators buildpack
//! catalogs use that the `semver` crate does not speak natively: the
//! pessimistic operator (`~>`), exclusions (`!=`), and `||` alternation.
//! Each comparator is rewritten into the `semver` crate's grammar rather
//! than reimplementing version comparison.

use semver::{Version, VersionReq};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("improper constraint {0:?}")]
pub struct ConstraintError(String);

/// A parsed version constraint.
///
/// Alternatives separated by `||` each hold an AND requirement plus any
/// `!=` exclusions; a version matches when any alternative accepts it.
#[derive(Debug, Clone)]
pub struct Constraint {
    raw: String,
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone)]
struct Alternative {
    requirement: VersionReq,
    exclusions: Vec<VersionReq>,
}

impl Constraint {
    /// Parse a constraint expression.
    ///
    /// Supported comparators: `=`, `!=`, `<`, `<=`, `>`, `>=`, `~`, `^`,
    /// pessimistic `~>`, and `.x`/`.X`/`.*` wildcards. Comma joins
    /// comparators with AND, `||` with OR. A bare full version (`1.2.3`)
    /// pins exactly; a bare partial version (`1.2`) pins the release line.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError`] when the expression cannot be parsed.
    pub fn parse(input: &str) -> Result<Self, ConstraintError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ConstraintError(input.to_string()));
        }

        let mut alternatives = Vec::new();
        for branch in trimmed.split("||") {
            let alternative =
                parse_alternative(branch).ok_or_else(|| ConstraintError(input.to_string()))?;
            alternatives.push(alternative);
        }

        Ok(Self {
            raw: trimmed.to_string(),
            alternatives,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|alternative| {
            alternative.requirement.matches(version)
                && !alternative
                    .exclusions
                    .iter()
                    .any(|exclusion| exclusion.matches(version))
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn parse_alternative(branch: &str) -> Option<Alternative> {
    let mut comparators = Vec::new();
    let mut exclusions = Vec::new();

    for raw in branch.split(',') {
        let token = raw.trim();
        if token.is_empty() {
            return None;
        }

        if let Some(rest) = token.strip_prefix("~>") {
            let (lower, upper) = pessimistic_bounds(rest.trim())?;
            comparators.push(format!(">={lower}"));
            comparators.push(format!("<{upper}"));
        } else if let Some(rest) = token.strip_prefix("!=") {
            exclusions.push(VersionReq::parse(&exact_comparator(rest.trim())?).ok()?);
        } else {
            comparators.push(canonical_comparator(token)?);
        }
    }

    let requirement = if comparators.is_empty() {
        VersionReq::STAR
    } else {
        VersionReq::parse(&comparators.join(",")).ok()?
    };

    Some(Alternative {
        requirement,
        exclusions,
    })
}

/// Rewrite one comparator into the `semver` crate's grammar.
fn canonical_comparator(token: &str) -> Option<String> {
    for op in [">=", "<=", ">", "<", "=", "^", "~"] {
        if let Some(rest) = token.strip_prefix(op) {
            let version = normalize(rest.trim())?;
            if version == "*" {
                return Some("*".to_string());
            }
            if version.contains('*') {
                // An operator cannot carry wildcard segments; truncating at
                // the wildcard keeps the intended floor or line.
                let truncated = truncate_at_wildcard(&version);
                if truncated.is_empty() {
                    return Some("*".to_string());
                }
                return Some(format!("{op}{truncated}"));
            }
            return Some(format!("{op}{version}"));
        }
    }

    // Bare token: wildcards pass through as-is, everything else pins.
    let version = normalize(token)?;
    if version.contains('*') {
        return Some(version);
    }
    Some(format!("={version}"))
}

/// Comparator used for `!=` exclusions.
fn exact_comparator(token: &str) -> Option<String> {
    let version = normalize(token)?;
    if version.contains('*') {
        // `!=1.2.*` excludes the whole release line.
        return Some(version);
    }
    Some(format!("={version}"))
}

/// Bounds for the pessimistic operator: the rightmost specified component
/// floats, the ones to its left are pinned.
fn pessimistic_bounds(rest: &str) -> Option<(String, String)> {
    let rest = rest.strip_prefix('v').unwrap_or(rest);
    let segments: Vec<&str> = rest.split('.').collect();

    match segments.len() {
        1 => {
            let major: u64 = segments[0].parse().ok()?;
            Some((format!("{major}.0.0"), format!("{}.0.0", major + 1)))
        }
        2 => {
            let major: u64 = segments[0].parse().ok()?;
            let minor: u64 = segments[1].parse().ok()?;
            Some((format!("{major}.{minor}.0"), format!("{}.0.0", major + 1)))
        }
        3 => {
            let version = Version::parse(rest).ok()?;
            let upper = format!("{}.{}.0", version.major, version.minor + 1);
            Some((rest.to_string(), upper))
        }
        _ => None,
    }
}

/// Normalize a version literal: strip a leading `v`, map `x`/`X` segments
/// to `*`, and reject anything that is not a version shape.
fn normalize(version: &str) -> Option<String> {
    let version = version.strip_prefix('v').unwrap_or(version);
    if version.is_empty() {
        return None;
    }
    if version == "*" {
        return Some("*".to_string());
    }

    let (core, suffix) = match version.find(['-', '+']) {
        Some(index) => (&version[..index], &version[index..]),
        None => (version, ""),
    };

    let mut segments = Vec::new();
    for segment in core.split('.') {
        match segment {
            "x" | "X" | "*" => segments.push("*"),
            s if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => segments.push(s),
            _ => return None,
        }
    }

    if segments.is_empty() || segments.len() > 3 {
        return None;
    }

    Some(format!("{}{}", segments.join("."), suffix))
}

fn truncate_at_wildcard(version: &str) -> String {
    version
        .split('.')
        .take_while(|segment| *segment != "*")
        .collect::<Vec<_>>()
        .join(".")
}
