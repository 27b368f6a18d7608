use crate::manifest::FullyQualifiedName;
use crate::runtime::VersionResolver;
use std::cmp::Ordering;
use std::fmt;

/// Image version ordered segment by segment.
///
/// Segments are split on `.`, `-`, `_` and `+`. Numeric segments compare as numbers,
/// other segments as text, a number sorts before text and a missing segment counts as `0`.
#[derive(Debug, Clone)]
pub struct Version(String);

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Number(u64),
    Text(&'a str),
}

impl Version {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    fn segments(&self) -> Vec<Segment<'_>> {
        self.0
            .split(['.', '-', '_', '+'])
            .filter(|s| !s.is_empty())
            .map(|s| match s.parse::<u64>() {
                Ok(n) => Segment::Number(n),
                Err(_) => Segment::Text(s),
            })
            .collect()
    }

    pub fn less_than(&self, other: &Version) -> bool {
        self < other
    }
}

fn compare_segments(a: &Segment<'_>, b: &Segment<'_>) -> Ordering {
    match (a, b) {
        (Segment::Number(x), Segment::Number(y)) => x.cmp(y),
        (Segment::Text(x), Segment::Text(y)) => x.cmp(y),
        (Segment::Number(_), Segment::Text(_)) => Ordering::Less,
        (Segment::Text(_), Segment::Number(_)) => Ordering::Greater,
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let (left, right) = (self.segments(), other.segments());
        let zero = Segment::Number(0);
        for i in 0..left.len().max(right.len()) {
            let a = left.get(i).unwrap_or(&zero);
            let b = right.get(i).unwrap_or(&zero);
            match compare_segments(a, b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A newer version is available for a pinned dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advisory {
    pub current: FullyQualifiedName,
    pub newer: FullyQualifiedName,
    pub label: String,
}

/// Resolve the latest version of every pinned dependency and warn about outdated pins.
///
/// Never fails: resolver errors are logged and skipped.
pub async fn check_latest_version(
    resolver: &dyn VersionResolver,
    deps: &[FullyQualifiedName],
    label: &str,
) -> Vec<Advisory> {
    let lookups = deps
        .iter()
        .filter(|dep| dep.version().is_some())
        .map(|dep| async move { (dep, resolver.latest_version(dep.name()).await) });

    let mut advisories = Vec::new();
    for (dep, result) in futures::future::join_all(lookups).await {
        let latest = match result {
            Ok(Some(latest)) if !latest.is_empty() => latest,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(dependency = %dep, error = %e, "Cannot resolve latest version");
                continue;
            }
        };

        let current = Version::new(dep.version().unwrap_or_default());
        if current.less_than(&Version::new(latest.clone())) {
            let newer = FullyQualifiedName::new(dep.name(), Some(latest));
            tracing::warn!(current = %dep, newer = %newer, "Newer {} version", label);
            advisories.push(Advisory {
                current: dep.clone(),
                newer,
                label: label.to_string(),
            });
        }
    }
    advisories
}
