use crate::config::Repositories;
use crate::unit::PlannedUnit;
use log::{debug, warn};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("tag '{0}' must have the form repository=revision")]
    Malformed(String),
}

/// A `repository=revision` pair as given on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub repository: String,
    pub revision: String,
}

impl FromStr for Tag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((repository, revision))
                if !repository.is_empty() && !revision.is_empty() && !revision.contains('=') =>
            {
                Ok(Self {
                    repository: repository.to_string(),
                    revision: revision.to_string(),
                })
            }
            _ => Err(Error::Malformed(s.to_string())),
        }
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.repository, self.revision)
    }
}

/// Derive the deployment namespace from the tags, in order.
///
/// Each tag contributes `repository-revision`; contributions are joined with `-`
/// and every `.` is replaced with `-`, so `["svc=v1.2"]` yields `svc-v1-2`.
pub fn namespace(tags: &[Tag]) -> String {
    tags.iter()
        .map(|tag| format!("{}-{}", tag.repository, tag.revision))
        .collect::<Vec<_>>()
        .join("-")
        .replace('.', "-")
}

/// The outcome of resolving a tag list: the namespace and one unit per component.
#[derive(Debug)]
pub struct Plan {
    pub namespace: String,
    pub units: Vec<PlannedUnit>,
}

/// Expand every tag into one [PlannedUnit] per component of its repository.
///
/// A repository without a configured component list expands to nothing.
pub fn resolve(tags: &[Tag], repositories: &Repositories) -> Plan {
    let mut units = Vec::new();

    for tag in tags {
        let components = repositories.components(&tag.repository);
        if components.is_empty() {
            warn!("No components configured for repository {}", tag.repository);
        }
        for component in components {
            debug!("Planning component {component} from {tag}");
            units.push(PlannedUnit::new(component, &tag.repository, &tag.revision));
        }
    }

    Plan {
        namespace: namespace(tags),
        units,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn tags(raw: &[&str]) -> Vec<Tag> {
        raw.iter().map(|t| t.parse().unwrap()).collect()
    }

    #[test]
    fn parse_tag() {
        let tag: Tag = "svc=abc123".parse().unwrap();
        assert_eq!(tag.repository, "svc");
        assert_eq!(tag.revision, "abc123");
        assert_eq!(tag.to_string(), "svc=abc123");
    }

    #[test]
    fn reject_malformed_tags() {
        for raw in ["svc", "=abc", "svc=", "svc=a=b", ""] {
            assert_eq!(
                raw.parse::<Tag>(),
                Err(Error::Malformed(raw.to_string())),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn namespace_single_tag() {
        assert_eq!(namespace(&tags(&["svc=abc123"])), "svc-abc123");
    }

    #[test]
    fn namespace_joins_in_order_and_sanitizes_dots() {
        let ns = namespace(&tags(&["frontend=v1.2.0", "backend=release.7"]));
        assert_eq!(ns, "frontend-v1-2-0-backend-release-7");
        assert!(!ns.ends_with('-'));
    }

    #[test]
    fn namespace_of_nothing_is_empty() {
        assert_eq!(namespace(&[]), "");
    }

    #[test]
    fn resolve_expands_components() {
        let repositories = Repositories::from(BTreeMap::from([
            ("svc".to_string(), vec!["api".to_string(), "worker".to_string()]),
            ("web".to_string(), vec!["ui".to_string()]),
        ]));

        let plan = resolve(&tags(&["svc=abc123", "web=1.0"]), &repositories);

        assert_eq!(plan.namespace, "svc-abc123-web-1-0");
        let described = plan
            .units
            .iter()
            .map(|u| format!("{}/{}@{}", u.repository, u.component, u.revision))
            .collect::<Vec<_>>();
        assert_eq!(described, vec!["svc/api@abc123", "svc/worker@abc123", "web/ui@1.0"]);
    }

    #[test]
    fn unknown_repository_expands_to_nothing() {
        let plan = resolve(&tags(&["ghost=1"]), &Repositories::default());
        assert!(plan.units.is_empty());
        assert_eq!(plan.namespace, "ghost-1");
    }
}
