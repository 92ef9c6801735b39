use log::debug;
use serde::de::DeserializeOwned;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no {kind} template found for component {component}")]
    NotFound { component: String, kind: Kind },

    #[error("read {path}: {err}")]
    ReadFile { err: std::io::Error, path: String },

    #[error("deserialize {path}: {err}")]
    Deserialize { err: serde_yaml::Error, path: String },

    #[error("{path}: template has no metadata.name")]
    MissingName { path: String },
}

/// The kinds of per-component templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Workload,
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    Service,
}

impl Kind {
    /// Candidate file names for a component's template of this kind, in lookup order.
    pub fn file_names(&self, component: &str) -> Vec<String> {
        match self {
            Kind::Workload => vec![format!("{component}.yaml"), format!("{component}.yml")],
            Kind::ServiceAccount => vec![format!("{component}-svc-account.yml")],
            Kind::ClusterRole => vec![format!("{component}-cluster-role.yml")],
            Kind::ClusterRoleBinding => vec![format!("{component}-cluster-role-binding.yml")],
            Kind::Service => vec![format!("{component}-svc.yml")],
        }
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Kind::Workload => "workload",
            Kind::ServiceAccount => "service account",
            Kind::ClusterRole => "cluster role",
            Kind::ClusterRoleBinding => "cluster role binding",
            Kind::Service => "service",
        })
    }
}

/// Raw template text together with where it came from.
#[derive(Debug, Clone)]
pub struct Template {
    pub origin: String,
    pub text: String,
}

impl Template {
    /// Decode YAML (or JSON) into a Kubernetes object, which must be named.
    pub fn decode<K>(&self) -> Result<K, Error>
    where
        K: kube::Resource + DeserializeOwned,
    {
        let resource: K = serde_yaml::from_str(&self.text).map_err(|err| Error::Deserialize {
            err,
            path: self.origin.clone(),
        })?;
        match resource.meta().name.as_deref() {
            Some(name) if !name.is_empty() => Ok(resource),
            _ => Err(Error::MissingName {
                path: self.origin.clone(),
            }),
        }
    }
}

/// Somewhere templates can be looked up by component and kind.
pub trait TemplateSource {
    /// `Ok(None)` means the template does not exist.
    fn find(&self, component: &str, kind: Kind) -> Result<Option<Template>, Error>;
}

/// Templates stored as files in a single directory.
#[derive(Debug, Clone)]
pub struct Directory {
    path: PathBuf,
}

impl Directory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TemplateSource for Directory {
    fn find(&self, component: &str, kind: Kind) -> Result<Option<Template>, Error> {
        for file_name in kind.file_names(component) {
            let path = self.path.join(file_name);
            let origin = path.to_string_lossy().to_string();
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    debug!("Loaded {kind} template {origin}");
                    return Ok(Some(Template { origin, text }));
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    debug!("No {kind} template at {origin}");
                }
                Err(err) => return Err(Error::ReadFile { err, path: origin }),
            }
        }
        Ok(None)
    }
}
