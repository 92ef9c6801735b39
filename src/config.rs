use log::debug;
use serde::{Deserialize, Serialize};
use serde_inline_default::serde_inline_default;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_SETTINGS: &str = include_str!("../default.toml");

/// Directory below the user's home holding all persistent state.
pub const WORKING_DIR: &str = ".k8s-cid";
const REPOSITORIES_FILE: &str = "repositories-components.json";
const SETTINGS_FILE: &str = "settings.toml";

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not determine home directory")]
    NoHomeDirectory,

    #[error("read {}: {err}", .path.display())]
    Read { err: std::io::Error, path: PathBuf },

    #[error("write {}: {err}", .path.display())]
    Write { err: std::io::Error, path: PathBuf },

    #[error("malformed repository configuration {}: {err}", .path.display())]
    MalformedRepositories {
        err: serde_json::Error,
        path: PathBuf,
    },

    #[error("serialize repository configuration: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("malformed settings {}: {err}", .path.display())]
    MalformedSettings { err: toml::de::Error, path: PathBuf },

    #[error("assignment '{0}' must have the form repository=component,component,...")]
    MalformedAssignment(String),
}

/// Mapping from repository name to the ordered list of components built from it.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(transparent)]
pub struct Repositories(BTreeMap<String, Vec<String>>);

impl Repositories {
    pub fn components(&self, repository: &str) -> &[String] {
        self.0.get(repository).map(Vec::as_slice).unwrap_or_default()
    }

    /// Parse `repository=component,component,...` and add it to the mapping,
    /// replacing any previous component list for the same repository.
    pub fn assign(&mut self, assignment: &str) -> Result<(), Error> {
        let malformed = || Error::MalformedAssignment(assignment.to_string());
        let (repository, components) = assignment.split_once('=').ok_or_else(malformed)?;
        let components = components
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect::<Vec<_>>();
        if repository.is_empty() || components.is_empty() {
            return Err(malformed());
        }
        self.0.insert(repository.to_string(), components);
        Ok(())
    }
}

impl From<BTreeMap<String, Vec<String>>> for Repositories {
    fn from(map: BTreeMap<String, Vec<String>>) -> Self {
        Self(map)
    }
}

/// Tool settings. Keys missing from the settings file take their built-in defaults.
#[serde_inline_default]
#[derive(Deserialize, Debug)]
pub struct Settings {
    pub description: Option<String>,
    #[serde_inline_default(PathBuf::from("config"))]
    pub templates_dir: PathBuf,
    pub kubeconfig: Option<PathBuf>,
    #[serde_inline_default(false)]
    pub rollback_on_failure: bool,
}

impl Default for Settings {
    fn default() -> Self {
        // Compiled into the program; covered by a test so a bad edit fails there.
        toml::from_str(DEFAULT_SETTINGS).unwrap()
    }
}

/// The on-disk working directory with the repository mapping and settings.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn from_home() -> Result<Self, Error> {
        let home = dirs::home_dir().ok_or(Error::NoHomeDirectory)?;
        Ok(Self::from_dir(home.join(WORKING_DIR)))
    }

    pub fn from_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn repositories_path(&self) -> PathBuf {
        self.dir.join(REPOSITORIES_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    /// Load the repository mapping. A missing file is an error: nothing can be
    /// deployed without it.
    pub fn load_repositories(&self) -> Result<Repositories, Error> {
        let path = self.repositories_path();
        let data = read(&path)?;
        serde_json::from_str(&data).map_err(|err| Error::MalformedRepositories { err, path })
    }

    /// Like [Store::load_repositories], but starts from an empty mapping when no file exists yet.
    pub fn load_repositories_or_default(&self) -> Result<Repositories, Error> {
        if self.repositories_path().is_file() {
            self.load_repositories()
        } else {
            Ok(Repositories::default())
        }
    }

    pub fn save_repositories(&self, repositories: &Repositories) -> Result<(), Error> {
        std::fs::create_dir_all(&self.dir).map_err(|err| Error::Write {
            err,
            path: self.dir.clone(),
        })?;
        let path = self.repositories_path();
        let data = serde_json::to_string_pretty(repositories)?;
        std::fs::write(&path, data).map_err(|err| Error::Write { err, path })
    }

    /// Settings from the user's settings file, or the built-in defaults if there is none.
    pub fn load_settings(&self) -> Result<Settings, Error> {
        let path = self.settings_path();
        if !path.is_file() {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Settings::default());
        }
        let data = read(&path)?;
        toml::from_str(&data).map_err(|err| Error::MalformedSettings { err, path })
    }
}

fn read(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|err| Error::Read {
        err,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.description, Some("Default settings".into()));
        assert_eq!(settings.templates_dir, PathBuf::from("config"));
        assert_eq!(settings.kubeconfig, None);
        assert!(!settings.rollback_on_failure);
    }

    #[test]
    fn partial_settings_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::from_dir(dir.path().to_path_buf());
        std::fs::write(store.settings_path(), "kubeconfig = \"/tmp/kube\"\n").unwrap();

        let settings = store.load_settings().unwrap();
        assert_eq!(settings.kubeconfig, Some(PathBuf::from("/tmp/kube")));
        assert_eq!(settings.templates_dir, PathBuf::from("config"));
    }

    #[test]
    fn assign_components() {
        let mut repositories = Repositories::default();
        repositories.assign("svc=api,worker").unwrap();
        repositories.assign("web=ui").unwrap();
        repositories.assign("svc=api").unwrap();

        assert_eq!(repositories.components("svc"), ["api"]);
        assert_eq!(repositories.components("web"), ["ui"]);
        assert!(repositories.components("ghost").is_empty());
    }

    #[test]
    fn reject_malformed_assignments() {
        let mut repositories = Repositories::default();
        for raw in ["svc", "=api", "svc=", "svc=,"] {
            assert!(
                matches!(repositories.assign(raw), Err(Error::MalformedAssignment(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn save_and_load_repositories() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::from_dir(dir.path().join(WORKING_DIR));

        let mut repositories = Repositories::default();
        repositories.assign("svc=api,worker").unwrap();
        store.save_repositories(&repositories).unwrap();

        let raw = std::fs::read_to_string(store.repositories_path()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json, serde_json::json!({"svc": ["api", "worker"]}));

        assert_eq!(store.load_repositories().unwrap(), repositories);
    }

    #[test]
    fn missing_repositories_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::from_dir(dir.path().to_path_buf());
        assert!(matches!(store.load_repositories(), Err(Error::Read { .. })));
        assert_eq!(store.load_repositories_or_default().unwrap(), Repositories::default());
    }

    #[test]
    fn malformed_repositories_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::from_dir(dir.path().to_path_buf());
        std::fs::write(store.repositories_path(), "{\"svc\": \"api\"}").unwrap();
        assert!(matches!(
            store.load_repositories(),
            Err(Error::MalformedRepositories { .. })
        ));
    }
}
