//! Deploy the components of one or more repositories, pinned to revisions,
//! into a dedicated Kubernetes namespace, and tear them down again.
//!
//! 1. [tag] turns `repository=revision` tags into planned units and a namespace,
//! 2. [materialize] loads each component's templates and scopes them to that namespace,
//! 3. [orchestrator] creates the objects in dependency order, or
//! 4. [reaper] deletes them again, tolerating objects that are already gone.
use thiserror::Error;

pub mod cluster;
pub mod config;
pub mod deployer;
pub mod materialize;
pub mod orchestrator;
pub mod reaper;
pub mod tag;
pub mod template;
pub mod unit;

#[derive(Error, Debug)]
pub enum Error {
    #[error("usage: {0}")]
    Usage(String),

    #[error("tag: {0}")]
    Tag(#[from] tag::Error),

    #[error("configuration: {0}")]
    Config(#[from] config::Error),

    #[error("template: {0}")]
    Template(#[from] template::Error),

    #[error("cluster: {0}")]
    Cluster(#[from] cluster::Error),
}
