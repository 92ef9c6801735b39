use crate::cluster::Cluster;
use crate::config::Repositories;
use crate::tag::{self, Tag};
use crate::template::TemplateSource;
use crate::unit::DeploymentUnit;
use crate::{materialize, orchestrator, reaper, Error};
use log::{info, warn};

/// One deployment invocation: the resolved and materialized units for a set of tags.
pub struct Deployer {
    namespace: String,
    units: Vec<DeploymentUnit>,
    rollback_on_failure: bool,
}

impl Deployer {
    /// Resolve the tags and materialize every component's templates.
    ///
    /// Nothing touches the cluster until [Deployer::create] or [Deployer::delete].
    pub fn new(
        tags: &[Tag],
        repositories: &Repositories,
        templates: &dyn TemplateSource,
    ) -> Result<Self, Error> {
        if tags.is_empty() {
            return Err(Error::Usage("no repository=revision tags given".to_string()));
        }
        let plan = tag::resolve(tags, repositories);
        info!("Namespace: {}", plan.namespace);
        let units = materialize::materialize(&plan, templates)?;
        if units.is_empty() {
            warn!("Nothing to deploy for {} tag(s)", tags.len());
        }
        Ok(Self {
            namespace: plan.namespace,
            units,
            rollback_on_failure: false,
        })
    }

    /// When enabled, a failed [Deployer::create] deletes the objects it created
    /// before reporting the failure. Objects that already existed are kept.
    pub fn rollback_on_failure(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = enabled;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn units(&self) -> &[DeploymentUnit] {
        &self.units
    }

    /// Create all units and return the exposed endpoints.
    pub async fn create(&mut self, cluster: &dyn Cluster) -> Result<Vec<String>, Error> {
        let mut created = Vec::new();
        match orchestrator::create_recorded(cluster, &mut self.units, &mut created).await {
            Ok(endpoints) => Ok(endpoints),
            Err(err) if self.rollback_on_failure => {
                warn!("Create failed ({err}), rolling back {} object(s)", created.len());
                if let Err(rollback_err) = reaper::undo(cluster, &created).await {
                    warn!("Rollback incomplete: {rollback_err}");
                }
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn delete(&self, cluster: &dyn Cluster) -> Result<(), Error> {
        Ok(reaper::delete(cluster, &self.units).await?)
    }
}
