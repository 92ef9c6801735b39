use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};

/// A component selected for deployment, before any template has been loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedUnit {
    /// Locates the component's templates.
    pub component: String,
    pub repository: String,
    /// Substituted as the image tag of every container in the workload.
    pub revision: String,
}

impl PlannedUnit {
    pub fn new(component: &str, repository: &str, revision: &str) -> Self {
        Self {
            component: component.to_string(),
            repository: repository.to_string(),
            revision: revision.to_string(),
        }
    }
}

/// All cluster objects that make up one deployed component.
///
/// Every object carries the same namespace as [DeploymentUnit::namespace].
#[derive(Debug, Clone)]
pub struct DeploymentUnit {
    pub component: String,
    pub repository: String,
    pub revision: String,
    pub namespace: String,
    pub workload: Deployment,
    pub service_account: Option<ServiceAccount>,
    pub cluster_role: Option<ClusterRole>,
    pub cluster_role_binding: Option<ClusterRoleBinding>,
    pub service: Option<Service>,
    /// `portName:externalPort` for every port of an externally reachable service,
    /// filled in once the service has been created.
    pub endpoints: Vec<String>,
}

impl DeploymentUnit {
    pub fn workload_name(&self) -> &str {
        self.workload.metadata.name.as_deref().unwrap_or_default()
    }
}

/// Name of an object, or the empty string when unset.
pub fn name_of<K: kube::Resource>(resource: &K) -> &str {
    resource.meta().name.as_deref().unwrap_or_default()
}
