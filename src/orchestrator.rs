use crate::cluster::{Cluster, Error, Object, ObjectKind};
use crate::unit::DeploymentUnit;
use k8s_openapi::api::core::v1::Service;
use log::info;

/// Service types reachable from outside the cluster.
const EXPOSED_SERVICE_TYPES: [&str; 2] = ["NodePort", "LoadBalancer"];

/// An object created by a run, in creation order.
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub kind: ObjectKind,
    pub name: String,
    pub namespace: Option<String>,
}

/// Create every unit's objects in dependency order.
///
/// Namespaces are created on demand, then for each unit its service account,
/// cluster role, cluster role binding, workload and service. The first failure
/// aborts the run; nothing created so far is rolled back here.
///
/// Returns the endpoints of all exposed services, in unit order.
pub async fn create(
    cluster: &dyn Cluster,
    units: &mut [DeploymentUnit],
) -> Result<Vec<String>, Error> {
    create_recorded(cluster, units, &mut Vec::new()).await
}

/// Like [create], but appends every object this run actually created to `created`,
/// including on failure. Objects that already existed are never recorded.
pub async fn create_recorded(
    cluster: &dyn Cluster,
    units: &mut [DeploymentUnit],
    created: &mut Vec<Created>,
) -> Result<Vec<String>, Error> {
    let mut live_namespaces = cluster.namespaces().await?;

    for unit in units.iter_mut() {
        if !live_namespaces.contains(&unit.namespace) {
            apply(cluster, Object::namespace_named(&unit.namespace), created).await?;
            live_namespaces = cluster.namespaces().await?;
        }

        if let Some(sa) = &unit.service_account {
            apply(cluster, Object::ServiceAccount(sa.clone()), created).await?;
        }
        if let Some(role) = &unit.cluster_role {
            apply(cluster, Object::ClusterRole(role.clone()), created).await?;
        }
        if let Some(binding) = &unit.cluster_role_binding {
            apply(cluster, Object::ClusterRoleBinding(binding.clone()), created).await?;
        }
        apply(cluster, Object::Deployment(unit.workload.clone()), created).await?;
        if let Some(service) = &unit.service {
            let object = Object::Service(service.clone());
            if let Object::Service(service) = apply(cluster, object, created).await? {
                unit.endpoints = endpoints(&service);
            }
        }
    }

    Ok(units
        .iter()
        .flat_map(|unit| unit.endpoints.iter().cloned())
        .collect())
}

async fn apply(
    cluster: &dyn Cluster,
    object: Object,
    created: &mut Vec<Created>,
) -> Result<Object, Error> {
    info!("Creating {} {}", object.kind(), object.name());
    let stored = cluster.create(&object).await?;
    created.push(Created {
        kind: object.kind(),
        name: object.name().to_string(),
        namespace: object.namespace().map(String::from),
    });
    let (kind, name) = (stored.kind(), stored.name());
    match stored.namespace() {
        Some(namespace) => info!("Created {kind} {name} on namespace {namespace}"),
        None => info!("Created {kind} {name}"),
    }
    Ok(stored)
}

/// `portName:externalPort` for each port of an externally reachable service.
///
/// Falls back to the service port when the API server reports no node port.
pub fn endpoints(service: &Service) -> Vec<String> {
    let Some(spec) = &service.spec else {
        return Vec::new();
    };
    if !spec
        .type_
        .as_deref()
        .is_some_and(|t| EXPOSED_SERVICE_TYPES.contains(&t))
    {
        return Vec::new();
    }
    spec.ports
        .iter()
        .flatten()
        .map(|port| {
            format!(
                "{}:{}",
                port.name.as_deref().unwrap_or_default(),
                port.node_port.unwrap_or(port.port)
            )
        })
        .collect()
}
