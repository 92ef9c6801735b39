use crate::cluster::{Cluster, Error, ObjectKind, Propagation};
use crate::orchestrator::Created;
use crate::unit::{name_of, DeploymentUnit};
use log::{info, warn};

const FOREGROUND: Propagation = Propagation::Foreground;

/// Delete every unit's objects, then the namespaces they lived in.
///
/// Per unit: workload, service, service account, cluster role binding, cluster role.
/// Objects that are already gone count as deleted, so running this twice is safe.
/// Any other failure aborts the run.
pub async fn delete(cluster: &dyn Cluster, units: &[DeploymentUnit]) -> Result<(), Error> {
    let mut namespaces: Vec<&str> = Vec::new();

    for unit in units {
        let namespace = unit.namespace.as_str();
        if !namespaces.contains(&namespace) {
            namespaces.push(namespace);
        }

        let workload = unit.workload_name();
        remove(cluster, ObjectKind::Deployment, workload, Some(namespace), FOREGROUND).await?;
        if let Some(service) = &unit.service {
            let namespace = service.metadata.namespace.as_deref();
            remove(cluster, ObjectKind::Service, name_of(service), namespace, FOREGROUND).await?;
        }
        if let Some(sa) = &unit.service_account {
            let namespace = sa.metadata.namespace.as_deref();
            remove(cluster, ObjectKind::ServiceAccount, name_of(sa), namespace, FOREGROUND).await?;
        }
        if let Some(binding) = &unit.cluster_role_binding {
            let name = name_of(binding);
            remove(cluster, ObjectKind::ClusterRoleBinding, name, None, FOREGROUND).await?;
        }
        if let Some(role) = &unit.cluster_role {
            remove(cluster, ObjectKind::ClusterRole, name_of(role), None, FOREGROUND).await?;
        }
    }

    for namespace in namespaces {
        remove(cluster, ObjectKind::Namespace, namespace, None, Propagation::ServerDefault).await?;
    }

    Ok(())
}

/// Delete what a failed create left behind, newest first.
///
/// Only the recorded objects are touched, so anything that existed before the
/// run survives. Objects that are already gone count as deleted.
pub async fn undo(cluster: &dyn Cluster, created: &[Created]) -> Result<(), Error> {
    for object in created.iter().rev() {
        let (propagation, namespace) = match object.kind {
            ObjectKind::Namespace => (Propagation::ServerDefault, None),
            ObjectKind::ClusterRole | ObjectKind::ClusterRoleBinding => (FOREGROUND, None),
            _ => (FOREGROUND, object.namespace.as_deref()),
        };
        remove(cluster, object.kind, &object.name, namespace, propagation).await?;
    }
    Ok(())
}

async fn remove(
    cluster: &dyn Cluster,
    kind: ObjectKind,
    name: &str,
    namespace: Option<&str>,
    propagation: Propagation,
) -> Result<(), Error> {
    info!("Deleting {kind} {name}");
    match cluster.delete(kind, name, namespace, propagation).await {
        Ok(()) => {
            info!("Deleted {kind} {name}");
            Ok(())
        }
        Err(err) if err.is_not_found() => {
            warn!("{err}");
            Ok(())
        }
        Err(err) => Err(err),
    }
}
