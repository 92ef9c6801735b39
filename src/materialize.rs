use crate::tag::Plan;
use crate::template::{Error, Kind, TemplateSource};
use crate::unit::{name_of, DeploymentUnit, PlannedUnit};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;

/// The identity every namespace gets from the platform; never renamed.
const DEFAULT_SERVICE_ACCOUNT: &str = "default";
const SERVICE_ACCOUNT_SUBJECT: &str = "ServiceAccount";

/// Load and rewrite the templates of every planned unit.
///
/// Fails on the first missing workload template or undecodable template;
/// a partially materialized plan is never returned.
pub fn materialize(
    plan: &Plan,
    templates: &dyn TemplateSource,
) -> Result<Vec<DeploymentUnit>, Error> {
    plan.units
        .iter()
        .map(|planned| materialize_unit(planned, &plan.namespace, templates))
        .collect()
}

fn materialize_unit(
    planned: &PlannedUnit,
    namespace: &str,
    templates: &dyn TemplateSource,
) -> Result<DeploymentUnit, Error> {
    let component = planned.component.as_str();
    info!("Materializing {component} ({}={})", planned.repository, planned.revision);

    // Identities first: the workload and the binding subjects refer to the scoped names.
    let service_account = load::<ServiceAccount>(templates, component, Kind::ServiceAccount)?
        .map(|sa| scope_service_account(sa, namespace));
    let cluster_role = load::<ClusterRole>(templates, component, Kind::ClusterRole)?
        .map(|role| scope_cluster_role(role, namespace));
    let cluster_role_binding =
        load::<ClusterRoleBinding>(templates, component, Kind::ClusterRoleBinding)?
            .map(|binding| scope_cluster_role_binding(binding, namespace));

    let workload = load::<Deployment>(templates, component, Kind::Workload)?.ok_or_else(|| {
        Error::NotFound {
            component: component.to_string(),
            kind: Kind::Workload,
        }
    })?;
    let workload = rewrite_workload(
        workload,
        namespace,
        &planned.revision,
        service_account.as_ref(),
    );

    let service = load::<Service>(templates, component, Kind::Service)?.map(|mut service| {
        service.metadata.namespace = workload.metadata.namespace.clone();
        service
    });

    Ok(DeploymentUnit {
        component: planned.component.clone(),
        repository: planned.repository.clone(),
        revision: planned.revision.clone(),
        namespace: namespace.to_string(),
        workload,
        service_account,
        cluster_role,
        cluster_role_binding,
        service,
        endpoints: Vec::new(),
    })
}

fn load<K>(templates: &dyn TemplateSource, component: &str, kind: Kind) -> Result<Option<K>, Error>
where
    K: kube::Resource + DeserializeOwned,
{
    match templates.find(component, kind)? {
        Some(template) => template.decode().map(Some),
        None => {
            info!("No {kind} template for {component}");
            Ok(None)
        }
    }
}

fn scoped(name: &str, namespace: &str) -> String {
    format!("{name}{namespace}")
}

fn scope_service_account(mut sa: ServiceAccount, namespace: &str) -> ServiceAccount {
    sa.metadata.name = Some(scoped(name_of(&sa), namespace));
    sa.metadata.namespace = Some(namespace.to_string());
    sa
}

/// Cluster roles are not namespaced; the namespace is kept for bookkeeping only.
fn scope_cluster_role(mut role: ClusterRole, namespace: &str) -> ClusterRole {
    role.metadata.name = Some(scoped(name_of(&role), namespace));
    role.metadata.namespace = Some(namespace.to_string());
    role
}

fn scope_cluster_role_binding(
    mut binding: ClusterRoleBinding,
    namespace: &str,
) -> ClusterRoleBinding {
    binding.metadata.name = Some(scoped(name_of(&binding), namespace));
    binding.metadata.namespace = Some(namespace.to_string());

    for subject in binding.subjects.iter_mut().flatten() {
        if subject.kind != SERVICE_ACCOUNT_SUBJECT {
            continue;
        }
        if subject.name != DEFAULT_SERVICE_ACCOUNT {
            subject.name = scoped(&subject.name, namespace);
        }
        subject.namespace = Some(namespace.to_string());
    }
    binding
}

fn rewrite_workload(
    mut workload: Deployment,
    namespace: &str,
    revision: &str,
    service_account: Option<&ServiceAccount>,
) -> Deployment {
    workload.metadata.namespace = Some(namespace.to_string());

    let Some(pod) = workload
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
    else {
        warn!("Workload {} has no pod spec", name_of(&workload));
        return workload;
    };

    if pod.service_account_name.as_deref().is_some_and(|name| !name.is_empty()) {
        match service_account {
            Some(sa) => pod.service_account_name = sa.metadata.name.clone(),
            None => {
                warn!(
                    "Workload declares service account {:?} but no service account template exists; using the namespace default",
                    pod.service_account_name
                );
                pod.service_account_name = None;
            }
        }
    }

    for container in &mut pod.containers {
        if let Some(image) = container.image.as_mut() {
            let retagged = retag_image(image, revision);
            debug!("Container {}: {} -> {}", container.name, image, retagged);
            *image = retagged;
        }
    }
    workload
}

/// Replace the tag of an image reference, keeping the registry and image name.
///
/// A `:` before the last `/` belongs to a registry port, not a tag; references
/// without a tag get one appended. A `@digest` pin is dropped in favour of the tag.
pub fn retag_image(image: &str, revision: &str) -> String {
    let image = match image.split_once('@') {
        Some((name, digest)) => {
            warn!("Dropping digest {digest} of {name} to deploy revision {revision}");
            name
        }
        None => image,
    };
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    let repository = match image[name_start..].rfind(':') {
        Some(colon) => &image[..name_start + colon],
        None => image,
    };
    format!("{repository}:{revision}")
}
