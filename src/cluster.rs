use crate::unit::name_of;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::{Api, Client};
use log::debug;
use serde::de::DeserializeOwned;
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{kind} {name} not found")]
    NotFound { kind: ObjectKind, name: String },

    #[error("{kind} {name}: {source}")]
    Api {
        kind: ObjectKind,
        name: String,
        source: kube::Error,
    },

    #[error("list namespaces: {0}")]
    List(kube::Error),

    #[error("kubernetes client: {0}")]
    Client(#[from] kube::Error),

    #[error("kubeconfig: {0}")]
    Kubeconfig(#[from] KubeconfigError),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Sort an API server error into not-found or a real failure.
fn classify(err: kube::Error, kind: ObjectKind, name: &str) -> Error {
    match err {
        kube::Error::Api(response) if response.code == 404 => Error::NotFound {
            kind,
            name: name.to_string(),
        },
        source => Error::Api {
            kind,
            name: name.to_string(),
            source,
        },
    }
}

/// The kinds of cluster objects this tool manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Namespace,
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    Deployment,
    Service,
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ObjectKind::Namespace => "namespace",
            ObjectKind::ServiceAccount => "service account",
            ObjectKind::ClusterRole => "cluster role",
            ObjectKind::ClusterRoleBinding => "cluster role binding",
            ObjectKind::Deployment => "deployment",
            ObjectKind::Service => "service",
        })
    }
}

#[derive(Debug, Clone)]
pub enum Object {
    Namespace(Namespace),
    ServiceAccount(ServiceAccount),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
    Deployment(Deployment),
    Service(Service),
}

impl Object {
    pub fn namespace_named(name: &str) -> Self {
        let mut namespace = Namespace::default();
        namespace.metadata.name = Some(name.to_string());
        Object::Namespace(namespace)
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Namespace(_) => ObjectKind::Namespace,
            Object::ServiceAccount(_) => ObjectKind::ServiceAccount,
            Object::ClusterRole(_) => ObjectKind::ClusterRole,
            Object::ClusterRoleBinding(_) => ObjectKind::ClusterRoleBinding,
            Object::Deployment(_) => ObjectKind::Deployment,
            Object::Service(_) => ObjectKind::Service,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Object::Namespace(o) => name_of(o),
            Object::ServiceAccount(o) => name_of(o),
            Object::ClusterRole(o) => name_of(o),
            Object::ClusterRoleBinding(o) => name_of(o),
            Object::Deployment(o) => name_of(o),
            Object::Service(o) => name_of(o),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        let meta = match self {
            Object::Namespace(o) => &o.metadata,
            Object::ServiceAccount(o) => &o.metadata,
            Object::ClusterRole(o) => &o.metadata,
            Object::ClusterRoleBinding(o) => &o.metadata,
            Object::Deployment(o) => &o.metadata,
            Object::Service(o) => &o.metadata,
        };
        meta.namespace.as_deref()
    }
}

/// How deletion treats dependent objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// The object is gone only once its dependents are.
    Foreground,
    /// Whatever the API server defaults to for the kind.
    ServerDefault,
}

/// The subset of the Kubernetes control plane used for deployments.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Names of all namespaces currently present.
    async fn namespaces(&self) -> Result<Vec<String>, Error>;

    /// Create an object, returning it as stored by the API server.
    async fn create(&self, object: &Object) -> Result<Object, Error>;

    /// Delete an object. A missing object yields [Error::NotFound].
    async fn delete(
        &self,
        kind: ObjectKind,
        name: &str,
        namespace: Option<&str>,
        propagation: Propagation,
    ) -> Result<(), Error>;
}

/// [Cluster] backed by a live API server.
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Connect using an explicit kubeconfig file, or the default discovery
    /// (`KUBECONFIG`, `~/.kube/config`, in-cluster) when none is given.
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self, Error> {
        let client = match kubeconfig {
            Some(path) => {
                debug!("Using kubeconfig {}", path.display());
                let kubeconfig = Kubeconfig::read_from(path)?;
                let config =
                    kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await?;
                Client::try_from(config)?
            }
            None => Client::try_default().await?,
        };
        Ok(Self { client })
    }

    fn namespaced<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        match namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::default_namespaced(self.client.clone()),
        }
    }

    fn cluster_wide<K>(&self) -> Api<K>
    where
        K: kube::Resource<DynamicType = ()>,
    {
        Api::all(self.client.clone())
    }
}

async fn create<K>(api: Api<K>, object: &K) -> Result<K, kube::Error>
where
    K: kube::Resource + Clone + Debug + DeserializeOwned + serde::Serialize,
{
    api.create(&PostParams::default(), object).await
}

async fn delete<K>(api: Api<K>, name: &str, params: &DeleteParams) -> Result<(), kube::Error>
where
    K: kube::Resource + Clone + Debug + DeserializeOwned,
{
    api.delete(name, params).await.map(|_| ())
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn namespaces(&self) -> Result<Vec<String>, Error> {
        let namespaces = self
            .cluster_wide::<Namespace>()
            .list(&ListParams::default())
            .await
            .map_err(Error::List)?;
        Ok(namespaces
            .items
            .iter()
            .map(|namespace| name_of(namespace).to_string())
            .collect())
    }

    async fn create(&self, object: &Object) -> Result<Object, Error> {
        let namespace = object.namespace();
        let created = match object {
            Object::Namespace(o) => create(self.cluster_wide(), o).await.map(Object::Namespace),
            Object::ServiceAccount(o) => create(self.namespaced(namespace), o)
                .await
                .map(Object::ServiceAccount),
            Object::ClusterRole(o) => create(self.cluster_wide(), o).await.map(Object::ClusterRole),
            Object::ClusterRoleBinding(o) => create(self.cluster_wide(), o)
                .await
                .map(Object::ClusterRoleBinding),
            Object::Deployment(o) => create(self.namespaced(namespace), o)
                .await
                .map(Object::Deployment),
            Object::Service(o) => create(self.namespaced(namespace), o).await.map(Object::Service),
        };
        created.map_err(|err| classify(err, object.kind(), object.name()))
    }

    async fn delete(
        &self,
        kind: ObjectKind,
        name: &str,
        namespace: Option<&str>,
        propagation: Propagation,
    ) -> Result<(), Error> {
        let params = match propagation {
            Propagation::Foreground => DeleteParams::foreground(),
            Propagation::ServerDefault => DeleteParams::default(),
        };
        let deleted = match kind {
            ObjectKind::Namespace => delete::<Namespace>(self.cluster_wide(), name, &params).await,
            ObjectKind::ServiceAccount => {
                delete::<ServiceAccount>(self.namespaced(namespace), name, &params).await
            }
            ObjectKind::ClusterRole => {
                delete::<ClusterRole>(self.cluster_wide(), name, &params).await
            }
            ObjectKind::ClusterRoleBinding => {
                delete::<ClusterRoleBinding>(self.cluster_wide(), name, &params).await
            }
            ObjectKind::Deployment => {
                delete::<Deployment>(self.namespaced(namespace), name, &params).await
            }
            ObjectKind::Service => {
                delete::<Service>(self.namespaced(namespace), name, &params).await
            }
        };
        deleted.map_err(|err| classify(err, kind, name))
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use kube::core::ErrorResponse;
    use std::collections::HashSet;
    use std::sync::Mutex;

    const FIRST_NODE_PORT: i32 = 30000;

    /// A call made against the [FakeCluster], in the order it happened.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        ListNamespaces,
        Create(ObjectKind, String),
        Delete(ObjectKind, String, Propagation),
    }

    #[derive(Default)]
    struct State {
        calls: Vec<Call>,
        live: HashSet<(ObjectKind, String)>,
        failing_creates: HashSet<(ObjectKind, String)>,
        failing_deletes: HashSet<(ObjectKind, String)>,
        next_node_port: i32,
    }

    /// In-memory [Cluster] that records calls and can be told to fail.
    #[derive(Default)]
    pub struct FakeCluster {
        state: Mutex<State>,
    }

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: reason.to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    impl FakeCluster {
        pub fn with_namespace(self, name: &str) -> Self {
            self.state
                .lock()
                .unwrap()
                .live
                .insert((ObjectKind::Namespace, name.to_string()));
            self
        }

        /// Make creating the given object fail with a server error.
        pub fn failing_create(self, kind: ObjectKind, name: &str) -> Self {
            self.state
                .lock()
                .unwrap()
                .failing_creates
                .insert((kind, name.to_string()));
            self
        }

        /// Make deleting the given object fail with a server error.
        pub fn failing_delete(self, kind: ObjectKind, name: &str) -> Self {
            self.state
                .lock()
                .unwrap()
                .failing_deletes
                .insert((kind, name.to_string()));
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.state.lock().unwrap().calls.clone()
        }

        pub fn clear_calls(&self) {
            self.state.lock().unwrap().calls.clear();
        }

        pub fn is_live(&self, kind: ObjectKind, name: &str) -> bool {
            self.state
                .lock()
                .unwrap()
                .live
                .contains(&(kind, name.to_string()))
        }

        pub fn live_count(&self) -> usize {
            self.state.lock().unwrap().live.len()
        }
    }

    #[async_trait]
    impl Cluster for FakeCluster {
        async fn namespaces(&self) -> Result<Vec<String>, Error> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::ListNamespaces);
            Ok(state
                .live
                .iter()
                .filter(|(kind, _)| *kind == ObjectKind::Namespace)
                .map(|(_, name)| name.clone())
                .collect())
        }

        async fn create(&self, object: &Object) -> Result<Object, Error> {
            let mut state = self.state.lock().unwrap();
            let key = (object.kind(), object.name().to_string());
            state.calls.push(Call::Create(key.0, key.1.clone()));

            if state.failing_creates.contains(&key) {
                return Err(classify(api_error(500, "InternalError"), key.0, &key.1));
            }
            if !state.live.insert(key.clone()) {
                return Err(classify(api_error(409, "AlreadyExists"), key.0, &key.1));
            }

            let mut created = object.clone();
            if let Object::Service(service) = &mut created {
                let exposed = service.spec.as_ref().and_then(|s| s.type_.as_deref());
                if matches!(exposed, Some("NodePort") | Some("LoadBalancer")) {
                    for port in service
                        .spec
                        .iter_mut()
                        .flat_map(|spec| spec.ports.iter_mut().flatten())
                    {
                        port.node_port = Some(FIRST_NODE_PORT + state.next_node_port);
                        state.next_node_port += 1;
                    }
                }
            }
            Ok(created)
        }

        async fn delete(
            &self,
            kind: ObjectKind,
            name: &str,
            _namespace: Option<&str>,
            propagation: Propagation,
        ) -> Result<(), Error> {
            let mut state = self.state.lock().unwrap();
            state
                .calls
                .push(Call::Delete(kind, name.to_string(), propagation));
            let key = (kind, name.to_string());

            if state.failing_deletes.contains(&key) {
                return Err(classify(api_error(500, "InternalError"), kind, name));
            }
            if !state.live.remove(&key) {
                return Err(classify(api_error(404, "NotFound"), kind, name));
            }
            Ok(())
        }
    }
}
