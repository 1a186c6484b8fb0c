//! Object store capability used by the claim reconciler
//!
//! The reconciler only needs three verbs per record kind. [`ObjectStore`] is
//! generic over the record type so one implementation ([`KubeStore`]) serves
//! every kind, while tests substitute mocks or an in-memory map.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, PostParams};
use kube::discovery::ApiResource;
use kube::{Client, Resource, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use clusterclaims_common::error::is_not_found;
use clusterclaims_common::{Error, KindRegistry, RecordType, FIELD_MANAGER};

/// Location of a single record
///
/// `namespace` is `None` for cluster-scoped kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Namespace of the record, if namespaced
    pub namespace: Option<String>,
    /// Name of the record
    pub name: String,
}

impl ObjectKey {
    /// Key for a cluster-scoped record
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key for a namespaced record
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key of an existing object, taken from its metadata
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.meta().namespace.clone(),
            name: obj.meta().name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Read, create and delete access to records of one kind
///
/// Not-found is never an error: `get` returns `Ok(None)` and `delete` returns
/// `Ok(())` when the record does not exist.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore<K: RecordType>: Send + Sync {
    /// Fetch a record, `None` if it does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>, Error>;

    /// Create a new record
    async fn create(&self, obj: &K) -> Result<(), Error>;

    /// Delete a record
    async fn delete(&self, obj: &K) -> Result<(), Error>;
}

/// [`ObjectStore`] backed by the Kubernetes API server
///
/// Requests go through `Api<DynamicObject>` using the API resource resolved
/// from the [`KindRegistry`], so the served version of each CRD is used even
/// when it differs from the one compiled into the record types.
pub struct KubeStore {
    client: Client,
    registry: Arc<KindRegistry>,
}

impl KubeStore {
    /// Create a store over the given client and registration table
    pub fn new(client: Client, registry: Arc<KindRegistry>) -> Self {
        Self { client, registry }
    }

    async fn api_resource<K: RecordType>(&self) -> Result<ApiResource, Error> {
        self.registry
            .resolve(K::KIND)
            .await
            .ok_or(Error::UnknownKind { kind: K::KIND })
    }

    async fn api<K: RecordType>(
        &self,
        namespace: Option<&str>,
    ) -> Result<(Api<DynamicObject>, ApiResource), Error> {
        let ar = self.api_resource::<K>().await?;
        let api = match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        };
        Ok((api, ar))
    }
}

#[async_trait]
impl<K: RecordType> ObjectStore<K> for KubeStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>, Error> {
        let (api, _) = self.api::<K>(key.namespace.as_deref()).await?;
        match api.get(&key.name).await {
            Ok(obj) => from_dynamic::<K>(obj).map(Some),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, obj: &K) -> Result<(), Error> {
        let (api, ar) = self.api::<K>(obj.meta().namespace.as_deref()).await?;
        let dynamic = to_dynamic(obj, &ar)?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        api.create(&params, &dynamic).await?;
        Ok(())
    }

    async fn delete(&self, obj: &K) -> Result<(), Error> {
        let (api, _) = self.api::<K>(obj.meta().namespace.as_deref()).await?;
        let name = obj.name_any();
        match api.delete(&name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!(kind = K::KIND.kind_str(), name = %name, "Record not found (already deleted)");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Convert a typed record into the dynamic form, stamped with the served apiVersion
fn to_dynamic<K: RecordType>(obj: &K, ar: &ApiResource) -> Result<DynamicObject, Error> {
    let mut value = serde_json::to_value(obj)
        .map_err(|e| Error::serialization_for_kind(K::KIND.kind_str(), e.to_string()))?;
    if let Some(map) = value.as_object_mut() {
        map.insert("apiVersion".into(), ar.api_version.clone().into());
        map.insert("kind".into(), ar.kind.clone().into());
    }
    serde_json::from_value(value)
        .map_err(|e| Error::serialization_for_kind(K::KIND.kind_str(), e.to_string()))
}

fn from_dynamic<K: RecordType>(obj: DynamicObject) -> Result<K, Error> {
    let value = serde_json::to_value(obj)
        .map_err(|e| Error::serialization_for_kind(K::KIND.kind_str(), e.to_string()))?;
    serde_json::from_value(value)
        .map_err(|e| Error::serialization_for_kind(K::KIND.kind_str(), e.to_string()))
}
