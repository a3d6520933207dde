//! Kubernetes API Backend
//!
//! Serves a `ResourceStore` per (group, version, kind) through the dynamic
//! object API, so the same resource can be requested under any version the
//! API server exposes.

use crate::domain::context::RequestContext;
use crate::domain::ports::{ResourceStore, StoreProvider};
use crate::domain::types::{
    DeleteOptions, GetOptions, ListOptions, ResourceList, ResourceObject, ResourceType,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use kube::api::{
    Api, DeleteParams, DynamicObject, GetParams, ListParams, PostParams, Preconditions,
};
use kube::core::{ApiResource, GroupVersionKind};
use kube::Client;
use std::sync::Arc;
use tracing::debug;

/// Builds stores against one cluster connection
#[derive(Clone)]
pub struct KubeStoreProvider {
    client: Client,
}

impl KubeStoreProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect with the inferred kubeconfig or in-cluster config
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }
}

impl StoreProvider for KubeStoreProvider {
    fn store(&self, resource: &ResourceType) -> Result<Arc<dyn ResourceStore>> {
        Ok(Arc::new(KubeStore::new(self.client.clone(), resource.clone())))
    }
}

pub(crate) fn api_resource(resource: &ResourceType) -> ApiResource {
    let gvk = GroupVersionKind::gvk(&resource.group, &resource.version, &resource.kind);
    ApiResource::from_gvk_with_plural(&gvk, &resource.plural)
}

/// Store bound to one resource version
pub struct KubeStore {
    client: Client,
    resource: ResourceType,
    api_resource: ApiResource,
}

impl KubeStore {
    pub fn new(client: Client, resource: ResourceType) -> Self {
        let api_resource = api_resource(&resource);
        Self {
            client,
            resource,
            api_resource,
        }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.api_resource)
    }

    fn map_error(&self, err: kube::Error, name: &str) -> Error {
        map_api_error(&self.resource, err, name)
    }
}

fn map_api_error(resource: &ResourceType, err: kube::Error, name: &str) -> Error {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => Error::not_found(&resource.plural, name),
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            Error::AlreadyExists {
                kind: resource.plural.clone(),
                name: name.to_string(),
            }
        }
        kube::Error::Api(resp) if resp.code == 409 => Error::Conflict {
            kind: resource.plural.clone(),
            name: name.to_string(),
            reason: resp.message,
        },
        other => Error::Kube(other),
    }
}

fn to_dynamic(obj: ResourceObject) -> Result<DynamicObject> {
    Ok(serde_json::from_value(obj.into_value())?)
}

fn from_dynamic(obj: DynamicObject) -> Result<ResourceObject> {
    ResourceObject::from_value(serde_json::to_value(obj)?)
}

fn list_params(opts: &ListOptions) -> ListParams {
    let mut lp = ListParams::default();
    if let Some(selector) = opts.label_selector.as_deref() {
        lp = lp.labels(selector);
    }
    if let Some(limit) = opts.limit.filter(|l| *l > 0) {
        lp = lp.limit(limit);
    }
    if let Some(token) = opts.continue_token.as_deref() {
        lp = lp.continue_token(token);
    }
    lp
}

fn delete_params(opts: &DeleteOptions) -> DeleteParams {
    DeleteParams {
        preconditions: opts.resource_version.as_ref().map(|rv| Preconditions {
            resource_version: Some(rv.clone()),
            uid: None,
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    fn resource(&self) -> &ResourceType {
        &self.resource
    }

    async fn get(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        name: &str,
        opts: &GetOptions,
    ) -> Result<ResourceObject> {
        let params = match opts.resource_version.as_deref() {
            Some(rv) => GetParams::at(rv),
            None => GetParams::default(),
        };
        let obj = self
            .api(namespace)
            .get_with(name, &params)
            .await
            .map_err(|e| self.map_error(e, name))?;
        from_dynamic(obj)
    }

    async fn create(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        obj: ResourceObject,
    ) -> Result<ResourceObject> {
        let name = obj.require_name()?.to_string();
        let created = self
            .api(namespace)
            .create(&PostParams::default(), &to_dynamic(obj)?)
            .await
            .map_err(|e| self.map_error(e, &name))?;
        debug!(
            resource = %self.resource,
            namespace = %namespace,
            name = %name,
            "Created object"
        );
        from_dynamic(created)
    }

    async fn update(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        obj: ResourceObject,
    ) -> Result<ResourceObject> {
        let name = obj.require_name()?.to_string();
        let replaced = self
            .api(namespace)
            .replace(&name, &PostParams::default(), &to_dynamic(obj)?)
            .await
            .map_err(|e| self.map_error(e, &name))?;
        from_dynamic(replaced)
    }

    async fn delete(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        name: &str,
        opts: &DeleteOptions,
    ) -> Result<()> {
        self.api(namespace)
            .delete(name, &delete_params(opts))
            .await
            .map_err(|e| self.map_error(e, name))?;
        Ok(())
    }

    async fn delete_collection(&self, _ctx: &RequestContext, namespace: &str) -> Result<()> {
        self.api(namespace)
            .delete_collection(&DeleteParams::default(), &ListParams::default())
            .await
            .map_err(|e| self.map_error(e, "*"))?;
        Ok(())
    }

    async fn list(
        &self,
        _ctx: &RequestContext,
        namespace: &str,
        opts: &ListOptions,
    ) -> Result<ResourceList> {
        let list = self
            .api(namespace)
            .list(&list_params(opts))
            .await
            .map_err(|e| self.map_error(e, "*"))?;

        let continue_token = list.metadata.continue_.filter(|t| !t.is_empty());
        let items = list
            .items
            .into_iter()
            .map(from_dynamic)
            .collect::<Result<Vec<_>>>()?;
        Ok(ResourceList {
            items,
            continue_token,
        })
    }
}
