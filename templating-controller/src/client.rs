use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::core::DynamicObject;
use kube::discovery::ApiResource;
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::trace;

use crate::registry::{TypeRegistry, gvk_of};

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("api request failed: {0}")]
    Api(#[from] kube::Error),

    #[error("cannot serialize object: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{kind} {namespace}/{name} is controlled by another owner")]
    NotControllable {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("object is missing type metadata")]
    MissingTypeMeta,

    #[error("deadline exceeded")]
    Timeout,
}

/// The cluster collaborator the reconciler talks to: bounded reads,
/// ownership-checked writes and status updates.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetch the composite by identity. `Ok(None)` means it no longer exists.
    async fn get(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<DynamicObject>, ClientError>;

    /// Create or update a child resource. The write is rejected when an
    /// existing object is controlled by a different owner uid.
    async fn apply(
        &self,
        object: &DynamicObject,
        owner_uid: &str,
    ) -> Result<(), ClientError>;

    /// Persist the composite's status subresource.
    async fn update_status(
        &self,
        composite: &DynamicObject,
    ) -> Result<(), ClientError>;
}

pub struct KubeResourceClient {
    client: Client,
    target: ApiResource,
    registry: Arc<TypeRegistry>,
    field_manager: String,
}

impl KubeResourceClient {
    pub fn new(
        client: Client,
        target: ApiResource,
        registry: Arc<TypeRegistry>,
        field_manager: String,
    ) -> Self {
        Self {
            client,
            target,
            registry,
            field_manager,
        }
    }

    fn api_for(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
    ) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => {
                Api::namespaced_with(self.client.clone(), ns, resource)
            }
            None => Api::all_with(self.client.clone(), resource),
        }
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<DynamicObject>, ClientError> {
        let api = self.api_for(&self.target, namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn apply(
        &self,
        object: &DynamicObject,
        owner_uid: &str,
    ) -> Result<(), ClientError> {
        let types = object.types.as_ref().ok_or(ClientError::MissingTypeMeta)?;
        let resource = self.registry.resolve(&gvk_of(types));
        let name = object.name_any();
        let namespace = object.namespace();
        let api = self.api_for(&resource, namespace.as_deref());

        // The write must not adopt an object controlled by someone else.
        // Read-then-patch leaves a window for a concurrent adoption to slip
        // through; the next pass re-reads and reports NotControllable.
        if let Some(existing) = api.get_opt(&name).await? {
            let controller = existing
                .metadata
                .owner_references
                .as_ref()
                .and_then(|refs| {
                    refs.iter().find(|r| r.controller == Some(true))
                });
            if let Some(r) = controller {
                if r.uid != owner_uid {
                    return Err(ClientError::NotControllable {
                        kind: types.kind.clone(),
                        namespace: namespace.unwrap_or_default(),
                        name,
                    });
                }
            }
        }

        let pp = PatchParams::apply(&self.field_manager).force();
        let value = serde_json::to_value(object)?;
        trace!(kind = %types.kind, resource = %name, "applying child resource");
        api.patch(&name, &pp, &Patch::Apply(&value)).await?;
        Ok(())
    }

    async fn update_status(
        &self,
        composite: &DynamicObject,
    ) -> Result<(), ClientError> {
        let api = self.api_for(&self.target, composite.namespace().as_deref());
        let status = composite
            .data
            .get("status")
            .cloned()
            .unwrap_or_else(|| json!({}));
        let patch = json!({ "status": status });
        api.patch_status(
            &composite.name_any(),
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}
