use std::collections::HashMap;

use kube::Client;
use kube::core::{GroupVersionKind, TypeMeta};
use kube::discovery::{ApiResource, Discovery};
use tracing::debug;

/// Maps kinds to the API resource metadata needed to talk to them.
///
/// Built once at startup from API discovery and shared by reference; kinds
/// the cluster never advertised fall back to a GVK-derived guess.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    resources: HashMap<String, ApiResource>,
}

fn key(gvk: &GroupVersionKind) -> String {
    format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, gvk: &GroupVersionKind, resource: ApiResource) {
        self.resources.insert(key(gvk), resource);
    }

    pub fn resolve(&self, gvk: &GroupVersionKind) -> ApiResource {
        self.resources
            .get(&key(gvk))
            .cloned()
            .unwrap_or_else(|| ApiResource::from_gvk(gvk))
    }

    /// Seed the registry from the cluster's discovery endpoint.
    pub async fn discover(client: Client) -> kube::Result<Self> {
        let mut registry = Self::new();
        let discovery = Discovery::new(client).run().await?;
        for group in discovery.groups() {
            for (ar, _caps) in group.recommended_resources() {
                let gvk = GroupVersionKind::gvk(&ar.group, &ar.version, &ar.kind);
                debug!(kind = %gvk.kind, plural = %ar.plural, "registering discovered resource");
                registry.insert(&gvk, ar);
            }
        }
        Ok(registry)
    }
}

/// Extract the GVK from an object's type metadata.
pub fn gvk_of(types: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match types.api_version.split_once('/') {
        Some((g, v)) => (g, v),
        None => ("", types.api_version.as_str()),
    };
    GroupVersionKind::gvk(group, version, &types.kind)
}
