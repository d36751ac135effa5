use anyhow::Context;
use async_trait::async_trait;
use kube::core::DynamicObject;
use serde::Deserialize;
use tracing::debug;

use crate::controller::engine::Engine;

/// Rendering engine backed by an HTTP service: POSTs the composite as JSON
/// and decodes the returned manifest stream. The transport format is opaque
/// to the reconciler; this engine owns it.
pub struct RestEngine {
    url: String,
    http: reqwest::Client,
}

impl RestEngine {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Engine for RestEngine {
    async fn run(
        &self,
        composite: &DynamicObject,
    ) -> anyhow::Result<Vec<DynamicObject>> {
        let response = self
            .http
            .post(&self.url)
            .json(composite)
            .send()
            .await
            .context("cannot make call to the rendering server")?
            .error_for_status()
            .context("rendering server returned an error")?;
        let body = response
            .text()
            .await
            .context("cannot read rendering response")?;
        let objects = decode_manifests(&body)?;
        debug!(count = objects.len(), "rendering server returned manifests");
        Ok(objects)
    }
}

/// Decode a multi-document YAML (or JSON) stream into dynamic objects.
/// An empty stream is a valid "no objects" result, not an error.
pub fn decode_manifests(body: &str) -> anyhow::Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(body) {
        let value = serde_json::Value::deserialize(doc)
            .context("cannot decode rendered manifest")?;
        if value.is_null() {
            continue;
        }
        let object: DynamicObject = serde_json::from_value(value)
            .context("rendered manifest is not a valid object")?;
        objects.push(object);
    }
    Ok(objects)
}
