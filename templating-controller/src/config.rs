use std::time::Duration;

use envconfig::Envconfig;
use kube::core::GroupVersionKind;

#[derive(Envconfig, Clone, Debug)]
pub struct ControllerConfig {
    /// apiVersion of the composite kind to reconcile,
    /// e.g. "example.org/v1alpha1" (or "v1" for the core group).
    #[envconfig(from = "TMPL_TARGET_API_VERSION")]
    pub target_api_version: String,

    #[envconfig(from = "TMPL_TARGET_KIND")]
    pub target_kind: String,

    /// Rendering service endpoint. When unset the no-op engine is used,
    /// which renders zero child resources.
    #[envconfig(from = "TMPL_ENGINE_URL")]
    pub engine_url: Option<String>,

    /// Requeue delay after a pass that ended in a recoverable failure.
    #[envconfig(from = "TMPL_SHORT_WAIT_SECS", default = "30")]
    pub short_wait_secs: u64,

    /// Requeue delay after a successful pass.
    #[envconfig(from = "TMPL_LONG_WAIT_SECS", default = "60")]
    pub long_wait_secs: u64,

    /// Deadline for a single reconcile pass, covering all API calls it makes.
    #[envconfig(from = "TMPL_RECONCILE_TIMEOUT_SECS", default = "60")]
    pub reconcile_timeout_secs: u64,

    /// Field manager name used for server-side apply of child resources.
    #[envconfig(from = "TMPL_FIELD_MANAGER", default = "templating-controller")]
    pub field_manager: String,
}

impl ControllerConfig {
    pub fn target_gvk(&self) -> anyhow::Result<GroupVersionKind> {
        let (group, version) = match self.target_api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", self.target_api_version.as_str()),
        };
        if version.is_empty() || self.target_kind.is_empty() {
            anyhow::bail!(
                "TMPL_TARGET_API_VERSION and TMPL_TARGET_KIND must name the kind to reconcile"
            );
        }
        Ok(GroupVersionKind::gvk(group, version, &self.target_kind))
    }

    pub fn short_wait(&self) -> Duration {
        Duration::from_secs(self.short_wait_secs)
    }

    pub fn long_wait(&self) -> Duration {
        Duration::from_secs(self.long_wait_secs)
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }
}
