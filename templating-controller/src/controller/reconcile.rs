use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use kube::core::DynamicObject;
use kube::runtime::controller::Action;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, instrument};

use crate::client::{ClientError, ResourceClient};
use crate::controller::engine::{Engine, NopEngine};
use crate::controller::patcher::{
    ChildResourcePatcher, OwnerReferenceAdder, PatcherChain,
};
use crate::controller::status;

const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_SHORT_WAIT: Duration = Duration::from_secs(30);
const DEFAULT_LONG_WAIT: Duration = Duration::from_secs(60);

pub const REASON_TEMPLATING: &str = "templating operation failed";
pub const REASON_PATCHERS: &str = "child resource patchers failed";
pub const REASON_APPLY: &str = "apply failed";
pub const REASON_SUCCESS: &str = "reconcile succeeded";

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error("could not get the parent resource: {0}")]
    Get(#[source] ClientError),

    #[error("could not update status of the parent resource: {0}")]
    UpdateStatus(#[source] ClientError),
}

/// Runs one fetch → render → patch → apply → status pass per invocation.
///
/// Holds only immutable configuration; all state shared between passes lives
/// in the cluster behind the [`ResourceClient`].
pub struct Reconciler {
    client: Arc<dyn ResourceClient>,
    engine: Box<dyn Engine>,
    patcher: Box<dyn ChildResourcePatcher>,
    short_wait: Duration,
    long_wait: Duration,
    timeout: Duration,
}

impl Reconciler {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self {
            client,
            engine: Box::new(NopEngine),
            patcher: Box::new(PatcherChain::new(vec![Box::new(
                OwnerReferenceAdder,
            )])),
            short_wait: DEFAULT_SHORT_WAIT,
            long_wait: DEFAULT_LONG_WAIT,
            timeout: DEFAULT_RECONCILE_TIMEOUT,
        }
    }

    pub fn with_engine(mut self, engine: Box<dyn Engine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_patcher(
        mut self,
        patcher: Box<dyn ChildResourcePatcher>,
    ) -> Self {
        self.patcher = patcher;
        self
    }

    /// Requeue delay after a pass that ended in a recoverable failure.
    pub fn with_short_wait(mut self, wait: Duration) -> Self {
        self.short_wait = wait;
        self
    }

    /// Requeue delay after a successful pass.
    pub fn with_long_wait(mut self, wait: Duration) -> Self {
        self.long_wait = wait;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[instrument(skip_all, fields(name = %name, ns = namespace.unwrap_or("")))]
    pub async fn reconcile(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Action, ReconcileErr> {
        let deadline = Instant::now() + self.timeout;

        let fetched = timeout_at(deadline, self.client.get(name, namespace))
            .await
            .unwrap_or(Err(ClientError::Timeout))
            .map_err(ReconcileErr::Get)?;
        let Some(mut cr) = fetched else {
            // The watch will fire again if the resource is recreated;
            // requeueing here would only produce noise.
            debug!("parent resource no longer exists");
            return Ok(Action::await_change());
        };
        let owner_uid = cr.metadata.uid.clone().unwrap_or_default();

        let render_result = timeout_at(deadline, self.engine.run(&cr))
            .await
            .unwrap_or_else(|_| {
                Err(anyhow::anyhow!("reconcile deadline exceeded"))
            });
        let rendered = match render_result {
            Ok(list) => list,
            Err(e) => {
                info!(error = %format!("{e:#}"), "cannot run templating operation");
                return self
                    .fail(deadline, &mut cr, REASON_TEMPLATING, format!("{e:#}"))
                    .await;
            }
        };

        let patch_result = self.patcher.patch(&cr, rendered);
        let children = match patch_result {
            Ok(list) => list,
            Err(e) => {
                info!(error = %format!("{e:#}"), "cannot run child resource patchers");
                return self
                    .fail(deadline, &mut cr, REASON_PATCHERS, format!("{e:#}"))
                    .await;
            }
        };

        for child in &children {
            let applied =
                timeout_at(deadline, self.client.apply(child, &owner_uid))
                    .await
                    .unwrap_or(Err(ClientError::Timeout));
            if let Err(e) = applied {
                let kind = child
                    .types
                    .as_ref()
                    .map(|t| t.kind.clone())
                    .unwrap_or_default();
                let message = format!(
                    "{}/{} of kind {}: {}",
                    child.name_any(),
                    child.namespace().unwrap_or_default(),
                    kind,
                    e
                );
                info!(error = %e, child = %child.name_any(), "cannot apply child resource");
                return self
                    .fail(deadline, &mut cr, REASON_APPLY, message)
                    .await;
            }
        }

        debug!("reconciliation finished with success");
        status::upsert_condition(
            &mut cr,
            status::ready_true(REASON_SUCCESS, "all child resources applied"),
        );
        self.persist_status(deadline, &cr).await?;
        Ok(Action::requeue(self.long_wait))
    }

    /// Record a recoverable failure on the composite and schedule the short
    /// wait. Only a failing status write escalates into a pass error.
    async fn fail(
        &self,
        deadline: Instant,
        cr: &mut DynamicObject,
        reason: &str,
        message: String,
    ) -> Result<Action, ReconcileErr> {
        status::upsert_condition(cr, status::ready_false(reason, message));
        self.persist_status(deadline, cr).await?;
        Ok(Action::requeue(self.short_wait))
    }

    async fn persist_status(
        &self,
        deadline: Instant,
        cr: &DynamicObject,
    ) -> Result<(), ReconcileErr> {
        timeout_at(deadline, self.client.update_status(cr))
            .await
            .unwrap_or(Err(ClientError::Timeout))
            .map_err(ReconcileErr::UpdateStatus)
    }
}
