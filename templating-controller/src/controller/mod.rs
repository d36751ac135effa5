pub mod engine;
pub mod patcher;
pub mod reconcile;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use kube::core::DynamicObject;
use kube::runtime::{Controller, controller::Action, watcher::Config};
use kube::{Client, ResourceExt, api::Api};
use tracing::{error, info};

use crate::client::KubeResourceClient;
use crate::config::ControllerConfig;
use crate::operations::rest::RestEngine;
use crate::registry::TypeRegistry;
use self::engine::{Engine, NopEngine};
use self::reconcile::{ReconcileErr, Reconciler};

pub struct ControllerContext {
    pub reconciler: Reconciler,
    pub short_wait: Duration,
}

pub async fn run_controller(
    client: Client,
    cfg: ControllerConfig,
    registry: Arc<TypeRegistry>,
) -> anyhow::Result<()> {
    let gvk = cfg.target_gvk()?;
    let target = registry.resolve(&gvk);

    let resource_client = Arc::new(KubeResourceClient::new(
        client.clone(),
        target.clone(),
        registry,
        cfg.field_manager.clone(),
    ));
    let engine: Box<dyn Engine> = match cfg.engine_url.as_deref() {
        Some(url) => Box::new(RestEngine::new(url)),
        None => Box::new(NopEngine),
    };
    let reconciler = Reconciler::new(resource_client)
        .with_engine(engine)
        .with_short_wait(cfg.short_wait())
        .with_long_wait(cfg.long_wait())
        .with_timeout(cfg.reconcile_timeout());
    let ctx = Arc::new(ControllerContext {
        reconciler,
        short_wait: cfg.short_wait(),
    });

    info!(group = %gvk.group, version = %gvk.version, kind = %gvk.kind, "starting controller");
    let api: Api<DynamicObject> = Api::all_with(client, &target);
    Controller::new_with(api, Config::default(), target)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((_obj_ref, action)) => {
                    info!("reconciled: requeue={:?}", action)
                }
                Err(e) => error!(error = ?e, "reconcile error"),
            }
        })
        .await;

    Ok(())
}

async fn reconcile(
    obj: Arc<DynamicObject>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    ctx.reconciler
        .reconcile(&obj.name_any(), obj.namespace().as_deref())
        .await
}

fn error_policy(
    _obj: Arc<DynamicObject>,
    _error: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    Action::requeue(ctx.short_wait)
}
