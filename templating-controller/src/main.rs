use std::sync::Arc;

use envconfig::Envconfig;
use kube::Client;
use templating_controller::{
    config::ControllerConfig, controller, init_tracing, registry::TypeRegistry,
};
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    // Ensure rustls uses the aws-lc-rs provider explicitly.
    // This avoids runtime errors when no default provider is set.
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        // It's fine if a compatible provider was already installed.
        tracing::debug!(
            ?e,
            "CryptoProvider already installed or incompatible; proceeding"
        );
    }

    let cfg = ControllerConfig::init_from_env()?;
    info!(?cfg, "starting templating controller");

    let client = Client::try_default().await?;
    let registry = Arc::new(TypeRegistry::discover(client.clone()).await?);
    controller::run_controller(client, cfg, registry).await
}
