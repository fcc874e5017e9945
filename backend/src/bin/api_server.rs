use anyhow::{bail, Context as _};
use backend::{
    api::router,
    app::{
        chain::erc721::Erc721Reader, gallery::reconcile::Reconciler,
        metadata::HttpMetadataFetcher, profile::ProfileClient, App,
    },
    cfg::Config,
    log::setup_log,
};
use services_common::{
    api::server::{serve, AppState},
    cfg::load_config,
    evm::pool::EvmPool,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    setup_log();
    let cfg = load_config::<Config>("api_server")?;

    let evm_pool = EvmPool::from_cfg(cfg.evm_pool)?;
    let node_chain_id = evm_pool
        .rpc_client()
        .use_single()
        .await
        .chain_id()
        .await
        .context("query node chain id")?;
    if node_chain_id != cfg.gallery.chain_id {
        bail!(
            "rpc node serves chain {node_chain_id}, gallery expects {}",
            cfg.gallery.chain_id
        );
    }

    let metadata = HttpMetadataFetcher::new(&cfg.gallery.metadata)?;
    info!(
        "serving collection of {} on chain {}",
        cfg.gallery.contract_address, cfg.gallery.chain_id
    );
    let reconciler = Reconciler::new(
        Arc::new(Erc721Reader::new(evm_pool)),
        Arc::new(metadata),
        cfg.gallery,
    );
    let profiles = ProfileClient::new(&cfg.profile)?;

    let app = Arc::new(App::new(reconciler, profiles, cfg.sessions));
    app.serve_expiry();
    let api_state = AppState::new(app, cfg.api);
    info!("Starting API server");
    serve::<_, backend::api::ApiDoc>(api_state, router()).await?;
    Ok(())
}
