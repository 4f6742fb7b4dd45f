pub mod action;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod metrics_defs;
pub mod service;
pub mod upstream;

#[cfg(test)]
mod testutils;

use dispatcher::Dispatcher;
use errors::RelayError;
use service::RelayService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use upstream::HttpUpstream;

pub async fn run(config: config::Config) -> Result<(), RelayError> {
    config.validate()?;

    let upstream = HttpUpstream::new(config.upstream.timeout())?;
    let dispatcher = Dispatcher::new(config.api_keys, &config.upstream, Arc::new(upstream));

    let has_api_keys = dispatcher.has_api_keys();
    if !has_api_keys {
        tracing::warn!("No API keys configured; every relayed request will fail");
    }
    tracing::info!(
        api_keys = dispatcher.api_key_count(),
        upstream = %config.upstream.base_url,
        "Starting relay"
    );

    let relay_service = RelayService::new(dispatcher, config.expose_debug_message);
    let relay_task = run_http_service(&config.listener.host, config.listener.port, relay_service);

    match config.admin_listener {
        Some(admin_listener) => {
            let admin_service = AdminService::<_, RelayError>::new(move || has_api_keys);
            let admin_task =
                run_http_service(&admin_listener.host, admin_listener.port, admin_service);
            tokio::try_join!(relay_task, admin_task)?;
        }
        None => relay_task.await?,
    }

    Ok(())
}
