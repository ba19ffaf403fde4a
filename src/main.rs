use std::sync::Arc;

use file_drop::config::Config;
use file_drop::trace;
use file_drop::types::Result;
use file_drop::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = Arc::new(Config::from_env());

    if config.trace_console_enabled {
        trace::start_trace_reporter();
    }

    let context = AppContext::new(config.clone()).await?;

    log::info!(
        "Storage type: {}, base path: {}, max upload size: {} bytes",
        config.storage_type,
        config.storage_base_path,
        config.max_upload_size()
    );
    log::info!(
        "Retention: {}s, cleanup interval: {}s",
        config.retention_seconds,
        config.cleanup_interval_seconds
    );

    let cleanup = context.cleanup_worker().start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Unable to listen for shutdown signal: {:?}", e);
    }

    log::info!("Shutting down");

    if let Some(cleanup) = cleanup {
        cleanup.stop().await;
    }

    fastrace::flush();

    Ok(())
}
