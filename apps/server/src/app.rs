//! Runs the file server until Ctrl-C.

use std::sync::Arc;

use filestream_server::FileServer;

use crate::config::Config;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let server = FileServer::from_config(config.server_config())?;

    let signal_server = Arc::clone(&server);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested");
                signal_server.shutdown();
            }
            Err(e) => tracing::error!("failed to listen for Ctrl-C: {e}"),
        }
    });

    server.run().await?;
    Ok(())
}
