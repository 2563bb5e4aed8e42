use crate::config::Config;
use crate::inference::OrtClassifier;
use crate::server::{HttpServer, ModelState};

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    tokio::fs::create_dir_all(&config.upload.dir).await?;

    if config.server.secret_key.is_some() {
        tracing::debug!("session secret key configured");
    }

    // A failed load leaves the process serving in degraded mode: every
    // prediction is rejected until a restart, nothing else goes down.
    let model = match OrtClassifier::new(&config.model) {
        Ok(classifier) => {
            tracing::info!("model loaded from {:?}", config.model.get_model_path());
            Arc::new(ModelState::Ready(Arc::new(classifier)))
        }
        Err(e) => {
            tracing::error!("failed to load model, serving degraded: {e}");
            Arc::new(ModelState::Failed(e))
        }
    };

    let server = HttpServer::new(model, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
