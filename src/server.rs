use crate::{
    config::{Config, UploadConfig},
    inference::ModelLoadError,
    model_service::ModelService,
    routes::api_routes,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};

/// Outcome of the one-time model load. `Failed` is terminal for the process;
/// the server keeps running and rejects every prediction until a restart.
pub enum ModelState {
    Ready(Arc<dyn ModelService>),
    Failed(ModelLoadError),
}

#[derive(Clone)]
pub struct SharedState {
    pub model: Arc<ModelState>,
    pub upload_config: UploadConfig,
    pub inference_timeout: Duration,
    pub metrics: Arc<Metrics>,
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(model: Arc<ModelState>, config: &Config) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let metrics = Arc::new(Metrics::new());
        let metrics_layer = HttpMetricsLayerBuilder::new().build();

        let app_state = SharedState {
            model,
            upload_config: config.upload.clone(),
            inference_timeout: config.model.get_inference_timeout(),
            metrics,
        };

        let router = Router::new()
            .merge(api_routes())
            .layer(DefaultBodyLimit::max(config.server.max_upload_bytes))
            .with_state(app_state)
            .layer(metrics_layer);

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
