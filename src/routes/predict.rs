use crate::{
    inference::InferenceError,
    intake::{self, IntakeError, UploadedFile},
    model_service::ModelService,
    preprocess::{self, PreprocessError},
    server::{ModelState, SharedState},
};
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::{sync::Arc, time::Instant};
use thiserror::Error;
use tokio::{task::spawn_blocking, time::timeout};
use tracing::instrument;

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub prediction: String,
    pub confidence: f32,
    pub image_path: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("{0}")]
    Intake(#[from] IntakeError),
    #[error("Error processing image: {0}")]
    Processing(#[from] PreprocessError),
    #[error("Model not loaded")]
    ModelUnavailable,
    #[error("failed to read multipart body: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),
    #[error("failed to store upload: {0}")]
    Storage(#[from] std::io::Error),
    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("inference timed out")]
    Timeout,
    #[error("inference task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PredictError {
    fn status(&self) -> StatusCode {
        match self {
            PredictError::Intake(_) | PredictError::Processing(_) | PredictError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            PredictError::ModelUnavailable
            | PredictError::Storage(_)
            | PredictError::Inference(_)
            | PredictError::Timeout
            | PredictError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wire message. Internal faults keep their detail in the logs only.
    fn client_message(&self) -> String {
        match self {
            PredictError::Storage(_) | PredictError::Inference(_) | PredictError::Join(_) => {
                "Internal error during prediction".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("prediction request failed: {self}");
        } else {
            tracing::debug!("prediction request rejected: {self}");
        }

        (
            status,
            Json(ErrorBody {
                error: self.client_message(),
            }),
        )
            .into_response()
    }
}

#[instrument(skip(state, multipart))]
pub async fn predict(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<PredictionResponse>, PredictError> {
    let started = Instant::now();
    state.metrics.record_request("/predict");

    // Fail fast before touching the payload when the model never came up.
    let classifier = ready_model(&state)?;

    let upload = read_file_field(&mut multipart).await?;
    let response = run_pipeline(&state, classifier, upload).await?;

    state
        .metrics
        .record_prediction_duration(started.elapsed().as_millis() as u64, "/predict");
    tracing::debug!(
        "prediction successful: {} ({:.2}%)",
        response.prediction,
        response.confidence
    );

    Ok(Json(response))
}

fn ready_model(state: &SharedState) -> Result<Arc<dyn ModelService>, PredictError> {
    match state.model.as_ref() {
        ModelState::Ready(classifier) => Ok(Arc::clone(classifier)),
        ModelState::Failed(reason) => {
            tracing::error!("rejecting prediction, model unavailable: {reason}");
            Err(PredictError::ModelUnavailable)
        }
    }
}

async fn read_file_field(multipart: &mut Multipart) -> Result<UploadedFile, PredictError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?.to_vec();
        return Ok(UploadedFile { filename, data });
    }

    Err(IntakeError::MissingFilePart.into())
}

/// Validate -> persist -> preprocess -> infer. Each stage returns its own
/// closed error set; the composition owns the status-code mapping.
async fn run_pipeline(
    state: &SharedState,
    classifier: Arc<dyn ModelService>,
    upload: UploadedFile,
) -> Result<PredictionResponse, PredictError> {
    intake::validate_filename(&upload.filename, &state.upload_config.allowed_extensions)?;

    let stored = intake::store_upload(&state.upload_config, &upload.filename, &upload.data).await?;
    tracing::debug!("stored upload {} at {:?}", stored.filename, stored.path);

    let tensor = preprocess::preprocess_image(&stored.path)?;

    let inference = spawn_blocking(move || classifier.predict(&tensor));
    let prediction = match timeout(state.inference_timeout, inference).await {
        Ok(join_result) => join_result??,
        Err(_) => return Err(PredictError::Timeout),
    };

    Ok(PredictionResponse {
        prediction: prediction.label,
        confidence: prediction.confidence,
        image_path: stored.public_path,
    })
}
