use crate::server::{ModelState, SharedState};
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
    model: String,
}

pub async fn healthcheck(State(state): State<SharedState>) -> impl IntoResponse {
    let model = match state.model.as_ref() {
        ModelState::Ready(_) => "ready",
        ModelState::Failed(_) => "unavailable",
    };

    Json(Status {
        status: "Available".into(),
        model: model.into(),
    })
}
