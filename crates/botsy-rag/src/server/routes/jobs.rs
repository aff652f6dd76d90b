//! Ingestion job progress and cancellation endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::processing::JobProgress;
use crate::server::state::AppState;
use crate::types::JobId;

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: JobId,
    pub cancelled: bool,
}

/// GET /api/jobs/:job_id
pub async fn get_job_progress(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> Result<Json<JobProgress>> {
    state
        .engine()
        .ingestion_status(job_id)
        .map(Json)
        .ok_or_else(|| Error::not_found("job", job_id))
}

/// DELETE /api/jobs/:job_id - cancel; `cancelled` is false once the job finished
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> Result<Json<CancelResponse>> {
    let engine = state.engine();
    if engine.ingestion_status(job_id).is_none() {
        return Err(Error::not_found("job", job_id));
    }
    Ok(Json(CancelResponse {
        job_id,
        cancelled: engine.cancel_ingestion(job_id),
    }))
}
