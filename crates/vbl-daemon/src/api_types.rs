//! Wire types for the admin API.

use serde::{Deserialize, Serialize};

use vbl_live::WorkerStatus;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub position_id: String,
    pub status: WorkerStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
