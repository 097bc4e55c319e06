//! Upload endpoints.
//!
//! Uploads are usually multipart, which the guard never buffers; every upload
//! reaches the handler even when it repeats an earlier one.

use aerosol::axum::Dep;
use axum::{
    Json, Router,
    body::Bytes,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use tracing::info;

use crate::{
    api::State,
    ledger::{Ledger, Upload},
};

pub fn router() -> Router<State> {
    Router::new().route("/", get(list_uploads).post(create_upload))
}

/// Accept an upload of any content type.
///
/// ## Endpoint
/// ```text
/// POST /api/v1/uploads
/// Content-Type: multipart/form-data; boundary=...
/// ```
///
/// ## Responses
/// - 201: Upload recorded
/// - 409: Identical upload within the retention window (eligible content
///   types only)
#[tracing::instrument(skip_all)]
pub async fn create_upload(
    Dep(ledger): Dep<Ledger>,
    headers: HeaderMap,
    body: Bytes,
) -> CreateUploadResponse {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(String::from);
    let upload = ledger.record_upload(content_type, body.len()).await;
    info!(upload_id = upload.id, size = upload.size, "uploads.create.success");
    CreateUploadResponse::Created(upload)
}

#[derive(Debug)]
pub enum CreateUploadResponse {
    Created(Upload),
}

impl IntoResponse for CreateUploadResponse {
    fn into_response(self) -> axum::response::Response {
        match self {
            CreateUploadResponse::Created(upload) => {
                (StatusCode::CREATED, Json(upload)).into_response()
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadListBody {
    pub uploads: Vec<Upload>,
}

/// List every accepted upload.
///
/// ## Endpoint
/// ```text
/// GET /api/v1/uploads
/// ```
///
/// ## Responses
/// - 200: Success
#[tracing::instrument(skip(ledger))]
pub async fn list_uploads(Dep(ledger): Dep<Ledger>) -> ListUploadsResponse {
    let uploads = ledger.uploads().await;
    info!(count = uploads.len(), "uploads.list.success");
    ListUploadsResponse::Success(UploadListBody { uploads })
}

#[derive(Debug)]
pub enum ListUploadsResponse {
    Success(UploadListBody),
}

impl IntoResponse for ListUploadsResponse {
    fn into_response(self) -> axum::response::Response {
        match self {
            ListUploadsResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
        }
    }
}
