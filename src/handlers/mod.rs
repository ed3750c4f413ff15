pub mod tasks;
pub mod users;

use axum::extract::rejection::JsonRejection;
use axum::Json;
use tracing::warn;

use crate::error::AppError;
use crate::models::RequestBody;

/// Unwraps a JSON body, turning axum's rejection into a 400 that names the
/// offending field.
pub(crate) fn read_body<T: RequestBody>(
    body: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    match body {
        Ok(Json(body)) => Ok(body),
        Err(JsonRejection::JsonDataError(e)) => {
            let detail = e.body_text();
            warn!(error = %detail, "Rejected request body");
            Err(AppError::validation(
                T::field_in(&detail),
                "Missing or invalid field",
            ))
        }
        Err(e) => {
            warn!(error = %e.body_text(), "Rejected request body");
            Err(AppError::validation("body", "Request body must be a JSON object"))
        }
    }
}
