use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use repairdesk_core::DeskError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 400 Bad Request errors
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 400 through the `anyhow::Error` chain for
/// request problems the core never sees.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    pub(crate) fn join(e: tokio::task::JoinError) -> Self {
        Self(anyhow::anyhow!("task join error: {e}"))
    }
}

fn status_for(e: &DeskError) -> StatusCode {
    match e {
        DeskError::NotInitialized => StatusCode::BAD_REQUEST,
        DeskError::CardNotFound(_)
        | DeskError::StageNotFound(_)
        | DeskError::PriorityNotFound(_) => StatusCode::NOT_FOUND,
        DeskError::CardClosed(_) | DeskError::AlreadyClosed(_) | DeskError::StageInUse { .. } => {
            StatusCode::CONFLICT
        }
        DeskError::InvalidTransition { .. }
        | DeskError::InvalidBoard(_)
        | DeskError::NoStages
        | DeskError::NoPriorities => StatusCode::UNPROCESSABLE_ENTITY,
        DeskError::InvalidSetting { .. } => StatusCode::BAD_REQUEST,
        DeskError::Channel(_) => StatusCode::BAD_GATEWAY,
        DeskError::Io(_) | DeskError::Yaml(_) | DeskError::Json(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<BadRequestError>().is_some() {
            StatusCode::BAD_REQUEST
        } else if let Some(e) = self.0.downcast_ref::<DeskError>() {
            status_for(e)
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(e: DeskError) -> StatusCode {
        AppError(e.into()).into_response().status()
    }

    #[test]
    fn not_found_variants_map_to_404() {
        assert_eq!(status(DeskError::CardNotFound("c".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(DeskError::StageNotFound("s".into())), StatusCode::NOT_FOUND);
    }

    #[test]
    fn closed_cards_map_to_409() {
        assert_eq!(status(DeskError::AlreadyClosed("c".into())), StatusCode::CONFLICT);
        assert_eq!(status(DeskError::CardClosed("c".into())), StatusCode::CONFLICT);
    }

    #[test]
    fn occupied_stage_maps_to_409() {
        let e = DeskError::StageInUse {
            id: "s".into(),
            active: 2,
        };
        assert_eq!(status(e), StatusCode::CONFLICT);
        assert_eq!(
            status(DeskError::InvalidBoard("empty name".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn invalid_transition_maps_to_422() {
        let e = DeskError::InvalidTransition {
            from: "a".into(),
            to: "a".into(),
            reason: "same stage".into(),
        };
        assert_eq!(status(e), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn bad_input_maps_to_400() {
        let e = DeskError::InvalidSetting {
            key: "reportIntervalHour".into(),
            value: "0".into(),
        };
        assert_eq!(status(e), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::bad_request("chat_id is required").into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn io_and_foreign_errors_map_to_500() {
        assert_eq!(
            status(DeskError::Io(std::io::Error::other("disk full"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError(anyhow::anyhow!("boom")).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn channel_failure_maps_to_502() {
        assert_eq!(status(DeskError::Channel("down".into())), StatusCode::BAD_GATEWAY);
    }
}
