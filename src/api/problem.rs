//! Problem-details error bodies.

use serde::Serialize;

use crate::error::{ServiceError, ValidationErrors};
use crate::{Response, StatusCode};

pub const BAD_REQUEST_TYPE: &str = "https://tools.ietf.org/html/rfc7231#section-6.5.1";
pub const UNAUTHORIZED_TYPE: &str = "https://tools.ietf.org/html/rfc7235#section-3.1";
pub const FORBIDDEN_TYPE: &str = "https://tools.ietf.org/html/rfc7231#section-6.5.3";
pub const INTERNAL_TYPE: &str = "https://tools.ietf.org/html/rfc7231#section-6.6.1";

pub const VALIDATION_TITLE: &str = "One or more validation errors occurred.";
pub const INTERNAL_DETAIL: &str = "An unexpected error occurred.";

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'static str>,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

impl ProblemDetails {
    fn new(status: StatusCode, kind: &'static str, detail: impl Into<String>) -> Self {
        Self {
            kind,
            title: None,
            status: status.as_u16(),
            detail: detail.into(),
            errors: None,
        }
    }

    pub fn validation(errors: ValidationErrors) -> Self {
        Self {
            title: Some(VALIDATION_TITLE),
            errors: Some(errors),
            ..Self::new(StatusCode::BadRequest, BAD_REQUEST_TYPE, VALIDATION_TITLE)
        }
    }
}

/// Renders a service failure. Internal failures are logged with their source
/// and reported with a generic detail only.
pub fn respond(err: ServiceError) -> Response {
    let (status, problem) = match err {
        ServiceError::Validation(errors) => {
            (StatusCode::BadRequest, ProblemDetails::validation(errors))
        }
        ServiceError::Authentication { detail } => (
            StatusCode::Unauthorized,
            ProblemDetails::new(StatusCode::Unauthorized, UNAUTHORIZED_TYPE, detail),
        ),
        ServiceError::Authorization { required } => (
            StatusCode::Forbidden,
            ProblemDetails::new(
                StatusCode::Forbidden,
                FORBIDDEN_TYPE,
                format!("The {required} role is required for this operation."),
            ),
        ),
        ServiceError::Internal(source) => {
            tracing::error!(error = %source, "request failed with an internal error");
            (
                StatusCode::InternalServerError,
                ProblemDetails::new(StatusCode::InternalServerError, INTERNAL_TYPE, INTERNAL_DETAIL),
            )
        }
    };
    Response::json(status, &problem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::Role;

    fn body(response: &Response) -> serde_json::Value {
        serde_json::from_slice(response.body_ref()).unwrap()
    }

    #[test]
    fn validation_problem_has_title_and_errors() {
        let response = respond(ValidationErrors::single("sortColumn", "bad").into());
        assert_eq!(response.status(), StatusCode::BadRequest);
        let json = body(&response);
        assert_eq!(json["type"], BAD_REQUEST_TYPE);
        assert_eq!(json["status"], 400);
        assert_eq!(json["title"], VALIDATION_TITLE);
        assert_eq!(json["errors"]["sortColumn"][0], "bad");
    }

    #[test]
    fn forbidden_names_the_role() {
        let response = respond(ServiceError::Authorization {
            required: Role::Administrator,
        });
        let json = body(&response);
        assert_eq!(json["type"], FORBIDDEN_TYPE);
        assert_eq!(json["status"], 403);
        assert!(json.get("errors").is_none());
        assert!(json["detail"].as_str().unwrap().contains("Administrator"));
    }

    #[test]
    fn internal_detail_is_generic() {
        let response = respond(ServiceError::internal("db password is hunter2"));
        assert_eq!(response.status(), StatusCode::InternalServerError);
        let json = body(&response);
        assert_eq!(json["detail"], INTERNAL_DETAIL);
        assert_eq!(json["type"], INTERNAL_TYPE);
    }
}
