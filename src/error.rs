use std::{backtrace::Backtrace, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use thiserror::Error;

use crate::{config::Environment, state::AppState};

const GENERIC_MESSAGE: &str = "Something went wrong";

/// Every failure a request can end in.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Anticipated failure raised by our own code with an explicit status.
    #[error("{message}")]
    Operational { status: StatusCode, message: String },

    /// An identifier that could not be parsed into the store's id type.
    #[error("Invalid {path}: {value}")]
    InvalidId { path: String, value: String },

    /// Unique index violation.
    #[error("Duplicate field value {value} please use another value")]
    Duplicate { field: String, value: String },

    /// Aggregated schema validation failures.
    #[error("Invalid input data. {}", .0.join(". "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    BadRequest(#[from] JsonRejection),

    #[error(transparent)]
    Database(sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ErrorKind {
    fn name(&self) -> &'static str {
        match self {
            ErrorKind::Operational { .. } => "AppError",
            ErrorKind::InvalidId { .. } => "CastError",
            ErrorKind::Duplicate { .. } => "DuplicateKeyError",
            ErrorKind::Validation(_) => "ValidationError",
            ErrorKind::Token(e) if is_expired(e) => "TokenExpiredError",
            ErrorKind::Token(_) => "JsonWebTokenError",
            ErrorKind::BadRequest(_) => "BodyParseError",
            ErrorKind::Database(_) => "DatabaseError",
            ErrorKind::Internal(_) => "InternalError",
        }
    }
}

fn is_expired(e: &jsonwebtoken::errors::Error) -> bool {
    matches!(e.kind(), JwtErrorKind::ExpiredSignature)
}

/// Error returned by every handler and service. Carries the backtrace of the
/// point where it was raised so development responses can show it.
#[derive(Debug)]
pub struct AppError {
    kind: ErrorKind,
    backtrace: Backtrace,
}

impl AppError {
    /// Operational error with an explicit status code.
    pub fn new(message: impl Into<String>, status: StatusCode) -> Self {
        ErrorKind::Operational {
            status,
            message: message.into(),
        }
        .into()
    }

    pub fn validation(messages: Vec<String>) -> Self {
        ErrorKind::Validation(messages).into()
    }

    pub fn invalid_id(path: impl Into<String>, value: impl Into<String>) -> Self {
        ErrorKind::InvalidId {
            path: path.into(),
            value: value.into(),
        }
        .into()
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        ErrorKind::Duplicate {
            field: field.into(),
            value: value.into(),
        }
        .into()
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            ErrorKind::Operational { status, .. } => *status,
            ErrorKind::InvalidId { .. } => StatusCode::NOT_FOUND,
            ErrorKind::Duplicate { .. } | ErrorKind::Validation(_) => StatusCode::BAD_REQUEST,
            ErrorKind::Token(_) => StatusCode::UNAUTHORIZED,
            ErrorKind::BadRequest(rejection) => rejection.status(),
            ErrorKind::Database(_) | ErrorKind::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `fail` for client errors, `error` for everything else.
    pub fn status(&self) -> &'static str {
        if self.status_code().is_client_error() {
            "fail"
        } else {
            "error"
        }
    }

    pub fn is_operational(&self) -> bool {
        !matches!(self.kind, ErrorKind::Database(_) | ErrorKind::Internal(_))
    }

    /// Message safe to show to the client.
    pub fn message(&self) -> String {
        match &self.kind {
            ErrorKind::Token(e) if is_expired(e) => "Your token expired please login again".into(),
            ErrorKind::Token(_) => "Invalid token please login again".into(),
            ErrorKind::BadRequest(rejection) => rejection.body_text(),
            ErrorKind::Database(_) | ErrorKind::Internal(_) => GENERIC_MESSAGE.into(),
            other => other.to_string(),
        }
    }

    fn stack(&self) -> String {
        let mut out = format!("{}: {}", self.kind.name(), self.kind);
        let mut source = std::error::Error::source(&self.kind);
        while let Some(cause) = source {
            out.push_str("\n    caused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            out.push('\n');
            out.push_str(&self.backtrace.to_string());
        }
        out
    }

    /// Minimal body: operational errors keep their message, everything else
    /// collapses to a generic 500.
    pub fn production_body(&self) -> (StatusCode, Value) {
        if self.is_operational() {
            (
                self.status_code(),
                json!({ "status": self.status(), "message": self.message() }),
            )
        } else {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "status": "error", "message": GENERIC_MESSAGE }),
            )
        }
    }

    /// Full body with the error object and stack trace.
    pub fn development_body(&self) -> (StatusCode, Value) {
        let detail = match &self.kind {
            ErrorKind::Database(e) => e.to_string(),
            ErrorKind::Internal(e) => format!("{e:#}"),
            other => other.to_string(),
        };
        let message = if self.is_operational() {
            self.message()
        } else {
            detail.clone()
        };
        (
            self.status_code(),
            json!({
                "status": self.status(),
                "error": {
                    "name": self.kind.name(),
                    "statusCode": self.status_code().as_u16(),
                    "status": self.status(),
                    "isOperational": self.is_operational(),
                    "detail": detail,
                },
                "message": message,
                "stack": self.stack(),
            }),
        )
    }

    pub fn render(&self, env: Environment) -> Response {
        let (status, body) = if env.is_development() {
            self.development_body()
        } else {
            self.production_body()
        };
        (status, Json(body)).into_response()
    }
}

impl From<ErrorKind> for AppError {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        ErrorKind::Token(e).into()
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        ErrorKind::BadRequest(e).into()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        ErrorKind::Internal(e).into()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        classify_sqlx(e).into()
    }
}

lazy_static! {
    static ref KEY_DETAIL_RE: Regex =
        Regex::new(r"Key \((?P<field>[^)]+)\)=\((?P<value>.*)\) already exists").unwrap();
    static ref INVALID_INPUT_RE: Regex =
        Regex::new(r#"invalid input syntax for type (?P<ty>\w+): "(?P<value>.*)""#).unwrap();
}

/// Turns Postgres constraint and cast failures into the matching error kind;
/// anything unrecognized stays a non-operational database error.
fn classify_sqlx(e: sqlx::Error) -> ErrorKind {
    let sqlx::Error::Database(db) = &e else {
        return ErrorKind::Database(e);
    };
    let code = db.code().map(|c| c.into_owned());
    let message = db.message().to_string();
    let constraint = db.constraint().map(str::to_string);
    let detail = db
        .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
        .and_then(|pg| pg.detail())
        .unwrap_or_default()
        .to_string();

    match code.as_deref() {
        // unique_violation
        Some("23505") => {
            let (field, value) = KEY_DETAIL_RE
                .captures(&detail)
                .map(|c| (c["field"].to_string(), c["value"].to_string()))
                .unwrap_or_else(|| (constraint.unwrap_or_else(|| "unknown".into()), String::new()));
            ErrorKind::Duplicate { field, value }
        }
        // invalid_text_representation
        Some("22P02") => match INVALID_INPUT_RE.captures(&message) {
            Some(c) => ErrorKind::InvalidId {
                path: "id".into(),
                value: c["value"].to_string(),
            },
            None => ErrorKind::Database(e),
        },
        // not_null_violation, check_violation
        Some("23502") | Some("23514") => ErrorKind::Validation(vec![message]),
        _ => ErrorKind::Database(e),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if !self.is_operational() {
            tracing::error!(error = %self.kind, kind = self.kind.name(), "ERROR");
        } else {
            tracing::debug!(status = %self.status_code(), message = %self.message(), "operational error");
        }
        let (status, body) = self.production_body();
        let mut res = (status, Json(body)).into_response();
        res.extensions_mut().insert(ErrorReport(Arc::new(self)));
        res
    }
}

/// Attached to error responses so the global handler can re-render them.
#[derive(Clone)]
pub struct ErrorReport(pub Arc<AppError>);

/// Global error handler. Responses built from an `AppError` default to the
/// production shape; in development they are replaced by the detailed one.
pub async fn handle_errors(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    let Some(ErrorReport(err)) = res.extensions_mut().remove::<ErrorReport>() else {
        return res;
    };
    let env = state.config.environment;
    if env.is_development() {
        err.render(env)
    } else {
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::errors::ErrorKind as JwtKind;

    fn jwt_error(kind: JwtKind) -> jsonwebtoken::errors::Error {
        jsonwebtoken::errors::Error::from(kind)
    }

    #[test]
    fn operational_status_prefix() {
        let e = AppError::new("nope", StatusCode::FORBIDDEN);
        assert_eq!(e.status(), "fail");
        assert!(e.is_operational());

        let e = AppError::new("down", StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(e.status(), "error");
    }

    #[test]
    fn known_kinds_map_to_documented_status_codes() {
        let cases = [
            (AppError::invalid_id("id", "abc"), StatusCode::NOT_FOUND, "Invalid id: abc"),
            (
                AppError::duplicate("email", "a@b.io"),
                StatusCode::BAD_REQUEST,
                "Duplicate field value a@b.io please use another value",
            ),
            (
                AppError::validation(vec!["full name is required".into(), "email is required".into()]),
                StatusCode::BAD_REQUEST,
                "Invalid input data. full name is required. email is required",
            ),
            (
                AppError::from(jwt_error(JwtKind::InvalidSignature)),
                StatusCode::UNAUTHORIZED,
                "Invalid token please login again",
            ),
            (
                AppError::from(jwt_error(JwtKind::ExpiredSignature)),
                StatusCode::UNAUTHORIZED,
                "Your token expired please login again",
            ),
        ];
        for (err, status, message) in cases {
            let (code, body) = err.production_body();
            assert_eq!(code, status);
            assert_eq!(body["status"], "fail");
            assert_eq!(body["message"], message);
            assert!(body.get("stack").is_none());
        }
    }

    #[test]
    fn non_operational_errors_are_generic_in_production() {
        let err = AppError::from(anyhow::anyhow!("connection pool exploded"));
        assert!(!err.is_operational());
        let (code, body) = err.production_body();
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], GENERIC_MESSAGE);
        assert!(!body.to_string().contains("exploded"));

        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.production_body().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn development_body_carries_error_and_stack() {
        let err = AppError::duplicate("email", "a@b.io");
        let (code, body) = err.development_body();
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["name"], "DuplicateKeyError");
        assert_eq!(body["error"]["isOperational"], true);
        let stack = body["stack"].as_str().unwrap();
        assert!(stack.starts_with("DuplicateKeyError: Duplicate field value a@b.io"));

        let err = AppError::from(anyhow::anyhow!("boom").context("loading user"));
        let (code, body) = err.development_body();
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"].as_str().unwrap().contains("boom"));
    }

    #[test]
    fn render_switches_on_environment() {
        let err = AppError::invalid_id("id", "42");
        let dev = err.render(Environment::Development);
        let prod = err.render(Environment::Production);
        assert_eq!(dev.status(), StatusCode::NOT_FOUND);
        assert_eq!(prod.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn into_response_attaches_report() {
        let res = AppError::new("gone", StatusCode::NOT_FOUND).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(res.extensions().get::<ErrorReport>().is_some());
    }

    #[test]
    fn duplicate_key_detail_is_parsed() {
        let caps = KEY_DETAIL_RE
            .captures("Key (email)=(jane@example.com) already exists.")
            .unwrap();
        assert_eq!(&caps["field"], "email");
        assert_eq!(&caps["value"], "jane@example.com");

        let caps = INVALID_INPUT_RE
            .captures(r#"invalid input syntax for type uuid: "not-a-uuid""#)
            .unwrap();
        assert_eq!(&caps["value"], "not-a-uuid");
    }
}
