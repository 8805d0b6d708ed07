use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Query, State},
    http::{header::AUTHORIZATION, request::Parts, Request},
    middleware::Next,
    response::Response,
    Json,
};
use serde::de::DeserializeOwned;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Rejects requests without a valid bearer token and stores the caller as a
/// `User` extension for the handlers.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_value = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    let user = validate_token(token, &config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// `Json` body extractor whose rejections use the `AppError` body. Data errors
/// on a top-level field are reported against that field.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request<Body>, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(json_rejection_error(rejection)),
        }
    }
}

fn json_rejection_error(rejection: JsonRejection) -> AppError {
    match rejection {
        JsonRejection::JsonDataError(err) => {
            let text = err.body_text();
            let detail = text.split_once(": ").map_or(text.as_str(), |(_, rest)| rest);
            field_from_detail(detail).unwrap_or_else(|| AppError::BadRequest(detail.to_string()))
        }
        other => AppError::BadRequest(other.body_text()),
    }
}

/// `"time: invalid time ..."` -> field `time`. Nested paths stay generic.
fn field_from_detail(detail: &str) -> Option<AppError> {
    let (path, message) = detail.split_once(": ")?;
    let is_field = !path.is_empty() && path.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_field.then(|| AppError::field(path, message))
}

/// `Query` extractor whose rejections use the `AppError` body.
pub struct AppQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| AppQuery(value))
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
    }
}
