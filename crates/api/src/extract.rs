//! Request extractors whose rejections use the `{error, code}` envelope.

use axum::extract::FromRequest;

use crate::error::AppError;

/// `axum::Json` that rejects unparseable bodies with `400 BAD_REQUEST`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
