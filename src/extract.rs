//! Request extractors whose rejections use the API's JSON error envelope.
//!
//! Axum's own extractors reject malformed input with a plain text body. Wrapping
//! them here turns those rejections into [Error::Validation] so every 400 the
//! API sends has the same shape.

use axum::extract::{FromRequest, FromRequestParts};

use crate::Error;

/// A JSON request body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct JsonBody<T>(pub T);

/// The deserialized query string.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(Error))]
pub struct QueryParams<T>(pub T);

/// The path parameters.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(Error))]
pub struct PathParam<T>(pub T);
