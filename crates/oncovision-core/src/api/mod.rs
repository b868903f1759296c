//! REST API client module for the OncoVision service.
//!
//! This module provides the `AuthClient` that attaches the session's bearer
//! token and recovers from a single 401 by refreshing it, the token
//! endpoints used by the session controller, and `OncoVisionApi` with the
//! typed patient, case, imaging and report calls.
//!
//! The API uses JWT access/refresh token pairs obtained from `api/token/`.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod tokens;

pub use client::{AuthClient, PendingRequest, RequestBody, UploadForm};
pub use endpoints::{report_file_name, ImageUpload, OncoVisionApi};
pub use error::ApiError;
pub use tokens::{TokenApi, TokenPair};
