//! Authenticated request client.
//!
//! Every call gets the stored bearer token. A 401 triggers one refresh and
//! one retry of the original request; anything else is handed back as is.

use std::sync::Arc;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::ApiError;
use crate::auth::{CredentialKey, SessionCore};

/// One form field of a multipart upload.
#[derive(Debug, Clone)]
enum FormField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        bytes: Vec<u8>,
        mime: Option<String>,
    },
}

/// A multipart body that can be rebuilt for a retry.
///
/// `reqwest::multipart::Form` is consumed on send, so the parts are kept
/// as owned data and turned into a fresh form for every attempt.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    fields: Vec<FormField>,
}

impl UploadForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(FormField::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
        mime: Option<String>,
    ) -> Self {
        self.fields.push(FormField::File {
            name: name.into(),
            file_name: file_name.into(),
            bytes,
            mime,
        });
        self
    }

    pub fn file_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| matches!(f, FormField::File { .. }))
            .count()
    }

    fn to_form(&self) -> Result<Form, ApiError> {
        let mut form = Form::new();
        for field in &self.fields {
            form = match field {
                FormField::Text { name, value } => form.text(name.clone(), value.clone()),
                FormField::File {
                    name,
                    file_name,
                    bytes,
                    mime,
                } => {
                    let mut part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                    if let Some(mime) = mime {
                        part = part
                            .mime_str(mime)
                            .map_err(|_| ApiError::InvalidMime(mime.clone()))?;
                    }
                    form.part(name.clone(), part)
                }
            };
        }
        Ok(form)
    }
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Pre-encoded JSON.
    Json(Vec<u8>),
    Multipart(UploadForm),
}

/// Description of one logical API call.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: RequestBody,
}

impl PendingRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = RequestBody::Json(serde_json::to_vec(body)?);
        Ok(self)
    }

    pub fn multipart(mut self, form: UploadForm) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Final header set for one attempt with the given bearer token.
    fn headers_for(&self, token: Option<&str>) -> Result<HeaderMap, ApiError> {
        let mut headers = self.headers.clone();
        match self.body {
            // The transport writes the multipart boundary itself
            RequestBody::Multipart(_) => {
                headers.remove(header::CONTENT_TYPE);
            }
            _ => {
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
            }
        }
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

/// API client that carries the session's bearer token.
/// Clone is cheap - the session and connection pool are shared.
#[derive(Clone)]
pub struct AuthClient {
    core: Arc<SessionCore>,
}

impl AuthClient {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self { core }
    }

    pub fn base_url(&self) -> &Url {
        &self.core.base_url
    }

    /// Resolve an API path against the base URL.
    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.core.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Perform `request`, refreshing the access token and retrying once if
    /// the server answers 401.
    pub async fn request(&self, request: PendingRequest) -> Result<Response, ApiError> {
        let token = self.core.store.get(CredentialKey::AccessToken);
        let response = self.build(&request, token.as_deref())?.send().await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(method = %request.method, url = %request.url, "Unauthorized, refreshing access token");
        let fresh = self.core.refresh_after_rejection(token.as_deref()).await?;

        // Exactly one retry, whatever it returns
        let retried = self.build(&request, Some(&fresh))?.send().await?;
        debug!(status = %retried.status(), url = %request.url, "Retried request completed");
        Ok(retried)
    }

    fn build(&self, request: &PendingRequest, token: Option<&str>) -> Result<RequestBuilder, ApiError> {
        let builder = self
            .core
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers_for(token)?);

        Ok(match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(bytes) => builder.body(bytes.clone()),
            RequestBody::Multipart(form) => builder.multipart(form.to_form()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("http://127.0.0.1:8080/cases/clinical_case").expect("url")
    }

    #[test]
    fn test_json_request_headers() {
        let req = PendingRequest::post(url())
            .json(&serde_json::json!({"patient_id": "p1"}))
            .expect("encode");
        let headers = req.headers_for(Some("A1")).expect("headers");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers[header::AUTHORIZATION], "Bearer A1");
    }

    #[test]
    fn test_no_token_no_authorization() {
        let headers = PendingRequest::get(url()).headers_for(None).expect("headers");
        assert!(headers.get(header::AUTHORIZATION).is_none());
        // Bodiless requests are still tagged as JSON
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_multipart_drops_content_type() {
        let form = UploadForm::new()
            .file("files", "scan.png", vec![1, 2, 3], Some("image/png".into()))
            .text("case_id", "c1");
        let req = PendingRequest::post(url())
            .header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .multipart(form);
        let headers = req.headers_for(Some("A1")).expect("headers");
        assert!(headers.get(header::CONTENT_TYPE).is_none());
        assert_eq!(headers[header::AUTHORIZATION], "Bearer A1");
    }

    #[test]
    fn test_caller_headers_kept_but_authorization_overridden() {
        let req = PendingRequest::get(url())
            .header(header::ACCEPT, HeaderValue::from_static("application/pdf"))
            .header(header::AUTHORIZATION, HeaderValue::from_static("Bearer stale"));
        let headers = req.headers_for(Some("fresh")).expect("headers");
        assert_eq!(headers[header::ACCEPT], "application/pdf");
        assert_eq!(headers[header::AUTHORIZATION], "Bearer fresh");
    }

    #[test]
    fn test_upload_form_rebuilds() {
        let form = UploadForm::new()
            .file("files", "a.png", vec![0; 4], None)
            .file("files", "b.dcm", vec![0; 4], Some("application/dicom".into()))
            .text("case_id", "c1");
        assert_eq!(form.file_count(), 2);
        // Building twice must work: once per attempt
        assert!(form.to_form().is_ok());
        assert!(form.to_form().is_ok());
    }

    #[test]
    fn test_upload_form_rejects_bad_mime() {
        let form = UploadForm::new().file("files", "a.png", vec![0], Some("not a mime".into()));
        match form.to_form() {
            Err(ApiError::InvalidMime(mime)) => assert_eq!(mime, "not a mime"),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("bad MIME type accepted"),
        }
    }
}
