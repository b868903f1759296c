//! Typed OncoVision endpoints: patients, clinical cases, images, reports.
//!
//! Every call goes through [`AuthClient::request`], so token refresh is
//! transparent here. Non-success statuses become [`ApiError::Status`].

use reqwest::header::{self, HeaderValue};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::client::{AuthClient, PendingRequest, UploadForm};
use super::ApiError;
use crate::models::{
    CaseQuery, CaseSummary, ClinicalCase, NewPatient, Patient, PatientQuery, TargetState,
};

/// Multipart field carrying each uploaded image
const UPLOAD_FILES_FIELD: &str = "files";

/// Multipart field carrying the owning case id
const UPLOAD_CASE_FIELD: &str = "case_id";

#[derive(Serialize)]
struct NewCaseRequest<'a> {
    patient_id: &'a str,
}

#[derive(Serialize)]
struct ImageStateRequest<'a> {
    image_ids: &'a [String],
    new_state: TargetState,
}

#[derive(Serialize)]
struct ImageIdsRequest<'a> {
    image_ids: &'a [String],
}

/// An image file to upload to a case.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

impl ImageUpload {
    /// Guess the MIME type from the extension; unknown extensions are left
    /// for the server to sniff.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime = mime_for(&file_name).map(str::to_string);
        Self {
            file_name,
            bytes,
            mime,
        }
    }
}

fn mime_for(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "dcm" => Some("application/dicom"),
        _ => None,
    }
}

/// File name the front-end uses for a downloaded case report.
pub fn report_file_name(case_id: &str, image_id: &str) -> String {
    format!("reporte_tomografia_caso_{}_{}.pdf", case_id, image_id)
}

#[derive(Clone)]
pub struct OncoVisionApi {
    client: AuthClient,
}

impl OncoVisionApi {
    pub fn new(client: AuthClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    /// Absolute URL of an image path as stored on a `MedicalImaging`.
    pub fn image_url(&self, relative: &str) -> Result<Url, ApiError> {
        self.client.url(relative)
    }

    // ===== Patients =====

    pub async fn list_patients(&self, query: &PatientQuery) -> Result<Vec<Patient>, ApiError> {
        let url = self.url_with_query("patients/patient_list", &query.pairs())?;
        self.get_json(url).await
    }

    pub async fn patient(&self, id_number: &str) -> Result<Patient, ApiError> {
        let url = self.client.url(&format!("patients/patient_detail/{}", id_number))?;
        self.get_json(url).await
    }

    pub async fn create_patient(&self, patient: &NewPatient) -> Result<(), ApiError> {
        let request = PendingRequest::post(self.client.url("patients/patient_create")?).json(patient)?;
        self.send_expect_success(request).await
    }

    // ===== Clinical cases =====

    pub async fn list_cases(&self, query: &CaseQuery) -> Result<Vec<CaseSummary>, ApiError> {
        let url = self.url_with_query("cases/clinical_case_list", &query.pairs())?;
        self.get_json(url).await
    }

    pub async fn create_case(&self, patient_id: &str) -> Result<(), ApiError> {
        let request = PendingRequest::post(self.client.url("cases/clinical_case")?)
            .json(&NewCaseRequest { patient_id })?;
        self.send_expect_success(request).await
    }

    pub async fn case_detail(&self, case_id: &str) -> Result<ClinicalCase, ApiError> {
        let url = self.client.url(&format!("cases/clinical_case_detail/{}", case_id))?;
        self.get_json(url).await
    }

    // ===== Medical imaging =====

    pub async fn upload_images(&self, case_id: &str, images: Vec<ImageUpload>) -> Result<(), ApiError> {
        let mut form = UploadForm::new();
        for image in images {
            form = form.file(UPLOAD_FILES_FIELD, image.file_name, image.bytes, image.mime);
        }
        form = form.text(UPLOAD_CASE_FIELD, case_id);
        debug!(case_id, files = form.file_count(), "Uploading images");

        let request = PendingRequest::post(self.client.url("cases/upload_images")?).multipart(form);
        self.send_expect_success(request).await
    }

    pub async fn set_image_state(&self, image_ids: &[String], new_state: TargetState) -> Result<(), ApiError> {
        let request = PendingRequest::put(self.client.url("cases/medical_imaging")?)
            .json(&ImageStateRequest { image_ids, new_state })?;
        self.send_expect_success(request).await
    }

    pub async fn delete_image(&self, image_id: &str) -> Result<(), ApiError> {
        let url = self.client.url(&format!("cases/medical_imaging/{}", image_id))?;
        self.send_expect_success(PendingRequest::delete(url)).await
    }

    pub async fn delete_images(&self, image_ids: &[String]) -> Result<(), ApiError> {
        let request = PendingRequest::delete(self.client.url("cases/medical_imaging")?)
            .json(&ImageIdsRequest { image_ids })?;
        self.send_expect_success(request).await
    }

    // ===== Reports =====

    /// Download the generated PDF report for a case.
    pub async fn case_report(&self, case_id: &str) -> Result<Vec<u8>, ApiError> {
        let url = self.client.url(&format!("cases/generate_pdf/{}", case_id))?;
        let request = PendingRequest::get(url)
            .header(header::ACCEPT, HeaderValue::from_static("application/pdf"));
        let response = Self::check_response(self.client.request(request).await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ===== Helpers =====

    fn url_with_query(&self, path: &str, pairs: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = self.client.url(path)?;
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self.client.request(PendingRequest::get(url.clone())).await?;
        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url.path(), e)))
    }

    async fn send_expect_success(&self, request: PendingRequest) -> Result<(), ApiError> {
        let response = self.client.request(request).await?;
        Self::check_response(response).await?;
        Ok(())
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_file_name() {
        assert_eq!(report_file_name("c-17", "i2"), "reporte_tomografia_caso_c-17_i2.pdf");
    }

    #[test]
    fn test_mime_guess() {
        assert_eq!(ImageUpload::new("scan.PNG", vec![]).mime.as_deref(), Some("image/png"));
        assert_eq!(ImageUpload::new("scan.jpeg", vec![]).mime.as_deref(), Some("image/jpeg"));
        assert_eq!(ImageUpload::new("slice.dcm", vec![]).mime.as_deref(), Some("application/dicom"));
        assert_eq!(ImageUpload::new("notes.txt", vec![]).mime, None);
        assert_eq!(ImageUpload::new("noext", vec![]).mime, None);
    }
}
