//! Typed endpoint calls against a mock OncoVision API.

mod common;

use oncovision_core::api::{ApiError, ImageUpload, OncoVisionApi};
use oncovision_core::auth::{CredentialKey, CredentialStore};
use oncovision_core::models::{CaseQuery, ImagingState, Malignancy, NewPatient, PatientQuery, TargetState};
use reqwest::StatusCode;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{controller, logged_in_store, settings};

fn api(server: &MockServer) -> (OncoVisionApi, oncovision_core::SessionController) {
    let store = logged_in_store("A1", Some("R1"));
    let session = controller(settings(server), &store);
    (OncoVisionApi::new(session.client()), session)
}

#[tokio::test]
async fn test_list_patients_sends_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/patients/patient_list"))
        .and(query_param("name", "Ana"))
        .and(query_param("id_number", "0912345678"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"full_name": "Ana Pérez", "id_number": "0912345678", "clinical_history": "HC-12"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _session) = api(&server);
    let query = PatientQuery {
        name: Some("Ana".into()),
        id_number: Some("0912345678".into()),
        ..PatientQuery::default()
    };
    let patients = api.list_patients(&query).await.expect("patients");
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0].clinical_history, "HC-12");

    let requests = server.received_requests().await.expect("recording enabled");
    let query = requests[0].url.query().unwrap_or_default();
    assert!(!query.contains("last_name"));
}

#[tokio::test]
async fn test_create_patient_posts_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/patients/patient_create"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "names": "Ana",
            "last_names": "Pérez",
            "id_number": "0912345678",
            "clinical_history": "HC-12"
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _session) = api(&server);
    let patient = NewPatient {
        names: "Ana".into(),
        last_names: "Pérez".into(),
        id_number: "0912345678".into(),
        clinical_history: "HC-12".into(),
    };
    api.create_patient(&patient).await.expect("create");
}

#[tokio::test]
async fn test_case_list_and_create() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cases/clinical_case_list"))
        .and(query_param("patient_id", "p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "c1", "patient_id": "p1", "medical_images_count": 3, "nodules_count": 1}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/cases/clinical_case"))
        .and(body_json(json!({"patient_id": "p1"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _session) = api(&server);
    let cases = api.list_cases(&CaseQuery::for_patient("p1")).await.expect("cases");
    assert_eq!(cases[0].medical_images_count, 3);
    api.create_case("p1").await.expect("create case");
}

#[tokio::test]
async fn test_case_detail_parses_images_and_nodules() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cases/clinical_case_detail/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "c1",
            "description": "Control",
            "patient_id": "p1",
            "clinical_history": "HC-12",
            "medical_images": [
                {"id": "i1", "state": "preview", "full_image": "/media/i1.png", "processed_image": "", "lung_nodules": []},
                {"id": "i2", "state": "analyzed", "full_image": "/media/i2.png", "processed_image": "/media/i2_p.png",
                 "lung_nodules": [{"id": "n1", "medical_imaging_id": "i2", "malignancy_type": "maligno",
                                   "x_position": 10.0, "y_position": 12.5, "width": 4.0, "height": 4.0, "confidence": 0.83}]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _session) = api(&server);
    let case = api.case_detail("c1").await.expect("case");
    assert_eq!(case.images_in(&ImagingState::Preview).len(), 1);
    assert_eq!(case.nodule_count(), 1);
    let nodule = &case.medical_images[1].lung_nodules[0];
    assert_eq!(nodule.malignancy(), Malignancy::Malignant);

    let url = api.image_url(&case.medical_images[1].processed_image).expect("url");
    assert_eq!(url.as_str(), format!("{}/media/i2_p.png", server.uri()));
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cases/clinical_case_detail/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let (api, _session) = api(&server);
    let err = api.case_detail("c1").await.expect_err("should fail");
    assert!(matches!(err, ApiError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_upload_images_sends_files_and_case_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cases/upload_images"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _session) = api(&server);
    let images = vec![
        ImageUpload::new("a.png", b"first".to_vec()),
        ImageUpload::new("b.dcm", b"second".to_vec()),
    ];
    api.upload_images("c1", images).await.expect("upload");

    let requests = server.received_requests().await.expect("recording enabled");
    let body = String::from_utf8_lossy(&requests[0].body);
    assert_eq!(body.matches("name=\"files\"").count(), 2);
    assert!(body.contains("filename=\"a.png\""));
    assert!(body.contains("application/dicom"));
    assert!(body.contains("name=\"case_id\""));
}

#[tokio::test]
async fn test_image_state_and_deletes() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/cases/medical_imaging"))
        .and(body_json(json!({"image_ids": ["i1", "i2"], "new_state": "processing"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/cases/medical_imaging/i3"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/cases/medical_imaging"))
        .and(body_json(json!({"image_ids": ["i1", "i2"]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _session) = api(&server);
    let ids = vec!["i1".to_string(), "i2".to_string()];
    api.set_image_state(&ids, TargetState::Processing).await.expect("set state");
    api.delete_image("i3").await.expect("delete one");
    api.delete_images(&ids).await.expect("delete many");
}

#[tokio::test]
async fn test_case_report_returns_pdf_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cases/generate_pdf/c1"))
        .and(header("accept", "application/pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"))
        .expect(1)
        .mount(&server)
        .await;

    let (api, _session) = api(&server);
    let pdf = api.case_report("c1").await.expect("report");
    assert_eq!(pdf, b"%PDF-1.4");
}

#[tokio::test]
async fn test_error_status_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/patients/patient_detail/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Paciente no encontrado"))
        .mount(&server)
        .await;

    let (api, _session) = api(&server);
    let err = api.patient("missing").await.expect_err("should fail");
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert!(err.to_string().contains("Paciente no encontrado"));
    assert!(!err.requires_login());
}

#[tokio::test]
async fn test_typed_call_refreshes_transparently() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/patients/patient_detail/p1"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/patients/patient_detail/p1"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "full_name": "Ana Pérez", "id_number": "p1"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "A2"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = logged_in_store("A1", Some("R1"));
    let session = controller(settings(&server), &store);
    let api = OncoVisionApi::new(session.client());

    let patient = api.patient("p1").await.expect("patient");
    assert_eq!(patient.full_name, "Ana Pérez");
    assert_eq!(store.get(CredentialKey::AccessToken).as_deref(), Some("A2"));
}
