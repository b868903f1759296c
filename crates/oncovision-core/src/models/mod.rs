//! Data models for OncoVision entities.
//!
//! - `Patient`, `NewPatient`, `PatientQuery`: patient registry
//! - `CaseSummary`, `ClinicalCase`, `CaseQuery`: clinical cases
//! - `MedicalImaging`, `LungNodule`: tomography images and analysis results

pub mod clinical_case;
pub mod patient;

pub use clinical_case::{
    CaseQuery, CaseSummary, ClinicalCase, ConfidenceBand, ImagingState, LungNodule, Malignancy,
    MedicalImaging, TargetState,
};
pub use patient::{NewPatient, Patient, PatientQuery};
