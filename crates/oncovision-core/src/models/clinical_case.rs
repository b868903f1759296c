//! Clinical cases, their tomography images and the detected nodules.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Confidence below this is shown as low risk
const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Confidence above this is shown as high risk
const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Row of the case list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub id: String,
    pub patient_id: String,
    #[serde(default)]
    pub medical_images_count: u32,
    #[serde(default)]
    pub nodules_count: u32,
}

/// Filters for the case list.
#[derive(Debug, Clone, Default)]
pub struct CaseQuery {
    pub case_id: Option<String>,
    pub patient_id: Option<String>,
}

impl CaseQuery {
    pub fn for_patient(patient_id: impl Into<String>) -> Self {
        Self {
            case_id: None,
            patient_id: Some(patient_id.into()),
        }
    }

    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        [("case_id", &self.case_id), ("patient_id", &self.patient_id)]
            .into_iter()
            .filter_map(|(key, value)| match value.as_deref() {
                Some(v) if !v.is_empty() => Some((key, v)),
                _ => None,
            })
            .collect()
    }
}

/// Full case with every image uploaded to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalCase {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub patient_id: String,
    #[serde(default)]
    pub clinical_history: String,
    #[serde(default)]
    pub medical_images: Vec<MedicalImaging>,
}

impl ClinicalCase {
    pub fn images_in(&self, state: &ImagingState) -> Vec<&MedicalImaging> {
        self.medical_images
            .iter()
            .filter(|img| &img.state == state)
            .collect()
    }

    pub fn nodule_count(&self) -> usize {
        self.medical_images.iter().map(|img| img.lung_nodules.len()).sum()
    }
}

/// Where an image is in the upload -> analysis pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImagingState {
    /// Uploaded, awaiting confirmation.
    Preview,
    /// Confirmed, queued for analysis.
    Ready,
    Processing,
    Analyzed,
    Other(String),
}

impl ImagingState {
    pub fn as_str(&self) -> &str {
        match self {
            ImagingState::Preview => "preview",
            ImagingState::Ready => "ready",
            ImagingState::Processing => "processing",
            ImagingState::Analyzed => "analyzed",
            ImagingState::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "preview" => ImagingState::Preview,
            "ready" => ImagingState::Ready,
            "processing" => ImagingState::Processing,
            "analyzed" => ImagingState::Analyzed,
            other => ImagingState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ImagingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ImagingState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ImagingState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ImagingState::parse(&s))
    }
}

/// The states a client may move images into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    /// Confirm previewed images.
    Ready,
    /// Send ready images to analysis.
    Processing,
}

impl TargetState {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ready" => Some(TargetState::Ready),
            "processing" => Some(TargetState::Processing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalImaging {
    pub id: String,
    pub state: ImagingState,
    #[serde(default)]
    pub full_image: String,
    #[serde(default)]
    pub processed_image: String,
    #[serde(default)]
    pub lung_nodules: Vec<LungNodule>,
}

/// A nodule detected by the analysis, with its bounding box in image pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LungNodule {
    pub id: String,
    pub medical_imaging_id: String,
    pub malignancy_type: String,
    pub x_position: f64,
    pub y_position: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malignancy {
    Benign,
    Malignant,
    Suspicious,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
}

impl LungNodule {
    /// Confidence as a percentage rounded to two decimals.
    pub fn confidence_percent(&self) -> f64 {
        (self.confidence * 10_000.0).round() / 100.0
    }

    /// The API reports malignancy in Spanish.
    pub fn malignancy(&self) -> Malignancy {
        match self.malignancy_type.to_lowercase().as_str() {
            "benigno" => Malignancy::Benign,
            "maligno" => Malignancy::Malignant,
            "sospechoso" => Malignancy::Suspicious,
            _ => Malignancy::Unknown,
        }
    }

    pub fn confidence_band(&self) -> ConfidenceBand {
        if self.confidence < LOW_CONFIDENCE_THRESHOLD {
            ConfidenceBand::Low
        } else if self.confidence > HIGH_CONFIDENCE_THRESHOLD {
            ConfidenceBand::High
        } else {
            ConfidenceBand::Medium
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CASE_JSON: &str = r#"{
        "id": "c-17",
        "description": "Control anual",
        "patient_id": "0912345678",
        "clinical_history": "HC-12",
        "medical_images": [
            {"id": "i1", "state": "preview", "full_image": "media/i1.png", "processed_image": "", "lung_nodules": []},
            {"id": "i2", "state": "analyzed", "full_image": "media/i2.png", "processed_image": "media/i2_p.png",
             "lung_nodules": [
                {"id": "n1", "medical_imaging_id": "i2", "malignancy_type": "Maligno",
                 "x_position": 120.0, "y_position": 88.5, "width": 32.0, "height": 30.0, "confidence": 0.87654},
                {"id": "n2", "medical_imaging_id": "i2", "malignancy_type": "benigno",
                 "x_position": 10, "y_position": 20, "width": 5, "height": 5, "confidence": 0.31}
             ]},
            {"id": "i3", "state": "archived"}
        ]
    }"#;

    #[test]
    fn test_parse_case_detail() {
        let case: ClinicalCase = serde_json::from_str(CASE_JSON).expect("parse case");
        assert_eq!(case.medical_images.len(), 3);
        assert_eq!(case.nodule_count(), 2);
        assert_eq!(case.images_in(&ImagingState::Analyzed).len(), 1);
        assert_eq!(case.images_in(&ImagingState::Preview)[0].id, "i1");
        assert_eq!(case.medical_images[2].state, ImagingState::Other("archived".into()));
    }

    #[test]
    fn test_imaging_state_round_trips_unknown_values() {
        let state: ImagingState = serde_json::from_str(r#""archived""#).expect("parse");
        assert_eq!(serde_json::to_string(&state).expect("encode"), r#""archived""#);
    }

    #[test]
    fn test_nodule_classification() {
        let case: ClinicalCase = serde_json::from_str(CASE_JSON).expect("parse case");
        let nodules = &case.medical_images[1].lung_nodules;

        assert_eq!(nodules[0].malignancy(), Malignancy::Malignant);
        assert_eq!(nodules[0].confidence_band(), ConfidenceBand::High);
        assert_eq!(nodules[0].confidence_percent(), 87.65);

        assert_eq!(nodules[1].malignancy(), Malignancy::Benign);
        assert_eq!(nodules[1].confidence_band(), ConfidenceBand::Low);
    }

    #[test]
    fn test_confidence_band_edges() {
        let mut nodule = LungNodule {
            id: "n".into(),
            medical_imaging_id: "i".into(),
            malignancy_type: "sospechoso".into(),
            x_position: 0.0,
            y_position: 0.0,
            width: 1.0,
            height: 1.0,
            confidence: 0.5,
        };
        assert_eq!(nodule.confidence_band(), ConfidenceBand::Medium);
        nodule.confidence = 0.7;
        assert_eq!(nodule.confidence_band(), ConfidenceBand::Medium);
        assert_eq!(nodule.malignancy(), Malignancy::Suspicious);
    }

    #[test]
    fn test_target_state() {
        assert_eq!(TargetState::parse("Ready"), Some(TargetState::Ready));
        assert_eq!(TargetState::parse("processing"), Some(TargetState::Processing));
        assert_eq!(TargetState::parse("analyzed"), None);
        assert_eq!(serde_json::to_string(&TargetState::Processing).expect("encode"), r#""processing""#);
    }

    #[test]
    fn test_case_query_pairs() {
        assert_eq!(CaseQuery::for_patient("p1").pairs(), vec![("patient_id", "p1")]);
    }
}
