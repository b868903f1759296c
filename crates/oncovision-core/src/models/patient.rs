use serde::{Deserialize, Serialize};

/// A patient as returned by the list and detail endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub full_name: String,
    pub id_number: String,
    #[serde(default)]
    pub clinical_history: String,
}

/// Payload for registering a patient.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPatient {
    pub names: String,
    pub last_names: String,
    pub id_number: String,
    pub clinical_history: String,
}

/// Filters for the patient list. Empty fields are left out of the query.
#[derive(Debug, Clone, Default)]
pub struct PatientQuery {
    pub name: Option<String>,
    pub last_name: Option<String>,
    pub id_number: Option<String>,
    pub clinical_history: Option<String>,
}

impl PatientQuery {
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("name", &self.name),
            ("last_name", &self.last_name),
            ("id_number", &self.id_number),
            ("clinical_history", &self.clinical_history),
        ]
        .into_iter()
        .filter_map(|(key, value)| match value.as_deref() {
            Some(v) if !v.is_empty() => Some((key, v)),
            _ => None,
        })
        .collect()
    }
}
