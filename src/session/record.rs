//! Per-conversation session record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Where the conversation currently stands.
///
/// The serialized form matches the state names stored by earlier deployments,
/// so records written before an upgrade keep deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DialogueState {
    #[default]
    Init,
    CollectingSymptoms,
    SelectingDoctor,
    OfferingAlternativeDoctor,
    CheckingAvailability,
    CollectingPatientDetails,
    Booked,
}

/// A doctor offered as an alternative while the chosen one has no open slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorRef {
    pub id: i64,
    pub name: String,
}

/// Everything remembered about one conversation.
///
/// Fields are populated progressively; which ones are meaningful is
/// determined by `state`. `rejected_slots` holds the (date, start time)
/// pairs the user has already declined for the current doctor and only
/// grows while checking availability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub state: DialogueState,
    pub symptoms: Option<String>,
    pub speciality: Option<String>,
    pub doctor_id: Option<i64>,
    pub doctor_name: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub patient_name: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub alternative_doctors: Vec<DoctorRef>,
    #[serde(default)]
    pub rejected_slots: HashSet<(String, String)>,
    pub last_touched: DateTime<Utc>,
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self {
            state: DialogueState::Init,
            symptoms: None,
            speciality: None,
            doctor_id: None,
            doctor_name: None,
            date: None,
            time: None,
            patient_name: None,
            phone: None,
            alternative_doctors: Vec::new(),
            rejected_slots: HashSet::new(),
            last_touched: Utc::now(),
        }
    }
}

impl SessionRecord {
    /// Mark the record as freshly used for TTL accounting.
    pub fn touch(&mut self) {
        self.last_touched = Utc::now();
    }

    /// Record a doctor selection, dropping state tied to the previous one.
    pub fn select_doctor(&mut self, id: i64, name: &str) {
        self.doctor_id = Some(id);
        self.doctor_name = Some(name.to_string());
        self.alternative_doctors.clear();
        self.rejected_slots.clear();
    }
}
