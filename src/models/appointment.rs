use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DataError;
use crate::filter::{Embed, FilterOrderInfo};
use crate::services::Entity;

/// Length assumed for appointments stored without an end time
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Completed,
    #[serde(alias = "canceled")]
    Cancelled,
}

/// Minimal patient identity embedded in appointment and invoice rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRef {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

impl PatientRef {
    pub fn embed() -> Embed {
        Embed::new("patients", "patient_id", &["id", "first_name", "last_name"])
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub treatment_type: Option<String>,
    #[serde(default)]
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "patients", default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<PatientRef>,
}

impl Appointment {
    pub fn end(&self) -> DateTime<Utc> {
        self.end_time.unwrap_or(self.start_time + Duration::minutes(DEFAULT_DURATION_MINUTES))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment_type: Option<String>,
    #[serde(default)]
    pub status: AppointmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Partial update; `end_time: Some(None)` falls back to the default duration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppointmentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::models::nullable")]
    pub end_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::models::nullable")]
    pub treatment_type: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::models::nullable")]
    pub notes: Option<Option<String>>,
}

impl Entity for Appointment {
    type New = NewAppointment;
    type Patch = AppointmentPatch;

    const TABLE: &'static str = "appointments";
    const LABEL: &'static str = "Appointment";

    fn id(&self) -> Uuid {
        self.id
    }

    fn default_order() -> Vec<FilterOrderInfo> {
        vec![FilterOrderInfo::asc("start_time")]
    }

    fn embeds() -> Vec<Embed> {
        vec![PatientRef::embed()]
    }

    fn validate_new(new: &NewAppointment) -> Result<(), DataError> {
        validate_window(Some(new.start_time), new.end_time)
    }

    fn validate_patch(patch: &AppointmentPatch) -> Result<(), DataError> {
        validate_window(patch.start_time, patch.end_time.flatten())
    }

    fn summary(&self) -> String {
        let who = self.patient.as_ref().map(PatientRef::full_name).unwrap_or_else(|| self.patient_id.to_string());
        format!(
            "{}  {}  {:?}  {}  {}",
            self.id,
            self.start_time.format("%Y-%m-%d %H:%M"),
            self.status,
            who,
            self.treatment_type.as_deref().unwrap_or("-")
        )
    }
}

fn validate_window(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<(), DataError> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            let mut field_errors = std::collections::HashMap::new();
            field_errors.insert("end_time".to_string(), "End time precedes start time".to_string());
            return Err(DataError::validation("Invalid appointment window", Some(field_errors)));
        }
    }
    Ok(())
}
