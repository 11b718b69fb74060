use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DataError;
use crate::filter::FilterOrderInfo;
use crate::services::Entity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub fiscal_code: Option<String>,
    #[serde(default)]
    pub medical_history: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiscal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Partial update: only `Some` fields are sent; `Some(None)` clears a nullable column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::models::nullable")]
    pub email: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::models::nullable")]
    pub phone: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::models::nullable")]
    pub address: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::models::nullable")]
    pub birth_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::models::nullable")]
    pub fiscal_code: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::models::nullable")]
    pub medical_history: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::models::nullable")]
    pub notes: Option<Option<String>>,
}

impl Entity for Patient {
    type New = NewPatient;
    type Patch = PatientPatch;

    const TABLE: &'static str = "patients";
    const LABEL: &'static str = "Patient";

    fn id(&self) -> Uuid {
        self.id
    }

    fn default_order() -> Vec<FilterOrderInfo> {
        vec![FilterOrderInfo::desc("created_at")]
    }

    fn validate_new(new: &NewPatient) -> Result<(), DataError> {
        if new.first_name.trim().is_empty() {
            return Err(DataError::missing_field("first_name"));
        }
        if new.last_name.trim().is_empty() {
            return Err(DataError::missing_field("last_name"));
        }
        Ok(())
    }

    fn validate_patch(patch: &PatientPatch) -> Result<(), DataError> {
        // Required names may change but never become blank
        if patch.first_name.as_deref().map(|n| n.trim().is_empty()).unwrap_or(false) {
            return Err(DataError::missing_field("first_name"));
        }
        if patch.last_name.as_deref().map(|n| n.trim().is_empty()).unwrap_or(false) {
            return Err(DataError::missing_field("last_name"));
        }
        Ok(())
    }

    fn summary(&self) -> String {
        let contact = self.email.as_deref().or(self.phone.as_deref()).unwrap_or("-");
        format!("{}  {}  {}", self.id, self.full_name(), contact)
    }
}
