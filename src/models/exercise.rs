use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DataError;
use crate::filter::FilterOrderInfo;
use crate::services::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Base,
    #[serde(alias = "intermedio")]
    Intermediate,
    #[serde(alias = "avanzato")]
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewExercise {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExercisePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::models::nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::models::nullable")]
    pub category: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::models::nullable")]
    pub media_url: Option<Option<String>>,
}

impl Entity for Exercise {
    type New = NewExercise;
    type Patch = ExercisePatch;

    const TABLE: &'static str = "exercises";
    const LABEL: &'static str = "Exercise";

    fn id(&self) -> Uuid {
        self.id
    }

    fn default_order() -> Vec<FilterOrderInfo> {
        vec![FilterOrderInfo::asc("name")]
    }

    fn validate_new(new: &NewExercise) -> Result<(), DataError> {
        if new.name.trim().is_empty() {
            return Err(DataError::missing_field("name"));
        }
        Ok(())
    }

    fn validate_patch(patch: &ExercisePatch) -> Result<(), DataError> {
        if patch.name.as_deref().map(|n| n.trim().is_empty()).unwrap_or(false) {
            return Err(DataError::missing_field("name"));
        }
        Ok(())
    }

    fn summary(&self) -> String {
        format!(
            "{}  {}  [{}]  {:?}",
            self.id,
            self.name,
            self.category.as_deref().unwrap_or("-"),
            self.difficulty
        )
    }
}
