use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::DataError;
use crate::filter::{Embed, FilterOrderInfo};
use crate::models::PatientRef;
use crate::services::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Paid,
    #[default]
    Pending,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Overdue => "overdue",
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paid" => Ok(InvoiceStatus::Paid),
            "pending" => Ok(InvoiceStatus::Pending),
            "overdue" => Ok(InvoiceStatus::Overdue),
            other => Err(format!("unknown invoice status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub number: String,
    pub patient_id: Uuid,
    pub issue_date: NaiveDate,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub amount: Decimal,
    #[serde(default)]
    pub status: InvoiceStatus,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "patients", default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<PatientRef>,
}

impl Invoice {
    /// Pending past its due date; the stored status may lag behind
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        match self.status {
            InvoiceStatus::Overdue => true,
            InvoiceStatus::Pending => self.due_date.map(|due| due < today).unwrap_or(false),
            InvoiceStatus::Paid => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub number: String,
    pub patient_id: Uuid,
    pub issue_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub amount: Decimal,
    #[serde(default)]
    pub status: InvoiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoicePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::models::nullable")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InvoiceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::models::nullable")]
    pub notes: Option<Option<String>>,
}

impl Entity for Invoice {
    type New = NewInvoice;
    type Patch = InvoicePatch;

    const TABLE: &'static str = "invoices";
    const LABEL: &'static str = "Invoice";

    fn id(&self) -> Uuid {
        self.id
    }

    fn default_order() -> Vec<FilterOrderInfo> {
        vec![FilterOrderInfo::desc("issue_date")]
    }

    fn embeds() -> Vec<Embed> {
        vec![PatientRef::embed()]
    }

    fn validate_new(new: &NewInvoice) -> Result<(), DataError> {
        if new.number.trim().is_empty() {
            return Err(DataError::missing_field("number"));
        }
        validate_amounts(Some(new.amount), Some(new.issue_date), new.due_date)
    }

    fn validate_patch(patch: &InvoicePatch) -> Result<(), DataError> {
        if patch.number.as_deref().map(|n| n.trim().is_empty()).unwrap_or(false) {
            return Err(DataError::missing_field("number"));
        }
        validate_amounts(patch.amount, patch.issue_date, patch.due_date.flatten())
    }

    fn summary(&self) -> String {
        let who = self.patient.as_ref().map(PatientRef::full_name).unwrap_or_else(|| self.patient_id.to_string());
        format!(
            "{}  {}  {}  €{}  {}  {}",
            self.id,
            self.number,
            self.issue_date,
            self.amount.round_dp(2),
            self.status.as_str(),
            who
        )
    }
}

fn validate_amounts(amount: Option<Decimal>, issued: Option<NaiveDate>, due: Option<NaiveDate>) -> Result<(), DataError> {
    let mut field_errors = std::collections::HashMap::new();
    if amount.map(|a| a.is_sign_negative()).unwrap_or(false) {
        field_errors.insert("amount".to_string(), "Amount cannot be negative".to_string());
    }
    if let (Some(issued), Some(due)) = (issued, due) {
        if due < issued {
            field_errors.insert("due_date".to_string(), "Due date precedes issue date".to_string());
        }
    }
    if field_errors.is_empty() {
        Ok(())
    } else {
        Err(DataError::validation("Invalid invoice", Some(field_errors)))
    }
}
