use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::{Args, Subcommand};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::ensure_allowed;
use crate::cli::utils::{output_record, output_records, output_success, read_stdin_json};
use crate::cli::OutputFormat;
use crate::clinic::Clinic;
use crate::filter::FilterData;
use crate::gate::Route;
use crate::models::{Appointment, Exercise, Invoice, InvoiceStatus, Patient};
use crate::services::{Entity, Repository};

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    #[arg(long, help = "Order, e.g. \"last_name asc\" (defaults per entity)")]
    pub order: Option<String>,
    #[arg(long, help = "JSON query: {\"where\": {...}, \"order\": ..., \"limit\": n}")]
    pub filter: Option<String>,
    #[arg(long, help = "Maximum number of records")]
    pub limit: Option<i32>,
}

impl ListArgs {
    fn is_plain(&self) -> bool {
        self.filter.is_none() && self.limit.is_none()
    }

    /// Combine the flags and an optional equality condition into one query
    fn to_filter_data(&self, extra: Option<(&str, Value)>) -> anyhow::Result<FilterData> {
        let mut data: FilterData = match &self.filter {
            Some(raw) => serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("Invalid --filter JSON: {}", e))?,
            None => FilterData::default(),
        };
        if let Some(order) = &self.order {
            data.order = Some(Value::String(order.clone()));
        }
        if let Some(limit) = self.limit {
            data.limit = Some(limit);
        }
        if let Some((column, value)) = extra {
            let mut conditions = match data.where_clause.take() {
                Some(Value::Object(map)) => map,
                Some(_) => anyhow::bail!("\"where\" must be a JSON object"),
                None => Map::new(),
            };
            conditions.insert(column.to_string(), value);
            data.where_clause = Some(Value::Object(conditions));
        }
        Ok(data)
    }
}

/// Operations every entity supports
#[derive(Subcommand, Debug)]
pub enum RecordCommands {
    #[command(about = "Show one record")]
    Get {
        #[arg(help = "Record ID")]
        id: Uuid,
    },

    #[command(about = "Create a record from JSON on stdin")]
    Create,

    #[command(about = "Update fields of a record from JSON on stdin")]
    Update {
        #[arg(help = "Record ID")]
        id: Uuid,
    },

    #[command(about = "Delete a record")]
    Delete {
        #[arg(help = "Record ID")]
        id: Uuid,
    },
}

#[derive(Subcommand, Debug)]
pub enum PatientCommands {
    #[command(about = "List patients")]
    List {
        #[command(flatten)]
        args: ListArgs,
    },

    #[command(about = "Most recently added patients")]
    Recent {
        #[arg(long, default_value_t = 5)]
        limit: i32,
    },

    #[command(flatten)]
    Record(RecordCommands),
}

#[derive(Subcommand, Debug)]
pub enum AppointmentCommands {
    #[command(about = "List appointments")]
    List {
        #[command(flatten)]
        args: ListArgs,
    },

    #[command(about = "Appointments starting between two instants (inclusive)")]
    Range {
        #[arg(help = "Start, RFC 3339")]
        start: DateTime<Utc>,
        #[arg(help = "End, RFC 3339")]
        end: DateTime<Utc>,
    },

    #[command(about = "Appointments on a local calendar day")]
    Day {
        #[arg(help = "Date, YYYY-MM-DD (defaults to today)")]
        date: Option<NaiveDate>,
    },

    #[command(about = "Appointments of one patient")]
    Patient {
        #[arg(help = "Patient ID")]
        patient_id: Uuid,
    },

    #[command(flatten)]
    Record(RecordCommands),
}

#[derive(Subcommand, Debug)]
pub enum ExerciseCommands {
    #[command(about = "List exercises")]
    List {
        #[arg(long, help = "Only this category")]
        category: Option<String>,
        #[command(flatten)]
        args: ListArgs,
    },

    #[command(flatten)]
    Record(RecordCommands),
}

#[derive(Subcommand, Debug)]
pub enum InvoiceCommands {
    #[command(about = "List invoices")]
    List {
        #[arg(long, help = "Only this status: paid, pending or overdue")]
        status: Option<InvoiceStatus>,
        #[command(flatten)]
        args: ListArgs,
    },

    #[command(flatten)]
    Record(RecordCommands),
}

async fn list<E: Entity>(repo: &Repository<E>, args: &ListArgs, extra: Option<(&str, Value)>) -> anyhow::Result<Vec<E>> {
    if args.is_plain() && extra.is_none() {
        return Ok(repo.get_all(args.order.as_deref()).await?);
    }
    Ok(repo.find(args.to_filter_data(extra)?).await?)
}

async fn handle_record<E: Entity>(
    cmd: RecordCommands,
    repo: &Repository<E>,
    output_format: &OutputFormat,
) -> anyhow::Result<()>
where
    E::New: serde::de::DeserializeOwned,
    E::Patch: serde::de::DeserializeOwned,
{
    match cmd {
        RecordCommands::Get { id } => output_record(output_format, &repo.get_by_id(id).await?),
        RecordCommands::Create => {
            let new: E::New = read_stdin_json()?;
            output_record(output_format, &repo.create(&new).await?)
        }
        RecordCommands::Update { id } => {
            let patch: E::Patch = read_stdin_json()?;
            output_record(output_format, &repo.update(id, &patch).await?)
        }
        RecordCommands::Delete { id } => {
            repo.delete(id).await?;
            output_success(
                output_format,
                &format!("{} {} deleted", E::LABEL, id),
                Some(json!({ "id": id })),
            )
        }
    }
}

pub async fn handle_patients(cmd: PatientCommands, clinic: &Clinic, output_format: &OutputFormat) -> anyhow::Result<()> {
    ensure_allowed(clinic, Route::Patients)?;
    let repo = &clinic.patients;
    match cmd {
        PatientCommands::List { args } => output_records::<Patient>(output_format, &list(repo, &args, None).await?),
        PatientCommands::Recent { limit } => output_records(output_format, &repo.recent(limit).await?),
        PatientCommands::Record(cmd) => handle_record(cmd, repo, output_format).await,
    }
}

pub async fn handle_appointments(cmd: AppointmentCommands, clinic: &Clinic, output_format: &OutputFormat) -> anyhow::Result<()> {
    ensure_allowed(clinic, Route::Appointments)?;
    let repo = &clinic.appointments;
    match cmd {
        AppointmentCommands::List { args } => output_records::<Appointment>(output_format, &list(repo, &args, None).await?),
        AppointmentCommands::Range { start, end } => output_records(output_format, &repo.get_by_date_range(start, end).await?),
        AppointmentCommands::Day { date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            output_records(output_format, &repo.get_by_day(date, &Local).await?)
        }
        AppointmentCommands::Patient { patient_id } => output_records(output_format, &repo.get_by_patient(patient_id).await?),
        AppointmentCommands::Record(cmd) => handle_record(cmd, repo, output_format).await,
    }
}

pub async fn handle_exercises(cmd: ExerciseCommands, clinic: &Clinic, output_format: &OutputFormat) -> anyhow::Result<()> {
    ensure_allowed(clinic, Route::Exercises)?;
    let repo = &clinic.exercises;
    match cmd {
        ExerciseCommands::List { category: Some(category), args } if args.is_plain() && args.order.is_none() => {
            output_records(output_format, &repo.get_by_category(&category).await?)
        }
        ExerciseCommands::List { category, args } => {
            let extra = category.map(|c| ("category", Value::String(c)));
            output_records::<Exercise>(output_format, &list(repo, &args, extra).await?)
        }
        ExerciseCommands::Record(cmd) => handle_record(cmd, repo, output_format).await,
    }
}

pub async fn handle_invoices(cmd: InvoiceCommands, clinic: &Clinic, output_format: &OutputFormat) -> anyhow::Result<()> {
    ensure_allowed(clinic, Route::Billing)?;
    let repo = &clinic.invoices;
    match cmd {
        InvoiceCommands::List { status: Some(status), args } if args.is_plain() && args.order.is_none() => {
            output_records(output_format, &repo.get_by_status(status).await?)
        }
        InvoiceCommands::List { status, args } => {
            let extra = status.map(|s| ("status", Value::String(s.as_str().to_string())));
            output_records::<Invoice>(output_format, &list(repo, &args, extra).await?)
        }
        InvoiceCommands::Record(cmd) => handle_record(cmd, repo, output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_flags_merge_into_filter_data() {
        let args = ListArgs {
            order: Some("amount desc".into()),
            filter: Some(r#"{"where": {"patient_id": "0b8f5c8e-6d0b-4a43-9a52-3f4f0c1d2e3f"}}"#.into()),
            limit: Some(3),
        };
        let data = args.to_filter_data(Some(("status", json!("pending")))).unwrap();

        assert_eq!(data.order, Some(json!("amount desc")));
        assert_eq!(data.limit, Some(3));
        let conditions = data.where_clause.unwrap();
        assert_eq!(conditions["status"], "pending");
        assert_eq!(conditions["patient_id"], "0b8f5c8e-6d0b-4a43-9a52-3f4f0c1d2e3f");
    }

    #[test]
    fn where_must_be_an_object_to_merge() {
        let args = ListArgs { filter: Some(r#"{"where": [1, 2]}"#.into()), ..Default::default() };
        assert!(args.to_filter_data(Some(("status", json!("paid")))).is_err());
    }
}
