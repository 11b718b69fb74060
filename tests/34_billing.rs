mod common;

use anyhow::Result;
use chrono::NaiveDate;
use fisiosmart::error::DataError;
use fisiosmart::models::{Difficulty, InvoicePatch, InvoiceStatus, NewExercise, NewInvoice};
use fisiosmart::services::invoice_service::InvoiceSummary;
use fisiosmart::testing::MemoryRemote;
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;
use uuid::Uuid;

fn day(raw: &str) -> NaiveDate {
    raw.parse().expect("date")
}

fn euros(raw: &str) -> Decimal {
    Decimal::from_str(raw).expect("amount")
}

async fn seed_invoices(remote: &MemoryRemote, patient_id: Uuid) {
    remote
        .seed("invoices", vec![
            json!({ "number": "2025-001", "patient_id": patient_id, "issue_date": "2025-03-28", "amount": 60, "status": "paid" }),
            json!({ "number": "2025-002", "patient_id": patient_id, "issue_date": "2025-04-02", "amount": "120.50", "status": "pending" }),
            json!({ "number": "2025-003", "patient_id": patient_id, "issue_date": "2025-04-15", "amount": 80, "status": "overdue", "due_date": "2025-04-30" }),
            json!({ "number": "2025-004", "patient_id": patient_id, "issue_date": "2025-04-30", "amount": "45.00", "status": "paid" }),
        ])
        .await;
}

#[tokio::test]
async fn invoices_filter_by_status_newest_first() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    let laura = common::seed_patient(&remote, "Laura", "Bianchi", "2025-01-10T09:00:00Z").await;
    seed_invoices(&remote, laura).await;

    let paid = clinic.invoices.get_by_status(InvoiceStatus::Paid).await?;

    let numbers: Vec<&str> = paid.iter().map(|i| i.number.as_str()).collect();
    assert_eq!(numbers, ["2025-004", "2025-001"]);
    assert_eq!(paid[0].patient.as_ref().map(|p| p.last_name.as_str()), Some("Bianchi"));
    Ok(())
}

#[tokio::test]
async fn issue_range_includes_both_ends() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    let laura = common::seed_patient(&remote, "Laura", "Bianchi", "2025-01-10T09:00:00Z").await;
    seed_invoices(&remote, laura).await;

    let april = clinic.invoices.get_by_issue_range(day("2025-04-02"), day("2025-04-30")).await?;
    let summary = InvoiceSummary::from_invoices(&april);

    assert_eq!(summary.count, 3);
    assert_eq!(summary.total, euros("245.50"));
    assert_eq!(summary.paid, euros("45"));
    assert_eq!(summary.pending, euros("120.50"));
    assert_eq!(summary.overdue, euros("80"));

    let err = clinic.invoices.get_by_issue_range(day("2025-05-01"), day("2025-04-01")).await.unwrap_err();
    assert!(matches!(err, DataError::Validation { .. }));
    Ok(())
}

#[tokio::test]
async fn amounts_keep_their_precision() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    let laura = common::seed_patient(&remote, "Laura", "Bianchi", "2025-01-10T09:00:00Z").await;

    let issued = clinic
        .invoices
        .create(&NewInvoice {
            number: "2025-010".into(),
            patient_id: laura,
            issue_date: day("2025-04-19"),
            due_date: Some(day("2025-05-19")),
            amount: euros("0.10") + euros("0.20"),
            status: InvoiceStatus::Pending,
            notes: None,
        })
        .await?;
    assert_eq!(issued.amount, euros("0.30"));

    let settled = clinic
        .invoices
        .update(issued.id, &InvoicePatch { status: Some(InvoiceStatus::Paid), ..Default::default() })
        .await?;
    assert_eq!(settled.status, InvoiceStatus::Paid);
    assert_eq!(settled.amount, issued.amount);
    Ok(())
}

#[tokio::test]
async fn negative_amounts_and_early_due_dates_are_rejected() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    let laura = common::seed_patient(&remote, "Laura", "Bianchi", "2025-01-10T09:00:00Z").await;
    let new = NewInvoice {
        number: "2025-011".into(),
        patient_id: laura,
        issue_date: day("2025-04-19"),
        due_date: None,
        amount: euros("-5"),
        status: InvoiceStatus::Pending,
        notes: None,
    };

    let err = clinic.invoices.create(&new).await.unwrap_err();
    assert!(err.to_json()["field_errors"]["amount"].is_string());

    let early = NewInvoice { amount: euros("50"), due_date: Some(day("2025-04-01")), ..new };
    let err = clinic.invoices.create(&early).await.unwrap_err();
    assert!(err.to_json()["field_errors"]["due_date"].is_string());
    assert!(remote.rows("invoices").await.is_empty());
    Ok(())
}

#[tokio::test]
async fn exercises_filter_by_category_alphabetically() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    remote
        .seed("exercises", vec![
            json!({ "name": "Ponte glutei", "category": "Core", "difficulty": "base" }),
            json!({ "name": "Squat", "category": "Gambe", "difficulty": "intermedio" }),
            json!({ "name": "Plank", "category": "Core", "difficulty": "avanzato" }),
        ])
        .await;

    let core = clinic.exercises.get_by_category("Core").await?;

    let names: Vec<&str> = core.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["Plank", "Ponte glutei"]);
    assert_eq!(core[0].difficulty, Difficulty::Advanced);
    Ok(())
}

#[tokio::test]
async fn exercise_names_are_required() -> Result<()> {
    let (clinic, _remote) = common::signed_in_clinic().await?;

    let created = clinic
        .exercises
        .create(&NewExercise { name: "Stretching ischiocrurali".into(), category: Some("Gambe".into()), ..Default::default() })
        .await?;
    assert_eq!(created.difficulty, Difficulty::Base);

    let err = clinic.exercises.create(&NewExercise::default()).await.unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");
    Ok(())
}
