mod common;

use anyhow::Result;
use chrono::{DateTime, Utc};
use fisiosmart::dashboard::Dashboard;
use fisiosmart::models::Patient;
use fisiosmart::resource::Resource;
use fisiosmart::testing::MemoryRemote;
use serde_json::json;
use uuid::Uuid;

fn now() -> DateTime<Utc> {
    "2025-04-19T10:00:00Z".parse().expect("timestamp")
}

async fn seed_clinic_week(remote: &MemoryRemote) -> Uuid {
    let laura = common::seed_patient(remote, "Laura", "Bianchi", "2025-04-01T09:00:00Z").await;
    common::seed_patient(remote, "Paolo", "Neri", "2025-04-18T09:00:00Z").await;
    remote
        .seed("appointments", vec![
            json!({ "patient_id": laura, "start_time": "2025-04-19T15:00:00Z", "treatment_type": "Tecar" }),
            json!({ "patient_id": laura, "start_time": "2025-04-19T08:00:00Z", "treatment_type": "Massaggio" }),
            json!({ "patient_id": laura, "start_time": "2025-04-14T08:00:00Z", "treatment_type": "Kinesio" }),
            json!({ "patient_id": laura, "start_time": "2025-04-21T08:00:00Z", "treatment_type": "Kinesio" }),
        ])
        .await;
    remote
        .seed("invoices", vec![
            json!({ "number": "2025-020", "patient_id": laura, "issue_date": "2025-04-01", "amount": 60, "status": "paid" }),
            json!({ "number": "2025-021", "patient_id": laura, "issue_date": "2025-04-18", "amount": 90, "status": "pending" }),
            json!({ "number": "2025-019", "patient_id": laura, "issue_date": "2025-03-31", "amount": 75, "status": "paid" }),
        ])
        .await;
    laura
}

#[tokio::test]
async fn dashboard_loads_every_panel() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    seed_clinic_week(&remote).await;

    let dashboard = Dashboard::load(&clinic.patients, &clinic.appointments, &clinic.invoices, now(), &Utc).await;

    assert!(dashboard.errors().is_empty());
    let today: Vec<_> = dashboard.today.as_ref().map_err(Clone::clone)?.iter().filter_map(|a| a.treatment_type.clone()).collect();
    assert_eq!(today, ["Massaggio", "Tecar"]);
    assert_eq!(dashboard.recent_patients.as_ref().map_err(Clone::clone)?[0].first_name, "Paolo");
    assert_eq!(*dashboard.week_appointments.as_ref().map_err(Clone::clone)?, 3);

    let month = dashboard.month_invoices.as_ref().map_err(Clone::clone)?;
    assert_eq!(month.count, 2);
    assert_eq!(month.total.to_string(), "150");
    Ok(())
}

#[tokio::test]
async fn one_failing_panel_leaves_the_others_intact() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    seed_clinic_week(&remote).await;
    remote.fail_table("invoices").await;

    let dashboard = Dashboard::load(&clinic.patients, &clinic.appointments, &clinic.invoices, now(), &Utc).await;

    let errors = dashboard.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "month_invoices");
    assert!(errors[0].1.is_retryable());
    assert!(dashboard.today.is_ok());
    assert!(dashboard.recent_patients.is_ok());
    assert!(dashboard.week_appointments.is_ok());

    let rendered = dashboard.to_json();
    assert_eq!(rendered["month_invoices"]["error"]["code"], "REMOTE_ERROR");
    assert_eq!(rendered["week_appointments"]["data"], 3);
    assert!(dashboard.to_text().contains("Invoices this month: error"));
    Ok(())
}

#[tokio::test]
async fn failed_reload_keeps_previous_data() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    seed_clinic_week(&remote).await;
    let mut patients: Resource<Vec<Patient>> = Resource::new();

    assert!(patients.load(clinic.patients.get_all(None)).await);
    assert_eq!(patients.data().map(Vec::len), Some(2));

    remote.fail_table("patients").await;
    assert!(patients.load(clinic.patients.get_all(None)).await);

    assert_eq!(patients.data().map(Vec::len), Some(2));
    assert!(patients.error().is_some_and(|e| e.is_retryable()));
    assert!(!patients.is_loading());
    Ok(())
}

#[tokio::test]
async fn superseded_responses_are_dropped() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    seed_clinic_week(&remote).await;
    let mut patients: Resource<Vec<Patient>> = Resource::new();

    let first = patients.begin();
    let second = patients.begin();
    let slow = clinic.patients.recent(1).await;
    let fast = clinic.patients.get_all(None).await;

    assert!(patients.finish(second, fast));
    assert!(!patients.finish(first, slow));
    assert_eq!(patients.data().map(Vec::len), Some(2));
    Ok(())
}
