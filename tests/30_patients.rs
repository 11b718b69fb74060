mod common;

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use fisiosmart::error::DataError;
use fisiosmart::filter::FilterData;
use fisiosmart::models::{NewPatient, Patient, PatientPatch};
use fisiosmart::services::Repository;
use fisiosmart::testing::MemoryRemote;
use serde_json::json;
use uuid::Uuid;

fn laura() -> NewPatient {
    NewPatient {
        first_name: "Laura".into(),
        last_name: "Bianchi".into(),
        email: Some("laura.bianchi@example.com".into()),
        phone: Some("333 1234567".into()),
        birth_date: NaiveDate::from_ymd_opt(1986, 7, 14),
        fiscal_code: Some("BNCLRA86L54H501Z".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn created_patient_reads_back_unchanged() -> Result<()> {
    let (clinic, _remote) = common::signed_in_clinic().await?;

    let created = clinic.patients.create(&laura()).await?;
    let fetched = clinic.patients.get_by_id(created.id).await?;

    assert_eq!(fetched, created);
    assert_eq!(fetched.full_name(), "Laura Bianchi");
    assert_eq!(fetched.birth_date, NaiveDate::from_ymd_opt(1986, 7, 14));
    assert_eq!(fetched.fiscal_code.as_deref(), Some("BNCLRA86L54H501Z"));
    Ok(())
}

#[tokio::test]
async fn empty_table_lists_nothing() -> Result<()> {
    let (clinic, _remote) = common::signed_in_clinic().await?;

    assert!(clinic.patients.get_all(None).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn list_defaults_to_newest_first() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    common::seed_patient(&remote, "Anna", "Verdi", "2025-01-10T09:00:00Z").await;
    common::seed_patient(&remote, "Paolo", "Neri", "2025-03-02T09:00:00Z").await;
    common::seed_patient(&remote, "Sara", "Galli", "2025-02-20T09:00:00Z").await;

    let names: Vec<String> = clinic.patients.get_all(None).await?.iter().map(Patient::full_name).collect();
    assert_eq!(names, ["Paolo Neri", "Sara Galli", "Anna Verdi"]);

    let by_surname: Vec<String> = clinic
        .patients
        .get_all(Some("last_name asc"))
        .await?
        .into_iter()
        .map(|p| p.last_name)
        .collect();
    assert_eq!(by_surname, ["Galli", "Neri", "Verdi"]);

    let recent = clinic.patients.recent(2).await?;
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].first_name, "Paolo");
    Ok(())
}

#[tokio::test]
async fn find_applies_json_conditions() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    common::seed_patient(&remote, "Anna", "Rossini", "2025-01-10T09:00:00Z").await;
    common::seed_patient(&remote, "Paolo", "Rossi", "2025-03-02T09:00:00Z").await;
    common::seed_patient(&remote, "Sara", "Galli", "2025-02-20T09:00:00Z").await;

    let data: FilterData = serde_json::from_value(json!({
        "where": { "last_name": { "$ilike": "ross%" } },
        "order": "first_name asc",
    }))?;
    let found = clinic.patients.find(data).await?;

    let names: Vec<&str> = found.iter().map(|p| p.first_name.as_str()).collect();
    assert_eq!(names, ["Anna", "Paolo"]);
    Ok(())
}

#[tokio::test]
async fn update_changes_only_supplied_fields() -> Result<()> {
    let (clinic, _remote) = common::signed_in_clinic().await?;
    let created = clinic.patients.create(&laura()).await?;

    let patch = PatientPatch { phone: Some(Some("347 7654321".into())), ..Default::default() };
    let updated = clinic.patients.update(created.id, &patch).await?;

    assert_eq!(updated.phone.as_deref(), Some("347 7654321"));
    assert_eq!(Patient { phone: created.phone.clone(), ..updated.clone() }, created);
    Ok(())
}

#[tokio::test]
async fn update_can_clear_an_optional_field() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    let created = clinic.patients.create(&laura()).await?;
    assert!(created.phone.is_some());

    let patch = PatientPatch { phone: Some(None), ..Default::default() };
    let updated = clinic.patients.update(created.id, &patch).await?;

    assert_eq!(updated.phone, None);
    assert_eq!(updated.first_name, created.first_name);
    assert!(remote.rows("patients").await[0]["phone"].is_null());
    Ok(())
}

#[tokio::test]
async fn empty_patch_returns_the_stored_record() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    let created = clinic.patients.create(&laura()).await?;

    let unchanged = clinic.patients.update(created.id, &PatientPatch::default()).await?;

    assert_eq!(unchanged, created);
    assert_eq!(remote.rows("patients").await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn missing_records_are_not_found() -> Result<()> {
    let (clinic, _remote) = common::signed_in_clinic().await?;
    let id = Uuid::new_v4();

    let err = clinic.patients.get_by_id(id).await.unwrap_err();
    assert!(matches!(err, DataError::NotFound(_)), "unexpected error: {:?}", err);
    assert_eq!(err.error_code(), "NOT_FOUND");

    let patch = PatientPatch { notes: Some(Some("follow-up".into())), ..Default::default() };
    let err = clinic.patients.update(id, &patch).await.unwrap_err();
    assert!(matches!(err, DataError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn delete_is_idempotent() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    let created = clinic.patients.create(&laura()).await?;

    clinic.patients.delete(created.id).await?;
    clinic.patients.delete(created.id).await?;

    assert!(remote.rows("patients").await.is_empty());
    assert!(matches!(clinic.patients.get_by_id(created.id).await, Err(DataError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn blank_names_are_rejected_before_any_request() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    let queries = remote.query_count();

    let new = NewPatient { last_name: " ".into(), ..laura() };
    let err = clinic.patients.create(&new).await.unwrap_err();

    let DataError::Validation { field_errors: Some(field_errors), .. } = &err else {
        panic!("expected field errors, got {:?}", err);
    };
    assert!(field_errors.contains_key("last_name"));
    assert_eq!(remote.query_count(), queries);
    Ok(())
}

#[tokio::test]
async fn constraint_violations_become_validation_errors() -> Result<()> {
    let remote = Arc::new(MemoryRemote::new().with_required("patients", &["fiscal_code"]));
    let patients: Repository<Patient> = Repository::new(remote.clone());

    let new = NewPatient { fiscal_code: None, ..laura() };
    let err = patients.create(&new).await.unwrap_err();

    assert_eq!(err.error_code(), "VALIDATION_ERROR");
    assert!(err.to_string().contains("fiscal_code"));
    assert!(!err.is_retryable());
    assert!(remote.rows("patients").await.is_empty());
    Ok(())
}

#[tokio::test]
async fn unreachable_platform_is_retryable() -> Result<()> {
    let (clinic, remote) = common::signed_in_clinic().await?;
    remote.fail_table("patients").await;

    let err = clinic.patients.get_all(None).await.unwrap_err();

    assert!(matches!(err, DataError::Remote(_)));
    assert!(err.is_retryable());
    assert_eq!(err.to_json()["retryable"], true);
    Ok(())
}
