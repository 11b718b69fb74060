use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::DataError;
use crate::models::{Appointment, Invoice, Patient};
use crate::services::invoice_service::InvoiceSummary;
use crate::services::{local_day_bounds, Entity, Repository};

pub const RECENT_PATIENTS: i32 = 5;

/// Dashboard panels. Each one is loaded independently and carries its own
/// outcome, so a failing query leaves the others intact.
#[derive(Debug)]
pub struct Dashboard {
    pub today: Result<Vec<Appointment>, DataError>,
    pub recent_patients: Result<Vec<Patient>, DataError>,
    pub week_appointments: Result<usize, DataError>,
    pub month_invoices: Result<InvoiceSummary, DataError>,
}

/// Monday to Sunday around `date`
pub fn week_of(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    (monday, monday + Duration::days(6))
}

/// First and last day of the month containing `date`
pub fn month_of(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let next_month = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next_month.and_then(|d| d.pred_opt()).unwrap_or(first);
    (first, last)
}

impl Dashboard {
    /// Issue every panel query concurrently and wait for all of them
    pub async fn load<Tz: TimeZone>(
        patients: &Repository<Patient>,
        appointments: &Repository<Appointment>,
        invoices: &Repository<Invoice>,
        now: DateTime<Utc>,
        tz: &Tz,
    ) -> Self {
        let today = now.with_timezone(tz).date_naive();
        let (monday, sunday) = week_of(today);
        let (first, last) = month_of(today);

        let week_count = async {
            let (start, _) = local_day_bounds(monday, tz)?;
            let (_, end) = local_day_bounds(sunday, tz)?;
            appointments.count_in_range(start, end).await
        };
        let month_summary = async {
            let rows = invoices.get_by_issue_range(first, last).await?;
            Ok::<_, DataError>(InvoiceSummary::from_invoices(&rows))
        };

        let (today, recent_patients, week_appointments, month_invoices) = futures::join!(
            appointments.get_by_day(today, tz),
            patients.recent(RECENT_PATIENTS),
            week_count,
            month_summary,
        );

        let dashboard = Self { today, recent_patients, week_appointments, month_invoices };
        for (panel, err) in dashboard.errors() {
            warn!(panel, "Dashboard panel failed: {}", err);
        }
        dashboard
    }

    pub fn errors(&self) -> Vec<(&'static str, &DataError)> {
        let mut errors = vec![];
        if let Err(e) = &self.today {
            errors.push(("today", e));
        }
        if let Err(e) = &self.recent_patients {
            errors.push(("recent_patients", e));
        }
        if let Err(e) = &self.week_appointments {
            errors.push(("week_appointments", e));
        }
        if let Err(e) = &self.month_invoices {
            errors.push(("month_invoices", e));
        }
        errors
    }

    pub fn to_json(&self) -> Value {
        fn panel<T: serde::Serialize>(result: &Result<T, DataError>) -> Value {
            match result {
                Ok(value) => json!({ "data": value }),
                Err(err) => json!({ "error": err.to_json() }),
            }
        }
        json!({
            "today": panel(&self.today),
            "recent_patients": panel(&self.recent_patients),
            "week_appointments": panel(&self.week_appointments),
            "month_invoices": panel(&self.month_invoices),
        })
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("Today's appointments\n");
        match &self.today {
            Ok(rows) if rows.is_empty() => out.push_str("  none\n"),
            Ok(rows) => rows.iter().for_each(|a| out.push_str(&format!("  {}\n", a.summary()))),
            Err(e) => out.push_str(&format!("  error: {}\n", e)),
        }
        out.push_str("Recent patients\n");
        match &self.recent_patients {
            Ok(rows) if rows.is_empty() => out.push_str("  none\n"),
            Ok(rows) => rows.iter().for_each(|p| out.push_str(&format!("  {}\n", p.summary()))),
            Err(e) => out.push_str(&format!("  error: {}\n", e)),
        }
        match &self.week_appointments {
            Ok(count) => out.push_str(&format!("Appointments this week: {}\n", count)),
            Err(e) => out.push_str(&format!("Appointments this week: error: {}\n", e)),
        }
        match &self.month_invoices {
            Ok(s) => out.push_str(&format!(
                "Invoices this month: {} (total €{}, paid €{}, pending €{}, overdue €{})\n",
                s.count,
                s.total.round_dp(2),
                s.paid.round_dp(2),
                s.pending.round_dp(2),
                s.overdue.round_dp(2)
            )),
            Err(e) => out.push_str(&format!("Invoices this month: error: {}\n", e)),
        }
        out
    }
}
