use chrono::{DateTime, Duration, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use uuid::Uuid;

use crate::error::DataError;
use crate::filter::Filter;
use crate::models::Appointment;
use crate::services::{Entity, Repository};

/// First and last instant of `date` in `tz`, as UTC
pub fn local_day_bounds<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Result<(DateTime<Utc>, DateTime<Utc>), DataError> {
    let start = local_midnight(date, tz)?;
    let next = date
        .succ_opt()
        .ok_or_else(|| DataError::validation(format!("No day after {}", date), None))?;
    let end = local_midnight(next, tz)? - Duration::milliseconds(1);
    Ok((start, end))
}

fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Result<DateTime<Utc>, DataError> {
    let midnight = date.and_time(NaiveTime::MIN);
    // A DST jump can skip or repeat midnight; take the earliest valid instant
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| DataError::validation(format!("No local midnight on {}", date), None))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Repository<Appointment> {
    /// Appointments starting within `[start, end]`, earliest first
    pub async fn get_by_date_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Appointment>, DataError> {
        if end < start {
            return Err(DataError::validation("Range end precedes range start", None));
        }
        let filter = Self::base_filter()?
            .gte("start_time", timestamp(start))?
            .lte("start_time", timestamp(end))?;
        self.select(Self::with_default_order(filter)?).await
    }

    /// Appointments on a calendar day of the clinic's time zone
    pub async fn get_by_day<Tz: TimeZone>(&self, date: NaiveDate, tz: &Tz) -> Result<Vec<Appointment>, DataError> {
        let (start, end) = local_day_bounds(date, tz)?;
        self.get_by_date_range(start, end).await
    }

    pub async fn get_by_patient(&self, patient_id: Uuid) -> Result<Vec<Appointment>, DataError> {
        let filter = Self::base_filter()?.eq("patient_id", patient_id.to_string())?;
        self.select(Self::with_default_order(filter)?).await
    }

    /// Number of appointments starting within `[start, end]`
    pub async fn count_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<usize, DataError> {
        let filter = Filter::new(Appointment::TABLE)?
            .gte("start_time", timestamp(start))?
            .lte("start_time", timestamp(end))?;
        self.count(filter).await
    }
}
