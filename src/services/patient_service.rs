use crate::error::DataError;
use crate::filter::SortDirection;
use crate::models::Patient;
use crate::services::Repository;

impl Repository<Patient> {
    /// Most recently registered patients first
    pub async fn recent(&self, limit: i32) -> Result<Vec<Patient>, DataError> {
        let filter = Self::base_filter()?
            .order_by("created_at", SortDirection::Desc)?
            .limit(limit, None)?;
        self.select(filter).await
    }
}
