use crate::error::DataError;
use crate::models::Exercise;
use crate::services::Repository;

impl Repository<Exercise> {
    pub async fn get_by_category(&self, category: &str) -> Result<Vec<Exercise>, DataError> {
        let filter = Self::with_default_order(Self::base_filter()?.eq("category", category)?)?;
        self.select(filter).await
    }
}
