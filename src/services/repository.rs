use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DataError, RemoteError};
use crate::filter::{Embed, Filter, FilterData, FilterOrderInfo};
use crate::remote::{Query, RemoteService};

/// A row type stored in one remote table
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Fields supplied on creation; the platform assigns `id` and `created_at`
    type New: Serialize + Send + Sync;
    /// Partial update; absent fields are left untouched
    type Patch: Serialize + Send + Sync;

    const TABLE: &'static str;
    const LABEL: &'static str;

    fn id(&self) -> Uuid;

    /// Ordering applied when the caller does not ask for one
    fn default_order() -> Vec<FilterOrderInfo>;

    /// Related rows returned inline with every read
    fn embeds() -> Vec<Embed> {
        vec![]
    }

    fn validate_new(_new: &Self::New) -> Result<(), DataError> {
        Ok(())
    }

    fn validate_patch(_patch: &Self::Patch) -> Result<(), DataError> {
        Ok(())
    }

    /// One-line text rendering
    fn summary(&self) -> String;
}

/// CRUD access to the table of `E`. Each call is one round trip; nothing is cached.
pub struct Repository<E> {
    remote: Arc<dyn RemoteService>,
    _phantom: PhantomData<E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self { remote: self.remote.clone(), _phantom: PhantomData }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(remote: Arc<dyn RemoteService>) -> Self {
        Self { remote, _phantom: PhantomData }
    }

    /// Table filter carrying the entity's embeds, without conditions or order
    pub fn base_filter() -> Result<Filter, DataError> {
        let mut filter = Filter::new(E::TABLE)?;
        for embed in E::embeds() {
            filter = filter.embed(embed)?;
        }
        Ok(filter)
    }

    pub(crate) fn with_default_order(mut filter: Filter) -> Result<Filter, DataError> {
        for info in E::default_order() {
            filter = filter.order_by(&info.column, info.sort)?;
        }
        Ok(filter)
    }

    /// All rows, ordered by `order` ("col desc, other") or the entity default
    pub async fn get_all(&self, order: Option<&str>) -> Result<Vec<E>, DataError> {
        let filter = match order {
            Some(order) => Self::base_filter()?.order(Value::String(order.to_string()))?,
            None => Self::with_default_order(Self::base_filter()?)?,
        };
        self.select(filter).await
    }

    /// Rows matching a JSON query (`where`, `order`, `limit`, `offset`)
    pub async fn find(&self, data: FilterData) -> Result<Vec<E>, DataError> {
        let explicit_order = data.order.is_some();
        let mut filter = Self::base_filter()?.assign(data)?;
        if !explicit_order {
            filter = Self::with_default_order(filter)?;
        }
        self.select(filter).await
    }

    pub async fn select(&self, filter: Filter) -> Result<Vec<E>, DataError> {
        let rows = self.execute(Query::select(filter)).await?;
        decode_rows(rows)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<E, DataError> {
        let filter = Self::base_filter()?.eq("id", id.to_string())?.limit(1, None)?;
        self.select(filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DataError::not_found(format!("{} {} not found", E::LABEL, id)))
    }

    /// Insert and return the record as stored by the platform
    pub async fn create(&self, new: &E::New) -> Result<E, DataError> {
        E::validate_new(new)?;
        let body = serde_json::to_value(new).map_err(RemoteError::from)?;
        let rows = self.execute(Query::insert(Self::base_filter()?, body)).await?;
        let created: E = first_row(rows)?
            .ok_or_else(|| DataError::Remote(RemoteError::Decode(format!("{} insert returned no rows", E::TABLE))))?;
        debug!(table = E::TABLE, id = %created.id(), "Created record");
        Ok(created)
    }

    /// Change only the fields present in `patch`
    pub async fn update(&self, id: Uuid, patch: &E::Patch) -> Result<E, DataError> {
        E::validate_patch(patch)?;
        let body = serde_json::to_value(patch).map_err(RemoteError::from)?;
        if body.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return self.get_by_id(id).await;
        }
        let filter = Self::base_filter()?.eq("id", id.to_string())?;
        let rows = self.execute(Query::update(filter, body)).await?;
        first_row(rows)?.ok_or_else(|| DataError::not_found(format!("{} {} not found", E::LABEL, id)))
    }

    /// Remove a record. A missing id is a success: the end state is the same.
    pub async fn delete(&self, id: Uuid) -> Result<(), DataError> {
        let filter = Filter::new(E::TABLE)?.select(vec!["id".to_string()])?.eq("id", id.to_string())?;
        let rows = self.execute(Query::delete(filter)).await?;
        if rows.is_empty() {
            debug!(table = E::TABLE, %id, "Delete matched no rows");
        }
        Ok(())
    }

    /// Number of rows matching `filter`, without fetching them
    pub async fn count(&self, filter: Filter) -> Result<usize, DataError> {
        let filter = filter.select(vec!["id".to_string()])?;
        debug!(table = filter.table_name(), "Entity count");
        Ok(self.remote.count(filter).await?)
    }

    async fn execute(&self, query: Query) -> Result<Vec<Value>, DataError> {
        debug!(operation = %query.operation, table = query.table(), "Entity query");
        Ok(self.remote.execute(query).await?)
    }
}

fn decode_rows<E: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<E>, DataError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| DataError::Remote(RemoteError::from(e))))
        .collect()
}

fn first_row<E: DeserializeOwned>(rows: Vec<Value>) -> Result<Option<E>, DataError> {
    Ok(decode_rows(rows)?.into_iter().next())
}
