use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{Embed, FilterData, FilterOp, FilterOrderInfo, FilterWhereInfo, QueryPairs, SortDirection};

/// Shape of a table query: projected columns, embeds, conditions, ordering and paging.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    table_name: String,
    select_columns: Vec<String>,
    embeds: Vec<Embed>,
    conditions: Vec<FilterWhereInfo>,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<i32>,
    offset: Option<i32>,
}

impl Filter {
    pub fn new(table_name: impl Into<String>) -> Result<Self, FilterError> {
        let table_name = table_name.into();
        Self::validate_table_name(&table_name)?;
        Ok(Self {
            table_name,
            select_columns: vec![],
            embeds: vec![],
            conditions: vec![],
            order_data: vec![],
            limit: None,
            offset: None,
        })
    }

    pub fn assign(mut self, data: FilterData) -> Result<Self, FilterError> {
        if let Some(select) = data.select { self = self.select(select)?; }
        if let Some(where_clause) = data.where_clause { self = self.where_clause(where_clause)?; }
        if let Some(order) = data.order { self = self.order(order)?; }
        if let Some(limit) = data.limit { self = self.limit(limit, data.offset)?; }
        Ok(self)
    }

    pub fn select(mut self, columns: Vec<String>) -> Result<Self, FilterError> {
        Self::validate_select_columns(&columns)?;
        self.select_columns = columns;
        Ok(self)
    }

    pub fn embed(mut self, embed: Embed) -> Result<Self, FilterError> {
        Self::validate_table_name(&embed.table)?;
        Self::validate_column(&embed.foreign_key)?;
        Self::validate_select_columns(&embed.columns)?;
        self.embeds.push(embed);
        Ok(self)
    }

    pub fn where_clause(mut self, conditions: Value) -> Result<Self, FilterError> {
        let parsed = FilterWhere::parse(&conditions)?;
        for condition in &parsed {
            Self::validate_column(&condition.column)?;
        }
        self.conditions.extend(parsed);
        Ok(self)
    }

    pub fn condition(mut self, column: &str, operator: FilterOp, data: impl Into<Value>) -> Result<Self, FilterError> {
        Self::validate_column(column)?;
        let data = data.into();
        if operator == FilterOp::In && !data.is_array() {
            return Err(FilterError::InvalidOperatorData("$in requires array".to_string()));
        }
        self.conditions.push(FilterWhereInfo { column: column.to_string(), operator, data });
        Ok(self)
    }

    pub fn eq(self, column: &str, data: impl Into<Value>) -> Result<Self, FilterError> {
        self.condition(column, FilterOp::Eq, data)
    }

    pub fn gte(self, column: &str, data: impl Into<Value>) -> Result<Self, FilterError> {
        self.condition(column, FilterOp::Gte, data)
    }

    pub fn lte(self, column: &str, data: impl Into<Value>) -> Result<Self, FilterError> {
        self.condition(column, FilterOp::Lte, data)
    }

    pub fn order(mut self, order_spec: Value) -> Result<Self, FilterError> {
        let order_info = FilterOrder::validate_and_parse(&order_spec)?;
        for info in &order_info {
            Self::validate_column(&info.column)?;
        }
        self.order_data = order_info;
        Ok(self)
    }

    pub fn order_by(mut self, column: &str, sort: SortDirection) -> Result<Self, FilterError> {
        Self::validate_column(column)?;
        self.order_data.push(FilterOrderInfo { column: column.to_string(), sort });
        Ok(self)
    }

    pub fn limit(mut self, limit: i32, offset: Option<i32>) -> Result<Self, FilterError> {
        if limit < 0 { return Err(FilterError::InvalidPaging("Limit must be non-negative".to_string())); }
        if let Some(off) = offset { if off < 0 { return Err(FilterError::InvalidPaging("Offset must be non-negative".to_string())); } }
        self.limit = Some(limit);
        self.offset = offset;
        Ok(self)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn embeds(&self) -> &[Embed] {
        &self.embeds
    }

    pub fn conditions(&self) -> &[FilterWhereInfo] {
        &self.conditions
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    /// Query parameters for a read (select, filters, order, paging)
    pub fn to_query_pairs(&self) -> QueryPairs {
        let mut pairs = vec![("select".to_string(), self.build_select_clause())];
        pairs.extend(self.to_filter_pairs());
        if let Some(order) = FilterOrder::render(&self.order_data) {
            pairs.push(("order".to_string(), order));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        pairs
    }

    /// Query parameters that only restrict rows (update-by-filter, delete-by-filter)
    pub fn to_filter_pairs(&self) -> QueryPairs {
        self.conditions.iter().map(FilterWhere::render).collect()
    }

    /// Query parameters for a mutation: the returned representation plus row restrictions
    pub fn to_mutation_pairs(&self) -> QueryPairs {
        let mut pairs = vec![("select".to_string(), self.build_select_clause())];
        pairs.extend(self.to_filter_pairs());
        pairs
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.conditions.iter().all(|c| FilterWhere::matches(c, row))
    }

    /// Restrict, order and page a set of rows the way the server would.
    /// Column projection and embeds are left to the caller.
    pub fn apply(&self, rows: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut out: Vec<Value> = rows.into_iter().filter(|row| self.matches(row)).collect();
        FilterOrder::sort(&mut out, &self.order_data);
        let skip = self.offset.unwrap_or(0).max(0) as usize;
        let take = self.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        out.into_iter().skip(skip).take(take).collect()
    }

    /// Keep only the selected columns of a row (embeds are kept by name)
    pub fn project(&self, row: Value) -> Value {
        if self.select_columns.is_empty() || self.select_columns.iter().any(|c| c == "*") {
            return row;
        }
        match row {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(k, _)| self.select_columns.contains(k) || self.embeds.iter().any(|e| &e.table == k))
                    .collect(),
            ),
            other => other,
        }
    }

    fn validate_table_name(name: &str) -> Result<(), FilterError> {
        if name.is_empty() { return Err(FilterError::InvalidTable("Table name cannot be empty".to_string())); }
        if !Self::is_identifier(name) {
            return Err(FilterError::InvalidTable(format!("Invalid table name format: {}", name)));
        }
        Ok(())
    }

    fn validate_column(column: &str) -> Result<(), FilterError> {
        if column.is_empty() { return Err(FilterError::InvalidColumn("Column name cannot be empty".to_string())); }
        if !Self::is_identifier(column) {
            return Err(FilterError::InvalidColumn(format!("Invalid column name format: {}", column)));
        }
        Ok(())
    }

    fn validate_select_columns(columns: &[String]) -> Result<(), FilterError> {
        for column in columns {
            if column == "*" { continue; }
            Self::validate_column(column)?;
        }
        Ok(())
    }

    fn is_identifier(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    }

    fn build_select_clause(&self) -> String {
        let base = if self.select_columns.is_empty() || self.select_columns.iter().any(|c| c == "*") {
            "*".to_string()
        } else {
            self.select_columns.join(",")
        };
        std::iter::once(base)
            .chain(self.embeds.iter().map(Embed::to_rest))
            .collect::<Vec<_>>()
            .join(",")
    }
}
