use thiserror::Error;

/// A query that cannot be expressed against the REST binding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    #[error("Invalid column name: {0}")]
    InvalidColumn(String),

    #[error("Invalid where clause: {0}")]
    InvalidWhereClause(String),

    #[error("Operator {0} is not supported")]
    UnsupportedOperator(String),

    #[error("Invalid operator data: {0}")]
    InvalidOperatorData(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Invalid paging: {0}")]
    InvalidPaging(String),

    /// Update and delete must name the rows they touch
    #[error("Refusing {0} without a row filter")]
    UnfilteredMutation(String),
}
