/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// Table operations supported by the remote data service
/// Used by both the query builder and the entity repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Select,
    Create,
    Update,
    Upsert, // Insert or merge on primary key conflict
    Delete,
}

impl Operation {
    /// HTTP method used by the REST binding
    pub fn method(&self) -> reqwest::Method {
        match self {
            Operation::Select => reqwest::Method::GET,
            Operation::Create | Operation::Upsert => reqwest::Method::POST,
            Operation::Update => reqwest::Method::PATCH,
            Operation::Delete => reqwest::Method::DELETE,
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::Select)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Select => "select",
            Operation::Create => "insert",
            Operation::Update => "update",
            Operation::Upsert => "upsert",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}
