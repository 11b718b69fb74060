pub mod cli;
pub mod clinic;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod filter;
pub mod gate;
pub mod models;
pub mod remote;
pub mod resource;
pub mod services;
pub mod session;
pub mod testing;
pub mod types;

pub use clinic::Clinic;
pub use error::{AuthError, DataError, RemoteError};
