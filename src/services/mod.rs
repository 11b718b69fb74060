pub mod repository;
pub mod patient_service;
pub mod appointment_service;
pub mod exercise_service;
pub mod invoice_service;

pub use repository::{Entity, Repository};
pub use appointment_service::local_day_bounds;
