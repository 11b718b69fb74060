use serde::{Deserialize, Deserializer};

pub mod account;
pub mod patient;
pub mod appointment;
pub mod exercise;
pub mod invoice;

pub use account::{Identity, NewProfile, Profile, Role, Session, Subscription, SubscriptionStatus};
pub use appointment::{Appointment, AppointmentPatch, AppointmentStatus, NewAppointment, PatientRef};
pub use exercise::{Difficulty, Exercise, ExercisePatch, NewExercise};
pub use invoice::{Invoice, InvoicePatch, InvoiceStatus, NewInvoice};
pub use patient::{NewPatient, Patient, PatientPatch};


/// Patch field for a nullable column: absent leaves it alone, `null` clears it
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
