use chrono::Local;

use super::ensure_allowed;
use crate::cli::OutputFormat;
use crate::clinic::Clinic;
use crate::gate::Route;

pub async fn handle(clinic: &Clinic, output_format: &OutputFormat) -> anyhow::Result<()> {
    ensure_allowed(clinic, Route::Dashboard)?;
    let dashboard = clinic.dashboard(&Local).await;

    // Panels fail independently; a partial dashboard is still printed
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&dashboard.to_json())?),
        OutputFormat::Text => print!("{}", dashboard.to_text()),
    }
    Ok(())
}
