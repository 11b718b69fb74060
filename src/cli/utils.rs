use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::io::{BufRead, Read};

use crate::cli::OutputFormat;
use crate::error::{AuthError, DataError};
use crate::services::Entity;

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(Value::Object(extra)), Some(object)) = (data, response.as_object_mut()) {
                object.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(
    output_format: &OutputFormat,
    message: &str,
    error_code: Option<&str>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": false,
                "error": message
            });

            if let Some(code) = error_code {
                response["error_code"] = json!(code);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// Machine-readable code of a library error carried by `err`, if any
pub fn error_code(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(data) = err.downcast_ref::<DataError>() {
        return Some(data.error_code());
    }
    if let Some(auth) = err.downcast_ref::<AuthError>() {
        return Some(auth.error_code());
    }
    None
}

/// Output a list of records, one summary line each in text mode
pub fn output_records<E: Entity>(output_format: &OutputFormat, records: &[E]) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({
                "success": true,
                "count": records.len(),
                "data": records,
            }))?);
        }
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No {} records found", E::LABEL.to_lowercase());
            }
            for record in records {
                println!("{}", record.summary());
            }
        }
    }
    Ok(())
}

/// Output a single record in full
pub fn output_record<E: Entity>(output_format: &OutputFormat, record: &E) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({
                "success": true,
                "data": record,
            }))?);
        }
        OutputFormat::Text => {
            println!("{}", serde_json::to_string_pretty(record)?);
        }
    }
    Ok(())
}

/// Parse a JSON document piped on stdin
pub fn read_stdin_json<T: DeserializeOwned>() -> anyhow::Result<T> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    if input.trim().is_empty() {
        anyhow::bail!("Expected a JSON document on stdin");
    }
    serde_json::from_str(&input).map_err(|e| anyhow::anyhow!("Invalid JSON on stdin: {}", e))
}

/// Take the password from the flag, or read one line from stdin
pub fn resolve_password(password: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("Password is required");
    }
    Ok(password)
}
