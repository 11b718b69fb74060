pub mod commands;
pub mod config;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clinic::Clinic;
use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "fisio")]
#[command(about = "Fisiosmart CLI - patients, appointments, exercises and billing for a physiotherapy clinic")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Sign in, sign out and account status")]
    Auth {
        #[command(subcommand)]
        cmd: commands::auth::AuthCommands,
    },

    #[command(about = "Patient records")]
    Patients {
        #[command(subcommand)]
        cmd: commands::data::PatientCommands,
    },

    #[command(about = "Appointment calendar")]
    Appointments {
        #[command(subcommand)]
        cmd: commands::data::AppointmentCommands,
    },

    #[command(about = "Exercise library")]
    Exercises {
        #[command(subcommand)]
        cmd: commands::data::ExerciseCommands,
    },

    #[command(about = "Invoices")]
    Invoices {
        #[command(subcommand)]
        cmd: commands::data::InvoiceCommands,
    },

    #[command(about = "Today's schedule, recent patients and monthly billing")]
    Dashboard,

    #[command(about = "Show the access decision for a route")]
    Gate {
        #[arg(help = "Route path, e.g. /patients")]
        path: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    // Fail before any client exists when the platform is not configured
    let app_config = AppConfig::from_env()?;
    let (clinic, remote) = Clinic::connect(&app_config)?;

    let stored = config::load_session_file()?;
    remote.restore_session(stored.session).await;
    let snapshot = clinic.session.initialize().await;
    debug!(phase = ?snapshot.phase, "CLI session ready");

    let result = match cli.command {
        Commands::Auth { cmd } => commands::auth::handle(cmd, &clinic, &output_format).await,
        Commands::Patients { cmd } => commands::data::handle_patients(cmd, &clinic, &output_format).await,
        Commands::Appointments { cmd } => commands::data::handle_appointments(cmd, &clinic, &output_format).await,
        Commands::Exercises { cmd } => commands::data::handle_exercises(cmd, &clinic, &output_format).await,
        Commands::Invoices { cmd } => commands::data::handle_invoices(cmd, &clinic, &output_format).await,
        Commands::Dashboard => commands::dashboard::handle(&clinic, &output_format).await,
        Commands::Gate { path } => commands::gate::handle(&path, &clinic, &output_format),
    };

    // Tokens may have been issued, refreshed or revoked by the command
    config::store_session(remote.current_session().await)?;
    clinic.session.shutdown();
    result
}
