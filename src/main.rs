use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use webpt_capture::{
    collect_patient_ids, ensure_authenticated, parse_page_keys, run_batch, AppConfig,
    CaptureOptions, ChromeSession, Credentials, LaunchOptions, PatientBatchRequest,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture screenshots for patient fields
    Capture(CaptureArgs),
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Path to YAML config file
    #[arg(long)]
    config: PathBuf,

    /// Directory to save screenshots
    #[arg(long)]
    output_dir: PathBuf,

    /// One or more patient IDs
    #[arg(long, num_args = 0..)]
    patient_ids: Vec<String>,

    /// File path with one patient ID per line
    #[arg(long)]
    patient_id_file: Option<PathBuf>,

    /// Comma-separated list of page keys to capture; defaults to all
    #[arg(long)]
    pages: Option<String>,
}

#[tokio::main]
async fn main() {
    load_env(None);
    logger_builder().init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Capture(args) => cmd_capture(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Load `.env` (or `env_file`) into the process environment.
/// Must run before the logger is built so `RUST_LOG` from the file applies.
fn load_env(env_file: Option<&Path>) {
    // A missing file is fine; variables may come from the shell
    let _ = match env_file {
        Some(path) => dotenvy::from_path(path),
        None => dotenvy::dotenv().map(|_| ()),
    };
}

fn logger_builder() -> env_logger::Builder {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
}

async fn cmd_capture(args: CaptureArgs) -> anyhow::Result<()> {
    // Everything that can be checked without a browser is checked first
    let config = AppConfig::from_file(&args.config)?;
    let patient_ids = collect_patient_ids(&args.patient_ids, args.patient_id_file.as_deref())?;
    let request = PatientBatchRequest {
        patient_ids,
        page_keys: parse_page_keys(args.pages.as_deref()),
    };

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", args.output_dir.display()))?;

    let session = ChromeSession::launch(LaunchOptions::from_config(&config)).await?;

    let outcome = async {
        let credentials = Credentials::from_env();
        ensure_authenticated(&session, &config, credentials.as_ref()).await?;

        let options = CaptureOptions::from_config(&config);
        let summary = run_batch(&session, &config, &request, &args.output_dir, &options).await?;
        log::info!(
            "{} patients, {} pages: {} fields saved, {} failed",
            summary.patients,
            summary.pages,
            summary.saved,
            summary.failed
        );
        anyhow::Ok(())
    }
    .await;

    if let Err(e) = session.close().await {
        log::warn!("Failed to close browser: {}", e);
    }

    outcome?;
    println!("Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_log_filter_from_env_file() {
        std::env::remove_var("RUST_LOG");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "RUST_LOG=warn").unwrap();

        load_env(Some(file.path()));

        assert_eq!(logger_builder().build().filter(), log::LevelFilter::Warn);
        std::env::remove_var("RUST_LOG");
    }
}
