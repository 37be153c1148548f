use crate::server;
use bluecrew::error::AppError;
use bluecrew::intake::files::iso_timestamp;
use bluecrew::intake::storage_key;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Bluecrew intake",
    about = "Run the Bluecrew lead intake service and inspect stored submissions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the storage key and document paths for a submission
    StorageKey(StorageKeyArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct StorageKeyArgs {
    /// Email address as submitted (case and surrounding spaces are ignored)
    #[arg(long)]
    pub(crate) email: String,
    /// Submission timestamp as stored in `submitted_at` (RFC 3339)
    #[arg(long)]
    pub(crate) submitted_at: String,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::StorageKey(args) => {
            println!("{}", describe_storage_key(&args)?);
            Ok(())
        }
    }
}

/// Key, CV path and certificate folder for one submission.
pub(crate) fn describe_storage_key(args: &StorageKeyArgs) -> Result<String, AppError> {
    let submitted_at = DateTime::parse_from_rfc3339(args.submitted_at.trim())
        .map_err(|err| {
            AppError::InvalidArgument(format!(
                "failed to parse '{}' as an RFC 3339 timestamp ({err})",
                args.submitted_at
            ))
        })?
        .with_timezone(&Utc);

    let key = storage_key(&args.email, submitted_at);
    Ok(format!(
        "submitted_at: {}\nkey:          {}\ncv:           {}\ncertificates: {}/\napplication:  {}",
        iso_timestamp(submitted_at),
        key,
        key.cv_path(),
        key.cert_folder(),
        key.job_application_path(),
    ))
}
