//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Fetch request logs from Cloudflare's Enterprise Log Share API.
//!
//! Examples:
//! ```bash
//! logshare-cli --api-key KEY --api-email me@example.com --zone-name example.com
//! logshare-cli --zone-id 023e105f4ecef8ad9ca31a8372d0c353 --count -1 --fields RayID,ClientIP
//! logshare-cli --zone-name example.com --list-fields
//!
//! # Persist to Google Cloud Storage and poll every 5 minutes
//! logshare-cli --zone-name example.com \
//!     --google-storage-bucket my-logs --google-project-id my-project \
//!     loop --loop-wait 300
//! ```

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::process::ExitCode;
use tracing::{error, info, warn};

use logshare::clock::{Clock, SystemClock};
use logshare::config::parse_fields;
use logshare::constants::{
    DEFAULT_END_OFFSET_SECS, DEFAULT_LOOP_WAIT_SECS, DEFAULT_START_OFFSET_SECS, ENV_API_EMAIL,
    ENV_API_KEY,
};
use logshare::sleeper::TokioSleeper;
use logshare::{
    logging, run_forever, run_once_until, Checkpoint, Count, Credentials, FetchConfig, LiveBackends,
    StorageDestination, TimestampFormat,
};

// -- Commands

#[derive(Parser, Debug)]
#[command(name = "logshare-cli", author, version, about)]
struct Cli {
    /// Increase log verbosity: -v = Debug, -vv = Trace
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Your Cloudflare API key
    #[arg(long, env = ENV_API_KEY, hide_env_values = true)]
    api_key: Option<String>,

    /// The email address associated with your Cloudflare API key and account
    #[arg(long, env = ENV_API_EMAIL)]
    api_email: Option<String>,

    /// The zone ID of the zone you are requesting logs for
    #[arg(long)]
    zone_id: Option<String>,

    /// The name of the zone you are requesting logs for. Its ID is looked up automatically
    #[arg(long)]
    zone_name: Option<String>,

    /// The timestamp (in Unix seconds) to request logs from. Defaults to 30 minutes behind the current time
    #[arg(long, allow_negative_numbers = true)]
    start_time: Option<i64>,

    /// The timestamp (in Unix seconds) to request logs to. Defaults to 20 minutes behind the current time
    #[arg(long, allow_negative_numbers = true)]
    end_time: Option<i64>,

    /// The number (count) of logs to retrieve. Pass '-1' to retrieve all logs for the given time period
    #[arg(long, default_value = "1", allow_negative_numbers = true)]
    count: Count,

    /// The sampling rate from 0.1 (10%) to 0.9 (90%) to use when retrieving logs
    #[arg(long, default_value_t = 0.0)]
    sample: f64,

    /// The timestamp format to use in logs
    #[arg(long, value_enum, default_value_t = TimestampFormat::UnixNano)]
    timestamp_format: TimestampFormat,

    /// Select specific fields to retrieve in the log response, comma-separated
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,

    /// List the available log fields for use with the --fields flag
    #[arg(long)]
    list_fields: bool,

    /// Google Cloud Storage bucket to upload logs to
    #[arg(long)]
    google_storage_bucket: Option<String>,

    /// Project ID of the Google Cloud Storage bucket to upload logs to
    #[arg(long)]
    google_project_id: Option<String>,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch logs in loop mode
    Loop {
        /// The number of seconds to wait after every loop cycle
        #[arg(long = "loop-wait", default_value_t = DEFAULT_LOOP_WAIT_SECS)]
        loop_wait: u64,

        /// The type of checkpoint to use
        #[arg(long, value_enum, default_value_t = Checkpoint::Timestamp)]
        checkpoint: Checkpoint,
    },
}

impl Cli {
    /// Build the run configuration. Unset window bounds default relative to `clock`.
    fn to_config(&self, clock: &dyn Clock) -> FetchConfig {
        let now = clock.now_unix();
        FetchConfig {
            credentials: Credentials {
                api_key: self.api_key.clone().unwrap_or_default(),
                api_email: self.api_email.clone().unwrap_or_default(),
            },
            zone_id: self.zone_id.clone().unwrap_or_default(),
            zone_name: self.zone_name.clone().unwrap_or_default(),
            start_time: self.start_time.unwrap_or(now - DEFAULT_START_OFFSET_SECS),
            end_time: self.end_time.unwrap_or(now - DEFAULT_END_OFFSET_SECS),
            count: self.count,
            sample: self.sample,
            fields: self.fields.iter().flat_map(|f| parse_fields(f)).collect(),
            list_fields: self.list_fields,
            storage: StorageDestination {
                bucket: self.google_storage_bucket.clone().unwrap_or_default(),
                project_id: self.google_project_id.clone().unwrap_or_default(),
            },
            timestamp_format: self.timestamp_format,
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM. While this is being polled the signals no
/// longer terminate the process, so the output can still be committed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.to_config(&SystemClock);
    let backends = LiveBackends::default();

    match cli.cmd {
        None => {
            run_once_until(config, &backends, shutdown_signal()).await?;
        }
        Some(Command::Loop { loop_wait, checkpoint }) => {
            info!(
                "Loop mode: every {}s, checkpoint '{:?}' is not applied, each cycle fetches {}..{}",
                loop_wait, checkpoint, config.start_time, config.end_time
            );
            run_forever(config, &backends, loop_wait, &TokioSleeper, shutdown_signal()).await?;
        }
    }
    Ok(())
}

/// Main CLI function
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{:#}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
