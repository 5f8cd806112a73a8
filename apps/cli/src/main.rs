//! Tensorlink CLI - command-line front end for the prediction and training services
//!
//! This CLI provides a `tlink` command that opens one connection, issues a
//! single predict, format or train call, and shuts the connection down.

mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tensorlink_core::Connection;
use tensorlink_core::config::DEFAULT_SHUTDOWN_TIMEOUT;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{predict, train};
use config::ConnectionArgs;

/// Tensorlink CLI - image prediction and training over gRPC
#[derive(Parser, Debug)]
#[command(
    name = "tlink",
    author,
    version,
    about = "Tensorlink - image prediction and training client",
    long_about = "Tensorlink (tlink) sends images to a TensorFlow-Serving style prediction service\nand submits dataset formatting and training jobs to a training service."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// TOML file with connection settings and predict defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify one image
    ///
    /// Reads the image from a file (or stdin with `-`), sends it as a
    /// single-element string tensor and prints every output tensor.
    Predict {
        /// Image file, or `-` to read standard input
        #[arg(long)]
        image: Option<String>,

        /// Model name (falls back to `[predict].model` in the config file)
        #[arg(long)]
        model: Option<String>,

        /// Signature name (falls back to `[predict].signature`)
        #[arg(long)]
        signature: Option<String>,

        /// Input tensor name (default "images")
        #[arg(long)]
        input_name: Option<String>,

        /// Model version; zero or negative means the server default
        #[arg(long, allow_negative_numbers = true)]
        version: Option<i64>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask the training service to prepare a job's dataset
    Format {
        /// Job name
        job: String,
    },

    /// Submit a training job
    Train {
        /// Training job identifier
        #[arg(long)]
        id: String,

        /// Number of training steps
        #[arg(long)]
        steps: u64,

        /// Percentage of data held out for testing (0-100)
        #[arg(long, default_value_t = 0)]
        test_percent: u32,

        /// Number of data shards (at least 1)
        #[arg(long, default_value_t = 1)]
        shards: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so predict output stays machine readable
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let file_config = config::load(args.config.as_deref())?;
    let client_config = config::resolve(&args.connection, &file_config)?;
    let connection =
        Arc::new(Connection::open(client_config).context("Failed to open connection")?);

    let result = match args.command {
        Command::Predict { image, model, signature, input_name, version, json } => {
            let request = predict::PredictArgs {
                image,
                model: model.or(file_config.predict.model),
                signature: signature.or(file_config.predict.signature),
                input_name: input_name.or(file_config.predict.input_name),
                version: version.or(file_config.predict.version),
                json,
            };
            predict::execute(Arc::clone(&connection), request).await
        }
        Command::Format { job } => train::format(Arc::clone(&connection), &job).await,
        Command::Train { id, steps, test_percent, shards } => {
            let job = tensorlink_core::TrainJob::new(id, steps, test_percent, shards);
            train::execute(Arc::clone(&connection), &job).await
        }
    };

    let report = connection.shutdown(DEFAULT_SHUTDOWN_TIMEOUT).await;
    if !report.drained {
        tracing::warn!(abandoned = report.abandoned, "Shutdown timed out with calls in flight");
    }

    result
}
