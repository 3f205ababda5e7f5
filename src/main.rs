//! `pneumonia-detect` CLI - serve or run chest X-ray pneumonia classification.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pneumonia_detect::model::{LoaderConfig, ModelHandle, ModelLoader, ModelSource};
use pneumonia_detect::web::{self, AppState, ServerConfig};
use pneumonia_detect::{Config, Pipeline};

/// Classify chest X-ray images as pneumonia or normal.
#[derive(Parser, Debug)]
#[command(name = "pneumonia-detect")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,

    #[command(flatten)]
    model: ModelArgs,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve(ServeArgs),

    /// Classify image files and print the result for each.
    Classify(ClassifyArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind.
    #[arg(short, long, env = "PORT", default_value = "5000")]
    port: u16,

    /// Directory form uploads are saved to.
    #[arg(long, default_value = "static/uploads", value_name = "DIR")]
    upload_dir: PathBuf,

    /// Static page served by the index function.
    #[arg(long, default_value = "public/index.html", value_name = "FILE")]
    index_page: PathBuf,

    /// Maximum request body size in bytes.
    #[arg(long, default_value = "10485760", value_name = "BYTES")]
    max_body_size: usize,

    /// Load the model before accepting requests instead of on first use.
    #[arg(long)]
    preload: bool,
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// Image files to classify.
    #[arg(value_name = "IMAGE", required = true)]
    images: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Model sources to try, in order.
    #[arg(
        long,
        env = "MODEL_SOURCES",
        value_delimiter = ',',
        default_value = "local,remote",
        global = true
    )]
    model_sources: Vec<ModelSource>,

    /// Candidate local model paths. Defaults to model.onnx in the working
    /// directory, its parent, and next to the executable.
    #[arg(long = "model-path", env = "MODEL_PATHS", value_delimiter = ',', global = true)]
    model_paths: Vec<PathBuf>,

    /// URL to download the model from when no local file is found.
    #[arg(long, env = "MODEL_URL", global = true)]
    model_url: Option<String>,

    /// Directory downloaded models are cached in.
    #[arg(long, value_name = "DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// Model download timeout in seconds.
    #[arg(long, default_value = "60", value_name = "SECS", global = true)]
    download_timeout: u64,

    /// Probability above which an image is labelled pneumonia.
    #[arg(long, default_value = "0.95", value_name = "FLOAT", global = true)]
    threshold: f64,

    /// Side length images are resized to before inference.
    #[arg(long, default_value = "256", value_name = "PX", global = true)]
    image_size: u32,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("pneumonia_detect={log_level},tower_http={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(cli) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(cli: Cli) -> Result<()> {
    let pipeline = Arc::new(build_pipeline(&cli.model).context("Failed to initialize pipeline")?);

    match cli.command.unwrap_or(Command::Serve(cli.serve)) {
        Command::Serve(args) => serve(pipeline, args),
        Command::Classify(args) => classify(&pipeline, &args),
    }
}

fn build_pipeline(args: &ModelArgs) -> Result<Pipeline> {
    let defaults = LoaderConfig::default();
    let loader_config = LoaderConfig {
        sources: args.model_sources.clone(),
        local_paths: if args.model_paths.is_empty() {
            defaults.local_paths
        } else {
            args.model_paths.clone()
        },
        remote_url: args.model_url.clone(),
        download_timeout: Duration::from_secs(args.download_timeout),
        cache_dir: args.cache_dir.clone(),
    };
    let loader = ModelLoader::new(loader_config).context("Invalid model configuration")?;

    let config = Config {
        threshold: args.threshold,
        image_size: args.image_size,
    };

    Ok(Pipeline::new(config, Arc::new(ModelHandle::new(loader)))?)
}

fn serve(pipeline: Arc<Pipeline>, args: ServeArgs) -> Result<()> {
    let config = ServerConfig {
        host: args.host,
        port: args.port,
        upload_dir: args.upload_dir,
        index_page: args.index_page,
        max_body_size: args.max_body_size,
    };
    let preload = args.preload;
    let state = Arc::new(
        AppState::new(Arc::clone(&pipeline), config).context("Invalid server configuration")?,
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        if preload {
            tracing::info!("Preloading model...");
            tokio::task::spawn_blocking(move || pipeline.model().get().map(|_| ()))
                .await?
                .context("Failed to preload model")?;
        }

        web::serve(state).await.context("Server error")
    })
}

fn classify(pipeline: &Pipeline, args: &ClassifyArgs) -> Result<()> {
    let mut failures = 0usize;

    for path in &args.images {
        match pipeline.classify_file(path) {
            Ok(prediction) => println!("{}: {prediction}", path.display()),
            Err(err) => {
                tracing::error!("{}: {err}", path.display());
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} images failed", args.images.len());
    }

    Ok(())
}
