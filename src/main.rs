use anyhow::{Context, Result as AnyhowResult};
use clap::Parser;
use preview::app::PreviewServer;
use preview::config::{PreviewConfig, PreviewMode};
use preview::model::documents::OpenDocuments;
use preview::services::fs::Filesystems;
use preview::services::launcher::SystemBrowserLauncher;
use preview::services::log_dirs;
use preview::services::tracing_setup;
use preview::services::transport::TinyHttpTransport;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loopback preview server for HTML, Markdown and JavaScript documents
#[derive(Parser, Debug)]
#[command(name = "preview")]
#[command(about = "Serve a document and its project folder on a local preview server", long_about = None)]
#[command(version)]
struct Args {
    /// Document to preview (default: index.html in the project root)
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Project folder used to resolve relative paths (default: current directory)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// First port to try
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Where to show the preview: inapp or browser
    #[arg(long, value_name = "MODE")]
    mode: Option<PreviewMode>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to log file (default: XDG state dir)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,

    /// Print the configuration JSON Schema and exit
    #[arg(long)]
    print_config_schema: bool,
}

fn load_config(args: &Args) -> AnyhowResult<PreviewConfig> {
    let mut config = match &args.config {
        Some(path) => PreviewConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PreviewConfig::default(),
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(mode) = args.mode {
        config.preview_mode = mode;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Absolute document path and project root for the run
fn resolve_targets(args: &Args) -> AnyhowResult<(PathBuf, PathBuf)> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("Project root {} does not exist", root.display()))?;

    let file = args.file.clone().unwrap_or_else(|| root.join("index.html"));
    let file = file
        .canonicalize()
        .with_context(|| format!("Document {} does not exist", file.display()))?;

    Ok((file, root))
}

/// Load the document as an open buffer so Markdown and script previews work
fn open_document(documents: &OpenDocuments, file: &Path) {
    let location = file.to_string_lossy();
    match std::fs::read_to_string(file) {
        Ok(text) => documents.open(&location, text),
        Err(e) => tracing::debug!("Not opening {} as text: {}", location, e),
    }
}

async fn serve(config: PreviewConfig, file: PathBuf, root: PathBuf) -> AnyhowResult<()> {
    let documents = Arc::new(OpenDocuments::new());
    open_document(&documents, &file);

    let mut server = PreviewServer::new(
        config,
        Arc::new(TinyHttpTransport::new()),
        Arc::new(SystemBrowserLauncher),
        documents,
        Filesystems::default(),
    );

    let location = file.to_string_lossy().to_string();
    let root = root.to_string_lossy().to_string();
    let outcome = server
        .run(&location, Some(&root))
        .await
        .context("Failed to start preview server")?;

    println!("Previewing {} at {}", file.display(), outcome.url);
    println!("Press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl-C")?;

    server.stop();
    tracing::info!("Preview server shut down");
    Ok(())
}

fn main() -> AnyhowResult<()> {
    let args = Args::parse();

    if args.print_config_schema {
        println!("{}", PreviewConfig::schema_json()?);
        return Ok(());
    }

    let config = load_config(&args)?;

    if args.dump_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(log_dirs::main_log_path);
    if let Err(e) = tracing_setup::init_global(&log_file) {
        eprintln!("Warning: failed to open log file {}: {}", log_file.display(), e);
    }
    log_dirs::cleanup_stale_logs();
    tracing::info!("Preview server starting");

    let (file, root) = resolve_targets(&args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(serve(config, file, root))
}
