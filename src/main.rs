//! ReasonKit Macro CLI
//!
//! Runs action macros, context extraction and region capture against an HTML
//! file or a live page.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use reasonkit_macro::browser::{
    BrowserConfig, BrowserController, CaptureOptions, PageCapture, PageHandle,
};
use reasonkit_macro::capture::{CaptureRequest, CaptureTarget, RegionCapture};
use reasonkit_macro::config::EngineConfig;
use reasonkit_macro::page::{DocumentPage, PageDriver};
use reasonkit_macro::{ActionExecutor, ContextExtractor, ElementResolver, Macro};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// ReasonKit Macro
#[derive(Parser, Debug)]
#[command(name = "rk-macro")]
#[command(author = "ReasonKit Team <team@reasonkit.sh>")]
#[command(version)]
#[command(about = "Page automation macros, context extraction and region capture")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the page context as JSON
    Context {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Execute a macro and print its outcome
    Run {
        #[command(flatten)]
        page: PageArgs,

        /// Macro file (JSON array or {"actions": [...]})
        #[arg(short, long = "macro")]
        macro_file: PathBuf,

        /// Override the selector resolution timeout
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Compute a capture region; live pages also write the image
    Capture {
        #[command(flatten)]
        page: PageArgs,

        /// Element to capture
        #[arg(short, long)]
        selector: Option<String>,

        /// Left edge of an explicit region
        #[arg(short)]
        x: Option<f64>,

        /// Top edge of an explicit region
        #[arg(short)]
        y: Option<f64>,

        /// Width of an explicit region
        #[arg(long)]
        width: Option<f64>,

        /// Height of an explicit region
        #[arg(long)]
        height: Option<f64>,

        /// Write the image here instead of embedding it in the output
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct PageArgs {
    /// Local HTML file to load instead of a live page
    #[arg(long)]
    html: Option<PathBuf>,

    /// Page URL; navigated to unless --html is given
    #[arg(short, long)]
    url: Option<String>,

    /// Path to Chrome/Chromium executable
    #[arg(long)]
    chrome_path: Option<String>,

    /// Run in headless mode
    #[arg(long, default_value = "true")]
    headless: bool,
}

enum Session {
    Document(Arc<DocumentPage>),
    Live(BrowserController, PageHandle),
}

impl PageArgs {
    async fn open(&self) -> Result<Session> {
        if let Some(path) = &self.html {
            let html = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let url = match &self.url {
                Some(url) => url.clone(),
                None => format!("file://{}", std::fs::canonicalize(path)?.display()),
            };
            tracing::info!("Loaded document {} as {}", path.display(), url);
            return Ok(Session::Document(Arc::new(
                DocumentPage::new(html).with_url(url),
            )));
        }

        let Some(url) = &self.url else {
            bail!("either --html or --url is required");
        };

        let config = BrowserConfig {
            headless: self.headless,
            chrome_path: self.chrome_path.as_ref().map(PathBuf::from),
            ..BrowserConfig::default()
        };
        let controller = BrowserController::launch(config).await?;
        let page = controller.open(url).await?;
        Ok(Session::Live(controller, page))
    }
}

impl Session {
    async fn close(self) -> Result<()> {
        if let Session::Live(controller, _) = self {
            controller.close().await?;
        }
        Ok(())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Cancel `token` on Ctrl-C
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
}

async fn context<P: PageDriver>(page: &P, config: &EngineConfig) -> Result<()> {
    let context = ContextExtractor::new(config.limits)
        .capture(page)
        .await?;
    print_json(&context)
}

async fn run<P: PageDriver + 'static>(
    page: Arc<P>,
    config: EngineConfig,
    actions: Macro,
    cancel: &CancellationToken,
) -> Result<()> {
    let executor = ActionExecutor::new(page, config);
    let outcome = executor.execute_with_cancel(actions, cancel).await?;
    print_json(&outcome)
}

async fn region<P: PageDriver>(
    page: &P,
    config: &EngineConfig,
    target: &CaptureTarget,
    cancel: &CancellationToken,
) -> Result<reasonkit_macro::capture::CaptureDescriptor> {
    let resolver = ElementResolver::new(config.resolve_timeout(), config.poll_interval());
    Ok(RegionCapture::new(resolver)
        .capture(page, target, cancel)
        .await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config(cli.config.as_ref())?;
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    match cli.command {
        Command::Context { page } => {
            let session = page.open().await?;
            let result = match &session {
                Session::Document(doc) => context(doc.as_ref(), &config).await,
                Session::Live(_, handle) => context(handle, &config).await,
            };
            session.close().await?;
            result
        }
        Command::Run {
            page,
            macro_file,
            timeout_ms,
        } => {
            if let Some(ms) = timeout_ms {
                config.resolve_timeout_ms = ms;
            }
            let text = std::fs::read_to_string(&macro_file)
                .with_context(|| format!("Failed to read {}", macro_file.display()))?;
            let actions = Macro::from_json(&text)?;

            let session = page.open().await?;
            let result = match &session {
                Session::Document(doc) => run(Arc::clone(doc), config, actions, &cancel).await,
                Session::Live(_, handle) => {
                    run(Arc::new(handle.clone()), config, actions, &cancel).await
                }
            };
            session.close().await?;
            result
        }
        Command::Capture {
            page,
            selector,
            x,
            y,
            width,
            height,
            output,
        } => {
            let target = CaptureTarget::try_from(CaptureRequest {
                x,
                y,
                width,
                height,
                selector,
            })?;

            let session = page.open().await?;
            let result = match &session {
                Session::Document(doc) => region(doc.as_ref(), &config, &target, &cancel)
                    .await
                    .and_then(|descriptor| print_json(&descriptor)),
                Session::Live(_, handle) => {
                    capture_live(handle, &config, &target, output.as_ref(), &cancel).await
                }
            };
            session.close().await?;
            result
        }
    }
}

async fn capture_live(
    handle: &PageHandle,
    config: &EngineConfig,
    target: &CaptureTarget,
    output: Option<&PathBuf>,
    cancel: &CancellationToken,
) -> Result<()> {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    let source = PageCapture::new(handle.clone(), CaptureOptions::png());
    let resolver = ElementResolver::new(config.resolve_timeout(), config.poll_interval());
    let mut response = RegionCapture::new(resolver)
        .capture_with(handle, target, &source, cancel)
        .await?;

    if let Some(path) = output {
        std::fs::write(path, BASE64.decode(&response.image.data)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Wrote {} bytes to {}", response.image.size, path.display());
        response.image.data.clear();
    }
    print_json(&response)
}
