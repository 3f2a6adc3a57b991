//! Browser recorder
//!
//! Launches a browser, attaches a puppet to the page, runs the controller and
//! prints every captured event as one JSON line on stdout.

use anyhow::Context;
use browser_puppeteer::browser::{BrowserSession, LaunchOptions};
use browser_puppeteer::{
    BrowserPuppet, BrowserPuppeteer, PuppetConfig, PuppeteerConfig, PuppeteerEvent,
    RecorderSettings,
};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "browser-recorder")]
#[command(version)]
#[command(about = "Record user actions in a browser page", long_about = None)]
struct Cli {
    /// Page to record
    #[arg(long, value_name = "URL")]
    url: String,

    /// Controller port
    #[arg(long, short = 'p', default_value_t = browser_puppeteer::config::DEFAULT_PORT)]
    port: u16,

    /// Launch browser in headed mode (default: headless)
    #[arg(long, short = 'H')]
    headed: bool,

    /// Recorder settings JSON file
    #[arg(long, value_name = "FILE")]
    config: Option<String>,

    /// Path to custom browser executable
    #[arg(long, value_name = "PATH")]
    executable_path: Option<String>,

    /// Persistent browser profile directory
    #[arg(long, value_name = "DIR")]
    user_data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => RecorderSettings::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path))?,
        None => RecorderSettings::default(),
    };

    let puppeteer = Arc::new(BrowserPuppeteer::new(PuppeteerConfig::new().port(cli.port)));
    let mut events = puppeteer.subscribe();
    let addr = puppeteer.start().await.context("Failed to start controller")?;
    eprintln!("Controller listening on ws://{}", addr);

    let mut options = LaunchOptions::new().headless(!cli.headed);
    if let Some(path) = &cli.executable_path {
        eprintln!("Browser executable: {}", path);
        options = options.chrome_path(path);
    }
    if let Some(dir) = &cli.user_data_dir {
        eprintln!("User data directory: {}", dir);
        options = options.user_data_dir(dir);
    }

    let session = BrowserSession::launch(options)?;
    session.navigate(&cli.url)?;
    eprintln!("Recording {}", cli.url);

    let puppet = BrowserPuppet::new(Arc::new(session.document()?));
    let puppet_task = puppet.start(&PuppetConfig::new().server_url(format!("ws://{}", addr)))?;

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Stopping...");
                break;
            }
            received = events.recv() => match received {
                Ok(event) => {
                    if let PuppeteerEvent::PuppetConnected { .. } = event {
                        let puppeteer = puppeteer.clone();
                        let settings = settings.clone();
                        tokio::spawn(async move {
                            if let Err(e) = settings.apply(&puppeteer).await {
                                log::error!("Failed to apply recorder settings: {}", e);
                            }
                        });
                    }
                    writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
                    stdout.flush()?;
                }
                Err(RecvError::Lagged(skipped)) => log::warn!("Skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    }

    puppeteer.stop().await;
    puppet_task.abort();
    session.close()?;

    Ok(())
}
