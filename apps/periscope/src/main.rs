use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use periscope_client_core::client::SessionClient;
use periscope_client_core::config::Config;
use periscope_client_core::session::SessionTarget;

/// Headless viewer for live agent browser sessions: attaches the pixel and
/// control streams for one entity and logs what it sees.
#[derive(Parser, Debug)]
#[command(name = "periscope")]
struct Cli {
    /// Attach to a browser session by id
    #[arg(long, value_name = "ID")]
    browser_session: Option<String>,

    /// Attach to the live session of a task
    #[arg(long, value_name = "ID")]
    task: Option<String>,

    /// Attach to the live session of a workflow run
    #[arg(long, value_name = "ID")]
    workflow_run: Option<String>,

    /// Allow taking control of the remote browser
    #[arg(long)]
    interactive: bool,

    /// Start an exfiltration recording immediately
    #[arg(long)]
    record: bool,

    /// REST base url
    #[arg(long, env = "PERISCOPE_API_BASE")]
    api_base: Option<String>,

    /// Stream (WebSocket) base url
    #[arg(long, env = "PERISCOPE_STREAM_BASE")]
    stream_base: Option<String>,

    /// Static api key for local deployments
    #[arg(long, env = "PERISCOPE_API_KEY")]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = {
        let defaults = Config::from_env()?;
        Config::new(
            cli.api_base.as_deref().unwrap_or(defaults.api_base.as_str()),
            cli.stream_base
                .as_deref()
                .unwrap_or(defaults.stream_base.as_str()),
            cli.api_key.or(defaults.api_key),
            defaults.environment,
            defaults.client_id,
        )?
    };

    let target = SessionTarget::select(
        cli.browser_session.as_deref(),
        cli.task.as_deref(),
        cli.workflow_run.as_deref(),
    );
    if target.is_none() {
        anyhow::bail!("one of --browser-session, --task, or --workflow-run is required");
    }

    let client = SessionClient::builder(config)
        .target(target)
        .interactive(cli.interactive)
        .start()?;
    if cli.record {
        client.set_recording(true);
    }

    let mut ready = client.readiness_watch();
    let mut control = client.control_connected_watch();
    info!("watching session; press Ctrl-C to detach");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = ready.changed() => {
                if changed.is_err() {
                    break;
                }
                info!(ready = *ready.borrow(), "readiness changed");
            }
            changed = control.changed() => {
                if changed.is_err() {
                    break;
                }
                info!(connected = *control.borrow(), "control channel");
            }
        }
    }

    if cli.record {
        let (chunks, tail) = client.recorder().export();
        info!(
            chunks = chunks.len(),
            pending = tail.len(),
            "exfiltration recording captured"
        );
    }
    client.shutdown().await;
    Ok(())
}
