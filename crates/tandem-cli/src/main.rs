//! tandem: runs a host and a guest peer in one process.
//!
//! The host starts a session sharing directories under `--source`, invites
//! the guest, and the guest receives the files under `--target`. Both peers
//! talk through an in-process hub, so the run exercises the full invitation
//! and transfer protocol without a network.

mod demo;
mod settings;

use std::path::PathBuf;

use clap::Parser;
use tandem_common::{PeerId, TandemError};
use tandem_config::TandemConfig;
use tracing_subscriber::EnvFilter;

use crate::demo::DemoPlan;

#[derive(Parser)]
#[command(name = "tandem", about = "Share directories between two in-process peers")]
struct Args {
    /// Config file (defaults to the platform config directory).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the roots the host shares.
    #[arg(long, default_value = ".")]
    source: PathBuf,

    /// Directory the guest writes received roots into.
    #[arg(long)]
    target: PathBuf,

    /// Host peer name.
    #[arg(long, default_value = "host")]
    host: String,

    /// Guest peer name.
    #[arg(long, default_value = "guest")]
    guest: String,

    /// Roots (subdirectories of `--source`) to share.
    #[arg(required = true)]
    roots: Vec<String>,
}

fn load(args: &Args) -> Result<TandemConfig, TandemError> {
    let config = match &args.config {
        Some(path) => tandem_config::load_config_from(path)?,
        None => tandem_config::load_config()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), TandemError> {
    let args = Args::parse();
    let config = load(&args)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_filter())),
        )
        .init();

    let session_config = settings::session_config(&config)?;
    tracing::info!(version = %session_config.version, "tandem starting");

    let plan = DemoPlan {
        host: PeerId::from(args.host.as_str()),
        guest: PeerId::from(args.guest.as_str()),
        source: args.source,
        target: args.target,
        roots: args.roots,
    };
    let delivered = demo::run(session_config, plan).await?;

    tracing::info!(roots = delivered, "Demo finished");
    Ok(())
}
