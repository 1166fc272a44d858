//! Standalone replication server
//!
//! Runs one server instance until interrupted. `RUST_LOG` controls log
//! verbosity.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dsm_rs::server::{Server, ServerConfig};

#[derive(Parser)]
#[command(name = "dsm-server", about = "Shared memory replication server")]
struct Args {
    /// Server ID (0..16); names the segment and queue and offsets the
    /// request port
    server_id: u8,

    /// Remove this server's named resources and exit
    #[arg(short, long)]
    remove: bool,

    /// Remove stale named resources left by a crashed instance, then start
    #[arg(short, long)]
    force: bool,

    /// Directory for the segment and queue socket
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    /// Multicast group to stream buffers to
    #[arg(long)]
    multicast_group: Option<Ipv4Addr>,
}

#[tokio::main]
async fn main() -> dsm_rs::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = ServerConfig::new(args.server_id);
    if let Some(dir) = args.runtime_dir {
        config = config.runtime_dir(dir);
    }
    if let Some(group) = args.multicast_group {
        config = config.multicast_group(group);
    }
    if args.force {
        config = config.force();
    }

    if args.remove {
        let name = config.server_name();
        dsm_rs::store::Segment::remove(&config.runtime_dir, &name)?;
        dsm_rs::queue::ControlQueue::remove(&config.runtime_dir, &name)?;
        tracing::info!(server = %name, "Removed named resources");
        return Ok(());
    }

    let server = Server::new(config).await?;
    let handle = server.handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            handle.stop().await;
        }
    });

    server.run().await
}
