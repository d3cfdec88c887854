use clap::Parser;
use env_logger::Env;
use log::{error, info};
use server::network::Server;
use server::session::SessionConfig;
use server::world::{World, WorldConfig};
use shared::LineTerminator;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Board width
    #[arg(long, default_value_t = shared::BOARD_WIDTH, value_parser = clap::value_parser!(u32).range(1..))]
    width: u32,

    /// Board height
    #[arg(long, default_value_t = shared::BOARD_HEIGHT, value_parser = clap::value_parser!(u32).range(1..))]
    height: u32,

    /// Milliseconds between hostile moves
    #[arg(short, long, default_value_t = 2000, value_parser = clap::value_parser!(u64).range(1..))]
    tick_ms: u64,

    /// Use CRLF as end of line (default LF)
    #[arg(long)]
    crlf: bool,

    /// Events buffered per connection before a slow reader is dropped
    #[arg(long, default_value_t = shared::EVENT_QUEUE_CAPACITY)]
    queue_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.queue_capacity == 0 {
        return Err("queue capacity must be at least 1".into());
    }

    let terminator = if args.crlf {
        LineTerminator::CrLf
    } else {
        LineTerminator::Lf
    };
    info!("Line terminator: {}", terminator);

    let world_config = WorldConfig {
        width: args.width,
        height: args.height,
        tick: Duration::from_millis(args.tick_ms),
    };
    info!(
        "Board {}x{}, tick every {:?}",
        world_config.width, world_config.height, world_config.tick
    );

    let session_config = SessionConfig {
        terminator,
        queue_capacity: args.queue_capacity,
        ..SessionConfig::default()
    };

    let world = Arc::new(World::new(world_config));
    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, world, session_config).await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, shutting down gracefully...");
        })
        .await?;

    Ok(())
}
