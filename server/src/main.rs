use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::{Server, ServerEvent};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<String>,

    /// Seconds before an unanswered hint expires
    #[arg(long)]
    hint_timeout: Option<u64>,

    /// Seconds a connection window stays open
    #[arg(long)]
    connection_window: Option<u64>,
}

impl Args {
    /// Loads the config file (if any) and layers the flags on top.
    fn into_config(self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if self.host.is_some() || self.port.is_some() {
            let current = config.socket_addr()?;
            let host = self.host.unwrap_or_else(|| current.ip().to_string());
            let port = self.port.unwrap_or(current.port());
            config.listen_addr = format!("{}:{}", host, port);
        }
        if let Some(secs) = self.hint_timeout {
            config.game.hint_timeout_secs = secs;
        }
        if let Some(secs) = self.connection_window {
            config.game.connection_window_secs = secs;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;
    info!(
        "Hint timeout {}s, connection window {}s, up to {} connections",
        config.game.hint_timeout_secs,
        config.game.connection_window_secs,
        config.limits.max_connections
    );

    let server = Server::bind(config).await?;
    let handle = server.handle();
    let mut running = tokio::spawn(server.run());

    // Handle shutdown gracefully
    tokio::select! {
        result = &mut running => {
            match result {
                Ok(Err(e)) => error!("Server stopped with error: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    let _ = handle.send(ServerEvent::Shutdown);
    if let Err(e) = running.await {
        error!("Server task panicked: {}", e);
    }

    Ok(())
}
