use clap::Parser;
use client::input::{parse_command, Command};
use client::network::{Client, ClientConfig};
use log::info;
use shared::DEFAULT_PORT;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Join under this name as soon as the connection is up
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Keep retrying after the connection drops
    #[arg(short = 'r', long)]
    reconnect: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server = args
        .server
        .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_PORT));

    info!("Connecting to: {}", server);
    if args.reconnect {
        info!("Reconnect enabled");
    }
    println!("Type 'help' for the list of commands");

    let (output_tx, mut output_rx) = mpsc::unbounded_channel::<String>();
    let (command_tx, command_rx) = mpsc::channel::<Command>(64);

    tokio::spawn(async move {
        while let Some(line) = output_rx.recv().await {
            println!("{}", line);
        }
    });

    // Stdin reader; parse errors are reported locally and never sent.
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_command(&line) {
                Ok(Some(command)) => {
                    let quit = command == Command::Quit;
                    if command_tx.send(command).await.is_err() || quit {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => eprintln!("{}", e),
            }
        }
    });

    let config = ClientConfig {
        name: args.name,
        reconnect: args.reconnect,
        ..ClientConfig::new(server)
    };
    Client::new(config, output_tx).run(command_rx).await
}
