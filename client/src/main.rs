use clap::Parser;
use client::{Client, Config};
use log::{error, info};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RCon address of the game server
    #[arg(short = 'a', long, default_value = "127.0.0.1:2306")]
    address: String,

    /// RCon password
    #[arg(short = 'p', long)]
    password: String,

    /// Seconds to wait for the login response
    #[arg(long, default_value = "2")]
    conn_timeout: f64,

    /// Seconds to wait for a command response
    #[arg(long, default_value = "1")]
    response_timeout: f64,

    /// Extra seconds to wait for trailing fragments of a response
    #[arg(long, default_value = "0.5")]
    multi_response_timeout: f64,

    /// Idle seconds before a heartbeat is sent
    #[arg(long, default_value = "5")]
    heartbeat: f64,

    /// Run a single command and exit instead of reading stdin
    #[arg(short = 'c', long)]
    command: Option<String>,
}

fn seconds(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = Config {
        conn_timeout: seconds(args.conn_timeout),
        response_timeout: seconds(args.response_timeout),
        multi_response_timeout: seconds(args.multi_response_timeout),
        heartbeat_interval: seconds(args.heartbeat),
        ..Config::new(args.address, args.password)
    };

    let (client, mut chat) = Client::with_chat_channel(config);

    info!("Connecting to {}", client.config().address);
    if !client.connect().await? {
        eprintln!("Login rejected: wrong password");
        std::process::exit(1);
    }

    tokio::spawn(async move {
        while let Some(message) = chat.recv().await {
            println!("{}", message);
        }
    });

    if let Some(command) = args.command {
        run_command(&client, &command).await;
    } else {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let command = line.trim();
                        if !command.is_empty() {
                            run_command(&client, command).await;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("Error reading stdin: {}", e);
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, disconnecting...");
                    break;
                }
            }
        }
    }

    client.disconnect().await?;
    Ok(())
}

async fn run_command(client: &Client, command: &str) {
    match client.execute(command).await {
        Ok(response) => println!("{}", String::from_utf8_lossy(&response)),
        Err(e) => eprintln!("{}: {}", command, e),
    }
}
