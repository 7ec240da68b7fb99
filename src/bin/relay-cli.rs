use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use webrelay::config::load_config;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Client CLI for a running webrelay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the relay is up
    Ping,
    /// Show the final URL of a target after redirects
    Resolve { target: String },
    /// Fetch a target through the relay and write the body to stdout
    Fetch {
        target: String,
        /// Use the streaming endpoint instead of the buffered one
        #[arg(long)]
        stream: bool,
    },
    /// Validate a config file and print the effective configuration as JSON
    Config { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Ping => {
            let res = client.get(format!("{}/ping", cli.url)).send().await?;
            print_text(res).await?;
        }
        Commands::Resolve { target } => {
            let res = client
                .get(format!("{}/resolve", cli.url))
                .query(&[("url", target.as_str())])
                .send()
                .await?;
            print_text(res).await?;
        }
        Commands::Fetch { target, stream } => {
            let endpoint = if stream { "file" } else { "proxy" };
            let res = client
                .get(format!("{}/{}", cli.url, endpoint))
                .query(&[("url", target.as_str())])
                .send()
                .await?;
            if !res.status().is_success() {
                eprintln!("Error: relay returned status {}", res.status());
            }

            let mut stdout = tokio::io::stdout();
            let mut body = res.bytes_stream();
            while let Some(chunk) = body.next().await {
                stdout.write_all(&chunk?).await?;
            }
            stdout.flush().await?;
        }
        Commands::Config { path } => {
            let config = load_config(&path)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn print_text(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        eprintln!("Response: {}", text);
        return Ok(());
    }

    println!("{}", text);
    Ok(())
}
