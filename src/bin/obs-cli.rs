use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "obs-cli")]
#[command(about = "Query the health endpoints of a running obs-core service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timeout registry and performance stats
    Health,
    /// Operations slower than a threshold, slowest first
    Slow {
        /// Threshold in milliseconds; the service's slow threshold when omitted
        #[arg(short, long)]
        threshold_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Health => client.get(format!("{}/health", base)).send().await?,
        Commands::Slow { threshold_ms } => {
            let mut request = client.get(format!("{}/health/slow", base));
            if let Some(ms) = threshold_ms {
                request = request.query(&[("threshold_ms", ms)]);
            }
            request.send().await?
        }
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: service returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    if let Some(cid) = res.headers().get("x-correlation-id").and_then(|v| v.to_str().ok()) {
        eprintln!("correlation id: {}", cid);
    }
    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
