use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the edge gateway admin API", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWAY_ADMIN_URL", default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gateway status, policy generation and audit queue counters
    Status,
    /// Blocks, challenges and rate limits over a time range
    Analytics {
        /// Range start, seconds since epoch
        #[arg(long)]
        from: Option<u64>,
        /// Range end, seconds since epoch
        #[arg(long)]
        to: Option<u64>,
    },
    /// Most recent security events
    Events {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Summary of the active policy snapshot
    Policy,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Analytics { from, to } => {
            let mut query = Vec::new();
            if let Some(from) = from {
                query.push(("from", from));
            }
            if let Some(to) = to {
                query.push(("to", to));
            }
            client.get(format!("{base}/admin/analytics")).query(&query)
        }
        Commands::Events { limit } => client
            .get(format!("{base}/admin/events"))
            .query(&[("limit", limit)]),
        Commands::Policy => client.get(format!("{base}/admin/policy")),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: admin API returned status {status}");
        if let Ok(text) = res.text().await {
            eprintln!("Response: {text}");
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
