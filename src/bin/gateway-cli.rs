use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the schema gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// List the active validation rules
    Rules,
    /// Show outbound client state and pending cycles
    Client,
    /// Copy a backend resource to another location
    Copy {
        source: String,
        destination: String,
        /// Extra header sent on both requests, as NAME=VALUE
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
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

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)),
        Commands::Rules => client.get(format!("{}/admin/rules", cli.url)),
        Commands::Client => client.get(format!("{}/admin/client", cli.url)),
        Commands::Copy {
            source,
            destination,
            headers: extra,
        } => {
            let mut copied = Map::new();
            for entry in extra {
                let (name, value) = entry
                    .split_once('=')
                    .ok_or_else(|| format!("header '{}' is not NAME=VALUE", entry))?;
                copied.insert(name.to_string(), Value::String(value.to_string()));
            }
            client.post(format!("{}/admin/copy", cli.url)).json(&json!({
                "source": source,
                "destination": destination,
                "headers": copied,
            }))
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
