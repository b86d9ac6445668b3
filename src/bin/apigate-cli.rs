use clap::{Parser, Subcommand, ValueEnum};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "apigate-cli")]
#[command(about = "Management CLI for the apigate admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cache state and snapshot generation
    Status,
    /// List loaded routes
    Routes,
    /// List loaded upstreams (credentials redacted)
    Upstreams,
    /// Force a configuration reload
    Reload,
    /// Dry-run a request against the loaded routes
    TestRoute {
        /// Request path, optionally with a query string
        path: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Header as `Name: value`; repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        #[arg(short, long)]
        body: Option<String>,
    },
    /// Check an expression's syntax
    Validate {
        expression: String,
        #[arg(long, value_enum, default_value_t = Kind::Request)]
        kind: Kind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Request,
    Response,
    PathRewrite,
    Metering,
}

impl Kind {
    fn as_str(self) -> &'static str {
        match self {
            Kind::Request => "request",
            Kind::Response => "response",
            Kind::PathRewrite => "path_rewrite",
            Kind::Metering => "metering",
        }
    }
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
    let res = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Routes => client.get(format!("{}/admin/routes", base)),
        Commands::Upstreams => client.get(format!("{}/admin/upstreams", base)),
        Commands::Reload => client.post(format!("{}/admin/reload", base)),
        Commands::TestRoute {
            path,
            method,
            headers: raw_headers,
            body,
        } => {
            let mut header_map = serde_json::Map::new();
            for raw in raw_headers {
                let Some((name, value)) = raw.split_once(':') else {
                    return Err(format!("invalid header '{}', expected 'Name: value'", raw).into());
                };
                header_map.insert(name.trim().to_string(), Value::String(value.trim().to_string()));
            }
            client
                .post(format!("{}/admin/test-route", base))
                .json(&json!({
                    "method": method,
                    "path": path,
                    "headers": header_map,
                    "body": body,
                }))
        }
        Commands::Validate { expression, kind } => client
            .post(format!("{}/admin/validate-expr", base))
            .json(&json!({ "expression": expression, "kind": kind.as_str() })),
    }
    .headers(headers)
    .send()
    .await?;

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
