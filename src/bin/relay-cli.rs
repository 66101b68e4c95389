use clap::Parser;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};
use std::io::Write;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Send one chat-completions request through a running llm-relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Authorization value forwarded verbatim, e.g. "Bearer sk-..."
    #[arg(short, long, env = "RELAY_API_KEY")]
    key: Option<String>,

    #[arg(short, long, default_value = "gpt-4o-mini")]
    model: String,

    /// Ask for an event stream and print chunks as they arrive
    #[arg(short, long)]
    stream: bool,

    prompt: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(key)?);
    }

    let payload = json!({
        "model": cli.model,
        "stream": cli.stream,
        "messages": [{ "role": "user", "content": cli.prompt }],
    });

    let res = client
        .post(format!("{}/v1/chat/completions", cli.url.trim_end_matches('/')))
        .headers(headers)
        .json(&payload)
        .send()
        .await?;

    if cli.stream {
        print_stream(res).await
    } else {
        print_response(res).await
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn print_stream(mut res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let mut stdout = std::io::stdout();
    while let Some(chunk) = res.chunk().await? {
        stdout.write_all(&chunk)?;
        stdout.flush()?;
    }
    Ok(())
}
