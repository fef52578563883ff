use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use reqwest::Client;
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use url::Url;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "hush", about = "Zero-knowledge ephemeral secret sharing", version)]
struct Cli {
    /// hush server URL (default: http://localhost:8080 or $HUSH_SERVER)
    #[arg(long, env = "HUSH_SERVER", default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the hush HTTP server
    Serve {
        /// Port to listen on (default: $HUSH_PORT or 8080)
        #[arg(long, env = "HUSH_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind (default: $HUSH_HOST or 0.0.0.0)
        #[arg(long, env = "HUSH_HOST", default_value = "0.0.0.0")]
        host: String,
    },
    /// Encrypt a secret locally, upload the ciphertext and print the link
    Create(CreateArgs),
    /// Fetch a share link and decrypt it locally
    Open {
        /// Share link (`https://host/view/<id>#<key>`) or a bare `<id>#<key>`
        link: String,
        /// Password, for shares that require one
        #[arg(long)]
        password: Option<String>,
    },
    /// Show a share's metadata without spending a view
    Peek {
        /// Share link or id
        link: String,
    },
    /// Generate a random password locally
    Genpass {
        /// Password length
        #[arg(long, default_value_t = hush_crypto::DEFAULT_PASSWORD_LENGTH)]
        length: usize,
    },
}

#[derive(Args)]
struct CreateArgs {
    /// The secret text. Read from stdin when omitted.
    secret: Option<String>,
    /// Title shown to viewers before they open the share
    #[arg(long)]
    title: Option<String>,
    /// Expiration window: 15m, 1h, 24h or 7d
    #[arg(long, default_value = "1h")]
    expires: String,
    /// Views before the share self-destructs (1-100)
    #[arg(long, default_value = "1")]
    views: u32,
    /// Require this password on top of the link
    #[arg(long)]
    password: Option<String>,
    /// Use a shorter 8-character id instead of a UUID
    #[arg(long)]
    short: bool,
    /// Origin for the printed link, when it differs from the API server
    #[arg(long)]
    origin: Option<String>,
}

const EXPIRATION_LABELS: [&str; 4] = ["15m", "1h", "24h", "7d"];

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("HUSH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(host, port).await,
        Commands::Create(args) => cmd_create(&cli.server, args).await,
        Commands::Open { link, password } => {
            cmd_open(&cli.server, &link, password.as_deref()).await
        }
        Commands::Peek { link } => cmd_peek(&cli.server, &link).await,
        Commands::Genpass { length } => {
            println!("{}", hush_crypto::generate_secure_password(length));
            Ok(())
        }
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16) -> Result<()> {
    let cfg = hush_server::ServerConfig {
        host,
        port,
        ..Default::default()
    };
    hush_server::run(cfg).await
}

async fn cmd_create(server: &str, args: CreateArgs) -> Result<()> {
    if !EXPIRATION_LABELS.contains(&args.expires.as_str()) {
        anyhow::bail!(
            "invalid --expires {:?}: choose one of 15m, 1h, 24h, 7d",
            args.expires
        );
    }

    let secret = match args.secret {
        Some(s) => s,
        None => read_stdin()?,
    };
    if secret.is_empty() {
        anyhow::bail!("nothing to share: pass the secret as an argument or on stdin");
    }

    // Encryption happens here. The server only ever sees ciphertext.
    let key = hush_crypto::generate_key();
    let (encrypted_content, iv) = hush_crypto::encrypt(&secret, &key).context("encrypt secret")?;

    let body = serde_json::json!({
        "encryptedContent": encrypted_content,
        "iv": iv,
        "title": args.title,
        "expirationTime": args.expires,
        "maxViews": args.views,
        "requirePassword": args.password.is_some(),
        "password": args.password,
        "linkType": if args.short { "shorter" } else { "standard" },
    });

    let id = create_share(server, &body).await?;
    let origin = args.origin.as_deref().unwrap_or(server);
    println!("{}", share_link(origin, &id, &hush_crypto::export_key(&key)));
    Ok(())
}

async fn cmd_open(server: &str, link: &str, password: Option<&str>) -> Result<()> {
    let (id, key_b64) = split_link(link)?;
    let key = hush_crypto::import_key(&key_b64).context("link carries an invalid key fragment")?;

    let (encrypted_content, iv) = access_share(server, &id, password).await?;
    let plaintext = hush_crypto::decrypt(&encrypted_content, &key, &iv)
        .context("decrypt share: wrong key fragment or corrupted payload")?;

    println!("{plaintext}");
    Ok(())
}

async fn cmd_peek(server: &str, link: &str) -> Result<()> {
    let id = peek_id(link);
    if id.is_empty() {
        anyhow::bail!("no share id in {link:?}");
    }

    let data = fetch_metadata(server, &id).await?;

    let title = data["title"].as_str().unwrap_or("");
    if !title.is_empty() {
        println!("title:    {title}");
    }
    println!(
        "views:    {}/{}",
        data["currentViews"].as_u64().unwrap_or(0),
        data["maxViews"].as_u64().unwrap_or(0)
    );
    println!(
        "password: {}",
        if data["requirePassword"].as_bool().unwrap_or(false) {
            "required"
        } else {
            "none"
        }
    );

    if let Some(expires) = data["expiresAt"].as_str() {
        if let Ok(at) = chrono::DateTime::parse_from_rfc3339(expires) {
            let secs_left = (at.with_timezone(&chrono::Utc) - chrono::Utc::now()).num_seconds();
            if secs_left > 0 {
                let span = std::time::Duration::from_secs(secs_left as u64);
                println!("expires:  in {}", humantime::format_duration(span));
            } else {
                println!("expires:  expired");
            }
        }
    }
    Ok(())
}

// ── HTTP plumbing ─────────────────────────────────────────────────────────────

async fn create_share(server: &str, body: &Value) -> Result<String> {
    let client = Client::new();
    let resp = client
        .post(format!("{}/api/shares", server.trim_end_matches('/')))
        .json(body)
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;
    if !status.is_success() {
        anyhow::bail!(
            "server returned {status}: {}",
            json["message"].as_str().unwrap_or("")
        );
    }

    json["id"]
        .as_str()
        .map(|s| s.to_owned())
        .context("response carries no share id")
}

async fn access_share(server: &str, id: &str, password: Option<&str>) -> Result<(String, String)> {
    let client = Client::new();
    let resp = client
        .post(format!(
            "{}/api/shares/{}/access",
            server.trim_end_matches('/'),
            id
        ))
        .json(&serde_json::json!({ "password": password }))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;
    if !status.is_success() {
        anyhow::bail!("{}", json["message"].as_str().unwrap_or("access denied"));
    }

    let content = json["data"]["encryptedContent"]
        .as_str()
        .context("response carries no ciphertext")?;
    let iv = json["data"]["iv"].as_str().context("response carries no iv")?;
    Ok((content.to_owned(), iv.to_owned()))
}

async fn fetch_metadata(server: &str, id: &str) -> Result<Value> {
    let client = Client::new();
    let resp = client
        .get(format!(
            "{}/api/shares/{}/metadata",
            server.trim_end_matches('/'),
            id
        ))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;
    if !status.is_success() {
        anyhow::bail!(
            "server returned {status}: {}",
            json["message"].as_str().unwrap_or("")
        );
    }
    Ok(json["data"].clone())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Build `origin/view/<id>#<key>`. The key rides in the URL fragment, which
/// user agents do not send over the wire.
fn share_link(origin: &str, id: &str, key: &str) -> String {
    format!("{}/view/{}#{}", origin.trim_end_matches('/'), id, key)
}

/// Split a share link into id and key fragment. The fragment is parsed
/// locally, before any request is made, and never leaves this process.
fn split_link(link: &str) -> Result<(String, String)> {
    let (locator, fragment) = link
        .split_once('#')
        .context("link carries no #key fragment")?;
    if fragment.is_empty() {
        anyhow::bail!("link carries an empty key fragment");
    }

    let id = match Url::parse(locator) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_owned())
            .context("link has no share id in its path")?,
        Err(_) => locator.to_owned(),
    };

    if id.is_empty() {
        anyhow::bail!("link has no share id");
    }
    Ok((id, fragment.to_owned()))
}

/// Extract the id for metadata lookups. Accepts a full link, with or
/// without a fragment, or a bare id.
fn peek_id(link: &str) -> String {
    let locator = link.split_once('#').map_or(link, |(l, _)| l);
    match Url::parse(locator) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(|s| s.to_owned())
            .unwrap_or_default(),
        Err(_) => locator.to_owned(),
    }
}

fn read_stdin() -> Result<String> {
    use std::io::Read;
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("read secret from stdin")?;
    if buf.ends_with('\n') {
        buf.pop();
        if buf.ends_with('\r') {
            buf.pop();
        }
    }
    Ok(buf)
}
