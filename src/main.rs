use anyhow::{Context as _, Result};
use clap::{CommandFactory as _, Parser, Subcommand};
use clap_complete::Shell;
use copilink_auth::{CredentialManager, GithubAuthClient};
use copilink_config::{Config, LogConfig, LogFormat};
use copilink_provider::CopilotClient;
use copilink_proxy::AppState;
use copilink_store::FileCredentialStore;
use copilink_types::{ApiKeyProvider, ProviderExecutor as _, unix_now};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "copilink",
    version,
    about = "copilink: GitHub Copilot behind an OpenAI-compatible API"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the proxy server.
    Serve {
        /// Override the listening port (default: 8019).
        #[arg(short, long)]
        port: Option<u16>,
        /// Override the listening address (default: 127.0.0.1).
        #[arg(long)]
        host: Option<String>,
    },
    /// Run the GitHub device authorization flow and store the access token.
    Login,
    /// Remove the stored access token and API key.
    Logout,
    /// Show which credentials are present.
    Status,
    /// List the chat models the Copilot account can use.
    Models,
    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "copilink", &mut std::io::stdout());
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.log);

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(config, port, host).await,
        Commands::Login => cmd_login(&config).await,
        Commands::Logout => cmd_logout(&config).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Models => cmd_models(&config).await,
        Commands::Completions { .. } => Ok(()),
    }
}

/// Logs go to stderr; `RUST_LOG` wins over the configured level.
fn init_tracing(log: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn credential_manager(config: &Config, http: &rquest::Client) -> Arc<CredentialManager> {
    let store = FileCredentialStore::open(
        config.credentials_dir(),
        &config.credentials.access_token_file,
        &config.credentials.api_key_file,
    )
    .await;
    let client = GithubAuthClient::new(http.clone(), &config.upstream);
    Arc::new(CredentialManager::new(
        Arc::new(store),
        Arc::new(client),
        &config.auth,
    ))
}

/// Builds the upstream client after making sure credentials exist, so any
/// device flow runs here in the terminal rather than inside a request.
async fn copilot_client(config: &Config) -> Result<CopilotClient> {
    let http = rquest::Client::new();
    let manager = credential_manager(config, &http).await;
    manager
        .get_api_key()
        .await
        .context("provisioning Copilot credentials")?;
    let keys: Arc<dyn ApiKeyProvider> = manager;
    Ok(CopilotClient::new(http, keys, config.upstream.clone()))
}

async fn cmd_serve(mut config: Config, port: Option<u16>, host: Option<String>) -> Result<()> {
    if let Some(p) = port {
        config.port = p;
    }
    if let Some(h) = host {
        config.host = h;
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(Arc::new(copilot_client(&config).await?));
    let app = copilink_proxy::make_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(addr = %addr, "copilink listening");
    eprintln!("copilink listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for shutdown signal");
            }
        })
        .await?;
    Ok(())
}

async fn cmd_login(config: &Config) -> Result<()> {
    let http = rquest::Client::new();
    let manager = credential_manager(config, &http).await;
    manager.login().await.context("login failed")?;
    let key = manager
        .get_api_key()
        .await
        .context("logged in, but no Copilot API key could be minted")?;
    eprintln!(
        "logged in; API key valid for {}s",
        (key.expires_at - unix_now()).max(0)
    );
    Ok(())
}

async fn cmd_logout(config: &Config) -> Result<()> {
    let http = rquest::Client::new();
    credential_manager(config, &http)
        .await
        .logout()
        .await
        .context("logout failed")?;
    eprintln!("logged out");
    Ok(())
}

async fn cmd_status(config: &Config) -> Result<()> {
    let http = rquest::Client::new();
    let status = credential_manager(config, &http).await.status().await;
    println!("credentials: {}", config.credentials_dir().display());
    println!(
        "access token: {}",
        if status.has_access_token { "present" } else { "missing" }
    );
    match (status.api_key_expires_at, status.api_key_valid) {
        (Some(at), true) => println!("api key: valid for {}s", at - unix_now()),
        (Some(_), false) => println!("api key: expired"),
        (None, _) => println!("api key: missing"),
    }
    Ok(())
}

async fn cmd_models(config: &Config) -> Result<()> {
    let models = copilot_client(config)
        .await?
        .list_models()
        .await
        .context("fetching the model catalogue")?;
    for m in &models {
        let context = m
            .max_context_tokens
            .map_or_else(|| "-".to_string(), |t| t.to_string());
        let tools = if m.supports_tool_calls { "tools" } else { "" };
        let vision = if m.supports_vision { "vision" } else { "" };
        println!(
            "{:<32} {:<16} {:>8}  {tools} {vision}",
            m.id,
            m.vendor.as_deref().unwrap_or("-"),
            context
        );
    }
    Ok(())
}
