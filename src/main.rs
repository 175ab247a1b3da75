use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use canned_reply::auth::{Authenticator, ClientSecret, TokenStore};
use canned_reply::config::ResponderConfig;
use canned_reply::consent;
use canned_reply::mailbox::{GmailClient, Mailbox};
use canned_reply::poller::{Responder, spawn_responder};

#[derive(Parser, Debug)]
#[command(name = "canned-reply", version, about = "Gmail auto-responder for an allow-list of senders")]
struct Cli {
    /// Run the OAuth consent flow in a browser, write the token file, and exit.
    #[arg(long)]
    authorize: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = ResponderConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    // Keep the guard alive for the whole run so buffered file logs flush.
    let _guard = init_tracing(&config);

    let result = if cli.authorize {
        authorize(&config).await
    } else {
        run(config).await
    };
    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(config: &ResponderConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "canned-reply.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
            None
        }
    }
}

async fn run(config: ResponderConfig) -> anyhow::Result<()> {
    eprintln!("📬 Canned reply v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {} (user {})", config.reply_from, config.user_id);
    eprintln!(
        "   Senders: {}",
        config
            .allowed_senders
            .iter()
            .collect::<Vec<_>>()
            .join(", ")
    );
    eprintln!("   Label: {}", config.replied_label);
    eprintln!("   Poll interval: {}s", config.poll_interval.as_secs());
    if let Some(dir) = &config.log_dir {
        eprintln!("   Logs: {}", dir.display());
    }
    eprintln!();

    let http = GmailClient::http_client();
    let secret = ClientSecret::load(&config.client_secret_file).with_context(|| {
        format!(
            "loading client secret from {}",
            config.client_secret_file.display()
        )
    })?;
    let auth = Arc::new(Authenticator::new(
        http.clone(),
        TokenStore::new(&config.token_file),
        secret,
    ));

    // Fail fast on missing or revoked credentials instead of on the first tick.
    match auth.access_token().await {
        Ok(_) => {}
        Err(e) if e.is_transient() => warn!("Token endpoint unavailable, retrying on first poll: {e}"),
        Err(e) => return Err(e).context("authorizing mailbox access"),
    }

    let mailbox: Arc<dyn Mailbox> = Arc::new(GmailClient::new(
        http,
        auth,
        &config.api_base,
        &config.user_id,
    ));

    let responder = Responder::new(mailbox, &config);
    info!(cutoff = %responder.cutoff(), query = %config.allowed_senders.inbox_query(), "Starting responder");

    let (mut handle, shutdown) = spawn_responder(responder, config.poll_interval);

    tokio::select! {
        joined = &mut handle => {
            joined.context("responder task panicked")??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, stopping");
            shutdown.store(true, Ordering::Relaxed);
            handle.abort();
            let _ = handle.await;
        }
    }

    Ok(())
}

async fn authorize(config: &ResponderConfig) -> anyhow::Result<()> {
    let secret = ClientSecret::load(&config.client_secret_file).with_context(|| {
        format!(
            "loading client secret from {}",
            config.client_secret_file.display()
        )
    })?;
    let store = TokenStore::new(&config.token_file);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("binding the OAuth redirect listener")?;

    consent::authorize(&GmailClient::http_client(), &secret, &store, listener, |url| {
        eprintln!("Open this URL in a browser to grant mailbox access:\n\n   {url}\n");
    })
    .await
    .context("OAuth consent")?;

    eprintln!("   Token saved to {}", store.path().display());
    Ok(())
}
