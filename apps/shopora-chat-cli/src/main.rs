use anyhow::{Context, Result};
use clap::Parser;
use shopora_chat::{
    ChatConfig, ChatConfigUpdates, ChatMessage, ChatWidget, ConnectionSession, HistoryStore,
    HttpIdentityProvider, Identity, KeyValueStore, Notifier, SocketIoTransport, SqliteKvStore,
    StaticIdentityProvider, SystemClock, Transport,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Socket.IO server URL
    #[arg(long)]
    server: Option<String>,

    /// Storefront API URL used to look up the signed-in user
    #[arg(long)]
    api: Option<String>,

    /// Chat as this address instead of asking the API
    #[arg(short, long)]
    email: Option<String>,

    /// Session cookie sent to the API, e.g. "token=..."
    #[arg(long)]
    cookie: Option<String>,

    /// History database path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Message retention in seconds
    #[arg(long)]
    retention_secs: Option<u64>,

    /// Support address messages are sent to
    #[arg(long)]
    support: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let args = Args::parse();

    let mut config = ChatConfig::default();
    config.apply(ChatConfigUpdates {
        server_url: args.server,
        api_url: args.api,
        support_address: args.support,
        retention_secs: args.retention_secs,
        db_path: args.db,
        connect_timeout_secs: None,
    });

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let kv = SqliteKvStore::new(config.db_path.clone()).await?;
    let history_store = HistoryStore::with_config(
        kv,
        config.history_config(),
        Arc::new(SystemClock),
    );
    match history_store.purge_expired_all().await {
        Ok(0) => {}
        Ok(removed) => info!("Purged {} expired message(s)", removed),
        Err(e) => warn!("Startup purge failed: {}", e),
    }

    let transport = SocketIoTransport::new(&config.server_url, config.connect_timeout())?;
    println!("Chat server: {}", transport.endpoint());

    let notifier: Arc<dyn Notifier> = Arc::new(|text: &str| println!("! {}", text));
    let mut widget = ChatWidget::new(
        config.clone(),
        ConnectionSession::new(Arc::new(transport)),
        history_store,
        notifier,
    );

    let http_provider = match args.email {
        Some(email) => {
            let provider = StaticIdentityProvider::new(Some(Identity::new(email)));
            widget.resolve_identity(&provider).await;
            None
        }
        None => {
            let provider = match args.cookie.as_deref() {
                Some(cookie) => HttpIdentityProvider::with_session_cookie(&config.api_url, cookie)?,
                None => HttpIdentityProvider::new(&config.api_url)?,
            };
            widget.resolve_identity(&provider).await;
            Some(provider)
        }
    };

    match widget.identity_state().identity.as_ref() {
        Some(identity) => println!("Signed in as {}", identity),
        None => println!("Not signed in. Use /login <email>."),
    }
    print_help();
    prompt();

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = String::new();

    loop {
        tokio::select! {
            inbound = widget.next_inbound() => {
                match inbound {
                    Some(message) => {
                        widget.receive(message).await;
                        if let Some(latest) = widget.messages().last() {
                            if widget.is_open() {
                                println!();
                                print_message(latest);
                            } else {
                                println!("\n({} unread)", widget.unread());
                            }
                        }
                    }
                    None => println!("\nChat connection closed"),
                }
                prompt();
            }

            read = stdin.read_line(&mut line) => {
                if read? == 0 {
                    break;
                }
                let input = line.trim().to_string();
                line.clear();

                if let Some(command) = input.strip_prefix('/') {
                    if !handle_command(command, &mut widget, http_provider.as_ref()).await {
                        break;
                    }
                } else if !input.is_empty() {
                    if !widget.is_open() {
                        widget.open().await;
                    }
                    if widget.send_text(input).await {
                        if let Some(latest) = widget.messages().last() {
                            print_message(latest);
                        }
                    }
                }
                prompt();
            }
        }
    }

    widget.session().transport().close().await;
    Ok(())
}

/// Returns false when the user asked to quit
async fn handle_command<T, S>(
    command: &str,
    widget: &mut ChatWidget<T, S>,
    http_provider: Option<&HttpIdentityProvider>,
) -> bool
where
    T: Transport,
    S: KeyValueStore,
{
    let mut parts = command.split_whitespace();
    match parts.next().unwrap_or_default() {
        "open" => {
            if widget.open().await {
                print_conversation(widget);
            }
        }
        "close" => {
            widget.close();
            println!("Chat closed");
        }
        "toggle" => {
            widget.toggle().await;
            println!("Chat {}", if widget.is_open() { "open" } else { "closed" });
        }
        "history" => print_conversation(widget),
        "status" => {
            println!("{}", widget.status().label());
            if widget.persistence_degraded() {
                println!("History is not being saved");
            }
        }
        "login" => match parts.next() {
            Some(email) => {
                widget.set_identity(Some(Identity::new(email))).await;
                println!("Signed in as {}", email);
            }
            None => println!("Usage: /login <email>"),
        },
        "logout" => {
            if let Some(provider) = http_provider {
                if let Err(e) = provider.sign_out().await {
                    warn!("Sign-out request failed: {}", e);
                }
            }
            widget.logout().await;
            println!("Signed out");
        }
        "help" => print_help(),
        "quit" | "exit" => return false,
        other => println!("Unknown command: /{}", other),
    }
    true
}

fn print_conversation<T: Transport, S: KeyValueStore>(widget: &ChatWidget<T, S>) {
    println!("--- {} ---", widget.status().label());
    if widget.messages().is_empty() {
        println!("No messages yet");
    }
    for message in widget.messages() {
        print_message(message);
    }
}

fn print_message(message: &ChatMessage) {
    let time = chrono::DateTime::from_timestamp_millis(message.timestamp)
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M").to_string())
        .unwrap_or_default();
    println!("[{}] {}: {}", time, message.from, message.body);
}

fn print_help() {
    println!("Commands: /open /close /toggle /history /status /login <email> /logout /help /quit");
    println!("Anything else is sent to support.");
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}
