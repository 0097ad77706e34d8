//! huddle server binary.
//!
//! # Usage
//!
//! ```bash
//! # Development: self-signed certificate, seeded users and conversations
//! huddle-server --bind 127.0.0.1:4455 \
//!     --token alice:secret-a --token bob:secret-b \
//!     --conversation c1:alice,bob
//!
//! # Production TLS
//! huddle-server --bind 0.0.0.0:4455 --cert cert.pem --key key.pem ...
//! ```

use clap::Parser;
use huddle_server::{
    LoggingPushSink, MemoryStore, RuntimeConfig, Server, ServerConfig, StaticTokenAuthenticator,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// huddle presence and chat fan-out server
#[derive(Parser, Debug)]
#[command(name = "huddle-server")]
#[command(about = "Real-time presence and conversation fan-out server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4455")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long)]
    cert: Option<String>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long)]
    key: Option<String>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Seed credential as USER:TOKEN (repeatable)
    #[arg(long = "token", value_name = "USER:TOKEN")]
    tokens: Vec<String>,

    /// Seed conversation as ID:USER,USER,... (repeatable)
    #[arg(long = "conversation", value_name = "ID:USER,USER")]
    conversations: Vec<String>,
}

fn parse_token_seed(seed: &str) -> Result<(String, String), String> {
    let (user, token) = seed
        .split_once(':')
        .ok_or_else(|| format!("invalid --token '{seed}', expected USER:TOKEN"))?;
    if user.is_empty() || token.is_empty() {
        return Err(format!("invalid --token '{seed}', expected USER:TOKEN"));
    }
    Ok((user.to_string(), token.to_string()))
}

fn parse_conversation_seed(seed: &str) -> Result<(String, Vec<String>), String> {
    let (id, users) = seed
        .split_once(':')
        .ok_or_else(|| format!("invalid --conversation '{seed}', expected ID:USER,USER"))?;
    let participants: Vec<String> =
        users.split(',').filter(|u| !u.is_empty()).map(ToString::to_string).collect();
    if id.is_empty() || participants.is_empty() {
        return Err(format!("invalid --conversation '{seed}', expected ID:USER,USER"));
    }
    Ok((id.to_string(), participants))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("huddle server starting");
    tracing::info!("binding to {}", args.bind);

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("No TLS certificate provided - using self-signed certificate");
        tracing::warn!("This is NOT suitable for production use!");
    }

    let mut auth = StaticTokenAuthenticator::new();
    for seed in &args.tokens {
        let (user, token) = parse_token_seed(seed)?;
        auth.insert(token, user);
    }

    let store = MemoryStore::new();
    for seed in &args.conversations {
        let (id, participants) = parse_conversation_seed(seed)?;
        store.create_conversation(&id, participants);
    }

    if args.tokens.is_empty() {
        tracing::warn!("no --token seeds given; every handshake will be rejected");
    }

    let config = RuntimeConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        limits: ServerConfig {
            max_connections: args.max_connections,
            ..ServerConfig::default()
        },
    };

    let server = Server::bind(config, store, auth, LoggingPushSink)?;

    tracing::info!("server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_seed_parses() {
        assert_eq!(
            parse_token_seed("alice:secret").unwrap(),
            ("alice".to_string(), "secret".to_string())
        );
        assert!(parse_token_seed("no-colon").is_err());
        assert!(parse_token_seed(":empty-user").is_err());
    }

    #[test]
    fn conversation_seed_parses() {
        let (id, users) = parse_conversation_seed("c1:alice,bob").unwrap();
        assert_eq!(id, "c1");
        assert_eq!(users, vec!["alice".to_string(), "bob".to_string()]);

        assert!(parse_conversation_seed("c1:").is_err());
        assert!(parse_conversation_seed("bare").is_err());
    }
}
