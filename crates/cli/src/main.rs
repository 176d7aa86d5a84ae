//! SQRL command line tool
//!
//! Builds, answers and inspects SQRL client and server messages.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sqrl_cli::commands::{self, AnswerOptions, ResponseOptions};
use sqrl_cli::config::{parse_flag_names, Config};
use sqrl_protocol::{Ed25519Provider, SqrlProtocol};

/// SQRL tool - build and check SQRL protocol messages.
#[derive(Parser, Debug)]
#[command(name = "sqrl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Identity used to sign client messages.
#[derive(Args, Debug, Clone)]
pub struct IdentityArgs {
    /// Master key, base64
    #[arg(long, env = "SQRL_MASTER_KEY", hide_env_values = true)]
    pub master_key: String,

    /// Site identifier (defaults to client.site from the config)
    #[arg(long)]
    pub site: Option<String>,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Generate a fresh identity
    Keygen,

    /// Sign an authentication URI (first contact)
    Login {
        #[command(flatten)]
        identity: IdentityArgs,

        /// Authentication URI (defaults to client.signature_uri from the config)
        #[arg(long)]
        uri: Option<String>,
    },

    /// Answer a server body
    Respond {
        #[command(flatten)]
        identity: IdentityArgs,

        /// Server body as received
        #[arg(long, value_name = "BODY")]
        server_body: String,

        /// Command to send, repeatable (defaults to login)
        #[arg(long = "command", value_name = "CMD")]
        commands: Vec<String>,

        /// Also sign with the identity of a previous master key, base64
        #[arg(long, env = "SQRL_PREVIOUS_MASTER_KEY", hide_env_values = true)]
        previous_master_key: Option<String>,

        /// Identity unlock key for an unlock request, base64
        #[arg(long, env = "SQRL_IDENTITY_UNLOCK_KEY", hide_env_values = true)]
        identity_unlock_key: Option<String>,

        /// Identity lock key used with --create-keys, base64
        #[arg(long)]
        identity_lock_key: Option<String>,

        /// Publish fresh server unlock keys
        #[arg(long)]
        create_keys: bool,
    },

    /// Verify and print a client body
    InspectClient {
        /// Client body as received
        #[arg(long)]
        body: String,

        /// Skip signature checks
        #[arg(long)]
        unchecked: bool,

        /// Stored server unlock key, base64
        #[arg(long, requires = "stored_vuk")]
        stored_suk: Option<String>,

        /// Stored verify unlock key, base64
        #[arg(long, requires = "stored_suk")]
        stored_vuk: Option<String>,
    },

    /// Verify a client body and print the server's answer
    Answer {
        /// Client body as received
        #[arg(long)]
        body: String,

        /// Transaction flag by name, repeatable (e.g. ip-match)
        #[arg(long = "flag", value_name = "FLAG")]
        flags: Vec<String>,

        /// Friendly name (defaults to server.friendly_name from the config)
        #[arg(long)]
        friendly_name: Option<String>,

        /// Echo the unlock keys the client published
        #[arg(long)]
        store_client_keys: bool,
    },

    /// Print the fields of a server body
    InspectServer {
        /// Server body as received
        #[arg(long)]
        body: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Validate configuration
    config.validate()?;

    // Initialize tracing
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.general.log_level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(config_path) = &cli.config {
        tracing::debug!("Using config file: {:?}", config_path);
    }

    let protocol = SqrlProtocol::builder()
        .ecc_provider(Ed25519Provider::new())
        .build()?;

    let output = run(&protocol, &config, cli.command)?;
    print!("{output}");
    Ok(())
}

fn site_or_default(site: Option<String>, config: &Config) -> anyhow::Result<String> {
    site.or_else(|| config.client.site.clone())
        .context("No site given: pass --site or set client.site in the config")
}

fn run(protocol: &SqrlProtocol, config: &Config, command: Commands) -> anyhow::Result<String> {
    match command {
        Commands::Keygen => Ok(commands::keygen(protocol).render()),

        Commands::Login { identity, uri } => {
            let master_key = commands::decode_key("master key", &identity.master_key)?;
            let site = site_or_default(identity.site, config)?;
            let uri = uri
                .or_else(|| config.client.signature_uri.clone())
                .context("No URI given: pass --uri or set client.signature_uri in the config")?;

            let body = commands::login(protocol, &master_key, &site, &uri)?;
            Ok(format!("{body}\n"))
        }

        Commands::Respond {
            identity,
            server_body,
            commands: names,
            previous_master_key,
            identity_unlock_key,
            identity_lock_key,
            create_keys,
        } => {
            let master_key = commands::decode_key("master key", &identity.master_key)?;
            let site = site_or_default(identity.site, config)?;
            let previous = previous_master_key
                .map(|key| commands::decode_key("previous master key", &key))
                .transpose()?;
            let iuk = identity_unlock_key
                .map(|key| commands::decode_key("identity unlock key", &key))
                .transpose()?;
            let ilk = identity_lock_key
                .map(|key| commands::decode_key("identity lock key", &key))
                .transpose()?;

            let options = ResponseOptions {
                commands: names,
                previous_master_key: previous.as_deref(),
                identity_unlock_key: iuk.as_deref(),
                identity_lock_key: ilk.as_deref(),
                create_keys,
            };
            let body = commands::respond(protocol, &master_key, &site, &server_body, &options)?;
            Ok(format!("{body}\n"))
        }

        Commands::InspectClient {
            body,
            unchecked,
            stored_suk,
            stored_vuk,
        } => {
            let stored = match (stored_suk, stored_vuk) {
                (Some(suk), Some(vuk)) => Some((
                    commands::decode_key("stored suk", &suk)?,
                    commands::decode_key("stored vuk", &vuk)?,
                )),
                _ => None,
            };
            let stored_keys = stored
                .as_ref()
                .map(|(suk, vuk)| (&suk[..], &vuk[..]));

            let body = commands::inspect_client(protocol, &body, unchecked, stored_keys)?;
            Ok(commands::describe_client(&body))
        }

        Commands::Answer {
            body,
            flags,
            friendly_name,
            store_client_keys,
        } => {
            let options = AnswerOptions {
                flags: config.default_flags() | parse_flag_names(flags.as_slice())?,
                friendly_name: friendly_name.or_else(|| config.server.friendly_name.clone()),
                store_client_keys,
            };
            let answer = commands::answer(protocol, &body, &options)?;
            Ok(format!("{answer}\n"))
        }

        Commands::InspectServer { body } => {
            let body = commands::inspect_server(protocol, &body)?;
            Ok(commands::describe_server(&body))
        }
    }
}
