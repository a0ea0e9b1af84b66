//! CLI command definitions and execution

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use veil_core::config::ClientConfig;
use veil_core::http_relay::DirectRelaySender;
use veil_core::keys;
use veil_core::push::{PushNotificationManager, RegistrationStatus};
use veil_core::session::SessionProtocol;
use veil_core::store::{InMemoryStore, PushPreferences};
use veil_core::types::{ClosedGroupKeyRecord, EncryptedEnvelope};
use veil_crypto::identity::{IdentityKeyMaterial, Seed};

/// Veil CLI - identities, sealed messages and push registration
#[derive(Parser, Debug)]
#[command(name = "veil")]
#[command(version, about = "Veil CLI - identities, sealed messages and push registration")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level or tracing filter directive
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate an identity, or derive one from a seed
    Keygen(KeygenArgs),
    /// Sign and seal a message to a session id
    Encrypt(EncryptArgs),
    /// Open and verify a sealed message
    Decrypt(DecryptArgs),
    /// Register a push token with the notification relay
    Register(RegisterArgs),
    /// Unregister a push token from the notification relay
    Unregister(UnregisterArgs),
}

#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Existing 16-byte seed (hex)
    #[arg(long)]
    pub seed: Option<String>,
}

#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// Sender seed (hex)
    #[arg(long, env = "VEIL_SEED")]
    pub seed: String,
    /// Recipient session id
    #[arg(long)]
    pub to: String,
    /// Message text
    #[arg(long)]
    pub message: String,
}

#[derive(Args, Debug)]
pub struct DecryptArgs {
    /// Recipient seed (hex)
    #[arg(long, env = "VEIL_SEED")]
    pub seed: String,
    /// Ciphertext (base64)
    #[arg(long)]
    pub ciphertext: String,
    /// Open with a closed group's keypair instead of the identity
    #[arg(long, requires = "group_private_key")]
    pub group_public_key: Option<String>,
    /// Closed group secret key (hex)
    #[arg(long, requires = "group_public_key")]
    pub group_private_key: Option<String>,
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Identity seed (hex)
    #[arg(long, env = "VEIL_SEED")]
    pub seed: String,
    /// Device push token
    #[arg(long)]
    pub token: String,
    /// Register even if the token was uploaded recently
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct UnregisterArgs {
    /// Identity seed (hex)
    #[arg(long, env = "VEIL_SEED")]
    pub seed: String,
    /// Device push token
    #[arg(long)]
    pub token: String,
}

// ============================================================================
// Output
// ============================================================================

#[derive(Debug, Serialize, PartialEq)]
pub struct IdentityOutput {
    pub seed: String,
    pub session_id: String,
    pub ed25519_public_key: String,
}

impl From<&IdentityKeyMaterial> for IdentityOutput {
    fn from(identity: &IdentityKeyMaterial) -> Self {
        Self {
            seed: identity.seed().to_hex(),
            session_id: identity.session_id(),
            ed25519_public_key: hex::encode(identity.ed25519_public_key()),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct EncryptOutput {
    pub ciphertext: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DecryptOutput {
    pub plaintext: String,
    pub sender_session_id: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RegistrationOutput {
    pub status: RegistrationStatus,
}

// ============================================================================
// Execution
// ============================================================================

impl Cli {
    /// Execute the command, returning its JSON output.
    pub async fn execute(self, config: ClientConfig) -> anyhow::Result<serde_json::Value> {
        match self.command {
            Commands::Keygen(args) => Ok(serde_json::to_value(keygen(&args)?)?),
            Commands::Encrypt(args) => Ok(serde_json::to_value(encrypt(&args)?)?),
            Commands::Decrypt(args) => Ok(serde_json::to_value(decrypt(&args)?)?),
            Commands::Register(args) => {
                let status = register(&args, &config).await?;
                Ok(serde_json::to_value(RegistrationOutput { status })?)
            }
            Commands::Unregister(args) => {
                let status = unregister(&args, &config).await?;
                Ok(serde_json::to_value(RegistrationOutput { status })?)
            }
        }
    }
}

/// Restore `seed_hex` into a fresh in-memory store.
fn load_identity(seed_hex: &str) -> anyhow::Result<(InMemoryStore, IdentityKeyMaterial)> {
    let seed = Seed::from_hex(seed_hex.trim()).context("invalid seed")?;
    let store = InMemoryStore::new();
    let identity = keys::restore_identity(&store, &seed)?;
    store.set_local_session_id(&identity.session_id());
    Ok((store, identity))
}

fn protocol(store: &InMemoryStore) -> SessionProtocol {
    SessionProtocol::new(Arc::new(store.clone()), Arc::new(store.clone()))
}

pub fn keygen(args: &KeygenArgs) -> anyhow::Result<IdentityOutput> {
    let identity = match &args.seed {
        Some(seed_hex) => {
            let seed = Seed::from_hex(seed_hex.trim()).context("invalid seed")?;
            IdentityKeyMaterial::from_seed(&seed)?
        }
        None => IdentityKeyMaterial::generate()?,
    };
    Ok(IdentityOutput::from(&identity))
}

pub fn encrypt(args: &EncryptArgs) -> anyhow::Result<EncryptOutput> {
    let (store, _) = load_identity(&args.seed)?;
    let ciphertext = protocol(&store).encrypt(args.message.as_bytes(), &args.to)?;
    Ok(EncryptOutput {
        ciphertext: STANDARD.encode(ciphertext),
    })
}

pub fn decrypt(args: &DecryptArgs) -> anyhow::Result<DecryptOutput> {
    let (store, _) = load_identity(&args.seed)?;
    let ciphertext = STANDARD
        .decode(args.ciphertext.trim())
        .context("ciphertext is not valid base64")?;

    let envelope = match (&args.group_public_key, &args.group_private_key) {
        (Some(public_key), Some(private_key)) => {
            store.add_closed_group(ClosedGroupKeyRecord::new(
                public_key.clone(),
                Some(private_key.clone()),
            ));
            EncryptedEnvelope::closed_group(public_key.clone(), ciphertext)
        }
        (None, None) => EncryptedEnvelope::direct(ciphertext),
        _ => bail!("--group-public-key and --group-private-key must be given together"),
    };

    let message = protocol(&store).decrypt(&envelope)?;
    Ok(DecryptOutput {
        plaintext: String::from_utf8_lossy(&message.plaintext).into_owned(),
        sender_session_id: message.sender_session_id,
    })
}

fn push_manager(store: &InMemoryStore, config: &ClientConfig) -> anyhow::Result<PushNotificationManager> {
    let sender = DirectRelaySender::new()?;
    Ok(PushNotificationManager::new(
        Arc::new(sender),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        config.push.clone(),
    ))
}

pub async fn register(args: &RegisterArgs, config: &ClientConfig) -> anyhow::Result<RegistrationStatus> {
    let (store, identity) = load_identity(&args.seed)?;
    info!(server = %config.push.server_url, "Registering push token");
    let manager = push_manager(&store, config)?;
    Ok(manager
        .register(&args.token, &identity.session_id(), args.force)
        .await)
}

pub async fn unregister(args: &UnregisterArgs, config: &ClientConfig) -> anyhow::Result<RegistrationStatus> {
    let (store, _) = load_identity(&args.seed)?;
    info!(server = %config.push.server_url, "Unregistering push token");
    let manager = push_manager(&store, config)?;
    Ok(manager.unregister(&args.token).await)
}
