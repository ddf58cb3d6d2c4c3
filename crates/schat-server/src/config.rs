use anyhow::Result;
use rand::Rng;
use schat_core::{AppConfig, GatewayConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn harden_secret_file_permissions(path: &str) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_engine")]
    pub engine: DatabaseEngine,
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    #[default]
    Sqlite,
    Postgres,
}

impl From<DatabaseEngine> for schat_db::DatabaseEngine {
    fn from(engine: DatabaseEngine) -> Self {
        match engine {
            DatabaseEngine::Sqlite => schat_db::DatabaseEngine::Sqlite,
            DatabaseEngine::Postgres => schat_db::DatabaseEngine::Postgres,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: default_database_engine(),
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_seconds: u64,
    #[serde(default = "default_true")]
    pub registration_enabled: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: generate_random_hex(64),
            jwt_expiry_seconds: default_jwt_expiry(),
            registration_enabled: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GatewaySection {
    #[serde(default = "default_auth_grace_seconds")]
    pub auth_grace_seconds: u64,
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    #[serde(default = "default_max_events_per_minute")]
    pub max_events_per_minute: u32,
    #[serde(default = "default_max_typing_per_minute")]
    pub max_typing_per_minute: u32,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            auth_grace_seconds: default_auth_grace_seconds(),
            outbound_buffer: default_outbound_buffer(),
            max_events_per_minute: default_max_events_per_minute(),
            max_typing_per_minute: default_max_typing_per_minute(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Generate a cryptographically random hex string of the given length.
fn generate_random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..16u8);
            char::from(if idx < 10 {
                b'0' + idx
            } else {
                b'a' + idx - 10
            })
        })
        .collect()
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".into()
}
fn default_database_engine() -> DatabaseEngine {
    DatabaseEngine::Sqlite
}
fn default_database_url() -> String {
    "sqlite://./data/schat.db?mode=rwc".into()
}
fn default_max_connections() -> u32 {
    20
}
fn default_jwt_expiry() -> u64 {
    7 * 24 * 3600
}
fn default_true() -> bool {
    true
}
fn default_auth_grace_seconds() -> u64 {
    GatewayConfig::default().auth_grace_seconds
}
fn default_outbound_buffer() -> usize {
    GatewayConfig::default().outbound_buffer
}
fn default_max_events_per_minute() -> u32 {
    GatewayConfig::default().max_events_per_minute
}
fn default_max_typing_per_minute() -> u32 {
    GatewayConfig::default().max_typing_per_minute
}

fn looks_like_placeholder_secret(raw: &str) -> bool {
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return true;
    }
    normalized.contains("change_me")
        || normalized.contains("replace_me")
        || normalized.contains("replace_with")
        || normalized.starts_with("example")
        || normalized == "devkey"
        || normalized == "devsecret"
        || normalized == "secret"
}

fn validate_secret_configuration(config: &Config) -> Result<()> {
    let jwt_secret = config.auth.jwt_secret.trim();
    if jwt_secret.len() < 32 || looks_like_placeholder_secret(jwt_secret) {
        anyhow::bail!(
            "Invalid auth.jwt_secret: use a strong random secret (at least 32 characters) and never leave placeholder values"
        );
    }
    Ok(())
}

/// Generate a commented config file template with the given values filled in.
fn generate_config_template(config: &Config) -> String {
    format!(
        r#"# Schat Server Configuration
# Generated automatically on first run. Edit as needed.
# Every key can be overridden with an SCHAT_* environment variable.

[server]
bind_address = "{bind_address}"

[database]
# "sqlite" or "postgres"
engine = "{db_engine}"
url = "{db_url}"
max_connections = {max_connections}

[auth]
jwt_secret = "{jwt_secret}"
jwt_expiry_seconds = {jwt_expiry}
registration_enabled = {registration_enabled}

[gateway]
# Seconds a websocket may stay open before authenticating.
auth_grace_seconds = {auth_grace}
outbound_buffer = {outbound_buffer}
max_events_per_minute = {max_events}
max_typing_per_minute = {max_typing}

[logging]
json = {json}
"#,
        bind_address = config.server.bind_address,
        db_engine = match config.database.engine {
            DatabaseEngine::Sqlite => "sqlite",
            DatabaseEngine::Postgres => "postgres",
        },
        db_url = config.database.url,
        max_connections = config.database.max_connections,
        jwt_secret = config.auth.jwt_secret,
        jwt_expiry = config.auth.jwt_expiry_seconds,
        registration_enabled = config.auth.registration_enabled,
        auth_grace = config.gateway.auth_grace_seconds,
        outbound_buffer = config.gateway.outbound_buffer,
        max_events = config.gateway.max_events_per_minute,
        max_typing = config.gateway.max_typing_per_minute,
        json = config.logging.json,
    )
}

/// Something worth reporting from loading the config. Collected while
/// loading and logged once the subscriber is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadNotice {
    GeneratedDefault { path: String },
    InvalidOverride { key: &'static str, value: String },
}

impl LoadNotice {
    pub fn log(&self) {
        match self {
            LoadNotice::GeneratedDefault { path } => {
                tracing::info!("Config file not found, generated defaults at '{}'", path);
            }
            LoadNotice::InvalidOverride { key, value } => {
                tracing::warn!("Ignoring invalid {} value '{}'", key, value);
            }
        }
    }
}

fn parse_into<T: std::str::FromStr>(
    key: &'static str,
    value: String,
    slot: &mut T,
    notices: &mut Vec<LoadNotice>,
) {
    match value.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => notices.push(LoadNotice::InvalidOverride { key, value }),
    }
}

// ── Config Loading ───────────────────────────────────────────────────────────

impl Config {
    pub fn load(path: &str) -> Result<(Self, Vec<LoadNotice>)> {
        let mut notices = Vec::new();
        let mut config = if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            let config = Config::default();

            if let Some(parent) = Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(path, generate_config_template(&config))?;
            notices.push(LoadNotice::GeneratedDefault {
                path: path.to_string(),
            });
            config
        };
        let _ = harden_secret_file_permissions(path);

        notices.extend(config.apply_env_overrides(|key| std::env::var(key).ok()));
        validate_secret_configuration(&config)?;
        Ok((config, notices))
    }

    /// Apply `SCHAT_*` overrides. Unparseable values are skipped and
    /// returned.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Vec<LoadNotice> {
        let mut notices = Vec::new();
        if let Some(value) = lookup("SCHAT_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = lookup("SCHAT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = lookup("SCHAT_DATABASE_ENGINE") {
            match value.trim().to_ascii_lowercase().as_str() {
                "sqlite" => self.database.engine = DatabaseEngine::Sqlite,
                "postgres" | "postgresql" => self.database.engine = DatabaseEngine::Postgres,
                _ => notices.push(LoadNotice::InvalidOverride {
                    key: "SCHAT_DATABASE_ENGINE",
                    value,
                }),
            }
        }
        if let Some(value) = lookup("SCHAT_DATABASE_MAX_CONNECTIONS") {
            parse_into(
                "SCHAT_DATABASE_MAX_CONNECTIONS",
                value,
                &mut self.database.max_connections,
                &mut notices,
            );
        }
        if let Some(value) = lookup("SCHAT_JWT_SECRET") {
            self.auth.jwt_secret = value;
        }
        if let Some(value) = lookup("SCHAT_JWT_EXPIRY_SECONDS") {
            parse_into(
                "SCHAT_JWT_EXPIRY_SECONDS",
                value,
                &mut self.auth.jwt_expiry_seconds,
                &mut notices,
            );
        }
        if let Some(value) = lookup("SCHAT_REGISTRATION_ENABLED") {
            parse_into(
                "SCHAT_REGISTRATION_ENABLED",
                value,
                &mut self.auth.registration_enabled,
                &mut notices,
            );
        }
        if let Some(value) = lookup("SCHAT_AUTH_GRACE_SECONDS") {
            parse_into(
                "SCHAT_AUTH_GRACE_SECONDS",
                value,
                &mut self.gateway.auth_grace_seconds,
                &mut notices,
            );
        }
        if let Some(value) = lookup("SCHAT_OUTBOUND_BUFFER") {
            parse_into(
                "SCHAT_OUTBOUND_BUFFER",
                value,
                &mut self.gateway.outbound_buffer,
                &mut notices,
            );
        }
        if let Some(value) = lookup("SCHAT_MAX_EVENTS_PER_MINUTE") {
            parse_into(
                "SCHAT_MAX_EVENTS_PER_MINUTE",
                value,
                &mut self.gateway.max_events_per_minute,
                &mut notices,
            );
        }
        if let Some(value) = lookup("SCHAT_MAX_TYPING_PER_MINUTE") {
            parse_into(
                "SCHAT_MAX_TYPING_PER_MINUTE",
                value,
                &mut self.gateway.max_typing_per_minute,
                &mut notices,
            );
        }
        if let Some(value) = lookup("SCHAT_LOG_JSON") {
            parse_into("SCHAT_LOG_JSON", value, &mut self.logging.json, &mut notices);
        }
        notices
    }

    pub fn app_config(&self) -> AppConfig {
        AppConfig {
            jwt_secret: self.auth.jwt_secret.clone(),
            jwt_expiry_seconds: self.auth.jwt_expiry_seconds,
            registration_enabled: self.auth.registration_enabled,
            gateway: GatewayConfig {
                auth_grace_seconds: self.gateway.auth_grace_seconds,
                outbound_buffer: self.gateway.outbound_buffer.max(1),
                max_events_per_minute: self.gateway.max_events_per_minute,
                max_typing_per_minute: self.gateway.max_typing_per_minute,
            },
        }
    }
}
