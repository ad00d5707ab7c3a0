//! Configuration loading for subvend-server.
//!
//! Handles the TOML file, CLI overrides, admin secret hashing, and the
//! file rewrite that admin shop updates go through.

pub mod file;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Mutex;

use thiserror::Error;

use subvend_sdk::config::ShopConfig;

use crate::config::file::{
    FileConfig, IndexerSection, NotifierSection, ProviderSection, WalletSection,
};

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Everything the server needs after a successful load.
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub shop: ShopConfig,
    pub service_secret: String,
    pub admin_hash: String,
    pub indexer: IndexerSection,
    pub provider: ProviderSection,
    pub wallet: WalletSection,
    pub notifier: NotifierSection,
}

/// Configuration loader that owns the config file path.
///
/// Admin shop updates are funneled through [`ConfigLoader::update_shop`] so
/// concurrent file rewrites cannot interleave.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
    write_lock: Mutex<()>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
            write_lock: Mutex::new(()),
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the admin secret if it's plaintext (and rewrite the file)
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        self.validate(&file_config)?;

        let admin_hash = if file_config.auth.is_admin_secret_hashed() {
            file_config.auth.admin_secret.clone()
        } else {
            let hash = hash_secret(&file_config.auth.admin_secret)?;
            file_config.auth.admin_secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Admin secret hashed and config file updated");
            hash
        };

        Ok(LoadedConfig {
            listen: file_config.server.listen,
            shop: file_config.shop,
            service_secret: file_config.auth.service_secret,
            admin_hash,
            indexer: file_config.indexer,
            provider: file_config.provider,
            wallet: file_config.wallet,
            notifier: file_config.notifier,
        })
    }

    /// Persist an updated shop section, then return it so the caller can
    /// swap it into the runtime [`ConfigStore`].
    ///
    /// [`ConfigStore`]: subvend_core::config::ConfigStore
    pub fn update_shop(&self, shop: &ShopConfig) -> Result<(), ConfigError> {
        shop.validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ConfigError::ValidationError("config writer poisoned".to_string()))?;

        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;
        file_config.shop = shop.clone();
        self.rewrite_config(&file_config)?;
        Ok(())
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        config
            .shop
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        if config.auth.service_secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.service_secret must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename.
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn hash_secret(plaintext: &str) -> Result<String, ConfigError> {
    use argon2::{
        Argon2, PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ConfigError::HashError(e.to_string()))
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
