//! TOML file configuration structures.
//!
//! These structs directly map to the `subvend-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use subvend_sdk::config::ShopConfig;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    pub auth: AuthSection,
    pub shop: ShopConfig,
    pub indexer: IndexerSection,
    pub provider: ProviderSection,
    pub wallet: WalletSection,
    pub notifier: NotifierSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default address")
}

/// Shared secrets for the two API surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
    /// Bearer secret the chat frontend presents on every request.
    pub service_secret: String,
    /// The admin secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub admin_secret: String,
}

impl AuthSection {
    /// Check if the admin secret is already hashed (argon2 format).
    pub fn is_admin_secret_hashed(&self) -> bool {
        self.admin_secret.starts_with("$argon2")
    }
}

/// Chain indexer endpoint watched for inbound treasury transfers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerSection {
    pub base_url: String,
    /// Token contract whose transfer events are polled.
    pub token_contract: String,
}

/// External fulfillment provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    pub api_url: String,
    /// Authenticated session cookie for the provider.
    pub session_cookie: String,
}

/// Treasury wallet daemon; key material never enters this process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSection {
    pub base_url: String,
    /// Treasury address, included in underfunding alerts.
    pub address: String,
}

/// Chat bot API used for user notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierSection {
    pub base_url: String,
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use subvend_sdk::objects::{AccountId, Tier};

    const SAMPLE: &str = r#"
[server]
listen = "127.0.0.1:3000"

[auth]
service_secret = "frontend-secret"
admin_secret = "plaintext-admin"

[shop]
payment_address = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"
support_contact = "@support"
admins = [9000]

[shop.prices]
3_months = "12.50"
6_months = "19.00"
12_months = "30.00"

[indexer]
base_url = "https://indexer.example"
token_contract = "TContractAddressForStablecoinXXXXX"

[provider]
api_url = "https://provider.example/api"
session_cookie = "session=abc"

[wallet]
base_url = "http://127.0.0.1:8790"
address = "treasury-main"

[notifier]
base_url = "https://bots.example"
token = "bot-token"
"#;

    #[test]
    fn test_full_config_parsing() {
        let config: FileConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.shop.prices.price(Tier::Months3), Decimal::new(1250, 2));
        assert_eq!(config.shop.admins, vec![AccountId(9000)]);
        assert!(!config.auth.is_admin_secret_hashed());
        assert!(config.shop.validate().is_ok());
    }

    #[test]
    fn test_listen_defaults_when_omitted() {
        let without_server = SAMPLE.replace("[server]\nlisten = \"127.0.0.1:3000\"\n", "");
        let config: FileConfig = toml::from_str(&without_server).unwrap();
        assert_eq!(config.server.listen.port(), 8080);
    }

    #[test]
    fn test_hashed_secret_detection() {
        let auth = AuthSection {
            service_secret: "s".to_string(),
            admin_secret: "$argon2id$v=19$m=19456,t=2,p=1$abc123".to_string(),
        };
        assert!(auth.is_admin_secret_hashed());
    }
}
