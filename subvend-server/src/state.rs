//! Application state shared across all request handlers.

use std::sync::Arc;

use subvend_core::config::ConfigStore;
use subvend_core::matcher::DepositMatcher;
use subvend_core::queue::FulfillmentQueue;
use subvend_core::store::Store;
use subvend_sdk::config::ShopConfig;

use crate::config::ConfigLoader;

/// Authentication material resolved at startup.
pub struct AuthState {
    /// Shared bearer secret for the chat frontend.
    pub service_secret: String,
    /// Argon2 hash of the admin secret.
    pub admin_hash: String,
}

/// Shared across all request handlers; cheap to clone (everything is
/// behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Versioned shop configuration; admin updates swap whole values.
    pub shop: ConfigStore<ShopConfig>,
    pub matcher: Arc<DepositMatcher>,
    pub queue: Arc<FulfillmentQueue>,
    pub auth: Arc<AuthState>,
    pub config_loader: Arc<ConfigLoader>,
}
