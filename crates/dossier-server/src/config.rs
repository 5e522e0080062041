//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development; only `OWNER_ID` should be set
//! for anything beyond a smoke test.

use std::net::SocketAddr;
use std::path::PathBuf;

use dossier_shared::{ActorId, Lang};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database path.  Unset means the per-user data directory.
    /// Env: `DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Actor id of the instance owner (always the top role tier).
    /// Env: `OWNER_ID`
    /// Default: `0` (no actor matches; development only).
    pub owner_id: ActorId,

    /// Default reply language for actors without a stored preference.
    /// Env: `DEFAULT_LANG` (`ru` / `uk`)
    pub default_lang: Lang,

    /// Base URL of the delivery adapter outbound messages are posted to.
    /// Env: `DELIVERY_URL`
    /// Default: `http://127.0.0.1:8081`
    pub delivery_url: String,

    /// Whether actors without an explicit role get the full search
    /// surface instead of the guest one.
    /// Env: `PUBLIC_OPEN` (true/false)
    /// Default: `false`
    pub public_open: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            db_path: None,
            owner_id: ActorId(0),
            default_lang: Lang::Ru,
            delivery_url: "http://127.0.0.1:8081".to_string(),
            public_open: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Ok(id) = std::env::var("OWNER_ID") {
            if let Ok(parsed) = id.parse::<i64>() {
                config.owner_id = ActorId(parsed);
            } else {
                tracing::warn!(value = %id, "Invalid OWNER_ID, using default");
            }
        }

        if let Ok(code) = std::env::var("DEFAULT_LANG") {
            match Lang::from_code(&code) {
                Some(lang) => config.default_lang = lang,
                None => tracing::warn!(value = %code, "Unknown DEFAULT_LANG, using default"),
            }
        }

        if let Ok(url) = std::env::var("DELIVERY_URL") {
            config.delivery_url = url;
        }

        if let Ok(val) = std::env::var("PUBLIC_OPEN") {
            config.public_open = val == "true" || val == "1";
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.owner_id, ActorId(0));
        assert_eq!(config.default_lang, Lang::Ru);
        assert!(!config.public_open);
        assert!(config.db_path.is_none());
    }
}
