use std::path::PathBuf;
use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::homeserver::HomeserverApi;
use crate::share_link::ShareLinkGenerator;

/// Immutable service configuration, resolved once at startup and passed
/// into the components that need it.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Mirror new tokens into the homeserver's registration-token store
    pub generate_registration_token: bool,
    /// Public prefix of published share links
    pub url_prefix: String,
    /// Directory the share-link artifacts are written to
    pub target_path: PathBuf,
    /// Optional directory searched for template overrides
    pub template_dir: Option<PathBuf>,
}

#[cfg(test)]
impl ServerConfig {
    pub fn test() -> Self {
        Self {
            generate_registration_token: true,
            url_prefix: "https://app.example.com/p/".into(),
            target_path: std::env::temp_dir(),
            template_dir: None,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub homeserver: Arc<dyn HomeserverApi>,
    pub config: Arc<ServerConfig>,
    pub share_links: Arc<ShareLinkGenerator>,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        homeserver: Arc<dyn HomeserverApi>,
        config: ServerConfig,
    ) -> Self {
        let share_links = Arc::new(ShareLinkGenerator::new(
            config.url_prefix.clone(),
            config.target_path.clone(),
            config.template_dir.clone(),
        ));
        Self {
            db,
            homeserver,
            config: Arc::new(config),
            share_links,
        }
    }
}
