//! Shared wiring: configuration and production effect handlers.

use anyhow::{anyhow, Context as _, Result};
use arealink_core::{AreaClient, AreaLinkConfig, PhysicalTimeEffects, SecureTextStore};
use arealink_effects::{FilesystemTextStore, HttpAreaClient, RealTimeHandler};
use arealink_session::{BootstrapVerifier, PairingFlow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Everything a command needs to talk to the store and the Area
pub struct Context {
    pub config: AreaLinkConfig,
    pub store: Arc<dyn SecureTextStore>,
    pub time: Arc<dyn PhysicalTimeEffects>,
    pub client: Arc<dyn AreaClient>,
}

impl Context {
    /// Load the config file (defaults when absent) and build the handlers
    pub fn load(config_path: &Path) -> Result<Self> {
        let config = AreaLinkConfig::load_or_default(config_path)
            .with_context(|| format!("loading {}", config_path.display()))?;
        config.validate_for_service()?;

        let directory = storage_directory(&config)?;
        debug!(directory = %directory.display(), endpoint = %config.service.endpoint, "Wiring handlers");

        let client = HttpAreaClient::new(
            &config.service.endpoint,
            std::time::Duration::from_secs(config.service.request_timeout_secs),
        )?;

        Ok(Self {
            store: Arc::new(FilesystemTextStore::new(directory)),
            time: Arc::new(RealTimeHandler::new()),
            client: Arc::new(client),
            config,
        })
    }

    /// A verifier over this context's handlers
    pub fn verifier(&self) -> Arc<BootstrapVerifier> {
        BootstrapVerifier::builder(self.store.clone(), self.time.clone(), self.client.clone())
            .renewal(self.config.renewal.clone())
            .build()
    }

    /// A pairing flow over this context's handlers
    pub fn pairing_flow(&self) -> PairingFlow {
        PairingFlow::new(
            self.client.clone(),
            self.store.clone(),
            self.time.clone(),
            self.config.pairing.soft_timeout(),
        )
    }
}

fn storage_directory(config: &AreaLinkConfig) -> Result<PathBuf> {
    match &config.storage.directory {
        Some(directory) => Ok(directory.clone()),
        None => dirs::data_dir()
            .map(|dir| dir.join("arealink"))
            .ok_or_else(|| anyhow!("no platform data directory; set storage.directory")),
    }
}
