//! Global daemon state

use std::sync::Arc;

use jsshd_core::config::SshdConfig;
use jsshd_core::traits::{IdentityDirectory, LogManager, ProcessSpawner};

use crate::auth::{AuthPipeline, PasswordTable, TrustMaterial};
use crate::directory::SystemDirectory;
use crate::logs::{DiscardLogManager, FileLogManager};
use crate::server::{AllowAll, ForwardRequest, ForwardingPolicy, ShutdownCoordinator};
use crate::session::{NativeSpawner, SessionOrchestrator};

/// State shared by every connection
pub struct ServerState {
    /// Configuration
    pub config: SshdConfig,
    /// Credential checks
    pub auth: AuthPipeline,
    /// Session lifecycle
    pub sessions: SessionOrchestrator,
    /// Port forwarding policy; `None` disables forwarding
    pub forwarding: Option<Arc<dyn ForwardingPolicy>>,
    /// Process-wide shutdown
    pub shutdown: ShutdownCoordinator,
}

impl ServerState {
    /// Build the state used by the daemon binary
    pub fn from_config(config: SshdConfig) -> Self {
        let trust = TrustMaterial::load_or_disabled(&config.ca_key_path());
        let logs: Arc<dyn LogManager> = match &config.log_dir {
            Some(dir) => Arc::new(FileLogManager::new(dir.clone())),
            None => {
                tracing::warn!("No log_dir configured - session audit output is discarded");
                Arc::new(DiscardLogManager)
            }
        };

        Self::with_parts(
            config,
            Arc::new(SystemDirectory::new()),
            trust,
            logs,
            Arc::new(NativeSpawner),
        )
    }

    /// Build state from explicit collaborators
    pub fn with_parts(
        config: SshdConfig,
        directory: Arc<dyn IdentityDirectory>,
        trust: TrustMaterial,
        logs: Arc<dyn LogManager>,
        spawner: Arc<dyn ProcessSpawner>,
    ) -> Self {
        let passwords = config.password_auth.then(PasswordTable::default);
        let auth = AuthPipeline::new(directory, trust, config.authorized_keys_file.clone())
            .with_passwords(passwords);
        let forwarding: Option<Arc<dyn ForwardingPolicy>> = if config.enable_port_forwarding {
            Some(Arc::new(AllowAll))
        } else {
            None
        };

        Self {
            sessions: SessionOrchestrator::new(spawner, logs, config.relay_capacity),
            auth,
            forwarding,
            shutdown: ShutdownCoordinator::new(),
            config,
        }
    }

    /// Replace the forwarding policy
    pub fn with_forwarding_policy(mut self, policy: Option<Arc<dyn ForwardingPolicy>>) -> Self {
        self.forwarding = policy;
        self
    }

    /// Whether `request` may be forwarded
    pub fn forwarding_allowed(&self, request: &ForwardRequest<'_>) -> bool {
        self.forwarding
            .as_ref()
            .is_some_and(|policy| policy.allow(request))
    }
}
