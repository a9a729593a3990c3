//! Tenant resolver
//!
//! Maps a request's tenant id to a validated tenant record and a warm
//! upstream client. Clients are built lazily per tenant and kept in a
//! concurrent map; a credential change invalidates the cached client so the
//! next request binds a fresh one.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, warn};

use recbridge_core::config::UpstreamConfig;
use recbridge_core::domain::errors::GatewayError;
use recbridge_core::domain::newtypes::TenantId;
use recbridge_core::domain::tenant::{Tenant, TenantStatus, UpstreamCredentials};
use recbridge_core::ports::tenant_directory::ITenantDirectory;
use recbridge_core::ports::upstream::IUpstreamClient;
use recbridge_upstream::{RpcClient, UpstreamClientConfig};

/// Transport settings applied to every tenant client
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub auth_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub transport_retries: u32,
    pub initial_backoff: Duration,
}

impl From<&UpstreamConfig> for UpstreamSettings {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            auth_timeout: Duration::from_secs(config.auth_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            write_timeout: Duration::from_secs(config.write_timeout_secs),
            transport_retries: config.transport_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        (&UpstreamConfig::default()).into()
    }
}

/// A cached, warm adapter for one tenant
struct WarmAdapter {
    /// The credentials the client was built with; a mismatch forces a rebuild
    credentials: UpstreamCredentials,
    client: Arc<dyn IUpstreamClient>,
}

/// Builds an upstream client for a tenant; replaceable in tests
pub type ClientFactory = Arc<dyn Fn(&Tenant) -> Arc<dyn IUpstreamClient> + Send + Sync>;

/// Resolves tenant ids to validated tenants and warm upstream clients
pub struct TenantResolver {
    directory: Arc<dyn ITenantDirectory>,
    factory: ClientFactory,
    adapters: DashMap<TenantId, WarmAdapter>,
}

impl TenantResolver {
    pub fn new(directory: Arc<dyn ITenantDirectory>, settings: UpstreamSettings) -> Self {
        let factory: ClientFactory = Arc::new(move |tenant: &Tenant| {
            let config = UpstreamClientConfig {
                credentials: tenant.credentials.clone(),
                auth_timeout: settings.auth_timeout,
                read_timeout: settings.read_timeout,
                write_timeout: settings.write_timeout,
                transport_retries: settings.transport_retries,
                initial_backoff: settings.initial_backoff,
                base_context: UpstreamClientConfig::default_base_context(),
            };
            Arc::new(RpcClient::new(config)) as Arc<dyn IUpstreamClient>
        });
        Self::with_factory(directory, factory)
    }

    /// Build a resolver with a custom client factory
    pub fn with_factory(directory: Arc<dyn ITenantDirectory>, factory: ClientFactory) -> Self {
        Self {
            directory,
            factory,
            adapters: DashMap::new(),
        }
    }

    /// Resolve and gate a tenant, returning its warm upstream client
    ///
    /// - unknown tenant: `AuthInvalid` (401)
    /// - suspended: `TenantSuspended` (403)
    /// - deleted: `TenantDeleted` (410)
    ///
    /// `last_active` is stamped best-effort on every successful resolution.
    pub async fn resolve(
        &self,
        tenant_id: &TenantId,
    ) -> Result<(Tenant, Arc<dyn IUpstreamClient>), GatewayError> {
        let tenant = self
            .directory
            .get(tenant_id)
            .await
            .map_err(GatewayError::from_port_error)?
            .ok_or_else(|| GatewayError::AuthInvalid(format!("unknown tenant {tenant_id}")))?;

        match tenant.status {
            TenantStatus::Suspended => return Err(GatewayError::TenantSuspended),
            TenantStatus::Deleted => return Err(GatewayError::TenantDeleted),
            TenantStatus::Active | TenantStatus::Trial => {}
        }

        if let Err(e) = self.directory.touch_last_active(tenant_id).await {
            warn!(tenant = %tenant_id, error = %e, "Failed to stamp last_active");
        }

        let client = self.adapter_for(&tenant);
        Ok((tenant, client))
    }

    /// Fetch or build the warm client for a tenant
    fn adapter_for(&self, tenant: &Tenant) -> Arc<dyn IUpstreamClient> {
        if let Some(adapter) = self.adapters.get(&tenant.id) {
            if credentials_match(&adapter.credentials, &tenant.credentials) {
                return Arc::clone(&adapter.client);
            }
        }

        debug!(tenant = %tenant.id, "Binding upstream client");
        let client = (self.factory)(tenant);
        self.adapters.insert(
            tenant.id,
            WarmAdapter {
                credentials: tenant.credentials.clone(),
                client: Arc::clone(&client),
            },
        );
        client
    }

    /// Drop a tenant's warm client (used when a tenant is deprovisioned)
    pub fn evict(&self, tenant_id: &TenantId) {
        self.adapters.remove(tenant_id);
    }

    /// Number of warm adapters currently held
    pub fn warm_count(&self) -> usize {
        self.adapters.len()
    }
}

fn credentials_match(a: &UpstreamCredentials, b: &UpstreamCredentials) -> bool {
    a.url == b.url && a.database == b.database && a.login == b.login && a.secret == b.secret
}
