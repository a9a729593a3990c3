//! Shared application state
//!
//! One [`AppState`] is built at startup and cloned into every handler. The
//! sync-plane use cases are constructed per request because they bind to
//! the requesting tenant's upstream client.

use std::sync::Arc;

use recbridge_core::config::Config;
use recbridge_core::domain::errors::GatewayError;
use recbridge_core::domain::newtypes::TenantId;
use recbridge_core::ports::cache_store::ICacheStore;
use recbridge_core::usecases::pull_delta::PullDeltaUseCase;
use recbridge_gateway::{Gateway, TenantResolver};
use recbridge_telemetry::MetricsRegistry;
use recbridge_upstream::{ChangeLogReader, RpcSyncStateStore};

use crate::fanout::FanoutManager;

/// Process-wide state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub resolver: Arc<TenantResolver>,
    pub cache: Arc<dyn ICacheStore>,
    pub fanout: Arc<FanoutManager>,
    pub metrics: Arc<MetricsRegistry>,
    pub jwt_secret: String,
    pub webhook_api_key: String,
    /// Whether pulled events are acknowledged upstream
    pub ack_after_pull: bool,
    /// Version string reported by `/health`
    pub version: &'static str,
}

impl AppState {
    /// Assemble the state from config and already-built components
    pub fn new(
        config: &Config,
        gateway: Arc<Gateway>,
        resolver: Arc<TenantResolver>,
        cache: Arc<dyn ICacheStore>,
        fanout: Arc<FanoutManager>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            gateway,
            resolver,
            cache,
            fanout,
            metrics,
            jwt_secret: config.auth.jwt_secret.clone(),
            webhook_api_key: config.auth.webhook_api_key.clone(),
            ack_after_pull: config.sync.ack_after_pull,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Build the delta-pull use case bound to one tenant's upstream
    pub async fn pull_usecase(
        &self,
        tenant_id: &TenantId,
    ) -> Result<PullDeltaUseCase, GatewayError> {
        let (tenant, client) = self.resolver.resolve(tenant_id).await?;
        let reader = Arc::new(ChangeLogReader::new(Arc::clone(&client)));
        let store = Arc::new(RpcSyncStateStore::new(client, tenant.id));

        let usecase = PullDeltaUseCase::new(reader, store);
        Ok(if self.ack_after_pull {
            usecase
        } else {
            usecase.without_ack()
        })
    }

    /// Build the sync-state store bound to one tenant's upstream
    pub async fn sync_state_store(
        &self,
        tenant_id: &TenantId,
    ) -> Result<RpcSyncStateStore, GatewayError> {
        let (tenant, client) = self.resolver.resolve(tenant_id).await?;
        Ok(RpcSyncStateStore::new(client, tenant.id))
    }
}
