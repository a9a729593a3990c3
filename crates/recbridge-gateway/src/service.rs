//! The RPC gateway pipeline
//!
//! Every tenant-scoped operation runs the same straight line:
//!
//! 1. tenant check (resolver) and rate limiting
//! 2. operation validation against the closed set
//! 3. cache lookup for cacheable reads
//! 4. query optimization for the search-read family
//! 5. execution against the tenant's warm upstream client
//! 6. cache store with the operation's TTL
//! 7. invalidation and change fan-out after writes
//!
//! Cache failures never fail a request: a broken cache degrades to
//! pass-through. The gateway also implements the record-writer port so
//! offline-sync writes share this exact pipeline.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use recbridge_core::domain::errors::GatewayError;
use recbridge_core::domain::newtypes::TenantId;
use recbridge_core::domain::operation::{OperationCall, OperationKind};
use recbridge_core::domain::optimizer;
use recbridge_core::domain::tenant::Tenant;
use recbridge_core::ports::broadcast::IEventBroadcaster;
use recbridge_core::ports::cache_store::ICacheStore;
use recbridge_core::ports::record_writer::IRecordWriter;
use recbridge_core::ports::upstream::IUpstreamClient;
use recbridge_telemetry::MetricsRegistry;

use crate::limiter::{RateLimiter, WindowClass};
use crate::resolver::TenantResolver;

/// Result of one gateway operation
#[derive(Debug, Clone, Serialize)]
pub struct GatewayResponse {
    pub result: Value,
    /// True when served from cache without an upstream round trip
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,
    /// True when the optimizer rewrote fields, domain, or limit
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub optimized: bool,
    pub execution_time_ms: f64,
}

/// One item of a batch execution
#[derive(Debug, Clone, Deserialize)]
pub struct BatchItem {
    pub operation: String,
    #[serde(flatten)]
    pub call: OperationCall,
}

/// Per-item result of a batch execution
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,
}

/// The tenant-scoped RPC gateway
pub struct Gateway {
    resolver: Arc<TenantResolver>,
    cache: Arc<dyn ICacheStore>,
    broadcaster: Arc<dyn IEventBroadcaster>,
    limiter: RateLimiter,
    metrics: Arc<MetricsRegistry>,
}

impl Gateway {
    pub fn new(
        resolver: Arc<TenantResolver>,
        cache: Arc<dyn ICacheStore>,
        broadcaster: Arc<dyn IEventBroadcaster>,
        limiter: RateLimiter,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            resolver,
            cache,
            broadcaster,
            limiter,
            metrics,
        }
    }

    /// Execute one operation through the full pipeline
    pub async fn execute(
        &self,
        tenant_id: &TenantId,
        operation: &str,
        call: OperationCall,
    ) -> Result<GatewayResponse, GatewayError> {
        let started = Instant::now();
        let outcome = self.execute_inner(tenant_id, operation, call).await;

        match &outcome {
            Ok(response) => {
                self.metrics.record_request(operation, "ok");
                debug!(
                    operation,
                    cached = response.cached,
                    elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                    "Gateway operation complete"
                );
            }
            Err(e) => {
                self.metrics.record_request(operation, e.kind());
            }
        }
        outcome
    }

    async fn execute_inner(
        &self,
        tenant_id: &TenantId,
        operation: &str,
        mut call: OperationCall,
    ) -> Result<GatewayResponse, GatewayError> {
        let started = Instant::now();

        // Step 1: tenant gate.
        let (tenant, client) = self.resolver.resolve(tenant_id).await?;

        // Step 2: operation validation against the closed set.
        let op: OperationKind = operation
            .parse()
            .map_err(|_| GatewayError::BadRequest(format!("unknown operation '{operation}'")))?;
        call.validate_for(op)
            .map_err(|e| GatewayError::BadRequest(e.to_string()))?;

        if !tenant.is_model_allowed(&call.model) {
            return Err(GatewayError::PermissionDenied(format!(
                "model '{}' is not in the tenant allowlist",
                call.model
            )));
        }

        let class = if op.is_write() {
            WindowClass::Write
        } else {
            WindowClass::Read
        };
        if let Err(e) = self.limiter.check(tenant_id, class).await {
            self.metrics.record_rate_limited(class.as_str());
            return Err(e);
        }

        // Step 3: cache lookup.
        let cache_key = op
            .is_cacheable()
            .then(|| optimizer::cache_key(tenant_id, op, &call.model, &fingerprint(&call)));

        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache_get(key).await {
                self.metrics.record_cache_lookup(op.as_str(), true);
                return Ok(GatewayResponse {
                    result: hit,
                    cached: true,
                    optimized: false,
                    execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
                });
            }
            self.metrics.record_cache_lookup(op.as_str(), false);
        }

        // Step 4: optimization (search-read family only).
        let optimized = optimize_call(op, &mut call);

        // Step 5: execution.
        let (method, args, kwargs) = build_upstream_call(op, &call);
        let upstream_started = Instant::now();
        let result = client.call(&call.model, &method, args, kwargs).await;
        self.metrics
            .observe_upstream(&method, upstream_started.elapsed().as_secs_f64());
        let result = result.map_err(GatewayError::from)?;

        // Step 6: cache store.
        if let Some(key) = &cache_key {
            self.cache_store(key, &result, op).await;
        }

        // Step 7: write-through invalidation and fan-out.
        if op.is_write() {
            self.invalidate_and_broadcast(&tenant, op, &call, &result).await;
        }

        Ok(GatewayResponse {
            result,
            cached: false,
            optimized,
            execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Execute a sequence of operations; per-item results
    pub async fn execute_batch(
        &self,
        tenant_id: &TenantId,
        items: Vec<BatchItem>,
        stop_on_error: bool,
    ) -> Result<Vec<BatchItemResult>, GatewayError> {
        self.limiter.check(tenant_id, WindowClass::Batch).await?;

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            match self.execute(tenant_id, &item.operation, item.call).await {
                Ok(response) => results.push(BatchItemResult {
                    success: true,
                    result: Some(response.result),
                    error: None,
                    error_kind: None,
                    cached: response.cached,
                }),
                Err(e) => {
                    results.push(BatchItemResult {
                        success: false,
                        result: None,
                        error: Some(e.to_string()),
                        error_kind: Some(e.kind()),
                        cached: false,
                    });
                    if stop_on_error {
                        break;
                    }
                }
            }
        }
        Ok(results)
    }

    async fn cache_get(&self, key: &str) -> Option<Value> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key, error = %e, "Dropping undecodable cache entry");
                    let _ = self.cache.delete(key).await;
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn cache_store(&self, key: &str, result: &Value, op: OperationKind) {
        let ttl = std::time::Duration::from_secs(optimizer::cache_ttl(op));
        match serde_json::to_vec(result) {
            Ok(bytes) => {
                if let Err(e) = self.cache.set(key, &bytes, Some(ttl)).await {
                    warn!(key, error = %e, "Cache store failed");
                }
            }
            Err(e) => warn!(key, error = %e, "Result not serializable for cache"),
        }
    }

    /// Evict every cached read for the written model and broadcast one
    /// change event per affected record
    async fn invalidate_and_broadcast(
        &self,
        tenant: &Tenant,
        op: OperationKind,
        call: &OperationCall,
        result: &Value,
    ) {
        let mut evicted = 0u64;
        for pattern in optimizer::invalidation_patterns(&tenant.id, &call.model) {
            match self.cache.delete_pattern(&pattern).await {
                Ok(count) => evicted += count,
                Err(e) => warn!(pattern, error = %e, "Cache invalidation failed"),
            }
        }
        if evicted > 0 {
            self.metrics.record_invalidation(&call.model, evicted);
            info!(model = %call.model, evicted, "Invalidated cached reads after write");
        }

        let Some(kind) = op.event_kind() else { return };
        let payload = call
            .values
            .as_ref()
            .map(|values| Value::Object(values.clone()))
            .unwrap_or(Value::Null);

        for record_id in affected_record_ids(op, call, result) {
            self.broadcaster
                .broadcast_record_update(&tenant.id, &call.model, record_id, kind, payload.clone())
                .await;
        }
    }

    /// Execute an uncached read against the tenant's upstream
    ///
    /// Conflict detection must see the live record, never a cached copy.
    async fn fresh_read(
        &self,
        tenant_id: &TenantId,
        model: &str,
        ids: &[i64],
        fields: &[String],
    ) -> Result<Vec<Map<String, Value>>, GatewayError> {
        let (_, client) = self.resolver.resolve(tenant_id).await?;
        let mut kwargs = Map::new();
        kwargs.insert("fields".to_string(), json!(fields));

        let result = client
            .call(model, "read", vec![json!(ids)], kwargs)
            .await
            .map_err(GatewayError::from)?;

        Ok(result
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_object)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// The record-writer port: offline-sync writes ride the full pipeline
#[async_trait::async_trait]
impl IRecordWriter for Gateway {
    async fn create(
        &self,
        tenant: &TenantId,
        model: &str,
        values: Map<String, Value>,
    ) -> Result<i64, GatewayError> {
        let mut call = OperationCall::for_model(model);
        call.values = Some(values);

        let response = self.execute(tenant, "create", call).await?;
        response
            .result
            .as_i64()
            .or_else(|| response.result.as_array().and_then(|a| a.first()).and_then(Value::as_i64))
            .ok_or_else(|| {
                GatewayError::Internal(format!(
                    "create on '{model}' returned no record id: {}",
                    response.result
                ))
            })
    }

    async fn write(
        &self,
        tenant: &TenantId,
        model: &str,
        ids: &[i64],
        values: Map<String, Value>,
    ) -> Result<bool, GatewayError> {
        let mut call = OperationCall::for_model(model);
        call.ids = ids.to_vec();
        call.values = Some(values);

        let response = self.execute(tenant, "write", call).await?;
        Ok(response.result.as_bool().unwrap_or(true))
    }

    async fn unlink(
        &self,
        tenant: &TenantId,
        model: &str,
        ids: &[i64],
    ) -> Result<bool, GatewayError> {
        let mut call = OperationCall::for_model(model);
        call.ids = ids.to_vec();

        let response = self.execute(tenant, "unlink", call).await?;
        Ok(response.result.as_bool().unwrap_or(true))
    }

    async fn read(
        &self,
        tenant: &TenantId,
        model: &str,
        ids: &[i64],
        fields: &[String],
    ) -> Result<Vec<Map<String, Value>>, GatewayError> {
        self.fresh_read(tenant, model, ids, fields).await
    }
}

/// The normalized argument form hashed into the cache key
fn fingerprint(call: &OperationCall) -> Value {
    json!({
        "ids": call.ids,
        "domain": call.domain.as_ref().map(|d| d.to_json()),
        "fields": call.fields,
        "order": call.order,
        "limit": call.limit,
        "offset": call.offset,
        "name": call.name,
        "kwargs": call.kwargs,
    })
}

/// Rewrite the search-read family in place; returns whether anything changed
fn optimize_call(op: OperationKind, call: &mut OperationCall) -> bool {
    if !matches!(op, OperationKind::SearchRead | OperationKind::WebSearchRead) {
        // Other bounded operations still get their ceiling applied.
        let clamped = optimizer::clamp_limit(op, call.limit);
        call.limit = clamped;
        return false;
    }

    let mut changed = false;

    let expanded = optimizer::optimize_fields(&call.model, call.fields.as_deref());
    if expanded != call.fields {
        call.fields = expanded;
        changed = true;
    }

    if let Some(domain) = &call.domain {
        let reordered = optimizer::optimize_domain(domain);
        if &reordered != domain {
            changed = true;
        }
        call.domain = Some(reordered);
    }

    let clamped = optimizer::clamp_limit(op, call.limit);
    if clamped != call.limit {
        changed = true;
    }
    call.limit = clamped;

    if call.order.is_none() {
        call.order = Some(optimizer::DEFAULT_ORDER.to_string());
        changed = true;
    }

    changed
}

/// Translate an operation call into the upstream method and arguments
fn build_upstream_call(
    op: OperationKind,
    call: &OperationCall,
) -> (String, Vec<Value>, Map<String, Value>) {
    let mut args: Vec<Value> = Vec::new();
    let mut kwargs = call.kwargs.clone();
    let domain = call
        .domain
        .as_ref()
        .map(|d| d.to_json())
        .unwrap_or_else(|| json!([]));

    match op {
        OperationKind::Search => {
            kwargs.insert("domain".into(), domain);
            insert_paging(&mut kwargs, call);
        }
        OperationKind::SearchRead | OperationKind::WebSearchRead => {
            kwargs.insert("domain".into(), domain);
            if let Some(fields) = &call.fields {
                kwargs.insert("fields".into(), json!(fields));
            }
            insert_paging(&mut kwargs, call);
        }
        OperationKind::SearchCount => {
            kwargs.insert("domain".into(), domain);
        }
        OperationKind::Read | OperationKind::WebRead => {
            args.push(json!(call.ids));
            if let Some(fields) = &call.fields {
                kwargs.insert("fields".into(), json!(fields));
            }
        }
        OperationKind::NameSearch => {
            if let Some(name) = &call.name {
                kwargs.insert("name".into(), json!(name));
            }
            kwargs.insert("args".into(), domain);
            if let Some(limit) = call.limit {
                kwargs.insert("limit".into(), json!(limit));
            }
        }
        OperationKind::NameGet => {
            args.push(json!(call.ids));
        }
        OperationKind::FieldsGet => {
            if let Some(fields) = &call.fields {
                kwargs.insert("allfields".into(), json!(fields));
            }
        }
        OperationKind::Create => {
            if let Some(values) = &call.values {
                args.push(Value::Object(values.clone()));
            }
        }
        OperationKind::Write | OperationKind::WebSave => {
            args.push(json!(call.ids));
            if let Some(values) = &call.values {
                args.push(Value::Object(values.clone()));
            }
        }
        OperationKind::Unlink => {
            args.push(json!(call.ids));
        }
        OperationKind::CallKw => {
            args = call.args.clone();
        }
    }

    let method = match op {
        OperationKind::CallKw => call.method.clone().unwrap_or_default(),
        other => other.upstream_method().to_string(),
    };

    (method, args, kwargs)
}

fn insert_paging(kwargs: &mut Map<String, Value>, call: &OperationCall) {
    if let Some(limit) = call.limit {
        kwargs.insert("limit".into(), json!(limit));
    }
    if let Some(offset) = call.offset {
        kwargs.insert("offset".into(), json!(offset));
    }
    if let Some(order) = &call.order {
        kwargs.insert("order".into(), json!(order));
    }
}

/// Record ids a write touched, for fan-out
fn affected_record_ids(op: OperationKind, call: &OperationCall, result: &Value) -> Vec<i64> {
    match op {
        OperationKind::Create => result
            .as_i64()
            .or_else(|| result.as_array().and_then(|a| a.first()).and_then(Value::as_i64))
            .into_iter()
            .collect(),
        _ => call.ids.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recbridge_core::config::RateLimitConfig;
    use recbridge_core::domain::change_event::EventKind;
    use recbridge_core::domain::errors::UpstreamError;
    use recbridge_core::domain::session::SessionInfo;
    use recbridge_core::domain::newtypes::UserId;
    use recbridge_core::domain::tenant::{TenantStatus, UpstreamCredentials};
    use recbridge_core::ports::tenant_directory::ITenantDirectory;
    use recbridge_store::MemoryCacheStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Upstream stub that counts calls and returns a fixed value
    struct CountingClient {
        calls: AtomicUsize,
        response: Value,
        last_call: Mutex<Option<(String, String, Vec<Value>, Map<String, Value>)>>,
    }

    impl CountingClient {
        fn returning(response: Value) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                response,
                last_call: Mutex::new(None),
            })
        }
    }

    #[async_trait::async_trait]
    impl IUpstreamClient for CountingClient {
        async fn authenticate(&self) -> Result<SessionInfo, UpstreamError> {
            Ok(SessionInfo::new(UserId::new(1), "s"))
        }

        async fn call(
            &self,
            model: &str,
            method: &str,
            args: Vec<Value>,
            kwargs: Map<String, Value>,
        ) -> Result<Value, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_call.lock().unwrap() =
                Some((model.to_string(), method.to_string(), args, kwargs));
            Ok(self.response.clone())
        }
    }

    /// Broadcaster stub recording record updates
    #[derive(Default)]
    struct RecordingBroadcaster {
        updates: Mutex<Vec<(String, i64, EventKind)>>,
    }

    #[async_trait::async_trait]
    impl IEventBroadcaster for RecordingBroadcaster {
        async fn broadcast_record_update(
            &self,
            _tenant: &TenantId,
            model: &str,
            record_id: i64,
            kind: EventKind,
            _payload: Value,
        ) {
            self.updates
                .lock()
                .unwrap()
                .push((model.to_string(), record_id, kind));
        }

        async fn broadcast_to_channel(&self, _channel: &str, _message: Value) {}
    }

    struct OneTenantDirectory {
        tenant: Tenant,
    }

    #[async_trait::async_trait]
    impl ITenantDirectory for OneTenantDirectory {
        async fn get(&self, id: &TenantId) -> anyhow::Result<Option<Tenant>> {
            Ok((&self.tenant.id == id).then(|| self.tenant.clone()))
        }
        async fn touch_last_active(&self, _id: &TenantId) -> anyhow::Result<()> {
            Ok(())
        }
        async fn upsert(&self, _tenant: &Tenant) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Harness {
        gateway: Gateway,
        tenant_id: TenantId,
        client: Arc<CountingClient>,
        broadcaster: Arc<RecordingBroadcaster>,
    }

    fn harness_with(tenant: Tenant, client: Arc<CountingClient>) -> Harness {
        let tenant_id = tenant.id;
        let directory = Arc::new(OneTenantDirectory { tenant });
        let factory_client = Arc::clone(&client);
        let resolver = Arc::new(TenantResolver::with_factory(
            directory,
            Arc::new(move |_tenant: &Tenant| {
                Arc::clone(&factory_client) as Arc<dyn IUpstreamClient>
            }),
        ));

        let cache = Arc::new(MemoryCacheStore::new());
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let limiter = RateLimiter::new(
            Arc::clone(&cache) as Arc<dyn ICacheStore>,
            RateLimitConfig {
                enabled: true,
                window_secs: 60,
                read_per_window: 1000,
                write_per_window: 1000,
                batch_per_window: 1000,
            },
        );
        let metrics = Arc::new(MetricsRegistry::new().unwrap());

        Harness {
            gateway: Gateway::new(
                resolver,
                Arc::clone(&cache) as Arc<dyn ICacheStore>,
                Arc::clone(&broadcaster) as Arc<dyn IEventBroadcaster>,
                limiter,
                metrics,
            ),
            tenant_id,
            client,
            broadcaster,
        }
    }

    fn active_tenant() -> Tenant {
        Tenant::new(
            "acme",
            UpstreamCredentials {
                url: "http://localhost:1".into(),
                database: "db".into(),
                login: "svc".into(),
                secret: "pw".into(),
            },
        )
    }

    fn search_read_call() -> OperationCall {
        serde_json::from_value(json!({
            "model": "res.partner",
            "domain": [["is_company", "=", true]],
            "fields": ["name", "email"],
            "limit": 10
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_repeated_read_hits_cache_once_upstream() {
        let client = CountingClient::returning(json!([{"id": 1, "name": "A"}]));
        let h = harness_with(active_tenant(), client);

        let first = h
            .gateway
            .execute(&h.tenant_id, "search_read", search_read_call())
            .await
            .unwrap();
        assert!(!first.cached);

        let second = h
            .gateway
            .execute(&h.tenant_id, "search_read", search_read_call())
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(second.result, first.result);
        assert_eq!(h.client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_invalidates_cache_and_broadcasts() {
        let client = CountingClient::returning(json!([{"id": 1, "name": "A"}]));
        let h = harness_with(active_tenant(), client);

        h.gateway
            .execute(&h.tenant_id, "search_read", search_read_call())
            .await
            .unwrap();

        let write: OperationCall = serde_json::from_value(json!({
            "model": "res.partner",
            "ids": [5],
            "values": {"name": "X"}
        }))
        .unwrap();
        h.gateway
            .execute(&h.tenant_id, "write", write)
            .await
            .unwrap();

        // The cached read is gone: the next identical read goes upstream.
        let after = h
            .gateway
            .execute(&h.tenant_id, "search_read", search_read_call())
            .await
            .unwrap();
        assert!(!after.cached);
        assert_eq!(h.client.calls.load(Ordering::SeqCst), 3);

        let updates = h.broadcaster.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0], ("res.partner".to_string(), 5, EventKind::Update));
    }

    #[tokio::test]
    async fn test_unknown_operation_never_reaches_upstream() {
        let client = CountingClient::returning(json!(null));
        let h = harness_with(active_tenant(), client);

        let err = h
            .gateway
            .execute(&h.tenant_id, "execute_kw", search_read_call())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(h.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_suspended_tenant_never_reaches_upstream() {
        let mut tenant = active_tenant();
        tenant.status = TenantStatus::Suspended;
        let client = CountingClient::returning(json!(null));
        let h = harness_with(tenant, client);

        let err = h
            .gateway
            .execute(&h.tenant_id, "search_read", search_read_call())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "TenantSuspended");
        assert_eq!(h.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_allowlist_enforced() {
        let mut tenant = active_tenant();
        tenant.allowed_models = vec!["sale.order".into()];
        let client = CountingClient::returning(json!(null));
        let h = harness_with(tenant, client);

        let err = h
            .gateway
            .execute(&h.tenant_id, "search_read", search_read_call())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_search_read_is_optimized() {
        let client = CountingClient::returning(json!([]));
        let h = harness_with(active_tenant(), client);

        let call: OperationCall = serde_json::from_value(json!({
            "model": "sale.order",
            "domain": [["partner_id.name", "ilike", "x"], ["id", ">", 4]],
            "fields": ["name", "partner_id"],
            "limit": 5000
        }))
        .unwrap();

        let response = h
            .gateway
            .execute(&h.tenant_id, "search_read", call)
            .await
            .unwrap();
        assert!(response.optimized);

        let (_, method, _, kwargs) = h.client.last_call.lock().unwrap().clone().unwrap();
        assert_eq!(method, "search_read");
        assert_eq!(kwargs["limit"], json!(200));
        assert_eq!(kwargs["order"], json!("id DESC"));
        // Related partner columns were pulled into the field list.
        let fields: Vec<String> =
            serde_json::from_value(kwargs["fields"].clone()).unwrap();
        assert!(fields.contains(&"partner_id.name".to_string()));
        // Indexed leaf moved in front of the relation leaf.
        let domain = kwargs["domain"].as_array().unwrap();
        assert_eq!(domain[0], json!(["id", ">", 4]));
    }

    #[tokio::test]
    async fn test_create_maps_result_id_and_broadcasts_create() {
        let client = CountingClient::returning(json!(42));
        let h = harness_with(active_tenant(), client);

        let id = h
            .gateway
            .create(
                &h.tenant_id,
                "res.partner",
                json!({"name": "New Co"}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(id, 42);

        let updates = h.broadcaster.updates.lock().unwrap();
        assert_eq!(updates[0], ("res.partner".to_string(), 42, EventKind::Create));
    }

    #[tokio::test]
    async fn test_batch_stop_on_error() {
        let client = CountingClient::returning(json!([]));
        let h = harness_with(active_tenant(), client);

        let items: Vec<BatchItem> = serde_json::from_value(json!([
            {"operation": "bogus_op", "model": "res.partner"},
            {"operation": "search_read", "model": "res.partner"}
        ]))
        .unwrap();

        let stopped = h
            .gateway
            .execute_batch(&h.tenant_id, items, true)
            .await
            .unwrap();
        assert_eq!(stopped.len(), 1);
        assert!(!stopped[0].success);
        assert_eq!(stopped[0].error_kind, Some("BadRequest"));
    }

    #[tokio::test]
    async fn test_batch_continues_without_stop_on_error() {
        let client = CountingClient::returning(json!([]));
        let h = harness_with(active_tenant(), client);

        let items: Vec<BatchItem> = serde_json::from_value(json!([
            {"operation": "bogus_op", "model": "res.partner"},
            {"operation": "search_read", "model": "res.partner"}
        ]))
        .unwrap();

        let results = h
            .gateway
            .execute_batch(&h.tenant_id, items, false)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[1].success);
    }

    #[tokio::test]
    async fn test_call_kw_passes_through_uncached() {
        let client = CountingClient::returning(json!({"ok": true}));
        let h = harness_with(active_tenant(), client);

        let call: OperationCall = serde_json::from_value(json!({
            "model": "res.partner",
            "method": "address_get",
            "args": [[7]],
            "kwargs": {"adr_pref": ["delivery"]}
        }))
        .unwrap();

        let first = h
            .gateway
            .execute(&h.tenant_id, "call_kw", call.clone())
            .await
            .unwrap();
        assert!(!first.cached);
        let second = h
            .gateway
            .execute(&h.tenant_id, "call_kw", call)
            .await
            .unwrap();
        assert!(!second.cached);
        assert_eq!(h.client.calls.load(Ordering::SeqCst), 2);

        let (_, method, args, kwargs) = h.client.last_call.lock().unwrap().clone().unwrap();
        assert_eq!(method, "address_get");
        assert_eq!(args, vec![json!([7])]);
        assert_eq!(kwargs["adr_pref"], json!(["delivery"]));
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_over_budget() {
        let client = CountingClient::returning(json!([]));
        let tenant = active_tenant();
        let tenant_id = tenant.id;
        let directory = Arc::new(OneTenantDirectory { tenant });
        let inner = Arc::clone(&client);
        let resolver = Arc::new(TenantResolver::with_factory(
            directory,
            Arc::new(move |_t: &Tenant| Arc::clone(&inner) as Arc<dyn IUpstreamClient>),
        ));
        let cache = Arc::new(MemoryCacheStore::new());
        let limiter = RateLimiter::new(
            Arc::clone(&cache) as Arc<dyn ICacheStore>,
            RateLimitConfig {
                enabled: true,
                window_secs: 60,
                read_per_window: 1,
                write_per_window: 1,
                batch_per_window: 1,
            },
        );
        let gateway = Gateway::new(
            resolver,
            cache,
            Arc::new(RecordingBroadcaster::default()),
            limiter,
            Arc::new(MetricsRegistry::new().unwrap()),
        );

        let count_call: OperationCall =
            serde_json::from_value(json!({"model": "res.partner"})).unwrap();
        gateway
            .execute(&tenant_id, "search_count", count_call.clone())
            .await
            .unwrap();
        let err = gateway
            .execute(&tenant_id, "search_count", count_call)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 429);
    }
}
