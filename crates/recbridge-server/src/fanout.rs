//! Change fan-out (WebSocket subscriber registry)
//!
//! Best-effort, fire-and-forget delivery of mutation events to connected
//! users. Three registries:
//! - user connections: `user_id -> [connection senders]`
//! - channel subscriptions: `channel name -> {user ids}`
//! - record subscriptions: `(tenant, model, record_id) -> {user ids}`
//!
//! Subscribe/unsubscribe take a writer lock on the affected map; broadcasts
//! copy the target set out under a reader lock and deliver outside it. A
//! send failure means the receiver is gone, and that connection is removed
//! silently. Nothing here persists; consumers de-duplicate by event id.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use recbridge_core::domain::change_event::EventKind;
use recbridge_core::domain::newtypes::{TenantId, UserId};
use recbridge_core::ports::broadcast::IEventBroadcaster;

/// Key of a record subscription
type RecordKey = (TenantId, String, i64);

/// One attached WebSocket connection
struct Connection {
    id: u64,
    sender: UnboundedSender<Value>,
}

/// Registry of connections and subscriptions
#[derive(Default)]
pub struct FanoutManager {
    next_connection_id: AtomicU64,
    connections: RwLock<HashMap<UserId, Vec<Connection>>>,
    channel_subscriptions: RwLock<HashMap<String, HashSet<UserId>>>,
    record_subscriptions: RwLock<HashMap<RecordKey, HashSet<UserId>>>,
}

impl FanoutManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connection for a user; returns the connection id
    pub fn attach(&self, user_id: UserId, sender: UnboundedSender<Value>) -> u64 {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        self.connections
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(user_id)
            .or_default()
            .push(Connection { id, sender });
        info!(user = %user_id, connection = id, "WebSocket attached");
        id
    }

    /// Detach one connection; the user's subscriptions are dropped with the
    /// last connection
    pub fn detach(&self, user_id: UserId, connection_id: u64) {
        let mut gone = false;
        {
            let mut connections = self
                .connections
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(list) = connections.get_mut(&user_id) {
                list.retain(|c| c.id != connection_id);
                if list.is_empty() {
                    connections.remove(&user_id);
                    gone = true;
                }
            }
        }
        if gone {
            self.forget_user(user_id);
        }
        info!(user = %user_id, connection = connection_id, "WebSocket detached");
    }

    fn forget_user(&self, user_id: UserId) {
        self.channel_subscriptions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .retain(|_, users| {
                users.remove(&user_id);
                !users.is_empty()
            });
        self.record_subscriptions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .retain(|_, users| {
                users.remove(&user_id);
                !users.is_empty()
            });
    }

    pub fn subscribe_channel(&self, user_id: UserId, channel: &str) {
        self.channel_subscriptions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(channel.to_string())
            .or_default()
            .insert(user_id);
        debug!(user = %user_id, channel, "Subscribed to channel");
    }

    pub fn unsubscribe_channel(&self, user_id: UserId, channel: &str) {
        let mut channels = self
            .channel_subscriptions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(users) = channels.get_mut(channel) {
            users.remove(&user_id);
            if users.is_empty() {
                channels.remove(channel);
            }
        }
    }

    pub fn subscribe_records(
        &self,
        user_id: UserId,
        tenant: TenantId,
        model: &str,
        record_ids: &[i64],
    ) {
        let mut records = self
            .record_subscriptions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for record_id in record_ids {
            records
                .entry((tenant, model.to_string(), *record_id))
                .or_default()
                .insert(user_id);
        }
        debug!(user = %user_id, model, count = record_ids.len(), "Subscribed to records");
    }

    pub fn unsubscribe_records(
        &self,
        user_id: UserId,
        tenant: TenantId,
        model: &str,
        record_ids: &[i64],
    ) {
        let mut records = self
            .record_subscriptions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for record_id in record_ids {
            let key = (tenant, model.to_string(), *record_id);
            if let Some(users) = records.get_mut(&key) {
                users.remove(&user_id);
                if users.is_empty() {
                    records.remove(&key);
                }
            }
        }
    }

    /// Deliver to every connection of one user; dead connections are removed
    pub fn send_to_user(&self, user_id: UserId, message: &Value) {
        // Copy the senders out so delivery happens outside the lock.
        let senders: Vec<(u64, UnboundedSender<Value>)> = {
            let connections = self
                .connections
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            match connections.get(&user_id) {
                Some(list) => list.iter().map(|c| (c.id, c.sender.clone())).collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for (id, sender) in senders {
            if sender.send(message.clone()).is_err() {
                dead.push(id);
            }
        }
        for id in dead {
            self.detach(user_id, id);
        }
    }

    /// Total number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    fn channel_members(&self, channel: &str) -> Vec<UserId> {
        self.channel_subscriptions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(channel)
            .map(|users| users.iter().copied().collect())
            .unwrap_or_default()
    }

    fn record_watchers(&self, key: &RecordKey) -> Vec<UserId> {
        self.record_subscriptions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .map(|users| users.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl IEventBroadcaster for FanoutManager {
    async fn broadcast_record_update(
        &self,
        tenant: &TenantId,
        model: &str,
        record_id: i64,
        kind: EventKind,
        payload: Value,
    ) {
        let key = (*tenant, model.to_string(), record_id);
        let watchers = self.record_watchers(&key);
        if watchers.is_empty() {
            return;
        }

        let message = json!({
            "type": "model_update",
            "model": model,
            "record_id": record_id,
            "operation": kind.as_str(),
            "data": payload,
            "timestamp": Utc::now().to_rfc3339(),
        });

        debug!(model, record_id, watchers = watchers.len(), "Broadcasting record update");
        for user in watchers {
            self.send_to_user(user, &message);
        }
    }

    async fn broadcast_to_channel(&self, channel: &str, message: Value) {
        for user in self.channel_members(channel) {
            self.send_to_user(user, &message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn user(n: i64) -> UserId {
        UserId::new(n)
    }

    #[tokio::test]
    async fn test_record_subscription_delivery() {
        let fanout = FanoutManager::new();
        let tenant = TenantId::new();
        let (tx, mut rx) = unbounded_channel();

        fanout.attach(user(1), tx);
        fanout.subscribe_records(user(1), tenant, "res.partner", &[5]);

        fanout
            .broadcast_record_update(&tenant, "res.partner", 5, EventKind::Update, json!({"name": "X"}))
            .await;

        let message = rx.recv().await.unwrap();
        assert_eq!(message["type"], json!("model_update"));
        assert_eq!(message["record_id"], json!(5));
        assert_eq!(message["operation"], json!("update"));
        assert_eq!(message["data"]["name"], json!("X"));
    }

    #[tokio::test]
    async fn test_unsubscribed_records_receive_nothing() {
        let fanout = FanoutManager::new();
        let tenant = TenantId::new();
        let (tx, mut rx) = unbounded_channel();

        fanout.attach(user(1), tx);
        fanout.subscribe_records(user(1), tenant, "res.partner", &[5]);

        // Different record id, different model, different tenant
        fanout
            .broadcast_record_update(&tenant, "res.partner", 6, EventKind::Update, json!({}))
            .await;
        fanout
            .broadcast_record_update(&tenant, "sale.order", 5, EventKind::Update, json!({}))
            .await;
        fanout
            .broadcast_record_update(&TenantId::new(), "res.partner", 5, EventKind::Update, json!({}))
            .await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_broadcast() {
        let fanout = FanoutManager::new();
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();

        fanout.attach(user(1), tx1);
        fanout.attach(user(2), tx2);
        fanout.subscribe_channel(user(1), "critical_events");

        fanout
            .broadcast_to_channel("critical_events", json!({"type": "critical_event"}))
            .await;

        assert!(rx1.recv().await.is_some());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_connection_is_removed_silently() {
        let fanout = FanoutManager::new();
        let (tx, rx) = unbounded_channel();
        fanout.attach(user(1), tx);
        drop(rx);

        fanout.send_to_user(user(1), &json!({"type": "status"}));
        assert_eq!(fanout.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_clears_subscriptions() {
        let fanout = FanoutManager::new();
        let tenant = TenantId::new();
        let (tx, _rx) = unbounded_channel();

        let conn = fanout.attach(user(1), tx);
        fanout.subscribe_channel(user(1), "ops");
        fanout.subscribe_records(user(1), tenant, "res.partner", &[1, 2]);
        fanout.detach(user(1), conn);

        assert!(fanout.channel_members("ops").is_empty());
        assert!(fanout
            .record_watchers(&(tenant, "res.partner".to_string(), 1))
            .is_empty());
    }

    #[tokio::test]
    async fn test_multiple_connections_per_user() {
        let fanout = FanoutManager::new();
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();

        fanout.attach(user(1), tx1);
        fanout.attach(user(1), tx2);
        fanout.send_to_user(user(1), &json!({"n": 1}));

        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }
}
