use crate::core::{Key, Result};
use crate::db::{ColumnFamilies, ColumnFamily, DbNil, TransactionContext};
use crate::record::SignalSubscriptionRecord;
use std::sync::Arc;

/// Signal subscriptions, indexed by signal name for broadcasts and by the
/// waiting element instance for cleanup.
pub struct SignalSubscriptionState {
    by_name: ColumnFamily<(String, i64), SignalSubscriptionRecord>,
    by_key: ColumnFamily<(i64, String), DbNil>,
}

impl SignalSubscriptionState {
    pub fn new(context: Arc<TransactionContext>) -> Self {
        Self {
            by_name: ColumnFamily::new(
                Arc::clone(&context),
                ColumnFamilies::SignalSubscriptionByName,
            ),
            by_key: ColumnFamily::new(context, ColumnFamilies::SignalSubscriptionByKey),
        }
    }

    pub fn put(&self, subscription: &SignalSubscriptionRecord) -> Result<()> {
        let key = subscription.catch_event_instance_key;
        self.by_name
            .upsert(&(subscription.signal_name.clone(), key), subscription)?;
        self.by_key.upsert(&(key, subscription.signal_name.clone()), &DbNil)
    }

    pub fn remove(&self, subscription_key: Key, signal_name: &str) -> Result<()> {
        self.by_name.delete_if_exists(&(signal_name.to_string(), subscription_key))?;
        self.by_key.delete_if_exists(&(subscription_key, signal_name.to_string()))?;
        Ok(())
    }

    pub fn exists(&self, subscription_key: Key, signal_name: &str) -> Result<bool> {
        self.by_name.exists(&(signal_name.to_string(), subscription_key))
    }

    /// Subscriptions for a signal name, in subscription key order.
    pub fn subscriptions_by_name(
        &self,
        signal_name: &str,
    ) -> Result<Vec<SignalSubscriptionRecord>> {
        Ok(self
            .by_name
            .entries_with_prefix(&signal_name.to_string())?
            .into_iter()
            .map(|(_, subscription)| subscription)
            .collect())
    }

    pub fn subscriptions_by_key(
        &self,
        subscription_key: Key,
    ) -> Result<Vec<SignalSubscriptionRecord>> {
        let mut subscriptions = Vec::new();
        for ((_, name), _) in self.by_key.entries_with_prefix(&subscription_key)? {
            if let Some(subscription) = self.by_name.get(&(name, subscription_key))? {
                subscriptions.push(subscription);
            }
        }
        Ok(subscriptions)
    }

    pub fn count(&self) -> Result<usize> {
        self.by_name.count()
    }
}
