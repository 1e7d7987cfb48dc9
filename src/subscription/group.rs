//! Teardown scope for a set of subscriptions

use super::registry::Subscription;

/// Collects subscriptions owned by one component and removes them all when
/// the component tears down (on `clear` or drop).
#[derive(Debug, Default)]
pub struct SubscriptionGroup {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a subscription
    pub fn add(&mut self, subscription: Subscription) -> &mut Self {
        self.subscriptions.push(subscription);
        self
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Unsubscribe everything held by the group
    pub fn clear(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}

impl Drop for SubscriptionGroup {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::SubscriptionRegistry;

    #[test]
    fn test_group_unsubscribes_on_drop() {
        let registry = SubscriptionRegistry::new();
        let outside = registry.subscribe("log", |_| Ok(()));
        {
            let mut group = SubscriptionGroup::new();
            group
                .add(registry.subscribe("connected", |_| Ok(())))
                .add(registry.subscribe("log", |_| Ok(())));
            assert_eq!(group.len(), 2);
            assert_eq!(registry.total_listeners(), 3);
        }
        assert_eq!(registry.total_listeners(), 1);
        assert!(outside.is_active());
    }

    #[test]
    fn test_clear_tolerates_already_removed() {
        let registry = SubscriptionRegistry::new();
        let mut group = SubscriptionGroup::new();
        group.add(registry.subscribe("log", |_| Ok(())));
        group.clear();
        group.clear();
        assert!(group.is_empty());
        assert!(registry.is_empty());
    }
}
