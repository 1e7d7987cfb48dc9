//! Subscription management for inbound messages and lifecycle events
//!
//! This module handles:
//! - Registering listeners per message kind with set semantics
//! - Idempotent unsubscribe capabilities
//! - Isolated fan-out so one failing listener cannot affect the others
//! - Teardown scopes that drop a component's subscriptions together

mod group;
mod registry;

pub use group::SubscriptionGroup;
pub use registry::{Listener, ListenerFn, Subscription, SubscriptionRegistry};
