//! Subscription matching.
//!
//! A subscription matches a query when all three hold:
//! - it shares at least one event with the query,
//! - the query has no scopes, or it shares at least one scope,
//! - every one of its tags is among the query's tags.
//!
//! The tag rule is a subset test in the subscription-to-query direction: an
//! untagged subscription matches any query, and a tagged one only matches
//! when the caller names all of its tags.

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::types::Subscription;

/// Filters applied by [`SubscriptionStore::get_by_query`](crate::SubscriptionStore::get_by_query).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionQuery {
    pub events: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl SubscriptionQuery {
    /// # Errors
    ///
    /// [`RegistryError::Validation`] when `events` is empty; an empty event
    /// list never means "everything".
    pub fn new<I, E>(events: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
    {
        let events: Vec<String> = events.into_iter().map(Into::into).collect();
        if events.is_empty() {
            return Err(RegistryError::Validation {
                field: "events",
                message: "query requires at least one event".to_string(),
            });
        }
        Ok(Self {
            events,
            tags: Vec::new(),
            scopes: Vec::new(),
        })
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn matches(&self, subscription: &Subscription) -> bool {
        event_match(subscription, &self.events)
            && tag_match(subscription, &self.tags)
            && scope_match(subscription, &self.scopes)
    }
}

pub fn event_match(subscription: &Subscription, events: &[String]) -> bool {
    subscription.events.iter().any(|e| events.contains(e))
}

pub fn scope_match(subscription: &Subscription, scopes: &[String]) -> bool {
    scopes.is_empty() || subscription.scopes.iter().any(|s| scopes.contains(s))
}

pub fn tag_match(subscription: &Subscription, tags: &[String]) -> bool {
    subscription.tags.iter().all(|t| tags.contains(t))
}

/// Matching subset in input order. Never fails; no match is an empty vec.
pub fn match_subscriptions<'a, I>(subscriptions: I, query: &SubscriptionQuery) -> Vec<Subscription>
where
    I: IntoIterator<Item = &'a Subscription>,
{
    subscriptions
        .into_iter()
        .filter(|s| query.matches(s))
        .cloned()
        .collect()
}
