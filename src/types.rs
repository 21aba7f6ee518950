use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::error::{DeliveryError, RegistryError};
use crate::transport::TransportResponse;

/// Unique identifier for a subscription.
///
/// Strongly-typed wrapper so subscription ids are not mixed up with
/// event names, tags or scopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SubscriptionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Delivery target split into a base and a relative part.
///
/// The final target is the plain concatenation `base + relative_uri`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionUrl {
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub relative_uri: String,
}

impl SubscriptionUrl {
    pub fn new(base: impl Into<String>, relative_uri: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            relative_uri: relative_uri.into(),
        }
    }

    /// Full URL deliveries are posted to.
    pub fn target(&self) -> String {
        format!("{}{}", self.base, self.relative_uri)
    }
}

/// A registered interest in one or more events.
///
/// Records are created by the registry only; the signature token is
/// generated server-side and never taken from caller input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: SubscriptionId,
    pub url: SubscriptionUrl,
    pub events: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
    pub signature_token: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Subscription {
    /// Build a stored record from a validated creation request.
    pub(crate) fn from_new(new: NewSubscription) -> Self {
        let now = Utc::now();
        Self {
            id: SubscriptionId::generate(),
            url: new.url,
            events: dedup(new.events),
            tags: dedup(new.tags),
            scopes: dedup(new.scopes),
            meta: new.meta,
            signature_token: generate_signature_token(),
            created: now,
            modified: now,
        }
    }

    /// Full URL deliveries for this subscription are posted to.
    pub fn target_url(&self) -> String {
        self.url.target()
    }
}

/// Caller-supplied description of a subscription to create.
///
/// Deserializes leniently (missing fields become empty) so that
/// [`NewSubscription::validate`] can name the offending field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewSubscription {
    pub url: SubscriptionUrl,
    pub events: Vec<String>,
    pub tags: Vec<String>,
    pub scopes: Vec<String>,
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl NewSubscription {
    pub fn new<I, E>(base: impl Into<String>, relative_uri: impl Into<String>, events: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
    {
        Self {
            url: SubscriptionUrl::new(base, relative_uri),
            events: events.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scopes<I, T>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Check required fields.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Validation`] naming `url` when either URL part is
    /// blank, or `events` when no (non-blank) event is given.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.url.base.trim().is_empty() || self.url.relative_uri.trim().is_empty() {
            return Err(RegistryError::Validation {
                field: "url",
                message: "missing or malformed url parameter on webhook object".to_string(),
            });
        }
        if self.events.is_empty() {
            return Err(RegistryError::Validation {
                field: "events",
                message: "events parameter requires at least one event".to_string(),
            });
        }
        if self.events.iter().any(|e| e.trim().is_empty()) {
            return Err(RegistryError::Validation {
                field: "events",
                message: "event names must not be blank".to_string(),
            });
        }
        Ok(())
    }
}

/// Optional filters for [`Registry::tell`](crate::Registry::tell).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TellOptions {
    pub tags: Vec<String>,
    pub scopes: Vec<String>,
}

impl TellOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scopes<I, T>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Success,
    Failure,
}

/// Settled result of delivering one event to one subscription.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub subscription_id: SubscriptionId,
    pub result: Result<TransportResponse, DeliveryError>,
}

impl DeliveryOutcome {
    pub fn status(&self) -> DeliveryStatus {
        if self.result.is_ok() {
            DeliveryStatus::Success
        } else {
            DeliveryStatus::Failure
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn response(&self) -> Option<&TransportResponse> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&DeliveryError> {
        self.result.as_ref().err()
    }
}

/// Aggregate returned by [`Registry::tell`](crate::Registry::tell).
///
/// `outcomes` follows the order the subscriptions were matched in, not the
/// order deliveries completed.
#[derive(Debug, Clone)]
pub struct TellResult {
    pub msg: String,
    pub matched_count: usize,
    pub subscription_ids: Vec<SubscriptionId>,
    pub outcomes: Vec<DeliveryOutcome>,
}

impl TellResult {
    pub fn empty() -> Self {
        Self::from_outcomes(Vec::new())
    }

    pub(crate) fn from_outcomes(outcomes: Vec<DeliveryOutcome>) -> Self {
        let subscription_ids: Vec<SubscriptionId> =
            outcomes.iter().map(|o| o.subscription_id.clone()).collect();
        Self {
            msg: format!("Triggered {} webhook(s)", outcomes.len()),
            matched_count: outcomes.len(),
            subscription_ids,
            outcomes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matched_count == 0
    }

    pub fn successes(&self) -> impl Iterator<Item = &DeliveryOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &DeliveryOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// Random shared secret: hex SHA-1 of a fresh v4 UUID.
pub(crate) fn generate_signature_token() -> String {
    let seed = Uuid::new_v4().to_string();
    hex::encode(Sha1::digest(seed.as_bytes()))
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}
