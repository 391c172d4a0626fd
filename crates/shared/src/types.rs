//! Common types used across Fieldform

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Metadata value meaning "no cap" in billing provider product/price metadata.
pub const UNLIMITED_SENTINEL: &str = "unlimited";

/// Product metadata key that marks a product as a recurring add-on rather
/// than a plan.
pub const PRODUCT_TYPE_KEY: &str = "product_type";

// =============================================================================
// Limit values
// =============================================================================

/// A resource limit value: either a finite cap or the unlimited sentinel.
///
/// `Unlimited` orders above every finite value, so merge steps that may only
/// raise a limit can use plain comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitAmount {
    Unlimited,
    Finite(u64),
}

impl LimitAmount {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

impl Ord for LimitAmount {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Unlimited, Self::Unlimited) => Ordering::Equal,
            (Self::Unlimited, Self::Finite(_)) => Ordering::Greater,
            (Self::Finite(_), Self::Unlimited) => Ordering::Less,
            (Self::Finite(a), Self::Finite(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for LimitAmount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for LimitAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unlimited => write!(f, "{UNLIMITED_SENTINEL}"),
            Self::Finite(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for LimitAmount {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == UNLIMITED_SENTINEL {
            Ok(Self::Unlimited)
        } else {
            s.trim().parse().map(Self::Finite)
        }
    }
}

// The billing API serializes a limit as either a JSON number or the literal
// string "unlimited", so (de)serialization is written out by hand.
impl Serialize for LimitAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unlimited => serializer.serialize_str(UNLIMITED_SENTINEL),
            Self::Finite(n) => serializer.serialize_u64(*n),
        }
    }
}

impl<'de> Deserialize<'de> for LimitAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self::Finite(n)),
            Raw::Text(s) => s
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("invalid limit value: {s:?}"))),
        }
    }
}

/// The four limit fields recognized in billing provider metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitField {
    Submissions,
    NlpSeconds,
    NlpCharacters,
    StorageBytes,
}

impl LimitField {
    /// The metadata key used for this field in product/price metadata, which
    /// matches the field name in the serialized `AccountLimit`.
    pub fn metadata_key(&self) -> &'static str {
        match self {
            Self::Submissions => "submission_limit",
            Self::NlpSeconds => "nlp_seconds_limit",
            Self::NlpCharacters => "nlp_character_limit",
            Self::StorageBytes => "storage_bytes_limit",
        }
    }

    /// Reverse lookup; metadata keys that match no field return `None` and
    /// are dropped by every merge step.
    pub fn from_metadata_key(key: &str) -> Option<Self> {
        match key {
            "submission_limit" => Some(Self::Submissions),
            "nlp_seconds_limit" => Some(Self::NlpSeconds),
            "nlp_character_limit" => Some(Self::NlpCharacters),
            "storage_bytes_limit" => Some(Self::StorageBytes),
            _ => None,
        }
    }
}

/// Effective resource limits for an account.
///
/// Every field is always present: a missing override simply leaves the
/// default (unlimited) in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLimit {
    pub submission_limit: LimitAmount,
    pub nlp_seconds_limit: LimitAmount,
    pub nlp_character_limit: LimitAmount,
    pub storage_bytes_limit: LimitAmount,
}

impl Default for AccountLimit {
    fn default() -> Self {
        Self {
            submission_limit: LimitAmount::Unlimited,
            nlp_seconds_limit: LimitAmount::Unlimited,
            nlp_character_limit: LimitAmount::Unlimited,
            storage_bytes_limit: LimitAmount::Unlimited,
        }
    }
}

impl AccountLimit {
    pub fn get(&self, field: LimitField) -> LimitAmount {
        match field {
            LimitField::Submissions => self.submission_limit,
            LimitField::NlpSeconds => self.nlp_seconds_limit,
            LimitField::NlpCharacters => self.nlp_character_limit,
            LimitField::StorageBytes => self.storage_bytes_limit,
        }
    }

    pub fn set(&mut self, field: LimitField, value: LimitAmount) {
        match field {
            LimitField::Submissions => self.submission_limit = value,
            LimitField::NlpSeconds => self.nlp_seconds_limit = value,
            LimitField::NlpCharacters => self.nlp_character_limit = value,
            LimitField::StorageBytes => self.storage_bytes_limit = value,
        }
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Billing provider subscription lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Trialing,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Unpaid,
    Paused,
}

impl SubscriptionStatus {
    /// Whether this status currently entitles the account to the
    /// subscription's metadata. Past-due subscriptions keep their
    /// entitlements until the provider cancels them.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active | Self::PastDue | Self::Trialing)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::PastDue => write!(f, "past_due"),
            Self::Trialing => write!(f, "trialing"),
            Self::Canceled => write!(f, "canceled"),
            Self::Incomplete => write!(f, "incomplete"),
            Self::IncompleteExpired => write!(f, "incomplete_expired"),
            Self::Unpaid => write!(f, "unpaid"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Billing interval of a recurring price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecurringInterval {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

/// Recurrence details of a price; absent for one-time prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurring {
    pub interval: RecurringInterval,
}

/// Product summary embedded in a subscription item's price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ProductInfo {
    /// Whether the product is sold as a recurring add-on rather than a plan.
    pub fn is_addon(&self) -> bool {
        self.metadata
            .get(PRODUCT_TYPE_KEY)
            .is_some_and(|v| v == "addon")
    }
}

/// Price attached to a subscription item, with its parent product inlined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPrice {
    pub id: String,
    pub product: ProductInfo,
    pub recurring: Option<Recurring>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A single line item on a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionItem {
    pub price: SubscriptionPrice,
}

/// A subscription (plan or recurring add-on) as returned by the billing API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub status: SubscriptionStatus,
    pub items: Vec<SubscriptionItem>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Whether this subscription is a recurring add-on, judged from its
    /// first item's product metadata.
    pub fn is_addon(&self) -> bool {
        self.items.first().is_some_and(|item| item.price.product.is_addon())
    }

    /// Combined metadata of the first item: product metadata first, then
    /// price metadata, so price-level values win on key collisions. A
    /// subscription with no items yields empty metadata.
    pub fn merged_metadata(&self) -> HashMap<String, String> {
        let mut merged = HashMap::new();
        if let Some(item) = self.items.first() {
            merged.extend(item.price.product.metadata.clone());
            merged.extend(item.price.metadata.clone());
        }
        merged
    }
}

// =============================================================================
// Product catalog
// =============================================================================

/// A catalog price from the products listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub id: String,
    /// Price in the currency's minor unit; `None` for metered prices.
    pub unit_amount: Option<i64>,
    pub recurring: Option<Recurring>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Price {
    /// Whether this is the zero-cost monthly price that identifies the free
    /// plan product.
    pub fn is_free_monthly(&self) -> bool {
        self.unit_amount == Some(0)
            && self
                .recurring
                .is_some_and(|r| r.interval == RecurringInterval::Month)
    }
}

/// A billable product with its prices, from the products listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub prices: Vec<Price>,
}

// =============================================================================
// Environment configuration
// =============================================================================

/// Free-tier limit overrides from the environment endpoint. A threshold that
/// is absent or zero is unconfigured and leaves the computed limit untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeTierThresholds {
    /// Storage cap in bytes.
    pub storage: Option<u64>,
    /// Submission count cap.
    pub data: Option<u64>,
    /// Translation character cap.
    pub translation_chars: Option<u64>,
    /// Transcription cap, configured in minutes.
    pub transcription_minutes: Option<u64>,
}

impl FreeTierThresholds {
    fn configured(value: Option<u64>) -> Option<u64> {
        value.filter(|n| *n > 0)
    }

    pub fn storage_bytes(&self) -> Option<u64> {
        Self::configured(self.storage)
    }

    pub fn submissions(&self) -> Option<u64> {
        Self::configured(self.data)
    }

    pub fn translation_chars(&self) -> Option<u64> {
        Self::configured(self.translation_chars)
    }

    /// Transcription threshold converted from minutes to seconds.
    pub fn transcription_seconds(&self) -> Option<u64> {
        Self::configured(self.transcription_minutes).map(|minutes| minutes * 60)
    }
}

/// Static environment configuration served by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Publishable key of the billing provider; absent when billing is not
    /// set up for this deployment.
    pub stripe_public_key: Option<String>,
    #[serde(default)]
    pub free_tier_thresholds: FreeTierThresholds,
}

impl EnvironmentConfig {
    pub fn billing_enabled(&self) -> bool {
        self.stripe_public_key.is_some()
    }
}

// =============================================================================
// API envelopes
// =============================================================================

/// Paginated list envelope used by the platform REST API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Response of the checkout and customer-portal endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub url: String,
}

/// Response of the change-plan endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePlan {
    pub status: String,
    /// Set when the change requires completing a checkout session.
    pub url: Option<String>,
}
