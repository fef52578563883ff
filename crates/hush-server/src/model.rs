use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bounds on `max_views`, fixed at creation.
pub const MIN_VIEWS: u32 = 1;
pub const MAX_VIEWS: u32 = 100;

/// The persisted unit. Both backends store its JSON serialization; field
/// names stay camelCase because that is the wire format clients already
/// speak. The server never interprets `encrypted_content` or `iv` beyond
/// passing them through; the decryption key only ever exists client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRecord {
    pub id: String,
    /// Display label, plaintext. Empty when the creator gave none.
    #[serde(default)]
    pub title: String,
    /// Opaque base64 ciphertext blob.
    pub encrypted_content: String,
    /// Base64 nonce paired 1:1 with `encrypted_content`.
    pub iv: String,
    /// Absolute expiry. Immutable after creation; accesses never extend it.
    pub expires_at: DateTime<Utc>,
    pub max_views: u32,
    /// Server-authoritative access counter, starts at 0.
    pub current_views: u32,
    pub require_password: bool,
    /// Keyed digest of the access password. Never the encryption key.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ShareRecord {
    /// True once the logical expiry has passed. Authoritative even where a
    /// backend's own TTL was clamped to a different value.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whole seconds left until expiry, or `None` once non-positive.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Option<u64> {
        ttl_until(self.expires_at, now)
    }

    /// Everything a viewer may see, ciphertext included. The password hash
    /// stays behind.
    pub fn public_view(&self) -> PublicShareView {
        PublicShareView {
            id: self.id.clone(),
            title: self.title.clone(),
            encrypted_content: self.encrypted_content.clone(),
            iv: self.iv.clone(),
            expires_at: self.expires_at,
            max_views: self.max_views,
            current_views: self.current_views,
            require_password: self.require_password,
        }
    }

    /// Pre-access projection: no ciphertext, no iv.
    pub fn metadata(&self) -> ShareMetadata {
        ShareMetadata {
            id: self.id.clone(),
            title: self.title.clone(),
            expires_at: self.expires_at,
            max_views: self.max_views,
            current_views: self.current_views,
            require_password: self.require_password,
        }
    }
}

/// Returned by a successful access. Decryption is the caller's problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicShareView {
    pub id: String,
    pub title: String,
    pub encrypted_content: String,
    pub iv: String,
    pub expires_at: DateTime<Utc>,
    pub max_views: u32,
    pub current_views: u32,
    pub require_password: bool,
}

/// Returned by metadata lookups, e.g. to render a countdown or a password
/// prompt before a view is spent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareMetadata {
    pub id: String,
    pub title: String,
    pub expires_at: DateTime<Utc>,
    pub max_views: u32,
    pub current_views: u32,
    pub require_password: bool,
}

/// Fixed set of expiration windows offered at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    FifteenMinutes,
    OneHour,
    TwentyFourHours,
    SevenDays,
}

impl Expiration {
    /// Resolve a label like `"15m"` or `"7d"`. Unrecognized labels fall back
    /// to one hour rather than erroring.
    pub fn parse(label: &str) -> Self {
        match label {
            "15m" => Self::FifteenMinutes,
            "1h" => Self::OneHour,
            "24h" => Self::TwentyFourHours,
            "7d" => Self::SevenDays,
            _ => Self::OneHour,
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            Self::FifteenMinutes => Duration::minutes(15),
            Self::OneHour => Duration::hours(1),
            Self::TwentyFourHours => Duration::hours(24),
            Self::SevenDays => Duration::days(7),
        }
    }
}

/// How share ids are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkType {
    /// UUID v4, the unguessability default.
    #[default]
    Standard,
    /// 6 random bytes, URL-safe base64 (8 chars, ~48 bits). Opt-in for
    /// links that must stay short.
    Shorter,
}

impl LinkType {
    /// Only `"shorter"` opts into compact ids; any other label means
    /// standard.
    pub fn parse(label: &str) -> Self {
        if label == "shorter" {
            Self::Shorter
        } else {
            Self::Standard
        }
    }
}

/// Draw a new share id from the OS random source.
pub fn generate_share_id(link_type: LinkType) -> String {
    match link_type {
        LinkType::Standard => Uuid::new_v4().to_string(),
        LinkType::Shorter => {
            let mut bytes = [0u8; 6];
            OsRng.fill_bytes(&mut bytes);
            URL_SAFE_NO_PAD.encode(bytes)
        }
    }
}

/// Whole seconds between `now` and `expires_at`, truncated. `None` once the
/// deadline is not strictly in the future.
pub fn ttl_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<u64> {
    let secs = (expires_at - now).num_seconds();
    (secs > 0).then_some(secs as u64)
}
