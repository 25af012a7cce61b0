// transcript-service-rs/src/bypass.rs
//
// Administrator-issued bypass tokens
// Provides:
// - Time-boxed token issuance stored as bp:<token> sentinels
// - Explicit revocation
//
// Presence of the sentinel in the store is the sole authority for bypass;
// authorization of the caller is the admin gate's job, not this module's.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::quota_store::{KeyValueStore, StoreError};

pub const DEFAULT_TTL_HOURS: i64 = 12;

/// 256 bits of randomness, URL-safe encoded.
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct IssuedBypass {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub ttl_seconds: i64,
}

pub struct BypassTokenManager {
    store: Option<Arc<dyn KeyValueStore>>,
}

impl BypassTokenManager {
    pub fn new(store: Option<Arc<dyn KeyValueStore>>) -> Self {
        Self { store }
    }

    fn store(&self) -> Result<&Arc<dyn KeyValueStore>, StoreError> {
        self.store
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("quota store not configured".to_string()))
    }

    fn generate_token() -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Issue a fresh token valid for `ttl_hours` (default 12).
    pub async fn issue(&self, ttl_hours: Option<i64>) -> Result<IssuedBypass, StoreError> {
        let store = self.store()?;
        let ttl_hours = ttl_hours.unwrap_or(DEFAULT_TTL_HOURS).max(1);
        let ttl_seconds = ttl_hours * 3600;

        let token = Self::generate_token();
        store
            .set_with_expiry(&format!("bp:{}", token), "1", ttl_seconds)
            .await?;

        Ok(IssuedBypass {
            token,
            expires_at: Utc::now() + Duration::seconds(ttl_seconds),
            ttl_seconds,
        })
    }

    /// Delete a token. Returns whether it was present.
    pub async fn revoke(&self, token: &str) -> Result<bool, StoreError> {
        let store = self.store()?;
        store.delete(&format!("bp:{}", token)).await
    }
}
