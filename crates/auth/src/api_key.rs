use {
    hookgate_common::time::to_rfc3339,
    rand::RngCore,
    serde::Serialize,
    sha2::{Digest, Sha256},
};

/// Prefix of every minted key.
pub const KEY_PREFIX: &str = "sk_";

const KEY_RANDOM_BYTES: usize = 24;

/// A stored API key. The raw key itself is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRecord {
    pub id: String,
    pub user_id: String,
    /// SHA-256 hex digest of the raw key.
    pub key_hash: String,
    /// `sk_xxxxx...yyyy` display form.
    pub masked_key: String,
    pub name: String,
    /// Unix milliseconds.
    pub created_at: i64,
    pub last_used_at: Option<i64>,
    pub expires_at: Option<i64>,
}

impl ApiKeyRecord {
    /// Mint a fresh key for `user_id`. Returns the record and the raw key,
    /// which the caller must hand out now or never.
    #[must_use]
    pub fn mint(
        user_id: impl Into<String>,
        name: Option<String>,
        expires_at: Option<i64>,
        now_ms: i64,
    ) -> (Self, String) {
        let raw = generate_api_key();
        let record = Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            key_hash: hash_api_key(&raw),
            masked_key: mask_api_key(&raw),
            name: name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "API Key".into()),
            created_at: now_ms,
            last_used_at: None,
            expires_at,
        };
        (record, raw)
    }

    /// Expired once `expires_at` is strictly in the past.
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|at| at < now_ms)
    }

    #[must_use]
    pub fn view(&self) -> ApiKeyView {
        ApiKeyView {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            masked_key: self.masked_key.clone(),
            created_at: to_rfc3339(self.created_at),
            last_used_at: self.last_used_at.map(to_rfc3339),
            expires_at: self.expires_at.map(to_rfc3339),
        }
    }
}

/// Listing form of a key.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyView {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub masked_key: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub expires_at: Option<String>,
}

/// `sk_` followed by 48 lowercase hex characters from the OS RNG.
#[must_use]
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; KEY_RANDOM_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    format!("{KEY_PREFIX}{}", hex::encode(bytes))
}

#[must_use]
pub fn hash_api_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// First eight and last four characters, e.g. `sk_1a2b3...9f0e`.
#[must_use]
pub fn mask_api_key(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
