use std::sync::Arc;

use {
    secrecy::{ExposeSecret, Secret},
    serde::Serialize,
    subtle::ConstantTimeEq,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use hookgate_metrics::{api_keys as key_metrics, counter, labels};

use crate::{
    api_key::hash_api_key,
    error::{Error, Result},
    store::ApiKeyStore,
};

/// User ID of the identity behind the process-wide default key.
pub const SYSTEM_USER_ID: &str = "system";

/// Who is making an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// Presented the default key; may act for any user.
    System,
    User {
        user_id: String,
        key_id: String,
        name: String,
    },
}

impl Caller {
    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            Self::System => SYSTEM_USER_ID,
            Self::User { user_id, .. } => user_id,
        }
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }

    /// Whether this caller may read or change resources owned by `owner`.
    #[must_use]
    pub fn can_act_for(&self, owner: &str) -> bool {
        self.is_system() || self.user_id() == owner
    }

    #[must_use]
    pub fn summary(&self) -> CallerSummary {
        match self {
            Self::System => CallerSummary {
                id: SYSTEM_USER_ID.into(),
                name: "System".into(),
            },
            Self::User { user_id, name, .. } => CallerSummary {
                id: user_id.clone(),
                name: if name.is_empty() {
                    "API User".into()
                } else {
                    name.clone()
                },
            },
        }
    }
}

/// `{id, name}` shape returned by key verification.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CallerSummary {
    pub id: String,
    pub name: String,
}

/// Result of looking a key up without failing the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCheck {
    Valid(Caller),
    Expired,
    Unknown,
}

/// Authenticates raw API keys against the default key and the key store.
pub struct ApiKeyGate {
    default_key: Option<Secret<String>>,
    store: Arc<dyn ApiKeyStore>,
}

impl ApiKeyGate {
    pub fn new(default_key: Option<Secret<String>>, store: Arc<dyn ApiKeyStore>) -> Self {
        let default_key = default_key.filter(|k| !k.expose_secret().is_empty());
        if default_key.is_none() {
            debug!("no default API key configured; only stored keys are accepted");
        }
        Self { default_key, store }
    }

    pub fn store(&self) -> &Arc<dyn ApiKeyStore> {
        &self.store
    }

    /// Gate a request carrying `presented` (header or query value).
    pub async fn authenticate(&self, presented: Option<&str>, now_ms: i64) -> Result<Caller> {
        let outcome = match presented.filter(|k| !k.is_empty()) {
            None => Err(Error::Missing),
            Some(key) => match self.check(key, now_ms).await {
                Ok(KeyCheck::Valid(caller)) => Ok(caller),
                Ok(KeyCheck::Expired) => Err(Error::Expired),
                Ok(KeyCheck::Unknown) => Err(Error::Invalid),
                Err(e) => Err(e),
            },
        };
        record(&outcome);
        outcome
    }

    /// Classify a key. A valid stored key has its `last_used_at` updated;
    /// an expired one is left untouched.
    pub async fn check(&self, key: &str, now_ms: i64) -> Result<KeyCheck> {
        if self.is_default_key(key) {
            return Ok(KeyCheck::Valid(Caller::System));
        }

        let record = self
            .store
            .find_by_key(&hash_api_key(key))
            .await
            .map_err(Error::Store)?;
        let Some(record) = record else {
            return Ok(KeyCheck::Unknown);
        };
        if record.is_expired(now_ms) {
            debug!(key_id = %record.id, user_id = %record.user_id, "rejected expired api key");
            return Ok(KeyCheck::Expired);
        }
        self.store
            .touch(&record.id, now_ms)
            .await
            .map_err(Error::Store)?;
        Ok(KeyCheck::Valid(Caller::User {
            user_id: record.user_id,
            key_id: record.id,
            name: record.name,
        }))
    }

    fn is_default_key(&self, key: &str) -> bool {
        self.default_key
            .as_ref()
            .is_some_and(|d| bool::from(d.expose_secret().as_bytes().ct_eq(key.as_bytes())))
    }
}

fn record(outcome: &Result<Caller>) {
    match outcome {
        Ok(_caller) => {
            #[cfg(feature = "metrics")]
            counter!(
                key_metrics::AUTH_SUCCESS_TOTAL,
                labels::METHOD => if _caller.is_system() { "system" } else { "user" }
            )
            .increment(1);
        },
        Err(e) => {
            if let Error::Store(source) = e {
                warn!(error = %source, "api key lookup failed");
            }
            #[cfg(feature = "metrics")]
            counter!(key_metrics::AUTH_FAILURES_TOTAL, labels::REASON => e.reason()).increment(1);
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{api_key::ApiKeyRecord, store::InMemoryApiKeyStore},
        async_trait::async_trait,
    };

    fn gate(store: Arc<dyn ApiKeyStore>) -> ApiKeyGate {
        ApiKeyGate::new(Some(Secret::new("sys-key".into())), store)
    }

    #[tokio::test]
    async fn missing_key() {
        let g = gate(Arc::new(InMemoryApiKeyStore::new()));
        assert!(matches!(g.authenticate(None, 0).await, Err(Error::Missing)));
        assert!(matches!(
            g.authenticate(Some(""), 0).await,
            Err(Error::Missing)
        ));
    }

    #[tokio::test]
    async fn default_key_is_system() {
        let g = gate(Arc::new(InMemoryApiKeyStore::new()));
        let caller = g.authenticate(Some("sys-key"), 0).await.unwrap();
        assert!(caller.is_system());
        assert!(caller.can_act_for("anyone"));
        assert_eq!(caller.user_id(), "system");
    }

    #[tokio::test]
    async fn empty_default_key_is_ignored() {
        let g = ApiKeyGate::new(
            Some(Secret::new(String::new())),
            Arc::new(InMemoryApiKeyStore::new()),
        );
        assert!(matches!(
            g.authenticate(Some("x"), 0).await,
            Err(Error::Invalid)
        ));
    }

    #[tokio::test]
    async fn stored_key_touches_last_used() {
        let store = Arc::new(InMemoryApiKeyStore::new());
        let (record, raw) = ApiKeyRecord::mint("u1", Some("ci".into()), None, 1);
        store.create(record.clone()).await.unwrap();
        let g = gate(store.clone());

        let caller = g.authenticate(Some(&raw), 77).await.unwrap();
        assert_eq!(caller.user_id(), "u1");
        assert!(caller.can_act_for("u1"));
        assert!(!caller.can_act_for("u2"));
        assert_eq!(
            store.get(&record.id).await.unwrap().unwrap().last_used_at,
            Some(77)
        );
    }

    #[tokio::test]
    async fn expired_key_is_rejected_without_touch() {
        let store = Arc::new(InMemoryApiKeyStore::new());
        let (record, raw) = ApiKeyRecord::mint("u1", None, Some(10), 1);
        store.create(record.clone()).await.unwrap();
        let g = gate(store.clone());

        let err = g.authenticate(Some(&raw), 11).await.unwrap_err();
        assert!(matches!(err, Error::Expired));
        assert_eq!(err.public_message(), "API key has expired");
        assert!(
            store
                .get(&record.id)
                .await
                .unwrap()
                .unwrap()
                .last_used_at
                .is_none()
        );
    }

    #[tokio::test]
    async fn unknown_key_is_invalid() {
        let g = gate(Arc::new(InMemoryApiKeyStore::new()));
        let err = g.authenticate(Some("sk_nope"), 0).await.unwrap_err();
        assert_eq!(err.public_message(), "Invalid API key");
    }

    struct BrokenStore;

    #[async_trait]
    impl ApiKeyStore for BrokenStore {
        async fn create(&self, _: ApiKeyRecord) -> anyhow::Result<()> {
            anyhow::bail!("down")
        }

        async fn find_by_key(&self, _: &str) -> anyhow::Result<Option<ApiKeyRecord>> {
            anyhow::bail!("down")
        }

        async fn get(&self, _: &str) -> anyhow::Result<Option<ApiKeyRecord>> {
            anyhow::bail!("down")
        }

        async fn list_for_user(&self, _: &str) -> anyhow::Result<Vec<ApiKeyRecord>> {
            anyhow::bail!("down")
        }

        async fn touch(&self, _: &str, _: i64) -> anyhow::Result<()> {
            anyhow::bail!("down")
        }

        async fn delete(&self, _: &str) -> anyhow::Result<bool> {
            anyhow::bail!("down")
        }
    }

    #[tokio::test]
    async fn store_failure_is_generic() {
        let g = gate(Arc::new(BrokenStore));
        let err = g.authenticate(Some("sk_x"), 0).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert_eq!(err.public_message(), "Authentication failed");
        // the default key never touches the store
        assert!(g.authenticate(Some("sys-key"), 0).await.is_ok());
    }

    #[test]
    fn summary_names() {
        assert_eq!(Caller::System.summary().name, "System");
        let user = Caller::User {
            user_id: "u".into(),
            key_id: "k".into(),
            name: String::new(),
        };
        assert_eq!(user.summary().name, "API User");
    }
}
