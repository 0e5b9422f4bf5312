use {
    anyhow::Result,
    clap::Subcommand,
    hookgate_auth::{ApiKeyRecord, ApiKeyStore},
    hookgate_common::time::{now_ms, parse_rfc3339, to_rfc3339},
};

#[derive(Subcommand)]
pub enum KeyAction {
    /// Mint an API key for a user. The raw key is printed once.
    Create {
        /// Owner of the key.
        #[arg(long)]
        user: String,
        /// Label shown in listings (e.g. "CI pipeline").
        #[arg(long)]
        name: Option<String>,
        /// Expiry as an RFC 3339 timestamp.
        #[arg(long)]
        expires_at: Option<String>,
    },
    /// List a user's keys (masked).
    List {
        #[arg(long)]
        user: String,
    },
    /// Revoke a key by id.
    Revoke { id: String },
}

pub async fn handle_keys(action: KeyAction, store: &dyn ApiKeyStore) -> Result<()> {
    match action {
        KeyAction::Create {
            user,
            name,
            expires_at,
        } => {
            let (record, raw_key) =
                create_key(store, user, name, expires_at.as_deref(), now_ms()).await?;
            println!("API key created successfully!");
            println!();
            println!("  ID:      {}", record.id);
            println!("  User:    {}", record.user_id);
            println!("  Name:    {}", record.name);
            println!(
                "  Expires: {}",
                record.expires_at.map_or_else(|| "never".into(), to_rfc3339)
            );
            println!();
            println!("Key (save this now, it won't be shown again):");
            println!();
            println!("  {raw_key}");
            println!();
            Ok(())
        },
        KeyAction::List { user } => {
            let keys = store.list_for_user(&user).await?;
            if keys.is_empty() {
                println!("No API keys for {user}.");
            }
            for key in &keys {
                println!("{}", key_line(key));
            }
            Ok(())
        },
        KeyAction::Revoke { id } => {
            if !store.delete(&id).await? {
                anyhow::bail!("no API key with id {id}");
            }
            println!("Revoked API key {id}.");
            Ok(())
        },
    }
}

async fn create_key(
    store: &dyn ApiKeyStore,
    user: String,
    name: Option<String>,
    expires_at: Option<&str>,
    now: i64,
) -> Result<(ApiKeyRecord, String)> {
    if user.trim().is_empty() {
        anyhow::bail!("--user must not be empty");
    }
    let expires_at = match expires_at {
        Some(raw) => Some(
            parse_rfc3339(raw)
                .ok_or_else(|| anyhow::anyhow!("--expires-at must be an RFC 3339 timestamp"))?,
        ),
        None => None,
    };
    let (record, raw_key) = ApiKeyRecord::mint(user, name, expires_at, now);
    store.create(record.clone()).await?;
    Ok((record, raw_key))
}

fn key_line(key: &ApiKeyRecord) -> String {
    let view = key.view();
    format!(
        "  {}  {}  {}  last used: {}  expires: {}",
        view.id,
        view.masked_key,
        view.name,
        view.last_used_at.as_deref().unwrap_or("never"),
        view.expires_at.as_deref().unwrap_or("never"),
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, hookgate_auth::InMemoryApiKeyStore};

    #[tokio::test]
    async fn create_stores_the_hash_only() {
        let store = InMemoryApiKeyStore::new();
        let (record, raw) = create_key(
            &store,
            "u1".into(),
            Some("ci".into()),
            Some("2030-01-01T00:00:00Z"),
            1_000,
        )
        .await
        .unwrap();

        assert!(raw.starts_with("sk_"));
        assert_ne!(record.key_hash, raw);
        assert!(record.expires_at.is_some());
        let listed = store.list_for_user("u1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(key_line(&listed[0]).contains("ci"));
        assert!(!key_line(&listed[0]).contains(&raw));
    }

    #[tokio::test]
    async fn bad_input_is_refused() {
        let store = InMemoryApiKeyStore::new();
        assert!(
            create_key(&store, " ".into(), None, None, 0)
                .await
                .is_err()
        );
        assert!(
            create_key(&store, "u1".into(), None, Some("soon"), 0)
                .await
                .is_err()
        );
        assert!(store.list_for_user("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn revoking_unknown_key_fails() {
        let store = InMemoryApiKeyStore::new();
        let result = handle_keys(KeyAction::Revoke { id: "nope".into() }, &store).await;
        assert!(result.is_err());
    }
}
