//! External credential store seam.
//!
//! The session token and user record are written by the authentication flow
//! elsewhere in the application; this layer only reads them. Connecting is
//! refused when either entry is missing.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;

use crate::error::{RealtimeError, Result};

/// Key under which the session token is stored.
pub const USER_TOKEN_KEY: &str = "userToken";
/// Key under which the JSON-encoded user record is stored.
pub const USER_DATA_KEY: &str = "userData";

/// Read-only view of the application's persistent key-value store.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch a stored value, or `None` when the key is absent.
    async fn get_item(&self, key: &str) -> Option<String>;
}

/// The user record persisted by the authentication flow.
///
/// Only the identity fields matter here; everything else in the record is
/// ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredUser {
    #[serde(rename = "firebaseUserId")]
    pub firebase_user_id: Option<String>,
    pub uid: Option<String>,
}

impl StoredUser {
    /// The external identity string, preferring `firebaseUserId` over `uid`.
    pub fn user_id(&self) -> Option<&str> {
        self.firebase_user_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| self.uid.as_deref().filter(|id| !id.is_empty()))
    }
}

/// Credentials required to open a connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub token: String,
}

/// Load and validate the stored session.
///
/// Fails with a distinct error for each precondition: missing token, missing
/// user record, unparsable record, or a record with no usable id.
pub async fn load_session(store: &dyn CredentialStore) -> Result<Session> {
    let token = store
        .get_item(USER_TOKEN_KEY)
        .await
        .ok_or(RealtimeError::MissingCredential(USER_TOKEN_KEY))?;

    let raw = store
        .get_item(USER_DATA_KEY)
        .await
        .ok_or(RealtimeError::MissingCredential(USER_DATA_KEY))?;

    let user: StoredUser = serde_json::from_str(&raw)?;
    let user_id = user.user_id().ok_or(RealtimeError::MissingUserId)?;

    Ok(Session {
        user_id: user_id.to_string(),
        token,
    })
}

/// In-memory credential store for tests and the probe binary.
#[derive(Default)]
pub struct MemoryCredentialStore {
    items: DashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_item(&self, key: impl Into<String>, value: impl Into<String>) {
        self.items.insert(key.into(), value.into());
    }

    pub fn remove_item(&self, key: &str) {
        self.items.remove(key);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).map(|v| v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(token: Option<&str>, user_data: Option<&str>) -> MemoryCredentialStore {
        let store = MemoryCredentialStore::new();
        if let Some(token) = token {
            store.set_item(USER_TOKEN_KEY, token);
        }
        if let Some(data) = user_data {
            store.set_item(USER_DATA_KEY, data);
        }
        store
    }

    #[tokio::test]
    async fn test_load_session_success() {
        let store = store_with(
            Some("tok-1"),
            Some(r#"{"firebaseUserId":"fb-9","uid":"u-9"}"#),
        );
        let session = load_session(&store).await.unwrap();
        assert_eq!(session.user_id, "fb-9");
        assert_eq!(session.token, "tok-1");
    }

    #[tokio::test]
    async fn test_uid_fallback() {
        let store = store_with(Some("tok-1"), Some(r#"{"uid":"u-9"}"#));
        let session = load_session(&store).await.unwrap();
        assert_eq!(session.user_id, "u-9");
    }

    #[tokio::test]
    async fn test_missing_token() {
        let store = store_with(None, Some(r#"{"uid":"u-9"}"#));
        let err = load_session(&store).await.unwrap_err();
        assert!(matches!(
            err,
            RealtimeError::MissingCredential(USER_TOKEN_KEY)
        ));
    }

    #[tokio::test]
    async fn test_missing_user_record() {
        let store = store_with(Some("tok-1"), None);
        let err = load_session(&store).await.unwrap_err();
        assert!(matches!(err, RealtimeError::MissingCredential(USER_DATA_KEY)));
    }

    #[tokio::test]
    async fn test_malformed_user_record() {
        let store = store_with(Some("tok-1"), Some("not json"));
        let err = load_session(&store).await.unwrap_err();
        assert!(matches!(err, RealtimeError::InvalidUserRecord(_)));
    }

    #[tokio::test]
    async fn test_record_without_id() {
        let store = store_with(Some("tok-1"), Some(r#"{"email":"a@b.c"}"#));
        let err = load_session(&store).await.unwrap_err();
        assert!(matches!(err, RealtimeError::MissingUserId));
    }

    #[test]
    fn test_empty_id_is_unusable() {
        let user = StoredUser {
            firebase_user_id: Some(String::new()),
            uid: None,
        };
        assert!(user.user_id().is_none());
    }
}
