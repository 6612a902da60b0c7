//! Credential storage for linked Glass users
//!
//! Manages a JSON file mapping identity ids to the OAuth tokens and verify
//! token captured when the user connected. All writes use atomic temp-file +
//! rename to prevent corruption on crash. A tokio Mutex serializes writes.
//!
//! A record's presence means the identity is linked. Records are only ever
//! inserted, never updated: `insert_new` refuses to overwrite an existing one.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Stored credentials for one linked identity.
///
/// `expires` is a unix timestamp in milliseconds (absolute, not a delta),
/// zero when the token endpoint did not report a lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Bearer token for timeline API calls
    pub access_token: String,
    /// Long-lived grant for obtaining new access tokens
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Secret handed to the timeline API to authenticate its callbacks
    pub verify_token: String,
    /// Expiration as unix timestamp in milliseconds
    #[serde(default)]
    pub expires: u64,
}

/// Keyed get/put access to credential records.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn CredentialRepository>`).
pub trait CredentialRepository: Send + Sync {
    /// Look up the record for `identity_id`.
    fn get<'a>(
        &'a self,
        identity_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CredentialRecord>>> + Send + 'a>>;

    /// Store a record for an identity that has none yet.
    ///
    /// Returns `Error::AlreadyExists` without touching the stored record when
    /// the identity is already linked.
    fn put<'a>(
        &'a self,
        identity_id: &'a str,
        record: CredentialRecord,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Credential records persisted as one JSON object keyed by identity id.
pub struct CredentialStore {
    path: PathBuf,
    state: Mutex<HashMap<String, CredentialRecord>>,
}

impl CredentialStore {
    /// Open the store at `path`, creating an empty `{}` file on first run.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let records: HashMap<String, CredentialRecord> = serde_json::from_str(&contents)
                    .map_err(|e| {
                        Error::CredentialParse(format!("{}: {e}", path.display()))
                    })?;
                info!(path = %path.display(), users = records.len(), "loaded credentials");
                records
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no credential file yet, no users linked");
                let records = HashMap::new();
                write_atomic(&path, &records).await?;
                records
            }
            Err(e) => return Err(io_error("reading", &path, e)),
        };

        Ok(Self {
            path,
            state: Mutex::new(records),
        })
    }

    /// Get a clone of the record for `identity_id`.
    pub async fn record(&self, identity_id: &str) -> Option<CredentialRecord> {
        let state = self.state.lock().await;
        state.get(identity_id).cloned()
    }

    /// Insert a record for an unlinked identity and persist to disk.
    ///
    /// The existence check and the insert happen under one lock, so two
    /// racing connects for the same identity store exactly one record.
    pub async fn insert_new(&self, identity_id: &str, record: CredentialRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.contains_key(identity_id) {
            return Err(Error::AlreadyExists(identity_id.to_string()));
        }
        state.insert(identity_id.to_string(), record);
        if let Err(e) = write_atomic(&self.path, &state).await {
            // Keep memory consistent with disk when the write fails
            state.remove(identity_id);
            return Err(e);
        }
        debug!(identity_id, "stored credentials");
        Ok(())
    }

    /// Number of linked identities.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.len()
    }

    /// Whether no identity is linked.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl CredentialRepository for CredentialStore {
    fn get<'a>(
        &'a self,
        identity_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CredentialRecord>>> + Send + 'a>> {
        Box::pin(async move { Ok(self.record(identity_id).await) })
    }

    fn put<'a>(
        &'a self,
        identity_id: &'a str,
        record: CredentialRecord,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.insert_new(identity_id, record))
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> Error {
    Error::Io(format!("{action} {}: {err}", path.display()))
}

/// Replace the credential file with `records` in one step.
///
/// The JSON goes to a sibling temp file, is restricted to mode 0600 on unix,
/// and is then renamed over `path`; readers never observe a partial file.
async fn write_atomic(path: &Path, records: &HashMap<String, CredentialRecord>) -> Result<()> {
    let json = serde_json::to_vec_pretty(records)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let Some(dir) = path.parent() else {
        return Err(Error::Io(format!("{} has no parent directory", path.display())));
    };
    let staging = dir.join(format!(".glass-credentials.{}.tmp", std::process::id()));

    tokio::fs::write(&staging, &json)
        .await
        .map_err(|e| io_error("writing", &staging, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| io_error("restricting", &staging, e))?;
    }

    tokio::fs::rename(&staging, path)
        .await
        .map_err(|e| io_error("replacing", path, e))?;

    debug!(path = %path.display(), users = records.len(), "credential file written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_record(suffix: &str) -> CredentialRecord {
        CredentialRecord {
            access_token: format!("ya29.{suffix}"),
            refresh_token: Some(format!("1//{suffix}")),
            verify_token: format!("verify{suffix}"),
            expires: 1735500000000,
        }
    }

    #[tokio::test]
    async fn stored_record_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = CredentialStore::load(path.clone()).await.unwrap();
        store.insert_new("108", test_record("1")).await.unwrap();

        let store2 = CredentialStore::load(path).await.unwrap();
        let record = store2.record("108").await.unwrap();
        assert_eq!(record, test_record("1"));
    }

    #[tokio::test]
    async fn first_run_writes_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        assert!(!path.exists());
        let store = CredentialStore::load(path.clone()).await.unwrap();
        assert!(store.is_empty().await);
        assert!(path.exists());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: HashMap<String, CredentialRecord> = serde_json::from_str(&contents).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn insert_new_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::load(dir.path().join("credentials.json"))
            .await
            .unwrap();

        store.insert_new("108", test_record("first")).await.unwrap();
        let err = store
            .insert_new("108", test_record("second"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AlreadyExists(ref id) if id == "108"));
        assert_eq!(store.record("108").await.unwrap(), test_record("first"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn repository_trait_delegates_to_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::load(dir.path().join("credentials.json"))
            .await
            .unwrap();
        let repo: &dyn CredentialRepository = &store;

        assert!(repo.get("108").await.unwrap().is_none());
        repo.put("108", test_record("1")).await.unwrap();
        assert_eq!(repo.get("108").await.unwrap(), Some(test_record("1")));
        assert!(repo.put("108", test_record("2")).await.is_err());
    }

    #[tokio::test]
    async fn legacy_record_without_optional_fields_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(
            &path,
            r#"{"108":{"access_token":"ya29.x","verify_token":"v"}}"#,
        )
        .await
        .unwrap();

        let store = CredentialStore::load(path).await.unwrap();
        let record = store.record("108").await.unwrap();
        assert!(record.refresh_token.is_none());
        assert_eq!(record.expires, 0);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let result = CredentialStore::load(path).await;
        assert!(matches!(result, Err(Error::CredentialParse(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = CredentialStore::load(path.clone()).await.unwrap();
        store.insert_new("108", test_record("1")).await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "credential file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_inserts_for_same_identity_store_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = std::sync::Arc::new(CredentialStore::load(path.clone()).await.unwrap());

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_new("108", test_record(&i.to_string())).await
            }));
        }

        let mut stored = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                stored += 1;
            }
        }

        assert_eq!(stored, 1, "exactly one concurrent insert must win");
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: HashMap<String, CredentialRecord> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 1);
    }
}
