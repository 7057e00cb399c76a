// src/integrations/store.rs — JSON file session store
//
// One file holds every user's record. Writes go to a temp file that is
// renamed over the original (chmod 600 on unix), so a crash never leaves a
// half-written store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::infra::errors::{BotError, Result};
use crate::integrations::types::{Credentials, SessionStore, UserId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credentials: Option<Credentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    installation_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreFile {
    /// Added to the configured allow-list.
    #[serde(default)]
    allowed_users: Vec<UserId>,
    #[serde(default)]
    users: BTreeMap<UserId, UserRecord>,
}

pub struct JsonFileStore {
    path: PathBuf,
    configured_allow: Vec<UserId>,
    data: Mutex<StoreFile>,
}

impl JsonFileStore {
    /// Open the store at `path`; a missing file starts empty.
    pub fn open(path: impl Into<PathBuf>, allowed_users: Vec<UserId>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)
                .map_err(|e| BotError::Store(format!("{}: {e}", path.display())))?
        } else {
            StoreFile::default()
        };
        tracing::info!(
            "Session store at {} ({} user record(s))",
            path.display(),
            data.users.len()
        );
        Ok(Self {
            path,
            configured_allow: allowed_users,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, StoreFile> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read<T>(&self, user_id: UserId, f: impl FnOnce(&UserRecord) -> Option<T>) -> Option<T> {
        self.lock().users.get(&user_id).and_then(f)
    }

    /// Apply `f` to the user's record and persist.
    fn update(&self, user_id: UserId, f: impl FnOnce(&mut UserRecord)) -> Result<()> {
        let mut data = self.lock();
        f(data.users.entry(user_id).or_default());
        write_atomic(&self.path, &data)
    }
}

fn write_atomic(path: &Path, data: &StoreFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| BotError::Store(format!("serialize: {e}")))?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

impl SessionStore for JsonFileStore {
    fn get_credentials(&self, user_id: UserId) -> Result<Option<Credentials>> {
        Ok(self.read(user_id, |r| r.credentials.clone()))
    }

    fn save_credentials(&self, user_id: UserId, credentials: Option<Credentials>) -> Result<()> {
        self.update(user_id, |r| r.credentials = credentials)
    }

    fn get_template(&self, user_id: UserId) -> Result<Option<String>> {
        Ok(self.read(user_id, |r| r.template.clone()))
    }

    fn set_template(&self, user_id: UserId, template: Option<String>) -> Result<()> {
        self.update(user_id, |r| r.template = template)
    }

    fn get_postal_code(&self, user_id: UserId) -> Result<Option<String>> {
        Ok(self.read(user_id, |r| r.postal_code.clone()))
    }

    fn set_postal_code(&self, user_id: UserId, postal_code: String) -> Result<()> {
        self.update(user_id, |r| r.postal_code = Some(postal_code))
    }

    fn get_installation_id(&self, user_id: UserId) -> Result<Option<String>> {
        Ok(self.read(user_id, |r| r.installation_id.clone()))
    }

    fn set_installation_id(&self, user_id: UserId, installation_id: String) -> Result<()> {
        self.update(user_id, |r| r.installation_id = Some(installation_id))
    }

    fn is_user_allowed(&self, user_id: UserId) -> bool {
        let data = self.lock();
        if self.configured_allow.is_empty() && data.allowed_users.is_empty() {
            return true;
        }
        self.configured_allow.contains(&user_id) || data.allowed_users.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn creds() -> Credentials {
        Credentials {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_at: Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap(),
            device_id: "dev".into(),
        }
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sessions.json");

        let saved = creds();
        let store = JsonFileStore::open(&path, Vec::new()).unwrap();
        store.save_credentials(1, Some(saved.clone())).unwrap();
        store.set_template(1, Some("Ships from Madrid".into())).unwrap();
        store.set_postal_code(1, "28001".into()).unwrap();
        store.set_installation_id(1, "install-1".into()).unwrap();

        let reopened = JsonFileStore::open(&path, Vec::new()).unwrap();
        assert_eq!(reopened.get_credentials(1).unwrap(), Some(saved));
        assert_eq!(
            reopened.get_template(1).unwrap().as_deref(),
            Some("Ships from Madrid")
        );
        assert_eq!(reopened.get_postal_code(1).unwrap().as_deref(), Some("28001"));
        assert_eq!(
            reopened.get_installation_id(1).unwrap().as_deref(),
            Some("install-1")
        );
        assert_eq!(reopened.get_template(2).unwrap(), None);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_logout_forgets_credentials_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("s.json"), Vec::new()).unwrap();
        store.save_credentials(1, Some(creds())).unwrap();
        store.set_postal_code(1, "08001".into()).unwrap();
        store.save_credentials(1, None).unwrap();
        assert_eq!(store.get_credentials(1).unwrap(), None);
        assert_eq!(store.get_postal_code(1).unwrap().as_deref(), Some("08001"));
    }

    #[test]
    fn test_allow_list() {
        let dir = tempfile::tempdir().unwrap();
        let open = JsonFileStore::open(dir.path().join("a.json"), Vec::new()).unwrap();
        assert!(open.is_user_allowed(99));

        let restricted = JsonFileStore::open(dir.path().join("b.json"), vec![7]).unwrap();
        assert!(restricted.is_user_allowed(7));
        assert!(!restricted.is_user_allowed(8));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonFileStore::open(&path, Vec::new()),
            Err(BotError::Store(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let store = JsonFileStore::open(&path, Vec::new()).unwrap();
        store.set_postal_code(1, "28001".into()).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
