/// Signed-in identity, persisted in sled
use crate::error::{ChatError, Result};
use crate::models::UserId;
use std::path::Path;
use tokio::sync::watch;
use tracing::{info, warn};

/// Storage key of the signed-in user id (decimal string)
pub const USER_ID_KEY: &str = "userId";

/// Local key-value store holding the current user id
#[derive(Clone)]
pub struct IdentityStore {
    db: sled::Db,
}

impl IdentityStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        let db = sled::open(data_dir.join("identity.db"))
            .map_err(|e| ChatError::Storage(format!("identity DB: {}", e)))?;
        Ok(Self { db })
    }

    /// Raw stored value, if any
    pub fn load(&self) -> Result<Option<String>> {
        let value = self
            .db
            .get(USER_ID_KEY)
            .map_err(|e| ChatError::Storage(format!("load identity: {}", e)))?;
        Ok(value.map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    pub fn save(&self, value: &str) -> Result<()> {
        self.db
            .insert(USER_ID_KEY, value.as_bytes())
            .map_err(|e| ChatError::Storage(format!("save identity: {}", e)))?;
        self.flush()
    }

    pub fn clear(&self) -> Result<()> {
        self.db
            .remove(USER_ID_KEY)
            .map_err(|e| ChatError::Storage(format!("clear identity: {}", e)))?;
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| ChatError::Storage(format!("flush identity: {}", e)))?;
        Ok(())
    }
}

/// The current session. Feeds [`ConnectionManager::follow`](crate::net::ConnectionManager::follow).
pub struct Session {
    store: IdentityStore,
    tx: watch::Sender<Option<UserId>>,
}

impl Session {
    /// Restore the stored identity. Unparseable or non-positive values count as signed out.
    pub fn open(store: IdentityStore) -> Result<Self> {
        let user_id = match store.load()? {
            Some(raw) => match raw.parse::<UserId>().ok().and_then(UserId::valid) {
                Some(id) => Some(id),
                None => {
                    warn!("Ignoring stored user id {:?}", raw);
                    None
                }
            },
            None => None,
        };
        let (tx, _) = watch::channel(user_id);
        Ok(Self { store, tx })
    }

    pub fn user_id(&self) -> Option<UserId> {
        *self.tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<Option<UserId>> {
        self.tx.subscribe()
    }

    /// Persist `user_id` and publish it
    pub fn sign_up(&self, user_id: UserId) -> Result<()> {
        if !user_id.is_valid() {
            return Err(ChatError::Validation(format!("invalid user id {}", user_id)));
        }
        self.store.save(&user_id.to_string())?;
        info!("Signed in as user {}", user_id);
        self.tx.send_replace(Some(user_id));
        Ok(())
    }

    pub fn sign_out(&self) -> Result<()> {
        self.store.clear()?;
        info!("Signed out");
        self.tx.send_replace(None);
        Ok(())
    }
}
