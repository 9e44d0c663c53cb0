//! Lock client identity

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

const INTERNAL_LOCK_GRANT_CLIENT_ID: &str = "(internal lock grant client)";

/// The anonymous client. Never acquires locks reentrantly.
pub static ANONYMOUS: LockClient = LockClient { client_id: None };

/// Client the lock service uses for its own grants. Not for callers.
pub static INTERNAL_LOCK_GRANT: LockClient = LockClient {
    client_id: Some(Cow::Borrowed(INTERNAL_LOCK_GRANT_CLIENT_ID)),
};

/// A caller of the lock service
///
/// Equality and hashing go by id only. Whether a value *is* one of the two
/// statics is a question of identity, see [`LockClient::is_same_instance`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "Option<String>", into = "Option<String>")]
pub struct LockClient {
    client_id: Option<Cow<'static, str>>,
}

impl LockClient {
    /// A named client. Fails for an empty id or the reserved internal id.
    pub fn of(client_id: &str) -> Result<Self> {
        if client_id.is_empty() {
            return Err(AtlasError::InvalidLockClient("client id cannot be empty".to_string()));
        }
        if client_id == INTERNAL_LOCK_GRANT_CLIENT_ID {
            return Err(AtlasError::InvalidLockClient(format!("'{}' is reserved", client_id)));
        }
        Ok(Self {
            client_id: Some(Cow::Owned(client_id.to_string())),
        })
    }

    /// The shared anonymous instance
    pub fn anonymous() -> &'static LockClient {
        &ANONYMOUS
    }

    pub fn is_anonymous(&self) -> bool {
        self.client_id.is_none()
    }

    /// The id, `None` for the anonymous client
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// True if both references point at the same object
    pub fn is_same_instance(&self, other: &LockClient) -> bool {
        std::ptr::eq(self, other)
    }
}

impl PartialEq for LockClient {
    fn eq(&self, other: &Self) -> bool {
        self.client_id == other.client_id
    }
}

impl Eq for LockClient {}

impl Hash for LockClient {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.client_id.hash(state);
    }
}

impl fmt::Debug for LockClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.client_id {
            None => f.write_str("LockClient{anonymous}"),
            Some(id) => write!(f, "LockClient{{\"{}\"}}", id),
        }
    }
}

impl fmt::Display for LockClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Decoding goes through the same checks as construction; the reserved id
/// decodes to the internal grant client.
impl TryFrom<Option<String>> for LockClient {
    type Error = AtlasError;

    fn try_from(client_id: Option<String>) -> Result<Self> {
        match client_id {
            None => Ok(ANONYMOUS.clone()),
            Some(id) if id == INTERNAL_LOCK_GRANT_CLIENT_ID => Ok(INTERNAL_LOCK_GRANT.clone()),
            Some(id) => LockClient::of(&id),
        }
    }
}

impl From<LockClient> for Option<String> {
    fn from(client: LockClient) -> Self {
        client.client_id.map(Cow::into_owned)
    }
}
