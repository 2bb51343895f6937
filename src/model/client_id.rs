use std::fmt::{self, Display, Formatter};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use uuid::Builder;

use crate::error::Result;

/// Storage key under which a participant's client ID is persisted.
pub const CLIENT_ID_KEY: &str = "pollClientId";

/// An opaque, locally persisted identifier for one participant device.
///
/// Used only to deduplicate responses: it is not a credential, and a participant
/// who discards it simply gets a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Generate a fresh random (v4) UUID.
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(Builder::from_random_bytes(bytes).into_uuid().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read the client ID persisted at `path`, creating and persisting a new one
    /// if there is none yet.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let id = contents.trim();
                if !id.is_empty() {
                    debug!("Loaded {CLIENT_ID_KEY} from {}", path.display());
                    return Ok(Self(id.to_string()));
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let id = Self::generate();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &id.0)?;
        info!("Generated new {CLIENT_ID_KEY} {id} at {}", path.display());
        Ok(id)
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
