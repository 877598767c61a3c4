use ring::hmac;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::{QuizError, Result};
use crate::models::QuizSession;

/// Storage contract for the single live session.
///
/// `load` only ever yields a structurally valid snapshot; anything else
/// surfaces as `CorruptSnapshot`, which callers recover from by starting
/// fresh rather than resuming half-written state.
pub trait SessionStore: Send + Sync {
    fn save(&self, session: &QuizSession) -> Result<()>;
    fn load(&self) -> Result<Option<QuizSession>>;
    fn clear(&self) -> Result<()>;
}

/// On-disk store: bincode body, HMAC-SHA256 signature, base64 armor.
///
/// The signature turns torn writes and stray edits into a detectable
/// `CorruptSnapshot` instead of a silently wrong session.
#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    key: Arc<hmac::Key>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, key: hmac::Key) -> FileStore {
        FileStore {
            path: path.into(),
            key: Arc::new(key),
        }
    }

    fn encode(&self, session: &QuizSession) -> Result<String> {
        let body = bincode::serialize(session)
            .map_err(|err| QuizError::Io(io::Error::new(io::ErrorKind::Other, err.to_string())))?;

        let signature = hmac::sign(&self.key, &body);

        Ok(format!(
            "{}:{}",
            base64::encode_config(&body, base64::URL_SAFE_NO_PAD),
            base64::encode_config(signature.as_ref(), base64::URL_SAFE_NO_PAD),
        ))
    }

    fn decode(&self, raw: &str) -> Result<QuizSession> {
        let mut parts = raw.trim().splitn(2, ':');
        let body = parts
            .next()
            .ok_or_else(|| corrupt("missing snapshot body"))?;
        let body = base64::decode_config(body, base64::URL_SAFE_NO_PAD)
            .map_err(|err| corrupt(&err.to_string()))?;

        let signature = parts
            .next()
            .ok_or_else(|| corrupt("missing snapshot signature"))?;
        let signature = base64::decode_config(signature, base64::URL_SAFE_NO_PAD)
            .map_err(|err| corrupt(&err.to_string()))?;

        hmac::verify(&self.key, &body, &signature)
            .map_err(|_err| corrupt("snapshot signature does not verify"))?;

        let session: QuizSession =
            bincode::deserialize(&body).map_err(|err| corrupt(&err.to_string()))?;
        session.check_invariants()?;
        Ok(session)
    }
}

fn corrupt(reason: &str) -> QuizError {
    QuizError::CorruptSnapshot(reason.to_string())
}

impl SessionStore for FileStore {
    fn save(&self, session: &QuizSession) -> Result<()> {
        let encoded = self.encode(session)?;
        fs::write(&self.path, encoded)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<QuizSession>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        self.decode(&raw).map(Some)
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    slot: Mutex<Option<QuizSession>>,
}

impl SessionStore for MemoryStore {
    fn save(&self, session: &QuizSession) -> Result<()> {
        let mut slot = self.slot.lock().map_err(|_err| lock_poisoned())?;
        *slot = Some(session.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<QuizSession>> {
        let slot = self.slot.lock().map_err(|_err| lock_poisoned())?;
        if let Some(session) = slot.as_ref() {
            session.check_invariants()?;
        }
        Ok(slot.clone())
    }

    fn clear(&self) -> Result<()> {
        let mut slot = self.slot.lock().map_err(|_err| lock_poisoned())?;
        *slot = None;
        Ok(())
    }
}

fn lock_poisoned() -> QuizError {
    QuizError::Io(io::Error::new(
        io::ErrorKind::Other,
        "session store lock poisoned",
    ))
}
