use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform user identifier, opaque to the engine.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task template identifier, assigned by the admin side.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Attempt identifier, derived from (user, task, attempt index) so the
/// same attempt row always resolves to the same id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId([u8; 32]);

impl AttemptId {
    pub fn derive(user: &UserId, task: &TaskId, index: u32) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(user.as_str().as_bytes());
        hasher.update(b"/");
        hasher.update(task.as_str().as_bytes());
        hasher.update(&index.to_le_bytes());
        Self(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttemptId({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_id_deterministic() {
        let user = UserId::from("user-1");
        let task = TaskId::from("task-9");
        let id1 = AttemptId::derive(&user, &task, 0);
        let id2 = AttemptId::derive(&user, &task, 0);
        assert_eq!(id1, id2);

        let id3 = AttemptId::derive(&user, &task, 1);
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_attempt_id_hex_roundtrip() {
        let id = AttemptId::derive(&UserId::from("u"), &TaskId::from("t"), 3);
        let hex = id.to_hex();
        assert_eq!(AttemptId::from_hex(&hex).unwrap(), id);
        assert!(AttemptId::from_hex("abcd").is_err());
    }
}
