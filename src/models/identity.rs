use serde::{Deserialize, Serialize};

/// Room id stored for sessions that belong to no room.
pub const PERSONAL_SCOPE: &str = "personal";

/// Where a study session is attributed: a shared room or the user's own log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StudyScope {
    Room(String),
    Personal,
}

impl StudyScope {
    pub fn as_room_id(&self) -> &str {
        match self {
            StudyScope::Room(room_id) => room_id,
            StudyScope::Personal => PERSONAL_SCOPE,
        }
    }

    pub fn from_room_id(value: &str) -> Self {
        if value == PERSONAL_SCOPE {
            StudyScope::Personal
        } else {
            StudyScope::Room(value.to_string())
        }
    }
}

impl Default for StudyScope {
    fn default() -> Self {
        StudyScope::Personal
    }
}

/// Identity handed over by the auth provider, carried on every persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    pub user_id: String,
    pub scope: StudyScope,
}

impl Attribution {
    pub fn new(user_id: impl Into<String>, scope: StudyScope) -> Self {
        Self {
            user_id: user_id.into(),
            scope,
        }
    }

    pub fn personal(user_id: impl Into<String>) -> Self {
        Self::new(user_id, StudyScope::Personal)
    }

    pub fn room(user_id: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self::new(user_id, StudyScope::Room(room_id.into()))
    }
}
