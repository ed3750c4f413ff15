use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// What a session token may be used for. Only access tokens are minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Access,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Access => "access",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(Purpose::Access),
            other => Err(format!("unknown token purpose: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub token: String,
    pub purpose: Purpose,
}

/// A registered account. Only `id` and `email` ever leave the service.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Issuance order.
    #[serde(skip_serializing)]
    pub tokens: Vec<StoredToken>,
}

impl User {
    pub fn holds_token(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t.token == token)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub text: String,
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub owner_id: Uuid,
}

/// A JSON request body. `FIELDS` names what the body reads, so a serde
/// failure can be reported against the field it concerns.
pub trait RequestBody {
    const FIELDS: &'static [&'static str];

    /// The field a deserialization error message refers to, falling back to
    /// the first field when the message names none.
    fn field_in(message: &str) -> &'static str {
        Self::FIELDS
            .iter()
            .copied()
            .find(|f| message.contains(&format!("`{f}`")) || message.contains(&format!("{f}: ")))
            .unwrap_or(Self::FIELDS[0])
    }
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl RequestBody for Credentials {
    const FIELDS: &'static [&'static str] = &["email", "password"];
}

#[derive(Debug, Deserialize)]
pub struct NewTask {
    pub text: String,
}

impl RequestBody for NewTask {
    const FIELDS: &'static [&'static str] = &["text"];
}

/// Body of `PATCH /tasks/{id}`. `completed` is kept as raw JSON so that a
/// non-boolean value reads as "not completed" instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub completed: Option<Value>,
}

impl RequestBody for TaskPatch {
    const FIELDS: &'static [&'static str] = &["text", "completed"];
}
