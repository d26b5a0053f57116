use serde::{Deserialize, Serialize};

use crate::domain::conversation::{ConversationId, UserId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    #[default]
    Knowledge,
    Code,
    Private,
    Context,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Knowledge => "KNOWLEDGE",
            Self::Code => "CODE",
            Self::Private => "PRIVATE",
            Self::Context => "CONTEXT",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional caller hints. They widen the detected scope and feed the code block; they never
/// replace what is detected from the message itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnHints {
    pub product: Option<String>,
    pub language: Option<String>,
    pub task: Option<String>,
}

impl TurnHints {
    pub fn product(&self) -> Option<&str> {
        non_blank(self.product.as_deref())
    }

    pub fn language(&self) -> Option<&str> {
        non_blank(self.language.as_deref())
    }

    pub fn task(&self) -> Option<&str> {
        non_blank(self.task.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub user_id: UserId,
    pub message: String,
    pub thread_id: Option<ConversationId>,
    pub hints: TurnHints,
}

impl TurnRequest {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            message: message.into(),
            thread_id: None,
            hints: TurnHints::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub response: String,
    pub thread_id: ConversationId,
    pub user_id: UserId,
    pub intent: Intent,
    pub rewrite_attempts: u32,
}
