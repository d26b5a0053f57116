pub mod backend;
pub mod config;
pub mod domain;
pub mod errors;

pub use backend::{AssistantBackend, BackendCapabilities};
pub use domain::conversation::{
    ConversationId, ConversationMessage, MessageOrder, MessageRole, ThreadMapping, UserId,
};
pub use domain::run::{Run, RunError, RunId, RunRequest, RunStatus};
pub use domain::turn::{Intent, TurnHints, TurnRequest, TurnResponse};
pub use errors::{BackendError, InterfaceError, TurnError};
