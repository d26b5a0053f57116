//! Turn pipeline for the knowledge-base support assistant.
//!
//! A user turn flows through:
//! 1. **Conversation lookup** (`thread_store`) - one backend conversation per user id
//! 2. **Analysis** (`scope`, `intent`) - product scope and a coarse intent from rule tables
//! 3. **Wrapping** (`wrapper`) - the outbound instruction bundle around the question
//! 4. **Execution** (`executor`) - append, run, and read back the latest assistant answer
//! 5. **Guardrails** (`guardrails`, `rewrite`) - structure and scope checks with a bounded
//!    corrective rewrite loop
//!
//! `runtime::AgentRuntime` ties the steps together. `openai` holds the HTTP backend and
//! `backoff` the per-call rate-limit retry used by bulk callers.
//!
//! The pipeline never trusts the model to stay in bounds: every answer is re-checked, and a
//! guardrail miss is reported in the outcome rather than raised as an error.

pub mod backoff;
pub mod executor;
pub mod guardrails;
pub mod intent;
pub mod openai;
pub mod rewrite;
pub mod runtime;
pub mod scope;
pub mod thread_store;
pub mod wrapper;

#[cfg(test)]
pub(crate) mod test_support;

pub use backoff::{RateLimitBackoff, RateLimitSignal, RetryOutcome, RetryingBackend};
pub use executor::{RunExecutor, RunOutcome, RunStrategy};
pub use guardrails::{GuardrailPolicy, GuardrailVerdict};
pub use intent::IntentClassifier;
pub use openai::OpenAiAssistantsBackend;
pub use rewrite::{RewriteController, RewriteOutcome};
pub use runtime::AgentRuntime;
pub use scope::{ProductScope, ProductScopeDetector};
pub use thread_store::{KeyedThreadStore, ThreadStore};
pub use wrapper::{MessageWrapper, WrappedMessage};
