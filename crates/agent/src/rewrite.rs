use kbassist_core::domain::conversation::ConversationId;
use kbassist_core::errors::TurnError;
use tracing::{info, warn};

use crate::executor::RunExecutor;
use crate::guardrails::{GuardrailPolicy, GuardrailVerdict, REQUIRED_HEADINGS};
use crate::scope::{ProductScope, ProductScopeDetector};
use crate::wrapper::NOT_FOUND_PHRASE;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub answer: String,
    pub attempts: u32,
    pub verdict: GuardrailVerdict,
}

/// Everything one rewrite loop needs about the turn it is correcting.
pub struct RewriteContext<'a> {
    pub conversation: &'a ConversationId,
    pub question_scope: &'a ProductScope,
    pub temperature: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewriteController {
    max_attempts: u32,
    policy: GuardrailPolicy,
}

impl RewriteController {
    pub fn new(max_attempts: u32, policy: GuardrailPolicy) -> Self {
        Self { max_attempts, policy }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn policy(&self) -> GuardrailPolicy {
        self.policy
    }

    /// Re-asks the backend until the answer passes the guardrails or the attempt budget is
    /// spent. A rewrite run that fails keeps the previous answer; backend errors propagate.
    pub async fn run(
        &self,
        executor: &RunExecutor,
        detector: &ProductScopeDetector,
        context: RewriteContext<'_>,
        initial_answer: String,
    ) -> Result<RewriteOutcome, TurnError> {
        let mut answer = initial_answer;
        let mut verdict = self.policy.evaluate(context.question_scope, &answer, detector);
        let mut attempts = 0;

        while attempts < self.max_attempts && !verdict.passed() {
            info!(
                event_name = "pipeline.guardrail.failed",
                thread_id = %context.conversation,
                attempt = attempts + 1,
                reasons = ?verdict.failure_reasons(),
                extra_products = ?verdict.extra_products,
                "answer failed guardrails, requesting rewrite"
            );

            let prompt = corrective_prompt(context.question_scope, &verdict.extra_products);
            attempts += 1;
            match executor.execute(context.conversation, &prompt, context.temperature).await {
                Ok(outcome) => {
                    answer = outcome.answer;
                    verdict = self.policy.evaluate(context.question_scope, &answer, detector);
                }
                Err(error) if error.is_run_level() => {
                    warn!(
                        event_name = "pipeline.rewrite.abandoned",
                        thread_id = %context.conversation,
                        attempt = attempts,
                        error = %error,
                        "rewrite run failed, keeping previous answer"
                    );
                    break;
                }
                Err(error) => return Err(error),
            }
        }

        Ok(RewriteOutcome { answer, attempts, verdict })
    }
}

pub fn corrective_prompt(question_scope: &ProductScope, extra_products: &ProductScope) -> String {
    let mut prompt = String::from("Rewrite your previous answer with these constraints:\n");
    prompt.push_str(&format!(
        "- Use the strict Markdown structure ({}).\n",
        REQUIRED_HEADINGS.join(", ")
    ));
    prompt.push_str(&format!(
        "- Do NOT guess. If an exact endpoint/path/flag/value is not in the KB context, say: \
         \"{NOT_FOUND_PHRASE}\"\n"
    ));
    if !question_scope.is_empty() {
        prompt.push_str(&format!("- ONLY discuss: {}.\n", join(question_scope)));
    }
    if !extra_products.is_empty() {
        prompt.push_str(&format!("- Remove references to: {}.\n", join(extra_products)));
    }
    prompt
}

fn join(products: &ProductScope) -> String {
    products.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
