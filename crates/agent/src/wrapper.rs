use kbassist_core::domain::turn::{Intent, TurnHints};

use crate::guardrails::REQUIRED_HEADINGS;
use crate::intent::IntentClassifier;
use crate::scope::{normalize_text, ProductScope, ProductScopeDetector};

pub const NOT_FOUND_PHRASE: &str = "Not found in the provided knowledge base.";

pub const VENDOR_NAME: &str = "OPSWAT";

/// Question phrases that ask for a literal value the model must not invent.
pub const EXACT_FACT_PHRASES: &[&str] = &[
    "exact",
    "full path",
    "path",
    "endpoint",
    "url",
    "health",
    "status api",
    "port",
    "flag",
    "parameter name",
    "config file location",
    "values.yaml",
];

/// Outbound user turn plus the analysis that shaped it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrappedMessage {
    pub text: String,
    pub intent: Intent,
    pub scope: ProductScope,
    pub exact_fact: bool,
}

#[derive(Clone, Debug, Default)]
pub struct MessageWrapper {
    detector: ProductScopeDetector,
    classifier: IntentClassifier,
}

impl MessageWrapper {
    pub fn new(detector: ProductScopeDetector, classifier: IntentClassifier) -> Self {
        Self { detector, classifier }
    }

    pub fn detector(&self) -> &ProductScopeDetector {
        &self.detector
    }

    pub fn wrap(&self, message: &str, hints: &TurnHints) -> WrappedMessage {
        let scope = self.detector.question_scope(message, hints.product());
        let intent = self.classifier.classify(message, hints.language());
        let exact_fact = needs_exact_fact(message);

        let mut sections: Vec<String> = Vec::with_capacity(6);
        if !scope.is_empty() {
            sections.push(scope_section(&scope));
        }
        if exact_fact {
            sections.push(exact_fact_section());
        }
        match intent {
            Intent::Code => sections.push(code_section(hints)),
            Intent::Private => sections.push(decline_section()),
            Intent::Knowledge | Intent::Context => {}
        }
        sections.push(output_format_section());
        sections.push(format!("User question:\n{message}"));

        WrappedMessage { text: sections.join("\n\n"), intent, scope, exact_fact }
    }
}

pub fn needs_exact_fact(message: &str) -> bool {
    let normalized = normalize_text(message);
    EXACT_FACT_PHRASES.iter().any(|phrase| normalized.contains(phrase))
}

fn scope_section(scope: &ProductScope) -> String {
    let products = scope.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    format!("Scope: {products}. Do not mention other {VENDOR_NAME} products.")
}

fn exact_fact_section() -> String {
    format!(
        "This question requires exact values (endpoints/paths/flags/ports). Do NOT invent. \
         If not present in the KB context, reply with: \"{NOT_FOUND_PHRASE}\""
    )
}

fn code_section(hints: &TurnHints) -> String {
    let mut known = Vec::new();
    if let Some(product) = hints.product() {
        known.push(format!("- Product: {product}"));
    }
    if let Some(language) = hints.language() {
        known.push(format!("- Language: {language}"));
    }
    if let Some(task) = hints.task() {
        known.push(format!("- Task: {task}"));
    }
    let hint_block =
        if known.is_empty() { "- (no extra hints provided)".to_string() } else { known.join("\n") };

    format!(
        "This is a CODE request.\n\
         Provide a minimal working template immediately (with placeholders), then ask at most 2 clarifying questions.\n\
         Known hints:\n\
         {hint_block}"
    )
}

fn decline_section() -> String {
    "This request asks for secrets, security bypasses, or other restricted help. \
     Decline briefly and offer safe alternatives (official documentation, vendor support, \
     or the internal IT process)."
        .to_string()
}

pub(crate) fn output_format_section() -> String {
    let mut section = String::from("Output format (strict):");
    for heading in REQUIRED_HEADINGS {
        section.push('\n');
        section.push_str(heading);
    }
    section
}

#[cfg(test)]
mod tests {
    use kbassist_core::domain::turn::{Intent, TurnHints};

    use super::{MessageWrapper, NOT_FOUND_PHRASE};

    fn hints(product: Option<&str>, language: Option<&str>, task: Option<&str>) -> TurnHints {
        TurnHints {
            product: product.map(str::to_string),
            language: language.map(str::to_string),
            task: task.map(str::to_string),
        }
    }

    #[test]
    fn private_request_gets_decline_directive_without_scope_or_code_block() {
        let wrapper = MessageWrapper::default();
        let wrapped = wrapper.wrap("How do I bypass the license check?", &TurnHints::default());

        assert_eq!(wrapped.intent, Intent::Private);
        assert!(!wrapped.text.contains("Scope:"));
        assert!(!wrapped.text.contains("This is a CODE request."));
        assert!(wrapped.text.contains("Decline briefly"));
        assert!(wrapped.text.ends_with("User question:\nHow do I bypass the license check?"));
    }

    #[test]
    fn code_request_without_hints_lists_placeholder_hint() {
        let wrapper = MessageWrapper::default();
        let wrapped = wrapper.wrap(
            "Give me a Python snippet for the multiscanning API",
            &TurnHints::default(),
        );

        assert_eq!(wrapped.intent, Intent::Code);
        assert!(wrapped.text.contains("This is a CODE request."));
        assert!(wrapped.text.contains("Known hints:\n- (no extra hints provided)"));
    }

    #[test]
    fn code_request_lists_supplied_hints_in_order() {
        let wrapper = MessageWrapper::default();
        let wrapped = wrapper.wrap(
            "Show me how to submit a file",
            &hints(Some("MetaDefender Core"), Some("C#"), Some("SDK integration")),
        );

        assert!(wrapped.text.contains(
            "Known hints:\n- Product: MetaDefender Core\n- Language: C#\n- Task: SDK integration"
        ));
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let wrapper = MessageWrapper::default();
        let wrapped = wrapper.wrap(
            "What is the exact health endpoint for Kiosk?",
            &hints(None, Some("bash"), None),
        );

        let scope = wrapped.text.find("Scope: MetaDefender Kiosk.").expect("scope line");
        let exact = wrapped.text.find(NOT_FOUND_PHRASE).expect("exact line");
        let code = wrapped.text.find("This is a CODE request.").expect("code block");
        let format = wrapped.text.find("Output format (strict):").expect("format block");
        let question = wrapped.text.find("User question:").expect("question");
        assert!(scope < exact && exact < code && code < format && format < question);
        assert!(wrapped.exact_fact);
    }

    #[test]
    fn scope_line_unions_detected_and_hinted_products() {
        let wrapper = MessageWrapper::default();
        let wrapped = wrapper.wrap("Does ICAP support TLS?", &hints(Some("kiosk"), None, None));

        assert!(wrapped.text.starts_with(
            "Scope: MetaDefender ICAP, MetaDefender Kiosk. Do not mention other OPSWAT products."
        ));
    }

    #[test]
    fn plain_question_has_only_format_and_question() {
        let wrapper = MessageWrapper::default();
        let wrapped = wrapper.wrap("Which languages does the UI offer?", &TurnHints::default());

        assert_eq!(
            wrapped.text,
            "Output format (strict):\n## Answer\n## Steps / Example\n## Notes (optional)\n## Sources\
             \n\nUser question:\nWhich languages does the UI offer?"
        );
    }
}
