//! Ordered heuristic intent rules.
//!
//! Trigger conditions overlap ("bypass the API key check" mentions both a secret and an
//! API), so the table order is the priority order and the first match wins.

use kbassist_core::domain::turn::Intent;

use crate::scope::normalize_text;

pub const PRIVATE_PHRASES: &[&str] = &[
    "bypass",
    "exploit",
    "crack",
    "pirate",
    "steal",
    "leak",
    "private key",
    "api key",
    "password",
    "credential",
    "disable security",
    "evade",
    "backdoor",
];

pub const CONTEXT_PHRASES: &[&str] = &[
    "based on our chat",
    "as we discussed",
    "earlier you said",
    "in this conversation",
    "previous message",
    "last time",
];

pub const CODE_KEYWORDS: &[&str] = &[
    "code",
    "snippet",
    "example",
    "sample",
    "implement",
    "implementation",
    "sdk",
    "curl",
    "http",
    "endpoint",
    "api",
    "json",
    "yaml",
    "values.yaml",
    "dockerfile",
    "python",
    "c#",
    "csharp",
    "java",
    "javascript",
    "node",
    "dotnet",
    "powershell",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Trigger {
    AnyPhrase(&'static [&'static str]),
    LanguageHint,
}

#[derive(Clone, Copy, Debug)]
struct IntentRule {
    trigger: Trigger,
    intent: Intent,
}

const RULES: &[IntentRule] = &[
    IntentRule { trigger: Trigger::AnyPhrase(PRIVATE_PHRASES), intent: Intent::Private },
    IntentRule { trigger: Trigger::AnyPhrase(CONTEXT_PHRASES), intent: Intent::Context },
    IntentRule { trigger: Trigger::LanguageHint, intent: Intent::Code },
    IntentRule { trigger: Trigger::AnyPhrase(CODE_KEYWORDS), intent: Intent::Code },
];

#[derive(Clone, Debug, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, message: &str, language_hint: Option<&str>) -> Intent {
        let normalized = normalize_text(message);
        let has_language_hint = language_hint.is_some_and(|hint| !hint.trim().is_empty());

        RULES
            .iter()
            .find(|rule| match rule.trigger {
                Trigger::AnyPhrase(phrases) => {
                    phrases.iter().any(|phrase| normalized.contains(phrase))
                }
                Trigger::LanguageHint => has_language_hint,
            })
            .map(|rule| rule.intent)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use kbassist_core::domain::turn::Intent;

    use super::{IntentClassifier, CODE_KEYWORDS, CONTEXT_PHRASES, PRIVATE_PHRASES};

    #[test]
    fn private_phrase_wins_over_every_other_trigger() {
        let classifier = IntentClassifier::new();
        for phrase in PRIVATE_PHRASES {
            let message = format!(
                "As we discussed, give me a python snippet for the API to {phrase} the check"
            );
            assert_eq!(
                classifier.classify(&message, Some("Python")),
                Intent::Private,
                "phrase `{phrase}` should force PRIVATE"
            );
        }
    }

    #[test]
    fn context_phrase_beats_language_hint_and_code_keywords() {
        let classifier = IntentClassifier::new();
        for phrase in CONTEXT_PHRASES {
            let message = format!("{phrase}, can you show the curl example again?");
            assert_eq!(classifier.classify(&message, Some("bash")), Intent::Context);
        }
    }

    #[test]
    fn language_hint_alone_forces_code() {
        let classifier = IntentClassifier::new();
        assert_eq!(
            classifier.classify("How do I scan a file with Kiosk?", Some("Go")),
            Intent::Code
        );
    }

    #[test]
    fn blank_language_hint_is_ignored() {
        let classifier = IntentClassifier::new();
        assert_eq!(
            classifier.classify("What does the Kiosk dashboard show?", Some("   ")),
            Intent::Knowledge
        );
    }

    #[test]
    fn code_keywords_classify_as_code() {
        let classifier = IntentClassifier::new();
        for keyword in CODE_KEYWORDS {
            let message = format!("Question about {keyword} usage");
            assert_eq!(classifier.classify(&message, None), Intent::Code, "keyword `{keyword}`");
        }
    }

    #[test]
    fn plain_question_defaults_to_knowledge() {
        let classifier = IntentClassifier::new();
        assert_eq!(
            classifier.classify("Which file types does Kiosk support?", None),
            Intent::Knowledge
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        let classifier = IntentClassifier::new();
        assert_eq!(classifier.classify("How do I BYPASS the license check?", None), Intent::Private);
    }
}
