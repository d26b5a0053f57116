use kbassist_core::config::PipelineConfig;

use crate::scope::{ProductScope, ProductScopeDetector};

pub const REQUIRED_HEADINGS: [&str; 4] =
    ["## Answer", "## Steps / Example", "## Notes (optional)", "## Sources"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuardrailVerdict {
    pub structure_ok: bool,
    pub scope_ok: bool,
    pub missing_headings: Vec<&'static str>,
    pub question_products: ProductScope,
    pub answer_products: ProductScope,
    pub extra_products: ProductScope,
}

impl GuardrailVerdict {
    pub fn passed(&self) -> bool {
        self.structure_ok && self.scope_ok
    }

    pub fn failure_reasons(&self) -> Vec<&'static str> {
        let mut reasons = Vec::new();
        if !self.structure_ok {
            reasons.push("structure");
        }
        if !self.scope_ok {
            reasons.push("scope");
        }
        reasons
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub structure_enabled: bool,
    pub scope_enabled: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { structure_enabled: true, scope_enabled: true }
    }
}

impl From<&PipelineConfig> for GuardrailPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            structure_enabled: config.structure_guardrail,
            scope_enabled: config.scope_guardrail,
        }
    }
}

impl GuardrailPolicy {
    /// A disabled check always reports ok; the diagnostic sets are filled in regardless.
    pub fn evaluate(
        &self,
        question_scope: &ProductScope,
        answer: &str,
        detector: &ProductScopeDetector,
    ) -> GuardrailVerdict {
        let missing_headings: Vec<&'static str> =
            REQUIRED_HEADINGS.iter().copied().filter(|heading| !answer.contains(heading)).collect();

        let answer_products = detector.detect(answer);
        let extra_products: ProductScope = if question_scope.is_empty() {
            ProductScope::new()
        } else {
            answer_products.difference(question_scope).cloned().collect()
        };

        GuardrailVerdict {
            structure_ok: !self.structure_enabled || missing_headings.is_empty(),
            scope_ok: !self.scope_enabled || extra_products.is_empty(),
            missing_headings,
            question_products: question_scope.clone(),
            answer_products,
            extra_products,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::scope::{ProductScope, ProductScopeDetector};

    use super::{GuardrailPolicy, REQUIRED_HEADINGS};

    fn well_formed(body: &str) -> String {
        format!(
            "## Answer\n{body}\n\n## Steps / Example\n1. Open the console.\n\n\
             ## Notes (optional)\nNone.\n\n## Sources\n- KB article"
        )
    }

    fn scope(names: &[&str]) -> ProductScope {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn missing_sources_heading_fails_structure() {
        let answer = "## Answer\nYes.\n\n## Steps / Example\n1.\n\n## Notes (optional)\n-";
        let verdict = GuardrailPolicy::default().evaluate(
            &ProductScope::new(),
            answer,
            &ProductScopeDetector::default(),
        );

        assert!(!verdict.structure_ok);
        assert!(!verdict.passed());
        assert_eq!(verdict.missing_headings, vec!["## Sources"]);
        assert_eq!(verdict.failure_reasons(), vec!["structure"]);
    }

    #[test]
    fn headings_in_reverse_order_still_pass() {
        let answer = REQUIRED_HEADINGS.iter().rev().copied().collect::<Vec<_>>().join("\ntext\n");
        let verdict = GuardrailPolicy::default().evaluate(
            &ProductScope::new(),
            &answer,
            &ProductScopeDetector::default(),
        );

        assert!(verdict.structure_ok);
        assert!(verdict.passed());
    }

    #[test]
    fn extra_product_in_answer_fails_scope() {
        let question = scope(&["MetaDefender Kiosk"]);
        let answer = well_formed("Kiosk forwards files to MetaDefender Core for scanning.");
        let verdict =
            GuardrailPolicy::default().evaluate(&question, &answer, &ProductScopeDetector::default());

        assert!(verdict.structure_ok);
        assert!(!verdict.scope_ok);
        assert_eq!(verdict.extra_products, scope(&["MetaDefender Core"]));
        assert_eq!(verdict.answer_products, scope(&["MetaDefender Core", "MetaDefender Kiosk"]));
    }

    #[test]
    fn empty_question_scope_is_unconstrained() {
        let answer = well_formed("Both ICAP and Kiosk can do this.");
        let verdict = GuardrailPolicy::default().evaluate(
            &ProductScope::new(),
            &answer,
            &ProductScopeDetector::default(),
        );

        assert!(verdict.scope_ok);
        assert!(verdict.extra_products.is_empty());
        assert_eq!(verdict.answer_products.len(), 2);
    }

    #[test]
    fn answer_naming_no_products_passes_scope() {
        let question = scope(&["MetaDefender ICAP"]);
        let verdict = GuardrailPolicy::default().evaluate(
            &question,
            &well_formed("Restart the service after editing the settings."),
            &ProductScopeDetector::default(),
        );

        assert!(verdict.passed());
    }

    #[test]
    fn disabled_checks_always_pass_but_keep_diagnostics() {
        let policy = GuardrailPolicy { structure_enabled: false, scope_enabled: false };
        let question = scope(&["MetaDefender Kiosk"]);
        let verdict = policy.evaluate(
            &question,
            "Use MetaDefender Cloud instead.",
            &ProductScopeDetector::default(),
        );

        assert!(verdict.passed());
        assert_eq!(verdict.missing_headings.len(), 4);
        assert_eq!(verdict.extra_products, scope(&["MetaDefender Cloud"]));
    }
}
