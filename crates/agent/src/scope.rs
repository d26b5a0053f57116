use std::collections::BTreeSet;

/// Canonical product name and the lowercase phrases that count as a mention of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductEntry {
    pub canonical: &'static str,
    pub synonyms: &'static [&'static str],
}

pub const PRODUCT_REGISTRY: &[ProductEntry] = &[
    ProductEntry {
        canonical: "MetaDefender Core",
        synonyms: &["metadefender core", "md core", "core"],
    },
    ProductEntry { canonical: "MetaDefender Kiosk", synonyms: &["metadefender kiosk", "kiosk"] },
    ProductEntry { canonical: "MetaDefender ICAP", synonyms: &["metadefender icap", "icap"] },
    ProductEntry {
        canonical: "MetaDefender Cloud",
        synonyms: &["metadefender cloud", "md cloud", "cloud"],
    },
    ProductEntry {
        canonical: "OESIS",
        synonyms: &["oesis", "endpoint security", "opwat endpoint", "device security"],
    },
];

pub type ProductScope = BTreeSet<String>;

#[derive(Clone, Debug)]
pub struct ProductScopeDetector {
    registry: &'static [ProductEntry],
}

impl Default for ProductScopeDetector {
    fn default() -> Self {
        Self { registry: PRODUCT_REGISTRY }
    }
}

impl ProductScopeDetector {
    pub fn new(registry: &'static [ProductEntry]) -> Self {
        Self { registry }
    }

    pub fn detect(&self, text: &str) -> ProductScope {
        let normalized = normalize_text(text);
        self.registry
            .iter()
            .filter(|entry| entry.synonyms.iter().any(|synonym| normalized.contains(synonym)))
            .map(|entry| entry.canonical.to_string())
            .collect()
    }

    /// Maps a caller-supplied product hint onto its canonical name; unknown products are kept
    /// as given (trimmed) so the hint still constrains the answer.
    pub fn canonicalize(&self, hint: &str) -> Option<String> {
        let trimmed = hint.trim();
        if trimmed.is_empty() {
            return None;
        }

        let normalized = normalize_text(trimmed);
        let known = self.registry.iter().find(|entry| {
            normalize_text(entry.canonical) == normalized
                || entry.synonyms.iter().any(|synonym| *synonym == normalized)
        });
        Some(known.map(|entry| entry.canonical.to_string()).unwrap_or_else(|| trimmed.to_string()))
    }

    /// Products the question is allowed to discuss: detected mentions plus the hint.
    pub fn question_scope(&self, message: &str, product_hint: Option<&str>) -> ProductScope {
        let mut scope = self.detect(message);
        if let Some(product) = product_hint.and_then(|hint| self.canonicalize(hint)) {
            scope.insert(product);
        }
        scope
    }
}

pub(crate) fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}
