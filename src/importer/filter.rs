use std::collections::HashSet;

use crate::models::{DEFAULT_ETF_KEYWORDS, MAX_SYMBOL_LEN};

/// Substrings marking preferred shares and other non-common listings
const PREFERRED_PATTERNS: &[&str] = &["-P", ".PR", "$", "^"];

/// Uppercase and trim; `None` when empty or too long
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() || symbol.chars().count() > MAX_SYMBOL_LEN {
        return None;
    }
    Some(symbol)
}

/// Approximate fund/ETF and preferred-share exclusion.
///
/// This is a plain substring match on the ticker text and both over- and
/// under-filters. `INDEX` for example rejects any ticker containing it.
#[derive(Debug, Clone)]
pub struct SymbolFilter {
    etf_keywords: Vec<String>,
    exclude_preferred: bool,
}

impl Default for SymbolFilter {
    fn default() -> Self {
        Self::new(DEFAULT_ETF_KEYWORDS.iter().map(|k| k.to_string()).collect(), false)
    }
}

impl SymbolFilter {
    pub fn new(etf_keywords: Vec<String>, exclude_preferred: bool) -> Self {
        Self {
            etf_keywords: etf_keywords.into_iter().map(|k| k.to_uppercase()).collect(),
            exclude_preferred,
        }
    }

    pub fn looks_like_fund(&self, symbol: &str) -> bool {
        self.etf_keywords.iter().any(|k| symbol.contains(k.as_str()))
    }

    pub fn looks_like_preferred(&self, symbol: &str) -> bool {
        self.exclude_preferred && PREFERRED_PATTERNS.iter().any(|p| symbol.contains(p))
    }

    pub fn accepts(&self, symbol: &str) -> bool {
        !self.looks_like_fund(symbol) && !self.looks_like_preferred(symbol)
    }

    /// Normalize, dedupe (first occurrence wins) and filter
    pub fn clean<I, S>(&self, raw: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        raw.into_iter()
            .filter_map(|s| normalize_symbol(s.as_ref()))
            .filter(|s| self.accepts(s))
            .filter(|s| seen.insert(s.clone()))
            .collect()
    }
}
