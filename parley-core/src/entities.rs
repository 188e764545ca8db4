//! Known repos and companies.
//!
//! Lookups are case-insensitive and word-bounded, and always return the
//! configured spelling so "judo" in a message resolves to "JUDO".

use serde::Deserialize;

/// Configured entity names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityCatalog {
    #[serde(default)]
    pub repos: Vec<String>,
    #[serde(default)]
    pub companies: Vec<String>,
}

impl EntityCatalog {
    pub fn new(repos: &[&str], companies: &[&str]) -> Self {
        Self {
            repos: repos.iter().map(|s| s.to_string()).collect(),
            companies: companies.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty() && self.companies.is_empty()
    }

    /// Canonical spelling of `word` if it is a known repo.
    pub fn repo(&self, word: &str) -> Option<&str> {
        lookup(&self.repos, word)
    }

    /// Canonical spelling of `word` if it is a known company.
    pub fn company(&self, word: &str) -> Option<&str> {
        lookup(&self.companies, word)
    }

    /// Known repos mentioned in `text`, in order of appearance.
    pub fn repos_in(&self, text: &str) -> Vec<String> {
        scan(&self.repos, text)
    }

    /// Known companies mentioned in `text`, in order of appearance.
    pub fn companies_in(&self, text: &str) -> Vec<String> {
        scan(&self.companies, text)
    }
}

fn lookup<'a>(names: &'a [String], word: &str) -> Option<&'a str> {
    let word = trim_token(word);
    names
        .iter()
        .find(|name| name.eq_ignore_ascii_case(word))
        .map(String::as_str)
}

fn scan(names: &[String], text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for token in text.split_whitespace() {
        if let Some(name) = lookup(names, token) {
            if !found.iter().any(|f| f == name) {
                found.push(name.to_string());
            }
        }
    }
    found
}

/// Strip surrounding punctuation and a possessive suffix from a token.
pub(crate) fn trim_token(token: &str) -> &str {
    let token = token.trim_matches(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_' || c == '.'));
    let token = token.trim_end_matches('.');
    token
        .strip_suffix("'s")
        .or_else(|| token.strip_suffix("’s"))
        .unwrap_or(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> EntityCatalog {
        EntityCatalog::new(&["JUDO", "LusoTown", "api-gateway"], &["Acme", "Globex"])
    }

    #[test]
    fn lookup_returns_configured_spelling() {
        let catalog = catalog();
        assert_eq!(catalog.repo("judo"), Some("JUDO"));
        assert_eq!(catalog.repo("lusotown,"), Some("LusoTown"));
        assert_eq!(catalog.company("acme's"), Some("Acme"));
        assert_eq!(catalog.repo("Acme"), None);
    }

    #[test]
    fn scan_preserves_order_and_dedupes() {
        let catalog = catalog();
        assert_eq!(
            catalog.repos_in("compare lusotown with JUDO and then LusoTown again"),
            vec!["LusoTown".to_string(), "JUDO".to_string()]
        );
        assert_eq!(catalog.companies_in("nothing here"), Vec::<String>::new());
    }

    #[test]
    fn trims_sentence_punctuation() {
        assert_eq!(trim_token("JUDO."), "JUDO");
        assert_eq!(trim_token("(api-gateway)"), "api-gateway");
    }
}
