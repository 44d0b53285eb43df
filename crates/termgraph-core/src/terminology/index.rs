//! Vocabulary sources and the terminology index
//!
//! Three vocabularies are loaded once at startup and stay immutable for the
//! process lifetime: domain terms grouped into tiers, forbidden
//! general-psychology terms (with an allowed-override list and a replacement
//! map), and an auxiliary category map. The index pre-computes lemma tables
//! so membership tests are O(1) after normalization.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

use super::lemma::{CaseFold, Lemmatizer};

const BUILTIN_DOMAIN_TERMS: &str = include_str!("../../config/terminology/domain_terms.json");
const BUILTIN_FORBIDDEN_TERMS: &str = include_str!("../../config/terminology/forbidden_terms.json");
const BUILTIN_TERM_CATEGORIES: &str = include_str!("../../config/terminology/term_categories.json");

/// Conceptual depth of a domain term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermLevel {
    Root,
    Domain,
    Practice,
    Diagnostic,
    Agent,
    State,
}

impl TermLevel {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Domain => "domain",
            Self::Practice => "practice",
            Self::Diagnostic => "diagnostic",
            Self::Agent => "agent",
            Self::State => "state",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "root" => Some(Self::Root),
            "domain" => Some(Self::Domain),
            "practice" => Some(Self::Practice),
            "diagnostic" => Some(Self::Diagnostic),
            "agent" | "agents" => Some(Self::Agent),
            "state" | "states" => Some(Self::State),
            _ => None,
        }
    }
}

impl std::fmt::Display for TermLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One tier of the domain vocabulary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermTier {
    pub level: TermLevel,
    #[serde(default)]
    pub description: Option<String>,
    pub terms: Vec<String>,
}

/// Domain-term source: tier key (e.g. "tier_3_practice") to tier data
pub type DomainTerms = BTreeMap<String, TermTier>;

/// Forbidden-term source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForbiddenTerms {
    pub forbidden_terms: Vec<String>,
    #[serde(default)]
    pub allowed_general_terms: Vec<String>,
    #[serde(default)]
    pub replacements: HashMap<String, String>,
}

/// Auxiliary category map: category name to terms
pub type TermCategories = BTreeMap<String, Vec<String>>;

/// Provenance record for a single term
#[derive(Debug, Clone, Serialize)]
pub struct TermInfo {
    pub term: String,
    pub tier: u8,
    pub level: TermLevel,
    pub tier_description: Option<String>,
}

/// Immutable lemma-normalized vocabulary index
///
/// Construct once, share by reference (or `Arc`) with every validator and
/// extractor. The lemmatizer is injected; [`CaseFold`] is the default and
/// doubles as the mandated fallback when no morphological analyzer exists.
pub struct TerminologyIndex {
    tiers: DomainTerms,
    forbidden: ForbiddenTerms,
    categories: TermCategories,
    lemmatizer: Arc<dyn Lemmatizer>,

    /// exact term string -> (tier number, level)
    term_meta: HashMap<String, (u8, TermLevel)>,
    /// (lemma, original term), sorted longest lemma first
    domain_lemmas: Vec<(String, String)>,
    /// (lemma, original term) for forbidden terms not on the override list
    forbidden_lemmas: Vec<(String, String)>,
    /// lowercased allowed-override terms
    allowed_general: HashSet<String>,
}

impl TerminologyIndex {
    /// Load the three vocabulary sources from JSON files
    pub fn load(
        domain_path: &Path,
        forbidden_path: &Path,
        categories_path: &Path,
    ) -> Result<Self> {
        let domain = Self::read_source(domain_path, "domain_terms")?;
        let forbidden = Self::read_source(forbidden_path, "forbidden_terms")?;
        let categories = Self::read_source(categories_path, "term_categories")?;
        Self::from_sources(domain, forbidden, categories)
    }

    /// Build from already-parsed sources with the default lemmatizer
    pub fn from_sources(
        tiers: DomainTerms,
        forbidden: ForbiddenTerms,
        categories: TermCategories,
    ) -> Result<Self> {
        Self::with_lemmatizer(tiers, forbidden, categories, Arc::new(CaseFold))
    }

    /// Build from already-parsed sources with an injected lemmatizer
    pub fn with_lemmatizer(
        tiers: DomainTerms,
        forbidden: ForbiddenTerms,
        categories: TermCategories,
        lemmatizer: Arc<dyn Lemmatizer>,
    ) -> Result<Self> {
        let mut term_meta = HashMap::new();
        let mut lemma_map: HashMap<String, String> = HashMap::new();

        for (tier_key, tier) in &tiers {
            let tier_num = Self::tier_number(tier_key);
            for term in &tier.terms {
                term_meta.insert(term.clone(), (tier_num, tier.level));
                lemma_map.insert(lemmatizer.lemmatize_term(term), term.clone());
            }
        }

        if term_meta.is_empty() {
            return Err(Error::vocabulary(
                "domain_terms",
                "no terms found in any tier",
            ));
        }

        // Longest lemma first, so multi-word terms are not shadowed by their
        // component words during entity extraction.
        let mut domain_lemmas: Vec<(String, String)> = lemma_map.into_iter().collect();
        domain_lemmas.sort_by(|a, b| {
            let len_a = a.0.chars().count();
            let len_b = b.0.chars().count();
            len_b.cmp(&len_a).then_with(|| a.0.cmp(&b.0))
        });

        let allowed_general: HashSet<String> = forbidden
            .allowed_general_terms
            .iter()
            .map(|t| t.to_lowercase())
            .collect();

        let forbidden_lemmas: Vec<(String, String)> = forbidden
            .forbidden_terms
            .iter()
            .filter(|t| !allowed_general.contains(&t.to_lowercase()))
            .map(|t| (lemmatizer.lemmatize_term(t), t.clone()))
            .collect();

        info!(
            domain_terms = term_meta.len(),
            forbidden_terms = forbidden_lemmas.len(),
            categories = categories.len(),
            "terminology index loaded"
        );

        Ok(Self {
            tiers,
            forbidden,
            categories,
            lemmatizer,
            term_meta,
            domain_lemmas,
            forbidden_lemmas,
            allowed_general,
        })
    }

    /// Build from the vocabulary shipped with the crate
    pub fn builtin() -> Result<Self> {
        let tiers: DomainTerms = serde_json::from_str(BUILTIN_DOMAIN_TERMS)?;
        let forbidden: ForbiddenTerms = serde_json::from_str(BUILTIN_FORBIDDEN_TERMS)?;
        let categories: TermCategories = serde_json::from_str(BUILTIN_TERM_CATEGORIES)?;
        Self::from_sources(tiers, forbidden, categories)
    }

    fn read_source<T: serde::de::DeserializeOwned>(path: &Path, name: &str) -> Result<T> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {name} at {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::vocabulary(name, e.to_string()))
    }

    fn tier_number(tier_key: &str) -> u8 {
        tier_key
            .split('_')
            .nth(1)
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }

    /// The injected lemmatizer
    pub fn lemmatizer(&self) -> &Arc<dyn Lemmatizer> {
        &self.lemmatizer
    }

    /// Domain-term lemmas paired with their original terms, longest first
    pub fn domain_lemmas(&self) -> &[(String, String)] {
        &self.domain_lemmas
    }

    /// Forbidden-term lemmas paired with their original terms
    ///
    /// Terms on the allowed-override list are already excluded.
    pub fn forbidden_lemmas(&self) -> &[(String, String)] {
        &self.forbidden_lemmas
    }

    /// Is this lemma a domain-term lemma?
    pub fn is_domain_lemma(&self, lemma: &str) -> bool {
        self.domain_lemmas.iter().any(|(l, _)| l == lemma)
    }

    /// Is this term on the allowed-in-general-use override list?
    pub fn is_allowed_general(&self, term: &str) -> bool {
        self.allowed_general.contains(&term.to_lowercase())
    }

    /// Tier number (1..6) by exact term string
    pub fn term_tier(&self, term: &str) -> Option<u8> {
        self.term_meta.get(term).map(|(tier, _)| *tier)
    }

    /// Level by exact term string
    pub fn term_level(&self, term: &str) -> Option<TermLevel> {
        self.term_meta.get(term).map(|(_, level)| *level)
    }

    /// Full provenance record by exact term string
    pub fn term_info(&self, term: &str) -> Option<TermInfo> {
        let (tier, level) = *self.term_meta.get(term)?;
        let tier_description = self
            .tiers
            .values()
            .find(|t| t.level == level && t.terms.iter().any(|candidate| candidate == term))
            .and_then(|t| t.description.clone());
        Some(TermInfo {
            term: term.to_string(),
            tier,
            level,
            tier_description,
        })
    }

    /// Forbidden-to-replacement map
    pub fn replacements(&self) -> &HashMap<String, String> {
        &self.forbidden.replacements
    }

    /// Auxiliary term-category map
    pub fn categories(&self) -> &TermCategories {
        &self.categories
    }

    /// Number of distinct domain terms
    pub fn term_count(&self) -> usize {
        self.term_meta.len()
    }
}

impl std::fmt::Debug for TerminologyIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminologyIndex")
            .field("domain_terms", &self.term_meta.len())
            .field("forbidden_terms", &self.forbidden_lemmas.len())
            .field("categories", &self.categories.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_sources() -> (DomainTerms, ForbiddenTerms, TermCategories) {
        let mut tiers = DomainTerms::new();
        tiers.insert(
            "tier_1_root".to_string(),
            TermTier {
                level: TermLevel::Root,
                description: Some("корни".to_string()),
                terms: vec!["нейро-сталкинг".to_string()],
            },
        );
        tiers.insert(
            "tier_6_states".to_string(),
            TermTier {
                level: TermLevel::State,
                description: None,
                terms: vec!["поле внимания".to_string(), "осознавание".to_string()],
            },
        );
        let forbidden = ForbiddenTerms {
            forbidden_terms: vec!["эго".to_string(), "внимание".to_string()],
            allowed_general_terms: vec!["внимание".to_string()],
            replacements: HashMap::from([("эго".to_string(), "Я-образ".to_string())]),
        };
        (tiers, forbidden, TermCategories::new())
    }

    #[test]
    fn test_longest_lemma_first() {
        let (tiers, forbidden, categories) = minimal_sources();
        let index = TerminologyIndex::from_sources(tiers, forbidden, categories).unwrap();

        let lemmas: Vec<&str> = index.domain_lemmas().iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(lemmas[0], "нейро-сталкинг");
        assert_eq!(lemmas[1], "поле внимания");
        assert_eq!(lemmas[2], "осознавание");
    }

    #[test]
    fn test_tier_and_level_lookup() {
        let (tiers, forbidden, categories) = minimal_sources();
        let index = TerminologyIndex::from_sources(tiers, forbidden, categories).unwrap();

        assert_eq!(index.term_tier("нейро-сталкинг"), Some(1));
        assert_eq!(index.term_level("нейро-сталкинг"), Some(TermLevel::Root));
        assert_eq!(index.term_tier("поле внимания"), Some(6));
        assert_eq!(index.term_tier("неизвестный термин"), None);

        let info = index.term_info("нейро-сталкинг").unwrap();
        assert_eq!(info.tier, 1);
        assert_eq!(info.tier_description.as_deref(), Some("корни"));
    }

    #[test]
    fn test_allowed_override_excluded_from_forbidden() {
        let (tiers, forbidden, categories) = minimal_sources();
        let index = TerminologyIndex::from_sources(tiers, forbidden, categories).unwrap();

        let forbidden_terms: Vec<&str> =
            index.forbidden_lemmas().iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(forbidden_terms, vec!["эго"]);
        assert!(index.is_allowed_general("Внимание"));
    }

    #[test]
    fn test_empty_vocabulary_is_rejected() {
        let forbidden = ForbiddenTerms {
            forbidden_terms: vec![],
            allowed_general_terms: vec![],
            replacements: HashMap::new(),
        };
        let result =
            TerminologyIndex::from_sources(DomainTerms::new(), forbidden, TermCategories::new());
        assert!(matches!(result, Err(Error::Vocabulary { .. })));
    }

    #[test]
    fn test_builtin_vocabulary_loads() {
        let index = TerminologyIndex::builtin().unwrap();
        assert!(index.term_count() > 40);
        assert_eq!(index.term_level("метанаблюдение"), Some(TermLevel::Practice));
        assert_eq!(index.term_level("Я-образ"), Some(TermLevel::Diagnostic));
        assert_eq!(index.term_tier("нейро-сталкинг"), Some(1));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let missing = Path::new("/nonexistent/domain_terms.json");
        let result = TerminologyIndex::load(missing, missing, missing);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
