//! Watchlist filter: cheap relevance check run before the gate classifier.
//!
//! Pure and synchronous. The cascade stops at the first rule that decides:
//! symbol, company name or alias, sector plus keyword, content scan.

use serde::{Deserialize, Serialize};

use crate::domain::models::{Trigger, WatchlistConfig};

/// Which rule of the cascade decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMethod {
    SymbolMatch,
    NameMatch,
    KeywordMatch,
    SectorNoKeyword,
    ContentScan,
    NoMatch,
}

impl FilterMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SymbolMatch => "symbol_match",
            Self::NameMatch => "name_match",
            Self::KeywordMatch => "keyword_match",
            Self::SectorNoKeyword => "sector_no_keyword",
            Self::ContentScan => "content_scan",
            Self::NoMatch => "no_match",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterResult {
    pub passed: bool,
    pub reason: String,
    pub method: FilterMethod,
}

impl FilterResult {
    fn pass(method: FilterMethod, reason: String) -> Self {
        Self { passed: true, reason, method }
    }

    fn reject(method: FilterMethod, reason: String) -> Self {
        Self { passed: false, reason, method }
    }
}

/// A watched company as seen by the filter.
#[derive(Debug, Clone)]
struct Entry {
    symbol: String,
    name: String,
}

#[derive(Debug, Clone)]
pub struct WatchlistFilter {
    symbols: Vec<String>,
    /// Lower-cased name or alias, paired with the owning company
    names: Vec<(String, Entry)>,
    sectors: Vec<String>,
    /// Sector and global keywords, lower-cased, sorted, deduplicated
    keywords: Vec<String>,
}

impl WatchlistFilter {
    pub fn new(config: &WatchlistConfig) -> Self {
        let active = config.companies.iter().filter(|c| c.monitoring_active);

        let mut symbols = Vec::new();
        let mut names: Vec<(String, Entry)> = Vec::new();
        for company in active {
            let symbol = company.symbol.trim().to_uppercase();
            if symbol.is_empty() {
                continue;
            }
            let entry = Entry { symbol: symbol.clone(), name: company.name.trim().to_string() };
            for candidate in std::iter::once(&company.name).chain(company.aliases.iter()) {
                let key = candidate.trim().to_lowercase();
                if !key.is_empty() && !names.iter().any(|(k, _)| *k == key) {
                    names.push((key, entry.clone()));
                }
            }
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }

        let sectors = config
            .sectors
            .iter()
            .map(|s| s.name.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let mut keywords: Vec<String> = config
            .sectors
            .iter()
            .flat_map(|s| s.keywords.iter())
            .chain(config.global_keywords.iter())
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        keywords.sort();
        keywords.dedup();

        Self { symbols, names, sectors, keywords }
    }

    /// Run the cascade for one trigger.
    pub fn check(&self, trigger: &Trigger) -> FilterResult {
        let symbol = trigger.company_symbol.as_deref().unwrap_or_default().trim().to_uppercase();
        let company_name = trigger.company_name.as_deref().unwrap_or_default().trim().to_lowercase();
        let sector = trigger.sector.as_deref().unwrap_or_default().trim().to_lowercase();
        let content = trigger.searchable_text().to_lowercase();

        if !symbol.is_empty() && self.symbols.contains(&symbol) {
            return FilterResult::pass(FilterMethod::SymbolMatch, format!("Watched symbol matched: {symbol}"));
        }

        if !company_name.is_empty() {
            if let Some((alias, entry)) = self.names.iter().find(|(alias, _)| company_name.contains(alias.as_str())) {
                return FilterResult::pass(
                    FilterMethod::NameMatch,
                    format!("Watched company/alias matched: {alias} ({})", entry.symbol),
                );
            }
        }

        if !sector.is_empty() && self.sectors.contains(&sector) {
            return match self.find_keyword(&content) {
                Some(keyword) => FilterResult::pass(
                    FilterMethod::KeywordMatch,
                    format!("Watched sector + keyword matched: {keyword}"),
                ),
                None => FilterResult::reject(
                    FilterMethod::SectorNoKeyword,
                    "Watched sector matched but no relevant keywords found".to_string(),
                ),
            };
        }

        if let Some((alias, entry)) = self.names.iter().find(|(alias, _)| content.contains(alias.as_str())) {
            return FilterResult::pass(
                FilterMethod::ContentScan,
                format!("Company mention in content: {alias} ({})", entry.symbol),
            );
        }
        if let Some(watched) = self.symbols.iter().find(|s| contains_word(&content, &s.to_lowercase())) {
            return FilterResult::pass(
                FilterMethod::ContentScan,
                format!("Company symbol mention in content: {watched}"),
            );
        }

        FilterResult::reject(FilterMethod::NoMatch, "No watchlist symbol/name/sector-keyword match".to_string())
    }

    /// The watched company a trigger is about, when the filter can tell.
    ///
    /// Used to fill in the symbol of triggers that arrived without one.
    pub fn resolve_company(&self, trigger: &Trigger) -> Option<(String, String)> {
        let symbol = trigger.company_symbol.as_deref().unwrap_or_default().trim().to_uppercase();
        if !symbol.is_empty() {
            if let Some((_, entry)) = self.names.iter().find(|(_, e)| e.symbol == symbol) {
                return Some((entry.symbol.clone(), entry.name.clone()));
            }
        }

        let company_name = trigger.company_name.as_deref().unwrap_or_default().trim().to_lowercase();
        let content = trigger.searchable_text().to_lowercase();
        let by_name = (!company_name.is_empty())
            .then(|| self.names.iter().find(|(alias, _)| company_name.contains(alias.as_str())))
            .flatten();
        let by_content = || self.names.iter().find(|(alias, _)| content.contains(alias.as_str()));
        let by_symbol = || {
            self.names
                .iter()
                .find(|(_, e)| contains_word(&content, &e.symbol.to_lowercase()))
        };

        by_name
            .or_else(by_content)
            .or_else(by_symbol)
            .map(|(_, e)| (e.symbol.clone(), e.name.clone()))
    }

    fn find_keyword(&self, content: &str) -> Option<&str> {
        self.keywords.iter().find(|k| content.contains(k.as_str())).map(String::as_str)
    }
}

/// Substring match that refuses to match inside a longer alphanumeric word,
/// so a short ticker like "ABB" does not hit "abbreviation".
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
