//! Watchlist: the companies and sectors worth paying attention to.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchedSector {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchedCompany {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default = "default_true")]
    pub monitoring_active: bool,
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchlistConfig {
    #[serde(default)]
    pub sectors: Vec<WatchedSector>,
    #[serde(default)]
    pub companies: Vec<WatchedCompany>,
    #[serde(default)]
    pub global_keywords: Vec<String>,
}

impl WatchlistConfig {
    /// Upper-case symbols and trim names, keywords and aliases.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for company in &mut self.companies {
            company.symbol = company.symbol.trim().to_uppercase();
            company.name = company.name.trim().to_string();
            company.aliases = company
                .aliases
                .iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect();
        }
        for sector in &mut self.sectors {
            sector.name = sector.name.trim().to_string();
            sector.keywords = sector
                .keywords
                .iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        }
        self.global_keywords = self
            .global_keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        self
    }

    pub fn company(&self, symbol: &str) -> Option<&WatchedCompany> {
        self.companies.iter().find(|c| c.symbol.eq_ignore_ascii_case(symbol))
    }

    /// Symbols that appear more than once.
    pub fn duplicate_symbols(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut duplicates: Vec<String> = self
            .companies
            .iter()
            .map(|c| c.symbol.to_uppercase())
            .filter(|s| !seen.insert(s.clone()))
            .collect();
        duplicates.sort();
        duplicates.dedup();
        duplicates
    }
}
