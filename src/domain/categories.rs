//! Sector and industry breakdown of scan candidates.

use crate::domain::aggregate::ScanRow;
use crate::domain::universe::Universe;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Categories {
    pub sectors: Vec<CategoryCount>,
    pub industries: Vec<CategoryCount>,
    pub sector_industries: BTreeMap<String, Vec<CategoryCount>>,
}

pub fn build_categories(rows: &[ScanRow], universe: &Universe) -> Categories {
    let mut sectors: HashMap<String, usize> = HashMap::new();
    let mut industries: HashMap<String, usize> = HashMap::new();
    let mut by_sector: HashMap<String, HashMap<String, usize>> = HashMap::new();

    for row in rows {
        let meta = universe.meta(&row.ticker);
        let sector = meta
            .and_then(|m| m.sector.clone())
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        let industry = meta
            .and_then(|m| m.industry.clone())
            .unwrap_or_else(|| UNCATEGORIZED.to_string());

        *sectors.entry(sector.clone()).or_default() += 1;
        *industries.entry(industry.clone()).or_default() += 1;
        *by_sector.entry(sector).or_default().entry(industry).or_default() += 1;
    }

    Categories {
        sectors: ranked(sectors),
        industries: ranked(industries),
        sector_industries: by_sector
            .into_iter()
            .map(|(sector, counts)| (sector, ranked(counts)))
            .collect(),
    }
}

/// Count descending, then name ascending.
fn ranked(counts: HashMap<String, usize>) -> Vec<CategoryCount> {
    let mut out: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(name, candidates)| CategoryCount { name, candidates })
        .collect();
    out.sort_by(|a, b| b.candidates.cmp(&a.candidates).then_with(|| a.name.cmp(&b.name)));
    out
}
