use std::str::FromStr;
use std::sync::{Arc, Mutex};

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dataset::{HistoricalRecord, HistoricalTable};

/// How one row is picked when several historical rows match a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowSelection {
    /// The last matching row in file order, i.e. the most recent record
    #[default]
    Latest,
    /// A uniformly random matching row; a seed makes the sequence reproducible
    Random { seed: Option<u64> },
}

impl FromStr for RowSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "latest" => Ok(RowSelection::Latest),
            "random" => Ok(RowSelection::Random { seed: None }),
            other => Err(format!("unknown row selection '{}' (expected 'latest' or 'random')", other)),
        }
    }
}

/// Numeric attributes taken from a historical row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedAttributes {
    pub price: f32,
    pub cost: f32,
    pub favorite_category: i64,
}

impl From<&HistoricalRecord> for ResolvedAttributes {
    fn from(record: &HistoricalRecord) -> Self {
        Self {
            price: record.price,
            cost: record.cost,
            favorite_category: record.favorite_category,
        }
    }
}

/// Looks up price, cost and favorite category for an encoded customer/category pair.
#[derive(Debug, Clone)]
pub struct FeatureResolver {
    table: Arc<HistoricalTable>,
    selection: RowSelection,
    rng: Option<Arc<Mutex<StdRng>>>,
}

impl FeatureResolver {
    pub fn new(table: Arc<HistoricalTable>, selection: RowSelection) -> Self {
        let rng = match selection {
            RowSelection::Latest => None,
            RowSelection::Random { seed: Some(seed) } => Some(StdRng::seed_from_u64(seed)),
            RowSelection::Random { seed: None } => Some(StdRng::from_entropy()),
        };
        Self {
            table,
            selection,
            rng: rng.map(|rng| Arc::new(Mutex::new(rng))),
        }
    }

    pub fn table(&self) -> &HistoricalTable {
        &self.table
    }

    pub fn selection(&self) -> RowSelection {
        self.selection
    }

    /// Returns `None` when no row matches the filter.
    pub fn resolve(&self, customer: i64, category: i64, product: Option<i64>) -> Option<ResolvedAttributes> {
        let candidates: Vec<&HistoricalRecord> = self.table.matching(customer, category, product).collect();
        debug!(
            "Resolving customer={} category={} product={:?}: {} candidate rows",
            customer,
            category,
            product,
            candidates.len()
        );

        let chosen = match &self.rng {
            None => candidates.last().copied(),
            Some(_) if candidates.is_empty() => None,
            Some(rng) => {
                // A poisoned lock still holds a valid RNG state
                let mut rng = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                let index = rng.gen_range(0..candidates.len());
                Some(candidates[index])
            }
        };

        chosen.map(ResolvedAttributes::from)
    }
}
