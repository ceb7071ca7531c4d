// Pure aggregation over the loaded table.
//
// Everything here is a stateless function of its inputs; the only state is
// the explicit memo cache at the bottom, which is keyed by table content so
// a cached result can never be told apart from a recomputation.
use crate::error::NotFoundError;
use crate::types::{FilterSelection, SpendRecord};
use log::debug;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

/// Default ranking depth for outlet rankings.
pub const DEFAULT_TOP_N: usize = 15;

/// Dimension a table can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupField {
    Period,
    Type,
    Outlet,
}

impl GroupField {
    fn key_of(self, r: &SpendRecord) -> String {
        match self {
            GroupField::Period => r.period.to_string(),
            GroupField::Type => r.media_type.clone(),
            GroupField::Outlet => r.outlet.clone(),
        }
    }
}

/// Grouped-and-summed amounts, preserving first-encountered group order.
/// Rankings re-sort a copy; the aggregate itself stays in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    keys: Vec<String>,
    totals: Vec<f64>,
    index: HashMap<String, usize>,
}

impl Aggregate {
    fn add(&mut self, key: String, amount: f64) {
        match self.index.get(&key) {
            Some(&i) => self.totals[i] += amount,
            None => {
                self.index.insert(key.clone(), self.keys.len());
                self.keys.push(key);
                self.totals.push(amount);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.index.get(key).map(|&i| self.totals[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.keys
            .iter()
            .zip(self.totals.iter())
            .map(|(k, &v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Sum of all group totals; equals the Amount sum of the input table.
    pub fn total(&self) -> f64 {
        self.totals.iter().sum()
    }
}

/// Apply the conjunctive filter. The all-`Todos` selection returns the table
/// unchanged in row count and content.
pub fn apply_filter(records: &[SpendRecord], filter: &FilterSelection) -> Vec<SpendRecord> {
    records
        .iter()
        .filter(|r| filter.matches(r))
        .cloned()
        .collect()
}

/// Group rows by `field` and sum Amount per group, in first-encountered
/// order. No row is dropped or double-counted.
pub fn sum_by(records: &[SpendRecord], field: GroupField) -> Aggregate {
    let mut agg = Aggregate::default();
    for r in records {
        agg.add(field.key_of(r), r.amount);
    }
    agg
}

/// Descending ranking of an aggregate, truncated to `n` entries. The sort is
/// stable, so exact ties keep the insertion order produced by [`sum_by`].
pub fn rank_top_n(agg: &Aggregate, n: usize) -> Vec<(String, f64)> {
    let mut entries: Vec<(String, f64)> = agg.iter().map(|(k, v)| (k.to_string(), v)).collect();
    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    entries.truncate(n);
    entries
}

/// Per-period totals in chronological order, for line-chart rendering.
pub fn time_series(records: &[SpendRecord]) -> Vec<(i32, f64)> {
    let mut by_period: BTreeMap<i32, f64> = BTreeMap::new();
    for r in records {
        *by_period.entry(r.period).or_insert(0.0) += r.amount;
    }
    by_period.into_iter().collect()
}

/// Share of `part` in `total`, in percent. A zero total yields 0.0 rather
/// than dividing by zero. Full precision; rounding happens at display time.
pub fn percentage_of_total(part: f64, total: f64) -> f64 {
    if total == 0.0 {
        0.0
    } else {
        part / total * 100.0
    }
}

/// 1-based position of `key` in the descending ranking of `agg`.
///
/// The caller must only ask about keys present in the base table; a missing
/// key is a contract violation surfaced as [`NotFoundError`].
pub fn rank_position(agg: &Aggregate, key: &str) -> Result<usize, NotFoundError> {
    if agg.get(key).is_none() {
        return Err(NotFoundError(key.to_string()));
    }
    let ranking = rank_top_n(agg, agg.len());
    ranking
        .iter()
        .position(|(k, _)| k == key)
        .map(|i| i + 1)
        .ok_or_else(|| NotFoundError(key.to_string()))
}

pub fn sorted_periods(records: &[SpendRecord]) -> Vec<i32> {
    records
        .iter()
        .map(|r| r.period)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn sorted_types(records: &[SpendRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.media_type.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn sorted_outlets(records: &[SpendRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.outlet.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn distinct_outlets(records: &[SpendRecord]) -> usize {
    records
        .iter()
        .map(|r| r.outlet.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}

fn table_hash(records: &[SpendRecord]) -> u64 {
    let mut h = DefaultHasher::new();
    for r in records {
        r.period.hash(&mut h);
        r.media_type.hash(&mut h);
        r.outlet.hash(&mut h);
        r.amount.to_bits().hash(&mut h);
        r.source.hash(&mut h);
    }
    records.len().hash(&mut h);
    h.finish()
}

/// Content-addressed memoization of grouped sums.
///
/// Keys are (table hash, filter, group field). The table is loaded once and
/// never mutated, so in practice the hash changes only when a new file is
/// loaded; [`AggregateCache::rebind`] drops all entries when that happens.
#[derive(Debug, Default)]
pub struct AggregateCache {
    table_hash: u64,
    entries: HashMap<(FilterSelection, GroupField), Aggregate>,
}

impl AggregateCache {
    /// Point the cache at (possibly new) table contents. Entries survive
    /// only if the content hash is unchanged.
    pub fn rebind(&mut self, records: &[SpendRecord]) {
        let hash = table_hash(records);
        if hash != self.table_hash {
            debug!("table hash changed, dropping {} cached aggregates", self.entries.len());
            self.entries.clear();
            self.table_hash = hash;
        }
    }

    /// Filter + group, memoized. The result is identical to
    /// `sum_by(&apply_filter(records, filter), field)`.
    pub fn grouped(
        &mut self,
        records: &[SpendRecord],
        filter: &FilterSelection,
        field: GroupField,
    ) -> Aggregate {
        if let Some(hit) = self.entries.get(&(filter.clone(), field)) {
            debug!("cache hit for {:?}/{:?}", filter, field);
            return hit.clone();
        }
        let agg = sum_by(&apply_filter(records, filter), field);
        self.entries.insert((filter.clone(), field), agg.clone());
        agg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(period: i32, tipo: &str, soporte: &str, amount: f64) -> SpendRecord {
        SpendRecord {
            period,
            media_type: tipo.to_string(),
            outlet: soporte.to_string(),
            amount,
            source: "O1".to_string(),
        }
    }

    fn sample() -> Vec<SpendRecord> {
        vec![
            record(2021, "TV", "CanalX", 1000.0),
            record(2021, "TV", "CanalY", 2000.0),
            record(2022, "Prensa", "DiarioZ", 500.0),
            record(2023, "Radio", "OndaQ", 500.0),
        ]
    }

    #[test]
    fn sum_by_preserves_grand_total() {
        let data = sample();
        let input_total: f64 = data.iter().map(|r| r.amount).sum();
        for field in [GroupField::Period, GroupField::Type, GroupField::Outlet] {
            assert_eq!(sum_by(&data, field).total(), input_total);
        }
    }

    #[test]
    fn sum_by_keeps_insertion_order() {
        let agg = sum_by(&sample(), GroupField::Type);
        let keys: Vec<&str> = agg.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["TV", "Prensa", "Radio"]);
        assert_eq!(agg.get("TV"), Some(3000.0));
    }

    #[test]
    fn tv_sample_totals_ranking_and_share() {
        let data = vec![
            record(2021, "TV", "CanalX", 1000.0),
            record(2021, "TV", "CanalY", 2000.0),
        ];
        let by_type = sum_by(&data, GroupField::Type);
        assert_eq!(by_type.get("TV"), Some(3000.0));

        let top = rank_top_n(&sum_by(&data, GroupField::Outlet), 1);
        assert_eq!(top, vec![("CanalY".to_string(), 2000.0)]);

        let pct = percentage_of_total(1000.0, 3000.0);
        assert_eq!(format!("{:.2}", pct), "33.33");
    }

    #[test]
    fn rank_top_n_is_non_increasing_and_bounded() {
        let agg = sum_by(&sample(), GroupField::Outlet);
        let top = rank_top_n(&agg, 10);
        assert_eq!(top.len(), agg.len().min(10));
        for pair in top.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
        assert_eq!(rank_top_n(&agg, 2).len(), 2);
    }

    #[test]
    fn rank_top_n_keeps_insertion_order_on_ties() {
        // DiarioZ and OndaQ tie at 500; DiarioZ was grouped first.
        let top = rank_top_n(&sum_by(&sample(), GroupField::Outlet), 4);
        assert_eq!(top[2].0, "DiarioZ");
        assert_eq!(top[3].0, "OndaQ");
    }

    #[test]
    fn time_series_is_chronological() {
        let mut data = sample();
        data.reverse();
        let series = time_series(&data);
        assert_eq!(
            series,
            vec![(2021, 3000.0), (2022, 500.0), (2023, 500.0)]
        );
    }

    #[test]
    fn percentage_of_zero_total_is_zero() {
        assert_eq!(percentage_of_total(1234.5, 0.0), 0.0);
        assert_eq!(percentage_of_total(0.0, 0.0), 0.0);
    }

    #[test]
    fn rank_position_is_one_based() {
        let agg = sum_by(&sample(), GroupField::Outlet);
        assert_eq!(rank_position(&agg, "CanalY").unwrap(), 1);
        assert_eq!(rank_position(&agg, "CanalX").unwrap(), 2);
    }

    #[test]
    fn rank_position_rejects_unknown_keys() {
        let agg = sum_by(&sample(), GroupField::Outlet);
        assert!(rank_position(&agg, "NoExiste").is_err());
    }

    #[test]
    fn all_todos_filter_round_trips() {
        let data = sample();
        let filtered = apply_filter(&data, &FilterSelection::default());
        assert_eq!(filtered, data);
    }

    #[test]
    fn filters_are_conjunctive() {
        let data = sample();
        let filter = FilterSelection {
            period: Some(2021),
            media_type: Some("TV".to_string()),
            outlet: Some("CanalY".to_string()),
        };
        let filtered = apply_filter(&data, &filter);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].outlet, "CanalY");
    }

    #[test]
    fn cache_matches_recomputation() {
        let data = sample();
        let filter = FilterSelection {
            period: Some(2021),
            ..Default::default()
        };
        let mut cache = AggregateCache::default();
        cache.rebind(&data);
        let fresh = sum_by(&apply_filter(&data, &filter), GroupField::Outlet);
        for _ in 0..2 {
            let cached = cache.grouped(&data, &filter, GroupField::Outlet);
            let a: Vec<(&str, f64)> = cached.iter().collect();
            let b: Vec<(&str, f64)> = fresh.iter().collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn cache_invalidates_on_table_change() {
        let data = sample();
        let mut cache = AggregateCache::default();
        cache.rebind(&data);
        let before = cache.grouped(&data, &FilterSelection::default(), GroupField::Type);
        assert_eq!(before.get("TV"), Some(3000.0));

        let smaller = vec![record(2021, "TV", "CanalX", 10.0)];
        cache.rebind(&smaller);
        let after = cache.grouped(&smaller, &FilterSelection::default(), GroupField::Type);
        assert_eq!(after.get("TV"), Some(10.0));
    }
}
