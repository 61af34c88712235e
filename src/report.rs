//! Report aggregation over an in-memory snapshot of readings.
//!
//! All functions here are pure: they never fail, never touch the store and return the same
//! output for the same input. Readings with a missing grouping field are counted in the
//! [`UNKNOWN_KEY`] bucket so that group counts always add up to the number of readings.
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::slice::Chunks;
use std::str::FromStr;

use serde::Serialize;

use crate::access::{Role, UserProfile};
use crate::error::{Error, Result};
use crate::record::{normalize_date, Market, Probe, ProductState, Shift, TemperatureReading};

/// Bucket for readings whose grouping field is missing or blank.
pub const UNKNOWN_KEY: &str = "unknown";

/// Highest acceptable temperature for frozen products sold to the external market.
pub const DEFAULT_ALERT_THRESHOLD: f64 = -18.0;

/// Number of groups rendered per chart page.
pub const DEFAULT_CHART_PAGE_SIZE: usize = 45;

/// Number of products listed as hottest and coldest on the dashboard.
pub const DASHBOARD_TOP_PRODUCTS: usize = 5;

/// Rounds to two decimal places, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Case-insensitive order of group keys, ties broken by the raw key.
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn bucket(key: Option<String>) -> String {
    match key {
        Some(key) => {
            let trimmed = key.trim();
            if trimmed.is_empty() {
                UNKNOWN_KEY.to_string()
            } else {
                trimmed.to_string()
            }
        }
        None => UNKNOWN_KEY.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Built-in grouping keys.
pub enum GroupKey {
    Product,
    ProductCode,
    Location,
    /// Calendar day the operator entered.
    Day,
    Shift,
    Market,
    State,
    /// User that recorded the reading.
    Operator,
}

impl GroupKey {
    pub fn key_of(&self, reading: &TemperatureReading) -> Option<String> {
        match self {
            GroupKey::Product => reading.product_name.clone(),
            GroupKey::ProductCode => Some(reading.product_code_or_placeholder().to_string()),
            GroupKey::Location => reading.location.clone(),
            GroupKey::Day => {
                let date = reading.measured_at_date.trim();
                if date.is_empty() {
                    Some(reading.timestamp.format("%Y-%m-%d").to_string())
                } else {
                    Some(normalize_date(date).unwrap_or_else(|_| date.to_string()))
                }
            }
            GroupKey::Shift => Some(reading.shift.to_string()),
            GroupKey::Market => Some(reading.market.to_string()),
            GroupKey::State => Some(reading.state.to_string()),
            GroupKey::Operator => Some(reading.recorded_by.clone()),
        }
    }
}

impl FromStr for GroupKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "product" => Ok(GroupKey::Product),
            "code" | "product-code" => Ok(GroupKey::ProductCode),
            "location" => Ok(GroupKey::Location),
            "day" => Ok(GroupKey::Day),
            "shift" => Ok(GroupKey::Shift),
            "market" => Ok(GroupKey::Market),
            "state" => Ok(GroupKey::State),
            "operator" => Ok(GroupKey::Operator),
            other => Err(Error::InvalidArgument(format!("unknown grouping key '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Value of a group row used for ranking.
pub enum Metric {
    /// Mean of all three probes of all readings.
    Combined,
    Start,
    Middle,
    End,
    /// Number of readings in the group.
    Count,
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "combined" | "average" => Ok(Metric::Combined),
            "start" => Ok(Metric::Start),
            "middle" => Ok(Metric::Middle),
            "end" => Ok(Metric::End),
            "count" => Ok(Metric::Count),
            other => Err(Error::InvalidArgument(format!("unknown metric '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Highest values first ("hottest").
    Descending,
    /// Lowest values first ("coldest").
    Ascending,
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "desc" | "descending" | "hottest" => Ok(Direction::Descending),
            "asc" | "ascending" | "coldest" => Ok(Direction::Ascending),
            other => Err(Error::InvalidArgument(format!("unknown direction '{}'", other))),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
/// Summary of all readings sharing one key value.
pub struct GroupRow {
    pub key: String,
    pub count: usize,
    /// Mean of the start, middle and end values combined.
    pub average: f64,
    pub start_average: f64,
    pub middle_average: f64,
    pub end_average: f64,
}

impl GroupRow {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Combined => self.average,
            Metric::Start => self.start_average,
            Metric::Middle => self.middle_average,
            Metric::End => self.end_average,
            Metric::Count => self.count as f64,
        }
    }
}

impl fmt::Display for GroupRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<32} {:>6} {:>8.2} {:>8.2} {:>8.2} {:>8.2}",
            self.key, self.count, self.average, self.start_average, self.middle_average, self.end_average
        )
    }
}

#[derive(Default)]
struct Accumulator {
    count: usize,
    start: f64,
    middle: f64,
    end: f64,
}

impl Accumulator {
    fn add(&mut self, reading: &TemperatureReading) {
        self.count += 1;
        self.start += reading.temperatures.start;
        self.middle += reading.temperatures.middle;
        self.end += reading.temperatures.end;
    }

    fn finish(self, key: String) -> GroupRow {
        let count = self.count as f64;
        GroupRow {
            key,
            count: self.count,
            average: round2((self.start + self.middle + self.end) / (3.0 * count)),
            start_average: round2(self.start / count),
            middle_average: round2(self.middle / count),
            end_average: round2(self.end / count),
        }
    }
}

/// Groups readings by the key `key_fn` extracts and averages their temperatures.
///
/// Rows come back in case-insensitive key order. A `None` or blank key is counted under
/// [`UNKNOWN_KEY`].
pub fn group_and_average<F>(readings: &[TemperatureReading], key_fn: F) -> Vec<GroupRow>
where
    F: Fn(&TemperatureReading) -> Option<String>,
{
    let mut groups: BTreeMap<String, Accumulator> = BTreeMap::new();
    for reading in readings {
        groups
            .entry(bucket(key_fn(reading)))
            .or_insert_with(Accumulator::default)
            .add(reading);
    }

    let mut rows: Vec<GroupRow> = groups
        .into_iter()
        .map(|(key, accumulator)| accumulator.finish(key))
        .collect();
    rows.sort_by(|a, b| compare_keys(&a.key, &b.key));
    rows
}

/// [`group_and_average`] with one of the built-in keys.
pub fn group_by(readings: &[TemperatureReading], key: GroupKey) -> Vec<GroupRow> {
    group_and_average(readings, |reading| key.key_of(reading))
}

/// The first `n` rows ranked by `metric`, keeping key order among equal values.
pub fn top_n(rows: &[GroupRow], n: usize, metric: Metric, direction: Direction) -> Vec<GroupRow> {
    let mut ranked = rows.to_vec();
    ranked.sort_by(|a, b| {
        let by_value = a.value(metric).total_cmp(&b.value(metric));
        let by_value = match direction {
            Direction::Descending => by_value.reverse(),
            Direction::Ascending => by_value,
        };
        by_value.then_with(|| compare_keys(&a.key, &b.key))
    });
    ranked.truncate(n);
    ranked
}

#[derive(Serialize, Debug, Clone, PartialEq)]
/// An external-market frozen reading above the threshold.
pub struct ThresholdAlert<'a> {
    pub reading: &'a TemperatureReading,
    /// Probes whose value exceeded the threshold, in measuring order.
    pub breaches: Vec<Probe>,
}

/// Frozen readings for the external market with at least one probe above `threshold`.
pub fn threshold_alerts(readings: &[TemperatureReading], threshold: f64) -> Vec<ThresholdAlert<'_>> {
    readings
        .iter()
        .filter(|reading| reading.market == Market::External && reading.state == ProductState::Frozen)
        .filter_map(|reading| {
            let breaches: Vec<Probe> = reading
                .temperatures
                .probes()
                .iter()
                .filter(|(_, value)| *value > threshold)
                .map(|(probe, _)| *probe)
                .collect();
            if breaches.is_empty() {
                None
            } else {
                Some(ThresholdAlert { reading, breaches })
            }
        })
        .collect()
}

/// Splits rows into chart pages of `page_size`; the last page may be shorter.
pub fn chunk_rows<T>(rows: &[T], page_size: usize) -> Chunks<'_, T> {
    rows.chunks(page_size.max(1))
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DashboardSummary {
    pub total_readings: usize,
    pub distinct_locations: usize,
    /// Mean of the per-reading averages for the internal market, 0 without readings.
    pub internal_average: f64,
    pub external_average: f64,
    pub hottest_products: Vec<GroupRow>,
    pub coldest_products: Vec<GroupRow>,
}

fn market_average(readings: &[TemperatureReading], market: Market) -> f64 {
    let (total, count) = readings
        .iter()
        .filter(|reading| reading.market == market)
        .fold((0.0, 0usize), |(total, count), reading| {
            (total + reading.temperatures.mean(), count + 1)
        });
    if count == 0 {
        0.0
    } else {
        round2(total / count as f64)
    }
}

pub fn dashboard_summary(readings: &[TemperatureReading]) -> DashboardSummary {
    let locations: BTreeSet<String> = readings
        .iter()
        .map(|reading| bucket(reading.location.clone()))
        .collect();
    let products = group_by(readings, GroupKey::Product);

    DashboardSummary {
        total_readings: readings.len(),
        distinct_locations: locations.len(),
        internal_average: market_average(readings, Market::Internal),
        external_average: market_average(readings, Market::External),
        hottest_products: top_n(&products, DASHBOARD_TOP_PRODUCTS, Metric::Combined, Direction::Descending),
        coldest_products: top_n(&products, DASHBOARD_TOP_PRODUCTS, Metric::Combined, Direction::Ascending),
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OperatorActivity {
    pub operator: String,
    /// Profile name, the operator id when no profile is known.
    pub name: String,
    pub readings: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ShiftActivity {
    pub shift: Shift,
    pub readings: usize,
    pub active_operators: usize,
    pub average_per_operator: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ActivityReport {
    /// Operators ranked by number of readings.
    pub operators: Vec<OperatorActivity>,
    pub shifts: Vec<ShiftActivity>,
}

/// Readings per operator and per shift.
///
/// Every non-admin profile is listed even without readings; readings by unknown operators are
/// listed under their id.
pub fn operator_activity(readings: &[TemperatureReading], profiles: &[UserProfile]) -> ActivityReport {
    let mut counts: BTreeMap<String, usize> = profiles
        .iter()
        .filter(|profile| profile.role == Role::User)
        .map(|profile| (profile.id.clone(), 0))
        .collect();
    for reading in readings {
        *counts.entry(bucket(Some(reading.recorded_by.clone()))).or_insert(0) += 1;
    }

    let mut operators: Vec<OperatorActivity> = counts
        .into_iter()
        .map(|(operator, readings)| {
            let name = profiles
                .iter()
                .find(|profile| profile.id == operator)
                .map(|profile| profile.name.clone())
                .unwrap_or_else(|| operator.clone());
            OperatorActivity { operator, name, readings }
        })
        .collect();
    operators.sort_by(|a, b| {
        b.readings
            .cmp(&a.readings)
            .then_with(|| compare_keys(&a.name, &b.name))
            .then_with(|| a.operator.cmp(&b.operator))
    });

    let mut per_shift: BTreeMap<Shift, (usize, BTreeSet<&str>)> = Shift::ALL
        .iter()
        .map(|shift| (*shift, (0, BTreeSet::new())))
        .collect();
    for reading in readings {
        let entry = per_shift.entry(reading.shift).or_insert_with(|| (0, BTreeSet::new()));
        entry.0 += 1;
        entry.1.insert(reading.recorded_by.as_str());
    }
    let shifts = per_shift
        .into_iter()
        .map(|(shift, (readings, operators))| ShiftActivity {
            shift,
            readings,
            active_operators: operators.len(),
            average_per_operator: if operators.is_empty() {
                0.0
            } else {
                round2(readings as f64 / operators.len() as f64)
            },
        })
        .collect();

    ActivityReport { operators, shifts }
}

/// Readings in ascending timestamp order for the variation chart.
pub fn timeline(readings: &[TemperatureReading]) -> Vec<&TemperatureReading> {
    let mut ordered: Vec<&TemperatureReading> = readings.iter().collect();
    ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Temperatures, NO_PRODUCT_CODE};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    fn reading(id: i64, product: Option<&str>, temps: (f64, f64, f64)) -> TemperatureReading {
        TemperatureReading {
            id,
            shift: Shift::First,
            location: Some("Túnel 1".to_string()),
            product_code: None,
            product_name: product.map(|p| p.to_string()),
            market: Market::Internal,
            state: ProductState::Frozen,
            measured_at_date: "2024-03-05".to_string(),
            measured_at_time: "10:00".to_string(),
            temperatures: Temperatures::new(temps.0, temps.1, temps.2),
            recorded_by: "user-1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap() + chrono::Duration::minutes(id),
        }
    }

    fn profile(id: &str, name: &str, role: Role) -> UserProfile {
        UserProfile {
            id: id.to_string(),
            name: name.to_string(),
            email: format!("{}@plant.example", id),
            employee_number: id.to_string(),
            role,
            permissions: BTreeSet::new(),
        }
    }

    #[test]
    fn product_average_uses_all_nine_values() {
        let readings = vec![
            reading(1, Some("A"), (-20.0, -21.0, -19.0)),
            reading(2, Some("A"), (-18.0, -20.0, -22.0)),
            reading(3, Some("A"), (-19.0, -19.0, -19.0)),
        ];
        let rows = group_by(&readings, GroupKey::Product);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "A");
        assert_eq!(rows[0].count, 3);
        assert_eq!(rows[0].average, -19.67);
        assert_eq!(rows[0].start_average, -19.0);
        assert_eq!(rows[0].middle_average, -20.0);
        assert_eq!(rows[0].end_average, -20.0);
    }

    #[test]
    fn missing_keys_fall_into_unknown_bucket() {
        let readings = vec![
            reading(1, Some("b"), (-20.0, -20.0, -20.0)),
            reading(2, None, (-18.0, -18.0, -18.0)),
            reading(3, Some("  "), (-19.0, -19.0, -19.0)),
            reading(4, Some("A"), (-21.0, -21.0, -21.0)),
        ];
        let rows = group_by(&readings, GroupKey::Product);
        let keys: Vec<&str> = rows.iter().map(|row| row.key.as_str()).collect();
        assert_eq!(keys, vec!["A", "b", UNKNOWN_KEY]);
        assert_eq!(rows.iter().map(|row| row.count).sum::<usize>(), readings.len());
        assert_eq!(rows[2].count, 2);
    }

    #[test]
    fn keys_sort_case_insensitively() {
        let readings = vec![
            reading(1, Some("beta"), (0.0, 0.0, 0.0)),
            reading(2, Some("Alpha"), (0.0, 0.0, 0.0)),
            reading(3, Some("alpha"), (0.0, 0.0, 0.0)),
            reading(4, Some("Gamma"), (0.0, 0.0, 0.0)),
        ];
        let keys: Vec<String> = group_by(&readings, GroupKey::Product)
            .into_iter()
            .map(|row| row.key)
            .collect();
        assert_eq!(keys, vec!["Alpha", "alpha", "beta", "Gamma"]);
    }

    #[test]
    fn custom_key_function_is_honoured() {
        let readings = vec![
            reading(1, Some("A"), (-20.0, -20.0, -20.0)),
            reading(2, Some("B"), (-10.0, -10.0, -10.0)),
        ];
        let rows = group_and_average(&readings, |r| {
            Some(if r.temperatures.mean() < -15.0 { "cold" } else { "warm" }.to_string())
        });
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "cold");
        assert_eq!(rows[1].average, -10.0);
    }

    #[test]
    fn top_n_ranks_with_stable_key_order() {
        let readings = vec![
            reading(1, Some("C"), (-10.0, -10.0, -10.0)),
            reading(2, Some("a"), (-10.0, -10.0, -10.0)),
            reading(3, Some("B"), (-20.0, -20.0, -20.0)),
        ];
        let rows = group_by(&readings, GroupKey::Product);

        let hottest = top_n(&rows, 2, Metric::Combined, Direction::Descending);
        let keys: Vec<&str> = hottest.iter().map(|row| row.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "C"]);

        let coldest = top_n(&rows, 10, Metric::Combined, Direction::Ascending);
        let keys: Vec<&str> = coldest.iter().map(|row| row.key.as_str()).collect();
        assert_eq!(keys, vec!["B", "a", "C"]);

        assert!(top_n(&[], 5, Metric::Combined, Direction::Descending).is_empty());
        assert!(top_n(&rows, 0, Metric::Count, Direction::Descending).is_empty());
    }

    #[test]
    fn threshold_alert_annotates_breached_probes() {
        let mut external = reading(1, Some("A"), (-17.0, -19.0, -20.0));
        external.market = Market::External;
        let mut chilled = reading(2, Some("A"), (5.0, 5.0, 5.0));
        chilled.market = Market::External;
        chilled.state = ProductState::Chilled;
        let internal = reading(3, Some("A"), (-10.0, -10.0, -10.0));

        let readings = vec![external, chilled, internal];
        let alerts = threshold_alerts(&readings, DEFAULT_ALERT_THRESHOLD);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].reading.id, 1);
        assert_eq!(alerts[0].breaches, vec![Probe::Start]);
    }

    #[test]
    fn threshold_is_strict() {
        let mut at_limit = reading(1, Some("A"), (-18.0, -18.0, -17.9));
        at_limit.market = Market::External;
        let readings = vec![at_limit];
        let alerts = threshold_alerts(&readings, DEFAULT_ALERT_THRESHOLD);
        assert_eq!(alerts[0].breaches, vec![Probe::End]);
    }

    #[test]
    fn no_external_frozen_readings_means_no_alerts() {
        let readings = vec![reading(1, Some("A"), (0.0, 0.0, 0.0))];
        assert!(threshold_alerts(&readings, DEFAULT_ALERT_THRESHOLD).is_empty());
    }

    #[test]
    fn chunking_keeps_order_and_short_tail() {
        let rows: Vec<usize> = (0..100).collect();
        let sizes: Vec<usize> = chunk_rows(&rows, DEFAULT_CHART_PAGE_SIZE).map(|page| page.len()).collect();
        assert_eq!(sizes, vec![45, 45, 10]);

        let flattened: Vec<usize> = chunk_rows(&rows, 45).flatten().copied().collect();
        assert_eq!(flattened, rows);

        assert_eq!(chunk_rows(&rows, 0).count(), 100);
        assert_eq!(chunk_rows::<usize>(&[], 45).count(), 0);
    }

    #[test]
    fn dashboard_summarizes_markets_and_products() {
        let mut external = reading(1, Some("Wings"), (-20.0, -20.0, -20.0));
        external.market = Market::External;
        external.location = Some("Câmara A".to_string());
        let readings = vec![
            reading(2, Some("Breast"), (-10.0, -11.0, -12.0)),
            reading(3, Some("Thigh"), (-14.0, -14.0, -14.0)),
            external,
        ];

        let summary = dashboard_summary(&readings);
        assert_eq!(summary.total_readings, 3);
        assert_eq!(summary.distinct_locations, 2);
        assert_eq!(summary.internal_average, -12.5);
        assert_eq!(summary.external_average, -20.0);
        assert_eq!(summary.hottest_products[0].key, "Breast");
        assert_eq!(summary.coldest_products[0].key, "Wings");

        let empty = dashboard_summary(&[]);
        assert_eq!(empty.internal_average, 0.0);
        assert!(empty.hottest_products.is_empty());
    }

    #[test]
    fn activity_ranks_operators_and_shifts() {
        let mut second_shift = reading(3, Some("A"), (0.0, 0.0, 0.0));
        second_shift.shift = Shift::Second;
        second_shift.recorded_by = "user-2".to_string();
        let readings = vec![
            reading(1, Some("A"), (0.0, 0.0, 0.0)),
            reading(2, Some("A"), (0.0, 0.0, 0.0)),
            second_shift,
        ];
        let profiles = vec![
            profile("user-1", "Ana", Role::User),
            profile("user-3", "Caio", Role::User),
            profile("admin", "Admin", Role::Admin),
        ];

        let report = operator_activity(&readings, &profiles);
        let ranking: Vec<(&str, usize)> = report
            .operators
            .iter()
            .map(|activity| (activity.name.as_str(), activity.readings))
            .collect();
        assert_eq!(ranking, vec![("Ana", 2), ("user-2", 1), ("Caio", 0)]);

        let shifts: Vec<(Shift, usize, usize)> = report
            .shifts
            .iter()
            .map(|activity| (activity.shift, activity.readings, activity.active_operators))
            .collect();
        assert_eq!(
            shifts,
            vec![(Shift::First, 2, 1), (Shift::Second, 1, 1), (Shift::Third, 0, 0)]
        );
        assert_eq!(report.shifts[0].average_per_operator, 2.0);
        assert_eq!(report.shifts[2].average_per_operator, 0.0);
    }

    #[test]
    fn activity_lists_every_shift_without_readings() {
        let report = operator_activity(&[], &[]);
        assert!(report.operators.is_empty());
        let shifts: Vec<Shift> = report.shifts.iter().map(|activity| activity.shift).collect();
        assert_eq!(shifts, vec![Shift::First, Shift::Second, Shift::Third]);
        assert!(report.shifts.iter().all(|activity| activity.readings == 0));
    }

    #[test]
    fn day_key_merges_spellings_of_the_same_date() {
        let mut unpadded = reading(2, Some("A"), (-18.0, -18.0, -18.0));
        unpadded.measured_at_date = "2024-3-5".to_string();
        let mut next_day = reading(3, Some("A"), (-18.0, -18.0, -18.0));
        next_day.measured_at_date = "2024-03-06".to_string();
        let readings = vec![next_day, reading(1, Some("A"), (-20.0, -20.0, -20.0)), unpadded];

        let days: Vec<(String, usize)> = group_by(&readings, GroupKey::Day)
            .into_iter()
            .map(|row| (row.key, row.count))
            .collect();
        assert_eq!(days, vec![("2024-03-05".to_string(), 2), ("2024-03-06".to_string(), 1)]);
    }

    #[test]
    fn code_key_uses_placeholder_for_missing_codes() {
        let mut coded = reading(1, Some("A"), (-20.0, -20.0, -20.0));
        coded.product_code = Some("CX10".to_string());
        let readings = vec![coded, reading(2, Some("A"), (-18.0, -18.0, -18.0))];

        let keys: Vec<String> = group_by(&readings, GroupKey::ProductCode)
            .into_iter()
            .map(|row| row.key)
            .collect();
        assert_eq!(keys, vec!["CX10".to_string(), NO_PRODUCT_CODE.to_string()]);
    }

    #[test]
    fn timeline_orders_by_timestamp() {
        let readings = vec![
            reading(3, Some("A"), (0.0, 0.0, 0.0)),
            reading(1, Some("A"), (0.0, 0.0, 0.0)),
            reading(2, Some("A"), (0.0, 0.0, 0.0)),
        ];
        let ids: Vec<i64> = timeline(&readings).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let readings = vec![
            reading(1, Some("A"), (-20.0, -21.0, -19.0)),
            reading(2, Some("B"), (-18.0, -20.0, -22.0)),
            reading(3, None, (-19.0, -19.0, -19.0)),
        ];
        let first = serde_json::to_string(&group_by(&readings, GroupKey::Product)).unwrap();
        let second = serde_json::to_string(&group_by(&readings, GroupKey::Product)).unwrap();
        assert_eq!(first, second);

        let first = serde_json::to_string(&dashboard_summary(&readings)).unwrap();
        let second = serde_json::to_string(&dashboard_summary(&readings)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn parse_report_options() {
        assert_eq!("Location".parse::<GroupKey>().unwrap(), GroupKey::Location);
        assert_eq!("hottest".parse::<Direction>().unwrap(), Direction::Descending);
        assert_eq!("end".parse::<Metric>().unwrap(), Metric::End);
        assert!("weekday".parse::<GroupKey>().is_err());
    }
}
