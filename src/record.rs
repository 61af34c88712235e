//! Module that contains the temperature reading types for this application.
//!
//! A reading enters the system as a [`ReadingSubmission`] (the raw form or datagram), is
//! validated into a [`NewReading`] and becomes a [`TemperatureReading`] once the store has
//! assigned an id. Readings are never updated after creation.
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Placeholder shown for readings recorded without a product code.
pub const NO_PRODUCT_CODE: &str = "N/A";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Work shift a reading was taken in.
pub enum Shift {
    #[serde(rename = "1")]
    First,
    #[serde(rename = "2")]
    Second,
    #[serde(rename = "3")]
    Third,
}

impl Shift {
    pub const ALL: [Shift; 3] = [Shift::First, Shift::Second, Shift::Third];

    pub fn as_str(&self) -> &'static str {
        match self {
            Shift::First => "1",
            Shift::Second => "2",
            Shift::Third => "3",
        }
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Shift {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1" => Ok(Shift::First),
            "2" => Ok(Shift::Second),
            "3" => Ok(Shift::Third),
            other => Err(Error::validation("shift", &format!("unknown shift '{}'", other))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
/// Destination market of the measured product.
pub enum Market {
    #[serde(alias = "MI")]
    Internal,
    #[serde(alias = "ME")]
    External,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Internal => "internal",
            Market::External => "external",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "internal" | "mi" => Ok(Market::Internal),
            "external" | "me" => Ok(Market::External),
            other => Err(Error::validation("market", &format!("unknown market '{}'", other))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
/// Physical state of the product when it was measured.
pub enum ProductState {
    #[serde(alias = "Congelado")]
    Frozen,
    #[serde(alias = "Resfriado")]
    Chilled,
}

impl ProductState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductState::Frozen => "frozen",
            ProductState::Chilled => "chilled",
        }
    }
}

impl fmt::Display for ProductState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "frozen" | "congelado" => Ok(ProductState::Frozen),
            "chilled" | "resfriado" => Ok(ProductState::Chilled),
            other => Err(Error::validation("state", &format!("unknown state '{}'", other))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
/// One of the three measuring points of a reading.
pub enum Probe {
    Start,
    Middle,
    End,
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::Start => f.write_str("start"),
            Probe::Middle => f.write_str("middle"),
            Probe::End => f.write_str("end"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
/// The three temperature values of a reading in celsius.
pub struct Temperatures {
    pub start: f64,
    pub middle: f64,
    pub end: f64,
}

impl Temperatures {
    pub fn new(start: f64, middle: f64, end: f64) -> Self {
        Temperatures { start, middle, end }
    }

    pub fn sum(&self) -> f64 {
        self.start + self.middle + self.end
    }

    pub fn mean(&self) -> f64 {
        self.sum() / 3.0
    }

    pub fn get(&self, probe: Probe) -> f64 {
        match probe {
            Probe::Start => self.start,
            Probe::Middle => self.middle,
            Probe::End => self.end,
        }
    }

    /// The values paired with their probe, in measuring order.
    pub fn probes(&self) -> [(Probe, f64); 3] {
        [
            (Probe::Start, self.start),
            (Probe::Middle, self.middle),
            (Probe::End, self.end),
        ]
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// A persisted temperature reading.
pub struct TemperatureReading {
    /// Id assigned by the store.
    pub id: i64,
    pub shift: Shift,
    /// Plant location. `None` only for malformed legacy records.
    pub location: Option<String>,
    pub product_code: Option<String>,
    pub product_name: Option<String>,
    pub market: Market,
    pub state: ProductState,
    /// Calendar date as entered by the operator (`YYYY-MM-DD`).
    pub measured_at_date: String,
    /// Time of day as entered by the operator (`HH:MM`).
    pub measured_at_time: String,
    pub temperatures: Temperatures,
    /// Id of the user that recorded the reading.
    pub recorded_by: String,
    /// Instant derived from the operator date and time.
    pub timestamp: DateTime<Utc>,
}

impl TemperatureReading {
    /// Product code for display, `N/A` if the reading has none.
    pub fn product_code_or_placeholder(&self) -> &str {
        match self.product_code.as_deref() {
            Some(code) if !code.trim().is_empty() => code,
            _ => NO_PRODUCT_CODE,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// A validated reading that has not been stored yet.
pub struct NewReading {
    pub shift: Shift,
    pub location: String,
    pub product_code: Option<String>,
    pub product_name: String,
    pub market: Market,
    pub state: ProductState,
    pub measured_at_date: String,
    pub measured_at_time: String,
    pub temperatures: Temperatures,
    pub recorded_by: String,
    pub timestamp: DateTime<Utc>,
}

impl NewReading {
    /// Attaches the id assigned by the store.
    pub fn with_id(self, id: i64) -> TemperatureReading {
        TemperatureReading {
            id,
            shift: self.shift,
            location: Some(self.location),
            product_code: self.product_code,
            product_name: Some(self.product_name),
            market: self.market,
            state: self.state,
            measured_at_date: self.measured_at_date,
            measured_at_time: self.measured_at_time,
            temperatures: self.temperatures,
            recorded_by: self.recorded_by,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
/// Raw reading as submitted by an operator terminal.
///
/// Every field is optional so validation can report which one is missing.
pub struct ReadingSubmission {
    pub shift: Option<Shift>,
    pub location: Option<String>,
    pub product_code: Option<String>,
    pub product_name: Option<String>,
    pub market: Option<Market>,
    pub state: Option<ProductState>,
    pub measured_at_date: Option<String>,
    pub measured_at_time: Option<String>,
    pub start: Option<f64>,
    pub middle: Option<f64>,
    pub end: Option<f64>,
    pub recorded_by: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// Catalog entry for a product code.
pub struct ProductInfo {
    pub name: String,
    pub market: Option<Market>,
}

/// Known products by their (upper case) code.
pub type ProductCatalog = HashMap<String, ProductInfo>;

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| Error::validation(field, "is mandatory"))
}

fn temperature(value: Option<f64>, field: &str) -> Result<f64> {
    let value = required(value, field)?;
    if !value.is_finite() {
        return Err(Error::validation(field, "must be a finite number"));
    }
    Ok(value)
}

fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|err| Error::validation("measured_at_date", &err.to_string()))
}

/// The operator date in its zero-padded `YYYY-MM-DD` form, e.g. `2024-03-05` for `2024-3-5`.
pub fn normalize_date(date: &str) -> Result<String> {
    Ok(parse_date(date)?.format("%Y-%m-%d").to_string())
}

/// Combines the operator date and time into a UTC instant.
///
/// The pair is interpreted in the local timezone of the host, as entered at the plant.
pub fn derive_timestamp(date: &str, time: &str) -> Result<DateTime<Utc>> {
    let date = parse_date(date)?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
        .map_err(|err| Error::validation("measured_at_time", &err.to_string()))?;

    let local = NaiveDateTime::new(date, time);
    match Local.from_local_datetime(&local).earliest() {
        Some(local) => Ok(DateTime::<Utc>::from(local)),
        None => Err(Error::validation(
            "measured_at_time",
            "does not exist in the local timezone",
        )),
    }
}

impl ReadingSubmission {
    /// Validates the submission, completing product data from the catalog.
    ///
    /// # Errors
    ///
    /// * `Error::Validation` - A mandatory field is missing or the date/time pair cannot
    ///   be turned into a timestamp.
    pub fn validate(self, catalog: &ProductCatalog) -> Result<NewReading> {
        let product_code = non_blank(self.product_code)
            .map(|code| code.to_uppercase())
            .filter(|code| code != NO_PRODUCT_CODE);
        let catalog_entry = product_code.as_ref().and_then(|code| catalog.get(code));

        // A known code decides name and market, as on the terminal form.
        let submitted_name = self.product_name;
        let product_name = catalog_entry
            .map(|entry| entry.name.clone())
            .or_else(|| non_blank(submitted_name));
        let market = catalog_entry
            .and_then(|entry| entry.market)
            .or(self.market);

        let shift = required(self.shift, "shift")?;
        let location = required(non_blank(self.location), "location")?;
        let market = required(market, "market")?;
        let state = required(self.state, "state")?;
        let product_name = required(product_name, "product_name")?;
        let measured_at_date = required(non_blank(self.measured_at_date), "measured_at_date")?;
        let measured_at_time = required(non_blank(self.measured_at_time), "measured_at_time")?;
        let temperatures = Temperatures::new(
            temperature(self.start, "start")?,
            temperature(self.middle, "middle")?,
            temperature(self.end, "end")?,
        );
        let recorded_by = required(non_blank(self.recorded_by), "recorded_by")?;
        let timestamp = derive_timestamp(&measured_at_date, &measured_at_time)?;
        let measured_at_date = normalize_date(&measured_at_date)?;

        Ok(NewReading {
            shift,
            location,
            product_code,
            product_name,
            market,
            state,
            measured_at_date,
            measured_at_time,
            temperatures,
            recorded_by,
            timestamp,
        })
    }
}
