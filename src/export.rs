//! CSV export of readings, summary rows and alerts.
use std::io::Write;

use serde::Serialize;

use crate::error::Result;
use crate::record::TemperatureReading;
use crate::report::{GroupRow, ThresholdAlert};

#[derive(Serialize)]
struct ReadingLine<'a> {
    date: &'a str,
    time: &'a str,
    shift: &'a str,
    location: &'a str,
    code: &'a str,
    product: &'a str,
    market: &'a str,
    state: &'a str,
    start_celsius: String,
    middle_celsius: String,
    end_celsius: String,
}

impl<'a> From<&'a TemperatureReading> for ReadingLine<'a> {
    fn from(reading: &'a TemperatureReading) -> Self {
        ReadingLine {
            date: &reading.measured_at_date,
            time: &reading.measured_at_time,
            shift: reading.shift.as_str(),
            location: reading.location.as_deref().unwrap_or(""),
            code: reading.product_code_or_placeholder(),
            product: reading.product_name.as_deref().unwrap_or(""),
            market: reading.market.as_str(),
            state: reading.state.as_str(),
            start_celsius: format!("{:.1}", reading.temperatures.start),
            middle_celsius: format!("{:.1}", reading.temperatures.middle),
            end_celsius: format!("{:.1}", reading.temperatures.end),
        }
    }
}

#[derive(Serialize)]
struct AlertLine<'a> {
    id: i64,
    date: &'a str,
    time: &'a str,
    shift: &'a str,
    location: &'a str,
    code: &'a str,
    product: &'a str,
    market: &'a str,
    state: &'a str,
    start_celsius: String,
    middle_celsius: String,
    end_celsius: String,
    breaches: String,
}

impl<'a> AlertLine<'a> {
    fn new(alert: &ThresholdAlert<'a>) -> Self {
        let line = ReadingLine::from(alert.reading);
        let breaches: Vec<String> = alert.breaches.iter().map(|probe| probe.to_string()).collect();
        AlertLine {
            id: alert.reading.id,
            date: line.date,
            time: line.time,
            shift: line.shift,
            location: line.location,
            code: line.code,
            product: line.product,
            market: line.market,
            state: line.state,
            start_celsius: line.start_celsius,
            middle_celsius: line.middle_celsius,
            end_celsius: line.end_celsius,
            breaches: breaches.join("|"),
        }
    }
}

/// Writes one line per reading; temperatures keep one decimal.
pub fn write_readings<W: Write>(writer: W, readings: &[TemperatureReading]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    if readings.is_empty() {
        csv_writer.write_record(&[
            "date", "time", "shift", "location", "code", "product", "market", "state",
            "start_celsius", "middle_celsius", "end_celsius",
        ])?;
    }
    for reading in readings {
        csv_writer.serialize(ReadingLine::from(reading))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_group_rows<W: Write>(writer: W, rows: &[GroupRow]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    if rows.is_empty() {
        csv_writer.write_record(&[
            "key", "count", "average", "start_average", "middle_average", "end_average",
        ])?;
    }
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes alerts with the breached probes joined by `|`.
pub fn write_alerts<W: Write>(writer: W, alerts: &[ThresholdAlert<'_>]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    if alerts.is_empty() {
        csv_writer.write_record(&[
            "id", "date", "time", "shift", "location", "code", "product", "market", "state",
            "start_celsius", "middle_celsius", "end_celsius", "breaches",
        ])?;
    }
    for alert in alerts {
        csv_writer.serialize(AlertLine::new(alert))?;
    }
    csv_writer.flush()?;
    Ok(())
}
