//! Consumption and cost derived from processed readings.
//!
//! All functions expect readings ordered oldest first, which is how
//! `reading_queries::list_processed_readings` returns them. Unprocessed
//! readings are skipped.

use reading_client::domain::{Meter, Reading, UsageRecord};
use serde::Serialize;
use time::{macros::format_description, Date, OffsetDateTime};

use crate::timestamp::ZoneChain;

pub const DAYS_PER_MONTH: f64 = 30.0;

/// Consumption between two readings. Never negative, so a rolled-over
/// meter or a typo does not show up as water flowing back.
pub fn usage(prev: f64, curr: f64) -> f64 {
    (curr - prev).max(0.0)
}

/// Flat 30-day projection of the mean daily usage: `(usage, cost)`.
pub fn predicted_monthly(daily_usages: &[f64], rate: f64) -> (f64, f64) {
    if daily_usages.is_empty() {
        return (0.0, 0.0);
    }
    let mean = daily_usages.iter().sum::<f64>() / daily_usages.len() as f64;
    let monthly = mean * DAYS_PER_MONTH;
    (monthly, monthly * rate)
}

fn processed_points<'a>(readings: &'a [Reading]) -> impl Iterator<Item = (&'a Reading, f64)> + 'a {
    readings.iter().filter_map(|r| r.processed_value().map(|v| (r, v)))
}

fn local_date(ts: OffsetDateTime, zones: &ZoneChain) -> Date {
    zones.at_instant(ts).date()
}

/// One usage record per local date holding a processed reading.
///
/// A day runs from the last value of the previous reading day (or its own
/// first value when there is none) to its own last value.
pub fn daily_records(meter: &Meter, readings: &[Reading], zones: &ZoneChain) -> Vec<UsageRecord> {
    let mut days: Vec<(Date, f64, f64)> = Vec::new();
    for (reading, value) in processed_points(readings) {
        let date = local_date(reading.ts, zones);
        match days.last_mut() {
            Some((day, _, last)) if *day == date => *last = value,
            _ => days.push((date, value, value)),
        }
    }

    let mut previous_end: Option<f64> = None;
    days.into_iter()
        .map(|(date, first, last)| {
            let start = previous_end.unwrap_or(first);
            previous_end = Some(last);
            let usage_amount = usage(start, last);
            UsageRecord {
                meter_id: meter.id,
                date,
                start_reading: start,
                end_reading: last,
                usage_amount,
                cost_per_unit: meter.cost_per_unit,
                calculated_cost: usage_amount * meter.cost_per_unit,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsagePoint {
    pub date: String,
    pub usage: f64,
    pub reading: f64,
}

/// Consecutive-pair series for charts: usage only counts when the meter went up.
pub fn usage_series(readings: &[Reading], zones: &ZoneChain) -> Vec<UsagePoint> {
    let points: Vec<(&Reading, f64)> = processed_points(readings).collect();
    points
        .windows(2)
        .map(|pair| {
            let (_, prev) = pair[0];
            let (curr_reading, curr) = pair[1];
            UsagePoint {
                date: local_date(curr_reading.ts, zones).to_string(),
                usage: if curr > prev { curr - prev } else { 0.0 },
                reading: curr,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityIssue {
    pub date: String,
    pub usage: f64,
    pub current_reading: f64,
    pub previous_reading: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterAnalytics {
    pub daily_usages: Vec<f64>,
    pub average_daily: f64,
    pub predicted_monthly_usage: f64,
    pub predicted_monthly_cost: f64,
    pub readings_dates: Vec<String>,
    pub total_readings: usize,
    pub has_negative_usage: bool,
    pub negative_count: usize,
    pub data_quality_issues: Vec<QualityIssue>,
    pub no_valid_data: bool,
}

/// Usage overview of one meter; `None` with fewer than two processed readings.
///
/// Raw differences are reported as-is so drops stay visible as quality
/// issues, while the prediction only uses the positive ones.
pub fn meter_analytics(readings: &[Reading], rate: f64, zones: &ZoneChain) -> Option<MeterAnalytics> {
    let points: Vec<(&Reading, f64)> = processed_points(readings).collect();
    if points.len() < 2 {
        return None;
    }

    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]");
    let mut daily_usages = Vec::with_capacity(points.len() - 1);
    let mut readings_dates = Vec::with_capacity(points.len() - 1);
    let mut data_quality_issues = Vec::new();

    for pair in points.windows(2) {
        let (_, previous_reading) = pair[0];
        let (curr, current_reading) = pair[1];
        let local = zones.at_instant(curr.ts);
        let date = local.format(fmt).unwrap_or_else(|_| local.to_string());
        let raw = current_reading - previous_reading;

        if raw < 0.0 {
            data_quality_issues.push(QualityIssue {
                date: date.clone(),
                usage: raw,
                current_reading,
                previous_reading,
            });
        }
        daily_usages.push(raw);
        readings_dates.push(date);
    }

    let positive: Vec<f64> = daily_usages.iter().copied().filter(|u| *u > 0.0).collect();
    let (predicted_monthly_usage, predicted_monthly_cost) = predicted_monthly(&positive, rate);
    let average_daily = if positive.is_empty() {
        0.0
    } else {
        positive.iter().sum::<f64>() / positive.len() as f64
    };

    Some(MeterAnalytics {
        daily_usages,
        average_daily,
        predicted_monthly_usage,
        predicted_monthly_cost,
        readings_dates,
        total_readings: points.len(),
        has_negative_usage: !data_quality_issues.is_empty(),
        negative_count: data_quality_issues.len(),
        data_quality_issues,
        no_valid_data: positive.is_empty(),
    })
}
