//! Per-parameter sanity ranges.
//!
//! These are wide "commercially plausible" ranges, NOT market levels.
//! A value outside them is almost certainly an extraction or document
//! error. Flagging thresholds sit far outside the range itself: below
//! 10% of the minimum or above 10x the maximum.

/// Plausibility range for one solver parameter.
pub struct ParameterRange {
    pub parameter: &'static str,
    pub unit: &'static str,
    pub min: f64,
    pub max: f64,
}

/// Shipped ranges for the ammonia book's bound parameters.
pub const PARAMETER_RANGES: &[ParameterRange] = &[
    ParameterRange { parameter: "price_usd_ton", unit: "$/ton", min: 100.0, max: 1200.0 },
    ParameterRange { parameter: "cargo_size_mt", unit: "mt", min: 1_000.0, max: 80_000.0 },
    ParameterRange { parameter: "annual_volume_mt", unit: "mt", min: 10_000.0, max: 1_000_000.0 },
    ParameterRange { parameter: "monthly_volume_mt", unit: "mt", min: 1_000.0, max: 100_000.0 },
    ParameterRange { parameter: "quantity_tolerance_pct", unit: "%", min: 1.0, max: 15.0 },
    ParameterRange { parameter: "payment_days", unit: "days", min: 5.0, max: 180.0 },
    ParameterRange { parameter: "loading_rate_mt_day", unit: "mt/day", min: 500.0, max: 25_000.0 },
    ParameterRange { parameter: "discharge_rate_mt_day", unit: "mt/day", min: 500.0, max: 25_000.0 },
    ParameterRange { parameter: "demurrage_usd_day", unit: "$/day", min: 5_000.0, max: 100_000.0 },
    ParameterRange { parameter: "laytime_hours", unit: "hours", min: 12.0, max: 240.0 },
    ParameterRange { parameter: "shortfall_penalty_usd_ton", unit: "$/ton", min: 5.0, max: 200.0 },
    ParameterRange { parameter: "late_delivery_penalty_usd_day", unit: "$/day", min: 1_000.0, max: 100_000.0 },
];

/// Look up the range for a parameter, if one is registered.
pub fn range_for(parameter: &str) -> Option<&'static ParameterRange> {
    PARAMETER_RANGES.iter().find(|r| r.parameter == parameter)
}

/// Whether a value is suspicious for its parameter: below 10% of the
/// range minimum or above 10x the range maximum. Unregistered
/// parameters are never suspicious.
pub fn is_suspicious(parameter: &str, value: f64) -> bool {
    match range_for(parameter) {
        Some(range) => value < range.min * 0.1 || value > range.max * 10.0,
        None => false,
    }
}
