use crate::models::{Flag, ThresholdBand};

/// Failing means strictly below the fail boundary.
pub fn evaluate(actual: f64, band: &ThresholdBand) -> Flag {
    Flag {
        is_failing: actual < band.fail,
    }
}

/// Appends `marker` to `base` when the flag is set. Already-decorated labels
/// are returned unchanged.
pub fn decorate(base: &str, flag: Flag, marker: &str) -> String {
    if flag.is_failing && !marker.is_empty() && !base.ends_with(marker) {
        format!("{base}{marker}")
    } else {
        base.to_string()
    }
}
