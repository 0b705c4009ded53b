use crate::config::Multipliers;
use crate::models::ThresholdBand;

/// Scales `target` by each multiplier. A zero target yields a zero-width band.
pub fn derive_band(target: f64, multipliers: &Multipliers) -> ThresholdBand {
    ThresholdBand {
        fail: target * multipliers.fail,
        warning: target * multipliers.warning,
        above: multipliers.above.map(|above| target * above),
    }
}
