use tracing::debug;

use crate::merge::MergedRecord;
use crate::stats::ImportStats;

/// Generator line current in amperes, derived from active power, reactive
/// power and the three line-to-line voltages:
///
/// `S = sqrt(P^2 + Q^2)`, `Vavg = (Vuv + Vvw + Vwu) / 3`,
/// `I = S / (sqrt(3) * Vavg) * 1000`
///
/// with P, Q in kW/kvar and voltages in kV. Returns `None` (and counts a
/// rejection) when any input is absent, when `Vavg` is zero, when the result
/// is non-finite, or when it falls outside `[0, max_amps]`. The cap is a
/// sanity bound against malformed upstream data, not a physical limit.
pub fn compute_current(
    record: &MergedRecord,
    max_amps: f64,
    stats: &mut ImportStats,
) -> Option<f64> {
    let (p, q, v_uv, v_vw, v_wu) = match (
        record.active_power,
        record.reactive_power,
        record.voltage_uv,
        record.voltage_vw,
        record.voltage_wu,
    ) {
        (Some(p), Some(q), Some(uv), Some(vw), Some(wu)) => (p, q, uv, vw, wu),
        _ => return None,
    };

    let apparent_power = (p * p + q * q).sqrt();
    let avg_voltage = (v_uv + v_vw + v_wu) / 3.0;

    if avg_voltage == 0.0 {
        stats.current_rejected += 1;
        debug!(
            "Rejecting current derivation at {}: average voltage is zero",
            record.recorded_at
        );
        return None;
    }

    let current = apparent_power / (3.0_f64.sqrt() * avg_voltage) * 1000.0;

    if !current.is_finite() || !(0.0..=max_amps).contains(&current) {
        stats.current_rejected += 1;
        debug!(
            "Rejecting implausible current {} A at {}",
            current, record.recorded_at
        );
        return None;
    }

    stats.current_computed += 1;
    Some(current)
}
