use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::historian::TagFetch;
use crate::stats::ImportStats;
use crate::tags::SensorField;

/// Status marker written with every row produced by this import path.
pub const STATUS_HISTORICAL_IMPORT: &str = "historical-import";

/// One unified record per timestamp, assembled from all tag responses of a
/// chunk. Every sensor column is tri-state: `Some(v)` including `Some(0.0)`
/// means a measured value, `None` means the historian had nothing usable.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub recorded_at: DateTime<Utc>,
    pub device_id: Option<String>,
    pub inlet_pressure: Option<f64>,
    pub flow_rate: Option<f64>,
    pub bearing_temperature: Option<f64>,
    pub active_power: Option<f64>,
    pub reactive_power: Option<f64>,
    pub power_factor: Option<f64>,
    pub rotor_speed: Option<f64>,
    pub guide_vane_position: Option<f64>,
    pub bypass_valve_position: Option<f64>,
    pub voltage_uv: Option<f64>,
    pub voltage_vw: Option<f64>,
    pub voltage_wu: Option<f64>,
    pub current_amps: Option<f64>,
    pub status: &'static str,
}

impl MergedRecord {
    pub fn new(recorded_at: DateTime<Utc>, device_id: Option<String>) -> Self {
        Self {
            recorded_at,
            device_id,
            inlet_pressure: None,
            flow_rate: None,
            bearing_temperature: None,
            active_power: None,
            reactive_power: None,
            power_factor: None,
            rotor_speed: None,
            guide_vane_position: None,
            bypass_valve_position: None,
            voltage_uv: None,
            voltage_vw: None,
            voltage_wu: None,
            current_amps: None,
            status: STATUS_HISTORICAL_IMPORT,
        }
    }

    pub fn get(&self, field: SensorField) -> Option<f64> {
        match field {
            SensorField::InletPressure => self.inlet_pressure,
            SensorField::FlowRate => self.flow_rate,
            SensorField::BearingTemperature => self.bearing_temperature,
            SensorField::ActivePower => self.active_power,
            SensorField::ReactivePower => self.reactive_power,
            SensorField::PowerFactor => self.power_factor,
            SensorField::RotorSpeed => self.rotor_speed,
            SensorField::GuideVanePosition => self.guide_vane_position,
            SensorField::BypassValvePosition => self.bypass_valve_position,
            SensorField::VoltageUv => self.voltage_uv,
            SensorField::VoltageVw => self.voltage_vw,
            SensorField::VoltageWu => self.voltage_wu,
        }
    }

    pub fn set(&mut self, field: SensorField, value: f64) {
        let slot = match field {
            SensorField::InletPressure => &mut self.inlet_pressure,
            SensorField::FlowRate => &mut self.flow_rate,
            SensorField::BearingTemperature => &mut self.bearing_temperature,
            SensorField::ActivePower => &mut self.active_power,
            SensorField::ReactivePower => &mut self.reactive_power,
            SensorField::PowerFactor => &mut self.power_factor,
            SensorField::RotorSpeed => &mut self.rotor_speed,
            SensorField::GuideVanePosition => &mut self.guide_vane_position,
            SensorField::BypassValvePosition => &mut self.bypass_valve_position,
            SensorField::VoltageUv => &mut self.voltage_uv,
            SensorField::VoltageVw => &mut self.voltage_vw,
            SensorField::VoltageWu => &mut self.voltage_wu,
        };
        *slot = Some(value);
    }

    /// Count of the twelve sensor fields currently present.
    pub fn present_field_count(&self) -> usize {
        SensorField::ALL
            .iter()
            .filter(|f| self.get(**f).is_some())
            .count()
    }
}

/// Join per-tag sample arrays into one record per timestamp. Samples below
/// `min_confidence` are dropped; samples for unrecognized tags are warned
/// about and counted, never silently mapped. `0.0` is a present value.
pub fn merge_tag_fetches(
    fetches: &[TagFetch],
    device_id: Option<&str>,
    min_confidence: f64,
    stats: &mut ImportStats,
) -> BTreeMap<DateTime<Utc>, MergedRecord> {
    let mut records: BTreeMap<DateTime<Utc>, MergedRecord> = BTreeMap::new();

    for fetch in fetches {
        let field = match SensorField::from_tag(&fetch.tag_name) {
            Some(field) => field,
            None => {
                warn!(
                    "Historian returned unmapped tag '{}' ({} samples), discarding",
                    fetch.tag_name,
                    fetch.samples.len()
                );
                stats.unmapped_tag_samples += fetch.samples.len() as u64;
                continue;
            }
        };

        for sample in &fetch.samples {
            if sample.confidence < min_confidence {
                stats.samples_low_confidence += 1;
                continue;
            }

            let value = match sample.value {
                Some(value) => value,
                None => continue,
            };

            if value == 0.0 {
                stats.zero_values_preserved += 1;
            }

            records
                .entry(sample.timestamp)
                .or_insert_with(|| {
                    MergedRecord::new(sample.timestamp, device_id.map(str::to_string))
                })
                .set(field, value);
        }

        *stats
            .per_tag_samples
            .entry(fetch.tag_name.clone())
            .or_default() += fetch.samples.len() as u64;
    }

    debug!("Merged {} tag responses into {} records", fetches.len(), records.len());
    stats.records_merged += records.len() as u64;
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::historian::TagSample;
    use chrono::TimeZone;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap()
    }

    fn fetch(tag: &str, samples: Vec<(u32, Option<f64>, f64)>) -> TagFetch {
        TagFetch {
            tag_name: tag.to_string(),
            samples: samples
                .into_iter()
                .map(|(minute, value, confidence)| TagSample {
                    timestamp: ts(minute),
                    value,
                    confidence,
                })
                .collect(),
        }
    }

    #[test]
    fn test_merge_joins_tags_by_timestamp() {
        let fetches = vec![
            fetch("UNIT1.GEN.MW", vec![(0, Some(25.0), 100.0), (1, Some(26.0), 100.0)]),
            fetch("UNIT1.GEN.MVAR", vec![(0, Some(4.0), 100.0)]),
        ];
        let mut stats = ImportStats::default();
        let records = merge_tag_fetches(&fetches, Some("unit-1"), 90.0, &mut stats);

        assert_eq!(records.len(), 2);
        let first = &records[&ts(0)];
        assert_eq!(first.active_power, Some(25.0));
        assert_eq!(first.reactive_power, Some(4.0));
        assert_eq!(first.device_id.as_deref(), Some("unit-1"));

        let second = &records[&ts(1)];
        assert_eq!(second.active_power, Some(26.0));
        assert_eq!(second.reactive_power, None);
    }

    #[test]
    fn test_low_confidence_samples_dropped() {
        let fetches = vec![fetch(
            "UNIT1.GEN.MW",
            vec![(0, Some(25.0), 89.9), (1, Some(26.0), 90.0)],
        )];
        let mut stats = ImportStats::default();
        let records = merge_tag_fetches(&fetches, None, 90.0, &mut stats);

        assert_eq!(records.len(), 1);
        assert!(records.contains_key(&ts(1)));
        assert_eq!(stats.samples_low_confidence, 1);
    }

    #[test]
    fn test_zero_is_a_present_value() {
        let fetches = vec![fetch("UNIT1.TURB.SPEED", vec![(0, Some(0.0), 100.0)])];
        let mut stats = ImportStats::default();
        let records = merge_tag_fetches(&fetches, None, 90.0, &mut stats);

        let record = &records[&ts(0)];
        assert_eq!(record.rotor_speed, Some(0.0));
        assert_eq!(record.present_field_count(), 1);
        assert_eq!(stats.zero_values_preserved, 1);
    }

    #[test]
    fn test_null_value_stays_absent() {
        let fetches = vec![fetch("UNIT1.GEN.MW", vec![(0, None, 100.0)])];
        let mut stats = ImportStats::default();
        let records = merge_tag_fetches(&fetches, None, 90.0, &mut stats);

        // A confident-but-null sample creates no field, and no record either
        // unless some other tag contributes one.
        assert!(records.is_empty());
    }

    #[test]
    fn test_unknown_tag_discarded_and_counted() {
        let fetches = vec![
            fetch("UNIT9.MYSTERY", vec![(0, Some(1.0), 100.0)]),
            fetch("UNIT1.GEN.MW", vec![(0, Some(25.0), 100.0)]),
        ];
        let mut stats = ImportStats::default();
        let records = merge_tag_fetches(&fetches, None, 90.0, &mut stats);

        assert_eq!(records.len(), 1);
        assert_eq!(records[&ts(0)].present_field_count(), 1);
        assert_eq!(stats.unmapped_tag_samples, 1);
    }

    #[test]
    fn test_field_accessors_cover_all_twelve() {
        let mut record = MergedRecord::new(ts(0), None);
        for (i, field) in SensorField::ALL.iter().enumerate() {
            record.set(*field, i as f64);
        }
        assert_eq!(record.present_field_count(), 12);
        for (i, field) in SensorField::ALL.iter().enumerate() {
            assert_eq!(record.get(*field), Some(i as f64));
        }
    }
}
