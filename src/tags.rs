use std::collections::HashSet;

/// The twelve physical channels exported by the plant historian for one
/// generating unit. Each variant maps 1:1 onto exactly one historian tag and
/// one column of the `unit_readings` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorField {
    InletPressure,
    FlowRate,
    BearingTemperature,
    ActivePower,
    ReactivePower,
    PowerFactor,
    RotorSpeed,
    GuideVanePosition,
    BypassValvePosition,
    VoltageUv,
    VoltageVw,
    VoltageWu,
}

impl SensorField {
    pub const ALL: [SensorField; 12] = [
        SensorField::InletPressure,
        SensorField::FlowRate,
        SensorField::BearingTemperature,
        SensorField::ActivePower,
        SensorField::ReactivePower,
        SensorField::PowerFactor,
        SensorField::RotorSpeed,
        SensorField::GuideVanePosition,
        SensorField::BypassValvePosition,
        SensorField::VoltageUv,
        SensorField::VoltageVw,
        SensorField::VoltageWu,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Historian tag name for this channel.
    pub fn tag_name(&self) -> &'static str {
        match self {
            SensorField::InletPressure => "UNIT1.PENSTOCK.PRES",
            SensorField::FlowRate => "UNIT1.PENSTOCK.FLOW",
            SensorField::BearingTemperature => "UNIT1.BRG.TEMP",
            SensorField::ActivePower => "UNIT1.GEN.MW",
            SensorField::ReactivePower => "UNIT1.GEN.MVAR",
            SensorField::PowerFactor => "UNIT1.GEN.PF",
            SensorField::RotorSpeed => "UNIT1.TURB.SPEED",
            SensorField::GuideVanePosition => "UNIT1.WICKET.POS",
            SensorField::BypassValvePosition => "UNIT1.BYPASS.POS",
            SensorField::VoltageUv => "UNIT1.GEN.VUV",
            SensorField::VoltageVw => "UNIT1.GEN.VVW",
            SensorField::VoltageWu => "UNIT1.GEN.VWU",
        }
    }

    /// Column name in the `unit_readings` table.
    pub fn column_name(&self) -> &'static str {
        match self {
            SensorField::InletPressure => "inlet_pressure",
            SensorField::FlowRate => "flow_rate",
            SensorField::BearingTemperature => "bearing_temperature",
            SensorField::ActivePower => "active_power",
            SensorField::ReactivePower => "reactive_power",
            SensorField::PowerFactor => "power_factor",
            SensorField::RotorSpeed => "rotor_speed",
            SensorField::GuideVanePosition => "guide_vane_position",
            SensorField::BypassValvePosition => "bypass_valve_position",
            SensorField::VoltageUv => "voltage_uv",
            SensorField::VoltageVw => "voltage_vw",
            SensorField::VoltageWu => "voltage_wu",
        }
    }

    /// Resolve an incoming historian tag to its channel. Unrecognized tags
    /// return `None`; callers log and count them rather than guessing.
    pub fn from_tag(tag: &str) -> Option<SensorField> {
        Self::ALL.iter().copied().find(|f| f.tag_name() == tag)
    }
}

/// Verify the tag mapping is a bijection: every channel has a distinct tag
/// and a distinct column. Run once at startup before any fetch is issued.
pub fn validate_tag_bindings() -> Result<(), String> {
    let mut tags = HashSet::new();
    let mut columns = HashSet::new();

    for field in SensorField::ALL {
        if !tags.insert(field.tag_name()) {
            return Err(format!("duplicate historian tag: {}", field.tag_name()));
        }
        if !columns.insert(field.column_name()) {
            return Err(format!("duplicate column name: {}", field.column_name()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_mapping_is_bijective() {
        assert!(validate_tag_bindings().is_ok());
    }

    #[test]
    fn test_from_tag_round_trips_every_field() {
        for field in SensorField::ALL {
            assert_eq!(SensorField::from_tag(field.tag_name()), Some(field));
        }
    }

    #[test]
    fn test_from_tag_rejects_unknown() {
        assert_eq!(SensorField::from_tag("UNIT2.GEN.MW"), None);
        assert_eq!(SensorField::from_tag(""), None);
    }

    #[test]
    fn test_field_count() {
        assert_eq!(SensorField::COUNT, 12);
    }
}
