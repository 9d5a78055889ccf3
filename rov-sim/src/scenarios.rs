//! scenarios.rs — Named fault presets selectable from the control channel,
//! so a firmware developer can reproduce a failure mode by name instead of
//! hand-assembling a `FaultConfig`.

use crate::sensor_model::FaultConfig;

pub fn preset_imu_dropout() -> FaultConfig {
    FaultConfig { imu_dropout: true, ..Default::default() }
}

pub fn preset_pressure_dropout() -> FaultConfig {
    FaultConfig { pressure_dropout: true, ..Default::default() }
}

pub fn preset_thruster_stall() -> FaultConfig {
    FaultConfig { thruster_stall: true, ..Default::default() }
}

pub fn preset_by_name(name: &str) -> Option<FaultConfig> {
    match name {
        "imu_dropout" => Some(preset_imu_dropout()),
        "pressure_dropout" => Some(preset_pressure_dropout()),
        "thruster_stall" => Some(preset_thruster_stall()),
        "clear" | "default" => Some(FaultConfig::default()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_preset_name_returns_none() {
        assert!(preset_by_name("does-not-exist").is_none());
    }

    #[test]
    fn clear_preset_resets_all_faults() {
        assert_eq!(preset_by_name("clear").unwrap(), FaultConfig::default());
    }
}
