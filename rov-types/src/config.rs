//! Persisted vehicle configuration (`RovConfig`) and its on-disk schema.
//!
//! The schema has drifted over the life of this firmware: early revisions
//! named the yaw-rate gain field `turnSpeed` and the direction-coefficient
//! axes `horizontal/strafe/vertical`; the canonical names below
//! (`rate`, `surge/sway/heave`) are what every current writer produces.
//! [`migrate_legacy_json`] upgrades an old file in place before it is
//! deserialized.

use serde::{Deserialize, Serialize};

/// Thrusters are PWM-driven or DSHOT-driven; only the pulse-width mapping
/// in the framer changes, the control pipeline above it does not care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MicrocontrollerFirmwareVariant {
    Pwm,
    Dshot,
}

impl Default for MicrocontrollerFirmwareVariant {
    fn default() -> Self {
        Self::Pwm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FluidType {
    Freshwater,
    Saltwater,
}

impl Default for FluidType {
    fn default() -> Self {
        Self::Freshwater
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisPid {
    /// Degrees/sec the setpoint advances per unit of operator rate command.
    pub rate: f64,
    #[serde(flatten)]
    pub gains: PidGains,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegulatorPid {
    pub pitch: AxisPid,
    pub roll: AxisPid,
    pub depth: AxisPid,
}

impl Default for RegulatorPid {
    fn default() -> Self {
        let default_axis = AxisPid {
            rate: 20.0,
            gains: PidGains { kp: 1.0, ki: 0.0, kd: 0.0 },
        };
        Self { pitch: default_axis, roll: default_axis, depth: default_axis }
    }
}

/// Per-axis scaling of the operator's six-degree-of-freedom direction vector.
/// Values are floored at 0.1 when used as a divisor (body-frame mixing).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionCoefficients {
    pub surge: f64,
    pub sway: f64,
    pub heave: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl Default for DirectionCoefficients {
    fn default() -> Self {
        Self { surge: 1.0, sway: 1.0, heave: 1.0, pitch: 1.0, yaw: 1.0, roll: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerConfig {
    pub user_max_power: f64,
    pub regulator_max_power: f64,
    pub battery_min_voltage: f64,
    pub battery_max_voltage: f64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            user_max_power: 100.0,
            regulator_max_power: 40.0,
            battery_min_voltage: 14.0,
            battery_max_voltage: 16.8,
        }
    }
}

/// The 8x8 thrust-allocation matrix. Only the first six columns
/// (forward, side, up, pitch, yaw, roll) are meaningful; columns 6 and 7
/// are reserved and must stay zero (spec Open Question iii).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrustAllocationMatrix(pub [[f64; 8]; 8]);

impl Default for ThrustAllocationMatrix {
    fn default() -> Self {
        // Columns: forward, side, up, pitch, yaw, roll, (reserved), (reserved)
        Self([
            [1.0, 1.0, 0.0, 0.0, 0.6, 0.0, 0.0, 0.0],
            [1.0, -1.0, 0.0, 0.0, -0.6, 0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 1.0, 0.0, -1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, -1.0, 0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, -1.0, 0.0, -1.0, 0.0, 0.0],
            [-1.0, 1.0, 0.0, 0.0, -0.6, 0.0, 0.0, 0.0],
            [-1.0, -1.0, 0.0, 0.0, 0.6, 0.0, 0.0, 0.0],
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RovConfig {
    pub firmware_variant: MicrocontrollerFirmwareVariant,
    pub fluid_type: FluidType,
    /// Seconds to reach a full step in the thruster smoothing filter.
    pub smoothing_factor: f64,
    /// Permutation of 0..7 mapping allocation-matrix output order to physical pins.
    pub thruster_pin_identifiers: [usize; 8],
    /// Each entry is +1 or -1.
    pub thruster_spin_directions: [i8; 8],
    pub thruster_allocation: ThrustAllocationMatrix,
    pub regulator_pid: RegulatorPid,
    pub direction_coefficients: DirectionCoefficients,
    pub power: PowerConfig,
}

impl Default for RovConfig {
    fn default() -> Self {
        Self {
            firmware_variant: MicrocontrollerFirmwareVariant::default(),
            fluid_type: FluidType::default(),
            smoothing_factor: 0.2,
            thruster_pin_identifiers: [0, 1, 2, 3, 4, 5, 6, 7],
            thruster_spin_directions: [1, 1, 1, 1, 1, 1, 1, 1],
            thruster_allocation: ThrustAllocationMatrix::default(),
            regulator_pid: RegulatorPid::default(),
            direction_coefficients: DirectionCoefficients::default(),
            power: PowerConfig::default(),
        }
    }
}

/// Upgrade an on-disk JSON document written by an older firmware revision
/// to the canonical field names before `serde_json::from_value` sees it.
///
/// Handles:
/// - `regulator.{pitch,roll,depth}.turnSpeed` → `.rate`
/// - `directionCoefficients.{horizontal,strafe,vertical}` → `{surge,sway,heave}`
/// - top-level key `regulator` renamed to `regulatorPid`
pub fn migrate_legacy_json(mut value: serde_json::Value) -> serde_json::Value {
    let obj = match value.as_object_mut() {
        Some(o) => o,
        None => return value,
    };

    if let Some(regulator) = obj.remove("regulator") {
        obj.entry("regulatorPid".to_string()).or_insert(regulator);
    }

    if let Some(regulator_pid) = obj.get_mut("regulatorPid").and_then(|v| v.as_object_mut()) {
        for axis in ["pitch", "roll", "depth"] {
            if let Some(axis_obj) = regulator_pid.get_mut(axis).and_then(|v| v.as_object_mut()) {
                if let Some(turn_speed) = axis_obj.remove("turnSpeed") {
                    axis_obj.entry("rate".to_string()).or_insert(turn_speed);
                }
            }
        }
    }

    if let Some(coeffs) = obj.get_mut("directionCoefficients").and_then(|v| v.as_object_mut()) {
        let renames = [("horizontal", "surge"), ("strafe", "sway"), ("vertical", "heave")];
        for (old, new) in renames {
            if let Some(v) = coeffs.remove(old) {
                coeffs.entry(new.to_string()).or_insert(v);
            }
        }
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips() {
        let cfg = RovConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: RovConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn default_allocation_matrix_has_zero_reserved_columns() {
        let cfg = RovConfig::default();
        for row in cfg.thruster_allocation.0 {
            assert_eq!(row[6], 0.0);
            assert_eq!(row[7], 0.0);
        }
    }

    #[test]
    fn migrates_legacy_turn_speed_and_axis_names() {
        let legacy = serde_json::json!({
            "firmwareVariant": "PWM",
            "fluidType": "freshwater",
            "smoothingFactor": 0.2,
            "thrusterPinIdentifiers": [0,1,2,3,4,5,6,7],
            "thrusterSpinDirections": [-1,1,-1,1,-1,1,-1,1],
            "thrusterAllocation": RovConfig::default().thruster_allocation,
            "regulator": {
                "pitch": {"turnSpeed": 15.0, "kp": 1.0, "ki": 0.0, "kd": 0.0},
                "roll":  {"turnSpeed": 15.0, "kp": 1.0, "ki": 0.0, "kd": 0.0},
                "depth": {"turnSpeed": 15.0, "kp": 1.0, "ki": 0.0, "kd": 0.0},
            },
            "directionCoefficients": {
                "horizontal": 1.0, "strafe": 1.0, "vertical": 1.0,
                "pitch": 1.0, "yaw": 1.0, "roll": 1.0
            },
            "power": PowerConfig::default(),
        });

        let migrated = migrate_legacy_json(legacy);
        let cfg: RovConfig = serde_json::from_value(migrated).unwrap();
        assert_eq!(cfg.regulator_pid.pitch.rate, 15.0);
        assert_eq!(cfg.direction_coefficients.surge, 1.0);
    }
}
