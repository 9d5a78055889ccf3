//! Byte-level framing for the serial link to the thruster microcontroller.
//!
//! Both directions use the same shape: a start byte, a fixed payload, and a
//! trailing XOR checksum over everything before it. The ESC telemetry reader
//! additionally resynchronizes on a bad checksum by scanning forward for the
//! next start byte, the way a real UART reader has to when it can start
//! listening mid-frame.

use thiserror::Error;

pub const THRUSTER_FRAME_START: u8 = 0x5A;
pub const THRUSTER_FRAME_LEN: usize = 18;
pub const ESC_FRAME_START: u8 = 0xA5;
pub const ESC_FRAME_LEN: usize = 8;
/// Capacity of the ESC inbound read buffer; flushed on overflow.
pub const ESC_READ_BUFFER_CAPACITY: usize = 16;

pub const PULSE_NEUTRAL: u16 = 1000;
pub const PULSE_FORWARD_RANGE: f64 = 1000.0;
pub const PULSE_REVERSE_RANGE: f64 = 1000.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: got {0} bytes")]
    TooShort(usize),
    #[error("bad start byte: {0:#04x}")]
    BadStart(u8),
    #[error("bad checksum")]
    BadChecksum,
    #[error("motor id out of range: {0}")]
    BadMotorId(u8),
}

fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Outbound thruster actuation frame: `[0x5A] [p0_lo p0_hi] .. [p7_lo p7_hi] [xor]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrusterFrame {
    pub pulses: [u16; 8],
}

impl ThrusterFrame {
    pub fn neutral() -> Self {
        Self { pulses: [PULSE_NEUTRAL; 8] }
    }

    /// Map a clipped thrust value in `[-1, 1]` to a pulse-width in `[0, 2000]`.
    pub fn pulse_from_thrust(t: f64) -> u16 {
        let p = if t >= 0.0 {
            PULSE_NEUTRAL as f64 + t * PULSE_FORWARD_RANGE
        } else {
            PULSE_NEUTRAL as f64 + t * PULSE_REVERSE_RANGE
        };
        p.round().clamp(0.0, 2000.0) as u16
    }

    pub fn encode(&self) -> [u8; THRUSTER_FRAME_LEN] {
        let mut frame = [0u8; THRUSTER_FRAME_LEN];
        frame[0] = THRUSTER_FRAME_START;
        for (i, p) in self.pulses.iter().enumerate() {
            let bytes = p.to_le_bytes();
            frame[1 + i * 2] = bytes[0];
            frame[2 + i * 2] = bytes[1];
        }
        frame[17] = xor_checksum(&frame[..17]);
        frame
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != THRUSTER_FRAME_LEN {
            return Err(FrameError::TooShort(bytes.len()));
        }
        if bytes[0] != THRUSTER_FRAME_START {
            return Err(FrameError::BadStart(bytes[0]));
        }
        if xor_checksum(&bytes[..17]) != bytes[17] {
            return Err(FrameError::BadChecksum);
        }
        let mut pulses = [0u16; 8];
        for (i, p) in pulses.iter_mut().enumerate() {
            *p = u16::from_le_bytes([bytes[1 + i * 2], bytes[2 + i * 2]]);
        }
        Ok(Self { pulses })
    }
}

/// ESC telemetry measurement kind, decoded from the inbound frame's type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscMeasurement {
    Erpm,
    Voltage,
    Temperature,
    Current,
    Stress,
}

impl EscMeasurement {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Erpm),
            1 => Some(Self::Voltage),
            2 => Some(Self::Temperature),
            3 => Some(Self::Current),
            4 => Some(Self::Stress),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Self::Erpm => 0,
            Self::Voltage => 1,
            Self::Temperature => 2,
            Self::Current => 3,
            Self::Stress => 4,
        }
    }
}

/// Inbound ESC telemetry frame: `[0xA5] [motor_id] [type] [value:i32le] [xor]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscPacket {
    pub motor_id: u8,
    pub measurement: EscMeasurement,
    pub value: i32,
}

impl EscPacket {
    pub fn encode(&self) -> [u8; ESC_FRAME_LEN] {
        let mut frame = [0u8; ESC_FRAME_LEN];
        frame[0] = ESC_FRAME_START;
        frame[1] = self.motor_id;
        frame[2] = self.measurement.to_byte();
        frame[3..7].copy_from_slice(&self.value.to_le_bytes());
        frame[7] = xor_checksum(&frame[..7]);
        frame
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != ESC_FRAME_LEN {
            return Err(FrameError::TooShort(bytes.len()));
        }
        if bytes[0] != ESC_FRAME_START {
            return Err(FrameError::BadStart(bytes[0]));
        }
        if xor_checksum(&bytes[..7]) != bytes[7] {
            return Err(FrameError::BadChecksum);
        }
        if bytes[1] > 7 {
            return Err(FrameError::BadMotorId(bytes[1]));
        }
        let measurement = EscMeasurement::from_byte(bytes[2]).ok_or(FrameError::BadMotorId(bytes[2]))?;
        let value = i32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]);
        Ok(Self { motor_id: bytes[1], measurement, value })
    }
}

/// Incremental frame reader for the ESC telemetry stream. Bytes arrive in
/// arbitrary chunks from the serial port; `push` appends them and returns
/// every complete, checksum-valid frame found so far, resynchronizing past
/// garbage or corrupted frames by scanning for the next start byte.
#[derive(Debug, Default)]
pub struct EscFrameReader {
    buffer: Vec<u8>,
}

impl EscFrameReader {
    pub fn new() -> Self {
        Self { buffer: Vec::with_capacity(ESC_READ_BUFFER_CAPACITY) }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<EscPacket> {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() > ESC_READ_BUFFER_CAPACITY {
            self.buffer.clear();
            return Vec::new();
        }

        let mut out = Vec::new();
        loop {
            let Some(start) = self.buffer.iter().position(|&b| b == ESC_FRAME_START) else {
                self.buffer.clear();
                break;
            };
            if start > 0 {
                self.buffer.drain(0..start);
            }
            if self.buffer.len() < ESC_FRAME_LEN {
                break;
            }
            match EscPacket::decode(&self.buffer[..ESC_FRAME_LEN]) {
                Ok(packet) => {
                    out.push(packet);
                    self.buffer.drain(0..ESC_FRAME_LEN);
                }
                Err(_) => {
                    // Drop the bad start byte and rescan.
                    self.buffer.remove(0);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thruster_frame_is_18_bytes_and_checksums_to_zero() {
        let frame = ThrusterFrame::neutral().encode();
        assert_eq!(frame.len(), THRUSTER_FRAME_LEN);
        assert_eq!(frame[0], THRUSTER_FRAME_START);
        assert_eq!(xor_checksum(&frame), 0);
    }

    #[test]
    fn thruster_pulse_mapping_matches_scenario_s2() {
        assert_eq!(ThrusterFrame::pulse_from_thrust(0.5), 1500);
        assert_eq!(ThrusterFrame::pulse_from_thrust(-0.5), 500);
        assert_eq!(ThrusterFrame::pulse_from_thrust(0.0), 1000);
    }

    #[test]
    fn thruster_frame_round_trips() {
        let frame = ThrusterFrame { pulses: [1500, 500, 1000, 1000, 1000, 1000, 500, 1500] };
        let bytes = frame.encode();
        assert_eq!(ThrusterFrame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn esc_packet_round_trips() {
        let packet = EscPacket { motor_id: 3, measurement: EscMeasurement::Voltage, value: 16800 };
        let bytes = packet.encode();
        assert_eq!(EscPacket::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn esc_reader_resyncs_past_garbage() {
        let packet = EscPacket { motor_id: 1, measurement: EscMeasurement::Erpm, value: 12345 };
        let mut bytes = vec![0x00, 0x11, 0x22];
        bytes.extend_from_slice(&packet.encode());
        let mut reader = EscFrameReader::new();
        let decoded = reader.push(&bytes);
        assert_eq!(decoded, vec![packet]);
    }

    #[test]
    fn esc_reader_resyncs_past_corrupted_frame() {
        let good = EscPacket { motor_id: 2, measurement: EscMeasurement::Current, value: -500 };
        let mut bytes = vec![ESC_FRAME_START, 9, 9, 0, 0, 0, 0, 0xFF]; // bad motor id + bad checksum
        bytes.extend_from_slice(&good.encode());
        let mut reader = EscFrameReader::new();
        let decoded = reader.push(&bytes);
        assert_eq!(decoded, vec![good]);
    }

    #[test]
    fn esc_reader_flushes_on_overflow() {
        let mut reader = EscFrameReader::new();
        let garbage = vec![0x00u8; ESC_READ_BUFFER_CAPACITY + 1];
        assert!(reader.push(&garbage).is_empty());
        assert!(reader.buffer.is_empty());
    }
}
