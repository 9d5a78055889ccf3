//! Serial transport to the thruster microcontroller: port discovery, the
//! outbound 60 Hz thruster-frame writer, and the inbound ESC telemetry
//! reader. `serialport`'s API is synchronous, so every call here is meant
//! to run on a blocking-task thread (see `main.rs`'s use of
//! `tokio::task::spawn_blocking`), never directly on an async task.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use rov_types::wire::{EscFrameReader, EscPacket, ThrusterFrame, ESC_FRAME_LEN};

const BAUD_RATE: u32 = 115_200;
const READ_TIMEOUT: Duration = Duration::from_millis(5);
const BY_ID_DIR: &str = "/dev/serial/by-id";
const DEV_DIR: &str = "/dev";

/// Find the microcontroller's serial device. Prefers the stable
/// `/dev/serial/by-id/*Pico*` symlink (survives USB re-enumeration) and
/// falls back to the first `/dev/ttyACM*` node.
pub fn discover_port() -> Option<PathBuf> {
    if let Ok(entries) = std::fs::read_dir(BY_ID_DIR) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().contains("Pico") {
                return Some(entry.path());
            }
        }
    }
    if let Ok(entries) = std::fs::read_dir(DEV_DIR) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with("ttyACM") {
                return Some(entry.path());
            }
        }
    }
    None
}

pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
    esc_reader: EscFrameReader,
    read_buf: [u8; 256],
}

impl SerialLink {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let port = serialport::new(path.to_string_lossy(), BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .open()
            .with_context(|| format!("opening serial port {}", path.display()))?;
        Ok(Self { port, esc_reader: EscFrameReader::new(), read_buf: [0u8; 256] })
    }

    /// Drain whatever bytes are currently available and return any complete,
    /// checksum-valid ESC telemetry packets found in them. A read timeout
    /// (no bytes ready) is not an error; it surfaces as an empty result.
    pub fn poll_esc_packets(&mut self) -> Result<Vec<EscPacket>> {
        match self.port.read(&mut self.read_buf) {
            Ok(0) => Ok(Vec::new()),
            Ok(n) => Ok(self.esc_reader.push(&self.read_buf[..n])),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => bail!("reading ESC telemetry: {e}"),
        }
    }

    /// Clone the underlying handle so the output sender can write frames
    /// from its own task while this struct keeps reading ESC telemetry —
    /// the two directions have independent owners (spec §5).
    pub fn try_clone_writer(&self) -> Result<ThrusterWriter> {
        let port = self.port.try_clone().context("cloning serial port for the output sender")?;
        Ok(ThrusterWriter { port })
    }
}

/// The output sender's half of a split serial link: write-only, owned
/// exclusively by the 60 Hz control tick task.
pub struct ThrusterWriter {
    port: Box<dyn serialport::SerialPort>,
}

impl ThrusterWriter {
    pub fn write_frame(&mut self, frame: &ThrusterFrame) -> Result<()> {
        self.port.write_all(&frame.encode()).context("writing thruster frame")?;
        Ok(())
    }

    pub fn write_neutral(&mut self) -> Result<()> {
        self.write_frame(&ThrusterFrame::neutral())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_port_does_not_panic_without_hardware() {
        // No real Pico is attached in CI; this only exercises the scan logic.
        let _ = discover_port();
    }

    #[test]
    fn esc_frame_len_matches_wire_constant() {
        assert_eq!(ESC_FRAME_LEN, 8);
    }
}
