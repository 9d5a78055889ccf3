use thiserror::Error;

/// Control-flow-relevant errors. Everything else is `anyhow::Error` at task
/// boundaries; these are the few cases a caller needs to match on.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("regulator coordinate system change failed: {axis} turn coefficient is zero")]
    ZeroTurnCoefficient { axis: &'static str },
    #[error("auto-tune rejected: {0}")]
    AutoTuneRejected(String),
}
