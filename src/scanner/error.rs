//! Scanner error type.

use thiserror::Error;

use super::ScannerState;
use crate::device::DeviceError;

/// Errors surfaced by the scanner's lifecycle operations.
///
/// Per-window problems (empty windows, sink failures) are never returned;
/// they are logged by the session that hit them.
#[derive(Debug, Error)]
pub enum ScannerError {
    /// Invalid argument or scanner settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// The radio adapter could not be acquired.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// `scan` was called while a scheduler is already running.
    #[error("scanner is already scanning")]
    AlreadyScanning,

    /// The operation is not valid in the current lifecycle state.
    #[error("cannot {operation} a scanner in state '{state}'")]
    InvalidState {
        operation: &'static str,
        state: ScannerState,
    },
}
