//! Fehlertypen fuer den Signaling-Service

use funkraum_core::error::FunkraumError;
use thiserror::Error;

/// Result-Alias fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Fehler aus dem Funk-Kern (Gate, Registry, Floor)
    #[error(transparent)]
    Kern(#[from] FunkraumError),

    /// Protokollfehler (ungueltiges Frame, falscher Zustand)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),
}
