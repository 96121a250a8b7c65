//! Fehlertypen fuer das Moderations-Crate

use funkraum_db::DbError;
use thiserror::Error;

/// Result-Alias fuer Moderations-Operationen
pub type ModerationsResult<T> = Result<T, ModerationsError>;

/// Fehlertyp fuer Moderations-Operationen
#[derive(Debug, Error)]
pub enum ModerationsError {
    /// Sanktion nicht gefunden
    #[error("Sanktion nicht gefunden: {0}")]
    NichtGefunden(String),

    /// Store-Fehler beim Schreiben einer Sanktion
    ///
    /// Betrifft nur die Admin-Seite (verhaengen/aufheben). Lesepfade im
    /// Gate behandeln Store-Ausfaelle per Fail-Open und erzeugen diesen
    /// Fehler nie.
    #[error("Store-Fehler: {0}")]
    Store(#[from] DbError),
}
