//! Fehlertypen fuer das Store-Crate

use thiserror::Error;

/// Result-Alias fuer Store-Zugriffe
pub type DbResult<T> = Result<T, DbError>;

/// Store-Fehlertypen
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Datensatz nicht gefunden: {0}")]
    NichtGefunden(String),

    #[error("Store nicht erreichbar: {0}")]
    NichtErreichbar(String),

    #[error("Ungueltige Daten: {0}")]
    UngueltigeDaten(String),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Interner Store-Fehler: {0}")]
    Intern(String),
}

impl DbError {
    pub fn nicht_gefunden(msg: impl Into<String>) -> Self {
        Self::NichtGefunden(msg.into())
    }

    pub fn nicht_erreichbar(msg: impl Into<String>) -> Self {
        Self::NichtErreichbar(msg.into())
    }

    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Store nicht erreichbar war.
    ///
    /// Das Sanktions-Gate behandelt diesen Fall per Fail-Open:
    /// Verfuegbarkeit der Kommunikationsschicht geht vor strikter
    /// Durchsetzung.
    pub fn ist_erreichbarkeit(&self) -> bool {
        matches!(self, Self::NichtErreichbar(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erreichbarkeit_erkennung() {
        assert!(DbError::nicht_erreichbar("timeout").ist_erreichbarkeit());
        assert!(!DbError::nicht_gefunden("kanal").ist_erreichbarkeit());
    }
}
