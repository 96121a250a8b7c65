//! Fehlertypen fuer Funkraum
//!
//! Zentraler Fehler-Enum der die Fehler-Taxonomie des Funk-Kerns abdeckt.
//! Untermodule koennen eigene Fehler definieren und via `#[from]` konvertieren.

use thiserror::Error;

/// Globaler Result-Alias fuer Funkraum
pub type Result<T> = std::result::Result<T, FunkraumError>;

/// Alle moeglichen Fehler im Funkraum-Kern
#[derive(Debug, Error)]
pub enum FunkraumError {
    // --- Ressourcen ---
    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    #[error("Zugriff verweigert: {0}")]
    ZugriffVerweigert(String),

    #[error("Konflikt: {0}")]
    Konflikt(String),

    #[error("Kanal voll")]
    KanalVoll,

    // --- Vermittlung ---
    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    #[error("Empfaenger offline")]
    EmpfaengerOffline,

    // --- Infrastruktur ---
    #[error("Datenquelle nicht erreichbar: {0}")]
    NichtErreichbar(String),

    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl FunkraumError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler die ausloesende Anfrage endgueltig
    /// beendet (wird dem Client als typisierte Ablehnung gemeldet, nie
    /// intern wiederholt)
    pub fn ist_endgueltig(&self) -> bool {
        matches!(
            self,
            Self::NichtGefunden(_)
                | Self::ZugriffVerweigert(_)
                | Self::Konflikt(_)
                | Self::KanalVoll
                | Self::EmpfaengerOffline
        )
    }
}
