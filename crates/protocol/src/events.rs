//! Signaling-Protokoll (TCP)
//!
//! Definiert alle Nachrichten die ueber die TCP-Verbindung zwischen
//! Client und Server ausgetauscht werden.
//!
//! ## Design
//! - Request/Response Pattern: jede Nachricht hat eine `request_id: u32`
//! - JSON-Serialisierung via serde (TCP, nicht zeitkritisch)
//! - Tagged Enums fuer typsichere Nachrichtentypen
//! - Server-Pushes (Broadcasts) tragen `request_id = 0`

use chrono::{DateTime, Utc};
use funkraum_core::error::FunkraumError;
use funkraum_core::types::{ChannelId, SanctionId, SessionId, UserId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer Error-Responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Allgemein
    InternalError,
    InvalidRequest,
    NotFound,
    Forbidden,
    Conflict,
    // Kanal
    Full,
    // Vermittlung
    Timeout,
    RecipientOffline,
    // Infrastruktur
    Unavailable,
}

impl ErrorCode {
    /// Ordnet einem Kern-Fehler den Wire-Code zu
    pub fn von_fehler(fehler: &FunkraumError) -> Self {
        match fehler {
            FunkraumError::NichtGefunden(_) => Self::NotFound,
            FunkraumError::ZugriffVerweigert(_) => Self::Forbidden,
            FunkraumError::Konflikt(_) => Self::Conflict,
            FunkraumError::KanalVoll => Self::Full,
            FunkraumError::Zeitlimit(_) => Self::Timeout,
            FunkraumError::EmpfaengerOffline => Self::RecipientOffline,
            FunkraumError::NichtErreichbar(_) => Self::Unavailable,
            FunkraumError::Intern(_) | FunkraumError::Anyhow(_) => Self::InternalError,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire-Vokabular
// ---------------------------------------------------------------------------

/// Praesenz-Status auf dem Draht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PraesenzStatus {
    Verbunden,
    Spricht,
    Stumm,
    Abwesend,
}

/// Sanktions-Art auf dem Draht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanktionsArtWire {
    Verwarnung,
    Stummschaltung,
    Bann,
}

/// Kanal-Informationen fuer die Kanalliste
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KanalInfo {
    pub id: ChannelId,
    pub name: String,
    pub kategorie: String,
    pub kapazitaet: u32,
    pub prioritaet: u8,
    pub mitglieder_anzahl: u32,
}

/// Standardisierte Fehler-Antwort
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FehlerAntwort {
    pub code: ErrorCode,
    pub nachricht: String,
}

// ---------------------------------------------------------------------------
// Haupt-Enum: FunkPayload
// ---------------------------------------------------------------------------

/// Alle moeglichen Signaling-Nachrichten (typsicher via Tagged Enum)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FunkPayload {
    // --- Eingehend (Client -> Server) ---
    /// Meldet den Benutzer an und eroeffnet eine Session
    Verbinden {
        user_id: UserId,
        anzeigename: String,
    },
    KanalListe,
    KanalBeitreten {
        kanal: ChannelId,
    },
    KanalVerlassen,
    /// Fordert das Sprechrecht im aktuellen Kanal an
    SendungStart,
    /// Gibt das Sprechrecht im aktuellen Kanal frei
    SendungStop,
    Fluestern {
        ziel_session: SessionId,
        payload: String,
    },
    KanalNachricht {
        payload: String,
    },
    /// Opaker Transport-Aushandlungs-Payload, wird nur weitergereicht
    SetupAustausch {
        ziel_session: SessionId,
        payload: serde_json::Value,
    },
    SanktionVerhaengen {
        ziel: UserId,
        art: SanktionsArtWire,
        grund: String,
        laeuft_ab_am: Option<DateTime<Utc>>,
    },
    SanktionAufheben {
        id: SanctionId,
    },
    StatusSetzen {
        praesenz: Option<PraesenzStatus>,
        lautstaerke: Option<f32>,
    },
    Ping {
        timestamp_ms: u64,
    },
    Pong {
        echo_timestamp_ms: u64,
        server_timestamp_ms: u64,
    },

    // --- Ausgehend (Server -> Client) ---
    SessionBereit {
        session_id: SessionId,
    },
    KanalListeAktualisiert {
        kanaele: Vec<KanalInfo>,
    },
    MitgliedschaftGeaendert {
        kanal: ChannelId,
        mitglieder: Vec<SessionId>,
    },
    UebertragungBegonnen {
        kanal: ChannelId,
        session: SessionId,
    },
    UebertragungBeendet {
        kanal: ChannelId,
        session: SessionId,
    },
    FluesternEmpfangen {
        von: SessionId,
        payload: String,
    },
    KanalRundruf {
        kanal: ChannelId,
        von: SessionId,
        payload: String,
        zeitstempel: DateTime<Utc>,
    },
    SetupAustauschEmpfangen {
        von: SessionId,
        payload: serde_json::Value,
    },
    /// Bestaetigung fuer SanktionVerhaengen/SanktionAufheben
    SanktionBestaetigt {
        id: SanctionId,
    },
    ZugriffVerweigert {
        grund: String,
    },
    Fehler(FehlerAntwort),
}

// ---------------------------------------------------------------------------
// Funk-Frame (Umschlag fuer alle Nachrichten)
// ---------------------------------------------------------------------------

/// Signaling-Nachricht mit Request/Response-Zuordnung
///
/// Jede Nachricht traegt eine `request_id` die der Client vergibt.
/// Der Server kopiert die ID in die Antwort damit der Client
/// Request und Response zuordnen kann. Server-Pushes tragen die ID 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunkMessage {
    /// Eindeutige Nachrichten-ID fuer Request/Response-Zuordnung
    pub request_id: u32,
    /// Inhalt der Nachricht
    pub payload: FunkPayload,
}

/// request_id fuer Server-Pushes ohne zugehoerige Anfrage
pub const PUSH_REQUEST_ID: u32 = 0;

impl FunkMessage {
    /// Erstellt eine neue Signaling-Nachricht
    pub fn new(request_id: u32, payload: FunkPayload) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    /// Erstellt einen Server-Push (request_id = 0)
    pub fn push(payload: FunkPayload) -> Self {
        Self::new(PUSH_REQUEST_ID, payload)
    }

    /// Erstellt eine Pong-Antwort
    pub fn pong(request_id: u32, echo_timestamp_ms: u64, server_timestamp_ms: u64) -> Self {
        Self::new(
            request_id,
            FunkPayload::Pong {
                echo_timestamp_ms,
                server_timestamp_ms,
            },
        )
    }

    /// Erstellt eine Fehler-Antwort
    pub fn fehler(request_id: u32, code: ErrorCode, nachricht: impl Into<String>) -> Self {
        Self::new(
            request_id,
            FunkPayload::Fehler(FehlerAntwort {
                code,
                nachricht: nachricht.into(),
            }),
        )
    }

    /// Erstellt eine Fehler-Antwort aus einem Kern-Fehler
    ///
    /// Code und Nachricht folgen der Fehler-Taxonomie; der Spezialfall
    /// `ZugriffVerweigert` wird als eigene typisierte Ablehnung gemeldet,
    /// damit der Client den Grund anzeigen kann.
    pub fn von_fehler(request_id: u32, fehler: &FunkraumError) -> Self {
        match fehler {
            FunkraumError::ZugriffVerweigert(grund) => Self::new(
                request_id,
                FunkPayload::ZugriffVerweigert {
                    grund: grund.clone(),
                },
            ),
            andere => Self::fehler(request_id, ErrorCode::von_fehler(andere), andere.to_string()),
        }
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
