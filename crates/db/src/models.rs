//! Store-Modelle fuer Funkraum
//!
//! Diese Typen repraesentieren Datensaetze aus dem Backing-Store.
//! Sie sind von den Laufzeit-Typen getrennt und dienen als reine
//! Datenuebertragungsobjekte.

use chrono::{DateTime, Utc};
use funkraum_core::types::{ChannelId, SanctionId, UserId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Kanaele
// ---------------------------------------------------------------------------

/// Kanal-Kategorie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KanalKategorie {
    Oeffentlich,
    Privat,
    Notfall,
}

impl KanalKategorie {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Oeffentlich => "oeffentlich",
            Self::Privat => "privat",
            Self::Notfall => "notfall",
        }
    }
}

impl std::str::FromStr for KanalKategorie {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oeffentlich" | "public" => Ok(Self::Oeffentlich),
            "privat" | "private" => Ok(Self::Privat),
            "notfall" | "emergency" => Ok(Self::Notfall),
            other => Err(format!("Unbekannte Kanal-Kategorie: {other}")),
        }
    }
}

/// Kanal-Datensatz aus dem Store
///
/// Kanaele werden nie hart geloescht solange sie aktiv waren –
/// Deaktivierung erfolgt ueber das `aktiv`-Flag (Soft-Delete).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KanalRecord {
    pub id: ChannelId,
    pub name: String,
    pub kategorie: KanalKategorie,
    /// Maximale Mitgliederzahl
    pub kapazitaet: u32,
    /// Prioritaetsrang 1–5; beeinflusst nur die Anzeige-Sortierung,
    /// verdraengt nie Mitglieder aus anderen Kanaelen
    pub prioritaet: u8,
    pub aktiv: bool,
    pub erstellt_am: DateTime<Utc>,
}

/// Daten zum Erstellen eines neuen Kanals
#[derive(Debug, Clone)]
pub struct NeuerKanal<'a> {
    pub name: &'a str,
    pub kategorie: KanalKategorie,
    pub kapazitaet: u32,
    pub prioritaet: u8,
}

impl Default for NeuerKanal<'_> {
    fn default() -> Self {
        Self {
            name: "",
            kategorie: KanalKategorie::Oeffentlich,
            kapazitaet: 16,
            prioritaet: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Sanktionen
// ---------------------------------------------------------------------------

/// Art einer Moderations-Sanktion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanktionsArt {
    Verwarnung,
    Stummschaltung,
    Bann,
}

impl SanktionsArt {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Verwarnung => "verwarnung",
            Self::Stummschaltung => "stummschaltung",
            Self::Bann => "bann",
        }
    }
}

/// Sanktions-Datensatz
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanktionsRecord {
    pub id: SanctionId,
    pub ziel: UserId,
    pub art: SanktionsArt,
    pub grund: String,
    pub ausgestellt_von: Option<UserId>,
    /// Ablaufzeitpunkt; `None` = permanent
    pub laeuft_ab_am: Option<DateTime<Utc>>,
    pub aktiv: bool,
    pub erstellt_am: DateTime<Utc>,
}

impl SanktionsRecord {
    /// Prueft ob die Sanktion zum Zeitpunkt `jetzt` in Kraft ist.
    ///
    /// Reine Funktion von (Sanktion, jetzt): `aktiv` UND (kein Ablauf ODER
    /// Ablauf in der Zukunft). Dem gespeicherten `aktiv`-Flag wird ueber
    /// eine Ablaufgrenze hinaus nie vertraut.
    pub fn in_kraft(&self, jetzt: DateTime<Utc>) -> bool {
        self.aktiv && self.laeuft_ab_am.is_none_or(|ablauf| ablauf > jetzt)
    }

    /// Prueft ob die Sanktion permanent ist (kein Ablaufzeitpunkt)
    pub fn ist_permanent(&self) -> bool {
        self.laeuft_ab_am.is_none()
    }
}

/// Daten zum Erstellen einer Sanktion
#[derive(Debug, Clone)]
pub struct NeueSanktion<'a> {
    pub ziel: UserId,
    pub art: SanktionsArt,
    pub grund: &'a str,
    pub ausgestellt_von: Option<UserId>,
    pub laeuft_ab_am: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Berechtigungen
// ---------------------------------------------------------------------------

/// Berechtigungs-Datensatz eines Benutzers
///
/// Fehlt der Datensatz im Store, gelten alle Felder als erlaubt
/// (Default: alles true).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BerechtigungsRecord {
    pub user_id: UserId,
    pub darf_betreten: bool,
    pub darf_sprechen: bool,
    pub darf_schreiben: bool,
}

impl BerechtigungsRecord {
    /// Standard-Berechtigungen: alles erlaubt
    pub fn standard(user_id: UserId) -> Self {
        Self {
            user_id,
            darf_betreten: true,
            darf_sprechen: true,
            darf_schreiben: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Audit-Eintrag fuer zustandsveraendernde Aktionen
///
/// Wird fire-and-forget geschrieben: Fehler werden geloggt, blockieren
/// aber nie die ausloesende Operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEintrag {
    pub aktion: String,
    pub modul: String,
    pub akteur: Option<UserId>,
    pub beschreibung: String,
    pub zeitstempel: DateTime<Utc>,
}

impl AuditEintrag {
    /// Erstellt einen neuen Audit-Eintrag mit aktuellem Zeitstempel
    pub fn neu(
        aktion: impl Into<String>,
        modul: impl Into<String>,
        akteur: Option<UserId>,
        beschreibung: impl Into<String>,
    ) -> Self {
        Self {
            aktion: aktion.into(),
            modul: modul.into(),
            akteur,
            beschreibung: beschreibung.into(),
            zeitstempel: Utc::now(),
        }
    }
}
