//! Repository-Trait-Definitionen
//!
//! Das Repository-Pattern entkoppelt den Funk-Kern von der konkreten
//! Store-Implementierung. Der Kern verlangt nur eine schluessel-
//! adressierte, abfragbare Collection mit Read-your-writes-Konsistenz
//! pro Verbindung – `MemoryStore` erfuellt das fuer Single-Instance-
//! Betrieb und Tests.

use chrono::{DateTime, Utc};
use funkraum_core::types::{ChannelId, SanctionId, UserId};

use crate::error::DbResult;
use crate::models::{
    AuditEintrag, BerechtigungsRecord, KanalRecord, NeueSanktion, NeuerKanal, SanktionsRecord,
};

/// Repository fuer Kanal-Datenzugriffe
#[allow(async_fn_in_trait)]
pub trait KanalRepository: Send + Sync {
    /// Alle Kanaele laden (aktive und deaktivierte)
    async fn alle(&self) -> DbResult<Vec<KanalRecord>>;

    /// Einen Kanal anhand seiner ID laden
    async fn laden(&self, id: ChannelId) -> DbResult<Option<KanalRecord>>;

    /// Einen neuen Kanal anlegen
    async fn erstellen(&self, kanal: NeuerKanal<'_>) -> DbResult<KanalRecord>;

    /// Einen Kanal soft-deaktivieren (nie hart loeschen)
    ///
    /// Gibt `true` zurueck wenn der Kanal existierte und aktiv war.
    async fn deaktivieren(&self, id: ChannelId) -> DbResult<bool>;
}

/// Repository fuer Sanktions-Datenzugriffe
#[allow(async_fn_in_trait)]
pub trait SanktionsRepository: Send + Sync {
    /// Alle Sanktionen fuer einen Benutzer laden (auch abgelaufene/inaktive)
    async fn fuer_benutzer(&self, ziel: UserId) -> DbResult<Vec<SanktionsRecord>>;

    /// Eine einzelne Sanktion anhand ihrer ID laden
    async fn laden(&self, id: SanctionId) -> DbResult<Option<SanktionsRecord>>;

    /// Eine neue Sanktion anlegen
    async fn erstellen(&self, sanktion: NeueSanktion<'_>) -> DbResult<SanktionsRecord>;

    /// Eine Sanktion explizit deaktivieren (Aufhebung)
    ///
    /// Gibt `true` zurueck wenn die Sanktion existierte und aktiv war.
    async fn deaktivieren(&self, id: SanctionId) -> DbResult<bool>;

    /// Deaktiviert alle Sanktionen deren Ablauf vor `jetzt` liegt
    /// (Expiry-Sweep). Gibt die Anzahl der deaktivierten Sanktionen zurueck.
    async fn abgelaufene_deaktivieren(&self, jetzt: DateTime<Utc>) -> DbResult<u64>;
}

/// Repository fuer Berechtigungs-Datenzugriffe
#[allow(async_fn_in_trait)]
pub trait BerechtigungsRepository: Send + Sync {
    /// Berechtigungs-Datensatz eines Benutzers laden
    ///
    /// `None` bedeutet: kein Datensatz vorhanden – der Aufrufer wendet
    /// die Standard-Berechtigungen an (alles erlaubt).
    async fn laden(&self, user_id: UserId) -> DbResult<Option<BerechtigungsRecord>>;

    /// Berechtigungs-Datensatz setzen oder ueberschreiben
    async fn setzen(&self, record: BerechtigungsRecord) -> DbResult<()>;
}

/// Repository fuer den Audit-Trail (externer Kollaborateur)
///
/// Der Kern ruft nur `aufzeichnen` – fire-and-forget, Fehler werden vom
/// Aufrufer geloggt und nie propagiert.
#[allow(async_fn_in_trait)]
pub trait AuditRepository: Send + Sync {
    /// Einen Audit-Eintrag schreiben
    async fn aufzeichnen(&self, eintrag: AuditEintrag) -> DbResult<()>;
}
