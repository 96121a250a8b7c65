//! In-Memory-Store – Referenzimplementierung aller Repository-Traits
//!
//! Schluessel-adressierte Collections auf DashMap-Basis. Read-your-writes
//! ist per Konstruktion gegeben. Fuer Tests laesst sich ueber
//! `erreichbarkeit_setzen(false)` ein Store-Ausfall simulieren, um das
//! Fail-Open-Verhalten des Sanktions-Gates zu pruefen.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use funkraum_core::types::{ChannelId, SanctionId, UserId};

use crate::error::{DbError, DbResult};
use crate::models::{
    AuditEintrag, BerechtigungsRecord, KanalRecord, NeueSanktion, NeuerKanal, SanktionsRecord,
};
use crate::repository::{
    AuditRepository, BerechtigungsRepository, KanalRepository, SanktionsRepository,
};

/// In-Memory-Store fuer Single-Instance-Betrieb und Tests
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

struct MemoryStoreInner {
    kanaele: DashMap<ChannelId, KanalRecord>,
    sanktionen: DashMap<SanctionId, SanktionsRecord>,
    berechtigungen: DashMap<UserId, BerechtigungsRecord>,
    audit: audit_liste::AuditListe,
    erreichbar: AtomicBool,
}

/// Audit-Eintraege sind append-only, ein Mutex reicht
mod audit_liste {
    use crate::models::AuditEintrag;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct AuditListe {
        eintraege: Mutex<Vec<AuditEintrag>>,
    }

    impl AuditListe {
        pub fn anhaengen(&self, eintrag: AuditEintrag) {
            self.eintraege.lock().push(eintrag);
        }

        pub fn alle(&self) -> Vec<AuditEintrag> {
            self.eintraege.lock().clone()
        }

        pub fn anzahl(&self) -> usize {
            self.eintraege.lock().len()
        }
    }
}

impl MemoryStore {
    /// Erstellt einen neuen leeren MemoryStore
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(MemoryStoreInner {
                kanaele: DashMap::new(),
                sanktionen: DashMap::new(),
                berechtigungen: DashMap::new(),
                audit: Default::default(),
                erreichbar: AtomicBool::new(true),
            }),
        }
    }

    /// Simuliert einen Store-Ausfall (fuer Fail-Open-Tests)
    pub fn erreichbarkeit_setzen(&self, erreichbar: bool) {
        self.inner.erreichbar.store(erreichbar, Ordering::SeqCst);
    }

    /// Gibt alle geschriebenen Audit-Eintraege zurueck (Test-Inspektion)
    pub fn audit_eintraege(&self) -> Vec<AuditEintrag> {
        self.inner.audit.alle()
    }

    /// Anzahl der Audit-Eintraege
    pub fn audit_anzahl(&self) -> usize {
        self.inner.audit.anzahl()
    }

    fn erreichbarkeit_pruefen(&self) -> DbResult<()> {
        if self.inner.erreichbar.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DbError::nicht_erreichbar("MemoryStore offline (simuliert)"))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// KanalRepository
// ---------------------------------------------------------------------------

impl KanalRepository for MemoryStore {
    async fn alle(&self) -> DbResult<Vec<KanalRecord>> {
        self.erreichbarkeit_pruefen()?;
        Ok(self
            .inner
            .kanaele
            .iter()
            .map(|e| e.value().clone())
            .collect())
    }

    async fn laden(&self, id: ChannelId) -> DbResult<Option<KanalRecord>> {
        self.erreichbarkeit_pruefen()?;
        Ok(self.inner.kanaele.get(&id).map(|e| e.value().clone()))
    }

    async fn erstellen(&self, kanal: NeuerKanal<'_>) -> DbResult<KanalRecord> {
        self.erreichbarkeit_pruefen()?;
        if kanal.name.is_empty() {
            return Err(DbError::UngueltigeDaten("Kanalname darf nicht leer sein".into()));
        }
        if !(1..=5).contains(&kanal.prioritaet) {
            return Err(DbError::UngueltigeDaten(format!(
                "Prioritaet muss 1-5 sein, war {}",
                kanal.prioritaet
            )));
        }
        let record = KanalRecord {
            id: ChannelId::new(),
            name: kanal.name.to_string(),
            kategorie: kanal.kategorie,
            kapazitaet: kanal.kapazitaet,
            prioritaet: kanal.prioritaet,
            aktiv: true,
            erstellt_am: Utc::now(),
        };
        self.inner.kanaele.insert(record.id, record.clone());
        Ok(record)
    }

    async fn deaktivieren(&self, id: ChannelId) -> DbResult<bool> {
        self.erreichbarkeit_pruefen()?;
        match self.inner.kanaele.get_mut(&id) {
            Some(mut eintrag) if eintrag.aktiv => {
                eintrag.aktiv = false;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// SanktionsRepository
// ---------------------------------------------------------------------------

impl SanktionsRepository for MemoryStore {
    async fn fuer_benutzer(&self, ziel: UserId) -> DbResult<Vec<SanktionsRecord>> {
        self.erreichbarkeit_pruefen()?;
        Ok(self
            .inner
            .sanktionen
            .iter()
            .filter(|e| e.ziel == ziel)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn laden(&self, id: SanctionId) -> DbResult<Option<SanktionsRecord>> {
        self.erreichbarkeit_pruefen()?;
        Ok(self.inner.sanktionen.get(&id).map(|e| e.value().clone()))
    }

    async fn erstellen(&self, sanktion: NeueSanktion<'_>) -> DbResult<SanktionsRecord> {
        self.erreichbarkeit_pruefen()?;
        let record = SanktionsRecord {
            id: SanctionId::new(),
            ziel: sanktion.ziel,
            art: sanktion.art,
            grund: sanktion.grund.to_string(),
            ausgestellt_von: sanktion.ausgestellt_von,
            laeuft_ab_am: sanktion.laeuft_ab_am,
            aktiv: true,
            erstellt_am: Utc::now(),
        };
        self.inner.sanktionen.insert(record.id, record.clone());
        Ok(record)
    }

    async fn deaktivieren(&self, id: SanctionId) -> DbResult<bool> {
        self.erreichbarkeit_pruefen()?;
        match self.inner.sanktionen.get_mut(&id) {
            Some(mut eintrag) if eintrag.aktiv => {
                eintrag.aktiv = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn abgelaufene_deaktivieren(&self, jetzt: DateTime<Utc>) -> DbResult<u64> {
        self.erreichbarkeit_pruefen()?;
        let mut anzahl = 0u64;
        for mut eintrag in self.inner.sanktionen.iter_mut() {
            if eintrag.aktiv && eintrag.laeuft_ab_am.is_some_and(|ablauf| ablauf <= jetzt) {
                eintrag.aktiv = false;
                anzahl += 1;
            }
        }
        Ok(anzahl)
    }
}

// ---------------------------------------------------------------------------
// BerechtigungsRepository
// ---------------------------------------------------------------------------

impl BerechtigungsRepository for MemoryStore {
    async fn laden(&self, user_id: UserId) -> DbResult<Option<BerechtigungsRecord>> {
        self.erreichbarkeit_pruefen()?;
        Ok(self
            .inner
            .berechtigungen
            .get(&user_id)
            .map(|e| e.value().clone()))
    }

    async fn setzen(&self, record: BerechtigungsRecord) -> DbResult<()> {
        self.erreichbarkeit_pruefen()?;
        self.inner.berechtigungen.insert(record.user_id, record);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AuditRepository
// ---------------------------------------------------------------------------

impl AuditRepository for MemoryStore {
    async fn aufzeichnen(&self, eintrag: AuditEintrag) -> DbResult<()> {
        self.erreichbarkeit_pruefen()?;
        self.inner.audit.anhaengen(eintrag);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
