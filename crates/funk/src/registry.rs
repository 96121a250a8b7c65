//! Kanal-Registry – Kanaele und Mitgliedschaft
//!
//! Haelt alle bekannten Kanaele im Speicher (Store-gestuetzt fuer den
//! Lebenszyklus) und verwaltet die Mitgliedschaft. Die einzige Wahrheit
//! ueber Mitgliedschaft ist der Index `SessionId -> ChannelId`: ein
//! einzelner atomarer Insert garantiert, dass eine Session nie in zwei
//! Kanaelen gleichzeitig ist.
//!
//! Beitritt/Austritt einer Session sind ueber eine Join-Sperre pro
//! Session serialisiert; verschiedene Sessions laufen parallel.
//!
//! Mitgliedschafts-Aenderungen werden als `RegistryEvent` auf einem
//! Broadcast-Kanal gemeldet; die Signaling-Schicht uebersetzt sie in
//! Wire-Events fuer die Clients.

use dashmap::DashMap;
use funkraum_core::error::{FunkraumError, Result};
use funkraum_core::types::{ChannelId, SessionId, UserId};
use funkraum_db::{
    BerechtigungsRepository, DbError, KanalRecord, KanalRepository, NeuerKanal,
    SanktionsRepository,
};
use funkraum_moderation::SanktionsGate;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Kapazitaet des Registry-Event-Kanals
const EVENT_KAPAZITAET: usize = 256;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Mitgliedschafts- und Kanal-Ereignisse fuer die Signaling-Schicht
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Beigetreten {
        kanal: ChannelId,
        session: SessionId,
    },
    Verlassen {
        kanal: ChannelId,
        session: SessionId,
    },
    /// Kanal angelegt, deaktiviert oder sonst veraendert
    KanalGeaendert { kanal: ChannelId },
}

/// Kanal samt aktueller Mitgliederliste
struct KanalZustand {
    record: KanalRecord,
    mitglieder: Vec<SessionId>,
}

// ---------------------------------------------------------------------------
// KanalRegistry
// ---------------------------------------------------------------------------

/// Registry aller Kanaele und ihrer Mitglieder
pub struct KanalRegistry<D>
where
    D: KanalRepository + SanktionsRepository + BerechtigungsRepository,
{
    store: Arc<D>,
    gate: Arc<SanktionsGate<D>>,
    kanaele: DashMap<ChannelId, KanalZustand>,
    /// Autoritativer Mitgliedschafts-Index (eine Session, ein Kanal)
    mitgliedschaft: DashMap<SessionId, ChannelId>,
    /// Join-Sperren, serialisieren Beitritt/Austritt pro Session
    join_sperren: DashMap<SessionId, Arc<Mutex<()>>>,
    ereignisse: broadcast::Sender<RegistryEvent>,
}

impl<D> KanalRegistry<D>
where
    D: KanalRepository + SanktionsRepository + BerechtigungsRepository,
{
    pub fn neu(store: Arc<D>, gate: Arc<SanktionsGate<D>>) -> Arc<Self> {
        let (ereignisse, _) = broadcast::channel(EVENT_KAPAZITAET);
        Arc::new(Self {
            store,
            gate,
            kanaele: DashMap::new(),
            mitgliedschaft: DashMap::new(),
            join_sperren: DashMap::new(),
            ereignisse,
        })
    }

    /// Abonniert Registry-Ereignisse
    pub fn ereignisse(&self) -> broadcast::Receiver<RegistryEvent> {
        self.ereignisse.subscribe()
    }

    // -----------------------------------------------------------------------
    // Lebenszyklus
    // -----------------------------------------------------------------------

    /// Laedt alle Kanaele aus dem Store in die Registry (Serverstart)
    pub async fn laden_aus_repo(&self) -> Result<usize> {
        let records = KanalRepository::alle(&*self.store)
            .await
            .map_err(db_fehler)?;
        let anzahl = records.len();
        for record in records {
            self.kanaele.insert(
                record.id,
                KanalZustand {
                    record,
                    mitglieder: Vec::new(),
                },
            );
        }
        tracing::info!(anzahl, "Kanaele aus dem Store geladen");
        Ok(anzahl)
    }

    /// Legt einen neuen Kanal an (persistiert, dann gecacht)
    pub async fn anlegen(&self, kanal: NeuerKanal<'_>) -> Result<KanalRecord> {
        let record = KanalRepository::erstellen(&*self.store, kanal)
            .await
            .map_err(db_fehler)?;
        tracing::info!(kanal = %record.id, name = %record.name, "Kanal angelegt");
        self.kanaele.insert(
            record.id,
            KanalZustand {
                record: record.clone(),
                mitglieder: Vec::new(),
            },
        );
        let _ = self
            .ereignisse
            .send(RegistryEvent::KanalGeaendert { kanal: record.id });
        Ok(record)
    }

    /// Deaktiviert einen Kanal (soft) und wirft alle Mitglieder heraus
    pub async fn deaktivieren(&self, kanal: ChannelId) -> Result<Vec<SessionId>> {
        let bekannt = KanalRepository::deaktivieren(&*self.store, kanal)
            .await
            .map_err(db_fehler)?;
        if !bekannt {
            return Err(FunkraumError::NichtGefunden(format!("Kanal {kanal}")));
        }

        let betroffen = match self.kanaele.get_mut(&kanal) {
            Some(mut zustand) => {
                zustand.record.aktiv = false;
                std::mem::take(&mut zustand.mitglieder)
            }
            None => Vec::new(),
        };

        for session in &betroffen {
            self.mitgliedschaft
                .remove_if(session, |_, k| *k == kanal);
            let _ = self.ereignisse.send(RegistryEvent::Verlassen {
                kanal,
                session: *session,
            });
        }

        tracing::info!(kanal = %kanal, entfernte_mitglieder = betroffen.len(), "Kanal deaktiviert");
        let _ = self.ereignisse.send(RegistryEvent::KanalGeaendert { kanal });
        Ok(betroffen)
    }

    // -----------------------------------------------------------------------
    // Mitgliedschaft
    // -----------------------------------------------------------------------

    /// Tritt einem Kanal bei
    ///
    /// Reihenfolge: Gate-Pruefung, Kanal-Existenz, Kapazitaet, dann der
    /// atomare Wechsel. Der Gate-Ablehnungsgrund wird wortgleich als
    /// `ZugriffVerweigert` weitergereicht. War die Session zuvor in einem
    /// anderen Kanal, verlaesst sie ihn implizit.
    pub async fn beitreten(
        &self,
        session: SessionId,
        user: UserId,
        kanal: ChannelId,
    ) -> Result<KanalRecord> {
        let sperre = self.join_sperre(session);
        let _gehalten = sperre.lock().await;

        let entscheid = self.gate.zugriff_pruefen(user, Some(kanal)).await;
        if !entscheid.erlaubt {
            let grund = entscheid
                .grund
                .unwrap_or_else(|| "Betreten nicht erlaubt".into());
            return Err(FunkraumError::ZugriffVerweigert(grund));
        }

        // Kapazitaetspruefung und Einfuegen atomar unter dem Entry-Lock
        // des Zielkanals; der Index-Insert darunter stellt die
        // Ein-Kanal-Invariante her
        let (record, vorheriger) = {
            let mut zustand = self
                .kanaele
                .get_mut(&kanal)
                .filter(|z| z.record.aktiv)
                .ok_or_else(|| FunkraumError::NichtGefunden(format!("Kanal {kanal}")))?;

            if zustand.mitglieder.contains(&session) {
                // Wiederholter Beitritt in denselben Kanal ist idempotent
                return Ok(zustand.record.clone());
            }
            if zustand.mitglieder.len() >= zustand.record.kapazitaet as usize {
                return Err(FunkraumError::KanalVoll);
            }

            let vorheriger = self.mitgliedschaft.insert(session, kanal);
            zustand.mitglieder.push(session);
            (zustand.record.clone(), vorheriger)
        };

        // Alten Kanal erst nach dem Umschwenken des Index bereinigen;
        // die Join-Sperre haelt konkurrierende Wechsel derselben Session fern
        if let Some(alter_kanal) = vorheriger {
            if let Some(mut zustand) = self.kanaele.get_mut(&alter_kanal) {
                zustand.mitglieder.retain(|s| *s != session);
            }
            let _ = self.ereignisse.send(RegistryEvent::Verlassen {
                kanal: alter_kanal,
                session,
            });
        }

        tracing::info!(session_id = %session, user_id = %user, kanal = %kanal, "Kanal beigetreten");
        let _ = self
            .ereignisse
            .send(RegistryEvent::Beigetreten { kanal, session });
        Ok(record)
    }

    /// Verlaesst den aktuellen Kanal (idempotent)
    pub async fn verlassen(&self, session: SessionId) -> Option<ChannelId> {
        let sperre = self.join_sperre(session);
        let _gehalten = sperre.lock().await;

        let (_, kanal) = self.mitgliedschaft.remove(&session)?;
        if let Some(mut zustand) = self.kanaele.get_mut(&kanal) {
            zustand.mitglieder.retain(|s| *s != session);
        }

        tracing::info!(session_id = %session, kanal = %kanal, "Kanal verlassen");
        let _ = self
            .ereignisse
            .send(RegistryEvent::Verlassen { kanal, session });
        Some(kanal)
    }

    /// Entfernt die Join-Sperre einer getrennten Session
    pub fn aufraeumen(&self, session: &SessionId) {
        self.join_sperren.remove(session);
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    /// Liefert den Kanal-Record
    pub fn kanal(&self, id: &ChannelId) -> Option<KanalRecord> {
        self.kanaele.get(id).map(|z| z.record.clone())
    }

    /// Mitglieder eines Kanals
    pub fn mitglieder(&self, id: &ChannelId) -> Vec<SessionId> {
        self.kanaele
            .get(id)
            .map(|z| z.mitglieder.clone())
            .unwrap_or_default()
    }

    /// Kanal einer Session (autoritativer Index)
    pub fn kanal_von_session(&self, session: &SessionId) -> Option<ChannelId> {
        self.mitgliedschaft.get(session).map(|k| *k)
    }

    /// Alle aktiven Kanaele, sortiert nach Prioritaet absteigend, dann Name
    pub fn aktive_kanaele(&self) -> Vec<KanalRecord> {
        let mut kanaele: Vec<KanalRecord> = self
            .kanaele
            .iter()
            .filter(|z| z.record.aktiv)
            .map(|z| z.record.clone())
            .collect();
        kanaele.sort_by(|a, b| {
            b.prioritaet
                .cmp(&a.prioritaet)
                .then_with(|| a.name.cmp(&b.name))
        });
        kanaele
    }

    fn join_sperre(&self, session: SessionId) -> Arc<Mutex<()>> {
        self.join_sperren
            .entry(session)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Uebersetzt Store-Fehler in die Kern-Taxonomie
fn db_fehler(fehler: DbError) -> FunkraumError {
    if fehler.ist_erreichbarkeit() {
        FunkraumError::NichtErreichbar(fehler.to_string())
    } else {
        FunkraumError::Intern(fehler.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use funkraum_db::{KanalKategorie, MemoryStore, NeueSanktion, SanktionsArt};

    async fn aufbau() -> (Arc<MemoryStore>, Arc<KanalRegistry<MemoryStore>>) {
        let store = Arc::new(MemoryStore::neu());
        let gate = SanktionsGate::neu(Arc::clone(&store));
        let registry = KanalRegistry::neu(Arc::clone(&store), gate);
        (store, registry)
    }

    async fn kanal_anlegen(
        registry: &KanalRegistry<MemoryStore>,
        name: &str,
        kapazitaet: u32,
    ) -> KanalRecord {
        registry
            .anlegen(NeuerKanal {
                name,
                kategorie: KanalKategorie::Oeffentlich,
                kapazitaet,
                prioritaet: 1,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn beitreten_und_verlassen() {
        let (_store, registry) = aufbau().await;
        let kanal = kanal_anlegen(&registry, "Allgemein", 8).await;
        let session = SessionId::new();

        registry
            .beitreten(session, UserId::new(), kanal.id)
            .await
            .unwrap();
        assert_eq!(registry.kanal_von_session(&session), Some(kanal.id));
        assert_eq!(registry.mitglieder(&kanal.id), vec![session]);

        assert_eq!(registry.verlassen(session).await, Some(kanal.id));
        assert_eq!(registry.kanal_von_session(&session), None);
        assert!(registry.mitglieder(&kanal.id).is_empty());

        // Erneutes Verlassen ist idempotent
        assert_eq!(registry.verlassen(session).await, None);
    }

    #[tokio::test]
    async fn wechsel_verlaesst_alten_kanal_implizit() {
        let (_store, registry) = aufbau().await;
        let alpha = kanal_anlegen(&registry, "Alpha", 8).await;
        let beta = kanal_anlegen(&registry, "Beta", 8).await;
        let session = SessionId::new();
        let user = UserId::new();

        registry.beitreten(session, user, alpha.id).await.unwrap();
        registry.beitreten(session, user, beta.id).await.unwrap();

        assert_eq!(registry.kanal_von_session(&session), Some(beta.id));
        assert!(registry.mitglieder(&alpha.id).is_empty());
        assert_eq!(registry.mitglieder(&beta.id), vec![session]);
    }

    #[tokio::test]
    async fn voller_kanal_lehnt_ab() {
        let (_store, registry) = aufbau().await;
        let kanal = kanal_anlegen(&registry, "Eng", 1).await;

        registry
            .beitreten(SessionId::new(), UserId::new(), kanal.id)
            .await
            .unwrap();

        let fehler = registry
            .beitreten(SessionId::new(), UserId::new(), kanal.id)
            .await
            .unwrap_err();
        assert!(matches!(fehler, FunkraumError::KanalVoll));
    }

    #[tokio::test]
    async fn wiederholter_beitritt_ist_idempotent() {
        let (_store, registry) = aufbau().await;
        let kanal = kanal_anlegen(&registry, "Eng", 1).await;
        let session = SessionId::new();
        let user = UserId::new();

        registry.beitreten(session, user, kanal.id).await.unwrap();
        // Zweiter Beitritt desselben Mitglieds scheitert nicht an der
        // Kapazitaet und dupliziert die Mitgliedschaft nicht
        registry.beitreten(session, user, kanal.id).await.unwrap();
        assert_eq!(registry.mitglieder(&kanal.id).len(), 1);
    }

    #[tokio::test]
    async fn unbekannter_kanal_ist_nicht_gefunden() {
        let (_store, registry) = aufbau().await;

        let fehler = registry
            .beitreten(SessionId::new(), UserId::new(), ChannelId::new())
            .await
            .unwrap_err();
        assert!(matches!(fehler, FunkraumError::NichtGefunden(_)));
    }

    #[tokio::test]
    async fn gebannter_benutzer_erhaelt_gate_grund() {
        let (store, registry) = aufbau().await;
        let kanal = kanal_anlegen(&registry, "Allgemein", 8).await;
        let user = UserId::new();

        SanktionsRepository::erstellen(
            store.as_ref(),
            NeueSanktion {
                ziel: user,
                art: SanktionsArt::Bann,
                grund: "Stoerung",
                ausgestellt_von: None,
                laeuft_ab_am: None,
            })
            .await
            .unwrap();

        let fehler = registry
            .beitreten(SessionId::new(), user, kanal.id)
            .await
            .unwrap_err();
        match fehler {
            FunkraumError::ZugriffVerweigert(grund) => {
                assert!(grund.contains("permanente"), "Grund war: {grund}")
            }
            andere => panic!("unerwarteter Fehler: {andere}"),
        }
        assert!(registry.mitglieder(&kanal.id).is_empty());
    }

    #[tokio::test]
    async fn deaktivieren_wirft_mitglieder_heraus() {
        let (_store, registry) = aufbau().await;
        let kanal = kanal_anlegen(&registry, "Allgemein", 8).await;
        let session = SessionId::new();

        registry
            .beitreten(session, UserId::new(), kanal.id)
            .await
            .unwrap();

        let betroffen = registry.deaktivieren(kanal.id).await.unwrap();
        assert_eq!(betroffen, vec![session]);
        assert_eq!(registry.kanal_von_session(&session), None);

        // Beitritt in den deaktivierten Kanal schlaegt fehl
        let fehler = registry
            .beitreten(SessionId::new(), UserId::new(), kanal.id)
            .await
            .unwrap_err();
        assert!(matches!(fehler, FunkraumError::NichtGefunden(_)));
    }

    #[tokio::test]
    async fn aktive_kanaele_sortiert_nach_prioritaet_und_name() {
        let (_store, registry) = aufbau().await;
        registry
            .anlegen(NeuerKanal {
                name: "Bravo",
                kategorie: KanalKategorie::Oeffentlich,
                kapazitaet: 8,
                prioritaet: 1,
            })
            .await
            .unwrap();
        registry
            .anlegen(NeuerKanal {
                name: "Notruf",
                kategorie: KanalKategorie::Notfall,
                kapazitaet: 8,
                prioritaet: 5,
            })
            .await
            .unwrap();
        registry
            .anlegen(NeuerKanal {
                name: "Alpha",
                kategorie: KanalKategorie::Oeffentlich,
                kapazitaet: 8,
                prioritaet: 1,
            })
            .await
            .unwrap();

        let namen: Vec<String> = registry
            .aktive_kanaele()
            .into_iter()
            .map(|k| k.name)
            .collect();
        assert_eq!(namen, vec!["Notruf", "Alpha", "Bravo"]);
    }

    #[tokio::test]
    async fn laden_aus_repo_fuellt_registry() {
        let (store, registry) = aufbau().await;
        KanalRepository::erstellen(
            store.as_ref(),
            NeuerKanal {
                name: "Persistiert",
                kategorie: KanalKategorie::Privat,
                kapazitaet: 4,
                prioritaet: 2,
            })
            .await
            .unwrap();

        let gate = SanktionsGate::neu(Arc::clone(&store));
        let frische = KanalRegistry::neu(Arc::clone(&store), gate);
        assert_eq!(frische.laden_aus_repo().await.unwrap(), 1);
        assert_eq!(frische.aktive_kanaele().len(), 1);
    }

    #[tokio::test]
    async fn konkurrierende_beitritte_halten_ein_kanal_invariante() {
        let (_store, registry) = aufbau().await;
        let alpha = kanal_anlegen(&registry, "Alpha", 64).await;
        let beta = kanal_anlegen(&registry, "Beta", 64).await;
        let session = SessionId::new();
        let user = UserId::new();

        let mut aufgaben = tokio::task::JoinSet::new();
        for i in 0..16 {
            let registry = Arc::clone(&registry);
            let ziel = if i % 2 == 0 { alpha.id } else { beta.id };
            aufgaben.spawn(async move { registry.beitreten(session, user, ziel).await });
        }
        while let Some(ergebnis) = aufgaben.join_next().await {
            ergebnis.unwrap().unwrap();
        }

        // Genau eine Mitgliedschaft, konsistent zwischen Index und Listen
        let aktueller = registry.kanal_von_session(&session).unwrap();
        let in_alpha = registry.mitglieder(&alpha.id).contains(&session);
        let in_beta = registry.mitglieder(&beta.id).contains(&session);
        assert!(in_alpha ^ in_beta);
        assert_eq!(in_alpha, aktueller == alpha.id);
    }

    #[tokio::test]
    async fn ereignisse_werden_gemeldet() {
        let (_store, registry) = aufbau().await;
        let kanal = kanal_anlegen(&registry, "Allgemein", 8).await;
        let mut empfaenger = registry.ereignisse();
        let session = SessionId::new();

        registry
            .beitreten(session, UserId::new(), kanal.id)
            .await
            .unwrap();
        registry.verlassen(session).await;

        match empfaenger.try_recv().unwrap() {
            RegistryEvent::Beigetreten { kanal: k, session: s } => {
                assert_eq!((k, s), (kanal.id, session));
            }
            andere => panic!("unerwartetes Ereignis: {andere:?}"),
        }
        assert!(matches!(
            empfaenger.try_recv().unwrap(),
            RegistryEvent::Verlassen { .. }
        ));
    }
}
