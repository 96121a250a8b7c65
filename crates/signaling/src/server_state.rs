//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt alle geteilten Services und Zustands-Manager als Arc-Referenzen,
//! die sicher zwischen tokio-Tasks geteilt werden koennen.

use funkraum_db::{
    AuditEintrag, AuditRepository, BerechtigungsRepository, KanalRepository, SanktionsRepository,
};
use funkraum_funk::{FloorArbiter, KanalRegistry, SessionManager};
use funkraum_moderation::{SanktionsGate, SanktionsVerwaltung};
use funkraum_protocol::events::KanalInfo;
use std::sync::Arc;
use std::time::{Duration, Instant};

use funkraum_core::types::UserId;

use crate::broadcast::EventBroadcaster;
use crate::exchange::SetupVermittlung;

/// Kombinierte Store-Anforderung aller Signaling-Pfade
pub trait FunkStore:
    KanalRepository + SanktionsRepository + BerechtigungsRepository + AuditRepository + 'static
{
}

impl<T> FunkStore for T where
    T: KanalRepository + SanktionsRepository + BerechtigungsRepository + AuditRepository + 'static
{
}

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct FunkConfig {
    /// Anzeigename des Servers
    pub server_name: String,
    /// Maximale gleichzeitige Clients
    pub max_clients: u32,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Timeout fuer halboffene Setup-Austausche in Sekunden
    pub setup_timeout_sek: u64,
    /// Intervall des Sanktions-Expiry-Sweeps in Sekunden
    pub sanktions_sweep_sek: u64,
    /// TTL des Gate-Entscheids-Caches in Sekunden
    pub gate_cache_ttl_sek: u64,
}

impl Default for FunkConfig {
    fn default() -> Self {
        Self {
            server_name: "Funkraum Server".to_string(),
            max_clients: 512,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            setup_timeout_sek: 30,
            sanktions_sweep_sek: 60,
            gate_cache_ttl_sek: 5,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
///
/// Alle Services sind als Arc gehalten; die Manager selbst sind Clone
/// auf denselben inneren Zustand.
pub struct FunkState<D: FunkStore> {
    /// Server-Konfiguration
    pub config: Arc<FunkConfig>,
    /// Backing-Store (Kanaele, Sanktionen, Berechtigungen, Audit)
    pub store: Arc<D>,
    /// Sanktions-Gate (Betreten/Sprechen/Schreiben)
    pub gate: Arc<SanktionsGate<D>>,
    /// Moderations-Service (Sanktion verhaengen/aufheben)
    pub verwaltung: Arc<SanktionsVerwaltung<D>>,
    /// Session-Manager (wer ist verbunden)
    pub sessions: SessionManager,
    /// Kanal-Registry (Kanaele und Mitgliedschaft)
    pub registry: Arc<KanalRegistry<D>>,
    /// Floor-Arbiter (Sprechrecht pro Kanal)
    pub floor: FloorArbiter,
    /// Event-Broadcaster (Nachrichten an Clients senden)
    pub broadcaster: EventBroadcaster,
    /// Setup-Vermittlung (opake Transport-Aushandlung)
    pub vermittlung: SetupVermittlung,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_zeit: Instant,
}

impl<D: FunkStore> FunkState<D> {
    /// Erstellt einen neuen FunkState samt aller Teilsysteme
    pub fn neu(config: FunkConfig, store: Arc<D>) -> Arc<Self> {
        let gate = SanktionsGate::mit_cache_ttl(
            Arc::clone(&store),
            Duration::from_secs(config.gate_cache_ttl_sek),
        );
        let verwaltung = SanktionsVerwaltung::neu(Arc::clone(&store), Arc::clone(&gate));
        let registry = KanalRegistry::neu(Arc::clone(&store), Arc::clone(&gate));

        Arc::new(Self {
            config: Arc::new(config),
            store,
            gate,
            verwaltung,
            sessions: SessionManager::neu(),
            registry,
            floor: FloorArbiter::neu(),
            broadcaster: EventBroadcaster::neu(),
            vermittlung: SetupVermittlung::neu(),
            start_zeit: Instant::now(),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_zeit.elapsed().as_secs()
    }

    /// Baut die Kanalliste fuer die Wire-Darstellung
    pub fn kanal_infos(&self) -> Vec<KanalInfo> {
        self.registry
            .aktive_kanaele()
            .into_iter()
            .map(|k| {
                let mitglieder_anzahl = self.registry.mitglieder(&k.id).len() as u32;
                KanalInfo {
                    id: k.id,
                    name: k.name,
                    kategorie: k.kategorie.als_str().to_string(),
                    kapazitaet: k.kapazitaet,
                    prioritaet: k.prioritaet,
                    mitglieder_anzahl,
                }
            })
            .collect()
    }

    /// Schreibt einen Audit-Eintrag; Fehler werden nur geloggt
    pub async fn audit(
        &self,
        aktion: &str,
        akteur: Option<UserId>,
        beschreibung: impl Into<String>,
    ) {
        let eintrag = AuditEintrag::neu(aktion, "signaling", akteur, beschreibung.into());
        if let Err(fehler) = AuditRepository::aufzeichnen(&*self.store, eintrag).await {
            tracing::warn!(aktion, fehler = %fehler, "Audit-Eintrag fehlgeschlagen");
        }
    }
}
