//! funkraum-server – Bibliotheks-Root
//!
//! Verdrahtet Store, Gate, Registry und Signaling zu einem lauffaehigen
//! Server und stellt den Einstiegspunkt fuer Integrationstests bereit.

pub mod config;

use anyhow::Result;
use chrono::Utc;
use funkraum_db::{MemoryStore, SanktionsRepository};
use funkraum_signaling::{registry_ereignisse_weiterleiten, FunkConfig, FunkListener, FunkState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use config::ServerConfig;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Store anlegen und Kanaele laden/seeden
    /// 2. Registry-Event-Pumpe und Hintergrund-Sweeps starten
    /// 3. TCP-Listener starten (Control-Protokoll)
    /// 4. Auf Ctrl-C warten und Shutdown signalisieren
    pub async fn starten(self) -> Result<()> {
        let funk_config = FunkConfig {
            server_name: self.config.server.name.clone(),
            max_clients: self.config.server.max_clients,
            keepalive_sek: self.config.funk.keepalive_sek,
            verbindungs_timeout_sek: self.config.funk.verbindungs_timeout_sek,
            setup_timeout_sek: self.config.funk.setup_timeout_sek,
            sanktions_sweep_sek: self.config.funk.sanktions_sweep_sek,
            gate_cache_ttl_sek: self.config.funk.gate_cache_ttl_sek,
        };

        let store = Arc::new(MemoryStore::neu());
        let state = FunkState::neu(funk_config, store);

        let geladen = state.registry.laden_aus_repo().await?;
        tracing::info!(anzahl = geladen, "Kanaele aus dem Store geladen");
        kanaele_seeden(&state, &self.config).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Mitgliedschafts- und Kanal-Events an die Clients pumpen
        tokio::spawn(registry_ereignisse_weiterleiten(Arc::clone(&state)));

        // Hintergrund-Sweeps
        tokio::spawn(sanktions_sweep(Arc::clone(&state), shutdown_rx.clone()));
        tokio::spawn(setup_sweep(Arc::clone(&state), shutdown_rx.clone()));

        // Ctrl-C signalisiert den Shutdown an alle Subsysteme
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                let _ = shutdown_tx.send(true);
            }
        });

        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %self.config.tcp_bind_adresse(),
            max_clients = self.config.server.max_clients,
            "Server startet"
        );

        let listener = FunkListener::neu(state, self.config.tcp_bind_adresse().parse()?);
        listener.starten(shutdown_rx).await?;

        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Legt die konfigurierten Kanaele an, sofern sie noch nicht existieren
async fn kanaele_seeden(state: &Arc<FunkState<MemoryStore>>, config: &ServerConfig) -> Result<()> {
    let vorhandene: Vec<String> = state
        .registry
        .aktive_kanaele()
        .into_iter()
        .map(|k| k.name)
        .collect();

    for seed in &config.kanaele {
        if vorhandene.iter().any(|name| name == &seed.name) {
            continue;
        }
        let kategorie = seed
            .kategorie
            .parse::<funkraum_db::KanalKategorie>()
            .map_err(|e| anyhow::anyhow!("Kanal '{}': {e}", seed.name))?;

        let record = state
            .registry
            .anlegen(funkraum_db::NeuerKanal {
                name: &seed.name,
                kategorie,
                kapazitaet: seed.kapazitaet,
                prioritaet: seed.prioritaet,
            })
            .await?;
        tracing::info!(
            kanal = %record.id,
            name = %record.name,
            kapazitaet = record.kapazitaet,
            "Kanal angelegt"
        );
    }
    Ok(())
}

/// Deaktiviert periodisch abgelaufene Sanktionen im Store
///
/// Raeumt im selben Takt verfallene Gate-Cache-Eintraege ab, damit der
/// Cache nicht mit einmalig gesehenen Benutzern waechst.
async fn sanktions_sweep(
    state: Arc<FunkState<MemoryStore>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let intervall = Duration::from_secs(state.config.sanktions_sweep_sek);
    loop {
        tokio::select! {
            _ = tokio::time::sleep(intervall) => {
                match state.store.abgelaufene_deaktivieren(Utc::now()).await {
                    Ok(0) => {}
                    Ok(anzahl) => {
                        tracing::info!(anzahl, "Abgelaufene Sanktionen deaktiviert");
                    }
                    Err(fehler) => {
                        tracing::warn!(fehler = %fehler, "Sanktions-Sweep fehlgeschlagen");
                    }
                }
                let verfallen = state.gate.cache_aufraeumen();
                if verfallen > 0 {
                    tracing::debug!(anzahl = verfallen, "Verfallene Gate-Cache-Eintraege entfernt");
                }
            }
            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

/// Verwirft periodisch halboffene Setup-Austausche
async fn setup_sweep(state: Arc<FunkState<MemoryStore>>, mut shutdown_rx: watch::Receiver<bool>) {
    let max_alter = Duration::from_secs(state.config.setup_timeout_sek);
    loop {
        tokio::select! {
            _ = tokio::time::sleep(max_alter) => {
                let entfernt = state.vermittlung.abgelaufene_entfernen(max_alter);
                if entfernt > 0 {
                    tracing::debug!(anzahl = entfernt, "Verwaiste Setup-Austausche verworfen");
                }
            }
            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
