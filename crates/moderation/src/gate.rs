//! Sanktions-Gate – entscheidet Betreten/Sprechen/Schreiben
//!
//! Vor jeder Entscheidung laeuft ein Expiry-Sweep (abgelaufene Sanktionen
//! deaktivieren) vollstaendig durch; die Bewertung selbst ist eine reine
//! Funktion von (Sanktionen, jetzt) und vertraut dem gespeicherten
//! `aktiv`-Flag nie ueber eine Ablaufgrenze hinaus.
//!
//! ## Fail-Open
//! Ist der Store nicht erreichbar, laesst das Gate den Zugriff zu statt
//! alle Benutzer auszusperren. Die Degradierung wird als Warnung geloggt,
//! nie als Benutzerfehler gemeldet.
//!
//! ## Cache
//! Entscheidungen werden pro Benutzer mit kurzer TTL gecacht. Die TTL
//! eines Eintrags ist `min(konfigurierte_ttl, fruehester_ablauf - jetzt)`
//! – ein Cache-Eintrag ueberlebt also nie den Ablauf einer Sanktion.
//! Verhaengen/Aufheben invalidiert den Eintrag sofort.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use funkraum_core::types::{ChannelId, UserId};
use funkraum_db::{
    BerechtigungsRecord, BerechtigungsRepository, SanktionsArt, SanktionsRecord,
    SanktionsRepository,
};

/// Standard-TTL fuer gecachte Gate-Entscheidungen
pub const STANDARD_CACHE_TTL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Entscheidungstypen
// ---------------------------------------------------------------------------

/// Ergebnis einer Zugriffspruefung fuer Betreten
#[derive(Debug, Clone)]
pub struct ZugriffsEntscheid {
    pub erlaubt: bool,
    /// Anzeigbarer Grund bei Ablehnung (wortgleich an den Client gereicht)
    pub grund: Option<String>,
    /// Alle aktuell in Kraft befindlichen Sanktionen des Benutzers
    pub aktive_sanktionen: Vec<SanktionsRecord>,
}

/// Vollstaendige Rechtelage eines Benutzers zu einem Zeitpunkt
#[derive(Debug, Clone)]
pub struct RechteLage {
    pub darf_betreten: bool,
    pub darf_sprechen: bool,
    pub darf_schreiben: bool,
    /// Grund fuer verweigertes Betreten
    pub betretungs_grund: Option<String>,
    /// Grund fuer verweigertes Sprechen
    pub sprech_grund: Option<String>,
    pub aktive_sanktionen: Vec<SanktionsRecord>,
}

impl RechteLage {
    /// Uneingeschraenkte Rechtelage (Fail-Open-Fall und Default)
    fn offen() -> Self {
        Self {
            darf_betreten: true,
            darf_sprechen: true,
            darf_schreiben: true,
            betretungs_grund: None,
            sprech_grund: None,
            aktive_sanktionen: Vec::new(),
        }
    }
}

struct CacheEintrag {
    lage: RechteLage,
    gueltig_bis: Instant,
}

// ---------------------------------------------------------------------------
// SanktionsGate
// ---------------------------------------------------------------------------

/// Sanktions-Gate mit Entscheids-Cache
pub struct SanktionsGate<D: SanktionsRepository + BerechtigungsRepository> {
    store: Arc<D>,
    cache: DashMap<UserId, CacheEintrag>,
    cache_ttl: Duration,
}

impl<D: SanktionsRepository + BerechtigungsRepository> SanktionsGate<D> {
    /// Erstellt ein neues Gate mit Standard-Cache-TTL
    pub fn neu(store: Arc<D>) -> Arc<Self> {
        Self::mit_cache_ttl(store, STANDARD_CACHE_TTL)
    }

    /// Erstellt ein neues Gate mit konfigurierter Cache-TTL
    pub fn mit_cache_ttl(store: Arc<D>, cache_ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            store,
            cache: DashMap::new(),
            cache_ttl,
        })
    }

    /// Prueft ob ein Benutzer Kanaele betreten darf
    ///
    /// Ein in Kraft befindlicher Bann hat Vorrang vor jedem
    /// Berechtigungs-Datensatz; der Ablehnungsgrund enthaelt Bann-Art,
    /// Grundtext und Ablauf (oder "permanente Sperre").
    /// Der Kanal-Kontext ist optional – Sanktionen gelten derzeit global.
    pub async fn zugriff_pruefen(
        &self,
        user_id: UserId,
        kanal: Option<ChannelId>,
    ) -> ZugriffsEntscheid {
        let lage = self.rechtelage(user_id).await;

        if !lage.darf_betreten {
            tracing::debug!(
                user_id = %user_id,
                kanal = ?kanal,
                grund = ?lage.betretungs_grund,
                "Zugriff verweigert"
            );
        }

        ZugriffsEntscheid {
            erlaubt: lage.darf_betreten,
            grund: lage.betretungs_grund,
            aktive_sanktionen: lage.aktive_sanktionen,
        }
    }

    /// Prueft ob ein Benutzer aktuell sprechen darf
    pub async fn darf_sprechen(&self, user_id: UserId) -> bool {
        self.rechtelage(user_id).await.darf_sprechen
    }

    /// Prueft ob ein Benutzer aktuell Chat-Nachrichten schreiben darf
    pub async fn darf_schreiben(&self, user_id: UserId) -> bool {
        self.rechtelage(user_id).await.darf_schreiben
    }

    /// Ermittelt die vollstaendige Rechtelage (aus Cache oder Store)
    pub async fn rechtelage(&self, user_id: UserId) -> RechteLage {
        // Cache-Treffer pruefen
        if let Some(eintrag) = self.cache.get(&user_id) {
            if Instant::now() < eintrag.gueltig_bis {
                return eintrag.lage.clone();
            }
        }

        match self.lage_ermitteln(user_id).await {
            Ok(lage) => {
                // TTL darf den fruehesten Sanktions-Ablauf nie ueberleben
                let ttl = self.eintrag_ttl(&lage);
                self.cache.insert(
                    user_id,
                    CacheEintrag {
                        lage: lage.clone(),
                        gueltig_bis: Instant::now() + ttl,
                    },
                );
                lage
            }
            Err(fehler) => {
                // Fail-Open: Verfuegbarkeit vor strikter Durchsetzung.
                // Degradierte Entscheidungen werden nicht gecacht.
                tracing::warn!(
                    user_id = %user_id,
                    fehler = %fehler,
                    "Sanktions-Store nicht verfuegbar – Fail-Open"
                );
                RechteLage::offen()
            }
        }
    }

    /// Invalidiert den Cache-Eintrag eines Benutzers
    ///
    /// Muss bei jedem Verhaengen/Aufheben einer Sanktion sofort erfolgen,
    /// damit keine veraltete Entscheidung weiterwirkt.
    pub fn cache_invalidieren(&self, user_id: UserId) {
        if self.cache.remove(&user_id).is_some() {
            tracing::debug!(user_id = %user_id, "Gate-Cache invalidiert");
        }
    }

    /// Gibt die Anzahl der gecachten Entscheidungen zurueck
    pub fn cache_groesse(&self) -> usize {
        self.cache.len()
    }

    /// Entfernt abgelaufene Cache-Eintraege und gibt deren Anzahl zurueck
    ///
    /// Verfallene Eintraege werden sonst nur bei erneuter Abfrage
    /// desselben Benutzers ersetzt; einmalig gesehene Benutzer blieben
    /// ohne diesen Sweep dauerhaft liegen. Laeuft periodisch im
    /// Sanktions-Sweep des Servers.
    pub fn cache_aufraeumen(&self) -> usize {
        let vorher = self.cache.len();
        let jetzt = Instant::now();
        self.cache.retain(|_, eintrag| jetzt < eintrag.gueltig_bis);
        vorher.saturating_sub(self.cache.len())
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    /// Laedt Sanktionen + Berechtigungen und bewertet sie
    async fn lage_ermitteln(&self, user_id: UserId) -> funkraum_db::DbResult<RechteLage> {
        let jetzt = Utc::now();

        // Expiry-Sweep muss vor der Entscheidung vollstaendig durchlaufen,
        // sonst koennte ein abgelaufener Bann faelschlich weiterwirken
        let bereinigt = SanktionsRepository::abgelaufene_deaktivieren(&*self.store, jetzt).await?;
        if bereinigt > 0 {
            tracing::info!(anzahl = bereinigt, "Abgelaufene Sanktionen deaktiviert");
        }

        let in_kraft: Vec<SanktionsRecord> =
            SanktionsRepository::fuer_benutzer(&*self.store, user_id)
                .await?
                .into_iter()
                .filter(|s| s.in_kraft(jetzt))
                .collect();

        let mut lage = RechteLage::offen();
        lage.aktive_sanktionen = in_kraft.clone();

        // Bann hat Vorrang: sperrt Betreten, Sprechen und Schreiben
        if let Some(bann) = in_kraft.iter().find(|s| s.art == SanktionsArt::Bann) {
            let grund = bann_grund(bann);
            lage.darf_betreten = false;
            lage.darf_sprechen = false;
            lage.darf_schreiben = false;
            lage.betretungs_grund = Some(grund.clone());
            lage.sprech_grund = Some(grund);
            return Ok(lage);
        }

        // Stummschaltung sperrt nur das Sprechen
        if let Some(mute) = in_kraft
            .iter()
            .find(|s| s.art == SanktionsArt::Stummschaltung)
        {
            lage.darf_sprechen = false;
            lage.sprech_grund = Some(match mute.laeuft_ab_am {
                None => format!("stummgeschaltet: {}", mute.grund),
                Some(ablauf) => {
                    format!("stummgeschaltet bis {}: {}", ablauf.to_rfc3339(), mute.grund)
                }
            });
        }

        // Berechtigungs-Datensatz; fehlt er, gilt alles erlaubt
        let berechtigung = BerechtigungsRepository::laden(&*self.store, user_id)
            .await?
            .unwrap_or_else(|| BerechtigungsRecord::standard(user_id));

        if !berechtigung.darf_betreten {
            lage.darf_betreten = false;
            lage.betretungs_grund = Some("Betreten nicht erlaubt".into());
        }
        if !berechtigung.darf_sprechen {
            lage.darf_sprechen = false;
            lage.sprech_grund
                .get_or_insert_with(|| "Sprechen nicht erlaubt".into());
        }
        if !berechtigung.darf_schreiben {
            lage.darf_schreiben = false;
        }

        Ok(lage)
    }

    /// TTL eines Cache-Eintrags: nie laenger als bis zum fruehesten Ablauf
    fn eintrag_ttl(&self, lage: &RechteLage) -> Duration {
        let jetzt = Utc::now();
        let fruehester_ablauf = lage
            .aktive_sanktionen
            .iter()
            .filter_map(|s| s.laeuft_ab_am)
            .min();

        match fruehester_ablauf {
            None => self.cache_ttl,
            Some(ablauf) => {
                let rest = (ablauf - jetzt).to_std().unwrap_or(Duration::ZERO);
                self.cache_ttl.min(rest)
            }
        }
    }
}

/// Anzeigbarer Ablehnungsgrund fuer einen Bann
fn bann_grund(bann: &SanktionsRecord) -> String {
    match bann.laeuft_ab_am {
        None => format!("permanente Sperre: {}", bann.grund),
        Some(ablauf) => format!("gebannt bis {}: {}", ablauf.to_rfc3339(), bann.grund),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
