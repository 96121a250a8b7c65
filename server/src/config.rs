//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Funk-Einstellungen (Keepalive, Timeouts, Sweeps)
    pub funk: FunkEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Beim Start anzulegende Kanaele
    pub kanaele: Vec<KanalSeed>,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Clients
    pub max_clients: u32,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Funkraum Server".into(),
            max_clients: 512,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer das TCP-Control-Protokoll
    pub bind_adresse: String,
    /// Port fuer das TCP-Control-Protokoll
    pub tcp_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 9720,
        }
    }
}

/// Funk-Einstellungen (Verbindungs- und Hintergrund-Timings)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FunkEinstellungen {
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

impl Default for FunkEinstellungen {
    fn default() -> Self {
        Self {
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            setup_timeout_sek: 30,
            sanktions_sweep_sek: 60,
            gate_cache_ttl_sek: 5,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Ein beim Start anzulegender Kanal
///
/// Kanaele werden nur angelegt wenn noch kein aktiver Kanal mit
/// demselben Namen existiert; wiederholte Starts sind idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KanalSeed {
    pub name: String,
    /// "oeffentlich", "privat" oder "notfall"
    pub kategorie: String,
    pub kapazitaet: u32,
    /// Prioritaetsrang 1–5 (nur Anzeige-Sortierung)
    pub prioritaet: u8,
}

impl Default for KanalSeed {
    fn default() -> Self {
        Self {
            name: String::new(),
            kategorie: "oeffentlich".into(),
            kapazitaet: 16,
            prioritaet: 1,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                config.pruefen()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft die Konfiguration auf offensichtliche Fehler
    fn pruefen(&self) -> anyhow::Result<()> {
        if !funkraum_observability::log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Ungueltiges Log-Level: '{}'", self.logging.level);
        }
        if !funkraum_observability::log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Ungueltiges Log-Format: '{}'", self.logging.format);
        }
        for kanal in &self.kanaele {
            if kanal.name.is_empty() {
                anyhow::bail!("Kanal-Seed ohne Namen");
            }
            kanal
                .kategorie
                .parse::<funkraum_db::KanalKategorie>()
                .map_err(|e| anyhow::anyhow!("Kanal '{}': {e}", kanal.name))?;
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse fuer TCP zurueck
    pub fn tcp_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }
}
