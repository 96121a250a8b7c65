//! funkraum-observability – Logging-Setup fuer den Funkraum-Server
//!
//! Buendelt die tracing-subscriber-Initialisierung, damit Server und
//! Werkzeuge dieselbe Logging-Konfiguration teilen.

pub mod logging;

pub use logging::{log_format_gueltig, log_level_gueltig, logging_initialisieren};
