//! funkraum-db – Store-Abstraktion
//!
//! Der Funk-Kern behandelt den Backing-Store als externe, schluessel-
//! adressierte Collection mit Read-your-writes-Konsistenz pro Verbindung.
//! Dieses Crate definiert die Repository-Traits (Kanaele, Sanktionen,
//! Berechtigungen, Audit) sowie eine In-Memory-Implementierung fuer
//! Betrieb und Tests. Die Traits verwenden `async fn` in Traits ohne
//! Send-Garantie – Verbindungs-Tasks laufen daher in einer LocalSet.

pub mod error;
pub mod memory;
pub mod models;
pub mod repository;

pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use models::{
    AuditEintrag, BerechtigungsRecord, KanalKategorie, KanalRecord, NeueSanktion, NeuerKanal,
    SanktionsArt, SanktionsRecord,
};
pub use repository::{
    AuditRepository, BerechtigungsRepository, KanalRepository, SanktionsRepository,
};
