//! funkraum-funk – Laufzeitzustand des Funkservers
//!
//! Drei Bausteine:
//! - `SessionManager`: alle verbundenen Sessions (exklusiver Eigentuemer
//!   der Session-Daten)
//! - `KanalRegistry`: Kanaele und Mitgliedschaft (eine Session ist zu
//!   jedem Zeitpunkt in hoechstens einem Kanal)
//! - `FloorArbiter`: Sprechrecht pro Kanal (hoechstens ein Sender)

pub mod floor;
pub mod registry;
pub mod session;

pub use floor::{AblehnungsGrund, FloorArbiter, FloorEntscheid, FloorFehler};
pub use registry::{KanalRegistry, RegistryEvent};
pub use session::{Praesenz, Session, SessionManager};
