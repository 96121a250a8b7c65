//! funkraum-moderation – Sanktions-Gate und Moderations-Service
//!
//! Das Gate entscheidet ob ein Benutzer Kanaele betreten, sprechen oder
//! schreiben darf, unter Beruecksichtigung aller aktuell in Kraft
//! befindlichen Sanktionen. Der Moderations-Service ist die Oberflaeche
//! fuer die externe Admin-Seite (Sanktion verhaengen/aufheben) und
//! invalidiert Gate-Entscheidungen sofort.

pub mod error;
pub mod gate;
pub mod service;

pub use error::{ModerationsError, ModerationsResult};
pub use gate::{RechteLage, SanktionsGate, ZugriffsEntscheid};
pub use service::SanktionsVerwaltung;
