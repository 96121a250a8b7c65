//! funkraum-signaling – TCP Control- und Vermittlungs-Layer
//!
//! Dieser Crate implementiert den Signaling-Service fuer Funkraum. Er
//! verwaltet TCP-Verbindungen, Sessions, Kanal-Mitgliedschaft, das
//! Sprechrecht und vermittelt die opake Transport-Aushandlung zwischen
//! Peers.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (FunkListener)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |
//!     v
//! FunkDispatcher
//!     |
//!     +-- KanalHandler       (Liste, Beitreten, Verlassen)
//!     +-- SendeHandler       (SendungStart, SendungStop)
//!     +-- NachrichtHandler   (Fluestern, Rundruf, Setup-Austausch)
//!     +-- ModerationHandler  (Sanktion verhaengen/aufheben)
//!
//! EventBroadcaster – Events an alle relevanten Sessions senden
//! SetupVermittlung – halboffene Transport-Aushandlungen
//! ```

pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod exchange;
pub mod handlers;
pub mod server_state;
pub mod tcp;

// Bequeme Re-Exporte
pub use broadcast::{registry_ereignisse_weiterleiten, EventBroadcaster};
pub use connection::ClientConnection;
pub use dispatcher::{FunkDispatcher, VerbindungsKontext};
pub use error::{SignalingError, SignalingResult};
pub use exchange::SetupVermittlung;
pub use server_state::{FunkConfig, FunkState, FunkStore};
pub use tcp::FunkListener;
