//! funkraum-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen, Enums und Strukturen
//! die zwischen Client und Server ausgetauscht werden, sowie das
//! Frame-basierte Wire-Format.

pub mod events;
pub mod wire;

pub use events::{ErrorCode, FehlerAntwort, FunkMessage, FunkPayload, KanalInfo};
pub use wire::FrameCodec;
