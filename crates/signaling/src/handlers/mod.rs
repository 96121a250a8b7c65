//! Handler fuer alle Signaling-Nachrichten
//!
//! Jeder Handler ist fuer einen bestimmten Nachrichtentyp zustaendig
//! und hat Zugriff auf den gemeinsamen FunkState.

pub mod kanal_handler;
pub mod moderation_handler;
pub mod nachricht_handler;
pub mod sende_handler;
