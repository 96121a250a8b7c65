//! Wire-Format fuer TCP-Verbindungen
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + JSON-Payload.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | Payload    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge gibt die Anzahl der Payload-Bytes an (ohne die 4 Laengen-Bytes).
//! Maximale Frame-Groesse ist konfigurierbar (Standard: 1 MB).

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::events::FunkMessage;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer frame-basierte TCP-Verbindungen
///
/// Implementiert `Encoder<FunkMessage>` und `Decoder` fuer nahtlose
/// Integration mit `tokio_util::codec::Framed`.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Maximale erlaubte Frame-Groesse in Bytes
    max_frame_size: usize,
}

impl FrameCodec {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Erstellt einen `FrameCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = FunkMessage;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Warte auf mindestens 4 Bytes fuer das Laengen-Feld
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        // Laenge lesen (big-endian u32) ohne den Buffer zu veraendern
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if length > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame zu gross: {} Bytes (Maximum: {} Bytes)",
                    length, self.max_frame_size
                ),
            ));
        }

        // Pruefen ob der vollstaendige Frame bereits im Buffer ist
        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            // Speicher vorbelegen um Reallocations zu vermeiden
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let payload = src.split_to(length);

        let message: FunkMessage = serde_json::from_slice(&payload).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Deserialisierung fehlgeschlagen: {}", e),
            )
        })?;

        Ok(Some(message))
    }
}

impl Encoder<FunkMessage> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: FunkMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Serialisierung fehlgeschlagen: {}", e),
            )
        })?;

        if json.len() > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Nachricht zu gross: {} Bytes (Maximum: {} Bytes)",
                    json.len(),
                    self.max_frame_size
                ),
            ));
        }

        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::FunkPayload;

    fn ping(request_id: u32) -> FunkMessage {
        FunkMessage::new(request_id, FunkPayload::Ping { timestamp_ms: 42 })
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        codec.encode(ping(11), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.request_id, 11);
        assert!(matches!(decoded.payload, FunkPayload::Ping { timestamp_ms: 42 }));
        assert!(buf.is_empty());
    }

    #[test]
    fn unvollstaendiger_frame_liefert_none() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(ping(1), &mut buf).unwrap();

        // Nur die Haelfte des Frames ankommen lassen
        let haelfte = buf.split_to(buf.len() / 2);
        let mut teil = haelfte;
        assert!(codec.decode(&mut teil).unwrap().is_none());
    }

    #[test]
    fn mehrere_frames_im_buffer() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(ping(1), &mut buf).unwrap();
        codec.encode(ping(2), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().request_id, 1);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().request_id, 2);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn zu_grosser_frame_wird_abgelehnt() {
        let mut codec = FrameCodec::with_max_size(16);
        let mut buf = BytesMut::new();

        // Laengen-Feld behauptet 1000 Bytes
        buf.put_u32(1000);
        buf.put_slice(&[0u8; 8]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn zu_grosse_nachricht_wird_nicht_encodiert() {
        let mut codec = FrameCodec::with_max_size(8);
        let mut buf = BytesMut::new();
        assert!(codec.encode(ping(1), &mut buf).is_err());
    }

    #[test]
    fn ungueltiges_json_ist_fehler() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let kaputt = b"kein json";
        buf.put_u32(kaputt.len() as u32);
        buf.put_slice(kaputt);
        assert!(codec.decode(&mut buf).is_err());
    }
}
