//! Session-Manager – In-Memory Zustand aller verbundenen Sessions
//!
//! Verwaltet pro Session:
//! - Benutzer-Zuordnung
//! - Kanal-Zugehoerigkeit (Spiegel des Registry-Index, fuer Anzeige)
//! - Praesenz und Sendestatus
//! - Lautstaerke
//!
//! Pro Benutzer existiert hoechstens eine lebende Session; ein Reconnect
//! ersetzt die alte. Session-Daten gehoeren exklusiv diesem Manager,
//! andere Schichten referenzieren nur SessionIds.
//!
//! Thread-safe durch DashMap (lock-free concurrent HashMap).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use funkraum_core::types::{ChannelId, SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Praesenz
// ---------------------------------------------------------------------------

/// Praesenz-Status einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Praesenz {
    /// Verbunden, hoert zu
    Verbunden,
    /// Sendet gerade (haelt das Sprechrecht)
    Spricht,
    /// Eingehende Audio lokal stummgeschaltet
    Stumm,
    /// Als abwesend markiert
    Abwesend,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Zustand einer einzelnen verbundenen Session
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    /// Aktueller Kanal (None wenn in keinem Kanal)
    pub kanal_id: Option<ChannelId>,
    pub praesenz: Praesenz,
    /// Wiedergabe-Lautstaerke, immer in [0.0, 1.0]
    pub lautstaerke: f32,
    /// Sendet die Session gerade?
    pub sendet: bool,
    /// Zeitpunkt der letzten Uebertragung (Start oder Ende)
    pub letzte_uebertragung: Option<DateTime<Utc>>,
    pub verbunden_seit: DateTime<Utc>,
}

impl Session {
    fn neu(user_id: UserId) -> Self {
        Self {
            id: SessionId::new(),
            user_id,
            kanal_id: None,
            praesenz: Praesenz::Verbunden,
            lautstaerke: 1.0,
            sendet: false,
            letzte_uebertragung: None,
            verbunden_seit: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Zentraler In-Memory Session-Zustand
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionManagerInner>,
}

struct SessionManagerInner {
    /// Sessions, indexiert nach SessionId
    sessions: DashMap<SessionId, Session>,
    /// UserId -> SessionId fuer schnellen Lookup (eine Session pro Benutzer)
    user_index: DashMap<UserId, SessionId>,
}

impl SessionManager {
    /// Erstellt einen neuen leeren SessionManager
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(SessionManagerInner {
                sessions: DashMap::new(),
                user_index: DashMap::new(),
            }),
        }
    }

    /// Verbindet einen Benutzer und gibt die neue SessionId zurueck
    ///
    /// Existiert bereits eine Session fuer den Benutzer, wird sie ersetzt
    /// und zurueckgegeben, damit der Aufrufer ihre Ressourcen (Kanal,
    /// Sprechrecht) abraeumen kann.
    pub fn verbinden(&self, user_id: UserId) -> (SessionId, Option<Session>) {
        let session = Session::neu(user_id);
        let id = session.id;

        let ersetzt = self
            .inner
            .user_index
            .insert(user_id, id)
            .and_then(|alte_id| self.inner.sessions.remove(&alte_id))
            .map(|(_, alte)| alte);

        self.inner.sessions.insert(id, session);

        if ersetzt.is_some() {
            tracing::info!(user_id = %user_id, session_id = %id, "Session ersetzt (Reconnect)");
        } else {
            tracing::info!(user_id = %user_id, session_id = %id, "Session verbunden");
        }

        (id, ersetzt)
    }

    /// Trennt eine Session und gibt ihren letzten Zustand zurueck
    pub fn trennen(&self, id: &SessionId) -> Option<Session> {
        let (_, session) = self.inner.sessions.remove(id)?;
        // Index nur entfernen wenn er noch auf diese Session zeigt
        // (ein Reconnect kann ihn bereits ueberschrieben haben)
        self.inner
            .user_index
            .remove_if(&session.user_id, |_, sid| *sid == *id);
        tracing::info!(session_id = %id, user_id = %session.user_id, "Session getrennt");
        Some(session)
    }

    /// Liefert eine Kopie des Session-Zustands
    pub fn session(&self, id: &SessionId) -> Option<Session> {
        self.inner.sessions.get(id).map(|s| s.clone())
    }

    /// Liefert die Session eines Benutzers
    pub fn session_von_user(&self, user_id: &UserId) -> Option<Session> {
        let id = *self.inner.user_index.get(user_id)?;
        self.session(&id)
    }

    /// Prueft ob eine Session aktuell verbunden ist
    pub fn ist_aktiv(&self, id: &SessionId) -> bool {
        self.inner.sessions.contains_key(id)
    }

    /// Setzt den gespiegelten Kanal einer Session
    pub fn kanal_setzen(&self, id: &SessionId, kanal: Option<ChannelId>) {
        if let Some(mut session) = self.inner.sessions.get_mut(id) {
            session.kanal_id = kanal;
        }
    }

    /// Setzt die Praesenz einer Session
    pub fn praesenz_setzen(&self, id: &SessionId, praesenz: Praesenz) -> bool {
        match self.inner.sessions.get_mut(id) {
            Some(mut session) => {
                session.praesenz = praesenz;
                true
            }
            None => false,
        }
    }

    /// Setzt die Lautstaerke einer Session (geklammert auf [0.0, 1.0])
    pub fn lautstaerke_setzen(&self, id: &SessionId, lautstaerke: f32) -> bool {
        match self.inner.sessions.get_mut(id) {
            Some(mut session) => {
                session.lautstaerke = lautstaerke.clamp(0.0, 1.0);
                true
            }
            None => false,
        }
    }

    /// Setzt den Sendestatus einer Session
    ///
    /// Einziger Schreibpfad fuer `sendet`: aktualisiert zugleich
    /// `letzte_uebertragung` und die Praesenz (Spricht/Verbunden).
    pub fn sendet_setzen(&self, id: &SessionId, sendet: bool) -> bool {
        match self.inner.sessions.get_mut(id) {
            Some(mut session) => {
                session.sendet = sendet;
                session.letzte_uebertragung = Some(Utc::now());
                session.praesenz = if sendet {
                    Praesenz::Spricht
                } else {
                    Praesenz::Verbunden
                };
                true
            }
            None => false,
        }
    }

    /// Alle aktuell verbundenen Sessions
    pub fn aktive_sessions(&self) -> Vec<Session> {
        self.inner.sessions.iter().map(|s| s.clone()).collect()
    }

    /// Anzahl verbundener Sessions
    pub fn anzahl(&self) -> usize {
        self.inner.sessions.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
