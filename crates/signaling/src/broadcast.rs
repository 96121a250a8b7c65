//! Event-Broadcaster – Sendet Events an alle relevanten Clients
//!
//! Der EventBroadcaster verwaltet die Send-Queues aller verbundenen
//! Sessions und stellt Methoden bereit, um Nachrichten gezielt oder an
//! alle zu senden. Kanal-Mitgliedschaft wird hier bewusst NICHT
//! gespiegelt – die Registry ist die einzige Wahrheit, Handler schlagen
//! Mitglieder dort zum Zustellzeitpunkt nach.

use dashmap::DashMap;
use funkraum_core::types::{ChannelId, SessionId};
use funkraum_protocol::events::{FunkMessage, FunkPayload};
use std::sync::Arc;
use tokio::sync::mpsc;

use funkraum_funk::RegistryEvent;

use crate::server_state::{FunkState, FunkStore};

/// Groesse der Send-Queue pro Client
const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer verbundenen Session
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub session_id: SessionId,
    pub tx: mpsc::Sender<FunkMessage>,
}

impl ClientSender {
    /// Sendet eine Nachricht nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: FunkMessage) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(session_id = %self.session_id, "Send-Queue voll – Nachricht verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(session_id = %self.session_id, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Event-Broadcaster fuer alle verbundenen Sessions
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    /// Client-Sender, indiziert nach SessionId
    clients: DashMap<SessionId, ClientSender>,
}

impl EventBroadcaster {
    /// Erstellt einen neuen EventBroadcaster
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(EventBroadcasterInner {
                clients: DashMap::new(),
            }),
        }
    }

    /// Registriert eine neue Session und gibt ihre Empfangs-Queue zurueck
    ///
    /// Die `ClientConnection` liest aus dieser Queue und sendet via TCP.
    pub fn client_registrieren(&self, session_id: SessionId) -> mpsc::Receiver<FunkMessage> {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        self.inner
            .clients
            .insert(session_id, ClientSender { session_id, tx });
        tracing::debug!(session_id = %session_id, "Session im Broadcaster registriert");
        rx
    }

    /// Entfernt eine Session aus dem Broadcaster
    pub fn client_entfernen(&self, session_id: &SessionId) {
        self.inner.clients.remove(session_id);
        tracing::debug!(session_id = %session_id, "Session aus Broadcaster entfernt");
    }

    /// Prueft ob eine Session registriert ist
    pub fn ist_registriert(&self, session_id: &SessionId) -> bool {
        self.inner.clients.contains_key(session_id)
    }

    /// Sendet eine Nachricht an eine einzelne Session
    ///
    /// Gibt `true` zurueck wenn die Session gefunden und die Nachricht
    /// eingereiht wurde.
    pub fn an_session_senden(&self, session_id: &SessionId, nachricht: FunkMessage) -> bool {
        match self.inner.clients.get(session_id) {
            Some(sender) => sender.senden(nachricht),
            None => {
                tracing::debug!(session_id = %session_id, "Senden an unbekannte Session");
                false
            }
        }
    }

    /// Sendet eine Nachricht an eine Liste von Sessions
    ///
    /// Gibt die Anzahl der erfolgreichen Sendungen zurueck.
    pub fn an_sessions_senden(&self, sessions: &[SessionId], nachricht: FunkMessage) -> usize {
        sessions
            .iter()
            .filter(|sid| self.an_session_senden(sid, nachricht.clone()))
            .count()
    }

    /// Sendet an eine Liste von Sessions, eine ausgenommen
    pub fn an_sessions_senden_ausser(
        &self,
        sessions: &[SessionId],
        ausser: &SessionId,
        nachricht: FunkMessage,
    ) -> usize {
        sessions
            .iter()
            .filter(|sid| *sid != ausser)
            .filter(|sid| self.an_session_senden(sid, nachricht.clone()))
            .count()
    }

    /// Sendet eine Nachricht an alle registrierten Sessions
    pub fn an_alle_senden(&self, nachricht: FunkMessage) -> usize {
        self.inner
            .clients
            .iter()
            .filter(|sender| sender.senden(nachricht.clone()))
            .count()
    }

    /// Anzahl registrierter Sessions
    pub fn anzahl(&self) -> usize {
        self.inner.clients.len()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Registry-Event-Pumpe
// ---------------------------------------------------------------------------

/// Uebersetzt Registry-Ereignisse in Wire-Events
///
/// Laeuft als eigener Task bis die Registry geschlossen wird.
/// Mitgliedschafts-Aenderungen gehen an alle verbundenen Sessions,
/// nicht nur an die Kanal-Mitglieder; Kanal-Aenderungen als Kanalliste
/// ebenfalls an alle.
pub async fn registry_ereignisse_weiterleiten<D: FunkStore>(state: Arc<FunkState<D>>) {
    let mut ereignisse = state.registry.ereignisse();
    loop {
        match ereignisse.recv().await {
            Ok(RegistryEvent::Beigetreten { kanal, .. }) => {
                mitgliedschaft_melden(&state, kanal);
            }
            Ok(RegistryEvent::Verlassen { kanal, session }) => {
                sprechrecht_nachziehen(&state, kanal, session);
                mitgliedschaft_melden(&state, kanal);
            }
            Ok(RegistryEvent::KanalGeaendert { .. }) => {
                let nachricht = FunkMessage::push(FunkPayload::KanalListeAktualisiert {
                    kanaele: state.kanal_infos(),
                });
                state.broadcaster.an_alle_senden(nachricht);
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(verpasst)) => {
                tracing::warn!(verpasst, "Registry-Ereignisse verpasst");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::debug!("Registry-Event-Pumpe beendet");
}

/// Meldet den aktuellen Mitgliederstand eines Kanals
///
/// Geht an alle registrierten Sessions: Mitglieder sehen ihre neue
/// Liste, alle uebrigen (eine gerade ausgetretene Session eingeschlossen)
/// halten ihre Kanaluebersicht aktuell.
fn mitgliedschaft_melden<D: FunkStore>(state: &FunkState<D>, kanal: ChannelId) {
    let mitglieder = state.registry.mitglieder(&kanal);
    let nachricht = FunkMessage::push(FunkPayload::MitgliedschaftGeaendert { kanal, mitglieder });
    state.broadcaster.an_alle_senden(nachricht);
}

/// Entzieht einer ausgetretenen Session ein noch gehaltenes Sprechrecht
///
/// Die Handler raeumen das Sprechrecht auf ihren synchronen Pfaden
/// selbst ab; hierueber laufen Austritte, die nur als Registry-Ereignis
/// sichtbar werden, etwa das Herauswerfen bei einer Kanal-Deaktivierung.
fn sprechrecht_nachziehen<D: FunkStore>(
    state: &FunkState<D>,
    kanal: ChannelId,
    session: SessionId,
) {
    if state.floor.inhaber(&kanal) != Some(session) {
        return;
    }
    state.floor.zwangsfreigabe(kanal);
    state.sessions.sendet_setzen(&session, false);

    // Die Mitglieder sind zu diesem Zeitpunkt unter Umstaenden schon
    // herausgeworfen; die Meldung geht deshalb an alle
    let nachricht = FunkMessage::push(FunkPayload::UebertragungBeendet { kanal, session });
    state.broadcaster.an_alle_senden(nachricht);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_nachricht() -> FunkMessage {
        FunkMessage::push(FunkPayload::KanalListeAktualisiert { kanaele: vec![] })
    }

    #[tokio::test]
    async fn selektives_senden() {
        let broadcaster = EventBroadcaster::neu();
        let a = SessionId::new();
        let b = SessionId::new();
        let mut rx_a = broadcaster.client_registrieren(a);
        let mut rx_b = broadcaster.client_registrieren(b);

        assert!(broadcaster.an_session_senden(&a, test_nachricht()));
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());

        assert_eq!(broadcaster.an_sessions_senden_ausser(&[a, b], &a, test_nachricht()), 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());

        assert_eq!(broadcaster.an_alle_senden(test_nachricht()), 2);
    }

    #[tokio::test]
    async fn senden_an_unbekannte_session_schlaegt_fehl() {
        let broadcaster = EventBroadcaster::neu();
        assert!(!broadcaster.an_session_senden(&SessionId::new(), test_nachricht()));
    }

    #[tokio::test]
    async fn volle_queue_verwirft_ohne_blockieren() {
        let broadcaster = EventBroadcaster::neu();
        let a = SessionId::new();
        let _rx = broadcaster.client_registrieren(a);

        for _ in 0..SEND_QUEUE_GROESSE {
            assert!(broadcaster.an_session_senden(&a, test_nachricht()));
        }
        // Queue ist voll – Nachricht wird verworfen statt zu blockieren
        assert!(!broadcaster.an_session_senden(&a, test_nachricht()));
    }

    #[tokio::test]
    async fn entfernte_session_erhaelt_nichts() {
        let broadcaster = EventBroadcaster::neu();
        let a = SessionId::new();
        let _rx = broadcaster.client_registrieren(a);
        assert!(broadcaster.ist_registriert(&a));

        broadcaster.client_entfernen(&a);
        assert!(!broadcaster.ist_registriert(&a));
        assert!(!broadcaster.an_session_senden(&a, test_nachricht()));
    }
}
