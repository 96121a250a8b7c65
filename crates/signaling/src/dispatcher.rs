//! Message-Dispatcher – Routet FunkMessages an die richtigen Handler
//!
//! Der Dispatcher empfaengt FunkMessages von einer ClientConnection,
//! bestimmt den richtigen Handler und gibt die Antwort zurueck.
//!
//! ## Zustandspruefung
//! - `Verbinden` nur solange die Verbindung noch keine Session hat
//! - Alle anderen Nachrichten nur mit bestehender Session

use funkraum_core::types::{SessionId, UserId};
use funkraum_funk::Praesenz;
use funkraum_protocol::events::{ErrorCode, FunkMessage, FunkPayload, PraesenzStatus};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::handlers::{kanal_handler, moderation_handler, nachricht_handler, sende_handler};
use crate::server_state::{FunkState, FunkStore};

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
pub struct VerbindungsKontext {
    /// Peer-IP-Adresse (fuer Logging)
    pub peer_addr: SocketAddr,
    /// SessionId nach erfolgreichem Verbinden
    pub session_id: Option<SessionId>,
    /// Benutzer hinter der Session
    pub user_id: Option<UserId>,
}

/// Zentraler Message-Dispatcher
///
/// Routet eingehende FunkMessages an die entsprechenden Handler und
/// gibt die Antwort-FunkMessage zurueck.
pub struct FunkDispatcher<D: FunkStore> {
    state: Arc<FunkState<D>>,
}

impl<D: FunkStore> FunkDispatcher<D> {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<FunkState<D>>) -> Self {
        Self { state }
    }

    /// Verarbeitet eine eingehende FunkMessage und gibt die Antwort zurueck
    ///
    /// Gibt `None` zurueck wenn keine Antwort gesendet werden soll
    /// (z.B. erfolgreich zugestellte Fluestern-Nachrichten).
    pub async fn dispatch(
        &self,
        message: FunkMessage,
        ctx: &mut VerbindungsKontext,
    ) -> Option<FunkMessage> {
        let request_id = message.request_id;

        // ---------------------------------------------------------------
        // Verbinden (nur ohne bestehende Session)
        // ---------------------------------------------------------------
        if let FunkPayload::Verbinden {
            user_id,
            anzeigename,
        } = &message.payload
        {
            if ctx.session_id.is_some() {
                return Some(FunkMessage::fehler(
                    request_id,
                    ErrorCode::Conflict,
                    "Bereits verbunden",
                ));
            }

            // Reconnect: Ressourcen der alten Session synchron abraeumen
            if let Some(alte) = self.state.sessions.session_von_user(user_id) {
                self.session_aufraeumen(alte.id).await;
            }

            let (session_id, _) = self.state.sessions.verbinden(*user_id);
            ctx.session_id = Some(session_id);
            ctx.user_id = Some(*user_id);

            tracing::info!(
                peer = %ctx.peer_addr,
                user_id = %user_id,
                session_id = %session_id,
                anzeigename = %anzeigename,
                "Session eroeffnet"
            );
            self.state
                .audit(
                    "verbinden",
                    Some(*user_id),
                    format!("Session {session_id} ({anzeigename})"),
                )
                .await;

            return Some(FunkMessage::new(
                request_id,
                FunkPayload::SessionBereit { session_id },
            ));
        }

        // ---------------------------------------------------------------
        // Alle weiteren Nachrichten brauchen eine Session
        // ---------------------------------------------------------------
        let (Some(session_id), Some(user_id)) = (ctx.session_id, ctx.user_id) else {
            return Some(FunkMessage::fehler(
                request_id,
                ErrorCode::InvalidRequest,
                "Nicht verbunden",
            ));
        };

        match message.payload {
            FunkPayload::Verbinden { .. } => unreachable!("oben behandelt"),

            FunkPayload::KanalListe => {
                Some(kanal_handler::handle_kanal_liste(request_id, &self.state).await)
            }
            FunkPayload::KanalBeitreten { kanal } => Some(
                kanal_handler::handle_beitreten(request_id, session_id, user_id, kanal, &self.state)
                    .await,
            ),
            FunkPayload::KanalVerlassen => Some(
                kanal_handler::handle_verlassen(request_id, session_id, user_id, &self.state).await,
            ),

            FunkPayload::SendungStart => Some(
                sende_handler::handle_sendung_start(request_id, session_id, user_id, &self.state)
                    .await,
            ),
            FunkPayload::SendungStop => Some(
                sende_handler::handle_sendung_stop(request_id, session_id, user_id, &self.state)
                    .await,
            ),

            FunkPayload::Fluestern {
                ziel_session,
                payload,
            } => {
                nachricht_handler::handle_fluestern(
                    request_id,
                    session_id,
                    ziel_session,
                    payload,
                    &self.state,
                )
                .await
            }
            FunkPayload::KanalNachricht { payload } => Some(
                nachricht_handler::handle_kanal_nachricht(
                    request_id, session_id, user_id, payload, &self.state,
                )
                .await,
            ),
            FunkPayload::SetupAustausch {
                ziel_session,
                payload,
            } => {
                nachricht_handler::handle_setup_austausch(
                    request_id,
                    session_id,
                    ziel_session,
                    payload,
                    &self.state,
                )
                .await
            }

            FunkPayload::SanktionVerhaengen {
                ziel,
                art,
                grund,
                laeuft_ab_am,
            } => Some(
                moderation_handler::handle_verhaengen(
                    request_id,
                    user_id,
                    ziel,
                    art,
                    grund,
                    laeuft_ab_am,
                    &self.state,
                )
                .await,
            ),
            FunkPayload::SanktionAufheben { id } => Some(
                moderation_handler::handle_aufheben(request_id, user_id, id, &self.state).await,
            ),

            FunkPayload::StatusSetzen {
                praesenz,
                lautstaerke,
            } => {
                if let Some(status) = praesenz {
                    self.state
                        .sessions
                        .praesenz_setzen(&session_id, praesenz_von_wire(status));
                }
                if let Some(wert) = lautstaerke {
                    self.state.sessions.lautstaerke_setzen(&session_id, wert);
                }
                None
            }

            FunkPayload::Ping { timestamp_ms } => {
                let jetzt = chrono::Utc::now().timestamp_millis() as u64;
                Some(FunkMessage::pong(request_id, timestamp_ms, jetzt))
            }
            // Pong beantwortet unseren Keepalive-Ping; der Empfang selbst
            // hat den Timeout bereits zurueckgesetzt
            FunkPayload::Pong { .. } => None,

            // Server -> Client Nachrichten sind eingehend ungueltig
            _ => Some(FunkMessage::fehler(
                request_id,
                ErrorCode::InvalidRequest,
                "Unerwarteter Nachrichtentyp",
            )),
        }
    }

    /// Raeumt eine Session vollstaendig ab
    ///
    /// Aufraeumvertrag bei Trennung (und Reconnect-Ersetzung), laeuft
    /// synchron bevor irgendein weiteres Ereignis der Session verarbeitet
    /// wird: Sprechrecht entziehen, Kanal verlassen, Austausche und
    /// Broadcaster-Queue entfernen, Session trennen. Wird der
    /// getrennten Partei nie als Fehler gemeldet.
    pub async fn session_aufraeumen(&self, session_id: SessionId) {
        // Sprechrecht in allen Kanaelen entziehen und Mitglieder informieren
        for kanal in self.state.floor.freigeben_fuer_session(session_id) {
            let nachricht = FunkMessage::push(FunkPayload::UebertragungBeendet {
                kanal,
                session: session_id,
            });
            let mitglieder = self.state.registry.mitglieder(&kanal);
            self.state
                .broadcaster
                .an_sessions_senden(&mitglieder, nachricht);
        }

        // Kanal verlassen (Mitglieds-Broadcast via Registry-Event-Pumpe)
        self.state.registry.verlassen(session_id).await;
        self.state.registry.aufraeumen(&session_id);

        // Halboffene Setup-Austausche verwerfen
        self.state.vermittlung.session_entfernen(&session_id);

        self.state.broadcaster.client_entfernen(&session_id);

        if let Some(session) = self.state.sessions.trennen(&session_id) {
            tracing::info!(
                session_id = %session_id,
                user_id = %session.user_id,
                "Session abgeraeumt"
            );
        }
    }
}

fn praesenz_von_wire(status: PraesenzStatus) -> Praesenz {
    match status {
        PraesenzStatus::Verbunden => Praesenz::Verbunden,
        PraesenzStatus::Spricht => Praesenz::Spricht,
        PraesenzStatus::Stumm => Praesenz::Stumm,
        PraesenzStatus::Abwesend => Praesenz::Abwesend,
    }
}
