//! Handler fuer Kanal-Nachrichten (Liste, Beitreten, Verlassen)

use funkraum_core::types::{SessionId, UserId};
use funkraum_protocol::events::{FunkMessage, FunkPayload};
use std::sync::Arc;

use crate::server_state::{FunkState, FunkStore};

/// Liefert die aktuelle Kanalliste
pub async fn handle_kanal_liste<D: FunkStore>(
    request_id: u32,
    state: &Arc<FunkState<D>>,
) -> FunkMessage {
    FunkMessage::new(
        request_id,
        FunkPayload::KanalListeAktualisiert {
            kanaele: state.kanal_infos(),
        },
    )
}

/// Tritt einem Kanal bei
///
/// Gate-Pruefung, Kapazitaet und die Ein-Kanal-Invariante liegen in der
/// Registry; hier wird nur der Session-Spiegel gepflegt und die Antwort
/// gebaut. Mitgliedschafts-Broadcasts uebernimmt die Registry-Event-Pumpe.
pub async fn handle_beitreten<D: FunkStore>(
    request_id: u32,
    session_id: SessionId,
    user_id: UserId,
    kanal: funkraum_core::types::ChannelId,
    state: &Arc<FunkState<D>>,
) -> FunkMessage {
    let alter_kanal = state.registry.kanal_von_session(&session_id);

    match state.registry.beitreten(session_id, user_id, kanal).await {
        Ok(record) => {
            // Haelt die Session das Sprechrecht im alten Kanal, endet die
            // Uebertragung mit dem Wechsel; ein gescheiterter Beitritt
            // laesst das Sprechrecht unberuehrt
            if let Some(alt) = alter_kanal.filter(|alt| *alt != record.id) {
                if state.floor.inhaber(&alt) == Some(session_id) {
                    state.floor.zwangsfreigabe(alt);
                    state.sessions.sendet_setzen(&session_id, false);
                    let nachricht = FunkMessage::push(FunkPayload::UebertragungBeendet {
                        kanal: alt,
                        session: session_id,
                    });
                    let mitglieder = state.registry.mitglieder(&alt);
                    state.broadcaster.an_sessions_senden(&mitglieder, nachricht);
                }
            }

            state.sessions.kanal_setzen(&session_id, Some(record.id));
            state
                .audit(
                    "kanal_beitreten",
                    Some(user_id),
                    format!("Session {session_id} in Kanal {}", record.name),
                )
                .await;

            FunkMessage::new(
                request_id,
                FunkPayload::MitgliedschaftGeaendert {
                    kanal: record.id,
                    mitglieder: state.registry.mitglieder(&record.id),
                },
            )
        }
        Err(fehler) => {
            tracing::debug!(
                session_id = %session_id,
                user_id = %user_id,
                kanal = %kanal,
                fehler = %fehler,
                "Kanal-Beitritt abgelehnt"
            );
            FunkMessage::von_fehler(request_id, &fehler)
        }
    }
}

/// Verlaesst den aktuellen Kanal (idempotent)
pub async fn handle_verlassen<D: FunkStore>(
    request_id: u32,
    session_id: SessionId,
    user_id: UserId,
    state: &Arc<FunkState<D>>,
) -> FunkMessage {
    sprechrecht_abraeumen(state, session_id).await;

    match state.registry.verlassen(session_id).await {
        Some(kanal) => {
            state.sessions.kanal_setzen(&session_id, None);
            state
                .audit(
                    "kanal_verlassen",
                    Some(user_id),
                    format!("Session {session_id} aus Kanal {kanal}"),
                )
                .await;

            FunkMessage::new(
                request_id,
                FunkPayload::MitgliedschaftGeaendert {
                    kanal,
                    mitglieder: state.registry.mitglieder(&kanal),
                },
            )
        }
        // Kein Kanal – nichts zu tun, trotzdem kein Fehler
        None => FunkMessage::new(
            request_id,
            FunkPayload::KanalListeAktualisiert {
                kanaele: state.kanal_infos(),
            },
        ),
    }
}

/// Entzieht der Session ein gehaltenes Sprechrecht in ihrem Kanal
///
/// Teil des Austritts- und Wechselpfads: laeuft synchron bevor die
/// Mitgliedschaft angefasst wird, damit kein Kanal mit dem Sprechrecht
/// einer abwesenden Session haengen bleibt.
pub async fn sprechrecht_abraeumen<D: FunkStore>(
    state: &Arc<FunkState<D>>,
    session_id: SessionId,
) {
    let Some(kanal) = state.registry.kanal_von_session(&session_id) else {
        return;
    };
    if state.floor.inhaber(&kanal) != Some(session_id) {
        return;
    }

    state.floor.zwangsfreigabe(kanal);
    state.sessions.sendet_setzen(&session_id, false);

    let nachricht = FunkMessage::push(FunkPayload::UebertragungBeendet {
        kanal,
        session: session_id,
    });
    let mitglieder = state.registry.mitglieder(&kanal);
    state.broadcaster.an_sessions_senden(&mitglieder, nachricht);
}
