//! Handler fuer Sprechrecht-Nachrichten (SendungStart, SendungStop)
//!
//! Der Arbiter entscheidet nur den Zustandsuebergang; die Broadcasts an
//! die Kanal-Mitglieder laufen hier, nach der Entscheidung.

use funkraum_core::types::{SessionId, UserId};
use funkraum_protocol::events::{ErrorCode, FunkMessage, FunkPayload};
use std::sync::Arc;

use funkraum_funk::{AblehnungsGrund, FloorEntscheid, FloorFehler};

use crate::server_state::{FunkState, FunkStore};

/// Fordert das Sprechrecht im aktuellen Kanal an
pub async fn handle_sendung_start<D: FunkStore>(
    request_id: u32,
    session_id: SessionId,
    user_id: UserId,
    state: &Arc<FunkState<D>>,
) -> FunkMessage {
    let Some(kanal) = state.registry.kanal_von_session(&session_id) else {
        return FunkMessage::fehler(
            request_id,
            ErrorCode::InvalidRequest,
            "Nicht in einem Kanal",
        );
    };

    // Gate-Entscheidung vor dem Arbiter; der Grund wird bei Ablehnung
    // wortgleich gemeldet
    let lage = state.gate.rechtelage(user_id).await;

    match state.floor.belegen(kanal, session_id, lage.darf_sprechen) {
        FloorEntscheid::Gewaehrt => {
            state.sessions.sendet_setzen(&session_id, true);
            state
                .audit(
                    "sendung_start",
                    Some(user_id),
                    format!("Session {session_id} sendet in Kanal {kanal}"),
                )
                .await;

            let nachricht = FunkMessage::push(FunkPayload::UebertragungBegonnen {
                kanal,
                session: session_id,
            });
            let mitglieder = state.registry.mitglieder(&kanal);
            state
                .broadcaster
                .an_sessions_senden_ausser(&mitglieder, &session_id, nachricht);

            FunkMessage::new(
                request_id,
                FunkPayload::UebertragungBegonnen {
                    kanal,
                    session: session_id,
                },
            )
        }
        FloorEntscheid::Abgelehnt(AblehnungsGrund::BereitsBelegt) => FunkMessage::fehler(
            request_id,
            ErrorCode::Conflict,
            "Sprechrecht bereits vergeben",
        ),
        FloorEntscheid::Abgelehnt(AblehnungsGrund::NichtSprechberechtigt) => FunkMessage::new(
            request_id,
            FunkPayload::ZugriffVerweigert {
                grund: lage
                    .sprech_grund
                    .unwrap_or_else(|| "Sprechen nicht erlaubt".into()),
            },
        ),
    }
}

/// Gibt das Sprechrecht im aktuellen Kanal frei
pub async fn handle_sendung_stop<D: FunkStore>(
    request_id: u32,
    session_id: SessionId,
    user_id: UserId,
    state: &Arc<FunkState<D>>,
) -> FunkMessage {
    let Some(kanal) = state.registry.kanal_von_session(&session_id) else {
        return FunkMessage::fehler(
            request_id,
            ErrorCode::InvalidRequest,
            "Nicht in einem Kanal",
        );
    };

    match state.floor.freigeben(kanal, session_id) {
        Ok(()) => {
            state.sessions.sendet_setzen(&session_id, false);
            state
                .audit(
                    "sendung_stop",
                    Some(user_id),
                    format!("Session {session_id} beendet Sendung in Kanal {kanal}"),
                )
                .await;

            let nachricht = FunkMessage::push(FunkPayload::UebertragungBeendet {
                kanal,
                session: session_id,
            });
            let mitglieder = state.registry.mitglieder(&kanal);
            state
                .broadcaster
                .an_sessions_senden_ausser(&mitglieder, &session_id, nachricht);

            FunkMessage::new(
                request_id,
                FunkPayload::UebertragungBeendet {
                    kanal,
                    session: session_id,
                },
            )
        }
        Err(FloorFehler::NichtInhaber) => FunkMessage::fehler(
            request_id,
            ErrorCode::Conflict,
            "Sprechrecht nicht gehalten",
        ),
    }
}
