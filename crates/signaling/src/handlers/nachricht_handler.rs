//! Handler fuer Fluestern, Kanal-Nachrichten und Setup-Austausch

use chrono::Utc;
use funkraum_core::types::{SessionId, UserId};
use funkraum_protocol::events::{ErrorCode, FunkMessage, FunkPayload};
use std::sync::Arc;

use crate::server_state::{FunkState, FunkStore};

/// Stellt ein Fluestern an eine Ziel-Session zu
///
/// Keine Warteschlange: ist das Ziel nicht verbunden, wird die Nachricht
/// verworfen und der Absender typisiert informiert. Erfolgreiche
/// Zustellung wird nicht quittiert.
pub async fn handle_fluestern<D: FunkStore>(
    request_id: u32,
    session_id: SessionId,
    ziel_session: SessionId,
    payload: String,
    state: &Arc<FunkState<D>>,
) -> Option<FunkMessage> {
    if !state.sessions.ist_aktiv(&ziel_session) {
        return Some(FunkMessage::fehler(
            request_id,
            ErrorCode::RecipientOffline,
            "Empfaenger offline",
        ));
    }

    let nachricht = FunkMessage::push(FunkPayload::FluesternEmpfangen {
        von: session_id,
        payload,
    });
    // Volle Queue verwirft mit Warnung, ist aber kein Absender-Fehler
    state.broadcaster.an_session_senden(&ziel_session, nachricht);
    None
}

/// Rundruf an alle Mitglieder des eigenen Kanals
///
/// Mitgliedschaft wird zum Zustellzeitpunkt in der Registry
/// nachgeschlagen, nie gecacht. Der Absender erhaelt den Rundruf mit
/// der `request_id` seiner Anfrage als Bestaetigung.
pub async fn handle_kanal_nachricht<D: FunkStore>(
    request_id: u32,
    session_id: SessionId,
    user_id: UserId,
    payload: String,
    state: &Arc<FunkState<D>>,
) -> FunkMessage {
    let Some(kanal) = state.registry.kanal_von_session(&session_id) else {
        return FunkMessage::fehler(
            request_id,
            ErrorCode::InvalidRequest,
            "Nicht in einem Kanal",
        );
    };

    if !state.gate.darf_schreiben(user_id).await {
        return FunkMessage::new(
            request_id,
            FunkPayload::ZugriffVerweigert {
                grund: "Schreiben nicht erlaubt".into(),
            },
        );
    }

    let rundruf = FunkPayload::KanalRundruf {
        kanal,
        von: session_id,
        payload,
        zeitstempel: Utc::now(),
    };

    let mitglieder = state.registry.mitglieder(&kanal);
    state.broadcaster.an_sessions_senden_ausser(
        &mitglieder,
        &session_id,
        FunkMessage::push(rundruf.clone()),
    );

    FunkMessage::new(request_id, rundruf)
}

/// Vermittelt einen opaken Setup-Payload an die Ziel-Session
///
/// Reine Weiterleitung ohne Interpretation des Inhalts.
pub async fn handle_setup_austausch<D: FunkStore>(
    request_id: u32,
    session_id: SessionId,
    ziel_session: SessionId,
    payload: serde_json::Value,
    state: &Arc<FunkState<D>>,
) -> Option<FunkMessage> {
    if !state.sessions.ist_aktiv(&ziel_session) {
        return Some(FunkMessage::fehler(
            request_id,
            ErrorCode::RecipientOffline,
            "Empfaenger offline",
        ));
    }

    let rolle = state.vermittlung.vermitteln(session_id, ziel_session);
    tracing::trace!(
        von = %session_id,
        zu = %ziel_session,
        rolle = ?rolle,
        "Setup-Payload vermittelt"
    );

    let nachricht = FunkMessage::push(FunkPayload::SetupAustauschEmpfangen {
        von: session_id,
        payload,
    });
    state.broadcaster.an_session_senden(&ziel_session, nachricht);
    None
}
