//! Handler fuer die externe Moderations-Oberflaeche
//!
//! Sanktionen werden ueber die Signaling-Verbindung eines Moderators
//! verhaengt und aufgehoben. Die Durchsetzung ist synchron: bevor die
//! Bestaetigung zurueckgeht, ist der Gate-Cache invalidiert und ein
//! gehaltenes Sprechrecht des Ziels entzogen.

use chrono::{DateTime, Utc};
use funkraum_core::types::{SanctionId, UserId};
use funkraum_db::{NeueSanktion, SanktionsArt};
use funkraum_protocol::events::{ErrorCode, FunkMessage, FunkPayload, SanktionsArtWire};
use std::sync::Arc;

use funkraum_moderation::ModerationsError;

use crate::server_state::{FunkState, FunkStore};

fn art_von_wire(art: SanktionsArtWire) -> SanktionsArt {
    match art {
        SanktionsArtWire::Verwarnung => SanktionsArt::Verwarnung,
        SanktionsArtWire::Stummschaltung => SanktionsArt::Stummschaltung,
        SanktionsArtWire::Bann => SanktionsArt::Bann,
    }
}

/// Verhaengt eine Sanktion gegen einen Benutzer
pub async fn handle_verhaengen<D: FunkStore>(
    request_id: u32,
    akteur: UserId,
    ziel: UserId,
    art: SanktionsArtWire,
    grund: String,
    laeuft_ab_am: Option<DateTime<Utc>>,
    state: &Arc<FunkState<D>>,
) -> FunkMessage {
    if let Some(ablauf) = laeuft_ab_am {
        if ablauf <= Utc::now() {
            return FunkMessage::fehler(
                request_id,
                ErrorCode::InvalidRequest,
                "Ablaufzeitpunkt liegt in der Vergangenheit",
            );
        }
    }

    let sanktion = NeueSanktion {
        ziel,
        art: art_von_wire(art),
        grund: &grund,
        ausgestellt_von: Some(akteur),
        laeuft_ab_am,
    };

    let record = match state.verwaltung.verhaengen(sanktion).await {
        Ok(record) => record,
        Err(fehler) => {
            tracing::error!(ziel = %ziel, fehler = %fehler, "Sanktion verhaengen fehlgeschlagen");
            return FunkMessage::fehler(
                request_id,
                ErrorCode::Unavailable,
                "Sanktion konnte nicht gespeichert werden",
            );
        }
    };

    // Synchrone Durchsetzung: ein laufendes Sprechrecht des Ziels endet
    // bevor die Bestaetigung zurueckgeht
    if matches!(
        record.art,
        SanktionsArt::Stummschaltung | SanktionsArt::Bann
    ) {
        sprechrecht_entziehen(state, ziel).await;
    }

    FunkMessage::new(request_id, FunkPayload::SanktionBestaetigt { id: record.id })
}

/// Hebt eine Sanktion vorzeitig auf
pub async fn handle_aufheben<D: FunkStore>(
    request_id: u32,
    akteur: UserId,
    id: SanctionId,
    state: &Arc<FunkState<D>>,
) -> FunkMessage {
    match state.verwaltung.aufheben(id).await {
        Ok(record) => {
            tracing::info!(
                sanktion_id = %id,
                akteur = %akteur,
                ziel = %record.ziel,
                "Sanktion aufgehoben"
            );
            FunkMessage::new(request_id, FunkPayload::SanktionBestaetigt { id })
        }
        Err(ModerationsError::NichtGefunden(_)) => {
            FunkMessage::fehler(request_id, ErrorCode::NotFound, "Sanktion nicht gefunden")
        }
        Err(fehler) => {
            tracing::error!(sanktion_id = %id, fehler = %fehler, "Sanktion aufheben fehlgeschlagen");
            FunkMessage::fehler(
                request_id,
                ErrorCode::Unavailable,
                "Sanktion konnte nicht aufgehoben werden",
            )
        }
    }
}

/// Entzieht dem Ziel-Benutzer ein gehaltenes Sprechrecht
async fn sprechrecht_entziehen<D: FunkStore>(state: &Arc<FunkState<D>>, ziel: UserId) {
    let Some(session) = state.sessions.session_von_user(&ziel) else {
        return;
    };

    for kanal in state.floor.freigeben_fuer_session(session.id) {
        state.sessions.sendet_setzen(&session.id, false);
        tracing::info!(
            user_id = %ziel,
            session_id = %session.id,
            kanal = %kanal,
            "Sprechrecht durch Sanktion entzogen"
        );

        let nachricht = FunkMessage::push(FunkPayload::UebertragungBeendet {
            kanal,
            session: session.id,
        });
        let mitglieder = state.registry.mitglieder(&kanal);
        state.broadcaster.an_sessions_senden(&mitglieder, nachricht);
    }
}
