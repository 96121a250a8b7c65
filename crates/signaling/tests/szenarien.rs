//! End-zu-End-Szenarien auf Dispatcher-Ebene
//!
//! Simuliert mehrere Clients gegen einen gemeinsamen FunkState, ohne
//! echte TCP-Verbindungen: jeder Client hat einen eigenen Kontext und
//! eine Broadcaster-Queue, genau wie in einer ClientConnection.

use funkraum_core::types::{ChannelId, SessionId, UserId};
use funkraum_db::{KanalKategorie, MemoryStore, NeuerKanal};
use funkraum_protocol::events::{ErrorCode, FunkMessage, FunkPayload, SanktionsArtWire};
use funkraum_signaling::{
    registry_ereignisse_weiterleiten, FunkConfig, FunkDispatcher, FunkState, VerbindungsKontext,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct TestClient {
    ctx: VerbindungsKontext,
    rx: mpsc::Receiver<FunkMessage>,
    session_id: SessionId,
    user_id: UserId,
}

fn test_addr() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

async fn state_mit_kanal(
    name: &str,
    kapazitaet: u32,
) -> (Arc<FunkState<MemoryStore>>, ChannelId) {
    let store = Arc::new(MemoryStore::neu());
    let state = FunkState::neu(FunkConfig::default(), store);
    let kanal = state
        .registry
        .anlegen(NeuerKanal {
            name,
            kategorie: KanalKategorie::Oeffentlich,
            kapazitaet,
            prioritaet: 1,
        })
        .await
        .unwrap();
    (state, kanal.id)
}

async fn verbinden(
    dispatcher: &FunkDispatcher<MemoryStore>,
    state: &Arc<FunkState<MemoryStore>>,
) -> TestClient {
    let user_id = UserId::new();
    let mut ctx = VerbindungsKontext {
        peer_addr: test_addr(),
        session_id: None,
        user_id: None,
    };

    let antwort = dispatcher
        .dispatch(
            FunkMessage::new(
                1,
                FunkPayload::Verbinden {
                    user_id,
                    anzeigename: "Testclient".into(),
                },
            ),
            &mut ctx,
        )
        .await
        .unwrap();

    let FunkPayload::SessionBereit { session_id } = antwort.payload else {
        panic!("unerwartete Antwort: {:?}", antwort.payload);
    };
    let rx = state.broadcaster.client_registrieren(session_id);

    TestClient {
        ctx,
        rx,
        session_id,
        user_id,
    }
}

async fn beitreten(
    dispatcher: &FunkDispatcher<MemoryStore>,
    client: &mut TestClient,
    kanal: ChannelId,
) -> FunkMessage {
    dispatcher
        .dispatch(
            FunkMessage::new(2, FunkPayload::KanalBeitreten { kanal }),
            &mut client.ctx,
        )
        .await
        .unwrap()
}

/// Leert die Queue eines Clients und gibt alle Payloads zurueck
fn empfangene(client: &mut TestClient) -> Vec<FunkPayload> {
    let mut payloads = Vec::new();
    while let Ok(msg) = client.rx.try_recv() {
        payloads.push(msg.payload);
    }
    payloads
}

// ---------------------------------------------------------------------------
// Mitgliedschaft
// ---------------------------------------------------------------------------

#[tokio::test]
async fn beitritt_und_kapazitaet() {
    let (state, kanal) = state_mit_kanal("Allgemein", 2).await;
    let dispatcher = FunkDispatcher::neu(Arc::clone(&state));

    let mut alice = verbinden(&dispatcher, &state).await;
    let mut bob = verbinden(&dispatcher, &state).await;
    let mut chris = verbinden(&dispatcher, &state).await;

    let antwort = beitreten(&dispatcher, &mut alice, kanal).await;
    assert!(matches!(
        antwort.payload,
        FunkPayload::MitgliedschaftGeaendert { .. }
    ));
    beitreten(&dispatcher, &mut bob, kanal).await;

    // Kanal voll
    let antwort = beitreten(&dispatcher, &mut chris, kanal).await;
    match antwort.payload {
        FunkPayload::Fehler(f) => assert_eq!(f.code, ErrorCode::Full),
        andere => panic!("unerwartete Antwort: {andere:?}"),
    }

    assert_eq!(state.registry.mitglieder(&kanal).len(), 2);
}

#[tokio::test]
async fn eine_session_hoechstens_ein_kanal() {
    let (state, alpha) = state_mit_kanal("Alpha", 8).await;
    let dispatcher = FunkDispatcher::neu(Arc::clone(&state));
    let beta = state
        .registry
        .anlegen(NeuerKanal {
            name: "Beta",
            kategorie: KanalKategorie::Oeffentlich,
            kapazitaet: 8,
            prioritaet: 1,
        })
        .await
        .unwrap()
        .id;

    let mut alice = verbinden(&dispatcher, &state).await;
    beitreten(&dispatcher, &mut alice, alpha).await;
    beitreten(&dispatcher, &mut alice, beta).await;

    assert_eq!(state.registry.kanal_von_session(&alice.session_id), Some(beta));
    assert!(state.registry.mitglieder(&alpha).is_empty());
}

#[tokio::test]
async fn mitgliedschafts_aenderung_erreicht_alle_verbundenen() {
    let (state, kanal) = state_mit_kanal("Allgemein", 8).await;
    let dispatcher = FunkDispatcher::neu(Arc::clone(&state));
    let pumpe = tokio::spawn(registry_ereignisse_weiterleiten(Arc::clone(&state)));
    // Pumpe muss abonniert haben bevor das erste Ereignis faellt
    tokio::task::yield_now().await;

    let mut alice = verbinden(&dispatcher, &state).await;
    let mut draussen = verbinden(&dispatcher, &state).await;

    beitreten(&dispatcher, &mut alice, kanal).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Auch Sessions ausserhalb des Kanals sehen den neuen Mitgliederstand
    let payloads = empfangene(&mut draussen);
    assert!(
        payloads.iter().any(|p| matches!(
            p,
            FunkPayload::MitgliedschaftGeaendert { kanal: k, mitglieder }
                if *k == kanal && mitglieder.contains(&alice.session_id)
        )),
        "Payloads: {payloads:?}"
    );

    pumpe.abort();
}

// ---------------------------------------------------------------------------
// Sprechrecht
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sprechrecht_ist_exklusiv() {
    let (state, kanal) = state_mit_kanal("Allgemein", 8).await;
    let dispatcher = FunkDispatcher::neu(Arc::clone(&state));

    let mut alice = verbinden(&dispatcher, &state).await;
    let mut bob = verbinden(&dispatcher, &state).await;
    beitreten(&dispatcher, &mut alice, kanal).await;
    beitreten(&dispatcher, &mut bob, kanal).await;
    empfangene(&mut alice);
    empfangene(&mut bob);

    let antwort = dispatcher
        .dispatch(
            FunkMessage::new(3, FunkPayload::SendungStart),
            &mut alice.ctx,
        )
        .await
        .unwrap();
    assert!(matches!(
        antwort.payload,
        FunkPayload::UebertragungBegonnen { .. }
    ));

    // Bob sieht den Sendungsbeginn
    assert!(empfangene(&mut bob)
        .iter()
        .any(|p| matches!(p, FunkPayload::UebertragungBegonnen { .. })));

    // Bob bekommt das Sprechrecht nicht solange Alice sendet
    let antwort = dispatcher
        .dispatch(FunkMessage::new(4, FunkPayload::SendungStart), &mut bob.ctx)
        .await
        .unwrap();
    match antwort.payload {
        FunkPayload::Fehler(f) => assert_eq!(f.code, ErrorCode::Conflict),
        andere => panic!("unerwartete Antwort: {andere:?}"),
    }

    // Nach Freigabe darf Bob
    dispatcher
        .dispatch(
            FunkMessage::new(5, FunkPayload::SendungStop),
            &mut alice.ctx,
        )
        .await
        .unwrap();
    let antwort = dispatcher
        .dispatch(FunkMessage::new(6, FunkPayload::SendungStart), &mut bob.ctx)
        .await
        .unwrap();
    assert!(matches!(
        antwort.payload,
        FunkPayload::UebertragungBegonnen { .. }
    ));
}

#[tokio::test]
async fn freigabe_ohne_sprechrecht_ist_konflikt() {
    let (state, kanal) = state_mit_kanal("Allgemein", 8).await;
    let dispatcher = FunkDispatcher::neu(Arc::clone(&state));

    let mut alice = verbinden(&dispatcher, &state).await;
    beitreten(&dispatcher, &mut alice, kanal).await;

    let antwort = dispatcher
        .dispatch(
            FunkMessage::new(3, FunkPayload::SendungStop),
            &mut alice.ctx,
        )
        .await
        .unwrap();
    match antwort.payload {
        FunkPayload::Fehler(f) => assert_eq!(f.code, ErrorCode::Conflict),
        andere => panic!("unerwartete Antwort: {andere:?}"),
    }
}

#[tokio::test]
async fn trennung_erzwingt_freigabe() {
    let (state, kanal) = state_mit_kanal("Allgemein", 8).await;
    let dispatcher = FunkDispatcher::neu(Arc::clone(&state));

    let mut alice = verbinden(&dispatcher, &state).await;
    let mut bob = verbinden(&dispatcher, &state).await;
    beitreten(&dispatcher, &mut alice, kanal).await;
    beitreten(&dispatcher, &mut bob, kanal).await;
    dispatcher
        .dispatch(
            FunkMessage::new(3, FunkPayload::SendungStart),
            &mut alice.ctx,
        )
        .await
        .unwrap();
    empfangene(&mut bob);

    // Alice trennt die Verbindung
    dispatcher.session_aufraeumen(alice.session_id).await;

    assert_eq!(state.floor.inhaber(&kanal), None);
    assert!(!state.sessions.ist_aktiv(&alice.session_id));

    // Bob sieht das Ende der Uebertragung
    let payloads = empfangene(&mut bob);
    assert!(
        payloads
            .iter()
            .any(|p| matches!(p, FunkPayload::UebertragungBeendet { .. })),
        "Payloads: {payloads:?}"
    );
}

#[tokio::test]
async fn deaktivierung_entzieht_sprechrecht() {
    let (state, kanal) = state_mit_kanal("Allgemein", 8).await;
    let dispatcher = FunkDispatcher::neu(Arc::clone(&state));
    let pumpe = tokio::spawn(registry_ereignisse_weiterleiten(Arc::clone(&state)));
    // Pumpe muss abonniert haben bevor das erste Ereignis faellt
    tokio::task::yield_now().await;

    let mut alice = verbinden(&dispatcher, &state).await;
    beitreten(&dispatcher, &mut alice, kanal).await;
    dispatcher
        .dispatch(
            FunkMessage::new(3, FunkPayload::SendungStart),
            &mut alice.ctx,
        )
        .await
        .unwrap();
    assert_eq!(state.floor.inhaber(&kanal), Some(alice.session_id));

    state.registry.deaktivieren(kanal).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Das Sprechrecht haengt nicht am deaktivierten Kanal fest, die
    // herausgeworfene Inhaberin sieht das Ende ihrer Uebertragung
    assert_eq!(state.floor.inhaber(&kanal), None);
    assert!(!state
        .sessions
        .session(&alice.session_id)
        .is_some_and(|s| s.sendet));
    assert!(empfangene(&mut alice)
        .iter()
        .any(|p| matches!(p, FunkPayload::UebertragungBeendet { .. })));

    pumpe.abort();
}

// ---------------------------------------------------------------------------
// Fluestern und Rundruf
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fluestern_an_offline_ziel() {
    let (state, _) = state_mit_kanal("Allgemein", 8).await;
    let dispatcher = FunkDispatcher::neu(Arc::clone(&state));

    let mut alice = verbinden(&dispatcher, &state).await;

    let antwort = dispatcher
        .dispatch(
            FunkMessage::new(
                3,
                FunkPayload::Fluestern {
                    ziel_session: SessionId::new(),
                    payload: "hallo?".into(),
                },
            ),
            &mut alice.ctx,
        )
        .await
        .unwrap();
    match antwort.payload {
        FunkPayload::Fehler(f) => assert_eq!(f.code, ErrorCode::RecipientOffline),
        andere => panic!("unerwartete Antwort: {andere:?}"),
    }
}

#[tokio::test]
async fn fluestern_wird_nur_dem_ziel_zugestellt() {
    let (state, kanal) = state_mit_kanal("Allgemein", 8).await;
    let dispatcher = FunkDispatcher::neu(Arc::clone(&state));

    let mut alice = verbinden(&dispatcher, &state).await;
    let mut bob = verbinden(&dispatcher, &state).await;
    let mut chris = verbinden(&dispatcher, &state).await;
    beitreten(&dispatcher, &mut alice, kanal).await;
    beitreten(&dispatcher, &mut bob, kanal).await;
    beitreten(&dispatcher, &mut chris, kanal).await;
    empfangene(&mut bob);
    empfangene(&mut chris);

    let antwort = dispatcher
        .dispatch(
            FunkMessage::new(
                3,
                FunkPayload::Fluestern {
                    ziel_session: bob.session_id,
                    payload: "geheim".into(),
                },
            ),
            &mut alice.ctx,
        )
        .await;
    assert!(antwort.is_none());

    let bei_bob = empfangene(&mut bob);
    assert!(matches!(
        bei_bob.as_slice(),
        [FunkPayload::FluesternEmpfangen { payload, .. }] if payload == "geheim"
    ));
    assert!(empfangene(&mut chris).is_empty());
}

#[tokio::test]
async fn rundruf_erreicht_nur_kanal_mitglieder() {
    let (state, kanal) = state_mit_kanal("Allgemein", 8).await;
    let dispatcher = FunkDispatcher::neu(Arc::clone(&state));

    let mut alice = verbinden(&dispatcher, &state).await;
    let mut bob = verbinden(&dispatcher, &state).await;
    let mut draussen = verbinden(&dispatcher, &state).await;
    beitreten(&dispatcher, &mut alice, kanal).await;
    beitreten(&dispatcher, &mut bob, kanal).await;
    empfangene(&mut bob);
    empfangene(&mut draussen);

    let antwort = dispatcher
        .dispatch(
            FunkMessage::new(
                3,
                FunkPayload::KanalNachricht {
                    payload: "Funkdisziplin!".into(),
                },
            ),
            &mut alice.ctx,
        )
        .await
        .unwrap();
    // Der Absender erhaelt den Rundruf als Bestaetigung
    assert!(matches!(antwort.payload, FunkPayload::KanalRundruf { .. }));

    let bei_bob = empfangene(&mut bob);
    match bei_bob.as_slice() {
        [FunkPayload::KanalRundruf { von, payload, .. }] => {
            assert_eq!(*von, alice.session_id);
            assert_eq!(payload, "Funkdisziplin!");
        }
        andere => panic!("unerwartete Payloads: {andere:?}"),
    }
    assert!(empfangene(&mut draussen).is_empty());
}

// ---------------------------------------------------------------------------
// Setup-Austausch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn setup_austausch_wird_opak_vermittelt() {
    let (state, _) = state_mit_kanal("Allgemein", 8).await;
    let dispatcher = FunkDispatcher::neu(Arc::clone(&state));

    let mut alice = verbinden(&dispatcher, &state).await;
    let mut bob = verbinden(&dispatcher, &state).await;

    let blob = serde_json::json!({"offer": "v=0", "kandidaten": ["a", "b"]});
    let antwort = dispatcher
        .dispatch(
            FunkMessage::new(
                3,
                FunkPayload::SetupAustausch {
                    ziel_session: bob.session_id,
                    payload: blob.clone(),
                },
            ),
            &mut alice.ctx,
        )
        .await;
    assert!(antwort.is_none());
    assert_eq!(state.vermittlung.anzahl(), 1);

    let bei_bob = empfangene(&mut bob);
    match bei_bob.as_slice() {
        [FunkPayload::SetupAustauschEmpfangen { von, payload }] => {
            assert_eq!(*von, alice.session_id);
            assert_eq!(*payload, blob);
        }
        andere => panic!("unerwartete Payloads: {andere:?}"),
    }

    // Antwort von Bob schliesst den Austausch
    dispatcher
        .dispatch(
            FunkMessage::new(
                4,
                FunkPayload::SetupAustausch {
                    ziel_session: alice.session_id,
                    payload: serde_json::json!({"answer": "v=0"}),
                },
            ),
            &mut bob.ctx,
        )
        .await;
    assert_eq!(state.vermittlung.anzahl(), 0);
}

// ---------------------------------------------------------------------------
// Sanktionen
// ---------------------------------------------------------------------------

#[tokio::test]
async fn permanenter_bann_entzieht_sprechrecht_sofort() {
    let (state, notruf) = state_mit_kanal("Notruf", 8).await;
    let dispatcher = FunkDispatcher::neu(Arc::clone(&state));

    let mut moderator = verbinden(&dispatcher, &state).await;
    let mut carol = verbinden(&dispatcher, &state).await;
    let mut zeuge = verbinden(&dispatcher, &state).await;
    beitreten(&dispatcher, &mut carol, notruf).await;
    beitreten(&dispatcher, &mut zeuge, notruf).await;

    dispatcher
        .dispatch(
            FunkMessage::new(3, FunkPayload::SendungStart),
            &mut carol.ctx,
        )
        .await
        .unwrap();
    assert_eq!(state.floor.inhaber(&notruf), Some(carol.session_id));
    empfangene(&mut zeuge);

    // Moderator verhaengt permanenten Bann waehrend Carol sendet
    let antwort = dispatcher
        .dispatch(
            FunkMessage::new(
                4,
                FunkPayload::SanktionVerhaengen {
                    ziel: carol.user_id,
                    art: SanktionsArtWire::Bann,
                    grund: "Missbrauch des Notrufkanals".into(),
                    laeuft_ab_am: None,
                },
            ),
            &mut moderator.ctx,
        )
        .await
        .unwrap();
    assert!(matches!(
        antwort.payload,
        FunkPayload::SanktionBestaetigt { .. }
    ));

    // Sprechrecht ist synchron entzogen, Mitglieder sehen das Ende
    assert_eq!(state.floor.inhaber(&notruf), None);
    assert!(empfangene(&mut zeuge)
        .iter()
        .any(|p| matches!(p, FunkPayload::UebertragungBeendet { .. })));

    // Jeder weitere Beitrittsversuch nennt die permanente Sperre
    let antwort = beitreten(&dispatcher, &mut carol, notruf).await;
    match antwort.payload {
        FunkPayload::ZugriffVerweigert { grund } => {
            assert!(grund.contains("permanente"), "Grund war: {grund}");
        }
        andere => panic!("unerwartete Antwort: {andere:?}"),
    }
}

#[tokio::test]
async fn aufgehobene_sanktion_wirkt_sofort() {
    let (state, kanal) = state_mit_kanal("Allgemein", 8).await;
    let dispatcher = FunkDispatcher::neu(Arc::clone(&state));

    let mut moderator = verbinden(&dispatcher, &state).await;
    let mut alice = verbinden(&dispatcher, &state).await;

    let antwort = dispatcher
        .dispatch(
            FunkMessage::new(
                3,
                FunkPayload::SanktionVerhaengen {
                    ziel: alice.user_id,
                    art: SanktionsArtWire::Bann,
                    grund: "Test".into(),
                    laeuft_ab_am: None,
                },
            ),
            &mut moderator.ctx,
        )
        .await
        .unwrap();
    let FunkPayload::SanktionBestaetigt { id } = antwort.payload else {
        panic!("unerwartete Antwort");
    };

    let antwort = beitreten(&dispatcher, &mut alice, kanal).await;
    assert!(matches!(
        antwort.payload,
        FunkPayload::ZugriffVerweigert { .. }
    ));

    dispatcher
        .dispatch(
            FunkMessage::new(4, FunkPayload::SanktionAufheben { id }),
            &mut moderator.ctx,
        )
        .await
        .unwrap();

    let antwort = beitreten(&dispatcher, &mut alice, kanal).await;
    assert!(matches!(
        antwort.payload,
        FunkPayload::MitgliedschaftGeaendert { .. }
    ));
}

// ---------------------------------------------------------------------------
// Verbindungs-Lebenszyklus
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconnect_ersetzt_alte_session() {
    let (state, kanal) = state_mit_kanal("Allgemein", 8).await;
    let dispatcher = FunkDispatcher::neu(Arc::clone(&state));

    let mut alice = verbinden(&dispatcher, &state).await;
    beitreten(&dispatcher, &mut alice, kanal).await;

    // Gleicher Benutzer verbindet sich erneut (z.B. nach Netzwechsel)
    let mut ctx = VerbindungsKontext {
        peer_addr: test_addr(),
        session_id: None,
        user_id: None,
    };
    let antwort = dispatcher
        .dispatch(
            FunkMessage::new(
                1,
                FunkPayload::Verbinden {
                    user_id: alice.user_id,
                    anzeigename: "Alice".into(),
                },
            ),
            &mut ctx,
        )
        .await
        .unwrap();
    let FunkPayload::SessionBereit { session_id } = antwort.payload else {
        panic!("unerwartete Antwort");
    };

    assert_ne!(session_id, alice.session_id);
    assert!(!state.sessions.ist_aktiv(&alice.session_id));
    // Die alte Mitgliedschaft wurde abgeraeumt
    assert!(state.registry.mitglieder(&kanal).is_empty());
    assert_eq!(state.sessions.anzahl(), 1);
}

#[tokio::test]
async fn nachrichten_ohne_session_sind_ungueltig() {
    let (state, kanal) = state_mit_kanal("Allgemein", 8).await;
    let dispatcher = FunkDispatcher::neu(Arc::clone(&state));

    let mut ctx = VerbindungsKontext {
        peer_addr: test_addr(),
        session_id: None,
        user_id: None,
    };
    let antwort = dispatcher
        .dispatch(
            FunkMessage::new(1, FunkPayload::KanalBeitreten { kanal }),
            &mut ctx,
        )
        .await
        .unwrap();
    match antwort.payload {
        FunkPayload::Fehler(f) => assert_eq!(f.code, ErrorCode::InvalidRequest),
        andere => panic!("unerwartete Antwort: {andere:?}"),
    }
}
