//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen Ping
//! - Client muss innerhalb von `verbindungs_timeout_sek` irgendetwas senden
//! - Bei Timeout wird die Verbindung getrennt
//!
//! ## Aufraeumvertrag
//! Beim Verbindungsende laeuft die Session-Bereinigung synchron im
//! selben Task: Sprechrecht entziehen, Kanal verlassen, Session trennen.

use futures_util::{SinkExt, StreamExt};
use funkraum_protocol::events::{ErrorCode, FunkMessage, FunkPayload};
use funkraum_protocol::wire::FrameCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use crate::dispatcher::{FunkDispatcher, VerbindungsKontext};
use crate::server_state::{FunkState, FunkStore};

/// Verarbeitet eine einzelne TCP-Verbindung
///
/// Liest Frames via `FrameCodec`, dispatcht an `FunkDispatcher` und
/// sendet Antworten zurueck. Laeuft in einem eigenen tokio-Task.
pub struct ClientConnection<D: FunkStore> {
    state: Arc<FunkState<D>>,
    peer_addr: SocketAddr,
}

impl<D: FunkStore> ClientConnection<D> {
    /// Erstellt eine neue ClientConnection
    pub fn neu(state: Arc<FunkState<D>>, peer_addr: SocketAddr) -> Self {
        Self { state, peer_addr }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Diese Methode laeuft bis die Verbindung getrennt wird oder ein
    /// Shutdown-Signal eingeht.
    pub async fn verarbeiten(
        self,
        stream: TcpStream,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let peer_addr = self.peer_addr;
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek);
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);

        tracing::info!(peer = %peer_addr, "Neue Verbindung");

        let mut framed = Framed::new(stream, FrameCodec::new());

        // Ausgehende Nachrichten-Queue (Broadcaster -> TCP)
        let (sende_tx, mut sende_rx) = mpsc::channel::<FunkMessage>(64);

        let mut ctx = VerbindungsKontext {
            peer_addr,
            session_id: None,
            user_id: None,
        };
        let dispatcher = FunkDispatcher::neu(Arc::clone(&self.state));

        let mut letzter_empfang = Instant::now();
        let mut naechster_ping = Instant::now() + keepalive_intervall;
        let mut ping_request_id: u32 = 0;

        loop {
            let jetzt = Instant::now();

            if jetzt.duration_since(letzter_empfang) > timeout_dauer {
                tracing::warn!(peer = %peer_addr, "Verbindungs-Timeout");
                break;
            }

            let ping_verzoegerung = if jetzt < naechster_ping {
                naechster_ping.duration_since(jetzt)
            } else {
                Duration::from_millis(1)
            };

            tokio::select! {
                // Eingehende Nachricht vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(nachricht)) => {
                            letzter_empfang = Instant::now();
                            tracing::trace!(
                                peer = %peer_addr,
                                request_id = nachricht.request_id,
                                "Nachricht empfangen"
                            );

                            let hatte_session = ctx.session_id.is_some();

                            if let Some(antwort) = dispatcher.dispatch(nachricht, &mut ctx).await {
                                if let Err(e) = framed.send(antwort).await {
                                    tracing::warn!(peer = %peer_addr, fehler = %e, "Senden fehlgeschlagen");
                                    break;
                                }
                            }

                            // Nach erfolgreichem Verbinden: Broadcaster-Queue
                            // abonnieren und in die Sende-Queue pumpen
                            if !hatte_session {
                                if let Some(sid) = ctx.session_id {
                                    let mut empfangs_queue =
                                        self.state.broadcaster.client_registrieren(sid);
                                    let sende_tx = sende_tx.clone();
                                    tokio::task::spawn_local(async move {
                                        while let Some(msg) = empfangs_queue.recv().await {
                                            if sende_tx.send(msg).await.is_err() {
                                                break;
                                            }
                                        }
                                    });
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer_addr, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Ausgehende Nachricht aus dem Broadcaster
                Some(ausgehend) = sende_rx.recv() => {
                    if let Err(e) = framed.send(ausgehend).await {
                        tracing::warn!(peer = %peer_addr, fehler = %e, "Broadcast-Senden fehlgeschlagen");
                        break;
                    }
                }

                // Keepalive-Ping
                _ = tokio::time::sleep(ping_verzoegerung) => {
                    if jetzt >= naechster_ping {
                        ping_request_id = ping_request_id.wrapping_add(1);
                        let ts = chrono::Utc::now().timestamp_millis() as u64;
                        let ping = FunkMessage::new(
                            ping_request_id,
                            FunkPayload::Ping { timestamp_ms: ts },
                        );

                        if let Err(e) = framed.send(ping).await {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Ping-Senden fehlgeschlagen");
                            break;
                        }
                        naechster_ping = Instant::now() + keepalive_intervall;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer_addr, "Shutdown-Signal – Verbindung wird getrennt");
                        let abschied = FunkMessage::fehler(
                            0,
                            ErrorCode::Unavailable,
                            "Server wird heruntergefahren",
                        );
                        let _ = framed.send(abschied).await;
                        break;
                    }
                }
            }
        }

        // Aufraeumvertrag: synchron im selben Task, bevor er endet
        if let Some(sid) = ctx.session_id {
            dispatcher.session_aufraeumen(sid).await;
        }

        tracing::info!(peer = %peer_addr, "Verbindungs-Task beendet");
    }
}
