//! Setup-Vermittlung – opake Transport-Aushandlung zwischen zwei Sessions
//!
//! Reicht Verbindungs-Setup-Payloads (Offer/Answer/Kandidaten) zwischen
//! genau zwei Sessions weiter, ohne den Inhalt zu interpretieren. Ein
//! Austausch lebt nur bis beide Richtungen einmal vermittelt wurden oder
//! das Zeitlimit ablaeuft; halboffene Austausche raeumt ein Server-Sweep
//! ab.

use dashmap::DashMap;
use funkraum_core::types::SessionId;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Standard-Zeitlimit fuer halboffene Austausche
pub const STANDARD_SETUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Richtung einer Vermittlung innerhalb eines Austauschs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportRolle {
    /// Initiator des Austauschs (erste vermittelte Richtung)
    Anbieter,
    /// Gegenseite
    Empfaenger,
}

/// Laufender Austausch zwischen einem Session-Paar
#[derive(Debug)]
struct SetupAustausch {
    /// Session die den Austausch eroeffnet hat
    initiator: SessionId,
    begonnen: Instant,
    hin: bool,
    rueck: bool,
}

/// Vermittlung aller laufenden Setup-Austausche
///
/// Thread-safe via Arc + DashMap; Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct SetupVermittlung {
    inner: Arc<SetupVermittlungInner>,
}

struct SetupVermittlungInner {
    /// Austausche, indiziert nach geordnetem Session-Paar
    austausche: DashMap<(SessionId, SessionId), SetupAustausch>,
}

/// Geordneter Schluessel: dasselbe Paar ergibt denselben Eintrag,
/// egal aus welcher Richtung vermittelt wird
fn paar_schluessel(a: SessionId, b: SessionId) -> (SessionId, SessionId) {
    if a.0 <= b.0 {
        (a, b)
    } else {
        (b, a)
    }
}

impl SetupVermittlung {
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(SetupVermittlungInner {
                austausche: DashMap::new(),
            }),
        }
    }

    /// Registriert eine Vermittlung von `von` nach `zu`
    ///
    /// Gibt die Rolle des Senders zurueck. Sobald beide Richtungen einmal
    /// vermittelt wurden ist der Austausch vollstaendig und wird entfernt.
    pub fn vermitteln(&self, von: SessionId, zu: SessionId) -> TransportRolle {
        let schluessel = paar_schluessel(von, zu);

        let (rolle, vollstaendig) = {
            let mut eintrag = self
                .inner
                .austausche
                .entry(schluessel)
                .or_insert_with(|| SetupAustausch {
                    initiator: von,
                    begonnen: Instant::now(),
                    hin: false,
                    rueck: false,
                });

            let rolle = if eintrag.initiator == von {
                eintrag.hin = true;
                TransportRolle::Anbieter
            } else {
                eintrag.rueck = true;
                TransportRolle::Empfaenger
            };
            (rolle, eintrag.hin && eintrag.rueck)
        };

        if vollstaendig {
            self.inner.austausche.remove(&schluessel);
            tracing::debug!(von = %von, zu = %zu, "Setup-Austausch vollstaendig");
        }
        rolle
    }

    /// Entfernt alle Austausche einer getrennten Session
    pub fn session_entfernen(&self, session: &SessionId) -> usize {
        let vorher = self.inner.austausche.len();
        self.inner
            .austausche
            .retain(|(a, b), _| a != session && b != session);
        vorher - self.inner.austausche.len()
    }

    /// Entfernt halboffene Austausche aelter als `max_alter`
    ///
    /// Wird periodisch vom Server-Sweep aufgerufen; gibt die Anzahl der
    /// verworfenen Austausche zurueck.
    pub fn abgelaufene_entfernen(&self, max_alter: Duration) -> usize {
        let vorher = self.inner.austausche.len();
        self.inner
            .austausche
            .retain(|_, austausch| austausch.begonnen.elapsed() <= max_alter);
        let entfernt = vorher - self.inner.austausche.len();
        if entfernt > 0 {
            tracing::info!(entfernt, "Abgelaufene Setup-Austausche verworfen");
        }
        entfernt
    }

    /// Anzahl laufender Austausche
    pub fn anzahl(&self) -> usize {
        self.inner.austausche.len()
    }
}

impl Default for SetupVermittlung {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn austausch_beidseitig_wird_entfernt() {
        let vermittlung = SetupVermittlung::neu();
        let a = SessionId::new();
        let b = SessionId::new();

        assert_eq!(vermittlung.vermitteln(a, b), TransportRolle::Anbieter);
        assert_eq!(vermittlung.anzahl(), 1);

        assert_eq!(vermittlung.vermitteln(b, a), TransportRolle::Empfaenger);
        assert_eq!(vermittlung.anzahl(), 0);
    }

    #[test]
    fn wiederholte_vermittlung_gleicher_richtung_bleibt_offen() {
        let vermittlung = SetupVermittlung::neu();
        let a = SessionId::new();
        let b = SessionId::new();

        // Mehrere Kandidaten-Payloads in dieselbe Richtung
        vermittlung.vermitteln(a, b);
        vermittlung.vermitteln(a, b);
        assert_eq!(vermittlung.anzahl(), 1);
    }

    #[test]
    fn sweep_verwirft_nur_alte_austausche() {
        let vermittlung = SetupVermittlung::neu();
        let a = SessionId::new();
        let b = SessionId::new();
        vermittlung.vermitteln(a, b);

        assert_eq!(vermittlung.abgelaufene_entfernen(Duration::from_secs(30)), 0);
        assert_eq!(vermittlung.anzahl(), 1);

        assert_eq!(vermittlung.abgelaufene_entfernen(Duration::ZERO), 1);
        assert_eq!(vermittlung.anzahl(), 0);
    }

    #[test]
    fn trennung_raeumt_austausche_ab() {
        let vermittlung = SetupVermittlung::neu();
        let a = SessionId::new();
        let b = SessionId::new();
        let c = SessionId::new();

        vermittlung.vermitteln(a, b);
        vermittlung.vermitteln(c, a);
        vermittlung.vermitteln(b, c);
        assert_eq!(vermittlung.anzahl(), 3);

        assert_eq!(vermittlung.session_entfernen(&a), 2);
        assert_eq!(vermittlung.anzahl(), 1);
    }
}
