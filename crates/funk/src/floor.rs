//! Floor-Arbiter – Sprechrecht pro Kanal
//!
//! Pro Kanal eine Zustandsmaschine Idle -> Belegt(SessionId) -> Idle.
//! Pro Kanal ist hoechstens eine Session Inhaber; es gibt keine
//! Warteschlange und keinen zeitbasierten Verfall. Das Sprechrecht endet
//! nur durch Freigabe, Trennung oder Sanktion.
//!
//! Uebergaenge sind pro Kanal serialisiert (DashMap Entry-Lock),
//! verschiedene Kanaele laufen vollstaendig parallel. Die Locks schuetzen
//! nur den Zustandsuebergang; Broadcasts an Mitglieder erfolgen danach
//! beim Aufrufer.

use dashmap::DashMap;
use funkraum_core::types::{ChannelId, SessionId};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Entscheidungstypen
// ---------------------------------------------------------------------------

/// Grund fuer ein abgelehntes Sprechrecht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AblehnungsGrund {
    /// Eine andere Session sendet bereits
    BereitsBelegt,
    /// Die Session darf aktuell nicht sprechen (Sanktion/Berechtigung)
    NichtSprechberechtigt,
}

/// Ergebnis eines Belegungsversuchs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloorEntscheid {
    Gewaehrt,
    Abgelehnt(AblehnungsGrund),
}

/// Fehler bei der Freigabe
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FloorFehler {
    /// Die Session haelt das Sprechrecht dieses Kanals nicht
    #[error("Session haelt das Sprechrecht nicht")]
    NichtInhaber,
}

/// Aktueller Inhaber eines Kanals
#[derive(Debug, Clone, Copy)]
struct Belegung {
    inhaber: SessionId,
    seit: Instant,
}

// ---------------------------------------------------------------------------
// FloorArbiter
// ---------------------------------------------------------------------------

/// Arbiter fuer das Sprechrecht aller Kanaele
#[derive(Clone)]
pub struct FloorArbiter {
    inner: Arc<FloorArbiterInner>,
}

struct FloorArbiterInner {
    /// Belegte Kanaele; fehlender Eintrag bedeutet Idle
    belegungen: DashMap<ChannelId, Belegung>,
}

impl FloorArbiter {
    /// Erstellt einen neuen Arbiter (alle Kanaele Idle)
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(FloorArbiterInner {
                belegungen: DashMap::new(),
            }),
        }
    }

    /// Versucht das Sprechrecht eines Kanals zu belegen
    ///
    /// `sprech_erlaubnis` ist die Gate-Entscheidung des Aufrufers; bei
    /// `false` wird ohne Zustandsaenderung abgelehnt. Der Uebergang
    /// Idle -> Belegt gelingt nur wenn der Kanal Idle ist; ein erneuter
    /// Versuch des aktuellen Inhabers wird ebenfalls abgelehnt.
    pub fn belegen(
        &self,
        kanal: ChannelId,
        session: SessionId,
        sprech_erlaubnis: bool,
    ) -> FloorEntscheid {
        if !sprech_erlaubnis {
            return FloorEntscheid::Abgelehnt(AblehnungsGrund::NichtSprechberechtigt);
        }

        match self.inner.belegungen.entry(kanal) {
            dashmap::mapref::entry::Entry::Vacant(leer) => {
                leer.insert(Belegung {
                    inhaber: session,
                    seit: Instant::now(),
                });
                tracing::debug!(kanal = %kanal, session_id = %session, "Sprechrecht gewaehrt");
                FloorEntscheid::Gewaehrt
            }
            dashmap::mapref::entry::Entry::Occupied(_) => {
                FloorEntscheid::Abgelehnt(AblehnungsGrund::BereitsBelegt)
            }
        }
    }

    /// Gibt das Sprechrecht eines Kanals frei
    ///
    /// Nur der aktuelle Inhaber darf freigeben; alles andere ist ein
    /// Aufruferfehler und kommt als `NichtInhaber` zurueck.
    pub fn freigeben(&self, kanal: ChannelId, session: SessionId) -> Result<(), FloorFehler> {
        match self
            .inner
            .belegungen
            .remove_if(&kanal, |_, belegung| belegung.inhaber == session)
        {
            Some(_) => {
                tracing::debug!(kanal = %kanal, session_id = %session, "Sprechrecht freigegeben");
                Ok(())
            }
            None => Err(FloorFehler::NichtInhaber),
        }
    }

    /// Entzieht das Sprechrecht eines Kanals bedingungslos
    ///
    /// Rueckgabe ist der bisherige Inhaber, damit der Aufrufer das Ende
    /// der Uebertragung an die Mitglieder melden kann.
    pub fn zwangsfreigabe(&self, kanal: ChannelId) -> Option<SessionId> {
        let (_, belegung) = self.inner.belegungen.remove(&kanal)?;
        tracing::info!(kanal = %kanal, session_id = %belegung.inhaber, "Sprechrecht entzogen");
        Some(belegung.inhaber)
    }

    /// Entzieht einer Session das Sprechrecht in allen Kanaelen
    ///
    /// Sweep fuer den Trennungs- und Sanktionspfad; gibt die betroffenen
    /// Kanaele zurueck.
    pub fn freigeben_fuer_session(&self, session: SessionId) -> Vec<ChannelId> {
        let gehalten: Vec<ChannelId> = self
            .inner
            .belegungen
            .iter()
            .filter(|eintrag| eintrag.value().inhaber == session)
            .map(|eintrag| *eintrag.key())
            .collect();

        gehalten
            .into_iter()
            .filter(|kanal| {
                self.inner
                    .belegungen
                    .remove_if(kanal, |_, belegung| belegung.inhaber == session)
                    .is_some()
            })
            .collect()
    }

    /// Aktueller Inhaber eines Kanals (None wenn Idle)
    pub fn inhaber(&self, kanal: &ChannelId) -> Option<SessionId> {
        self.inner.belegungen.get(kanal).map(|b| b.inhaber)
    }

    /// Seit wann der Kanal belegt ist (None wenn Idle)
    pub fn belegt_seit(&self, kanal: &ChannelId) -> Option<Instant> {
        self.inner.belegungen.get(kanal).map(|b| b.seit)
    }
}

impl Default for FloorArbiter {
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
    fn idle_kanal_wird_gewaehrt() {
        let arbiter = FloorArbiter::neu();
        let kanal = ChannelId::new();
        let session = SessionId::new();

        assert_eq!(arbiter.belegen(kanal, session, true), FloorEntscheid::Gewaehrt);
        assert_eq!(arbiter.inhaber(&kanal), Some(session));
        assert!(arbiter.belegt_seit(&kanal).is_some());
    }

    #[test]
    fn belegter_kanal_lehnt_ab() {
        let arbiter = FloorArbiter::neu();
        let kanal = ChannelId::new();
        let erste = SessionId::new();
        let zweite = SessionId::new();

        assert_eq!(arbiter.belegen(kanal, erste, true), FloorEntscheid::Gewaehrt);
        assert_eq!(
            arbiter.belegen(kanal, zweite, true),
            FloorEntscheid::Abgelehnt(AblehnungsGrund::BereitsBelegt)
        );
        // Inhaber unveraendert
        assert_eq!(arbiter.inhaber(&kanal), Some(erste));
    }

    #[test]
    fn ohne_sprech_erlaubnis_keine_zustandsaenderung() {
        let arbiter = FloorArbiter::neu();
        let kanal = ChannelId::new();

        assert_eq!(
            arbiter.belegen(kanal, SessionId::new(), false),
            FloorEntscheid::Abgelehnt(AblehnungsGrund::NichtSprechberechtigt)
        );
        assert_eq!(arbiter.inhaber(&kanal), None);
    }

    #[test]
    fn freigabe_nur_durch_inhaber() {
        let arbiter = FloorArbiter::neu();
        let kanal = ChannelId::new();
        let inhaber = SessionId::new();
        let fremd = SessionId::new();

        arbiter.belegen(kanal, inhaber, true);
        assert_eq!(arbiter.freigeben(kanal, fremd), Err(FloorFehler::NichtInhaber));
        assert_eq!(arbiter.inhaber(&kanal), Some(inhaber));

        assert_eq!(arbiter.freigeben(kanal, inhaber), Ok(()));
        assert_eq!(arbiter.inhaber(&kanal), None);

        // Freigabe eines Idle-Kanals ist ebenfalls ein Fehler
        assert_eq!(arbiter.freigeben(kanal, inhaber), Err(FloorFehler::NichtInhaber));
    }

    #[test]
    fn zwangsfreigabe_nennt_bisherigen_inhaber() {
        let arbiter = FloorArbiter::neu();
        let kanal = ChannelId::new();
        let inhaber = SessionId::new();

        assert_eq!(arbiter.zwangsfreigabe(kanal), None);

        arbiter.belegen(kanal, inhaber, true);
        assert_eq!(arbiter.zwangsfreigabe(kanal), Some(inhaber));
        assert_eq!(arbiter.inhaber(&kanal), None);
    }

    #[test]
    fn sweep_entzieht_alle_kanaele_einer_session() {
        let arbiter = FloorArbiter::neu();
        let session = SessionId::new();
        let kanal_a = ChannelId::new();
        let kanal_b = ChannelId::new();
        let kanal_c = ChannelId::new();
        let andere = SessionId::new();

        arbiter.belegen(kanal_a, session, true);
        arbiter.belegen(kanal_b, session, true);
        arbiter.belegen(kanal_c, andere, true);

        let mut betroffen = arbiter.freigeben_fuer_session(session);
        betroffen.sort_by_key(|k| k.to_string());
        let mut erwartet = vec![kanal_a, kanal_b];
        erwartet.sort_by_key(|k| k.to_string());
        assert_eq!(betroffen, erwartet);

        assert_eq!(arbiter.inhaber(&kanal_a), None);
        assert_eq!(arbiter.inhaber(&kanal_c), Some(andere));
    }

    #[tokio::test]
    async fn konkurrierende_belegung_gewaehrt_genau_einmal() {
        let arbiter = FloorArbiter::neu();
        let kanal = ChannelId::new();

        let mut aufgaben = tokio::task::JoinSet::new();
        for _ in 0..32 {
            let arbiter = arbiter.clone();
            aufgaben.spawn(async move {
                arbiter.belegen(kanal, SessionId::new(), true)
            });
        }

        let mut gewaehrt = 0;
        while let Some(ergebnis) = aufgaben.join_next().await {
            if ergebnis.unwrap() == FloorEntscheid::Gewaehrt {
                gewaehrt += 1;
            }
        }
        assert_eq!(gewaehrt, 1);
        assert!(arbiter.inhaber(&kanal).is_some());
    }
}
