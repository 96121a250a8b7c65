//! Moderations-Service – Oberflaeche fuer die externe Admin-Seite
//!
//! Verhaengt und hebt Sanktionen auf. Jede Aenderung invalidiert den
//! Gate-Cache des Ziels sofort und erzeugt einen Audit-Eintrag.
//! Audit-Fehler blockieren die Operation nicht; sie werden nur geloggt.

use std::sync::Arc;

use funkraum_core::types::SanctionId;
use funkraum_db::{
    AuditEintrag, AuditRepository, BerechtigungsRepository, NeueSanktion, SanktionsRecord,
    SanktionsRepository,
};

use crate::error::{ModerationsError, ModerationsResult};
use crate::gate::SanktionsGate;

/// Moderations-Service fuer Sanktionsverwaltung
pub struct SanktionsVerwaltung<D>
where
    D: SanktionsRepository + BerechtigungsRepository + AuditRepository,
{
    store: Arc<D>,
    gate: Arc<SanktionsGate<D>>,
}

impl<D> SanktionsVerwaltung<D>
where
    D: SanktionsRepository + BerechtigungsRepository + AuditRepository,
{
    pub fn neu(store: Arc<D>, gate: Arc<SanktionsGate<D>>) -> Arc<Self> {
        Arc::new(Self { store, gate })
    }

    /// Verhaengt eine neue Sanktion
    ///
    /// Die Sanktion ist ab Rueckkehr sofort wirksam: der Gate-Cache des
    /// Ziels ist invalidiert, bevor der Aufrufer weiterlaeuft.
    pub async fn verhaengen(
        &self,
        sanktion: NeueSanktion<'_>,
    ) -> ModerationsResult<SanktionsRecord> {
        let ziel = sanktion.ziel;
        let record = SanktionsRepository::erstellen(&*self.store, sanktion).await?;
        self.gate.cache_invalidieren(ziel);

        tracing::info!(
            sanktion_id = %record.id,
            ziel = %record.ziel,
            art = ?record.art,
            laeuft_ab_am = ?record.laeuft_ab_am,
            "Sanktion verhaengt"
        );

        self.audit_schreiben(AuditEintrag::neu(
            "sanktion_verhaengt",
            "moderation",
            record.ausgestellt_von,
            format!("{:?} gegen {} ({})", record.art, record.ziel, record.grund),
        ))
        .await;

        Ok(record)
    }

    /// Hebt eine Sanktion vorzeitig auf
    ///
    /// Idempotent gegenueber bereits abgelaufenen Sanktionen; eine
    /// unbekannte Id ergibt `NichtGefunden`.
    pub async fn aufheben(&self, id: SanctionId) -> ModerationsResult<SanktionsRecord> {
        let record = SanktionsRepository::laden(&*self.store, id)
            .await?
            .ok_or_else(|| ModerationsError::NichtGefunden(id.to_string()))?;

        SanktionsRepository::deaktivieren(&*self.store, id).await?;
        self.gate.cache_invalidieren(record.ziel);

        tracing::info!(
            sanktion_id = %id,
            ziel = %record.ziel,
            art = ?record.art,
            "Sanktion aufgehoben"
        );

        self.audit_schreiben(AuditEintrag::neu(
            "sanktion_aufgehoben",
            "moderation",
            None,
            format!("{:?} gegen {} aufgehoben", record.art, record.ziel),
        ))
        .await;

        Ok(record)
    }

    /// Listet alle Sanktionen eines Benutzers (auch inaktive)
    pub async fn fuer_benutzer(
        &self,
        ziel: funkraum_core::types::UserId,
    ) -> ModerationsResult<Vec<SanktionsRecord>> {
        Ok(SanktionsRepository::fuer_benutzer(&*self.store, ziel).await?)
    }

    /// Schreibt einen Audit-Eintrag; Fehler werden nur geloggt
    async fn audit_schreiben(&self, eintrag: AuditEintrag) {
        let aktion = eintrag.aktion.clone();
        if let Err(fehler) = AuditRepository::aufzeichnen(&*self.store, eintrag).await {
            tracing::warn!(aktion = %aktion, fehler = %fehler, "Audit-Eintrag fehlgeschlagen");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use funkraum_core::types::UserId;
    use funkraum_db::{MemoryStore, SanktionsArt};

    fn aufbau() -> (Arc<MemoryStore>, Arc<SanktionsVerwaltung<MemoryStore>>, Arc<SanktionsGate<MemoryStore>>) {
        let store = Arc::new(MemoryStore::neu());
        let gate = SanktionsGate::neu(Arc::clone(&store));
        let verwaltung = SanktionsVerwaltung::neu(Arc::clone(&store), Arc::clone(&gate));
        (store, verwaltung, gate)
    }

    #[tokio::test]
    async fn verhaengen_wirkt_sofort() {
        let (_store, verwaltung, gate) = aufbau();
        let uid = UserId::new();

        // Entscheidung vorab cachen
        assert!(gate.zugriff_pruefen(uid, None).await.erlaubt);

        verwaltung
            .verhaengen(NeueSanktion {
                ziel: uid,
                art: SanktionsArt::Bann,
                grund: "Stoerung",
                ausgestellt_von: None,
                laeuft_ab_am: None,
            })
            .await
            .unwrap();

        // Trotz vorherigem Cache-Eintrag muss der Bann sofort greifen
        assert!(!gate.zugriff_pruefen(uid, None).await.erlaubt);
    }

    #[tokio::test]
    async fn aufheben_wirkt_sofort() {
        let (_store, verwaltung, gate) = aufbau();
        let uid = UserId::new();

        let record = verwaltung
            .verhaengen(NeueSanktion {
                ziel: uid,
                art: SanktionsArt::Stummschaltung,
                grund: "Testlauf",
                ausgestellt_von: None,
                laeuft_ab_am: Some(Utc::now() + ChronoDuration::hours(1)),
            })
            .await
            .unwrap();

        assert!(!gate.darf_sprechen(uid).await);

        verwaltung.aufheben(record.id).await.unwrap();
        assert!(gate.darf_sprechen(uid).await);
    }

    #[tokio::test]
    async fn aufheben_unbekannter_id_ist_nicht_gefunden() {
        let (_store, verwaltung, _gate) = aufbau();

        let fehler = verwaltung.aufheben(SanctionId::new()).await.unwrap_err();
        assert!(matches!(fehler, ModerationsError::NichtGefunden(_)));
    }

    #[tokio::test]
    async fn verhaengen_schreibt_audit() {
        let (store, verwaltung, _gate) = aufbau();
        let uid = UserId::new();

        verwaltung
            .verhaengen(NeueSanktion {
                ziel: uid,
                art: SanktionsArt::Verwarnung,
                grund: "Hinweis",
                ausgestellt_von: Some(UserId::new()),
                laeuft_ab_am: None,
            })
            .await
            .unwrap();

        let eintraege = store.audit_eintraege();
        assert_eq!(eintraege.len(), 1);
        assert_eq!(eintraege[0].aktion, "sanktion_verhaengt");
        assert_eq!(eintraege[0].modul, "moderation");
    }

    #[tokio::test]
    async fn store_ausfall_beim_verhaengen_ist_fehler() {
        // Schreibpfade sind nicht Fail-Open: die Admin-Seite muss den
        // Ausfall sehen
        let (store, verwaltung, _gate) = aufbau();
        store.erreichbarkeit_setzen(false);

        let fehler = verwaltung
            .verhaengen(NeueSanktion {
                ziel: UserId::new(),
                art: SanktionsArt::Bann,
                grund: "x",
                ausgestellt_von: None,
                laeuft_ab_am: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(fehler, ModerationsError::Store(_)));
    }
}
