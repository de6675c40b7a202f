use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Spreadsheet families the back office knows how to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    CaPeriodique,
    CaNonPeriodique,
    CaDnt,
    CaRfd,
    CaCnt,
    FacturationManuelle,
    JournalVentes,
    EtatFacture,
    ParcCorporate,
    CreancesNgbss,
    Invoice,
    General,
}

impl FileType {
    pub const ALL: [FileType; 12] = [
        FileType::CaPeriodique,
        FileType::CaNonPeriodique,
        FileType::CaDnt,
        FileType::CaRfd,
        FileType::CaCnt,
        FileType::FacturationManuelle,
        FileType::JournalVentes,
        FileType::EtatFacture,
        FileType::ParcCorporate,
        FileType::CreancesNgbss,
        FileType::Invoice,
        FileType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::CaPeriodique => "ca_periodique",
            FileType::CaNonPeriodique => "ca_non_periodique",
            FileType::CaDnt => "ca_dnt",
            FileType::CaRfd => "ca_rfd",
            FileType::CaCnt => "ca_cnt",
            FileType::FacturationManuelle => "facturation_manuelle",
            FileType::JournalVentes => "journal_ventes",
            FileType::EtatFacture => "etat_facture",
            FileType::ParcCorporate => "parc_corporate",
            FileType::CreancesNgbss => "creances_ngbss",
            FileType::Invoice => "invoice",
            FileType::General => "general",
        }
    }

    /// Human label used in tables and notifications.
    pub fn label(&self) -> &'static str {
        match self {
            FileType::CaPeriodique => "CA Périodique",
            FileType::CaNonPeriodique => "CA Non Périodique",
            FileType::CaDnt => "CA DNT",
            FileType::CaRfd => "CA RFD",
            FileType::CaCnt => "CA CNT",
            FileType::FacturationManuelle => "Facturation Manuelle",
            FileType::JournalVentes => "Journal des Ventes",
            FileType::EtatFacture => "État de Facture",
            FileType::ParcCorporate => "Parc Corporate",
            FileType::CreancesNgbss => "Créances NGBSS",
            FileType::Invoice => "Invoice",
            FileType::General => "General",
        }
    }

    /// Path segment of the per-type listing endpoint under `/data/`.
    /// `None` for types the backend does not store in a dedicated table.
    pub fn records_endpoint(&self) -> Option<&'static str> {
        match self {
            FileType::CaPeriodique => Some("ca-periodique"),
            FileType::CaNonPeriodique => Some("ca-non-periodique"),
            FileType::CaDnt => Some("ca-dnt"),
            FileType::CaRfd => Some("ca-rfd"),
            FileType::CaCnt => Some("ca-cnt"),
            FileType::FacturationManuelle => Some("facturation-manuelle"),
            FileType::JournalVentes => Some("journal-ventes"),
            FileType::EtatFacture => Some("etat-facture"),
            FileType::ParcCorporate => Some("parc-corporate"),
            FileType::CreancesNgbss => Some("creances-ngbss"),
            FileType::Invoice | FileType::General => None,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = String;

    /// Accepts the snake_case tag as well as hyphenated or upper-case spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase().replace(['-', ' '], "_");
        FileType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == tag)
            .ok_or_else(|| format!("Unknown file type: {}", s))
    }
}
