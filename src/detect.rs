//! Pick a file type for an upload: server hint, then file name, then headers.

use crate::mapping::normalize_header;
use crate::models::FileType;
use serde::Serialize;

/// Which signal decided the file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Server,
    FileName,
    Headers,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub file_type: FileType,
    pub source: DetectionSource,
}

/// File-name fragments in underscore form, most specific type first.
const FILE_NAME_PATTERNS: &[(FileType, &[&str])] = &[
    (FileType::CreancesNgbss, &["creances_ngbss", "creances", "creance", "ngbss"]),
    (FileType::ParcCorporate, &["parc_corporate", "corporate"]),
    (FileType::JournalVentes, &["journal_ventes", "journal_des_ventes", "journal_vente"]),
    (FileType::EtatFacture, &["etat_facture", "etat_de_facture", "etat_des_factures"]),
    (FileType::FacturationManuelle, &["facturation_manuelle", "facture_manuelle"]),
    (FileType::CaNonPeriodique, &["ca_non_periodique", "non_periodique"]),
    (FileType::CaPeriodique, &["ca_periodique", "periodique"]),
    (FileType::CaDnt, &["ca_dnt", "dnt"]),
    (FileType::CaRfd, &["ca_rfd", "rfd"]),
    (FileType::CaCnt, &["ca_cnt", "cnt"]),
    (FileType::Invoice, &["invoice", "facture"]),
];

/// Fragments this short only count as a whole `_`-separated token.
const SHORT_FRAGMENT_LEN: usize = 3;

fn fragment_matches(pattern: &str, underscored: &str, compact: &str) -> bool {
    if pattern.len() <= SHORT_FRAGMENT_LEN {
        return underscored.split('_').any(|token| token == pattern);
    }
    underscored.contains(pattern) || compact.contains(&pattern.replace('_', ""))
}

/// Match a file name against the known fragments. Case, accents and
/// separators (`_`, `-`, space, or none at all) are ignored, except that
/// short fragments such as `dnt` must stand alone.
pub fn detect_from_file_name(file_name: &str) -> Option<FileType> {
    let stem = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let underscored = normalize_header(stem);
    let compact = underscored.replace('_', "");
    FILE_NAME_PATTERNS
        .iter()
        .find(|(_, patterns)| {
            patterns
                .iter()
                .any(|p| fragment_matches(p, &underscored, &compact))
        })
        .map(|(file_type, _)| *file_type)
}

/// Classify from column headers when neither the server nor the name helps.
pub fn detect_from_headers<S: AsRef<str>>(headers: &[S]) -> Option<FileType> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h.as_ref())).collect();
    let has = |name: &str| normalized.iter().any(|h| h == name);
    let has_part = |part: &str| {
        normalized
            .iter()
            .any(|h| h.split('_').any(|token| token == part))
    };

    if has_part("produit") && (has_part("ht") || has_part("ttc")) {
        return Some(FileType::CaPeriodique);
    }
    if has("creance_brut") || has("creance_net") || has("open_amt") {
        return Some(FileType::CreancesNgbss);
    }
    if has("customer_l1_code") || has("offer_name") {
        return Some(FileType::ParcCorporate);
    }
    if normalized
        .iter()
        .any(|h| h.contains("invoice") || h.contains("facture"))
    {
        return Some(FileType::Invoice);
    }
    None
}

/// Full detection chain. Never fails; `general` is the last resort.
pub fn detect_file_type<S: AsRef<str>>(
    server_hint: Option<&str>,
    file_name: Option<&str>,
    headers: &[S],
) -> Detection {
    if let Some(file_type) = server_hint.and_then(|h| h.parse::<FileType>().ok()) {
        return Detection {
            file_type,
            source: DetectionSource::Server,
        };
    }
    if let Some(file_type) = file_name.and_then(detect_from_file_name) {
        return Detection {
            file_type,
            source: DetectionSource::FileName,
        };
    }
    if let Some(file_type) = detect_from_headers(headers) {
        return Detection {
            file_type,
            source: DetectionSource::Headers,
        };
    }
    Detection {
        file_type: FileType::General,
        source: DetectionSource::Default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_HEADERS: &[&str] = &[];

    #[test]
    fn test_every_tag_detected_from_its_canonical_name() {
        for t in FileType::ALL {
            if t == FileType::General {
                continue;
            }
            let tag = t.as_str();
            for name in [
                format!("{}_2024.xlsx", tag),
                format!("Export {}.xlsx", tag.to_uppercase()),
                format!("{}.csv", tag.replace('_', "")),
                format!("/uploads/{}-janvier.xls", tag.replace('_', "-")),
            ] {
                assert_eq!(detect_from_file_name(&name), Some(t), "name {}", name);
            }
        }
    }

    #[test]
    fn test_accented_names() {
        assert_eq!(
            detect_from_file_name("Créances NGBSS Mars.xlsx"),
            Some(FileType::CreancesNgbss)
        );
        assert_eq!(
            detect_from_file_name("CA Non Périodique T1.xlsx"),
            Some(FileType::CaNonPeriodique)
        );
        assert_eq!(
            detect_from_file_name("État de Facture.xlsx"),
            Some(FileType::EtatFacture)
        );
    }

    #[test]
    fn test_short_fragments_need_their_own_token() {
        assert_eq!(detect_from_file_name("Surfdata_mars.xlsx"), None);
        assert_eq!(detect_from_file_name("accntlist.csv"), None);
        assert_eq!(detect_from_file_name("rapport dnt mars.xlsx"), Some(FileType::CaDnt));
        assert_eq!(detect_from_file_name("RFD-T2.xlsx"), Some(FileType::CaRfd));
        assert_eq!(detect_from_file_name("CA CNT 2024.xlsx"), Some(FileType::CaCnt));
    }

    #[test]
    fn test_server_hint_wins() {
        let d = detect_file_type(Some("journal_ventes"), Some("ca_periodique.xlsx"), NO_HEADERS);
        assert_eq!(d.file_type, FileType::JournalVentes);
        assert_eq!(d.source, DetectionSource::Server);
    }

    #[test]
    fn test_unknown_server_hint_falls_through() {
        let d = detect_file_type(Some("mystery"), Some("ca_rfd_q2.xlsx"), NO_HEADERS);
        assert_eq!(d.file_type, FileType::CaRfd);
        assert_eq!(d.source, DetectionSource::FileName);
    }

    #[test]
    fn test_headers_used_when_name_unknown() {
        let d = detect_file_type(None, Some("upload_17.xlsx"), &["DO", "PRODUIT", "HT", "TTC"]);
        assert_eq!(d.file_type, FileType::CaPeriodique);
        assert_eq!(d.source, DetectionSource::Headers);

        let d = detect_file_type(None, Some("upload_18.xlsx"), &["Numéro Facture", "Client"]);
        assert_eq!(d.file_type, FileType::Invoice);

        let d = detect_file_type(None, None, &["CREANCE_BRUT", "DOT"]);
        assert_eq!(d.file_type, FileType::CreancesNgbss);
    }

    #[test]
    fn test_defaults_to_general() {
        let d = detect_file_type(None, Some("upload_19.xlsx"), &["colonne_a", "colonne_b"]);
        assert_eq!(d.file_type, FileType::General);
        assert_eq!(d.source, DetectionSource::Default);
    }

    #[test]
    fn test_produit_without_amounts_is_not_revenue() {
        assert_eq!(detect_from_headers(&["PRODUIT", "QUANTITE"]), None);
    }
}
