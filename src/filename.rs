//! File names for downloads: server-provided where possible, synthesized otherwise.

use crate::models::ExportFormat;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

const KNOWN_EXTENSIONS: &[&str] = &["xlsx", "xls", "csv", "pdf", "txt", "zip", "json"];

fn timestamp_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "_t=12345", "-1700000000" or "_1700000000000" right before the extension.
    RE.get_or_init(|| {
        Regex::new(r"^(?P<stem>.+?)[_-](?:t=\d+|\d{10}|\d{13})(?P<ext>\.[A-Za-z0-9]+)?$")
            .expect("static regex")
    })
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => (&name[..pos], Some(&name[pos + 1..])),
        _ => (name, None),
    }
}

/// Strip path, query string, fragment, timestamp suffixes and doubled extensions.
/// Idempotent: `clean_file_name(clean_file_name(x)) == clean_file_name(x)`.
pub fn clean_file_name(raw: &str) -> String {
    let mut name = raw.trim();
    if let Some(pos) = name.find(['?', '#']) {
        name = &name[..pos];
    }
    let mut name = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    loop {
        let before = name.clone();

        if let Some(caps) = timestamp_suffix().captures(&name) {
            let stem = caps.name("stem").map(|m| m.as_str()).unwrap_or_default();
            let ext = caps.name("ext").map(|m| m.as_str()).unwrap_or_default();
            name = format!("{}{}", stem.trim_end(), ext);
        }

        let (stem, ext) = split_extension(&name);
        if let Some(ext) = ext {
            let (inner_stem, inner_ext) = split_extension(stem);
            if inner_ext.is_some_and(|inner| inner.eq_ignore_ascii_case(ext)) {
                name = format!("{}.{}", inner_stem, ext);
            }
        }

        if name == before {
            return name;
        }
    }
}

/// Extract the file name from a `Content-Disposition` header value.
/// `filename*=` (RFC 5987) is preferred over plain `filename=`.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let mut plain: Option<String> = None;
    for part in header.split(';') {
        let part = part.trim();
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if key == "filename*" {
            let encoded = value.rsplit("''").next().unwrap_or(value).trim_matches('"');
            if let Ok(decoded) = urlencoding::decode(encoded) {
                let decoded = decoded.trim().to_string();
                if !decoded.is_empty() {
                    return Some(decoded);
                }
            }
        } else if key == "filename" {
            let v = value.trim_matches('"').trim();
            if !v.is_empty() {
                plain = Some(v.to_string());
            }
        }
    }
    plain
}

/// Last path segment of a download URL, cleaned.
pub fn filename_from_url(url: &str) -> Option<String> {
    let name = clean_file_name(url);
    if name.is_empty() || !name.contains('.') {
        None
    } else {
        Some(name)
    }
}

/// Force the extension that matches the export format, replacing a known wrong one.
pub fn ensure_extension(name: &str, format: ExportFormat) -> String {
    let wanted = format.extension();
    let (stem, ext) = split_extension(name);
    match ext {
        Some(ext) if ext.eq_ignore_ascii_case(wanted) => name.to_string(),
        Some(ext) if KNOWN_EXTENSIONS.iter().any(|k| k.eq_ignore_ascii_case(ext)) => {
            format!("{}.{}", stem, wanted)
        }
        _ => format!("{}.{}", name, wanted),
    }
}

/// Name for a downloaded export: server name when given, else `{data_type}_{date}.{ext}`.
pub fn export_file_name(
    data_type: &str,
    format: ExportFormat,
    date: NaiveDate,
    content_disposition: Option<&str>,
) -> String {
    let from_server = content_disposition
        .and_then(filename_from_content_disposition)
        .map(|n| clean_file_name(&n))
        .filter(|n| !n.is_empty());
    match from_server {
        Some(name) => ensure_extension(&name, format),
        None => {
            let slug = crate::mapping::normalize_header(data_type);
            let slug = if slug.is_empty() { "export".to_string() } else { slug };
            format!("{}_{}.{}", slug, date.format("%Y-%m-%d"), format.extension())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_duplicate_extension_and_query() {
        assert_eq!(clean_file_name("report.xlsx.xlsx"), "report.xlsx");
        assert_eq!(clean_file_name("report.XLSX.xlsx.xlsx"), "report.xlsx");
        assert_eq!(clean_file_name("file.csv?_t=12345"), "file.csv");
        assert_eq!(clean_file_name("https://x/media/exports/a.pdf#page=2"), "a.pdf");
        assert_eq!(clean_file_name("journal_1700000000000.xlsx"), "journal.xlsx");
        assert_eq!(clean_file_name("data_t=99.csv"), "data.csv");
    }

    #[test]
    fn test_clean_is_idempotent() {
        for raw in [
            "report.xlsx.xlsx",
            "file.csv?_t=12345",
            "a_1700000000_1700000000.csv.csv",
            "  /tmp/x/ca_periodique.xlsx ",
            "plain",
            "",
            "2024_1700000000.xlsx",
            "report _1700000000",
            "ventes -1700000000.csv",
        ] {
            let once = clean_file_name(raw);
            assert_eq!(clean_file_name(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_space_before_timestamp_is_dropped() {
        assert_eq!(clean_file_name("report _1700000000"), "report");
        assert_eq!(clean_file_name("report"), "report");
    }

    #[test]
    fn test_keeps_business_numbers() {
        // Short numeric suffixes are part of the name, not timestamps.
        assert_eq!(clean_file_name("ca_dnt_2024.xlsx"), "ca_dnt_2024.xlsx");
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            filename_from_content_disposition("attachment; filename=\"ventes.xlsx\"").as_deref(),
            Some("ventes.xlsx")
        );
        assert_eq!(
            filename_from_content_disposition(
                "attachment; filename=\"fallback.xlsx\"; filename*=UTF-8''cr%C3%A9ances.xlsx"
            )
            .as_deref(),
            Some("créances.xlsx")
        );
        assert_eq!(filename_from_content_disposition("inline"), None);
    }

    #[test]
    fn test_export_file_name_policy() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(
            export_file_name("ca_periodique", ExportFormat::Excel, date, None),
            "ca_periodique_2024-03-05.xlsx"
        );
        assert_eq!(
            export_file_name(
                "ca_periodique",
                ExportFormat::Excel,
                date,
                Some("attachment; filename=\"export.xls\"")
            ),
            "export.xlsx"
        );
        assert_eq!(
            export_file_name("x", ExportFormat::Pdf, date, Some("attachment; filename=rapport")),
            "rapport.pdf"
        );
        assert_eq!(
            export_file_name("x", ExportFormat::Pdf, date, Some("attachment; filename=rapport.pdf")),
            "rapport.pdf"
        );
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://x/file.xlsx?sig=abc").as_deref(),
            Some("file.xlsx")
        );
        assert_eq!(filename_from_url("https://x/download/"), None);
    }
}
