//! Reconcile raw spreadsheet columns with backend field names.
//!
//! Mapping never fails: unknown columns pass through, unparsable values stay
//! as the strings they came in as.

mod fields;
mod tables;

pub use fields::{
    parse_amount, AdjustmentFields, CorporateParkFields, InvoiceFields, InvoiceStatusFields,
    ManualBillingFields, ReceivableFields, ResolvedFields, RevenueFields, SalesJournalFields,
};
pub use tables::field_mapping;

use crate::models::FileType;
use serde::Serialize;
use serde_json::{Map, Value};

/// Fold the French accents seen in headers and file names to ASCII.
pub fn fold_accents(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'à' | 'â' | 'ä' | 'á' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' | 'í' => 'i',
            'ô' | 'ö' | 'ó' => 'o',
            'ù' | 'û' | 'ü' | 'ú' => 'u',
            'ç' => 'c',
            'À' | 'Â' | 'Ä' | 'Á' => 'A',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'Î' | 'Ï' | 'Í' => 'I',
            'Ô' | 'Ö' | 'Ó' => 'O',
            'Ù' | 'Û' | 'Ü' | 'Ú' => 'U',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

/// Lower-case, accent-free, with every run of non-alphanumerics collapsed to `_`.
/// `"N° Facture"` and `"n_facture"` normalize to the same key.
pub fn normalize_header(s: &str) -> String {
    let folded = fold_accents(s.trim()).to_lowercase();
    let mut out = String::with_capacity(folded.len());
    let mut pending_sep = false;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Display text for a cell: `"N/A"` for null, plain text otherwise.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "N/A".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// One preview row after mapping. Built once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedRow {
    /// Synthetic position used for list rendering.
    pub id: usize,
    pub file_type: FileType,
    pub raw: Map<String, Value>,
    /// Backend field key -> value.
    pub mapped: Map<String, Value>,
    /// Raw header that fed each backend key.
    pub sources: Vec<(String, String)>,
    pub fields: ResolvedFields,
}

impl MappedRow {
    /// Raw keys plus mapped keys in one record, so a table can read either spelling.
    pub fn display_row(&self) -> Map<String, Value> {
        let mut out = self.raw.clone();
        for (key, value) in &self.mapped {
            if !out.contains_key(key) {
                out.insert(key.clone(), value.clone());
            }
        }
        if !out.contains_key("id") {
            out.insert("id".to_string(), Value::from(self.id as u64));
        }
        out
    }

    /// Look up by backend key first, then by raw header.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.mapped.get(key).or_else(|| self.raw.get(key))
    }

    /// Cell text for a column; empty string when the row does not have it.
    pub fn cell(&self, key: &str) -> String {
        self.get(key).map(display_value).unwrap_or_default()
    }

    /// Raw columns that no mapping entry consumed.
    pub fn extra_columns(&self) -> impl Iterator<Item = &String> {
        self.raw.keys().filter(move |k| {
            !self.sources.iter().any(|(raw, _)| raw == *k) && !self.mapped.contains_key(k.as_str())
        })
    }
}

/// A file type's mapping table with any user overrides layered on top.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    file_type: FileType,
    entries: Vec<(String, String)>,
}

impl FieldMapper {
    pub fn new(file_type: FileType) -> Self {
        let entries = field_mapping(file_type)
            .iter()
            .map(|(raw, key)| (raw.to_string(), key.to_string()))
            .collect();
        Self { file_type, entries }
    }

    /// Overrides are tried before the built-in entries.
    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut merged: Vec<(String, String)> = overrides.into_iter().collect();
        merged.append(&mut self.entries);
        self.entries = merged;
        self
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Backend keys in table order, without duplicates.
    pub fn field_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (_, key) in &self.entries {
            if !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }
        keys
    }

    /// Raw header -> backend key, as sent with a save request.
    pub fn as_json(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for (raw, key) in &self.entries {
            if !out.contains_key(raw) {
                out.insert(raw.clone(), Value::String(key.clone()));
            }
        }
        out
    }

    pub fn map_row(&self, id: usize, raw: &Map<String, Value>) -> MappedRow {
        let normalized: Vec<(String, &String)> =
            raw.keys().map(|k| (normalize_header(k), k)).collect();
        let find_normalized = |target: &str| {
            normalized
                .iter()
                .find(|(norm, _)| norm == target)
                .map(|(_, original)| *original)
        };

        let mut mapped = Map::new();
        let mut sources = Vec::new();
        for (raw_key, key) in &self.entries {
            if mapped.contains_key(key) {
                continue;
            }
            let source = if raw.contains_key(raw_key) {
                Some(raw_key)
            } else {
                find_normalized(normalize_header(raw_key).as_str())
            };
            if let Some(source) = source {
                mapped.insert(key.clone(), raw[source].clone());
                sources.push((source.clone(), key.clone()));
            }
        }

        // Fallback: well-known aliases, and columns already named after the backend key.
        let keys = self.field_keys();
        for key in keys {
            if mapped.contains_key(key) {
                continue;
            }
            let alias_source = tables::ALIASES
                .iter()
                .filter(|(_, k)| *k == key)
                .find_map(|(alias, _)| find_normalized(*alias))
                .or_else(|| find_normalized(key));
            if let Some(source) = alias_source {
                mapped.insert(key.to_string(), raw[source].clone());
                sources.push((source.clone(), key.to_string()));
            }
        }

        let fields = ResolvedFields::resolve(self.file_type, &mapped);
        MappedRow {
            id,
            file_type: self.file_type,
            raw: raw.clone(),
            mapped,
            sources,
            fields,
        }
    }

    pub fn map_rows(&self, rows: &[Map<String, Value>]) -> Vec<MappedRow> {
        rows.iter()
            .enumerate()
            .map(|(i, row)| self.map_row(i + 1, row))
            .collect()
    }

    /// Table columns: mapped keys present in any row (table order), then unmapped raw columns.
    pub fn table_columns(&self, rows: &[MappedRow]) -> Vec<String> {
        let mut columns: Vec<String> = self
            .field_keys()
            .into_iter()
            .filter(|key| rows.iter().any(|r| r.mapped.contains_key(*key)))
            .map(String::from)
            .collect();
        for row in rows {
            for extra in row.extra_columns() {
                if !columns.contains(extra) {
                    columns.push(extra.clone());
                }
            }
        }
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("N° Facture"), "n_facture");
        assert_eq!(normalize_header("  Créances__NGBSS "), "creances_ngbss");
        assert_eq!(normalize_header("% TVA"), "tva");
        assert_eq!(normalize_header("Montant-TTC"), "montant_ttc");
    }

    #[test]
    fn test_ca_periodique_row_keeps_original_keys() {
        let mapper = FieldMapper::new(FileType::CaPeriodique);
        let mapped = mapper.map_row(
            1,
            &row(json!({"DO": "Alger", "PRODUIT": "X", "HT": 100, "TAX": 19, "TTC": 119, "DISCOUNT": 0})),
        );
        assert_eq!(mapped.mapped["dot"], "Alger");
        assert_eq!(mapped.mapped["product"], "X");
        assert_eq!(mapped.mapped["amount_pre_tax"], 100);
        assert_eq!(mapped.mapped["tax_amount"], 19);
        assert_eq!(mapped.mapped["total_amount"], 119);
        assert_eq!(mapped.mapped["discount"], 0);

        let display = mapped.display_row();
        for key in ["DO", "PRODUIT", "HT", "TAX", "TTC", "DISCOUNT", "dot", "total_amount", "id"] {
            assert!(display.contains_key(key), "missing {}", key);
        }
        assert_eq!(display["DO"], display["dot"]);
    }

    #[test]
    fn test_header_spelling_is_normalized() {
        let mapper = FieldMapper::new(FileType::FacturationManuelle);
        let mapped = mapper.map_row(1, &row(json!({"n° facture ": "F-12", "Montant_TTC": "1 190,00"})));
        assert_eq!(mapped.mapped["invoice_number"], "F-12");
        let ResolvedFields::ManualBilling(f) = &mapped.fields else {
            panic!("expected manual billing");
        };
        assert_eq!(f.total_amount, Some(1190.0));
    }

    #[test]
    fn test_alias_fills_missing_header() {
        let mapper = FieldMapper::new(FileType::CaPeriodique);
        let mapped = mapper.map_row(1, &row(json!({"DOT": "Oran", "Product": "ADSL", "TTC": 10})));
        assert_eq!(mapped.mapped["dot"], "Oran");
        assert_eq!(mapped.mapped["product"], "ADSL");
        assert!(mapped.sources.contains(&("DOT".to_string(), "dot".to_string())));
    }

    #[test]
    fn test_unknown_columns_pass_through_as_extra_columns() {
        let mapper = FieldMapper::new(FileType::CaPeriodique);
        let rows = mapper.map_rows(&[
            row(json!({"DO": "Alger", "TTC": 119, "Commentaire": "ok"})),
            row(json!({"DO": "Oran", "Zone": "Ouest"})),
        ]);
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[1].id, 2);
        let columns = mapper.table_columns(&rows);
        assert_eq!(columns, vec!["dot", "total_amount", "Commentaire", "Zone"]);
        assert_eq!(rows[1].cell("Zone"), "Ouest");
        assert_eq!(rows[1].cell("total_amount"), "");
    }

    #[test]
    fn test_null_values_display_as_na() {
        let mapper = FieldMapper::new(FileType::Invoice);
        let mapped = mapper.map_row(1, &row(json!({"Client": null})));
        assert_eq!(mapped.cell("client"), "N/A");
    }

    #[test]
    fn test_general_passes_everything_through() {
        let mapper = FieldMapper::new(FileType::General);
        let mapped = mapper.map_row(3, &row(json!({"a": 1, "b": "x"})));
        assert!(mapped.mapped.is_empty());
        assert_eq!(mapped.fields, ResolvedFields::General);
        assert_eq!(mapped.extra_columns().count(), 2);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mapper = FieldMapper::new(FileType::CaPeriodique)
            .with_overrides(vec![("Wilaya".to_string(), "dot".to_string())]);
        let mapped = mapper.map_row(1, &row(json!({"Wilaya": "Blida", "DO": "Alger"})));
        assert_eq!(mapped.mapped["dot"], "Blida");
        assert_eq!(mapper.as_json()["Wilaya"], "dot");
        assert_eq!(mapper.as_json()["DO"], "dot");
    }
}
