use crate::models::FileType;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RevenueFields {
    pub dot: Option<String>,
    pub product: Option<String>,
    pub amount_pre_tax: Option<f64>,
    pub tax_amount: Option<f64>,
    pub total_amount: Option<f64>,
    pub discount: Option<f64>,
    pub sale_type: Option<String>,
    pub channel: Option<String>,
}

/// DNT / RFD / CNT transaction lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdjustmentFields {
    pub dot: Option<String>,
    pub customer_code: Option<String>,
    pub full_name: Option<String>,
    pub transaction_id: Option<String>,
    pub transaction_type: Option<String>,
    pub entry_date: Option<String>,
    pub department: Option<String>,
    pub amount_pre_tax: Option<f64>,
    pub tax_amount: Option<f64>,
    pub total_amount: Option<f64>,
    pub stamp_duty: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManualBillingFields {
    pub month: Option<String>,
    pub invoice_date: Option<String>,
    pub department: Option<String>,
    pub invoice_number: Option<String>,
    pub fiscal_year: Option<String>,
    pub client: Option<String>,
    pub amount_pre_tax: Option<f64>,
    pub vat_percentage: Option<f64>,
    pub vat_amount: Option<f64>,
    pub total_amount: Option<f64>,
    pub description: Option<String>,
    pub period: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SalesJournalFields {
    pub organization: Option<String>,
    pub origin: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_type: Option<String>,
    pub invoice_date: Option<String>,
    pub client: Option<String>,
    pub currency: Option<String>,
    pub invoice_object: Option<String>,
    pub account_code: Option<String>,
    pub gl_date: Option<String>,
    pub billing_period: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub revenue_amount: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvoiceStatusFields {
    pub organization: Option<String>,
    pub source: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_type: Option<String>,
    pub invoice_date: Option<String>,
    pub client: Option<String>,
    pub period: Option<String>,
    pub invoice_object: Option<String>,
    pub amount_pre_tax: Option<f64>,
    pub tax_amount: Option<f64>,
    pub total_amount: Option<f64>,
    pub revenue_amount: Option<f64>,
    pub collection_amount: Option<f64>,
    pub payment_date: Option<String>,
    pub credit_amount: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorporateParkFields {
    pub actel_code: Option<String>,
    pub customer_l1_code: Option<String>,
    pub customer_l1_desc: Option<String>,
    pub customer_l2_code: Option<String>,
    pub customer_l2_desc: Option<String>,
    pub customer_l3_code: Option<String>,
    pub customer_l3_desc: Option<String>,
    pub telecom_type: Option<String>,
    pub offer_type: Option<String>,
    pub offer_name: Option<String>,
    pub subscriber_status: Option<String>,
    pub creation_date: Option<String>,
    pub state: Option<String>,
    pub customer_full_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReceivableFields {
    pub dot: Option<String>,
    pub actel: Option<String>,
    pub month: Option<String>,
    pub year: Option<String>,
    pub subscriber_status: Option<String>,
    pub product: Option<String>,
    pub customer_lev1: Option<String>,
    pub customer_lev2: Option<String>,
    pub customer_lev3: Option<String>,
    pub invoice_amount: Option<f64>,
    pub open_amount: Option<f64>,
    pub tax_amount: Option<f64>,
    pub invoice_amount_ht: Option<f64>,
    pub dispute_amount: Option<f64>,
    pub gross_receivable: Option<f64>,
    pub net_receivable: Option<f64>,
    pub receivable_ht: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvoiceFields {
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub client: Option<String>,
    pub amount_pre_tax: Option<f64>,
    pub tax_amount: Option<f64>,
    pub total_amount: Option<f64>,
}

/// Typed view of a mapped row, one variant per spreadsheet family.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ResolvedFields {
    Revenue(RevenueFields),
    Adjustment(AdjustmentFields),
    ManualBilling(ManualBillingFields),
    SalesJournal(SalesJournalFields),
    InvoiceStatus(InvoiceStatusFields),
    CorporatePark(CorporateParkFields),
    Receivable(ReceivableFields),
    Invoice(InvoiceFields),
    General,
}

impl ResolvedFields {
    /// Read typed fields out of a row already keyed by backend field names.
    pub fn resolve(file_type: FileType, mapped: &Map<String, Value>) -> Self {
        let t = |key: &str| text(mapped, key);
        let a = |key: &str| amount(mapped, key);
        match file_type {
            FileType::CaPeriodique | FileType::CaNonPeriodique => {
                ResolvedFields::Revenue(RevenueFields {
                    dot: t("dot"),
                    product: t("product"),
                    amount_pre_tax: a("amount_pre_tax"),
                    tax_amount: a("tax_amount"),
                    total_amount: a("total_amount"),
                    discount: a("discount"),
                    sale_type: t("sale_type"),
                    channel: t("channel"),
                })
            }
            FileType::CaDnt | FileType::CaRfd | FileType::CaCnt => {
                ResolvedFields::Adjustment(AdjustmentFields {
                    dot: t("dot"),
                    customer_code: t("customer_code"),
                    full_name: t("full_name"),
                    transaction_id: t("transaction_id"),
                    transaction_type: t("transaction_type"),
                    entry_date: t("entry_date"),
                    department: t("department"),
                    amount_pre_tax: a("amount_pre_tax"),
                    tax_amount: a("tax_amount"),
                    total_amount: a("total_amount"),
                    stamp_duty: a("stamp_duty"),
                })
            }
            FileType::FacturationManuelle => ResolvedFields::ManualBilling(ManualBillingFields {
                month: t("month"),
                invoice_date: t("invoice_date"),
                department: t("department"),
                invoice_number: t("invoice_number"),
                fiscal_year: t("fiscal_year"),
                client: t("client"),
                amount_pre_tax: a("amount_pre_tax"),
                vat_percentage: a("vat_percentage"),
                vat_amount: a("vat_amount"),
                total_amount: a("total_amount"),
                description: t("description"),
                period: t("period"),
            }),
            FileType::JournalVentes => ResolvedFields::SalesJournal(SalesJournalFields {
                organization: t("organization"),
                origin: t("origin"),
                invoice_number: t("invoice_number"),
                invoice_type: t("invoice_type"),
                invoice_date: t("invoice_date"),
                client: t("client"),
                currency: t("currency"),
                invoice_object: t("invoice_object"),
                account_code: t("account_code"),
                gl_date: t("gl_date"),
                billing_period: t("billing_period"),
                reference: t("reference"),
                description: t("description"),
                revenue_amount: a("revenue_amount"),
            }),
            FileType::EtatFacture => ResolvedFields::InvoiceStatus(InvoiceStatusFields {
                organization: t("organization"),
                source: t("source"),
                invoice_number: t("invoice_number"),
                invoice_type: t("invoice_type"),
                invoice_date: t("invoice_date"),
                client: t("client"),
                period: t("period"),
                invoice_object: t("invoice_object"),
                amount_pre_tax: a("amount_pre_tax"),
                tax_amount: a("tax_amount"),
                total_amount: a("total_amount"),
                revenue_amount: a("revenue_amount"),
                collection_amount: a("collection_amount"),
                payment_date: t("payment_date"),
                credit_amount: a("credit_amount"),
            }),
            FileType::ParcCorporate => ResolvedFields::CorporatePark(CorporateParkFields {
                actel_code: t("actel_code"),
                customer_l1_code: t("customer_l1_code"),
                customer_l1_desc: t("customer_l1_desc"),
                customer_l2_code: t("customer_l2_code"),
                customer_l2_desc: t("customer_l2_desc"),
                customer_l3_code: t("customer_l3_code"),
                customer_l3_desc: t("customer_l3_desc"),
                telecom_type: t("telecom_type"),
                offer_type: t("offer_type"),
                offer_name: t("offer_name"),
                subscriber_status: t("subscriber_status"),
                creation_date: t("creation_date"),
                state: t("state"),
                customer_full_name: t("customer_full_name"),
            }),
            FileType::CreancesNgbss => ResolvedFields::Receivable(ReceivableFields {
                dot: t("dot"),
                actel: t("actel"),
                month: t("month"),
                year: t("year"),
                subscriber_status: t("subscriber_status"),
                product: t("product"),
                customer_lev1: t("customer_lev1"),
                customer_lev2: t("customer_lev2"),
                customer_lev3: t("customer_lev3"),
                invoice_amount: a("invoice_amount"),
                open_amount: a("open_amount"),
                tax_amount: a("tax_amount"),
                invoice_amount_ht: a("invoice_amount_ht"),
                dispute_amount: a("dispute_amount"),
                gross_receivable: a("gross_receivable"),
                net_receivable: a("net_receivable"),
                receivable_ht: a("receivable_ht"),
            }),
            FileType::Invoice => ResolvedFields::Invoice(InvoiceFields {
                invoice_number: t("invoice_number"),
                invoice_date: t("invoice_date"),
                client: t("client"),
                amount_pre_tax: a("amount_pre_tax"),
                tax_amount: a("tax_amount"),
                total_amount: a("total_amount"),
            }),
            FileType::General => ResolvedFields::General,
        }
    }

    /// The row's headline amount, used for preview totals.
    pub fn total_amount(&self) -> Option<f64> {
        match self {
            ResolvedFields::Revenue(f) => f.total_amount,
            ResolvedFields::Adjustment(f) => f.total_amount,
            ResolvedFields::ManualBilling(f) => f.total_amount,
            ResolvedFields::SalesJournal(f) => f.revenue_amount,
            ResolvedFields::InvoiceStatus(f) => f.total_amount,
            ResolvedFields::CorporatePark(_) => None,
            ResolvedFields::Receivable(f) => f.gross_receivable.or(f.invoice_amount),
            ResolvedFields::Invoice(f) => f.total_amount,
            ResolvedFields::General => None,
        }
    }

    pub fn dot(&self) -> Option<&str> {
        match self {
            ResolvedFields::Revenue(f) => f.dot.as_deref(),
            ResolvedFields::Adjustment(f) => f.dot.as_deref(),
            ResolvedFields::Receivable(f) => f.dot.as_deref(),
            _ => None,
        }
    }
}

fn text(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn amount(map: &Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key).and_then(parse_amount)
}

/// Numbers as spreadsheets export them: plain JSON numbers, `"1 234,56"`, `"1,234.56"`, `"-12.5 DA"`.
pub fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount_str(s),
        _ => None,
    }
}

fn parse_amount_str(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // 1.234,56
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        // 1,234.56
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => {
            // 1,234,567 (grouping) vs 12,5 (decimal)
            if cleaned.matches(',').count() > 1 {
                cleaned.replace(',', "")
            } else {
                cleaned.replace(',', ".")
            }
        }
        _ => cleaned,
    };
    normalized.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_amount_formats() {
        assert_eq!(parse_amount(&json!(100)), Some(100.0));
        assert_eq!(parse_amount(&json!("1 234,56")), Some(1234.56));
        assert_eq!(parse_amount(&json!("1.234,56")), Some(1234.56));
        assert_eq!(parse_amount(&json!("1,234.56")), Some(1234.56));
        assert_eq!(parse_amount(&json!("1,234,567")), Some(1234567.0));
        assert_eq!(parse_amount(&json!("-12,5 DA")), Some(-12.5));
        assert_eq!(parse_amount(&json!("N/A")), None);
        assert_eq!(parse_amount(&Value::Null), None);
    }

    #[test]
    fn test_resolve_revenue_row() {
        let mapped = json!({
            "dot": "Alger",
            "product": "X",
            "amount_pre_tax": 100,
            "tax_amount": "19",
            "total_amount": 119,
            "discount": 0
        });
        let fields = ResolvedFields::resolve(FileType::CaPeriodique, mapped.as_object().unwrap());
        match &fields {
            ResolvedFields::Revenue(r) => {
                assert_eq!(r.dot.as_deref(), Some("Alger"));
                assert_eq!(r.tax_amount, Some(19.0));
                assert_eq!(r.discount, Some(0.0));
                assert_eq!(r.channel, None);
            }
            other => panic!("unexpected family {:?}", other),
        }
        assert_eq!(fields.total_amount(), Some(119.0));
        assert_eq!(fields.dot(), Some("Alger"));
    }

    #[test]
    fn test_blank_text_is_missing() {
        let mapped = json!({"client": "   ", "invoice_number": 42});
        let fields = ResolvedFields::resolve(FileType::Invoice, mapped.as_object().unwrap());
        let ResolvedFields::Invoice(inv) = fields else {
            panic!("expected invoice family");
        };
        assert_eq!(inv.client, None);
        assert_eq!(inv.invoice_number.as_deref(), Some("42"));
    }
}
