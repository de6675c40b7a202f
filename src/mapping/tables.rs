//! Raw spreadsheet header -> backend field key, one table per file type.
//! Several raw spellings may feed the same key; the first one present wins.

use crate::models::FileType;

const CA_PERIODIQUE: &[(&str, &str)] = &[
    ("DO", "dot"),
    ("PRODUIT", "product"),
    ("HT", "amount_pre_tax"),
    ("TAX", "tax_amount"),
    ("TTC", "total_amount"),
    ("DISCOUNT", "discount"),
];

const CA_NON_PERIODIQUE: &[(&str, &str)] = &[
    ("DO", "dot"),
    ("PRODUIT", "product"),
    ("HT", "amount_pre_tax"),
    ("TAX", "tax_amount"),
    ("TTC", "total_amount"),
    ("TYPE_VENTE", "sale_type"),
    ("CHANNEL", "channel"),
];

/// DNT, RFD and CNT extracts share the NGBSS transaction layout.
const CA_TRANSACTIONS: &[(&str, &str)] = &[
    ("PRI_IDENTITY", "pri_identity"),
    ("CUST_CODE", "customer_code"),
    ("FULL_NAME", "full_name"),
    ("TRANS_ID", "transaction_id"),
    ("TRANS_TYPE", "transaction_type"),
    ("CHANNEL_ID", "channel_id"),
    ("EXT_TRANS_TYPE", "ext_trans_type"),
    ("TTC", "total_amount"),
    ("TVA", "tax_amount"),
    ("HT", "amount_pre_tax"),
    ("ENTRY_DATE", "entry_date"),
    ("ACTEL", "actel_code"),
    ("DO", "dot"),
    ("DEPARTEMENT", "department"),
    ("DROIT_TIMBRE", "stamp_duty"),
    ("CUST_LEV1", "customer_lev1"),
    ("CUST_LEV2", "customer_lev2"),
    ("CUST_LEV3", "customer_lev3"),
];

const FACTURATION_MANUELLE: &[(&str, &str)] = &[
    ("MOIS", "month"),
    ("DATE FACT", "invoice_date"),
    ("DEPT", "department"),
    ("N° FACTURE", "invoice_number"),
    ("EXERCICES", "fiscal_year"),
    ("CLIENT", "client"),
    ("MONTANT HT", "amount_pre_tax"),
    ("% TVA", "vat_percentage"),
    ("MONTANT TVA", "vat_amount"),
    ("MONTANT TTC", "total_amount"),
    ("DESIGNATIONS", "description"),
    ("PERIODE", "period"),
];

const JOURNAL_VENTES: &[(&str, &str)] = &[
    ("Org Name", "organization"),
    ("Origine", "origin"),
    ("N Fact", "invoice_number"),
    ("Typ Fact", "invoice_type"),
    ("Date Fact", "invoice_date"),
    ("Client", "client"),
    ("Devise", "currency"),
    ("Obj Fact", "invoice_object"),
    ("Cpt Comptable", "account_code"),
    ("Date GL", "gl_date"),
    ("Periode de facturation", "billing_period"),
    ("Reference", "reference"),
    ("Termine Flag", "terminated_flag"),
    ("Description", "description"),
    ("Chiffre Aff Exe Dzd", "revenue_amount"),
];

const ETAT_FACTURE: &[(&str, &str)] = &[
    ("Organisation", "organization"),
    ("Source", "source"),
    ("N Fact", "invoice_number"),
    ("Typ Fact", "invoice_type"),
    ("Date Fact", "invoice_date"),
    ("Client", "client"),
    ("Periode", "period"),
    ("Invoice Object", "invoice_object"),
    ("Montant HT", "amount_pre_tax"),
    ("Montant Taxe", "tax_amount"),
    ("Montant TTC", "total_amount"),
    ("Chiffre Aff Exe", "revenue_amount"),
    ("Encaissement", "collection_amount"),
    ("Date Rglt", "payment_date"),
    ("Facture Avoir / Annulation", "credit_amount"),
];

const PARC_CORPORATE: &[(&str, &str)] = &[
    ("ACTEL_CODE", "actel_code"),
    ("CUSTOMER_L1_CODE", "customer_l1_code"),
    ("CUSTOMER_L1_DESC", "customer_l1_desc"),
    ("CUSTOMER_L2_CODE", "customer_l2_code"),
    ("CUSTOMER_L2_DESC", "customer_l2_desc"),
    ("CUSTOMER_L3_CODE", "customer_l3_code"),
    ("CUSTOMER_L3_DESC", "customer_l3_desc"),
    ("TELECOM_TYPE", "telecom_type"),
    ("OFFER_TYPE", "offer_type"),
    ("OFFER_NAME", "offer_name"),
    ("SUBSCRIBER_STATUS", "subscriber_status"),
    ("CREATION_DATE", "creation_date"),
    ("STATE", "state"),
    ("CUSTOMER_FULL_NAME", "customer_full_name"),
];

const CREANCES_NGBSS: &[(&str, &str)] = &[
    ("DOT", "dot"),
    ("ACTEL", "actel"),
    ("MOIS", "month"),
    ("ANNEE", "year"),
    ("SUBS_STATUS", "subscriber_status"),
    ("PRODUIT", "product"),
    ("CUSTOMER_LEV1", "customer_lev1"),
    ("CUSTOMER_LEV2", "customer_lev2"),
    ("CUSTOMER_LEV3", "customer_lev3"),
    ("INVOICE_AMT", "invoice_amount"),
    ("OPEN_AMT", "open_amount"),
    ("TAX_AMT", "tax_amount"),
    ("INVOICE_AMT_HT", "invoice_amount_ht"),
    ("DISPUTE_AMT", "dispute_amount"),
    ("DISPUTE_TAX_AMT", "dispute_tax_amount"),
    ("DISPUTE_NET_AMT", "dispute_net_amount"),
    ("CREANCE_BRUT", "gross_receivable"),
    ("CREANCE_NET", "net_receivable"),
    ("CREANCE_HT", "receivable_ht"),
];

const INVOICE: &[(&str, &str)] = &[
    ("Invoice Number", "invoice_number"),
    ("N° Facture", "invoice_number"),
    ("Date", "invoice_date"),
    ("Client", "client"),
    ("HT", "amount_pre_tax"),
    ("TVA", "tax_amount"),
    ("TTC", "total_amount"),
];

/// Alternate spellings (already normalized) that stand in for a missing header.
/// Only applied when the key belongs to the file type's table.
pub(crate) const ALIASES: &[(&str, &str)] = &[
    ("do", "dot"),
    ("dot", "dot"),
    ("direction_operationnelle", "dot"),
    ("product", "product"),
    ("produit", "product"),
    ("montant_ht", "amount_pre_tax"),
    ("amount_ht", "amount_pre_tax"),
    ("ht", "amount_pre_tax"),
    ("tva", "tax_amount"),
    ("taxe", "tax_amount"),
    ("montant_tva", "tax_amount"),
    ("montant_ttc", "total_amount"),
    ("total", "total_amount"),
    ("remise", "discount"),
    ("numero_facture", "invoice_number"),
    ("n_facture", "invoice_number"),
    ("invoice_no", "invoice_number"),
    ("date_facture", "invoice_date"),
    ("customer", "client"),
];

pub fn field_mapping(file_type: FileType) -> &'static [(&'static str, &'static str)] {
    match file_type {
        FileType::CaPeriodique => CA_PERIODIQUE,
        FileType::CaNonPeriodique => CA_NON_PERIODIQUE,
        FileType::CaDnt | FileType::CaRfd | FileType::CaCnt => CA_TRANSACTIONS,
        FileType::FacturationManuelle => FACTURATION_MANUELLE,
        FileType::JournalVentes => JOURNAL_VENTES,
        FileType::EtatFacture => ETAT_FACTURE,
        FileType::ParcCorporate => PARC_CORPORATE,
        FileType::CreancesNgbss => CREANCES_NGBSS,
        FileType::Invoice => INVOICE,
        FileType::General => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_no_field_key_is_also_a_raw_header_of_another_entry() {
        // A pure lookup: mapped keys never feed back into the table.
        for t in FileType::ALL {
            let table = field_mapping(t);
            let raws: HashSet<&str> = table.iter().map(|(raw, _)| *raw).collect();
            for (_, key) in table {
                assert!(!raws.contains(key), "{} maps into raw header {}", t, key);
            }
        }
    }

    #[test]
    fn test_general_has_no_mapping() {
        assert!(field_mapping(FileType::General).is_empty());
    }
}
