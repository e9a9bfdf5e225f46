//! Invoice field schema and the extracted record type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which the source document name is attached to a record.
pub const SOURCE_FILE_KEY: &str = "Fichier";

/// Fields requested from the language model.
///
/// Each variant owns the JSON key used in the model response, the XML tag
/// and the summary column, plus the hint shown in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvoiceField {
    /// Type of document (invoice, credit note, debit note, other).
    DocumentType,
    /// Date of issue.
    DocumentDate,
    /// Supplier name and address.
    Supplier,
    /// Supplier VAT number.
    SupplierVatNumber,
    /// Invoice number.
    DocumentNumber,
    /// Purchase order number.
    PurchaseOrderNumber,
    /// Currency code.
    Currency,
    /// VAT rates, as a JSON array.
    VatRates,
    /// Total excluding VAT.
    TotalExclVat,
    /// Total VAT.
    TotalVat,
    /// Total including VAT.
    TotalInclVat,
    /// Structured payment reference.
    StructuredReference,
}

impl InvoiceField {
    /// All fields in prompt order.
    pub const ALL: [InvoiceField; 12] = [
        InvoiceField::DocumentType,
        InvoiceField::DocumentDate,
        InvoiceField::Supplier,
        InvoiceField::SupplierVatNumber,
        InvoiceField::DocumentNumber,
        InvoiceField::PurchaseOrderNumber,
        InvoiceField::Currency,
        InvoiceField::VatRates,
        InvoiceField::TotalExclVat,
        InvoiceField::TotalVat,
        InvoiceField::TotalInclVat,
        InvoiceField::StructuredReference,
    ];

    /// JSON key for this field.
    pub fn key(self) -> &'static str {
        match self {
            InvoiceField::DocumentType => "Type de document",
            InvoiceField::DocumentDate => "Date du document",
            InvoiceField::Supplier => "Nom et adresse du fournisseur",
            InvoiceField::SupplierVatNumber => "Numéro de TVA du fournisseur",
            InvoiceField::DocumentNumber => "Numéro de document",
            InvoiceField::PurchaseOrderNumber => "Numéro de bon de commande",
            InvoiceField::Currency => "Devise",
            InvoiceField::VatRates => "Taux de TVA",
            InvoiceField::TotalExclVat => "Montant total HTVA",
            InvoiceField::TotalVat => "Montant total TVA",
            InvoiceField::TotalInclVat => "Montant total TTC",
            InvoiceField::StructuredReference => "Communication structurée",
        }
    }

    /// Extra guidance appended to the key in the prompt.
    pub fn hint(self) -> Option<&'static str> {
        match self {
            InvoiceField::DocumentType => Some("facture, note de crédit, note de débit, autre"),
            InvoiceField::SupplierVatNumber => Some("format belge ou étranger"),
            InvoiceField::VatRates => Some("multiples, sous forme de liste JSON"),
            _ => None,
        }
    }

    /// Whether the field is a list value.
    pub fn is_list(self) -> bool {
        matches!(self, InvoiceField::VatRates)
    }

    /// Look up a field by its JSON key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

/// Structured fields extracted from one invoice.
///
/// Values are kept exactly as returned by the model, in response order.
/// Only key presence is checked; unknown keys are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceRecord {
    fields: Map<String, Value>,
}

impl InvoiceRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a parsed JSON object.
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// True if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Value stored under a raw key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Value of a schema field.
    pub fn field(&self, field: InvoiceField) -> Option<&Value> {
        self.fields.get(field.key())
    }

    /// Value of a schema field rendered as text.
    pub fn field_text(&self, field: InvoiceField) -> Option<String> {
        self.field(field).map(value_to_text)
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Attach the source document name.
    pub fn set_source_file(&mut self, name: impl Into<String>) {
        self.insert(SOURCE_FILE_KEY, Value::String(name.into()));
    }

    /// Source document name, if attached.
    pub fn source_file(&self) -> Option<&str> {
        self.fields.get(SOURCE_FILE_KEY).and_then(Value::as_str)
    }

    /// Iterate over keys and values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Schema fields absent from this record.
    pub fn missing_fields(&self) -> Vec<InvoiceField> {
        InvoiceField::ALL
            .into_iter()
            .filter(|f| !self.fields.contains_key(f.key()))
            .collect()
    }

    /// List fields present with a value that is not a JSON array.
    pub fn malformed_list_fields(&self) -> Vec<InvoiceField> {
        InvoiceField::ALL
            .into_iter()
            .filter(|f| f.is_list())
            .filter(|f| matches!(self.fields.get(f.key()), Some(v) if !v.is_array()))
            .collect()
    }
}

/// Render a JSON value as plain cell text.
///
/// Arrays are joined with `, `, objects are compact JSON and `null` is empty.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(value_to_text).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}

/// Records collected during one run, in processing order.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    records: Vec<InvoiceRecord>,
}

impl BatchSummary {
    /// Append a record.
    pub fn push(&mut self, record: InvoiceRecord) {
        self.records.push(record);
    }

    /// Collected records.
    pub fn records(&self) -> &[InvoiceRecord] {
        &self.records
    }

    /// True if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Union of keys across records, in first-seen order.
    pub fn columns(&self) -> Vec<&str> {
        summary_columns(&self.records)
    }
}

impl From<Vec<InvoiceRecord>> for BatchSummary {
    fn from(records: Vec<InvoiceRecord>) -> Self {
        Self { records }
    }
}

/// Union of keys across records, in first-seen order.
pub fn summary_columns(records: &[InvoiceRecord]) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: Value) -> InvoiceRecord {
        match value {
            Value::Object(map) => InvoiceRecord::from_map(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_field_keys_round_trip() {
        for field in InvoiceField::ALL {
            assert_eq!(InvoiceField::from_key(field.key()), Some(field));
        }
        assert_eq!(InvoiceField::from_key("Fichier"), None);
    }

    #[test]
    fn test_record_keeps_response_order_and_unknown_keys() {
        let rec = record(json!({
            "Devise": "EUR",
            "Remarque": "livraison partielle",
            "Type de document": "facture"
        }));

        let keys: Vec<&str> = rec.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Devise", "Remarque", "Type de document"]);
        assert_eq!(rec.field_text(InvoiceField::Currency).as_deref(), Some("EUR"));
        assert!(rec.missing_fields().contains(&InvoiceField::VatRates));
        assert!(!rec.missing_fields().contains(&InvoiceField::DocumentType));
    }

    #[test]
    fn test_source_file_is_appended_last() {
        let mut rec = record(json!({"Devise": "EUR"}));
        rec.set_source_file("facture_001");

        assert_eq!(rec.source_file(), Some("facture_001"));
        assert_eq!(rec.keys().last().map(String::as_str), Some(SOURCE_FILE_KEY));
    }

    #[test]
    fn test_malformed_list_fields() {
        let mut rec = InvoiceRecord::new();
        assert_eq!(rec.malformed_list_fields(), vec![]);

        rec.insert("Taux de TVA", json!(["21%", "6%"]));
        rec.insert("Devise", "EUR");
        assert_eq!(rec.malformed_list_fields(), vec![]);

        rec.insert("Taux de TVA", "21%");
        assert_eq!(rec.malformed_list_fields(), vec![InvoiceField::VatRates]);
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(&json!(["21%", "6%"])), "21%, 6%");
        assert_eq!(value_to_text(&json!(121.5)), "121.5");
        assert_eq!(value_to_text(&Value::Null), "");
        assert_eq!(value_to_text(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn test_summary_columns_union_in_first_seen_order() {
        let summary = BatchSummary::from(vec![
            record(json!({"Type de document": "facture", "Devise": "EUR"})),
            record(json!({"Devise": "USD", "Taux de TVA": ["21%"]})),
        ]);

        assert_eq!(
            summary.columns(),
            vec!["Type de document", "Devise", "Taux de TVA"]
        );
    }
}
