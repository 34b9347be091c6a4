//! Record validation and storage encoding
//!
//! Validation is lenient. Problems become `Diagnostic`s and a warning; the
//! record always comes back, so partial data is still persisted.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::crawling::extractors::clean_text;
use crate::domain::case::CaseClass;
use crate::domain::record::{CaseRecord, Diagnostic};

/// `(list field, extraction key, storage key)`, applied inside every element
const KEY_REMAPS: &[(&str, &str, &str)] = &[
    ("partes", "_index", "index"),
    ("andamentos", "index", "index_num"),
    ("decisoes", "index", "index_num"),
    ("deslocamentos", "index", "index_num"),
    ("recursos", "index", "index_num"),
    ("pautas", "index", "index_num"),
];

const INTEGER_FIELDS: &[&str] = &["processo_id", "incidente", "volumes", "folhas", "apensos", "status"];
const REQUIRED_IDENTIFIERS: &[&str] = &["processo_id", "incidente", "classe"];

static DIGITS_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\d+").ok());

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordValidator;

impl RecordValidator {
    pub const fn new() -> Self {
        Self
    }

    /// Coerce, remap and check a finalized record.
    ///
    /// Returns the fixed record, with the new diagnostics appended to it,
    /// and the new diagnostics on their own.
    pub fn validate(&self, record: CaseRecord) -> (CaseRecord, Vec<Diagnostic>) {
        let mut fields = record.fields().clone();
        let mut diagnostics = Vec::new();

        collapse_strings(&mut fields);
        for field in INTEGER_FIELDS {
            coerce_integer(&mut fields, field, &mut diagnostics);
        }
        coerce_classe(&mut fields, &mut diagnostics);
        if let Some(Value::String(relator)) = fields.get_mut("relator") {
            *relator = relator.to_uppercase();
        }
        encode_liminar(&mut fields, &mut diagnostics);
        encode_assuntos(&mut fields);
        coerce_numero_origem(&mut fields, &mut diagnostics);
        if let Some(badge @ Value::String(_)) = fields.get_mut("badges") {
            *badge = json!([badge.take()]);
        }
        if let Some(sessao @ Value::Object(_)) = fields.get_mut("sessao_virtual") {
            *sessao = json!([sessao.take()]);
        }
        remap_keys(&mut fields);
        check_required(&fields, &mut diagnostics);

        for diagnostic in &diagnostics {
            warn!(
                case = %record.request(),
                field = %diagnostic.field,
                error_kind = %diagnostic.code,
                "Validation: {}",
                diagnostic.message
            );
        }

        let record = record.with_fields(fields).with_diagnostics(diagnostics.clone());
        (record, diagnostics)
    }
}

fn collapse_strings(fields: &mut Map<String, Value>) {
    for (key, value) in fields.iter_mut() {
        if key == "html" {
            continue;
        }
        if let Value::String(text) = value {
            *text = clean_text(text);
        }
    }
}

fn coerce_integer(fields: &mut Map<String, Value>, field: &str, diagnostics: &mut Vec<Diagnostic>) {
    let Some(value) = fields.get_mut(field) else {
        return;
    };
    match value {
        Value::String(text) => {
            let digits: String = text.chars().filter(|c| !matches!(c, '.' | ' ')).collect();
            match digits.parse::<i64>() {
                Ok(n) => *value = json!(n),
                Err(_) => diagnostics.push(Diagnostic::new(
                    field,
                    "invalid_type",
                    format!("expected an integer, got {text:?}"),
                )),
            }
        }
        Value::Number(n) if n.as_i64().is_none() => {
            if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0) {
                #[allow(clippy::cast_possible_truncation)]
                let whole = f as i64;
                *value = json!(whole);
            } else {
                diagnostics.push(Diagnostic::new(field, "invalid_type", format!("expected an integer, got {n}")));
            }
        }
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => {
            diagnostics.push(Diagnostic::new(field, "invalid_type", "expected an integer"));
        }
        _ => {}
    }
}

fn coerce_classe(fields: &mut Map<String, Value>, diagnostics: &mut Vec<Diagnostic>) {
    if let Some(Value::String(code)) = fields.get_mut("classe") {
        match code.parse::<CaseClass>() {
            Ok(class) => *code = class.code().to_string(),
            Err(e) => diagnostics.push(Diagnostic::new("classe", "unknown_class", e.to_string())),
        }
    }
}

/// Marker lists are stored as 1 (present) or 0 (absent or empty)
fn encode_liminar(fields: &mut Map<String, Value>, diagnostics: &mut Vec<Diagnostic>) {
    let Some(value) = fields.get_mut("liminar") else {
        return;
    };
    let flag = match value {
        Value::Array(items) => i64::from(!items.is_empty()),
        Value::Bool(b) => i64::from(*b),
        Value::Null => 0,
        Value::Number(n) => i64::from(n.as_i64().is_some_and(|n| n != 0)),
        Value::String(s) => i64::from(!s.is_empty()),
        Value::Object(_) => {
            diagnostics.push(Diagnostic::new("liminar", "invalid_type", "expected a list of markers"));
            0
        }
    };
    *value = json!(flag);
}

fn encode_assuntos(fields: &mut Map<String, Value>) {
    if let Some(value @ Value::Array(_)) = fields.get_mut("assuntos") {
        *value = Value::String(value.to_string());
    }
}

fn coerce_numero_origem(fields: &mut Map<String, Value>, diagnostics: &mut Vec<Diagnostic>) {
    let Some(value) = fields.get_mut("numero_origem") else {
        return;
    };
    let Value::String(text) = value else {
        return;
    };
    let Some(re) = (*DIGITS_RE).as_ref() else {
        return;
    };
    let mut numbers = Vec::new();
    for run in re.find_iter(text) {
        match run.as_str().parse::<i64>() {
            Ok(n) => numbers.push(json!(n)),
            Err(_) => diagnostics.push(Diagnostic::new(
                "numero_origem",
                "invalid_type",
                format!("number out of range: {}", run.as_str()),
            )),
        }
    }
    *value = Value::Array(numbers);
}

fn remap_keys(fields: &mut Map<String, Value>) {
    for (list, from, to) in KEY_REMAPS {
        let Some(Value::Array(items)) = fields.get_mut(*list) else {
            continue;
        };
        for item in items.iter_mut().filter_map(Value::as_object_mut) {
            if let Some(v) = item.remove(*from) {
                item.insert((*to).to_string(), v);
            }
        }
    }
}

fn check_required(fields: &Map<String, Value>, diagnostics: &mut Vec<Diagnostic>) {
    for field in REQUIRED_IDENTIFIERS {
        match fields.get(*field) {
            None | Some(Value::Null) => {
                diagnostics.push(Diagnostic::new(*field, "missing_required", "required identifier is missing"));
            }
            Some(Value::Number(n)) if *field != "classe" && n.as_i64().is_some_and(|n| n <= 0) => {
                diagnostics.push(Diagnostic::new(*field, "invalid_value", format!("identifier must be positive, got {n}")));
            }
            _ => {}
        }
    }
}

/// Flat row for tabular sinks: nested values become JSON text and
/// booleans become 0/1.
pub fn flatten_for_storage(record: &CaseRecord) -> Map<String, Value> {
    record
        .fields()
        .iter()
        .map(|(key, value)| {
            let flat = match value {
                Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
                Value::Bool(b) => json!(i64::from(*b)),
                other => other.clone(),
            };
            (key.clone(), flat)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::case::{CaseRequest, CorrelationId};

    fn record(fields: Value) -> CaseRecord {
        let Value::Object(map) = fields else { unreachable!() };
        CaseRecord::from_fields(
            CaseRequest::new(CaseClass::AImp, 9),
            CorrelationId::new(100),
            map,
        )
    }

    #[test]
    fn test_coercions() {
        let raw = record(json!({
            "processo_id": "9",
            "incidente": 100,
            "classe": "aimp",
            "relator": "Min.  Fulano   de Tal",
            "liminar": ["Medida Liminar"],
            "assuntos": ["DIREITO", "TRIBUTÁRIO"],
            "numero_origem": "00012 / 345",
            "badges": "Público",
            "sessao_virtual": {"data": "01/02/2024"},
            "volumes": "1.203",
            "html": "<p>  keep   spacing</p>"
        }));
        let (validated, diagnostics) = RecordValidator::new().validate(raw);
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert_eq!(validated.get("processo_id"), Some(&json!(9)));
        assert_eq!(validated.get("classe"), Some(&json!("AImp")));
        assert_eq!(validated.get("relator"), Some(&json!("MIN. FULANO DE TAL")));
        assert_eq!(validated.get("liminar"), Some(&json!(1)));
        assert_eq!(validated.get("assuntos"), Some(&json!(r#"["DIREITO","TRIBUTÁRIO"]"#)));
        assert_eq!(validated.get("numero_origem"), Some(&json!([12, 345])));
        assert_eq!(validated.get("badges"), Some(&json!(["Público"])));
        assert_eq!(validated.get("sessao_virtual"), Some(&json!([{"data": "01/02/2024"}])));
        assert_eq!(validated.get("volumes"), Some(&json!(1203)));
        assert_eq!(validated.get("html"), Some(&json!("<p>  keep   spacing</p>")));
    }

    #[test]
    fn test_empty_or_missing_liminar_is_zero() {
        let (a, _) = RecordValidator::new().validate(record(json!({"liminar": []})));
        let (b, _) = RecordValidator::new().validate(record(json!({"liminar": null})));
        assert_eq!(a.get("liminar"), Some(&json!(0)));
        assert_eq!(b.get("liminar"), Some(&json!(0)));
    }

    #[test]
    fn test_key_remapping_is_uniform() {
        let raw = record(json!({
            "partes": [{"_index": 1, "nome": "A"}, {"_index": 2, "nome": "B"}],
            "andamentos": [{"index": 2}, {"index": 1}],
            "pautas": [{"index": 1}],
            "peticoes": [{"index": 3}]
        }));
        let (validated, _) = RecordValidator::new().validate(raw);
        assert_eq!(validated.get("partes"), Some(&json!([{"index": 1, "nome": "A"}, {"index": 2, "nome": "B"}])));
        assert_eq!(validated.get("andamentos"), Some(&json!([{"index_num": 2}, {"index_num": 1}])));
        assert_eq!(validated.get("pautas"), Some(&json!([{"index_num": 1}])));
        assert_eq!(validated.get("peticoes"), Some(&json!([{"index": 3}])));
    }

    #[test]
    fn test_problems_become_diagnostics_not_drops() {
        let raw = record(json!({"processo_id": "abc", "classe": "XYZ", "partes": [{"nome": "A"}]}));
        let (validated, diagnostics) = RecordValidator::new().validate(raw);
        let codes: Vec<&str> = diagnostics.iter().map(|d| d.code.as_str()).collect();
        assert!(codes.contains(&"invalid_type"));
        assert!(codes.contains(&"unknown_class"));
        assert!(codes.contains(&"missing_required"));
        assert_eq!(validated.get("partes"), Some(&json!([{"nome": "A"}])));
        assert_eq!(validated.diagnostics().len(), diagnostics.len());
    }

    #[test]
    fn test_flatten_for_storage() {
        let flat = flatten_for_storage(&record(json!({
            "partes": [{"index": 1}],
            "flag": true,
            "volumes": 2,
            "origem": null
        })));
        assert_eq!(flat["partes"], json!(r#"[{"index":1}]"#));
        assert_eq!(flat["flag"], json!(1));
        assert_eq!(flat["volumes"], json!(2));
        assert_eq!(flat["origem"], Value::Null);
    }
}
