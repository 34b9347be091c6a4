//! Template-driven key ordering
//!
//! Relies on `serde_json`'s `preserve_order` feature: a `Map` keeps insertion
//! order, so building it in template order is the whole trick.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::domain::record::CaseRecord;
use crate::domain::template::OutputTemplate;

/// Reorder `value` after `template`.
///
/// Template keys come first, in template order. Extra keys follow in
/// lexicographic order, normalized against themselves. A list whose template
/// starts with an object has every element normalized against that element;
/// a list under any other list template passes through untouched. Objects and
/// lists under a scalar or null template are canonicalized, so nothing below
/// a template leaf keeps its input order.
pub fn normalize(value: &Value, template: &Value) -> Value {
    match (value, template) {
        (Value::Object(map), Value::Object(shape)) => Value::Object(normalize_object(map, shape)),
        (Value::Array(items), Value::Array(shape)) => match shape.first() {
            Some(element @ Value::Object(_)) => Value::Array(items.iter().map(|item| normalize(item, element)).collect()),
            _ => value.clone(),
        },
        (Value::Object(_) | Value::Array(_), _) => canonicalize(value),
        _ => value.clone(),
    }
}

/// Normalize against the value's own shape: every object gets sorted keys
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Value::Object(keys.into_iter().map(|k| (k.clone(), canonicalize(&map[k]))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        _ => value.clone(),
    }
}

fn normalize_object(map: &Map<String, Value>, shape: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::with_capacity(map.len());
    for (key, sub_template) in shape {
        if let Some(v) = map.get(key) {
            out.insert(key.clone(), normalize(v, sub_template));
        }
    }
    let mut extras: Vec<&String> = map.keys().filter(|k| !shape.contains_key(*k)).collect();
    extras.sort();
    for key in extras {
        out.insert(key.clone(), canonicalize(&map[key]));
    }
    out
}

/// A path that differs between two records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Difference {
    Missing(String),
    Added(String),
    TypeMismatch { path: String, expected: &'static str, actual: &'static str },
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Structural comparison for golden-output checks. Values are not compared,
/// only shapes. `html` is always ignored; `null` matches any type.
pub fn structural_diff(expected: &Value, actual: &Value, ignore: &[&str]) -> Vec<Difference> {
    let mut differences = Vec::new();
    diff_into("", expected, actual, ignore, &mut differences);
    differences
}

fn diff_into(path: &str, expected: &Value, actual: &Value, ignore: &[&str], out: &mut Vec<Difference>) {
    let join = |key: &str| if path.is_empty() { key.to_string() } else { format!("{path}.{key}") };
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => {
            let skipped = |k: &str| k == "html" || ignore.contains(&k);
            for (key, ev) in e.iter().filter(|(k, _)| !skipped(k.as_str())) {
                match a.get(key) {
                    Some(av) => diff_into(&join(key), ev, av, ignore, out),
                    None => out.push(Difference::Missing(join(key))),
                }
            }
            for key in a.keys().filter(|k| !skipped(k.as_str()) && !e.contains_key(*k)) {
                out.push(Difference::Added(join(key)));
            }
        }
        (Value::Array(e), Value::Array(a)) => {
            if let (Some(ev), Some(av)) = (e.first(), a.first()) {
                diff_into(&format!("{path}[0]"), ev, av, ignore, out);
            }
        }
        (Value::Null, _) | (_, Value::Null) => {}
        (e, a) if kind_of(e) != kind_of(a) => out.push(Difference::TypeMismatch {
            path: path.to_string(),
            expected: kind_of(e),
            actual: kind_of(a),
        }),
        _ => {}
    }
}

/// Output stage applying the canonical template, or a reference record
/// for the same case when reference mode is on.
#[derive(Debug, Clone)]
pub struct OutputNormalizer {
    template: OutputTemplate,
    reference_dir: Option<PathBuf>,
}

impl OutputNormalizer {
    pub const fn new(template: OutputTemplate) -> Self {
        Self {
            template,
            reference_dir: None,
        }
    }

    #[must_use]
    pub fn with_reference_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.reference_dir = dir;
        self
    }

    pub const fn template(&self) -> &OutputTemplate {
        &self.template
    }

    pub fn reference_path(dir: &Path, record: &CaseRecord) -> PathBuf {
        let request = record.request();
        dir.join(format!("{}_{}.json", request.class.code(), request.number))
    }

    /// Reference record for this case, if reference mode is on and one exists.
    /// A one-element array file is unwrapped.
    pub fn load_reference(&self, record: &CaseRecord) -> Option<Value> {
        let dir = self.reference_dir.as_deref()?;
        let path = Self::reference_path(dir, record);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(case = %record.request(), "Cannot read reference {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(mut items)) if items.len() == 1 => items.pop(),
            Ok(value @ Value::Object(_)) => Some(value),
            Ok(_) => {
                warn!(case = %record.request(), "Reference {} is not a single record", path.display());
                None
            }
            Err(e) => {
                warn!(case = %record.request(), "Reference {} is not valid JSON: {}", path.display(), e);
                None
            }
        }
    }

    /// Record with its fields in output order
    pub fn apply(&self, record: CaseRecord) -> CaseRecord {
        let value = record.to_value();
        let normalized = match self.load_reference(&record) {
            Some(reference) => {
                let differences = structural_diff(&reference, &value, &[]);
                if !differences.is_empty() {
                    warn!(
                        case = %record.request(),
                        differences = differences.len(),
                        "Record shape differs from its reference: {:?}",
                        differences
                    );
                }
                debug!(case = %record.request(), "Normalizing against reference record");
                normalize(&value, &reference)
            }
            None => normalize(&value, self.template.as_value()),
        };
        match normalized {
            Value::Object(fields) => record.with_fields(fields),
            _ => record,
        }
    }
}

impl Default for OutputNormalizer {
    fn default() -> Self {
        Self::new(OutputTemplate::case_record())
    }
}
