//! Per-case accumulator and finalized record
//!
//! `PartialRecord` is owned by exactly one join task for the lifetime of a
//! case session. `finalize` consumes it, so a case can only ever produce
//! one `CaseRecord`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::domain::case::{CaseRequest, CorrelationId};
use crate::domain::section::SectionName;

/// Why a single section ended up without a value. Never fatal to the case.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionFailure {
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("error signature in body: {0}")]
    ErrorSignature(String),

    #[error("body too short ({0} bytes)")]
    BodyTooShort(usize),

    #[error("expected structural markers not found")]
    MissingMarkers,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("no result before the session deadline")]
    TimedOut,

    #[error("result channel closed before completion")]
    ChannelClosed,
}

impl SectionFailure {
    /// Stable diagnostic code
    pub const fn code(&self) -> &'static str {
        match self {
            Self::HttpStatus(_) => "http_status",
            Self::ErrorSignature(_) => "error_signature",
            Self::BodyTooShort(_) => "body_too_short",
            Self::MissingMarkers => "missing_markers",
            Self::Transport(_) => "transport",
            Self::TimedOut => "timed_out",
            Self::ChannelClosed => "channel_closed",
        }
    }
}

/// Result delivered for one section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SectionOutcome {
    Loaded(Value),
    Failed(SectionFailure),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SectionSlot {
    #[default]
    Pending,
    Done(SectionOutcome),
}

/// What happened when a section result was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyEffect {
    Accepted,
    Overwrote,
    Unexpected,
}

/// Non-fatal problem attached to a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PartialRecord {
    request: CaseRequest,
    correlation_id: CorrelationId,
    primary_fields: Map<String, Value>,
    expected: BTreeSet<SectionName>,
    sections: BTreeMap<SectionName, SectionSlot>,
}

impl PartialRecord {
    pub fn new(
        request: CaseRequest,
        correlation_id: CorrelationId,
        primary_fields: Map<String, Value>,
        expected: impl IntoIterator<Item = SectionName>,
    ) -> Self {
        let expected: BTreeSet<SectionName> = expected.into_iter().collect();
        let sections = expected.iter().map(|s| (*s, SectionSlot::Pending)).collect();
        Self {
            request,
            correlation_id,
            primary_fields,
            expected,
            sections,
        }
    }

    pub const fn request(&self) -> CaseRequest {
        self.request
    }

    pub const fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Store a section result. A repeated section replaces the earlier value.
    pub fn apply(&mut self, section: SectionName, outcome: SectionOutcome) -> ApplyEffect {
        match self.sections.get_mut(&section) {
            None => ApplyEffect::Unexpected,
            Some(slot) => {
                let effect = match slot {
                    SectionSlot::Pending => ApplyEffect::Accepted,
                    SectionSlot::Done(_) => ApplyEffect::Overwrote,
                };
                *slot = SectionSlot::Done(outcome);
                effect
            }
        }
    }

    pub fn completed(&self) -> BTreeSet<SectionName> {
        self.sections
            .iter()
            .filter(|(_, slot)| matches!(slot, SectionSlot::Done(_)))
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.completed() == self.expected
    }

    pub fn pending(&self) -> Vec<SectionName> {
        self.sections
            .iter()
            .filter(|(_, slot)| matches!(slot, SectionSlot::Pending))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Mark every still-pending section as failed
    pub fn fail_pending(&mut self, failure: &SectionFailure) {
        for slot in self.sections.values_mut() {
            if matches!(slot, SectionSlot::Pending) {
                *slot = SectionSlot::Done(SectionOutcome::Failed(failure.clone()));
            }
        }
    }

    /// Build the finalized record.
    ///
    /// Output depends only on the primary fields and the per-section
    /// outcomes, never on the order in which outcomes arrived.
    pub fn finalize(self) -> CaseRecord {
        let mut fields = self.primary_fields;
        let mut loaded = BTreeSet::new();
        let mut diagnostics = Vec::new();

        for (section, slot) in self.sections {
            let outcome = match slot {
                SectionSlot::Done(outcome) => outcome,
                SectionSlot::Pending => SectionOutcome::Failed(SectionFailure::TimedOut),
            };
            match (outcome, section.record_key()) {
                (SectionOutcome::Loaded(value), Some(key)) => {
                    fields.insert(key.to_string(), value);
                    loaded.insert(section);
                }
                (SectionOutcome::Loaded(value), None) => {
                    if let Value::Object(extra) = value {
                        for (key, value) in extra {
                            let keep_existing = fields.get(&key).is_some_and(|v| !v.is_null());
                            if !keep_existing || !value.is_null() {
                                fields.insert(key, value);
                            }
                        }
                    }
                    loaded.insert(section);
                }
                (SectionOutcome::Failed(failure), key) => {
                    if let Some(key) = key {
                        fields.insert(key.to_string(), Value::Null);
                    }
                    diagnostics.push(Diagnostic::new(
                        section.as_str(),
                        failure.code(),
                        failure.to_string(),
                    ));
                }
            }
        }

        CaseRecord {
            request: self.request,
            correlation_id: Some(self.correlation_id),
            fields,
            loaded_sections: loaded,
            diagnostics,
        }
    }
}

/// Finalized case output. Fields are only replaced wholesale by the
/// validation and normalization stages, never edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    request: CaseRequest,
    correlation_id: Option<CorrelationId>,
    fields: Map<String, Value>,
    loaded_sections: BTreeSet<SectionName>,
    diagnostics: Vec<Diagnostic>,
}

impl CaseRecord {
    pub fn from_fields(request: CaseRequest, correlation_id: Option<CorrelationId>, fields: Map<String, Value>) -> Self {
        Self {
            request,
            correlation_id,
            fields,
            loaded_sections: BTreeSet::new(),
            diagnostics: Vec::new(),
        }
    }

    pub const fn request(&self) -> CaseRequest {
        self.request
    }

    pub const fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }

    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub const fn loaded_sections(&self) -> &BTreeSet<SectionName> {
        &self.loaded_sections
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Same record with its field map replaced
    #[must_use]
    pub fn with_fields(self, fields: Map<String, Value>) -> Self {
        Self { fields, ..self }
    }

    #[must_use]
    pub fn with_diagnostics(mut self, extra: impl IntoIterator<Item = Diagnostic>) -> Self {
        self.diagnostics.extend(extra);
        self
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::case::CaseClass;
    use serde_json::json;

    fn partial(expected: &[SectionName]) -> PartialRecord {
        let mut primary = Map::new();
        primary.insert("processo_id".into(), json!(42));
        primary.insert("origem".into(), json!("SP"));
        PartialRecord::new(
            CaseRequest::new(CaseClass::Adi, 42),
            CorrelationId::new(900).unwrap(),
            primary,
            expected.iter().copied(),
        )
    }

    #[test]
    fn test_completes_only_when_all_expected_arrive() {
        let mut p = partial(&[SectionName::Partes, SectionName::Pautas]);
        assert_eq!(p.apply(SectionName::Partes, SectionOutcome::Loaded(json!([]))), ApplyEffect::Accepted);
        assert!(!p.is_complete());
        assert_eq!(p.pending(), vec![SectionName::Pautas]);
        p.apply(SectionName::Pautas, SectionOutcome::Failed(SectionFailure::MissingMarkers));
        assert!(p.is_complete());
    }

    #[test]
    fn test_duplicate_overwrites_by_name() {
        let mut p = partial(&[SectionName::Partes]);
        p.apply(SectionName::Partes, SectionOutcome::Loaded(json!([1])));
        assert_eq!(p.apply(SectionName::Partes, SectionOutcome::Loaded(json!([2]))), ApplyEffect::Overwrote);
        let record = p.finalize();
        assert_eq!(record.get("partes"), Some(&json!([2])));
    }

    #[test]
    fn test_unexpected_section_is_ignored() {
        let mut p = partial(&[SectionName::Partes]);
        assert_eq!(p.apply(SectionName::Recursos, SectionOutcome::Loaded(json!([]))), ApplyEffect::Unexpected);
        assert!(!p.is_complete());
    }

    #[test]
    fn test_failed_section_becomes_null_with_diagnostic() {
        let mut p = partial(&[SectionName::Decisoes]);
        p.apply(SectionName::Decisoes, SectionOutcome::Failed(SectionFailure::HttpStatus(500)));
        let record = p.finalize();
        assert_eq!(record.get("decisoes"), Some(&Value::Null));
        assert_eq!(record.diagnostics()[0].code, "http_status");
        assert!(record.loaded_sections().is_empty());
    }

    #[test]
    fn test_informacoes_merges_without_clobbering_with_nulls() {
        let mut p = partial(&[SectionName::Informacoes]);
        p.apply(
            SectionName::Informacoes,
            SectionOutcome::Loaded(json!({"origem": null, "assuntos": ["A"]})),
        );
        let record = p.finalize();
        assert_eq!(record.get("origem"), Some(&json!("SP")));
        assert_eq!(record.get("assuntos"), Some(&json!(["A"])));
    }

    #[test]
    fn test_fail_pending_marks_remaining() {
        let mut p = partial(&[SectionName::Partes, SectionName::Pautas]);
        p.apply(SectionName::Partes, SectionOutcome::Loaded(json!([])));
        p.fail_pending(&SectionFailure::TimedOut);
        assert!(p.is_complete());
        let record = p.finalize();
        assert_eq!(record.diagnostics()[0].field, "pautas");
        assert_eq!(record.diagnostics()[0].code, "timed_out");
    }
}
