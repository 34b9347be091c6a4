//! Domain module - case identity, sections, records and output templates
//!
//! Each module is its own file in the domain/ directory; commonly used
//! items are re-exported here.

pub mod case;
pub mod record;
pub mod section;
pub mod template;

pub use case::{CaseClass, CaseRequest, CorrelationId, UnknownCaseClass};
pub use record::{
    ApplyEffect, CaseRecord, Diagnostic, PartialRecord, SectionFailure, SectionOutcome, SectionSlot,
};
pub use section::SectionName;
pub use template::OutputTemplate;
