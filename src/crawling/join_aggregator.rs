//! Per-case join of section results
//!
//! One `JoinAggregator` task owns one case's `PartialRecord`. Section tasks
//! never touch it: they send immutable `SectionMessage`s over an mpsc
//! channel. The join finalizes exactly once, when every expected section has
//! reported, when the deadline passes, or when all senders are gone.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::case::CaseRequest;
use crate::domain::record::{ApplyEffect, CaseRecord, PartialRecord, SectionFailure, SectionOutcome};
use crate::domain::section::SectionName;

/// One section result, as emitted by a section fetch task
#[derive(Debug, Clone, PartialEq)]
pub struct SectionMessage {
    pub case: CaseRequest,
    pub section: SectionName,
    pub outcome: SectionOutcome,
}

impl SectionMessage {
    pub const fn new(case: CaseRequest, section: SectionName, outcome: SectionOutcome) -> Self {
        Self { case, section, outcome }
    }
}

/// How the join ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinEnd {
    Complete,
    TimedOut { missing: Vec<SectionName> },
    ChannelClosed { missing: Vec<SectionName> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinReport {
    pub record: CaseRecord,
    pub end: JoinEnd,
    pub duplicates: usize,
}

impl JoinReport {
    /// Sections that ended without a value
    pub fn sections_failed(&self) -> usize {
        self.record.diagnostics().len()
    }
}

pub struct JoinAggregator {
    partial: PartialRecord,
    receiver: mpsc::Receiver<SectionMessage>,
    deadline: Duration,
    duplicates: usize,
}

impl JoinAggregator {
    /// Create the aggregator and the sender handed to section tasks
    pub fn channel(partial: PartialRecord, deadline: Duration) -> (mpsc::Sender<SectionMessage>, Self) {
        let capacity = SectionName::ALL.len().max(1) * 2;
        let (sender, receiver) = mpsc::channel(capacity);
        (
            sender,
            Self {
                partial,
                receiver,
                deadline,
                duplicates: 0,
            },
        )
    }

    pub const fn partial(&self) -> &PartialRecord {
        &self.partial
    }

    /// Apply one result. Messages for another case are dropped.
    pub fn on_section_result(&mut self, message: SectionMessage) -> ApplyEffect {
        let case = self.partial.request();
        if message.case != case {
            warn!(case = %case, other = %message.case, "Dropping section result for another case");
            return ApplyEffect::Unexpected;
        }

        let effect = self.partial.apply(message.section, message.outcome);
        match effect {
            ApplyEffect::Accepted => debug!(case = %case, section = %message.section, "Section joined"),
            ApplyEffect::Overwrote => {
                self.duplicates += 1;
                debug!(case = %case, section = %message.section, "Duplicate section result replaced earlier value");
            }
            ApplyEffect::Unexpected => {
                warn!(case = %case, section = %message.section, "Section was not dispatched for this case");
            }
        }
        effect
    }

    /// Wait for results until complete, deadline or channel close
    pub async fn run(mut self) -> JoinReport {
        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);

        let end = loop {
            if self.partial.is_complete() {
                break JoinEnd::Complete;
            }
            tokio::select! {
                message = self.receiver.recv() => match message {
                    Some(message) => {
                        self.on_section_result(message);
                    }
                    None => {
                        let missing = self.partial.pending();
                        self.partial.fail_pending(&SectionFailure::ChannelClosed);
                        break JoinEnd::ChannelClosed { missing };
                    }
                },
                () = &mut deadline => {
                    let missing = self.partial.pending();
                    warn!(
                        case = %self.partial.request(),
                        missing = ?missing,
                        "⏰ Join deadline reached; finalizing with missing sections"
                    );
                    self.partial.fail_pending(&SectionFailure::TimedOut);
                    break JoinEnd::TimedOut { missing };
                }
            }
        };

        self.receiver.close();
        JoinReport {
            record: self.partial.finalize(),
            end,
            duplicates: self.duplicates,
        }
    }

    /// Finalize with whatever has arrived; pending sections time out
    pub fn into_record(mut self) -> CaseRecord {
        self.partial.fail_pending(&SectionFailure::TimedOut);
        self.partial.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::case::{CaseClass, CorrelationId};
    use serde_json::{Map, json};

    fn case() -> CaseRequest {
        CaseRequest::new(CaseClass::Adi, 42)
    }

    fn partial() -> PartialRecord {
        let mut primary = Map::new();
        primary.insert("processo_id".into(), json!(42));
        PartialRecord::new(
            case(),
            CorrelationId::new(7).unwrap(),
            primary,
            [SectionName::Partes, SectionName::Andamentos, SectionName::Pautas],
        )
    }

    fn message(section: SectionName, value: serde_json::Value) -> SectionMessage {
        SectionMessage::new(case(), section, SectionOutcome::Loaded(value))
    }

    #[tokio::test]
    async fn test_finalizes_when_all_sections_arrive() {
        let (tx, join) = JoinAggregator::channel(partial(), Duration::from_secs(5));
        let handle = tokio::spawn(join.run());
        tx.send(message(SectionName::Pautas, json!([]))).await.unwrap();
        tx.send(message(SectionName::Partes, json!([{"nome": "A"}]))).await.unwrap();
        tx.send(message(SectionName::Andamentos, json!([]))).await.unwrap();

        let report = handle.await.unwrap();
        assert_eq!(report.end, JoinEnd::Complete);
        assert_eq!(report.record.get("partes"), Some(&json!([{"nome": "A"}])));
        assert_eq!(report.sections_failed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_marks_missing_sections() {
        let (tx, join) = JoinAggregator::channel(partial(), Duration::from_secs(30));
        let handle = tokio::spawn(join.run());
        tx.send(message(SectionName::Partes, json!([]))).await.unwrap();

        let report = handle.await.unwrap();
        assert_eq!(
            report.end,
            JoinEnd::TimedOut {
                missing: vec![SectionName::Andamentos, SectionName::Pautas]
            }
        );
        assert_eq!(report.record.get("pautas"), Some(&serde_json::Value::Null));
        assert!(report.record.diagnostics().iter().all(|d| d.code == "timed_out"));
        drop(tx);
    }

    #[tokio::test]
    async fn test_dropped_senders_close_the_join() {
        let (tx, join) = JoinAggregator::channel(partial(), Duration::from_secs(30));
        tx.send(message(SectionName::Partes, json!([]))).await.unwrap();
        drop(tx);
        let report = join.run().await;
        assert!(matches!(report.end, JoinEnd::ChannelClosed { .. }));
        assert_eq!(report.sections_failed(), 2);
    }

    #[test]
    fn test_other_case_and_duplicates() {
        let (_tx, mut join) = JoinAggregator::channel(partial(), Duration::from_secs(1));
        let foreign = SectionMessage::new(
            CaseRequest::new(CaseClass::Re, 42),
            SectionName::Partes,
            SectionOutcome::Loaded(json!([])),
        );
        assert_eq!(join.on_section_result(foreign), ApplyEffect::Unexpected);
        assert_eq!(join.on_section_result(message(SectionName::Partes, json!([1]))), ApplyEffect::Accepted);
        assert_eq!(join.on_section_result(message(SectionName::Partes, json!([2]))), ApplyEffect::Overwrote);
        let record = join.into_record();
        assert_eq!(record.get("partes"), Some(&json!([2])));
    }
}
