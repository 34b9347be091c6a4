//! Fixed set of per-case sub-resources

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::case::CorrelationId;

/// One auxiliary fragment fetched separately per case.
///
/// Ordering is the declaration order; the join relies on it to build
/// finalized records identically regardless of arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionName {
    Partes,
    Andamentos,
    Decisoes,
    Deslocamentos,
    Peticoes,
    Recursos,
    Pautas,
    Sessao,
    Informacoes,
}

impl SectionName {
    pub const ALL: [SectionName; 9] = [
        SectionName::Partes,
        SectionName::Andamentos,
        SectionName::Decisoes,
        SectionName::Deslocamentos,
        SectionName::Peticoes,
        SectionName::Recursos,
        SectionName::Pautas,
        SectionName::Sessao,
        SectionName::Informacoes,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            SectionName::Partes => "partes",
            SectionName::Andamentos => "andamentos",
            SectionName::Decisoes => "decisoes",
            SectionName::Deslocamentos => "deslocamentos",
            SectionName::Peticoes => "peticoes",
            SectionName::Recursos => "recursos",
            SectionName::Pautas => "pautas",
            SectionName::Sessao => "sessao",
            SectionName::Informacoes => "informacoes",
        }
    }

    pub const fn endpoint(self) -> &'static str {
        match self {
            SectionName::Partes => "abaPartes.asp",
            SectionName::Andamentos => "abaAndamentos.asp",
            SectionName::Decisoes => "abaDecisoes.asp",
            SectionName::Deslocamentos => "abaDeslocamentos.asp",
            SectionName::Peticoes => "abaPeticoes.asp",
            SectionName::Recursos => "abaRecursos.asp",
            SectionName::Pautas => "abaPautas.asp",
            SectionName::Sessao => "abaSessao.asp",
            SectionName::Informacoes => "abaInformacoes.asp",
        }
    }

    /// Key under which the section value lands in the record.
    /// `None` means the section's object is merged into the top level.
    pub const fn record_key(self) -> Option<&'static str> {
        match self {
            SectionName::Sessao => Some("sessao_virtual"),
            SectionName::Informacoes => None,
            other => Some(other.as_str()),
        }
    }

    /// Column holding the "section loaded" flag in the crawl-state table
    pub const fn loaded_column(self) -> &'static str {
        match self {
            SectionName::Partes => "partes_loaded",
            SectionName::Andamentos => "andamentos_loaded",
            SectionName::Decisoes => "decisoes_loaded",
            SectionName::Deslocamentos => "deslocamentos_loaded",
            SectionName::Peticoes => "peticoes_loaded",
            SectionName::Recursos => "recursos_loaded",
            SectionName::Pautas => "pautas_loaded",
            SectionName::Sessao => "sessao_loaded",
            SectionName::Informacoes => "informacoes_loaded",
        }
    }

    pub fn url(self, base_url: &str, correlation_id: CorrelationId) -> String {
        format!(
            "{}/processos/{}?incidente={}",
            base_url.trim_end_matches('/'),
            self.endpoint(),
            correlation_id
        )
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
