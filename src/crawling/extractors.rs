//! Extractor registry for portal documents
//!
//! Every field and every section has exactly one pure extractor with one
//! declared fallback. Extractors never panic and never log; a `None` result
//! means "not found" and the registry substitutes the fallback.
//!
//! `scraper::Html` is not `Send`, so documents are parsed and dropped inside
//! the synchronous `extract_*` calls and never held across an await.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use crate::domain::case::CorrelationId;
use crate::domain::section::SectionName;

/// Collapse all whitespace runs to single spaces
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(element: &ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

fn child_text(element: &ElementRef<'_>, css: &str) -> Option<String> {
    let sel = selector(css)?;
    element
        .select(&sel)
        .next()
        .map(|el| element_text(&el))
        .filter(|text| !text.is_empty())
}

fn non_empty(text: Option<String>) -> Value {
    text.filter(|t| !t.is_empty()).map_or(Value::Null, Value::String)
}

/// A parsed page plus the base URL used to make links absolute
pub struct ParsedDocument {
    html: Html,
    base_url: String,
}

impl ParsedDocument {
    pub fn parse(body: &str, base_url: &str) -> Self {
        Self {
            html: Html::parse_document(body),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub const fn html(&self) -> &Html {
        &self.html
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn select(&self, css: &str) -> Vec<ElementRef<'_>> {
        selector(css).map_or_else(Vec::new, |sel| self.html.select(&sel).collect())
    }

    /// Elements of the first candidate selector that matches anything
    pub fn select_any(&self, candidates: &[&str]) -> Vec<ElementRef<'_>> {
        candidates
            .iter()
            .map(|css| self.select(css))
            .find(|found| !found.is_empty())
            .unwrap_or_default()
    }

    pub fn first_text(&self, css: &str) -> Option<String> {
        self.select(css)
            .first()
            .map(element_text)
            .filter(|text| !text.is_empty())
    }

    /// Non-empty texts of every match, in document order
    pub fn texts(&self, css: &str) -> Vec<String> {
        self.select(css)
            .iter()
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect()
    }

    pub fn attr(&self, css: &str, name: &str) -> Option<String> {
        self.select(css)
            .first()
            .and_then(|el| el.value().attr(name))
            .map(|v| v.trim().to_string())
    }

    /// Portal links are relative to `/processos/` and carry HTML-escaped `&`
    pub fn absolute_link(&self, href: &str) -> String {
        let href = href.replace("amp;", "");
        if href.starts_with("http") {
            href
        } else {
            format!("{}/processos/{}", self.base_url, href.trim_start_matches('/'))
        }
    }

    /// Text after `label` in the first `.processo-dados` block that starts with it
    fn labelled(&self, label: &str) -> Option<String> {
        self.texts(".processo-dados")
            .into_iter()
            .find_map(|text| text.strip_prefix(label).map(|rest| rest.trim().to_string()))
            .filter(|value| !value.is_empty())
    }
}

/// Value used when an extractor finds nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    Null,
    EmptyList,
    EmptyObject,
    Integer(i64),
    Text(&'static str),
}

impl Fallback {
    pub fn value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::EmptyList => Value::Array(Vec::new()),
            Self::EmptyObject => Value::Object(Map::new()),
            Self::Integer(n) => json!(n),
            Self::Text(s) => json!(s),
        }
    }
}

pub type ExtractFn = fn(&ParsedDocument) -> Option<Value>;

#[derive(Debug, Clone)]
pub struct FieldExtractor {
    pub field: &'static str,
    pub extract: ExtractFn,
    pub fallback: Fallback,
}

impl FieldExtractor {
    pub const fn new(field: &'static str, extract: ExtractFn, fallback: Fallback) -> Self {
        Self { field, extract, fallback }
    }

    pub fn run(&self, document: &ParsedDocument) -> Value {
        (self.extract)(document).unwrap_or_else(|| self.fallback.value())
    }
}

#[derive(Debug, Clone)]
pub struct SectionExtractor {
    pub section: SectionName,
    /// Alternatives; a valid fragment contains at least one. Empty disables the check.
    pub markers: &'static [&'static str],
    pub extract: ExtractFn,
    pub fallback: Fallback,
}

impl SectionExtractor {
    pub const fn new(
        section: SectionName,
        markers: &'static [&'static str],
        extract: ExtractFn,
        fallback: Fallback,
    ) -> Self {
        Self {
            section,
            markers,
            extract,
            fallback,
        }
    }

    pub fn run(&self, document: &ParsedDocument) -> Value {
        (self.extract)(document).unwrap_or_else(|| self.fallback.value())
    }
}

/// Result of reading the primary document
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryExtraction {
    pub correlation_id: Option<CorrelationId>,
    pub fields: Map<String, Value>,
}

/// Table of extractors: one per primary field, one per section
#[derive(Debug, Clone)]
pub struct ExtractorRegistry {
    base_url: String,
    fields: Vec<FieldExtractor>,
    sections: BTreeMap<SectionName, SectionExtractor>,
}

impl ExtractorRegistry {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            fields: Vec::new(),
            sections: BTreeMap::new(),
        }
    }

    /// Registry for the court portal layout
    pub fn portal(base_url: &str) -> Self {
        let mut registry = Self::new(base_url);
        for field in portal_fields() {
            registry = registry.with_field(field);
        }
        for section in portal_sections() {
            registry = registry.with_section(section);
        }
        registry
    }

    /// Add or replace the extractor for a field
    #[must_use]
    pub fn with_field(mut self, extractor: FieldExtractor) -> Self {
        match self.fields.iter_mut().find(|f| f.field == extractor.field) {
            Some(existing) => *existing = extractor,
            None => self.fields.push(extractor),
        }
        self
    }

    #[must_use]
    pub fn with_section(mut self, extractor: SectionExtractor) -> Self {
        self.sections.insert(extractor.section, extractor);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn fields(&self) -> &[FieldExtractor] {
        &self.fields
    }

    /// Sections dispatched for every case, in fixed order
    pub fn expected_sections(&self) -> Vec<SectionName> {
        self.sections.keys().copied().collect()
    }

    pub fn section(&self, section: SectionName) -> Option<&SectionExtractor> {
        self.sections.get(&section)
    }

    pub fn markers(&self, section: SectionName) -> &'static [&'static str] {
        self.sections.get(&section).map_or(&[], |s| s.markers)
    }

    pub fn extract_primary(&self, body: &str) -> PrimaryExtraction {
        let document = ParsedDocument::parse(body, &self.base_url);
        let correlation_id = correlation_id(&document);
        let fields = self
            .fields
            .iter()
            .map(|extractor| (extractor.field.to_string(), extractor.run(&document)))
            .collect();
        PrimaryExtraction { correlation_id, fields }
    }

    /// Extract one section fragment. Unregistered sections yield null.
    pub fn extract_section(&self, section: SectionName, body: &str) -> Value {
        self.sections.get(&section).map_or(Value::Null, |extractor| {
            let document = ParsedDocument::parse(body, &self.base_url);
            extractor.run(&document)
        })
    }
}

/// The portal's internal id: `#incidente[value]`, else the `Incidente:` label
pub fn correlation_id(document: &ParsedDocument) -> Option<CorrelationId> {
    document
        .attr("#incidente", "value")
        .and_then(|raw| CorrelationId::parse(&raw))
        .or_else(|| {
            document
                .labelled("Incidente:")
                .and_then(|raw| CorrelationId::parse(&raw))
        })
}

fn portal_fields() -> Vec<FieldExtractor> {
    vec![
        FieldExtractor::new("incidente", extract_incidente, Fallback::Null),
        FieldExtractor::new("numero_unico", extract_numero_unico, Fallback::Null),
        FieldExtractor::new("classe", extract_classe, Fallback::Null),
        FieldExtractor::new("meio", extract_meio, Fallback::Text("FISICO")),
        FieldExtractor::new("publicidade", extract_publicidade, Fallback::Text("PUBLICO")),
        FieldExtractor::new("badges", extract_badges, Fallback::EmptyList),
        FieldExtractor::new("liminar", extract_liminar, Fallback::EmptyList),
        FieldExtractor::new("origem", extract_origem, Fallback::Null),
        FieldExtractor::new("numero_origem", extract_numero_origem, Fallback::Null),
        FieldExtractor::new("volumes", |_| None, Fallback::Integer(1)),
        FieldExtractor::new("folhas", |_| None, Fallback::Integer(0)),
        FieldExtractor::new("apensos", |_| None, Fallback::Integer(0)),
        FieldExtractor::new("relator", extract_relator, Fallback::Null),
        FieldExtractor::new("primeiro_autor", extract_primeiro_autor, Fallback::Null),
    ]
}

fn portal_sections() -> Vec<SectionExtractor> {
    vec![
        SectionExtractor::new(
            SectionName::Partes,
            &["processo-partes", "nome-parte", "detalhe-parte"],
            extract_partes,
            Fallback::EmptyList,
        ),
        SectionExtractor::new(SectionName::Andamentos, &[], extract_andamentos, Fallback::EmptyList),
        SectionExtractor::new(SectionName::Decisoes, &[], extract_decisoes, Fallback::EmptyList),
        SectionExtractor::new(SectionName::Deslocamentos, &[], extract_deslocamentos, Fallback::EmptyList),
        SectionExtractor::new(SectionName::Peticoes, &[], extract_peticoes, Fallback::EmptyList),
        SectionExtractor::new(SectionName::Recursos, &[], extract_recursos, Fallback::EmptyList),
        SectionExtractor::new(SectionName::Pautas, &[], extract_pautas, Fallback::EmptyList),
        SectionExtractor::new(SectionName::Sessao, &[], extract_sessao, Fallback::EmptyObject),
        SectionExtractor::new(
            SectionName::Informacoes,
            &["informacoes-completas", "processo-detalhes"],
            extract_informacoes,
            Fallback::EmptyObject,
        ),
    ]
}

// ---- primary document ----

fn extract_incidente(doc: &ParsedDocument) -> Option<Value> {
    correlation_id(doc).map(|id| json!(id.get()))
}

fn extract_numero_unico(doc: &ParsedDocument) -> Option<Value> {
    let text = doc.first_text(".processo-rotulo")?;
    let (_, value) = text.split_once("Número Único:")?;
    let value = value.trim();
    (!value.is_empty()).then(|| json!(value))
}

fn extract_classe(doc: &ParsedDocument) -> Option<Value> {
    doc.labelled("Classe:").map(Value::String)
}

fn extract_relator(doc: &ParsedDocument) -> Option<Value> {
    let relator = doc.labelled("Relator(a):")?;
    let relator = relator.strip_prefix("MIN. ").unwrap_or(&relator).trim();
    (!relator.is_empty()).then(|| json!(relator))
}

fn extract_meio(doc: &ParsedDocument) -> Option<Value> {
    let badges = doc.texts("span.badge");
    badges.iter().find_map(|badge| {
        let upper = badge.to_uppercase();
        if upper.contains("ELETRÔNICO") || upper.contains("ELETRONICO") {
            Some(json!("ELETRONICO"))
        } else if upper.contains("FÍSICO") || upper.contains("FISICO") {
            Some(json!("FISICO"))
        } else {
            None
        }
    })
}

fn extract_publicidade(doc: &ParsedDocument) -> Option<Value> {
    doc.texts("span.badge").iter().find_map(|badge| {
        let upper = badge.to_uppercase();
        if upper.contains("PÚBLICO") || upper.contains("PUBLICO") {
            Some(json!("PUBLICO"))
        } else if upper.contains("RESTRITO") {
            Some(json!("RESTRITO"))
        } else {
            None
        }
    })
}

fn extract_badges(doc: &ParsedDocument) -> Option<Value> {
    let badges = doc.texts("span.badge");
    (!badges.is_empty()).then(|| json!(badges))
}

fn extract_liminar(doc: &ParsedDocument) -> Option<Value> {
    let markers = doc.texts(".bg-danger");
    (!markers.is_empty()).then(|| json!(markers))
}

fn extract_origem(doc: &ParsedDocument) -> Option<Value> {
    doc.first_text("#descricao-procedencia").map(Value::String)
}

fn extract_numero_origem(doc: &ParsedDocument) -> Option<Value> {
    doc.first_text("#descricao-procedencia").map(Value::String)
}

fn extract_primeiro_autor(doc: &ParsedDocument) -> Option<Value> {
    doc.first_text(".nome-parte").map(Value::String)
}

// ---- sections ----

const PARTE_HEADERS: &[(&str, &str)] = &[
    ("AUTOR(A/S)(ES)", "AUTOR"),
    ("RÉU/RÉUS", "RÉU"),
    ("INTERESSADO(A/S)", "INTERESSADO"),
];

fn extract_partes(doc: &ParsedDocument) -> Option<Value> {
    let scope = if doc.select("#todas-partes").is_empty() { "" } else { "#todas-partes " };
    let tipos = doc.texts(&format!("{scope}.detalhe-parte"));
    let nomes = doc.texts(&format!("{scope}.nome-parte"));

    let mut partes = Vec::new();
    if !nomes.is_empty() {
        for (i, nome) in nomes.iter().enumerate() {
            partes.push(json!({
                "_index": i + 1,
                "tipo": tipos.get(i),
                "nome": nome,
            }));
        }
        return Some(Value::Array(partes));
    }

    // Older layout: one `.processo-partes` block per party, type in the text
    for text in doc.texts("div.processo-partes") {
        if PARTE_HEADERS.iter().any(|(header, _)| text == *header) {
            continue;
        }
        let upper = text.to_uppercase();
        let (tipo, nome) = PARTE_HEADERS
            .iter()
            .find(|(_, tipo)| upper.contains(tipo))
            .map_or(("PARTE", text.clone()), |(header, tipo)| {
                (*tipo, text.replace(header, "").trim().to_string())
            });
        if !nome.is_empty() {
            partes.push(json!({"_index": partes.len() + 1, "tipo": tipo, "nome": nome}));
        }
    }
    Some(Value::Array(partes))
}

fn andamento_items(doc: &ParsedDocument) -> Vec<ElementRef<'_>> {
    doc.select_any(&[".processo-andamentos .andamento-item", ".andamento-item"])
}

fn item_link(doc: &ParsedDocument, item: &ElementRef<'_>) -> (Value, Value) {
    let Some(anchor_sel) = selector("a[href]") else {
        return (Value::Null, Value::Null);
    };
    item.select(&anchor_sel)
        .find(|a| a.value().attr("href").is_some_and(|h| !h.starts_with('#')))
        .map_or((Value::Null, Value::Null), |anchor| {
            let href = anchor.value().attr("href").unwrap_or_default();
            let descricao = element_text(&anchor);
            (
                json!(doc.absolute_link(href)),
                non_empty(Some(descricao)),
            )
        })
}

fn extract_andamentos(doc: &ParsedDocument) -> Option<Value> {
    let items = andamento_items(doc);
    let total = items.len();
    let andamentos = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let (link, link_descricao) = item_link(doc, item);
            json!({
                "index": total - i,
                "data": non_empty(child_text(item, ".andamento-data")),
                "nome": non_empty(child_text(item, ".andamento-nome")),
                "complemento": non_empty(child_text(item, ".col-md-9")),
                "link_descricao": link_descricao,
                "link": link,
                "julgador": non_empty(child_text(item, ".andamento-julgador")),
            })
        })
        .collect();
    Some(Value::Array(andamentos))
}

fn meaningful(values: &[&Value]) -> usize {
    values
        .iter()
        .filter(|v| v.as_str().is_some_and(|s| !s.trim().is_empty()))
        .count()
}

static AUTOR_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)(?:autor|requerente)[:\s]+([^,\n]+)").ok());
static RELATOR_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)(?:relator|ministro)[:\s]+([^,\n]+)").ok());

fn capture(re: &Lazy<Option<Regex>>, text: &str) -> Option<String> {
    let re = (**re).as_ref()?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| clean_text(m.as_str()))
        .filter(|s| !s.is_empty())
}

/// Andamentos carrying a judge badge, kept when at least three fields have content
fn judged_items(doc: &ParsedDocument) -> Vec<(usize, Map<String, Value>)> {
    andamento_items(doc)
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let julgador = child_text(item, ".andamento-julgador")?;
            let mut entry = Map::new();
            entry.insert("data".into(), non_empty(child_text(item, ".andamento-data")));
            entry.insert("nome".into(), non_empty(child_text(item, ".andamento-nome")));
            entry.insert("julgador".into(), json!(julgador));
            entry.insert("complemento".into(), non_empty(child_text(item, ".col-md-9")));
            entry.insert("link".into(), item_link(doc, item).0);
            Some((i + 1, entry))
        })
        .collect()
}

fn extract_decisoes(doc: &ParsedDocument) -> Option<Value> {
    let decisoes = judged_items(doc)
        .into_iter()
        .filter(|(_, e)| meaningful(&[&e["data"], &e["nome"], &e["julgador"], &e["complemento"], &e["link"]]) >= 3)
        .map(|(index, entry)| {
            json!({
                "index": index,
                "data": entry["data"],
                "nome": entry["nome"],
                "julgador": entry["julgador"],
                "complemento": entry["complemento"],
                "link": entry["link"],
            })
        })
        .collect();
    Some(Value::Array(decisoes))
}

fn extract_recursos(doc: &ParsedDocument) -> Option<Value> {
    let recursos = judged_items(doc)
        .into_iter()
        .filter_map(|(index, entry)| {
            let autor = entry["complemento"]
                .as_str()
                .and_then(|c| capture(&AUTOR_RE, c))
                .map_or(Value::Null, Value::String);
            let score = meaningful(&[&entry["data"], &entry["nome"], &entry["julgador"], &entry["complemento"], &autor]);
            (score >= 3).then(|| {
                json!({
                    "index": index,
                    "data": entry["data"],
                    "nome": entry["nome"],
                    "julgador": entry["julgador"],
                    "complemento": entry["complemento"],
                    "autor": autor,
                })
            })
        })
        .collect();
    Some(Value::Array(recursos))
}

fn extract_pautas(doc: &ParsedDocument) -> Option<Value> {
    let pautas = andamento_items(doc)
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let nome = child_text(item, ".andamento-nome")?;
            if !nome.to_lowercase().contains("pauta") {
                return None;
            }
            let complemento = child_text(item, ".col-md-9");
            let relator = complemento.as_deref().and_then(|c| capture(&RELATOR_RE, c));
            Some(json!({
                "index": i + 1,
                "data": non_empty(child_text(item, ".andamento-data")),
                "nome": nome,
                "complemento": non_empty(complemento),
                "relator": non_empty(relator),
            }))
        })
        .collect();
    Some(Value::Array(pautas))
}

fn first_match(re: &Lazy<Option<Regex>>, html: &str) -> Option<String> {
    capture(re, html)
}

static BOLD_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#""processo-detalhes-bold">([^<]+)"#).ok());
static PLAIN_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#""processo-detalhes">([^<]+)"#).ok());
static SUCCESS_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"processo-detalhes bg-font-success">([^<]+)"#).ok());
static INFO_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"processo-detalhes bg-font-info">([^<]+)"#).ok());
static GUIA_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"text-right">\s*<span class="processo-detalhes">([^<]+)"#).ok());
static RECEBIDO_EM_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"Recebido em ([^<]+)").ok());
static DATE_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"em (\d{2}/\d{2}/\d{4})").ok());
static TRAILING_DATE_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r" em \d{2}/\d{2}/\d{4}$").ok());

fn strip_prefix_and_date(text: &str, prefix: &str) -> String {
    let text = text.strip_prefix(prefix).unwrap_or(text);
    (*TRAILING_DATE_RE)
        .as_ref()
        .map_or_else(|| text.to_string(), |re| re.replace(text, "").into_owned())
}

fn strip_label(text: String, label: &str) -> String {
    text.replace(label, "").replace(" em ", "").trim().to_string()
}

fn extract_deslocamentos(doc: &ParsedDocument) -> Option<Value> {
    let items = doc.select_any(&["#deslocamentos .lista-dados", ".lista-dados"]);
    let total = items.len();
    let deslocamentos = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let html = item.inner_html();
            let mut data_recebido = first_match(&SUCCESS_RE, &html).map(|d| strip_label(d, "Recebido em "));
            let mut data_enviado = first_match(&INFO_RE, &html).map(|d| strip_label(d, "Enviado em "));

            let enviado_por = first_match(&PLAIN_RE, &html).map(|raw| {
                if data_enviado.is_none() {
                    data_enviado = first_match(&DATE_RE, &raw);
                }
                strip_prefix_and_date(&raw, "Enviado por ")
            });
            let recebido_por = first_match(&BOLD_RE, &html).map(|raw| {
                if data_recebido.is_none() {
                    data_recebido = first_match(&DATE_RE, &raw);
                }
                strip_prefix_and_date(&raw, "Recebido por ")
            });
            let guia = first_match(&GUIA_RE, &html)
                .map(|g| g.replace("Guia: ", "").replace("Nº ", "").trim().to_string());

            json!({
                "index": total - i,
                "guia": non_empty(guia),
                "recebido_por": non_empty(recebido_por),
                "data_recebido": non_empty(data_recebido),
                "enviado_por": non_empty(enviado_por),
                "data_enviado": non_empty(data_enviado),
            })
        })
        .collect();
    Some(Value::Array(deslocamentos))
}

fn extract_peticoes(doc: &ParsedDocument) -> Option<Value> {
    let items = doc.select_any(&["#peticoes .lista-dados", ".lista-dados"]);
    let total = items.len();
    let peticoes = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let html = item.inner_html();
            let (recebido_data, recebido_por) = match first_match(&RECEBIDO_EM_RE, &html) {
                Some(recebido) => match recebido.split_once(" por ") {
                    Some((data, por)) => (Some(data.trim().to_string()), Some(por.trim().to_string())),
                    None => (Some(recebido), None),
                },
                None => (None, None),
            };
            json!({
                "index": total - i,
                "data": non_empty(first_match(&PLAIN_RE, &html)),
                "tipo": non_empty(first_match(&BOLD_RE, &html)),
                "autor": Value::Null,
                "recebido_data": non_empty(recebido_data),
                "recebido_por": non_empty(recebido_por),
            })
        })
        .collect();
    Some(Value::Array(peticoes))
}

fn extract_sessao(doc: &ParsedDocument) -> Option<Value> {
    let scope = if doc.select("#sessao-virtual").is_empty() { "" } else { "#sessao-virtual " };
    Some(json!({
        "data": non_empty(doc.first_text(&format!("{scope}.processo-detalhes"))),
        "tipo": non_empty(doc.first_text(&format!("{scope}.processo-detalhes-bold"))),
        "numero": Value::Null,
        "relator": Value::Null,
        "status": Value::Null,
        "participantes": doc.texts(&format!("{scope}li")),
    }))
}

fn extract_informacoes(doc: &ParsedDocument) -> Option<Value> {
    let base = "#informacoes-completas > div:nth-of-type(2) > div:nth-of-type(1) > div:nth-of-type(2)";
    let assuntos = doc.texts("#informacoes-completas > div:nth-of-type(1) > div:nth-of-type(2) li");
    Some(json!({
        "assuntos": assuntos,
        "data_protocolo": non_empty(doc.first_text(&format!("{base} > div:nth-of-type(2)"))),
        "orgao_origem": non_empty(doc.first_text(&format!("{base} > div:nth-of-type(4)"))),
        "origem": non_empty(doc.first_text("#descricao-procedencia")),
        "numero_origem": non_empty(doc.first_text("#descricao-procedencia")),
    }))
}
