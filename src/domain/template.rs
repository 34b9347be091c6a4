//! Canonical output key order

use once_cell::sync::Lazy;
use serde_json::{Value, json};
use std::sync::Arc;

/// Nested key order. Objects give key order; a one-element
/// list holding an object gives the order for every element of a list field.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTemplate(Arc<Value>);

static CASE_TEMPLATE: Lazy<Value> = Lazy::new(|| {
    json!({
        "incidente": null,
        "classe": null,
        "processo_id": null,
        "numero_unico": null,
        "meio": null,
        "publicidade": null,
        "badges": [],
        "liminar": null,
        "assuntos": [],
        "data_protocolo": null,
        "orgao_origem": null,
        "origem": null,
        "numero_origem": [],
        "volumes": null,
        "folhas": null,
        "apensos": null,
        "relator": null,
        "primeiro_autor": null,
        "partes": [{"index": null, "tipo": null, "nome": null}],
        "andamentos": [{
            "index_num": null,
            "data": null,
            "nome": null,
            "complemento": null,
            "link_descricao": null,
            "link": null,
            "julgador": null
        }],
        "decisoes": [{
            "index_num": null,
            "data": null,
            "nome": null,
            "complemento": null,
            "julgador": null,
            "link": null
        }],
        "sessao_virtual": [{
            "data": null,
            "tipo": null,
            "numero": null,
            "relator": null,
            "status": null,
            "participantes": []
        }],
        "deslocamentos": [{
            "index_num": null,
            "guia": null,
            "recebido_por": null,
            "data_recebido": null,
            "enviado_por": null,
            "data_enviado": null
        }],
        "peticoes": [{
            "index": null,
            "data": null,
            "tipo": null,
            "autor": null,
            "recebido_data": null,
            "recebido_por": null
        }],
        "recursos": [{
            "index_num": null,
            "data": null,
            "nome": null,
            "julgador": null,
            "complemento": null,
            "autor": null
        }],
        "pautas": [{
            "index_num": null,
            "data": null,
            "nome": null,
            "complemento": null,
            "relator": null
        }],
        "status": null,
        "extraido": null,
        "html": null
    })
});

impl OutputTemplate {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(value))
    }

    /// Process-wide template for case records
    pub fn case_record() -> Self {
        Self::new(CASE_TEMPLATE.clone())
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Top-level keys in template order
    pub fn top_level_keys(&self) -> Vec<&str> {
        self.0
            .as_object()
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

impl Default for OutputTemplate {
    fn default() -> Self {
        Self::case_record()
    }
}
