//! Normalization and validation cost for a large case record
//!
//! A busy case has hundreds of andamentos; this keeps the output stage
//! cheap relative to the network.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde_json::{Value, json};

use docket_harvest::crawling::normalizer::normalize;
use docket_harvest::crawling::validator::{RecordValidator, flatten_for_storage};
use docket_harvest::domain::{CaseClass, CaseRecord, CaseRequest, CorrelationId, OutputTemplate};

fn large_record(andamentos: usize) -> Value {
    let items: Vec<Value> = (0..andamentos)
        .map(|i| {
            json!({
                "julgador": null,
                "link": format!("https://portal.example/processos/downloadPeca.asp?id={i}"),
                "complemento": "Publicação no DJE",
                "nome": "Juntada",
                "data": "01/02/2024",
                "index": andamentos - i
            })
        })
        .collect();
    json!({
        "extraido": "2024-02-01T00:00:00.000000Z",
        "andamentos": items,
        "partes": [{"_index": 1, "nome": "UNIÃO", "tipo": "REQTE.(S)"}],
        "relator": "MIN. FULANO",
        "processo_id": 4000,
        "incidente": 5000000,
        "classe": "ADI",
        "liminar": ["Medida Liminar"]
    })
}

fn bench_normalize(c: &mut Criterion) {
    let template = OutputTemplate::case_record();
    let value = large_record(500);

    c.bench_function("normalize_500_andamentos", |b| {
        b.iter(|| normalize(black_box(&value), template.as_value()));
    });

    let Value::Object(fields) = value else { return };
    c.bench_function("validate_and_flatten_500_andamentos", |b| {
        b.iter(|| {
            let record = CaseRecord::from_fields(
                CaseRequest::new(CaseClass::Adi, 4000),
                CorrelationId::new(5_000_000),
                black_box(fields.clone()),
            );
            let (record, _) = RecordValidator::new().validate(record);
            flatten_for_storage(&record)
        });
    });
}

criterion_group!(benches, bench_normalize);
criterion_main!(benches);
