//! Output file naming

use std::path::{Path, PathBuf};

use crate::domain::case::CaseClass;

const MAX_STEM_LEN: usize = 200;
const SHOWN_WHEN_TRUNCATED: usize = 5;

/// File stem shared by all file sinks of a run.
///
/// `custom_name` wins; otherwise `{class}_{n1}_{n2}...`, shortened to the
/// first five numbers plus `_and_{k}_more` past 200 characters.
pub fn output_stem(class: CaseClass, numbers: &[u64], custom_name: Option<&str>) -> String {
    if let Some(name) = custom_name.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    if numbers.is_empty() {
        return format!("{class}_processos");
    }

    let joined = join_numbers(numbers);
    let full = format!("{class}_{joined}");
    if full.len() <= MAX_STEM_LEN {
        return full;
    }

    let shown = &numbers[..SHOWN_WHEN_TRUNCATED.min(numbers.len())];
    let remaining = numbers.len().saturating_sub(shown.len());
    let mut stem = format!("{class}_{}", join_numbers(shown));
    if remaining > 0 {
        stem.push_str(&format!("_and_{remaining}_more"));
    }
    stem
}

pub fn output_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    dir.join(format!("{stem}.{extension}"))
}

fn join_numbers(numbers: &[u64]) -> String {
    numbers.iter().map(u64::to_string).collect::<Vec<_>>().join("_")
}
