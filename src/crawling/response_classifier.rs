//! Response classification
//!
//! Primary documents are checked for anti-automation pages before anything
//! else happens. Section fragments are checked for status, error text, size
//! and structure; a bad fragment fails its section, never the case.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::record::SectionFailure;
use crate::infrastructure::http_client::HttpResponse;

/// Known block pages, matched as substrings of the body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockSignature {
    BotChallenge,
    AccessDenied,
    GatewayFailure,
}

impl BlockSignature {
    pub const ALL: [Self; 3] = [Self::BotChallenge, Self::AccessDenied, Self::GatewayFailure];

    pub const fn marker(self) -> &'static str {
        match self {
            Self::BotChallenge => "CAPTCHA",
            Self::AccessDenied => "403 Forbidden",
            Self::GatewayFailure => "502 Bad Gateway",
        }
    }
}

impl fmt::Display for BlockSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BotChallenge => "bot challenge",
            Self::AccessDenied => "access denied",
            Self::GatewayFailure => "upstream gateway failure",
        };
        write!(f, "{label} ({})", self.marker())
    }
}

/// Error pages that are not blocks but still make a fragment useless
const ERROR_SIGNATURES: &[&str] = &["Internal Server Error", "Service Unavailable", "Runtime Error"];

/// First block signature found in the body
pub fn detect_block(body: &str) -> Option<BlockSignature> {
    BlockSignature::ALL
        .into_iter()
        .find(|signature| body.contains(signature.marker()))
}

/// Decide whether a section fragment is usable.
///
/// `markers` is a list of alternatives: at least one must appear in the
/// body. An empty list disables the structural check, for sections that
/// may legitimately render no items.
pub fn classify_section(response: &HttpResponse, min_body_bytes: usize, markers: &[&str]) -> Result<(), SectionFailure> {
    if !response.is_success() {
        return Err(SectionFailure::HttpStatus(response.status));
    }
    if let Some(signature) = detect_block(&response.body) {
        return Err(SectionFailure::ErrorSignature(signature.marker().to_string()));
    }
    if let Some(found) = ERROR_SIGNATURES.iter().find(|s| response.body.contains(*s)) {
        return Err(SectionFailure::ErrorSignature((*found).to_string()));
    }

    let size = response.body.trim().len();
    if size < min_body_bytes {
        return Err(SectionFailure::BodyTooShort(size));
    }
    if !markers.is_empty() && !markers.iter().any(|m| response.body.contains(m)) {
        return Err(SectionFailure::MissingMarkers);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const FRAGMENT: &str = r#"<div class="processo-partes"><div class="nome-parte">UNIÃO</div></div>"#;

    #[rstest]
    #[case("<html>Please solve the CAPTCHA</html>", Some(BlockSignature::BotChallenge))]
    #[case("<h1>403 Forbidden</h1>", Some(BlockSignature::AccessDenied))]
    #[case("<title>502 Bad Gateway</title>", Some(BlockSignature::GatewayFailure))]
    #[case("<div id=\"incidente\" value=\"1\"></div>", None)]
    fn test_detect_block(#[case] body: &str, #[case] expected: Option<BlockSignature>) {
        assert_eq!(detect_block(body), expected);
    }

    #[test]
    fn test_good_fragment_passes() {
        let response = HttpResponse::new("u", 200, FRAGMENT);
        assert_eq!(classify_section(&response, 32, &["processo-partes"]), Ok(()));
    }

    #[test]
    fn test_section_failures() {
        let status = HttpResponse::new("u", 500, FRAGMENT);
        assert_eq!(classify_section(&status, 32, &[]), Err(SectionFailure::HttpStatus(500)));

        let blocked = HttpResponse::new("u", 200, format!("{FRAGMENT} CAPTCHA"));
        assert_eq!(
            classify_section(&blocked, 32, &[]),
            Err(SectionFailure::ErrorSignature("CAPTCHA".into()))
        );

        let short = HttpResponse::new("u", 200, "  <p></p>  ");
        assert_eq!(classify_section(&short, 32, &[]), Err(SectionFailure::BodyTooShort(7)));

        let unstructured = HttpResponse::new("u", 200, "x".repeat(64));
        assert_eq!(
            classify_section(&unstructured, 32, &["processo-partes"]),
            Err(SectionFailure::MissingMarkers)
        );
    }
}
