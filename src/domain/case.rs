//! Case identity types
//!
//! A case is addressed externally by its class code and number, and
//! internally (once the primary document has been read) by its
//! correlation id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

macro_rules! case_classes {
    ($($variant:ident => $code:literal,)+) => {
        /// Closed set of portal class codes.
        ///
        /// Validated once at the configuration boundary; everything past
        /// that point works with the enum and never re-checks strings.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum CaseClass {
            $($variant,)+
        }

        impl CaseClass {
            pub const ALL: &'static [CaseClass] = &[$(CaseClass::$variant,)+];

            /// Canonical portal spelling (mixed case for some codes, e.g. `AImp`)
            pub const fn code(self) -> &'static str {
                match self {
                    $(CaseClass::$variant => $code,)+
                }
            }
        }
    };
}

case_classes! {
    Ac => "AC",
    Aco => "ACO",
    Adc => "ADC",
    Adi => "ADI",
    Ado => "ADO",
    Adpf => "ADPF",
    Ai => "AI",
    AImp => "AImp",
    Ao => "AO",
    Aoe => "AOE",
    Ap => "AP",
    Ar => "AR",
    Are => "ARE",
    As => "AS",
    Cc => "CC",
    Cm => "Cm",
    Ei => "EI",
    El => "EL",
    Ep => "EP",
    Ext => "Ext",
    Hc => "HC",
    Hd => "HD",
    If => "IF",
    Inq => "Inq",
    Mi => "MI",
    Ms => "MS",
    Padm => "PADM",
    Pet => "Pet",
    Ppe => "PPE",
    Psv => "PSV",
    Rc => "RC",
    Rcl => "Rcl",
    Re => "RE",
    Rhc => "RHC",
    Rhd => "RHD",
    Rmi => "RMI",
    Rms => "RMS",
    RvC => "RvC",
    Se => "SE",
    Sirdr => "SIRDR",
    Sl => "SL",
    Ss => "SS",
    Sta => "STA",
    Stp => "STP",
    Tpa => "TPA",
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown case class code: {0:?}")]
pub struct UnknownCaseClass(pub String);

impl FromStr for CaseClass {
    type Err = UnknownCaseClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(exact) = Self::ALL.iter().find(|c| c.code() == trimmed) {
            return Ok(*exact);
        }
        // "AIMP" / "aimp" still resolve to AImp; codes never collide case-insensitively
        Self::ALL
            .iter()
            .find(|c| c.code().eq_ignore_ascii_case(trimmed))
            .copied()
            .ok_or_else(|| UnknownCaseClass(s.to_string()))
    }
}

impl TryFrom<String> for CaseClass {
    type Error = UnknownCaseClass;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CaseClass> for String {
    fn from(value: CaseClass) -> Self {
        value.code().to_string()
    }
}

impl fmt::Display for CaseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One unit of requested work. Immutable input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseRequest {
    pub class: CaseClass,
    pub number: u64,
}

impl CaseRequest {
    pub const fn new(class: CaseClass, number: u64) -> Self {
        Self { class, number }
    }

    /// Build one request per number, all sharing a class
    pub fn batch(class: CaseClass, numbers: &[u64]) -> Vec<Self> {
        numbers.iter().map(|&n| Self::new(class, n)).collect()
    }

    pub fn primary_url(&self, base_url: &str) -> String {
        format!(
            "{}/processos/listarProcessos.asp?classe={}&numeroProcesso={}",
            base_url.trim_end_matches('/'),
            self.class.code(),
            self.number
        )
    }
}

impl fmt::Display for CaseRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.class, self.number)
    }
}

/// Portal-internal identifier resolved from the primary document.
/// Zero is never a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub const fn new(raw: u64) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    /// Parse raw page text; empty, zero or non-numeric input yields `None`
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<u64>().ok().and_then(Self::new)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
