use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CcdError, Result};
use crate::header::{Header, HeaderValue};

/// Builds the header of an output from the header of a source frame.
pub trait HeaderTemplate: Send + Sync {
    fn render(&self, source: &Header) -> Result<Header>;
}

/// Header layout for one instrument.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentTemplate {
    /// Keywords copied from the source when present.
    #[serde(default)]
    pub keep: Vec<String>,
    /// Fixed cards set on every output.
    #[serde(default)]
    pub cards: BTreeMap<String, HeaderValue>,
}

impl HeaderTemplate for InstrumentTemplate {
    fn render(&self, source: &Header) -> Result<Header> {
        let mut header = Header::new();
        for key in &self.keep {
            if let Some(value) = source.get(key) {
                header.insert(key, value.clone());
            }
        }
        for (key, value) in &self.cards {
            header.insert(key, value.clone());
        }
        Ok(header)
    }
}

/// Per-instrument templates, chosen by the source's INSTRUME keyword with
/// a `default` entry as fallback.
///
/// ```toml
/// [instruments.default]
/// keep = ["OBJECT", "FILTER", "EXPTIME"]
///
/// [instruments.Mexman.cards]
/// TELESCOP = "Mexman"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateSet {
    #[serde(default)]
    pub instruments: BTreeMap<String, InstrumentTemplate>,
}

pub const DEFAULT_INSTRUMENT: &str = "default";

impl TemplateSet {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| CcdError::Config(format!("invalid template set: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn select(&self, source: &Header) -> Result<&InstrumentTemplate> {
        let instrument = source.get_str("INSTRUME").map(str::trim);
        if let Some(t) = instrument.and_then(|name| self.instruments.get(name)) {
            return Ok(t);
        }
        debug!(instrument = ?instrument, "Falling back to default template");
        self.instruments.get(DEFAULT_INSTRUMENT).ok_or_else(|| {
            CcdError::Config(format!(
                "no header template for instrument {} and no default",
                instrument.unwrap_or("<unset>")
            ))
        })
    }
}

impl HeaderTemplate for TemplateSet {
    fn render(&self, source: &Header) -> Result<Header> {
        self.select(source)?.render(source)
    }
}
