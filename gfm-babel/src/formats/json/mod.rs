//! Canonical JSON format
//!
//! Reads and writes the `{type, attrs, content}` shape of
//! [`Document::to_json`]. Source maps survive the trip, so a document loaded
//! from JSON still passes unchanged nodes through the Markdown serializer.

use std::collections::HashMap;

use crate::error::FormatError;
use crate::format::{flag, Format};
use crate::model::Document;

pub struct JsonFormat;

impl Format for JsonFormat {
    fn name(&self) -> &str {
        "json"
    }

    fn description(&self) -> &str {
        "Canonical JSON document tree"
    }

    fn file_extensions(&self) -> &[&str] {
        &["json"]
    }

    fn supports_parsing(&self) -> bool {
        true
    }

    fn supports_serialization(&self) -> bool {
        true
    }

    fn parse(&self, source: &str) -> Result<Document, FormatError> {
        let value: serde_json::Value = serde_json::from_str(source)
            .map_err(|e| crate::error::ParseError::InvalidJson(e.to_string()))?;
        Ok(Document::from_json(&value)?)
    }

    fn serialize(&self, doc: &Document) -> Result<String, FormatError> {
        to_string(doc, true)
    }

    fn serialize_with_options(
        &self,
        doc: &Document,
        options: &HashMap<String, String>,
    ) -> Result<String, FormatError> {
        if let Some(key) = options.keys().find(|key| key.as_str() != "pretty") {
            return Err(FormatError::NotSupported(format!(
                "JSON does not take a '{key}' parameter"
            )));
        }
        to_string(doc, flag(options, "pretty").unwrap_or(true))
    }
}

fn to_string(doc: &Document, pretty: bool) -> Result<String, FormatError> {
    let value = doc.to_json();
    let text = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    text.map_err(|e| FormatError::SerializationError(format!("JSON serialization failed: {e}")))
}
