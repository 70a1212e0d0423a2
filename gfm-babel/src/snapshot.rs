//! Example corpus harness
//!
//! Runs a corpus of Markdown examples through the engine and compares the
//! result with stored snapshots. An example file is a YAML mapping from
//! example name to its fields:
//!
//! ```yaml
//! 01_01_paragraph:
//!   markdown: |-
//!     Hello **world**
//!   html: |-
//!     <p>Hello <strong>world</strong></p>
//!   json:
//!     type: doc
//!     content: [...]
//! ```
//!
//! Every example must also survive a round trip: serializing the parsed tree
//! against itself gives back the Markdown unchanged. Rendered HTML comes from
//! an injected [`MarkdownRenderer`], which stands in for the application's
//! own renderer.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::formats::markdown::{deserialize, serialize, SerializerOptions};

/// One entry of the example corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleDefinition {
    #[serde(skip)]
    pub name: String,
    pub markdown: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML: {0}")]
    InvalidYaml(String),
    #[error("example '{name}': {message}")]
    InvalidExample { name: String, message: String },
}

/// Parse an example corpus, keeping the order of the file.
pub fn load_examples(yaml: &str) -> Result<Vec<ExampleDefinition>, SnapshotError> {
    let mapping: serde_yaml::Mapping =
        serde_yaml::from_str(yaml).map_err(|e| SnapshotError::InvalidYaml(e.to_string()))?;

    let mut examples = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let name = match key {
            serde_yaml::Value::String(name) => name,
            other => {
                return Err(SnapshotError::InvalidYaml(format!(
                    "example names must be strings, found {other:?}"
                )))
            }
        };
        let mut example: ExampleDefinition =
            serde_yaml::from_value(value).map_err(|e| SnapshotError::InvalidExample {
                name: name.clone(),
                message: e.to_string(),
            })?;
        example.name = name;
        examples.push(example);
    }
    Ok(examples)
}

/// Read and parse an example corpus file
pub fn load_examples_from_file(
    path: impl AsRef<Path>,
) -> Result<Vec<ExampleDefinition>, SnapshotError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_examples(&contents)
}

/// Renders Markdown to HTML for comparison with the stored snapshot
pub trait MarkdownRenderer {
    fn render(&self, markdown: &str) -> String;
}

/// Renderer backed by comrak with the GFM extensions enabled
#[derive(Debug, Clone, Copy, Default)]
pub struct ComrakRenderer;

impl MarkdownRenderer for ComrakRenderer {
    fn render(&self, markdown: &str) -> String {
        let mut options = comrak::ComrakOptions::default();
        options.extension.table = true;
        options.extension.strikethrough = true;
        options.extension.autolink = true;
        options.extension.tasklist = true;
        options.extension.footnotes = true;
        options.extension.front_matter_delimiter = Some("---".to_string());
        comrak::markdown_to_html(markdown, &options)
    }
}

/// What differed between the engine's output and the snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    Json { expected: Value, actual: Value },
    Html { expected: String, actual: String },
    RoundTrip { expected: String, actual: String },
}

impl Mismatch {
    pub fn kind(&self) -> &'static str {
        match self {
            Mismatch::Json { .. } => "json",
            Mismatch::Html { .. } => "html",
            Mismatch::RoundTrip { .. } => "roundtrip",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExampleStatus {
    Passed,
    Failed(Vec<Mismatch>),
    /// The engine could not process the example at all
    ImplementationError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExampleOutcome {
    pub name: String,
    pub status: ExampleStatus,
}

impl ExampleOutcome {
    pub fn passed(&self) -> bool {
        self.status == ExampleStatus::Passed
    }
}

/// Run one example: compare the document JSON and the rendered HTML with
/// the snapshot, and check that the Markdown passes through unchanged.
pub fn run_example(example: &ExampleDefinition, renderer: &dyn MarkdownRenderer) -> ExampleOutcome {
    let outcome = |status| ExampleOutcome {
        name: example.name.clone(),
        status,
    };

    let doc = match deserialize(&example.markdown) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::warn!(example = %example.name, error = %err, "example failed to parse");
            return outcome(ExampleStatus::ImplementationError(err.to_string()));
        }
    };

    let mut mismatches = Vec::new();

    if let Some(expected) = &example.json {
        let actual = doc.to_json();
        if &actual != expected {
            mismatches.push(Mismatch::Json {
                expected: expected.clone(),
                actual,
            });
        }
    }

    if let Some(expected) = &example.html {
        let actual = renderer.render(&example.markdown);
        if actual.trim_end() != expected.trim_end() {
            mismatches.push(Mismatch::Html {
                expected: expected.clone(),
                actual,
            });
        }
    }

    match serialize(&doc, Some(&doc), &SerializerOptions::default()) {
        Ok(actual) => {
            let expected = example.markdown.trim_end();
            if actual != expected {
                mismatches.push(Mismatch::RoundTrip {
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        Err(err) => return outcome(ExampleStatus::ImplementationError(err.to_string())),
    }

    if mismatches.is_empty() {
        tracing::debug!(example = %example.name, "example passed");
        outcome(ExampleStatus::Passed)
    } else {
        tracing::debug!(
            example = %example.name,
            failures = mismatches.len(),
            "example differs from its snapshot"
        );
        outcome(ExampleStatus::Failed(mismatches))
    }
}

/// Run every example in order
pub fn run_examples(
    examples: &[ExampleDefinition],
    renderer: &dyn MarkdownRenderer,
) -> Vec<ExampleOutcome> {
    examples
        .iter()
        .map(|example| run_example(example, renderer))
        .collect()
}
