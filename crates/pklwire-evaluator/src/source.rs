//! Module sources handed to an evaluator.

use std::path::Path;

use url::Url;

use crate::error::{EvaluatorError, Result};

/// URI used for modules given as inline text.
pub const REPL_TEXT_URI: &str = "repl:text";

/// What to evaluate: a module URI, optionally with its text inline.
///
/// Without inline contents Pkl resolves the URI itself, consulting client
/// module readers for custom schemes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    uri: String,
    contents: Option<String>,
}

impl ModuleSource {
    /// A file on disk. Relative paths are resolved against the working directory.
    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let absolute = std::path::absolute(path)?;
        let url = Url::from_file_path(&absolute)
            .map_err(|()| EvaluatorError::InvalidPath(absolute.clone()))?;
        Ok(Self {
            uri: url.to_string(),
            contents: None,
        })
    }

    /// Inline module text, evaluated as `repl:text`.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            uri: REPL_TEXT_URI.to_string(),
            contents: Some(text.into()),
        }
    }

    /// Any absolute URI, e.g. `https://example.com/config.pkl`.
    pub fn uri(uri: &str) -> Result<Self> {
        let url = Url::parse(uri)?;
        Ok(Self {
            uri: url.to_string(),
            contents: None,
        })
    }

    pub fn module_uri(&self) -> &str {
        &self.uri
    }

    pub fn contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }
}
