//! Global parameter namespace
//!
//! Parameters live in a slash-separated tree. The external parameter file
//! is merged wholesale at the root before any node starts; each node's
//! scoped parameters live under `/<node_name>/<key>`. The full namespace
//! snapshot is handed to every child through the `LAUNCH_PARAMS`
//! environment variable.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A parameter value, mirroring what YAML can express
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ParamValue>),
    Map(IndexMap<String, ParamValue>),
}

impl ParamValue {
    /// Parse a scalar from its string form, the same coercion rules
    /// launch arguments use
    pub fn from_literal(s: &str) -> Self {
        if s.eq_ignore_ascii_case("true") {
            return ParamValue::Bool(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return ParamValue::Bool(false);
        }
        if let Ok(i) = s.parse::<i64>() {
            return ParamValue::Int(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return ParamValue::Float(f);
        }
        ParamValue::String(s.to_string())
    }

    /// String form suitable for a command-line argument
    pub fn to_literal(&self) -> String {
        match self {
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::String(s) => s.clone(),
            other => serde_yaml::to_string(other)
                .map(|s| s.trim_end().to_string())
                .unwrap_or_default(),
        }
    }
}

/// In-launcher parameter server
#[derive(Debug, Clone, Default)]
pub struct ParamServer {
    root: IndexMap<String, ParamValue>,
}

impl ParamServer {
    /// Create an empty namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge every top-level entry of a YAML parameter file into the
    /// root namespace. Returns the number of entries merged.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize, ParamError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ParamError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        self.load_yaml(&content)
    }

    /// Merge a YAML mapping into the root namespace
    pub fn load_yaml(&mut self, content: &str) -> Result<usize, ParamError> {
        let value: ParamValue = serde_yaml::from_str(content)?;
        let ParamValue::Map(entries) = value else {
            return Err(ParamError::NotAMapping);
        };

        let count = entries.len();
        for (key, value) in entries {
            self.root.insert(key, value);
        }
        Ok(count)
    }

    /// Set a value at a slash-separated path, creating intermediate
    /// namespaces as needed
    pub fn set(&mut self, path: &str, value: ParamValue) {
        let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
        let mut current = &mut self.root;

        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                current.insert(segment.to_string(), value);
                return;
            }

            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| ParamValue::Map(IndexMap::new()));
            // a scalar on the path is replaced by a namespace
            if !matches!(entry, ParamValue::Map(_)) {
                *entry = ParamValue::Map(IndexMap::new());
            }
            let ParamValue::Map(map) = entry else { unreachable!() };
            current = map;
        }
    }

    /// Set a parameter in a node's namespace
    pub fn set_scoped(&mut self, node: &str, key: &str, value: ParamValue) {
        self.set(&format!("{}/{}", node, key), value);
    }

    /// Look up a value at a slash-separated path
    pub fn get(&self, path: &str) -> Option<&ParamValue> {
        let mut current = &self.root;
        let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();

        while let Some(segment) = segments.next() {
            let value = current.get(segment)?;
            if segments.peek().is_none() {
                return Some(value);
            }
            let ParamValue::Map(map) = value else {
                return None;
            };
            current = map;
        }

        None
    }

    /// Number of top-level entries
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// Whether the namespace is empty
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Serialize the full namespace to YAML
    pub fn to_yaml(&self) -> Result<String, ParamError> {
        Ok(serde_yaml::to_string(&self.root)?)
    }
}

/// Errors that can occur in the parameter namespace
#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    #[error("Failed to read parameter file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parameter YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Parameter file must contain a top-level mapping")]
    NotAMapping,
}
