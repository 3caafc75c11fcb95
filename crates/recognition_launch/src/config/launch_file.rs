//! Launch descriptor YAML schema definitions

use crate::params::ParamValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root launch descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchFile {
    /// Descriptor format version
    #[serde(default = "default_version")]
    pub version: String,

    /// External parameter file loaded wholesale into the global
    /// parameter namespace before any node starts
    #[serde(default)]
    pub params_file: Option<String>,

    /// Argument definitions with defaults
    #[serde(default)]
    pub args: IndexMap<String, ArgDefinition>,

    /// Environment variables (applied to all nodes)
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Node definitions (ordered map, declaration order is launch order)
    pub nodes: IndexMap<String, NodeConfig>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Argument definition with default value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgDefinition {
    /// Default value, used when the invoker supplies no override
    pub default: ArgValue,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

/// Argument values can be strings, booleans, or numbers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ArgValue {
    /// Convert to string representation
    pub fn as_str(&self) -> String {
        match self {
            ArgValue::Bool(b) => b.to_string(),
            ArgValue::Int(i) => i.to_string(),
            ArgValue::Float(f) => f.to_string(),
            ArgValue::String(s) => s.clone(),
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("true") {
            return ArgValue::Bool(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return ArgValue::Bool(false);
        }
        if let Ok(i) = s.parse::<i64>() {
            return ArgValue::Int(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return ArgValue::Float(f);
        }
        ArgValue::String(s.to_string())
    }

    /// Check if value is truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            ArgValue::Bool(b) => *b,
            ArgValue::Int(i) => *i != 0,
            ArgValue::Float(f) => *f != 0.0,
            ArgValue::String(s) => {
                !s.is_empty()
                    && !s.eq_ignore_ascii_case("false")
                    && !s.eq_ignore_ascii_case("0")
                    && !s.eq_ignore_ascii_case("no")
            }
        }
    }
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Package directory name, resolved against the configured
    /// package roots. Requires `executable`.
    #[serde(default)]
    pub package: Option<String>,

    /// Program file inside the package directory
    #[serde(default)]
    pub executable: Option<String>,

    /// Direct command path (for programs outside any package)
    /// Mutually exclusive with `package`/`executable`
    #[serde(default)]
    pub command: Option<String>,

    /// Where child stdout/stderr goes
    #[serde(default)]
    pub output: OutputMode,

    /// Scoped parameters delivered to this node's namespace
    #[serde(default)]
    pub params: IndexMap<String, ParamValue>,

    /// Environment variables specific to this node
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory for the process
    #[serde(default)]
    pub working_dir: Option<String>,

    /// Whether the node is instantiated at all.
    /// Can be a boolean or a substitution string like "$(arg face_detection)"
    #[serde(default = "default_enabled")]
    pub enabled: EnabledValue,
}

fn default_enabled() -> EnabledValue {
    EnabledValue::Bool(true)
}

/// Output routing mode for a node's stdout/stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Forward each line through the launcher's own log
    Screen,
    /// Append lines to a per-node file in the session log directory
    #[default]
    Log,
}

/// Enabled value can be a direct boolean or a substitution string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnabledValue {
    Bool(bool),
    String(String),
}

impl LaunchFile {
    /// Load a launch descriptor from a YAML file
    pub fn from_file(path: &str) -> Result<Self, LaunchFileError> {
        let content = std::fs::read_to_string(path).map_err(|e| LaunchFileError::Io {
            path: path.to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a launch descriptor from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, LaunchFileError> {
        let launch_file: LaunchFile =
            serde_yaml::from_str(content).map_err(LaunchFileError::Parse)?;
        launch_file.validate()?;
        Ok(launch_file)
    }

    /// Validate the descriptor structure
    pub fn validate(&self) -> Result<(), LaunchFileError> {
        for (name, node) in &self.nodes {
            match (&node.package, &node.executable, &node.command) {
                (Some(_), Some(_), None) => {} // package + executable: OK
                (None, None, Some(_)) => {}    // command: OK
                (Some(_), None, None) => {
                    return Err(LaunchFileError::Validation(format!(
                        "Node '{}': 'package' requires 'executable' to be specified",
                        name
                    )));
                }
                (None, Some(_), None) => {
                    return Err(LaunchFileError::Validation(format!(
                        "Node '{}': 'executable' requires 'package' to be specified",
                        name
                    )));
                }
                (Some(_), _, Some(_)) | (_, Some(_), Some(_)) => {
                    return Err(LaunchFileError::Validation(format!(
                        "Node '{}': cannot specify both 'package'/'executable' and 'command'",
                        name
                    )));
                }
                (None, None, None) => {
                    return Err(LaunchFileError::Validation(format!(
                        "Node '{}': must specify either 'package'+'executable' or 'command'",
                        name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Errors that can occur when loading a launch descriptor
#[derive(Debug, thiserror::Error)]
pub enum LaunchFileError {
    #[error("Failed to read launch file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse launch file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recognition_descriptor() {
        let yaml = r#"
version: "1.0"
params_file: params/recognition.yaml
args:
  face_detection:
    default: false
nodes:
  face_recognition_node:
    package: face_recognition_pkg
    executable: face_recognition_node.py
    output: screen
    enabled: "$(arg face_detection)"
    params:
      target_face_folder: "/data/faces"
  gazebo_recognition_node:
    package: gazebo_recognition
    executable: gazebo_recognition_node.py
    output: screen
    params:
      face_detection: "$(arg face_detection)"
"#;
        let launch_file = LaunchFile::from_yaml(yaml).unwrap();
        assert_eq!(launch_file.nodes.len(), 2);
        assert_eq!(launch_file.params_file.as_deref(), Some("params/recognition.yaml"));
        // declaration order is preserved
        let names: Vec<_> = launch_file.nodes.keys().collect();
        assert_eq!(names, vec!["face_recognition_node", "gazebo_recognition_node"]);

        let gazebo = &launch_file.nodes["gazebo_recognition_node"];
        assert_eq!(gazebo.output, OutputMode::Screen);
        assert_eq!(gazebo.params.len(), 1);
    }

    #[test]
    fn test_arg_value_parsing() {
        assert!(matches!(ArgValue::from_str("true"), ArgValue::Bool(true)));
        assert!(matches!(ArgValue::from_str("false"), ArgValue::Bool(false)));
        assert!(matches!(ArgValue::from_str("42"), ArgValue::Int(42)));
        assert!(matches!(ArgValue::from_str("3.14"), ArgValue::Float(_)));
        assert!(matches!(ArgValue::from_str("hello"), ArgValue::String(_)));
    }

    #[test]
    fn test_output_mode_defaults_to_log() {
        let yaml = r#"
nodes:
  quiet:
    command: "bin/quiet"
"#;
        let launch_file = LaunchFile::from_yaml(yaml).unwrap();
        assert_eq!(launch_file.nodes["quiet"].output, OutputMode::Log);
    }

    #[test]
    fn test_validation_missing_executable() {
        let yaml = r#"
nodes:
  bad_node:
    package: some_package
"#;
        let result = LaunchFile::from_yaml(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_command_and_package_conflict() {
        let yaml = r#"
nodes:
  bad_node:
    package: some_package
    executable: run.py
    command: "bin/run"
"#;
        let result = LaunchFile::from_yaml(yaml);
        assert!(matches!(result, Err(LaunchFileError::Validation(_))));
    }
}
