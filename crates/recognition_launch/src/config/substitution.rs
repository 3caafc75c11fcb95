//! Substitution engine for $(arg), $(env), $(find) patterns

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Regex for matching substitution patterns: $(type value)
static SUBSTITUTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\((\w+)\s+([^)]+)\)").unwrap());

/// Locate a package directory under the given roots.
///
/// Returns the first root that actually contains the package directory,
/// falling back to a lexical join with the first root so that dry runs
/// work on machines without the packages installed. Missing packages
/// then surface as spawn errors at launch time.
pub fn find_package_dir(roots: &[PathBuf], package: &str) -> Option<PathBuf> {
    for root in roots {
        let candidate = root.join(package);
        if candidate.is_dir() {
            return Some(candidate);
        }
    }
    roots.first().map(|root| root.join(package))
}

/// Substitution context containing all available variables
#[derive(Debug, Clone, Default)]
pub struct SubstitutionContext {
    /// Resolved launch arguments
    pub args: HashMap<String, String>,
    /// Environment variable overrides
    pub env: HashMap<String, String>,
    /// Roots searched by $(find package)
    pub package_roots: Vec<PathBuf>,
}

impl SubstitutionContext {
    /// Create a new substitution context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Add multiple arguments
    pub fn with_args(mut self, args: HashMap<String, String>) -> Self {
        self.args.extend(args);
        self
    }

    /// Add an environment variable override
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Add multiple environment variable overrides
    pub fn with_envs(mut self, envs: HashMap<String, String>) -> Self {
        self.env.extend(envs);
        self
    }

    /// Set the package roots searched by $(find)
    pub fn with_package_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.package_roots = roots;
        self
    }

    /// Substitute all patterns in a string
    pub fn substitute(&self, input: &str) -> Result<String, SubstitutionError> {
        let mut result = input.to_string();
        let mut last_result = String::new();

        // Iterate until no more substitutions are made (handles nested
        // references, e.g. an argument default that uses $(find ...))
        let max_iterations = 10;
        let mut iterations = 0;

        while result != last_result && iterations < max_iterations {
            last_result = result.clone();
            result = self.substitute_once(&result)?;
            iterations += 1;
        }

        if iterations >= max_iterations && result.contains("$(") {
            return Err(SubstitutionError::MaxIterationsExceeded(input.to_string()));
        }

        Ok(result)
    }

    /// Perform a single pass of substitution
    fn substitute_once(&self, input: &str) -> Result<String, SubstitutionError> {
        let mut error: Option<SubstitutionError> = None;

        let result = SUBSTITUTION_PATTERN.replace_all(input, |caps: &Captures| {
            if error.is_some() {
                return String::new();
            }

            match self.resolve_capture(caps) {
                Ok(value) => value,
                Err(e) => {
                    error = Some(e);
                    String::new()
                }
            }
        });

        if let Some(e) = error {
            return Err(e);
        }

        Ok(result.into_owned())
    }

    /// Resolve a single capture group
    fn resolve_capture(&self, caps: &Captures) -> Result<String, SubstitutionError> {
        if let (Some(subst_type), Some(value)) = (caps.get(1), caps.get(2)) {
            return self.resolve_typed(subst_type.as_str(), value.as_str().trim());
        }

        Err(SubstitutionError::InvalidPattern(
            caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default(),
        ))
    }

    /// Resolve a typed substitution
    fn resolve_typed(&self, subst_type: &str, value: &str) -> Result<String, SubstitutionError> {
        match subst_type {
            "arg" => self.resolve_arg(value),
            "env" => self.resolve_env(value),
            "find" => self.resolve_find(value),
            _ => Err(SubstitutionError::UnknownType(subst_type.to_string())),
        }
    }

    /// Resolve an argument reference
    fn resolve_arg(&self, name: &str) -> Result<String, SubstitutionError> {
        self.args
            .get(name)
            .cloned()
            .ok_or_else(|| SubstitutionError::UndefinedArg(name.to_string()))
    }

    /// Resolve an environment variable reference
    fn resolve_env(&self, name: &str) -> Result<String, SubstitutionError> {
        // Local overrides take precedence over the system environment
        if let Some(value) = self.env.get(name) {
            return Ok(value.clone());
        }

        std::env::var(name).map_err(|_| SubstitutionError::UndefinedEnv(name.to_string()))
    }

    /// Resolve a package directory reference
    fn resolve_find(&self, package: &str) -> Result<String, SubstitutionError> {
        find_package_dir(&self.package_roots, package)
            .map(|dir| dir.to_string_lossy().into_owned())
            .ok_or_else(|| SubstitutionError::NoPackageRoots(package.to_string()))
    }
}

/// Errors that can occur during substitution
#[derive(Debug, thiserror::Error)]
pub enum SubstitutionError {
    #[error("Unknown substitution type: {0}")]
    UnknownType(String),

    #[error("Undefined argument: {0}")]
    UndefinedArg(String),

    #[error("Undefined environment variable: {0}")]
    UndefinedEnv(String),

    #[error("Cannot resolve $(find {0}): no package roots configured")]
    NoPackageRoots(String),

    #[error("Invalid substitution pattern: {0}")]
    InvalidPattern(String),

    #[error("Maximum substitution iterations exceeded for: {0}")]
    MaxIterationsExceeded(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_substitution() {
        let ctx = SubstitutionContext::new().with_arg("face_detection", "true");

        let result = ctx.substitute("$(arg face_detection)").unwrap();
        assert_eq!(result, "true");
    }

    #[test]
    fn test_env_substitution() {
        let ctx = SubstitutionContext::new().with_env("MY_VAR", "my_value");

        let result = ctx.substitute("$(env MY_VAR)").unwrap();
        assert_eq!(result, "my_value");
    }

    #[test]
    fn test_find_substitution_existing_dir() {
        let root = std::env::temp_dir().join("recognition_launch_find_test");
        let pkg_dir = root.join("face_recognition_pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();

        let ctx = SubstitutionContext::new().with_package_roots(vec![root]);
        let result = ctx.substitute("$(find face_recognition_pkg)/faces").unwrap();
        assert_eq!(result, format!("{}/faces", pkg_dir.display()));
    }

    #[test]
    fn test_find_substitution_falls_back_to_first_root() {
        let ctx = SubstitutionContext::new()
            .with_package_roots(vec![PathBuf::from("/opt/packages")]);

        let result = ctx.substitute("$(find not_installed)").unwrap();
        assert_eq!(result, "/opt/packages/not_installed");
    }

    #[test]
    fn test_find_without_roots_is_an_error() {
        let ctx = SubstitutionContext::new();

        let result = ctx.substitute("$(find anything)");
        assert!(matches!(result, Err(SubstitutionError::NoPackageRoots(_))));
    }

    #[test]
    fn test_undefined_arg_error() {
        let ctx = SubstitutionContext::new();

        let result = ctx.substitute("$(arg undefined)");
        assert!(result.is_err());
    }

    #[test]
    fn test_nested_substitution() {
        let ctx = SubstitutionContext::new()
            .with_arg("outer", "$(arg inner)")
            .with_arg("inner", "resolved");

        let result = ctx.substitute("$(arg outer)").unwrap();
        assert_eq!(result, "resolved");
    }

    #[test]
    fn test_no_substitution_needed() {
        let ctx = SubstitutionContext::new();

        let result = ctx.substitute("plain string").unwrap();
        assert_eq!(result, "plain string");
    }
}
