//! Launch executor - argument resolution, planning, and orchestration
//!
//! Invariant: the external parameter file is merged into the parameter
//! namespace before any process is spawned, whatever the argument values.

use crate::config::{
    find_package_dir, ArgValue, EnabledValue, LaunchFile, NodeConfig, OutputMode,
    SubstitutionContext,
};
use crate::params::{ParamError, ParamServer, ParamValue};
use crate::runtime::process::{
    ManagedProcess, ProcessConfig, ProcessError, ProcessEvent, ProcessStatus,
};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Environment variable carrying the parameter namespace snapshot
pub const LAUNCH_PARAMS_ENV: &str = "LAUNCH_PARAMS";

/// Launch executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Project root directory
    pub project_root: PathBuf,
    /// Roots searched for package directories
    pub package_roots: Vec<PathBuf>,
    /// Default shutdown timeout per process
    pub shutdown_timeout: Duration,
    /// Session log directory (default: <project_root>/log/<timestamp>)
    pub log_dir: Option<PathBuf>,
}

impl ExecutorConfig {
    /// Build a config rooted at the given directory. Package roots come
    /// from the colon-separated `LAUNCH_PACKAGE_PATH` environment
    /// variable, falling back to the project root itself.
    pub fn from_project_root(project_root: PathBuf) -> Self {
        let package_roots = match std::env::var("LAUNCH_PACKAGE_PATH") {
            Ok(paths) => paths
                .split(':')
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect(),
            Err(_) => vec![project_root.clone()],
        };

        Self {
            project_root,
            package_roots,
            shutdown_timeout: Duration::from_secs(5),
            log_dir: None,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from_project_root(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

/// A fully resolved node, ready to spawn
#[derive(Debug, Clone)]
pub struct LaunchNode {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub output: OutputMode,
    /// Scoped parameters after substitution
    pub params: IndexMap<String, ParamValue>,
}

/// Launch plan for dry-run mode
#[derive(Debug)]
pub struct LaunchPlan {
    /// Enabled nodes in declaration order
    pub nodes: Vec<LaunchNode>,
    /// Resolved arguments
    pub args: HashMap<String, String>,
    /// External parameter file, loaded before any node starts
    pub params_file: Option<String>,
}

/// Launch executor state
pub struct Executor {
    config: ExecutorConfig,
    launch_file: LaunchFile,
    subst_ctx: SubstitutionContext,
    params: ParamServer,
    processes: IndexMap<String, ManagedProcess>,
    event_tx: mpsc::UnboundedSender<(String, ProcessEvent)>,
    event_rx: mpsc::UnboundedReceiver<(String, ProcessEvent)>,
}

impl Executor {
    /// Create a new executor.
    ///
    /// Seeds the substitution context with every declared argument's
    /// default, then applies `key:=value` overrides. Overriding an
    /// undeclared argument is an error.
    pub fn new(
        launch_file: LaunchFile,
        config: ExecutorConfig,
        arg_overrides: HashMap<String, String>,
    ) -> Result<Self, ExecutorError> {
        let mut args = HashMap::new();

        for (name, def) in &launch_file.args {
            args.insert(name.clone(), def.default.as_str());
        }

        for (name, value) in &arg_overrides {
            if !launch_file.args.contains_key(name) {
                return Err(ExecutorError::UnknownArgument(name.clone()));
            }
            args.insert(name.clone(), value.clone());
        }

        let subst_ctx = SubstitutionContext::new()
            .with_args(args)
            .with_envs(launch_file.env.clone())
            .with_package_roots(config.package_roots.clone());

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            launch_file,
            subst_ctx,
            params: ParamServer::new(),
            processes: IndexMap::new(),
            event_tx,
            event_rx,
        })
    }

    /// The parameter namespace (populated by `prepare`/`launch`)
    pub fn params(&self) -> &ParamServer {
        &self.params
    }

    /// Check whether a node is instantiated for this launch
    fn is_enabled(&self, name: &str, node: &NodeConfig) -> Result<bool, ExecutorError> {
        match &node.enabled {
            EnabledValue::Bool(b) => Ok(*b),
            EnabledValue::String(s) => {
                let resolved =
                    self.subst_ctx
                        .substitute(s)
                        .map_err(|e| ExecutorError::SubstitutionFailed {
                            context: format!("node '{}' enabled field", name),
                            source: e,
                        })?;
                Ok(ArgValue::from_str(&resolved).is_truthy())
            }
        }
    }

    /// Resolve a string with launch context attached to errors
    fn resolve(&self, input: &str, context: &str) -> Result<String, ExecutorError> {
        self.subst_ctx
            .substitute(input)
            .map_err(|e| ExecutorError::SubstitutionFailed {
                context: context.to_string(),
                source: e,
            })
    }

    /// Resolve a scoped parameter value. Strings go through the
    /// substitution engine and, when a substitution fired, are coerced
    /// back to a typed scalar so `"$(arg face_detection)"` arrives as a
    /// boolean, not the string "true".
    fn resolve_param(
        &self,
        value: &ParamValue,
        context: &str,
    ) -> Result<ParamValue, ExecutorError> {
        Ok(match value {
            ParamValue::String(s) => {
                let resolved = self.resolve(s, context)?;
                if resolved == *s {
                    ParamValue::String(resolved)
                } else {
                    ParamValue::from_literal(&resolved)
                }
            }
            ParamValue::List(items) => ParamValue::List(
                items
                    .iter()
                    .map(|item| self.resolve_param(item, context))
                    .collect::<Result<_, _>>()?,
            ),
            ParamValue::Map(map) => ParamValue::Map(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.resolve_param(v, context)?)))
                    .collect::<Result<IndexMap<_, _>, ExecutorError>>()?,
            ),
            other => other.clone(),
        })
    }

    /// Resolve the program path for a node
    fn resolve_program(&self, name: &str, node: &NodeConfig) -> Result<String, ExecutorError> {
        if let Some(command) = &node.command {
            return self.resolve(command, &format!("node '{}' command", name));
        }

        if let (Some(package), Some(executable)) = (&node.package, &node.executable) {
            let package = self.resolve(package, &format!("node '{}' package", name))?;
            let executable = self.resolve(executable, &format!("node '{}' executable", name))?;
            let package_dir = find_package_dir(&self.config.package_roots, &package)
                .ok_or_else(|| {
                    ExecutorError::InvalidNodeConfig(format!(
                        "Node '{}': no package roots to resolve package '{}'",
                        name, package
                    ))
                })?;
            return Ok(package_dir.join(executable).to_string_lossy().into_owned());
        }

        Err(ExecutorError::InvalidNodeConfig(format!(
            "Node '{}' has no command or package+executable",
            name
        )))
    }

    /// Resolve every enabled node in declaration order
    fn resolve_nodes(&self) -> Result<Vec<LaunchNode>, ExecutorError> {
        let mut nodes = Vec::new();

        for (name, node) in &self.launch_file.nodes {
            if !self.is_enabled(name, node)? {
                continue;
            }

            let program = self.resolve_program(name, node)?;

            // scoped parameters, also passed as --key value argv pairs
            let mut params = IndexMap::new();
            let mut args = Vec::new();
            for (key, value) in &node.params {
                let resolved =
                    self.resolve_param(value, &format!("node '{}' params.{}", name, key))?;
                args.push(format!("--{}", key));
                args.push(resolved.to_literal());
                params.insert(key.clone(), resolved);
            }

            // global env first, node env overrides
            let mut env = HashMap::new();
            for (k, v) in &self.launch_file.env {
                env.insert(k.clone(), self.resolve(v, &format!("global env '{}'", k))?);
            }
            for (k, v) in &node.env {
                env.insert(
                    k.clone(),
                    self.resolve(v, &format!("node '{}' env '{}'", name, k))?,
                );
            }

            nodes.push(LaunchNode {
                name: name.clone(),
                program,
                args,
                env,
                working_dir: node.working_dir.as_ref().map(PathBuf::from),
                output: node.output,
                params,
            });
        }

        Ok(nodes)
    }

    /// Generate a launch plan without touching the parameter namespace
    /// or spawning anything (dry-run mode)
    pub fn plan(&self) -> Result<LaunchPlan, ExecutorError> {
        Ok(LaunchPlan {
            nodes: self.resolve_nodes()?,
            args: self.subst_ctx.args.clone(),
            params_file: self.launch_file.params_file.clone(),
        })
    }

    /// Load the external parameter file, register every enabled node's
    /// scoped parameters, and return the resolved nodes. This is the
    /// half of `launch` that spawns nothing; parameter loading always
    /// precedes process instantiation.
    pub fn prepare(&mut self) -> Result<Vec<LaunchNode>, ExecutorError> {
        if let Some(params_file) = self.launch_file.params_file.clone() {
            let resolved = self.resolve(&params_file, "params_file")?;
            let path = if Path::new(&resolved).is_absolute() {
                PathBuf::from(&resolved)
            } else {
                self.config.project_root.join(&resolved)
            };
            let count = self.params.load_file(&path)?;
            log::info!("Loaded {} parameters from {}", count, path.display());
        }

        let nodes = self.resolve_nodes()?;

        for node in &nodes {
            for (key, value) in &node.params {
                self.params.set_scoped(&node.name, key, value.clone());
            }
        }

        Ok(nodes)
    }

    /// Launch every enabled node in declaration order
    pub async fn launch(&mut self, shutdown_rx: watch::Receiver<()>) -> Result<(), ExecutorError> {
        let nodes = self.prepare()?;
        let snapshot = self.params.to_yaml()?;

        // session log directory, only if some node logs to file
        let log_dir = self.config.log_dir.clone().unwrap_or_else(|| {
            self.config
                .project_root
                .join("log")
                .join(chrono::Local::now().format("%Y%m%d_%H%M%S").to_string())
        });
        if nodes.iter().any(|n| n.output == OutputMode::Log) {
            std::fs::create_dir_all(&log_dir).map_err(|e| ExecutorError::Io {
                path: log_dir.display().to_string(),
                source: e,
            })?;
        }

        log::info!("Launching {} nodes...", nodes.len());

        for node in nodes {
            let mut env = node.env.clone();
            env.insert(LAUNCH_PARAMS_ENV.to_string(), snapshot.clone());

            let log_path = match node.output {
                OutputMode::Log => Some(log_dir.join(format!("{}.log", node.name))),
                OutputMode::Screen => None,
            };

            let config = ProcessConfig {
                name: node.name.clone(),
                program: node.program,
                args: node.args,
                env,
                working_dir: node.working_dir,
                output: node.output,
                log_path,
            };

            let process = ManagedProcess::new(config).with_event_sender(self.event_tx.clone());
            self.processes.insert(node.name, process);
        }

        let names: Vec<String> = self.processes.keys().cloned().collect();
        for name in names {
            if shutdown_rx.has_changed().unwrap_or(false) {
                log::info!("Shutdown requested, aborting launch");
                break;
            }

            if let Some(process) = self.processes.get_mut(&name) {
                process
                    .start()
                    .await
                    .map_err(|e| ExecutorError::ProcessFailed {
                        node: name.clone(),
                        source: e,
                    })?;
            }
        }

        log::info!("All nodes launched");
        Ok(())
    }

    /// Wait for all processes to stop or a shutdown signal
    pub async fn wait(&mut self, mut shutdown_rx: watch::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    log::info!("Shutdown signal received");
                    break;
                }

                event = self.event_rx.recv() => {
                    if let Some((name, event)) = event {
                        match event {
                            ProcessEvent::Output { line, is_stderr } => {
                                if is_stderr {
                                    log::warn!("[{}] {}", name, line);
                                } else {
                                    log::info!("[{}] {}", name, line);
                                }
                            }
                            ProcessEvent::Exited { code } => {
                                log::info!("[{}] Process exited with code: {:?}", name, code);
                            }
                            ProcessEvent::Failed { error } => {
                                log::error!("[{}] Process failed: {}", name, error);
                            }
                            ProcessEvent::Started { pid } => {
                                log::info!("[{}] Process started with PID: {}", name, pid);
                            }
                        }
                    }
                }

                _ = tokio::time::sleep(Duration::from_secs(1)) => {
                    let mut all_stopped = true;
                    for (_, process) in self.processes.iter_mut() {
                        if process.check_status().await.is_running() {
                            all_stopped = false;
                        }
                    }
                    if all_stopped {
                        log::info!("All processes have stopped");
                        break;
                    }
                }
            }
        }
    }

    /// Shut down all processes in reverse launch order
    pub async fn shutdown(&mut self) {
        log::info!("Shutting down all processes...");

        let names: Vec<String> = self.processes.keys().cloned().collect();
        for name in names.into_iter().rev() {
            if let Some(process) = self.processes.get_mut(&name) {
                if process.status.is_running() {
                    if let Err(e) = process.stop(self.config.shutdown_timeout).await {
                        log::error!("[{}] Error stopping process: {}", name, e);
                    }
                }
            }
        }

        log::info!("All processes shut down");
    }

    /// Get process status summary
    pub fn status(&self) -> Vec<(&str, ProcessStatus)> {
        self.processes
            .iter()
            .map(|(name, proc)| (name.as_str(), proc.status))
            .collect()
    }
}

/// Errors that can occur in the executor
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Unknown argument: {0}")]
    UnknownArgument(String),

    #[error("Substitution failed in {context}: {source}")]
    SubstitutionFailed {
        context: String,
        #[source]
        source: crate::config::SubstitutionError,
    },

    #[error("Invalid node configuration: {0}")]
    InvalidNodeConfig(String),

    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),

    #[error("Failed to create log directory '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process failed for node '{node}': {source}")]
    ProcessFailed {
        node: String,
        #[source]
        source: ProcessError,
    },
}

impl std::fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Launch Plan")?;
        writeln!(f, "===========")?;
        writeln!(f)?;

        if !self.args.is_empty() {
            writeln!(f, "Arguments:")?;
            for (key, value) in &self.args {
                writeln!(f, "  {}: {}", key, value)?;
            }
            writeln!(f)?;
        }

        if let Some(params_file) = &self.params_file {
            writeln!(f, "Parameter file (loaded before any node): {}", params_file)?;
            writeln!(f)?;
        }

        writeln!(f, "Nodes (in launch order):")?;
        for (i, node) in self.nodes.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "  {}. {} [{:?}]", i + 1, node.name, node.output)?;
            writeln!(f, "     Command: {} {}", node.program, node.args.join(" "))?;

            if !node.params.is_empty() {
                writeln!(f, "     Parameters:")?;
                for (key, value) in &node.params {
                    writeln!(f, "       {}: {}", key, value.to_literal())?;
                }
            }

            if !node.env.is_empty() {
                writeln!(f, "     Environment:")?;
                for (key, value) in &node.env {
                    writeln!(f, "       {}={}", key, value)?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"
version: "1.0"
args:
  face_detection:
    default: false
  target_face_folder:
    default: "/data/faces"
nodes:
  face_recognition_node:
    package: face_recognition_pkg
    executable: face_recognition_node.py
    output: screen
    enabled: "$(arg face_detection)"
    params:
      target_face_folder: "$(arg target_face_folder)"
  gazebo_recognition_node:
    package: gazebo_recognition
    executable: gazebo_recognition_node.py
    output: screen
    params:
      face_detection: "$(arg face_detection)"
"#;

    fn executor(overrides: &[(&str, &str)]) -> Executor {
        let launch_file = LaunchFile::from_yaml(DESCRIPTOR).unwrap();
        let config = ExecutorConfig {
            project_root: PathBuf::from("/project"),
            package_roots: vec![PathBuf::from("/project")],
            shutdown_timeout: Duration::from_secs(5),
            log_dir: None,
        };
        let overrides = overrides
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Executor::new(launch_file, config, overrides).unwrap()
    }

    #[test]
    fn test_default_plan_has_only_gazebo_node() {
        let plan = executor(&[]).plan().unwrap();

        assert_eq!(plan.nodes.len(), 1);
        let gazebo = &plan.nodes[0];
        assert_eq!(gazebo.name, "gazebo_recognition_node");
        assert_eq!(gazebo.params["face_detection"], ParamValue::Bool(false));
        assert_eq!(gazebo.args, vec!["--face_detection", "false"]);
    }

    #[test]
    fn test_face_detection_true_enables_both_nodes() {
        let plan = executor(&[("face_detection", "true")]).plan().unwrap();

        assert_eq!(plan.nodes.len(), 2);
        let face = &plan.nodes[0];
        assert_eq!(face.name, "face_recognition_node");
        assert_eq!(
            face.params["target_face_folder"],
            ParamValue::String("/data/faces".into())
        );

        let gazebo = &plan.nodes[1];
        assert_eq!(gazebo.name, "gazebo_recognition_node");
        assert_eq!(gazebo.params["face_detection"], ParamValue::Bool(true));
    }

    #[test]
    fn test_argument_round_trip_identity() {
        let exec = executor(&[("face_detection", "true")]);
        let plan = exec.plan().unwrap();

        // the value bound to the argument is the value the gazebo node
        // receives, byte for byte
        let bound = &plan.args["face_detection"];
        let gazebo = plan.nodes.iter().find(|n| n.name == "gazebo_recognition_node").unwrap();
        let propagated = gazebo.params["face_detection"].to_literal();
        assert_eq!(*bound, propagated);
    }

    #[test]
    fn test_unknown_argument_override_rejected() {
        let launch_file = LaunchFile::from_yaml(DESCRIPTOR).unwrap();
        let overrides =
            HashMap::from([("no_such_arg".to_string(), "1".to_string())]);
        let result = Executor::new(launch_file, ExecutorConfig::default(), overrides);

        assert!(matches!(result, Err(ExecutorError::UnknownArgument(_))));
    }

    #[test]
    fn test_program_resolved_under_package_root() {
        let plan = executor(&[]).plan().unwrap();
        assert_eq!(
            plan.nodes[0].program,
            "/project/gazebo_recognition/gazebo_recognition_node.py"
        );
    }

    #[test]
    fn test_prepare_loads_params_before_registering_scoped() {
        let dir = std::env::temp_dir().join("recognition_launch_prepare_test");
        std::fs::create_dir_all(&dir).unwrap();
        let params_path = dir.join("recognition.yaml");
        std::fs::write(
            &params_path,
            "marker_topic: /detected_object\nlower_green: [40, 40, 40]\n",
        )
        .unwrap();

        let yaml = format!(
            r#"
params_file: {}
args:
  face_detection:
    default: false
nodes:
  gazebo_recognition_node:
    command: "bin/gazebo_recognition_node"
    params:
      face_detection: "$(arg face_detection)"
"#,
            params_path.display()
        );
        let launch_file = LaunchFile::from_yaml(&yaml).unwrap();
        let mut exec = Executor::new(launch_file, ExecutorConfig::default(), HashMap::new())
            .unwrap();

        let nodes = exec.prepare().unwrap();
        assert_eq!(nodes.len(), 1);

        // wholesale entries from the external file
        assert_eq!(
            exec.params().get("marker_topic"),
            Some(&ParamValue::String("/detected_object".into()))
        );
        // scoped entry under the node namespace
        assert_eq!(
            exec.params().get("gazebo_recognition_node/face_detection"),
            Some(&ParamValue::Bool(false))
        );
    }

    #[test]
    fn test_missing_params_file_is_an_error() {
        let yaml = r#"
params_file: /nonexistent/params.yaml
nodes:
  gazebo_recognition_node:
    command: "bin/gazebo_recognition_node"
"#;
        let launch_file = LaunchFile::from_yaml(yaml).unwrap();
        let mut exec = Executor::new(launch_file, ExecutorConfig::default(), HashMap::new())
            .unwrap();

        assert!(matches!(exec.prepare(), Err(ExecutorError::Param(_))));
    }
}
