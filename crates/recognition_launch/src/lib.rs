//! Recognition Launch System
//!
//! A declarative launcher for the robot recognition node stack.
//!
//! # Overview
//!
//! A launch descriptor wires together external programs with parameters
//! and conditional toggles:
//! - an external parameter file is merged into a global parameter
//!   namespace before any process starts
//! - arguments with defaults can be overridden at launch time and are
//!   substituted into node configuration via `$(arg ...)`
//! - a node is instantiated only if its `enabled` condition holds
//! - scoped parameters are delivered to each node's namespace and as
//!   `--key value` command line pairs
//!
//! # Example Launch File
//!
//! ```yaml
//! version: "1.0"
//!
//! params_file: params/recognition.yaml
//!
//! args:
//!   face_detection:
//!     default: false
//!
//! nodes:
//!   face_recognition_node:
//!     package: face_recognition_pkg
//!     executable: face_recognition_node.py
//!     output: screen
//!     enabled: "$(arg face_detection)"
//!
//!   gazebo_recognition_node:
//!     package: gazebo_recognition
//!     executable: gazebo_recognition_node.py
//!     output: screen
//!     params:
//!       face_detection: "$(arg face_detection)"
//! ```

pub mod cli;
pub mod config;
pub mod params;
pub mod runtime;

pub use cli::LaunchArgs;
pub use config::{LaunchFile, LaunchFileError, SubstitutionContext, SubstitutionError};
pub use params::{ParamError, ParamServer, ParamValue};
pub use runtime::{
    Executor, ExecutorConfig, ExecutorError, LaunchNode, LaunchPlan, ManagedProcess,
    ProcessConfig, ProcessError, ProcessEvent, ProcessStatus,
};
