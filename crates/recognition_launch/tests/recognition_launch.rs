//! End-to-end checks against the shipped launch descriptor

use recognition_launch::{Executor, ExecutorConfig, LaunchFile, ParamValue};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn load_descriptor() -> LaunchFile {
    let path = workspace_root().join("launch/recognition.launch.yaml");
    LaunchFile::from_file(path.to_str().unwrap()).expect("shipped descriptor must be valid")
}

fn executor(overrides: &[(&str, &str)]) -> Executor {
    let root = workspace_root();
    let config = ExecutorConfig {
        project_root: root.clone(),
        package_roots: vec![root],
        shutdown_timeout: Duration::from_secs(5),
        log_dir: None,
    };
    let overrides: HashMap<String, String> = overrides
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Executor::new(load_descriptor(), config, overrides).unwrap()
}

#[test]
fn shipped_descriptor_declares_both_nodes_and_the_toggle() {
    let descriptor = load_descriptor();

    assert!(descriptor.args.contains_key("face_detection"));
    assert_eq!(descriptor.params_file.as_deref(), Some("params/recognition.yaml"));

    let names: Vec<_> = descriptor.nodes.keys().cloned().collect();
    assert_eq!(names, vec!["face_recognition_node", "gazebo_recognition_node"]);
}

#[test]
fn toggle_off_produces_exactly_one_process_entry() {
    let plan = executor(&[]).plan().unwrap();

    assert_eq!(plan.nodes.len(), 1);
    let gazebo = &plan.nodes[0];
    assert_eq!(gazebo.name, "gazebo_recognition_node");
    assert_eq!(gazebo.params["face_detection"], ParamValue::Bool(false));
}

#[test]
fn toggle_on_produces_both_process_entries() {
    let plan = executor(&[
        ("face_detection", "true"),
        ("target_face_folder", "/data/faces"),
    ])
    .plan()
    .unwrap();

    assert_eq!(plan.nodes.len(), 2);

    let face = &plan.nodes[0];
    assert_eq!(face.name, "face_recognition_node");
    assert_eq!(
        face.params["target_face_folder"],
        ParamValue::String("/data/faces".into())
    );

    let gazebo = &plan.nodes[1];
    assert_eq!(gazebo.params["face_detection"], ParamValue::Bool(true));
}

#[test]
fn resolved_toggle_value_round_trips_into_the_gazebo_params() {
    let exec = executor(&[("face_detection", "true")]);
    let plan = exec.plan().unwrap();

    let bound = plan.args["face_detection"].clone();
    let gazebo = plan
        .nodes
        .iter()
        .find(|n| n.name == "gazebo_recognition_node")
        .unwrap();
    assert_eq!(bound, gazebo.params["face_detection"].to_literal());
    assert!(gazebo.args.contains(&"--face_detection".to_string()));
    assert!(gazebo.args.contains(&bound));
}

#[test]
fn parameter_file_is_loaded_before_any_node_for_every_toggle_value() {
    for overrides in [vec![], vec![("face_detection", "true"), ("target_face_folder", "/data/faces")]] {
        let mut exec = executor(&overrides);
        let nodes = exec.prepare().unwrap();

        // wholesale entries from params/recognition.yaml are in the
        // namespace before any process would be spawned
        assert_eq!(
            exec.params().get("marker_topic"),
            Some(&ParamValue::String("/detected_object".into()))
        );
        assert_eq!(exec.params().get("marker_queue_size"), Some(&ParamValue::Int(10)));

        // and the scoped entries are registered for every resolved node
        for node in &nodes {
            for key in node.params.keys() {
                assert!(exec
                    .params()
                    .get(&format!("{}/{}", node.name, key))
                    .is_some());
            }
        }
    }
}

#[test]
fn target_face_folder_defaults_to_a_package_relative_path() {
    let plan = executor(&[("face_detection", "true")]).plan().unwrap();

    let face = plan
        .nodes
        .iter()
        .find(|n| n.name == "face_recognition_node")
        .unwrap();
    let folder = face.params["target_face_folder"].to_literal();
    assert!(
        folder.ends_with("face_recognition_pkg/faces"),
        "default should resolve under the package dir, got {}",
        folder
    );
}
