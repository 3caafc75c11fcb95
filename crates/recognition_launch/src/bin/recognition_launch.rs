//! Recognition Launch CLI
//!
//! Usage:
//!   recognition_launch launch/recognition.launch.yaml
//!   recognition_launch launch/recognition.launch.yaml -a face_detection:=true
//!   recognition_launch launch/recognition.launch.yaml --dry-run

use recognition_launch::{Executor, ExecutorConfig, LaunchArgs, LaunchFile};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let args: LaunchArgs = argh::from_env();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };
    let env = env_logger::Env::default().default_filter_or(log_level);
    env_logger::init_from_env(env);

    log::info!("Loading launch file: {}", args.launch_file);
    let launch_file = match LaunchFile::from_file(&args.launch_file) {
        Ok(lf) => lf,
        Err(e) => {
            log::error!("Failed to load launch file: {}", e);
            std::process::exit(1);
        }
    };

    if args.validate {
        println!("Launch file '{}' is valid", args.launch_file);
        println!("  Version: {}", launch_file.version);
        println!("  Args: {}", launch_file.args.len());
        println!("  Nodes: {}", launch_file.nodes.len());
        if let Some(params_file) = &launch_file.params_file {
            println!("  Parameter file: {}", params_file);
        }
        return;
    }

    let project_root = std::env::current_dir().unwrap_or_else(|_| ".".into());
    let executor_config = ExecutorConfig::from_project_root(project_root);

    let arg_overrides = args.arg_overrides();

    let mut executor = match Executor::new(launch_file, executor_config, arg_overrides) {
        Ok(e) => e,
        Err(e) => {
            log::error!("Failed to create executor: {}", e);
            std::process::exit(1);
        }
    };

    if args.dry_run {
        match executor.plan() {
            Ok(plan) => {
                println!("{}", plan);
            }
            Err(e) => {
                log::error!("Failed to generate launch plan: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(());

    {
        let shutdown_tx = shutdown_tx.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            log::info!("Received Ctrl+C, initiating shutdown...");
            let _ = shutdown_tx.send(());
        }) {
            log::error!("Error setting Ctrl+C handler: {}", e);
            std::process::exit(1);
        }
    }

    if let Err(e) = executor.launch(shutdown_rx.clone()).await {
        log::error!("Launch failed: {}", e);
        executor.shutdown().await;
        std::process::exit(1);
    }

    executor.wait(shutdown_rx).await;

    executor.shutdown().await;

    log::info!("Recognition launcher exiting");
}
