// mnist_binary.rs
// Binary MLP on MNIST: {-1, +1} weights and hidden units in the forward pass,
// straight-through gradients to real-valued weights clamped to [-1, 1].
// Expected files:
//   ./data/train-images.idx3-ubyte
//   ./data/train-labels.idx1-ubyte
//   ./data/t10k-images.idx3-ubyte
//   ./data/t10k-labels.idx1-ubyte
//
// Usage:
//   mnist_binary [config.json]
//
// Output:
//   - per-epoch metrics table on stdout
//   - logs/<name>.csv and logs/<name>.json

use bender::config::{load_config, ExperimentConfig};
use bender::training::run_experiment;
use std::env;
use std::process;
use std::time::Instant;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match env::args().nth(1) {
        Some(path) => load_config(&path).unwrap_or_else(|e| {
            error!(path = %path, "could not load config: {}", e);
            process::exit(1);
        }),
        None => ExperimentConfig::binary(),
    };

    let start = Instant::now();
    let history = run_experiment(&config).unwrap_or_else(|e| {
        error!("training failed: {}", e);
        process::exit(1);
    });

    println!("{}", history.to_table(3));
    let csv_path = format!("./logs/{}.csv", config.name);
    if let Err(e) = history.write_csv(&csv_path) {
        error!(path = %csv_path, "could not write metrics: {}", e);
        process::exit(1);
    }
    let json_path = format!("./logs/{}.json", config.name);
    if let Err(e) = history.write_json(&json_path) {
        error!(path = %json_path, "could not write metrics: {}", e);
        process::exit(1);
    }
    println!("Metrics written to {} and {}", csv_path, json_path);
    println!("Total time: {:.2} seconds", start.elapsed().as_secs_f64());
}
