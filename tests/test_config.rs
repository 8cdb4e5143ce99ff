// Tests for experiment configuration parsing
//
// This file tests the config module including:
// - Loading the shipped config files
// - Defaults for omitted hyper-parameters
// - Handling invalid JSON, missing files and out-of-range values

use bender::config::{load_config, validate_config, ExperimentConfig, TrainingMode};
use bender::BenderError;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("failed to write temp config");
    file
}

const MINIMAL_LAYERS: &str = r#"
  "layers": [
    { "layer_type": "gen_dense", "input_size": 4, "output_size": 2 }
  ]"#;

// ============================================================================
// Shipped Config Tests
// ============================================================================

mod shipped_config_tests {
    use super::*;

    #[test]
    fn test_feedback_alignment_config_matches_preset() {
        let config = load_config("config/feedback_alignment.json")
            .expect("Failed to load feedback alignment config");
        assert_eq!(config, ExperimentConfig::feedback_alignment());
    }

    #[test]
    fn test_binary_config_matches_preset() {
        let config = load_config("config/binary.json").expect("Failed to load binary config");
        assert_eq!(config, ExperimentConfig::binary());
        assert_eq!(config.clamp_weights, Some([-1.0, 1.0]));
    }

    #[test]
    fn test_direct_feedback_config() {
        let config = load_config("config/direct_feedback_alignment.json")
            .expect("Failed to load direct feedback config");
        assert_eq!(config.training_mode, TrainingMode::DirectFeedback);
        assert_eq!(config.layers().len(), 3);
    }

    #[test]
    fn test_radial_and_conv_configs_load() {
        load_config("config/radial.json").expect("Failed to load radial config");
        let conv = load_config("config/conv_feedback_alignment.json")
            .expect("Failed to load conv config");
        assert_eq!(conv.layers()[0].layer_type, "gen_conv");
    }
}

// ============================================================================
// Defaults Tests
// ============================================================================

mod default_tests {
    use super::*;

    #[test]
    fn test_omitted_fields_use_defaults() {
        let file = write_temp_config(&format!("{{{}}}", MINIMAL_LAYERS));
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.name, "experiment");
        assert!((config.learning_rate - 3e-4).abs() < 1e-9);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.epochs, 10);
        assert_eq!(config.optimizer, "adam");
        assert_eq!(config.training_mode, TrainingMode::Backprop);
        assert_eq!(config.clamp_weights, None);
        assert_eq!(config.data_dir, "./data");
        assert!(config.shuffle);
    }

    #[test]
    fn test_serialized_preset_round_trips() {
        let preset = ExperimentConfig::binary();
        let json = serde_json::to_string(&preset).unwrap();
        let file = write_temp_config(&json);
        assert_eq!(load_config(file.path()).unwrap(), preset);
    }
}

// ============================================================================
// Invalid Config Tests
// ============================================================================

mod invalid_config_tests {
    use super::*;

    fn load_with(fields: &str) -> Result<ExperimentConfig, BenderError> {
        let file = write_temp_config(&format!("{{{}, {}}}", fields, MINIMAL_LAYERS));
        load_config(file.path())
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_config("config/does_not_exist.json"),
            Err(BenderError::Io(_))
        ));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_temp_config("{ \"epochs\": 3, ");
        assert!(matches!(load_config(file.path()), Err(BenderError::Json(_))));
    }

    #[test]
    fn test_missing_layers() {
        let file = write_temp_config("{ \"epochs\": 3 }");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let err = load_with("\"batch_size\": 0").unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_negative_learning_rate() {
        assert!(load_with("\"learning_rate\": -0.1").is_err());
    }

    #[test]
    fn test_unknown_optimizer() {
        let err = load_with("\"optimizer\": \"rmsprop\"").unwrap_err();
        assert!(err.to_string().contains("adam, sgd"));
    }

    #[test]
    fn test_unknown_training_mode() {
        assert!(matches!(
            load_with("\"training_mode\": \"hebbian\""),
            Err(BenderError::Json(_))
        ));
    }

    #[test]
    fn test_empty_clamp_range() {
        assert!(load_with("\"clamp_weights\": [0.5, 0.5]").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_epochs() {
        let mut config = ExperimentConfig::feedback_alignment();
        config.epochs = 0;
        assert!(matches!(
            validate_config(&config),
            Err(BenderError::InvalidConfig(_))
        ));
    }
}
