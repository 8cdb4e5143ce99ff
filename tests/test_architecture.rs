// Tests for architecture configuration and model building

use bender::architecture::{build_model, load_architecture, ArchitectureConfig, LayerConfig};
use bender::layers::{ConvMapping, DenseMapping};
use bender::similarity::ConvGeometry;
use bender::utils::Activation;
use bender::BenderError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("failed to write temp config");
    file
}

fn expect_invalid(json: &str, fragment: &str) {
    let file = write_temp_config(json);
    match load_architecture(file.path()) {
        Err(BenderError::InvalidConfig(msg)) => {
            assert!(msg.contains(fragment), "'{}' does not mention '{}'", msg, fragment)
        }
        other => panic!("expected InvalidConfig, got {:?}", other),
    }
}

// ============================================================================
// Loading Tests
// ============================================================================

mod loading_tests {
    use super::*;

    #[test]
    fn test_load_conv_architecture() {
        let arch = load_architecture("config/architectures/conv_feedback_alignment.json")
            .expect("Failed to load conv architecture");
        assert_eq!(arch.layers.len(), 2);
        assert_eq!(arch.layers[0].stride, Some(2));
        assert_eq!(arch.layers[0].forward.as_deref(), Some("conv_linear_asym_dx"));
    }

    #[test]
    fn test_layer_type_is_case_insensitive() {
        let file = write_temp_config(
            r#"{ "layers": [ { "layer_type": "GEN_DENSE", "input_size": 3, "output_size": 2 } ] }"#,
        );
        assert!(load_architecture(file.path()).is_ok());
    }
}

// ============================================================================
// Validation Tests
// ============================================================================

mod validation_tests {
    use super::*;

    #[test]
    fn test_empty_architecture() {
        expect_invalid(r#"{ "layers": [] }"#, "at least one layer");
    }

    #[test]
    fn test_unknown_layer_type() {
        expect_invalid(
            r#"{ "layers": [ { "layer_type": "batchnorm", "input_size": 3 } ] }"#,
            "unknown layer type",
        );
    }

    #[test]
    fn test_dense_missing_output_size() {
        expect_invalid(
            r#"{ "layers": [ { "layer_type": "gen_dense", "input_size": 3 } ] }"#,
            "output_size",
        );
    }

    #[test]
    fn test_dense_zero_size() {
        expect_invalid(
            r#"{ "layers": [ { "layer_type": "gen_dense", "input_size": 0, "output_size": 2 } ] }"#,
            "greater than 0",
        );
    }

    #[test]
    fn test_unknown_activation() {
        expect_invalid(
            r#"{ "layers": [ { "layer_type": "gen_dense", "input_size": 3, "output_size": 2,
                               "activation": "softplus" } ] }"#,
            "softplus",
        );
    }

    #[test]
    fn test_conv_mapping_on_dense_layer() {
        expect_invalid(
            r#"{ "layers": [ { "layer_type": "gen_dense", "input_size": 3, "output_size": 2,
                               "forward": "conv_linear" } ] }"#,
            "conv_linear",
        );
    }

    #[test]
    fn test_conv_kernel_too_large() {
        expect_invalid(
            r#"{ "layers": [ { "layer_type": "gen_conv", "in_channels": 1, "out_channels": 2,
                               "kernel_size": 7, "input_height": 4, "input_width": 4 } ] }"#,
            "kernel_size",
        );
    }

    #[test]
    fn test_conv_zero_stride() {
        expect_invalid(
            r#"{ "layers": [ { "layer_type": "gen_conv", "in_channels": 1, "out_channels": 2,
                               "kernel_size": 3, "stride": 0, "input_height": 4, "input_width": 4 } ] }"#,
            "stride",
        );
    }

    #[test]
    fn test_connection_mismatch() {
        expect_invalid(
            r#"{ "layers": [
                  { "layer_type": "gen_dense", "input_size": 4, "output_size": 3 },
                  { "layer_type": "gen_dense", "input_size": 5, "output_size": 2 } ] }"#,
            "Layer 0 output size (3) does not match Layer 1 input size (5)",
        );
    }
}

// ============================================================================
// Model Building Tests
// ============================================================================

mod build_tests {
    use super::*;

    #[test]
    fn test_build_feedback_alignment_mlp() {
        let config = ArchitectureConfig {
            layers: vec![
                LayerConfig::dense(784, 128, Activation::Relu, DenseMapping::LinearAsymDx),
                LayerConfig::dense(128, 64, Activation::Relu, DenseMapping::LinearAsymDx),
                LayerConfig::dense(64, 10, Activation::Identity, DenseMapping::LinearAsymDx),
            ],
        };
        let mut rng = StdRng::seed_from_u64(1);
        let model = build_model(&config, &mut rng).unwrap();

        assert_eq!(model.len(), 3);
        assert_eq!(
            model.parameter_count(),
            784 * 128 + 128 + 128 * 64 + 64 + 64 * 10 + 10
        );
        for layer in model.layers() {
            let feedback = layer.feedback_weights().expect("feedback weights");
            assert_eq!(feedback.len(), layer.weights().len());
        }
        assert_eq!(model.layers()[0].activation(), Activation::Relu);
    }

    #[test]
    fn test_same_seed_same_weights() {
        let config = ArchitectureConfig {
            layers: vec![LayerConfig::dense(6, 4, Activation::Identity, DenseMapping::Radial)],
        };
        let a = build_model(&config, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = build_model(&config, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a.layers()[0].weights(), b.layers()[0].weights());
    }

    #[test]
    fn test_build_conv_model_forward() {
        let geometry = ConvGeometry {
            in_channels: 1,
            out_channels: 4,
            kernel_size: 3,
            padding: 1,
            stride: 2,
            input_height: 8,
            input_width: 8,
        };
        let config = ArchitectureConfig {
            layers: vec![
                LayerConfig::conv(geometry, Activation::Relu, ConvMapping::ConvLinearAsymDx),
                LayerConfig::dense(4 * 4 * 4, 3, Activation::Identity, DenseMapping::Linear),
            ],
        };
        let mut rng = StdRng::seed_from_u64(2);
        let model = build_model(&config, &mut rng).unwrap();
        let logits = model.forward(&vec![0.5; 2 * 64], 2);
        assert_eq!(logits.len(), 6);
        assert!(logits.iter().all(|v| v.is_finite()));
    }
}
