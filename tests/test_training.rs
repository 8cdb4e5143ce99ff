// End-to-end training tests on small synthetic datasets

use bender::architecture::LayerConfig;
use bender::config::{ExperimentConfig, TrainingMode};
use bender::data::Dataset;
use bender::layers::{DenseMapping, GenDense, Layer};
use bender::model::Sequential;
use bender::optimizers::SGD;
use bender::training::Trainer;
use bender::utils::Activation;
use bender::BenderError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Two well separated classes: the sign of the first feature decides the
/// label, the second feature is small noise.
fn separable(n: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut features = Vec::with_capacity(n * 2);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let label = (i % 2) as u8;
        let magnitude = rng.gen_range(0.5f32..1.0);
        features.push(if label == 1 { magnitude } else { -magnitude });
        features.push(rng.gen_range(-0.2f32..0.2));
        labels.push(label);
    }
    Dataset::new(features, labels, 2, 2).unwrap()
}

fn toy_config(name: &str, layers: Vec<LayerConfig>) -> ExperimentConfig {
    let mut config = ExperimentConfig::with_layers(name, layers);
    config.batch_size = 8;
    config.epochs = 10;
    config.learning_rate = 0.01;
    config
}

// ============================================================================
// Feedback Alignment Training Tests
// ============================================================================

mod feedback_alignment_tests {
    use super::*;

    #[test]
    fn test_feedback_alignment_reduces_loss() {
        let train = separable(64, 1);
        let test = separable(32, 2);
        let mut config = toy_config(
            "fa_toy",
            vec![
                LayerConfig::dense(2, 8, Activation::Relu, DenseMapping::LinearAsymDx),
                LayerConfig::dense(8, 2, Activation::Identity, DenseMapping::LinearAsymDx),
            ],
        );
        config.epochs = 20;

        let mut trainer = Trainer::new(&config).unwrap();
        let history = trainer.fit(&train, &test).unwrap();

        assert_eq!(history.len(), 20);
        assert_eq!(history.loss_test.len(), 20);
        assert_eq!(history.acc_train.len(), 20);
        let first = history.loss_train[0];
        let last = *history.loss_train.last().unwrap();
        assert!(last < first, "loss went from {} to {}", first, last);
    }

    #[test]
    fn test_direct_feedback_alignment_reduces_loss() {
        let train = separable(64, 3);
        let mut config = toy_config(
            "dfa_toy",
            vec![
                LayerConfig::dense(2, 8, Activation::Tanh, DenseMapping::Linear),
                LayerConfig::dense(8, 8, Activation::Tanh, DenseMapping::Linear),
                LayerConfig::dense(8, 2, Activation::Identity, DenseMapping::Linear),
            ],
        );
        config.training_mode = TrainingMode::DirectFeedback;
        config.epochs = 20;

        let mut trainer = Trainer::new(&config).unwrap();
        let history = trainer.fit(&train, &train).unwrap();
        assert!(history.loss_train[19] < history.loss_train[0]);
    }
}

// ============================================================================
// Binary Network Training Tests
// ============================================================================

mod binary_tests {
    use super::*;

    #[test]
    fn test_binary_single_layer_learns_separable_task() {
        let train = separable(64, 4);
        let test = separable(32, 5);
        let mut config = toy_config(
            "binary_toy",
            vec![LayerConfig::dense(
                2,
                2,
                Activation::Identity,
                DenseMapping::LinearBinaryWeights,
            )],
        );
        config.learning_rate = 0.05;
        config.clamp_weights = Some([-1.0, 1.0]);

        let mut trainer = Trainer::new(&config).unwrap();
        let history = trainer.fit(&train, &test).unwrap();

        let final_acc = *history.acc_test.last().unwrap();
        assert!(final_acc > 0.95, "final test accuracy {}", final_acc);
    }

    #[test]
    fn test_weights_are_clamped_after_every_epoch() {
        let train = separable(32, 6);
        let mut config = toy_config(
            "clamped",
            vec![
                LayerConfig::dense(2, 6, Activation::SignSte, DenseMapping::LinearBinaryWeights),
                LayerConfig::dense(6, 2, Activation::Identity, DenseMapping::LinearBinaryWeights),
            ],
        );
        // A large step pushes latent weights well past ±1 within an epoch.
        config.learning_rate = 0.5;
        config.optimizer = "sgd".into();
        config.clamp_weights = Some([-1.0, 1.0]);
        config.epochs = 3;

        let mut trainer = Trainer::new(&config).unwrap();
        trainer.fit(&train, &train).unwrap();
        for layer in trainer.model().layers() {
            assert!(layer.weights().iter().all(|w| (-1.0..=1.0).contains(w)));
        }
    }
}

// ============================================================================
// Failure Tests
// ============================================================================

mod failure_tests {
    use super::*;

    #[test]
    fn test_non_finite_loss_aborts_training() {
        let data = Dataset::new(vec![f32::NAN; 16], vec![0, 1, 0, 1, 0, 1, 0, 1], 2, 2).unwrap();
        let config = toy_config(
            "nan",
            vec![LayerConfig::dense(2, 2, Activation::Identity, DenseMapping::Linear)],
        );
        let mut trainer = Trainer::new(&config).unwrap();
        match trainer.fit(&data, &data) {
            Err(BenderError::NonFiniteLoss { epoch, .. }) => assert_eq!(epoch, 1),
            other => panic!("expected NonFiniteLoss, got {:?}", other.map(|h| h.len())),
        }
    }

    #[test]
    fn test_feature_size_mismatch() {
        let data = separable(16, 7);
        let config = toy_config(
            "mismatch",
            vec![LayerConfig::dense(3, 2, Activation::Identity, DenseMapping::Linear)],
        );
        let mut trainer = Trainer::new(&config).unwrap();
        assert!(matches!(trainer.fit(&data, &data), Err(BenderError::Shape(_))));
    }

    #[test]
    fn test_trainer_from_existing_model() {
        let mut rng = StdRng::seed_from_u64(8);
        let layer: Box<dyn Layer> = Box::new(GenDense::new(
            2,
            2,
            Activation::Identity,
            DenseMapping::Linear,
            &mut rng,
        ));
        let model = Sequential::new(vec![layer]).unwrap();
        let mut config = toy_config("existing", Vec::new());
        config.epochs = 2;

        let mut trainer = Trainer::from_model(model, Box::new(SGD::new(0.1)), &config).unwrap();
        let before = trainer.model().layers()[0].weights().to_vec();
        let data = separable(16, 9);
        assert_eq!(trainer.fit(&data, &data).unwrap().len(), 2);

        let trained = trainer.into_model();
        assert_eq!(trained.len(), 1);
        assert_ne!(trained.layers()[0].weights(), before.as_slice());
    }
}
