//! Architecture configuration and model building
//!
//! A network is described as an ordered list of generalized layers. The list
//! can be written by hand in JSON, loaded with [`load_architecture`] and turned
//! into a [`Sequential`] with [`build_model`].

use crate::error::{BenderError, Result};
use crate::layers::{ConvMapping, DenseMapping, GenConv, GenDense, Layer};
use crate::model::Sequential;
use crate::similarity::ConvGeometry;
use crate::utils::Activation;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Configuration for a single generalized layer.
///
/// Different layer types require different fields:
///
/// - **gen_dense**: Requires `input_size` and `output_size`; optional `bias`
///   (default true)
/// - **gen_conv**: Requires `in_channels`, `out_channels`, `kernel_size`,
///   `input_height`, `input_width`, and optional `padding` (default 0),
///   `stride` (default 1)
///
/// Both accept `activation` (default "identity") and `forward`, the name of
/// the forward mapping ("linear" for dense layers, "conv_linear" for
/// convolutions when omitted).
///
/// # Examples
///
/// ```json
/// {
///   "layer_type": "gen_dense",
///   "input_size": 784,
///   "output_size": 128,
///   "activation": "relu",
///   "forward": "linear_asym_dx"
/// }
/// ```
///
/// ```json
/// {
///   "layer_type": "gen_conv",
///   "in_channels": 1,
///   "out_channels": 8,
///   "kernel_size": 3,
///   "padding": 1,
///   "input_height": 28,
///   "input_width": 28,
///   "forward": "conv_linear_asym_dx"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Type of layer: "gen_dense" or "gen_conv"
    pub layer_type: String,

    /// Activation applied to the mapped output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<String>,
    /// Forward mapping name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward: Option<String>,

    // GenDense parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_size: Option<usize>,
    /// Whether the dense layer carries a bias (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<bool>,

    // GenConv parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_channels: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_channels: Option<usize>,
    /// Square kernel side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_size: Option<usize>,
    /// Zero-padding (default: 0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<usize>,
    /// Stride (default: 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stride: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_height: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_width: Option<usize>,
}

impl LayerConfig {
    /// A `gen_dense` layer description.
    pub fn dense(input_size: usize, output_size: usize, activation: Activation, forward: DenseMapping) -> Self {
        Self {
            layer_type: "gen_dense".into(),
            activation: Some(activation.name().into()),
            forward: Some(forward.name().into()),
            input_size: Some(input_size),
            output_size: Some(output_size),
            ..Self::default()
        }
    }

    /// A `gen_conv` layer description.
    pub fn conv(geometry: ConvGeometry, activation: Activation, forward: ConvMapping) -> Self {
        Self {
            layer_type: "gen_conv".into(),
            activation: Some(activation.name().into()),
            forward: Some(forward.name().into()),
            in_channels: Some(geometry.in_channels),
            out_channels: Some(geometry.out_channels),
            kernel_size: Some(geometry.kernel_size),
            padding: Some(geometry.padding),
            stride: Some(geometry.stride),
            input_height: Some(geometry.input_height),
            input_width: Some(geometry.input_width),
            ..Self::default()
        }
    }

    fn kind(&self) -> String {
        self.layer_type.to_lowercase()
    }

    fn activation_or_default(&self, index: usize) -> Result<Activation> {
        match &self.activation {
            Some(name) => name
                .parse()
                .map_err(|e| BenderError::config(format!("Layer {}: {}", index, e))),
            None => Ok(Activation::Identity),
        }
    }

    fn dense_mapping(&self, index: usize) -> Result<DenseMapping> {
        match &self.forward {
            Some(name) => name
                .parse()
                .map_err(|e| BenderError::config(format!("Layer {}: {}", index, e))),
            None => Ok(DenseMapping::Linear),
        }
    }

    fn conv_mapping(&self, index: usize) -> Result<ConvMapping> {
        match &self.forward {
            Some(name) => name
                .parse()
                .map_err(|e| BenderError::config(format!("Layer {}: {}", index, e))),
            None => Ok(ConvMapping::ConvLinear),
        }
    }

    fn geometry(&self, index: usize) -> Result<ConvGeometry> {
        Ok(ConvGeometry {
            in_channels: require(self.in_channels, index, "in_channels")?,
            out_channels: require(self.out_channels, index, "out_channels")?,
            kernel_size: require(self.kernel_size, index, "kernel_size")?,
            padding: self.padding.unwrap_or(0),
            stride: self.stride.unwrap_or(1),
            input_height: require(self.input_height, index, "input_height")?,
            input_width: require(self.input_width, index, "input_width")?,
        })
    }
}

/// Configuration for the entire network.
///
/// Layers are applied in the order they appear.
///
/// # Example
///
/// ```json
/// {
///   "layers": [
///     { "layer_type": "gen_dense", "input_size": 784, "output_size": 128,
///       "activation": "relu", "forward": "linear_asym_dx" },
///     { "layer_type": "gen_dense", "input_size": 128, "output_size": 10,
///       "forward": "linear_asym_dx" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    pub layers: Vec<LayerConfig>,
}

fn require(value: Option<usize>, index: usize, field: &str) -> Result<usize> {
    match value {
        Some(0) => Err(BenderError::config(format!(
            "Layer {}: {} must be greater than 0",
            index, field
        ))),
        Some(v) => Ok(v),
        None => Err(BenderError::config(format!(
            "Layer {}: layer requires '{}'",
            index, field
        ))),
    }
}

/// Loads an architecture configuration from a JSON file and validates it.
///
/// # Examples
///
/// ```no_run
/// use bender::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/conv_feedback_alignment.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture(path: impl AsRef<Path>) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

fn layer_input_size(layer: &LayerConfig, index: usize) -> Result<usize> {
    match layer.kind().as_str() {
        "gen_dense" => require(layer.input_size, index, "input_size"),
        "gen_conv" => Ok(layer.geometry(index)?.input_len()),
        _ => Err(BenderError::config(format!(
            "Layer {}: unknown layer type '{}'",
            index, layer.layer_type
        ))),
    }
}

fn layer_output_size(layer: &LayerConfig, index: usize) -> Result<usize> {
    match layer.kind().as_str() {
        "gen_dense" => require(layer.output_size, index, "output_size"),
        "gen_conv" => Ok(layer.geometry(index)?.output_len()),
        _ => Err(BenderError::config(format!(
            "Layer {}: unknown layer type '{}'",
            index, layer.layer_type
        ))),
    }
}

/// Validates a single layer: required fields, names and geometry.
fn validate_layer(layer: &LayerConfig, index: usize) -> Result<()> {
    layer.activation_or_default(index)?;
    match layer.kind().as_str() {
        "gen_dense" => {
            require(layer.input_size, index, "input_size")?;
            require(layer.output_size, index, "output_size")?;
            layer.dense_mapping(index)?;
        }
        "gen_conv" => {
            let geometry = layer.geometry(index)?;
            if geometry.stride == 0 {
                return Err(BenderError::config(format!(
                    "Layer {}: stride must be greater than 0",
                    index
                )));
            }
            if !geometry.is_valid() {
                return Err(BenderError::config(format!(
                    "Layer {}: kernel_size {} does not fit a {}x{} input with padding {}",
                    index,
                    geometry.kernel_size,
                    geometry.input_height,
                    geometry.input_width,
                    geometry.padding
                )));
            }
            layer.conv_mapping(index)?;
        }
        _ => {
            return Err(BenderError::config(format!(
                "Layer {}: unknown layer type '{}'. Must be one of: gen_dense, gen_conv",
                index, layer.layer_type
            )));
        }
    }
    Ok(())
}

/// Validates an architecture configuration.
///
/// Checks that:
/// - Architecture has at least one layer
/// - Each layer has the required fields for its type
/// - Activation and mapping names are known
/// - Layer connections are valid (output size of layer i matches input size of layer i+1)
///
/// # Errors
///
/// `InvalidConfig` with a descriptive message.
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    if config.layers.is_empty() {
        return Err(BenderError::config("Architecture must have at least one layer"));
    }

    for (i, layer) in config.layers.iter().enumerate() {
        validate_layer(layer, i)?;
    }

    for (i, pair) in config.layers.windows(2).enumerate() {
        let current_output = layer_output_size(&pair[0], i)?;
        let next_input = layer_input_size(&pair[1], i + 1)?;
        if current_output != next_input {
            return Err(BenderError::config(format!(
                "Layer connection mismatch: Layer {} output size ({}) does not match Layer {} input size ({})",
                i,
                current_output,
                i + 1,
                next_input
            )));
        }
    }

    Ok(())
}

/// Builds a model from a validated architecture configuration.
///
/// All weights (and feedback weights) are drawn from `rng`, so the same seed
/// always produces the same network.
pub fn build_model<R: Rng + ?Sized>(config: &ArchitectureConfig, rng: &mut R) -> Result<Sequential> {
    validate_architecture(config)?;

    let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(config.layers.len());
    for (i, layer) in config.layers.iter().enumerate() {
        let activation = layer.activation_or_default(i)?;
        let built: Box<dyn Layer> = match layer.kind().as_str() {
            "gen_dense" => {
                let mapping = layer.dense_mapping(i)?;
                let dense = GenDense::new(
                    require(layer.input_size, i, "input_size")?,
                    require(layer.output_size, i, "output_size")?,
                    activation,
                    mapping,
                    rng,
                );
                if layer.bias.unwrap_or(true) {
                    Box::new(dense)
                } else {
                    Box::new(dense.without_bias())
                }
            }
            _ => Box::new(GenConv::new(
                layer.geometry(i)?,
                activation,
                layer.conv_mapping(i)?,
                rng,
            )?),
        };
        debug!(
            layer = i,
            kind = built.kind(),
            forward = layer.forward.as_deref().unwrap_or("default"),
            %activation,
            inputs = built.input_size(),
            outputs = built.output_size(),
            "built layer"
        );
        layers.push(built);
    }

    Sequential::new(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_conv_then_dense_sizes_chain() {
        let geometry = ConvGeometry {
            in_channels: 1,
            out_channels: 2,
            kernel_size: 3,
            padding: 0,
            stride: 1,
            input_height: 5,
            input_width: 5,
        };
        let config = ArchitectureConfig {
            layers: vec![
                LayerConfig::conv(geometry, Activation::Relu, ConvMapping::ConvLinearAsymDx),
                LayerConfig::dense(18, 4, Activation::Identity, DenseMapping::Linear),
            ],
        };
        let mut rng = StdRng::seed_from_u64(0);
        let model = build_model(&config, &mut rng).unwrap();
        assert_eq!(model.input_size(), 25);
        assert_eq!(model.output_size(), 4);
        assert!(model.layers()[0].has_feedback());
    }

    #[test]
    fn test_unknown_mapping_is_rejected() {
        let mut layer = LayerConfig::dense(4, 2, Activation::Identity, DenseMapping::Linear);
        layer.forward = Some("linear_sideways".into());
        let err = validate_architecture(&ArchitectureConfig { layers: vec![layer] }).unwrap_err();
        assert!(err.to_string().contains("linear_sideways"));
    }

    #[test]
    fn test_dense_without_bias() {
        let mut layer = LayerConfig::dense(3, 2, Activation::Identity, DenseMapping::Linear);
        layer.bias = Some(false);
        let mut rng = StdRng::seed_from_u64(0);
        let model = build_model(&ArchitectureConfig { layers: vec![layer] }, &mut rng).unwrap();
        assert_eq!(model.parameter_count(), 6);
    }
}
