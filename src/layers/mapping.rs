//! Forward mappings selectable on generalized layers
//!
//! A mapping decides how a layer turns its weights and input into
//! pre-activations, and which weights carry the error back to the input.
//! The `*AsymDx` variants compute the same forward value as their baseline but
//! route the input gradient through the layer's feedback weights.

use std::fmt;
use std::str::FromStr;

/// Forward mapping of a [`GenDense`](super::GenDense) layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DenseMapping {
    /// `xW + b`
    #[default]
    Linear,
    /// `xW + b` forward, input gradient through the feedback weights.
    LinearAsymDx,
    /// `xW + b` forward, no gradient flows to the input.
    LinearBlockedDx,
    /// `-‖x - W_j‖² + b`
    Radial,
    /// Radial forward, input gradient through the feedback weights.
    RadialAsymDx,
    /// `x·sign(W) + b` with a straight-through weight gradient.
    LinearBinaryWeights,
    /// `x·S + b`, `S` sampled from `±1` with `P(+1) = hardσ(W)`, straight-through gradient.
    LinearStocBinaryWeights,
}

impl DenseMapping {
    pub const NAMES: [&'static str; 7] = [
        "linear",
        "linear_asym_dx",
        "linear_blocked_dx",
        "radial",
        "radial_asym_dx",
        "linear_binary_weights",
        "linear_stoc_binary_weights",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DenseMapping::Linear => "linear",
            DenseMapping::LinearAsymDx => "linear_asym_dx",
            DenseMapping::LinearBlockedDx => "linear_blocked_dx",
            DenseMapping::Radial => "radial",
            DenseMapping::RadialAsymDx => "radial_asym_dx",
            DenseMapping::LinearBinaryWeights => "linear_binary_weights",
            DenseMapping::LinearStocBinaryWeights => "linear_stoc_binary_weights",
        }
    }

    /// Whether the mapping needs a feedback weight matrix.
    pub fn uses_feedback(&self) -> bool {
        matches!(self, DenseMapping::LinearAsymDx | DenseMapping::RadialAsymDx)
    }
}

impl fmt::Display for DenseMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DenseMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(DenseMapping::Linear),
            "linear_asym_dx" => Ok(DenseMapping::LinearAsymDx),
            "linear_blocked_dx" => Ok(DenseMapping::LinearBlockedDx),
            "radial" => Ok(DenseMapping::Radial),
            "radial_asym_dx" => Ok(DenseMapping::RadialAsymDx),
            "linear_binary_weights" => Ok(DenseMapping::LinearBinaryWeights),
            "linear_stoc_binary_weights" => Ok(DenseMapping::LinearStocBinaryWeights),
            other => Err(format!(
                "Invalid dense forward mapping '{}'. Must be one of: {}",
                other,
                DenseMapping::NAMES.join(", ")
            )),
        }
    }
}

/// Forward mapping of a [`GenConv`](super::GenConv) layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvMapping {
    #[default]
    ConvLinear,
    /// Convolution forward, input gradient through the feedback filters.
    ConvLinearAsymDx,
}

impl ConvMapping {
    pub const NAMES: [&'static str; 2] = ["conv_linear", "conv_linear_asym_dx"];

    pub fn name(&self) -> &'static str {
        match self {
            ConvMapping::ConvLinear => "conv_linear",
            ConvMapping::ConvLinearAsymDx => "conv_linear_asym_dx",
        }
    }

    pub fn uses_feedback(&self) -> bool {
        matches!(self, ConvMapping::ConvLinearAsymDx)
    }
}

impl fmt::Display for ConvMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConvMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conv_linear" => Ok(ConvMapping::ConvLinear),
            "conv_linear_asym_dx" => Ok(ConvMapping::ConvLinearAsymDx),
            other => Err(format!(
                "Invalid conv forward mapping '{}'. Must be one of: {}",
                other,
                ConvMapping::NAMES.join(", ")
            )),
        }
    }
}
