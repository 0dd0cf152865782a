//! Configuration for the dynamic-k matcher and the positive/negative selector

use crate::error::{MatchError, Result};
use serde::{Deserialize, Serialize};

/// Cost and pool parameters of the dynamic-k matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Focal cost alpha
    pub focal_alpha: f32,

    /// Focal cost gamma
    pub focal_gamma: f32,

    /// Added inside the logarithms of the focal cost
    pub eps: f32,

    /// Weight of the negative GIoU term
    pub giou_weight: f32,

    /// Added when a prediction is not inside both the box and the centre square of a GT
    pub center_penalty: f32,

    /// Added to predictions outside every GT box and centre square
    pub out_of_region_penalty: f32,

    /// Added to already matched predictions on each starvation pass
    pub starvation_penalty: f32,

    /// Half side of the centre square, in stride units
    pub center_radius: f32,

    /// Stride divisor applied to `center_radius`
    pub expanded_strides: f32,

    /// Candidate pool used for the strict (positive) assignment
    pub strict_pool_size: usize,

    /// Candidate pool used for the loose (negative) assignment
    pub loose_pool_size: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            focal_alpha: 0.25,
            focal_gamma: 2.0,
            eps: 1e-8,
            giou_weight: 3.0,
            center_penalty: 100.0,
            out_of_region_penalty: 10000.0,
            starvation_penalty: 100000.0,
            center_radius: 2.5,
            expanded_strides: 32.0,
            strict_pool_size: 10,
            loose_pool_size: 100,
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.expanded_strides > 0.0) {
            return Err(MatchError::config(format!(
                "expanded_strides must be positive, got {}",
                self.expanded_strides
            )));
        }
        if self.center_radius < 0.0 {
            return Err(MatchError::config(format!(
                "center_radius must be non-negative, got {}",
                self.center_radius
            )));
        }
        if self.strict_pool_size == 0 || self.loose_pool_size == 0 {
            return Err(MatchError::config("candidate pool sizes must be non-zero"));
        }
        if !(self.starvation_penalty > 0.0) {
            return Err(MatchError::config("starvation_penalty must be positive"));
        }
        Ok(())
    }
}

/// Parameters of contrast batch assembly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub matcher: MatcherConfig,

    /// Auxiliary negatives kept per positive
    pub aux_neg_ratio: usize,

    /// Lower bound on sampled auxiliary negatives (capped by what is available)
    pub aux_min_negatives: usize,

    /// Norm floor used by L2 normalisation
    pub normalize_eps: f32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            matcher: MatcherConfig::default(),
            aux_neg_ratio: 10,
            aux_min_negatives: 10,
            normalize_eps: 1e-12,
        }
    }
}

impl SelectorConfig {
    pub fn validate(&self) -> Result<()> {
        self.matcher.validate()?;
        if self.aux_neg_ratio == 0 {
            return Err(MatchError::config("aux_neg_ratio must be non-zero"));
        }
        if !(self.normalize_eps > 0.0) {
            return Err(MatchError::config("normalize_eps must be positive"));
        }
        Ok(())
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
