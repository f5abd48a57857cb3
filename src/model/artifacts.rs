//! Gradient-boosted tree bundles serialized to JSON by the training
//! pipeline.
//!
//! The pipeline treats a bundle as an opaque scoring function: a dense row
//! is built in the bundle's `feature_cols` order (NaN for absent names) and
//! walked through every tree. NaN takes a node's default branch, matching
//! the trainer's missing-value handling.

use std::path::Path;

use serde::Deserialize;

use crate::errors::AppError;
use crate::features::FeatureMap;

/// Link function applied to the summed tree outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Sigmoid link for binary probability output.
    BinaryLogistic,
    /// Identity link for scalar regression output.
    Regression,
}

/// One tree node. Leaves carry `leaf`; splits carry the remaining fields
/// with child indices into the tree's node array.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeNode {
    #[serde(default)]
    pub leaf: Option<f64>,
    #[serde(default)]
    pub feature: Option<usize>,
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Branch taken when the feature value is NaN.
    #[serde(default = "default_true")]
    pub default_left: bool,
    #[serde(default)]
    pub left: Option<usize>,
    #[serde(default)]
    pub right: Option<usize>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

/// A scoring bundle: trees + the feature-column ordering they were trained
/// with + a version string.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelBundle {
    pub version: String,
    pub objective: Objective,
    pub feature_cols: Vec<String>,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl ModelBundle {
    /// Load a bundle from a JSON file.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| AppError::Internal(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Score one feature map. Absent feature names become NaN.
    pub fn score(&self, features: &FeatureMap) -> f64 {
        let row: Vec<f64> = self
            .feature_cols
            .iter()
            .map(|col| features.get(col.as_str()).copied().unwrap_or(f64::NAN))
            .collect();

        let mut total = self.base_score;
        for tree in &self.trees {
            total += walk_tree(tree, &row);
        }

        match self.objective {
            Objective::BinaryLogistic => 1.0 / (1.0 + (-total).exp()),
            Objective::Regression => total,
        }
    }
}

fn walk_tree(tree: &Tree, row: &[f64]) -> f64 {
    let mut idx = 0usize;
    loop {
        let Some(node) = tree.nodes.get(idx) else {
            return 0.0;
        };
        if let Some(value) = node.leaf {
            return value;
        }
        let (Some(feature), Some(threshold)) = (node.feature, node.threshold) else {
            return 0.0;
        };
        let x = row.get(feature).copied().unwrap_or(f64::NAN);
        let go_left = if x.is_nan() {
            node.default_left
        } else {
            x < threshold
        };
        let next = if go_left { node.left } else { node.right };
        match next {
            Some(n) => idx = n,
            None => return 0.0,
        }
    }
}
