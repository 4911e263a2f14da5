//! Serializable layout configuration.

use serde::{Deserialize, Serialize};

use crate::distribution::TensorDistribution;
use crate::error::Result;
use crate::grid::ProcessGrid;
use crate::index::Shape;
use crate::tensor::DistributedTensor;

/// Textual description of a distributed tensor layout.
///
/// ```json
/// {
///     "tensor_shape": "4, 8",
///     "grid_shape": "2, 4",
///     "distribution": "[(0), (1)]"
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Global tensor shape, e.g. `"4, 8"`.
    pub tensor_shape: String,
    /// Process grid shape, e.g. `"2, 4"`.
    pub grid_shape: String,
    /// Tensor distribution, e.g. `"[(0), (1)]"`.
    pub distribution: String,
}

impl LayoutConfig {
    /// Creates a configuration from its three text fields.
    pub fn new<T: Into<String>, G: Into<String>, D: Into<String>>(
        tensor_shape: T,
        grid_shape: G,
        distribution: D,
    ) -> Self {
        Self {
            tensor_shape: tensor_shape.into(),
            grid_shape: grid_shape.into(),
            distribution: distribution.into(),
        }
    }

    /// Decodes a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encodes the configuration as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses both shapes and the distribution, and builds the tensor.
    pub fn build(&self) -> Result<DistributedTensor> {
        let shape = Shape::parse(&self.tensor_shape)?;
        let grid = ProcessGrid::parse(&self.grid_shape)?;
        let distribution =
            TensorDistribution::parse_checked(&self.distribution, grid.order(), shape.order())?;
        DistributedTensor::new(shape, distribution, grid)
    }
}

impl From<&DistributedTensor> for LayoutConfig {
    fn from(tensor: &DistributedTensor) -> Self {
        let join = |dims: &[usize]| {
            dims.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        Self {
            tensor_shape: join(tensor.shape().dims()),
            grid_shape: join(tensor.grid().dims()),
            distribution: tensor.distribution().to_string(),
        }
    }
}
