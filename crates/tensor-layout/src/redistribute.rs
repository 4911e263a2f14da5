//! Redistribution of a distributed tensor by collective operations.
//!
//! Each [`Collective`] maps the distribution of a [`DistributedTensor`] to a new one:
//!
//! | Collective | Effect on the distribution | Effect on the shape |
//! |---|---|---|
//! | `AllGather { mode }` | `mode` becomes undistributed | unchanged |
//! | `ReduceScatter { reduce_mode, scatter_mode }` | `scatter_mode` takes its own axes followed by the axes of `reduce_mode`, then `reduce_mode` is dropped | `reduce_mode` is dropped |
//! | `Permute { mode, distribution }` | `mode` takes `distribution` | unchanged |
//! | `AllToAll { distribution }` | replaced wholesale | unchanged |
//!
//! Nothing is moved: the engine only computes where every element would go. A failed
//! computation returns an error and leaves nothing half-applied, and every result is
//! re-validated against the grid before it is returned.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::distribution::{ModeDistribution, TensorDistribution};
use crate::error::{LayoutError, Result, check_mode};
use crate::index::Shape;
use crate::tensor::{DistributedTensor, Placement};

/// Kind of collective named by a [`RedistributionRequest`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Fully replicate one mode.
    #[serde(alias = "ag")]
    AllGather,
    /// Reduce one mode away and scatter its grid axes onto another.
    #[serde(alias = "rs")]
    ReduceScatter,
    /// Reassign the grid axes of one mode (peer-to-peer).
    #[serde(alias = "p2p")]
    Permute,
    /// Replace the whole distribution.
    #[serde(alias = "a2a")]
    AllToAll,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::AllGather => "AllGather",
            Operation::ReduceScatter => "ReduceScatter",
            Operation::Permute => "Permute",
            Operation::AllToAll => "AllToAll",
        };
        f.write_str(name)
    }
}

/// An untyped redistribution request as entered by an operator.
///
/// | Operation | `input1` | `input2` |
/// |---|---|---|
/// | `AllGather` | mode | ignored |
/// | `ReduceScatter` | reduce mode | scatter mode |
/// | `Permute` | mode | mode distribution, e.g. `(0, 1)` |
/// | `AllToAll` | tensor distribution, e.g. `[(1), (0)]` | ignored |
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedistributionRequest {
    /// The collective to apply.
    pub operation: Operation,
    /// First operand.
    #[serde(default)]
    pub input1: String,
    /// Second operand.
    #[serde(default)]
    pub input2: String,
}

impl RedistributionRequest {
    /// Creates a request.
    pub fn new<A: Into<String>, B: Into<String>>(operation: Operation, input1: A, input2: B) -> Self {
        Self {
            operation,
            input1: input1.into(),
            input2: input2.into(),
        }
    }
}

/// A typed collective operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Collective {
    /// Fully replicate `mode`.
    AllGather {
        /// The mode to gather.
        mode: usize,
    },
    /// Sum over `reduce_mode` and scatter the result along `scatter_mode`.
    ReduceScatter {
        /// The mode reduced away.
        reduce_mode: usize,
        /// The mode receiving the grid axes of `reduce_mode`.
        scatter_mode: usize,
    },
    /// Redistribute `mode` over a new set of grid axes.
    Permute {
        /// The mode to move.
        mode: usize,
        /// Its new grid axes.
        distribution: ModeDistribution,
    },
    /// Replace the whole distribution.
    AllToAll {
        /// The new distribution.
        distribution: TensorDistribution,
    },
}

impl Collective {
    /// Decodes the operands of `request` for a tensor of order `order`.
    ///
    /// Modes must be integers in `[0, order)`; missing or non-numeric operands fail with
    /// [`LayoutError::InvalidMode`]. Unused operands are ignored.
    pub fn from_request(request: &RedistributionRequest, order: usize) -> Result<Self> {
        match request.operation {
            Operation::AllGather => Ok(Self::AllGather {
                mode: parse_mode("all-gather mode", &request.input1, order)?,
            }),
            Operation::ReduceScatter => Ok(Self::ReduceScatter {
                reduce_mode: parse_mode("reduce mode", &request.input1, order)?,
                scatter_mode: parse_mode("scatter mode", &request.input2, order)?,
            }),
            Operation::Permute => Ok(Self::Permute {
                mode: parse_mode("permutation mode", &request.input1, order)?,
                distribution: ModeDistribution::parse(&request.input2)?,
            }),
            Operation::AllToAll => Ok(Self::AllToAll {
                distribution: TensorDistribution::parse(&request.input1, order)?,
            }),
        }
    }

    /// The kind of this collective.
    pub fn operation(&self) -> Operation {
        match self {
            Self::AllGather { .. } => Operation::AllGather,
            Self::ReduceScatter { .. } => Operation::ReduceScatter,
            Self::Permute { .. } => Operation::Permute,
            Self::AllToAll { .. } => Operation::AllToAll,
        }
    }
}

fn parse_mode(parameter: &str, text: &str, order: usize) -> Result<usize> {
    let invalid = || LayoutError::InvalidMode {
        parameter: parameter.to_string(),
        value: text.to_string(),
        order,
    };
    let mode = text.trim().parse::<usize>().map_err(|_| invalid())?;
    if mode >= order {
        return Err(invalid());
    }
    Ok(mode)
}

/// The outcome of a collective: the new distribution and, for ReduceScatter, the new shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redistribution {
    collective: Collective,
    distribution: TensorDistribution,
    shape: Option<Shape>,
}

impl Redistribution {
    /// The collective that produced this result.
    pub fn collective(&self) -> &Collective {
        &self.collective
    }

    /// The new distribution.
    pub fn distribution(&self) -> &TensorDistribution {
        &self.distribution
    }

    /// The new tensor shape, if the collective changed it.
    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    /// The mode removed by a ReduceScatter.
    pub fn reduced_mode(&self) -> Option<usize> {
        match self.collective {
            Collective::ReduceScatter { reduce_mode, .. } => Some(reduce_mode),
            _ => None,
        }
    }

    /// Builds the redistributed tensor on the grid of `current`.
    pub fn apply(&self, current: &DistributedTensor) -> Result<DistributedTensor> {
        let shape = self.shape.as_ref().unwrap_or(current.shape()).clone();
        DistributedTensor::new(shape, self.distribution.clone(), current.grid().clone())
    }

    /// Element correspondence between `old` and the tensor `new` built from this result.
    pub fn correspondence(
        &self,
        old: &DistributedTensor,
        new: &DistributedTensor,
    ) -> Result<Vec<ElementTransfer>> {
        correspondence(old, new, self.reduced_mode())
    }
}

/// Computes the distribution (and, for ReduceScatter, the shape) produced by applying
/// `collective` to `current`.
pub fn compute_new_distribution(
    current: &DistributedTensor,
    collective: &Collective,
) -> Result<Redistribution> {
    let result = new_distribution(current, collective);
    match &result {
        Ok(redistribution) => log::debug!(
            "{}: {} -> {}",
            collective.operation(),
            current.distribution(),
            redistribution.distribution
        ),
        Err(err) => log::debug!(
            "{} rejected for {}: {}",
            collective.operation(),
            current.distribution(),
            err
        ),
    }
    result
}

fn new_distribution(current: &DistributedTensor, collective: &Collective) -> Result<Redistribution> {
    let order = current.order();
    let grid_order = current.grid().order();
    let mut modes = current.distribution().modes().to_vec();
    let mut shape = None;

    match collective {
        Collective::AllGather { mode } => {
            check_mode("all-gather mode", *mode, order)?;
            modes[*mode] = ModeDistribution::replicated();
        }
        Collective::ReduceScatter {
            reduce_mode,
            scatter_mode,
        } => {
            check_mode("reduce mode", *reduce_mode, order)?;
            check_mode("scatter mode", *scatter_mode, order)?;
            if reduce_mode == scatter_mode {
                return Err(LayoutError::DistinctModesRequired {
                    mode: *reduce_mode,
                });
            }
            modes[*scatter_mode] = modes[*scatter_mode].concat(&modes[*reduce_mode]);
            modes.remove(*reduce_mode);
            shape = current.shape().without_mode(*reduce_mode);
        }
        Collective::Permute { mode, distribution } => {
            check_mode("permutation mode", *mode, order)?;
            modes[*mode] = distribution.clone();
        }
        Collective::AllToAll { distribution } => {
            if distribution.order() != order {
                return Err(LayoutError::RankMismatch {
                    expected: order,
                    actual: distribution.order(),
                });
            }
            modes = distribution.modes().to_vec();
        }
    }

    let distribution = TensorDistribution::new(modes);
    distribution.validate(grid_order)?;
    Ok(Redistribution {
        collective: collective.clone(),
        distribution,
        shape,
    })
}

/// Decodes `request` against `current` and computes the resulting distribution.
pub fn compute_from_request(
    current: &DistributedTensor,
    request: &RedistributionRequest,
) -> Result<Redistribution> {
    let collective = Collective::from_request(request, current.order())?;
    compute_new_distribution(current, &collective)
}

/// Where one global element of the pre-redistribution tensor ends up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementTransfer {
    /// Global location in the old tensor.
    pub source: Vec<usize>,
    /// Global location in the new tensor; `source` without the reduced mode, if any.
    pub target: Vec<usize>,
    /// Every copy of the element before the redistribution.
    pub from: Vec<Placement>,
    /// Every copy of the target element after the redistribution.
    pub to: Vec<Placement>,
}

impl ElementTransfer {
    /// Every (old copy, new copy) pair.
    pub fn pairs(&self) -> impl Iterator<Item = (&Placement, &Placement)> + '_ {
        self.from
            .iter()
            .flat_map(move |from| self.to.iter().map(move |to| (from, to)))
    }
}

/// Relates every global element of `old` to its copies in `new`.
///
/// With `reduced_mode` set, `new` must have the shape of `old` without that mode and every
/// old element maps to the new element obtained by dropping its coordinate along the reduced
/// mode. Otherwise both tensors must have the same shape. The result has one entry per
/// element of `old`, in column-major order.
pub fn correspondence(
    old: &DistributedTensor,
    new: &DistributedTensor,
    reduced_mode: Option<usize>,
) -> Result<Vec<ElementTransfer>> {
    let expected = match reduced_mode {
        Some(mode) => {
            check_mode("reduce mode", mode, old.order())?;
            old.shape().without_mode(mode).unwrap_or_else(|| old.shape().clone())
        }
        None => old.shape().clone(),
    };
    if expected.dims() != new.shape().dims() {
        return Err(LayoutError::ShapeMismatch {
            expected: expected.dims().to_vec(),
            actual: new.shape().dims().to_vec(),
        });
    }

    let mut transfers = Vec::with_capacity(old.size());
    for source in old.shape().locations() {
        let mut target = source.clone();
        if let Some(mode) = reduced_mode {
            target.remove(mode);
        }
        let from = old.local_locations(&source)?;
        let to = new.local_locations(&target)?;
        transfers.push(ElementTransfer {
            source,
            target,
            from,
            to,
        });
    }

    log::trace!(
        "correspondence {} -> {}: {} elements, {} transfers",
        old.distribution(),
        new.distribution(),
        transfers.len(),
        transfers.iter().map(|t| t.from.len() * t.to.len()).sum::<usize>()
    );
    Ok(transfers)
}
