#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Block-cyclic tensor layouts over process grids.
//!
//! A [`DistributedTensor`] describes how the elements of a global tensor are spread over a
//! [`ProcessGrid`]: which processes own each element and at which local coordinate. The
//! [`redistribute`] module computes the layout produced by the AllGather, ReduceScatter,
//! Permute and AllToAll collectives together with the element-level correspondence between
//! the old and new layouts.

mod error;
mod grid;
mod tensor;

pub mod config;
pub mod distribution;
pub mod index;
pub mod redistribute;
pub mod session;

pub use config::LayoutConfig;
pub use distribution::{ModeDistribution, TensorDistribution};
pub use error::*;
pub use grid::*;
pub use index::Shape;
pub use redistribute::{
    Collective, ElementTransfer, Operation, Redistribution, RedistributionRequest,
    compute_new_distribution, correspondence,
};
pub use session::{LayoutSession, Transition};
pub use tensor::*;
