use crate::error::{LayoutError, Result};
use crate::index::{Location, Shape};

/// A virtual multi-dimensional mesh of processes.
///
/// Each grid dimension (an *axis*) can distribute at most one tensor mode. Processes are
/// addressed either by their grid coordinate (one entry per axis) or by the equivalent
/// column-major linear index.
///
/// For example, a grid with shape `[2, 4]` holds eight processes; process `[1, 3]` has
/// linear index `1 + 3 * 2 = 7`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProcessGrid {
    shape: Shape,
}

impl ProcessGrid {
    /// Creates a grid with the given extent along each axis.
    ///
    /// Returns [`LayoutError::NonPositiveDimension`] if any axis is empty.
    pub fn new<S: Into<Vec<usize>>>(shape: S) -> Result<Self> {
        Ok(Self::from_shape(Shape::new(shape)?))
    }

    /// Creates a grid from an already-validated shape.
    pub fn from_shape(shape: Shape) -> Self {
        Self { shape }
    }

    /// Parses a grid shape such as `"2, 4"`.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self::from_shape(Shape::parse(text)?))
    }

    /// The grid shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Extent of every axis.
    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    /// Column-major strides of the grid.
    pub fn strides(&self) -> &[usize] {
        self.shape.strides()
    }

    /// Number of grid axes.
    pub fn order(&self) -> usize {
        self.shape.order()
    }

    /// Number of processes.
    pub fn size(&self) -> usize {
        self.shape.size()
    }

    /// Extent of `axis`, if it exists.
    pub fn axis_size(&self, axis: usize) -> Option<usize> {
        self.dims().get(axis).copied()
    }

    /// Grid coordinate of the process with linear index `index`.
    pub fn linear_to_multi(&self, index: usize) -> Vec<usize> {
        self.shape.linear_to_multi(index)
    }

    /// Linear index of a process.
    pub fn multi_to_linear<'a, L: Into<Location<'a>>>(&self, process: L) -> usize {
        self.shape.multi_to_linear(process)
    }

    /// Checks that `process` is a coordinate of this grid.
    pub fn check_process(&self, process: &[usize]) -> Result<()> {
        if self.shape.contains(process) {
            Ok(())
        } else {
            Err(LayoutError::ProcessOutOfRange {
                process: process.to_vec(),
                grid_shape: self.dims().to_vec(),
            })
        }
    }

    /// Every process coordinate, in ascending linear order.
    pub fn processes(&self) -> impl Iterator<Item = Vec<usize>> + '_ {
        self.shape.locations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_grid_2x4() {
        let grid = ProcessGrid::new([2, 4]).unwrap();

        assert_eq!(grid.order(), 2);
        assert_eq!(grid.size(), 8);
        assert_eq!(grid.strides(), &[1, 2]);
        assert_eq!(grid.axis_size(1), Some(4));
        assert_eq!(grid.axis_size(2), None);
        assert_eq!(grid.multi_to_linear(&[1usize, 3]), 7);
        assert_eq!(grid.linear_to_multi(7), vec![1, 3]);
    }

    #[test]
    fn test_process_grid_enumerates_processes_in_linear_order() {
        let grid = ProcessGrid::parse("2 2").unwrap();
        let processes: Vec<_> = grid.processes().collect();

        assert_eq!(
            processes,
            vec![vec![0, 0], vec![1, 0], vec![0, 1], vec![1, 1]]
        );
    }

    #[test]
    #[should_panic = "NonPositiveDimension { shape: [3, 0] }"]
    fn test_process_grid_axes_should_be_non_empty() {
        let _grid = ProcessGrid::new([3, 0]).unwrap();
    }

    #[test]
    #[should_panic = "ProcessOutOfRange { process: [2, 0], grid_shape: [2, 4] }"]
    fn test_process_grid_process_should_be_in_bound() {
        let grid = ProcessGrid::new([2, 4]).unwrap();
        grid.check_process(&[2, 0]).unwrap();
    }

    #[test]
    #[should_panic = "ProcessOutOfRange { process: [0], grid_shape: [2, 4] }"]
    fn test_process_grid_process_should_match_order() {
        let grid = ProcessGrid::new([2, 4]).unwrap();
        grid.check_process(&[0]).unwrap();
    }
}
