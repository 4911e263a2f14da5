use crate::distribution::TensorDistribution;
use crate::error::{LayoutError, Result, check_mode};
use crate::grid::ProcessGrid;
use crate::index::{Shape, linear_to_multi, multi_to_linear, shape_to_strides};

/// One copy of a global element: the process holding it and its coordinate there.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Placement {
    /// Grid coordinate of the owning process.
    pub process: Vec<usize>,
    /// Coordinate of the element in the process's local block.
    pub local: Vec<usize>,
}

/// Represents a tensor that is distributed (block-cyclically and/or replicated) across a
/// process grid.
///
/// A `DistributedTensor` holds no element data. It combines the global tensor shape, the
/// [`TensorDistribution`] assigning each mode to grid axes, and the [`ProcessGrid`], and
/// answers which processes own a global element and where that element sits locally.
///
/// Along mode `d` the grid axes listed in `distribution[d]` fold, column-major, into a
/// *logical grid* of `factor(d)` positions. Global index `i` along that mode belongs to
/// logical position `i % factor(d)` at local index `i / factor(d)`. Grid axes listed by no
/// mode replicate the whole layout.
///
/// Instances are immutable. A redistribution produces a new tensor rather than editing an
/// existing one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistributedTensor {
    /// Global shape of the tensor.
    shape: Shape,
    /// Assignment of tensor modes to grid axes.
    distribution: TensorDistribution,
    /// The process grid.
    grid: ProcessGrid,
    /// Per-mode product of the extents of its grid axes.
    factors: Vec<usize>,
    /// Per-mode column-major strides of the sub-grid spanned by its grid axes.
    sub_grid_strides: Vec<Vec<usize>>,
}

impl DistributedTensor {
    /// Creates a distributed tensor.
    ///
    /// The distribution must have one entry per tensor mode and must be valid for the grid.
    pub fn new(shape: Shape, distribution: TensorDistribution, grid: ProcessGrid) -> Result<Self> {
        if distribution.order() != shape.order() {
            return Err(LayoutError::RankMismatch {
                expected: shape.order(),
                actual: distribution.order(),
            });
        }
        distribution.validate(grid.order())?;

        let mut factors = Vec::with_capacity(shape.order());
        let mut sub_grid_strides = Vec::with_capacity(shape.order());
        for mode in distribution.modes() {
            let sub_grid = mode.sub_grid_shape(&grid);
            factors.push(sub_grid.iter().product());
            sub_grid_strides.push(shape_to_strides(&sub_grid)?);
        }

        log::trace!(
            "distributed tensor {} over grid {} as {}",
            shape,
            grid.shape(),
            distribution
        );

        Ok(Self {
            shape,
            distribution,
            grid,
            factors,
            sub_grid_strides,
        })
    }

    /// Parses the tensor shape, grid shape and distribution from their textual forms.
    pub fn parse(tensor_shape: &str, grid_shape: &str, distribution: &str) -> Result<Self> {
        let shape = Shape::parse(tensor_shape)?;
        let grid = ProcessGrid::parse(grid_shape)?;
        let distribution = TensorDistribution::parse(distribution, shape.order())?;
        Self::new(shape, distribution, grid)
    }

    /// Global shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Distribution of the modes over the grid.
    pub fn distribution(&self) -> &TensorDistribution {
        &self.distribution
    }

    /// The process grid.
    pub fn grid(&self) -> &ProcessGrid {
        &self.grid
    }

    /// Number of modes.
    pub fn order(&self) -> usize {
        self.shape.order()
    }

    /// Number of global elements.
    pub fn size(&self) -> usize {
        self.shape.size()
    }

    /// Number of logical positions along each mode (`1` for an undistributed mode).
    pub fn logical_grid_shape(&self) -> &[usize] {
        &self.factors
    }

    /// Grid axes that distribute no mode.
    pub fn replication_axes(&self) -> Vec<usize> {
        self.distribution.replication_axes(self.grid.order())
    }

    /// Number of copies held of every element.
    pub fn replication_factor(&self) -> usize {
        self.replication_axes()
            .iter()
            .map(|&axis| self.grid.dims()[axis])
            .product()
    }

    /// Upper bound on the local extent of `mode` over all processes: `ceil(n / factor)`.
    pub fn max_local_length(&self, mode: usize) -> Result<usize> {
        check_mode("mode", mode, self.order())?;
        Ok(self.max_local_length_unchecked(mode))
    }

    /// [`Self::max_local_length`] for every mode.
    pub fn max_local_lengths(&self) -> Vec<usize> {
        (0..self.order())
            .map(|mode| self.max_local_length_unchecked(mode))
            .collect()
    }

    /// Local extent of `mode` on `process`.
    ///
    /// When the extent does not divide evenly, the first `n % factor` logical positions hold
    /// one extra element.
    pub fn local_length(&self, mode: usize, process: &[usize]) -> Result<usize> {
        check_mode("mode", mode, self.order())?;
        self.grid.check_process(process)?;
        Ok(self.local_length_unchecked(mode, process))
    }

    /// Local extent of every mode on `process`.
    pub fn local_shape(&self, process: &[usize]) -> Result<Vec<usize>> {
        self.grid.check_process(process)?;
        Ok((0..self.order())
            .map(|mode| self.local_length_unchecked(mode, process))
            .collect())
    }

    /// Local shape of every process, indexed by the process's linear grid index.
    pub fn process_local_shapes(&self) -> Vec<Vec<usize>> {
        self.grid
            .processes()
            .map(|process| {
                (0..self.order())
                    .map(|mode| self.local_length_unchecked(mode, &process))
                    .collect()
            })
            .collect()
    }

    /// Logical position of `process` along every mode.
    pub fn logical_grid_location(&self, process: &[usize]) -> Result<Vec<usize>> {
        self.grid.check_process(process)?;
        Ok((0..self.order())
            .map(|mode| self.owner_offset(mode, process))
            .collect())
    }

    /// Every process holding the element at `location`, in ascending linear grid order.
    ///
    /// Distributed modes pin the coordinates of their grid axes; each replication axis
    /// contributes every one of its coordinates, so the result has exactly
    /// [`Self::replication_factor`] members.
    pub fn owning_processes(&self, location: &[usize]) -> Result<Vec<Vec<usize>>> {
        self.check_location(location)?;

        let mut pinned: Vec<Option<usize>> = vec![None; self.grid.order()];
        for (mode, &index) in location.iter().enumerate() {
            let axes = self.distribution.modes()[mode].axes();
            if axes.is_empty() {
                continue;
            }
            let position = index % self.factors[mode];
            let coords = linear_to_multi(position, &self.sub_grid_strides[mode]);
            for (&axis, coord) in axes.iter().zip(coords) {
                pinned[axis] = Some(coord);
            }
        }

        let free_axes: Vec<usize> = (0..pinned.len()).filter(|&a| pinned[a].is_none()).collect();
        let free_shape: Vec<usize> = free_axes.iter().map(|&a| self.grid.dims()[a]).collect();
        let free_strides = shape_to_strides(&free_shape)?;
        let replicas: usize = free_shape.iter().product();

        let owners = (0..replicas)
            .map(|replica| {
                let mut process: Vec<usize> = pinned.iter().map(|c| c.unwrap_or(0)).collect();
                for (&axis, coord) in free_axes.iter().zip(linear_to_multi(replica, &free_strides)) {
                    process[axis] = coord;
                }
                process
            })
            .collect();
        Ok(owners)
    }

    /// Coordinate of the element at global `location` in the local block of `process`.
    ///
    /// Fails with [`LayoutError::NotAnOwner`] if `process` does not hold the element.
    pub fn local_location(&self, process: &[usize], location: &[usize]) -> Result<Vec<usize>> {
        self.check_location(location)?;
        self.grid.check_process(process)?;

        let mut local = Vec::with_capacity(self.order());
        for (mode, &index) in location.iter().enumerate() {
            let factor = self.factors[mode];
            let offset = self.owner_offset(mode, process);
            if index % factor != offset {
                return Err(LayoutError::NotAnOwner {
                    process: process.to_vec(),
                    location: location.to_vec(),
                });
            }
            local.push((index - offset) / factor);
        }
        Ok(local)
    }

    /// Every copy of the element at `location`: one [`Placement`] per owning process.
    pub fn local_locations(&self, location: &[usize]) -> Result<Vec<Placement>> {
        self.owning_processes(location)?
            .into_iter()
            .map(|process| {
                let local = self.local_location(&process, location)?;
                Ok(Placement { process, local })
            })
            .collect()
    }

    /// Global location of the element at `local` on `process`; the inverse of
    /// [`Self::local_location`].
    pub fn global_location(&self, process: &[usize], local: &[usize]) -> Result<Vec<usize>> {
        self.grid.check_process(process)?;
        if local.len() != self.order() {
            return Err(LayoutError::RankMismatch {
                expected: self.order(),
                actual: local.len(),
            });
        }

        // Saturated coordinates are out of range for every shape.
        let global: Vec<usize> = local
            .iter()
            .enumerate()
            .map(|(mode, &index)| {
                index
                    .saturating_mul(self.factors[mode])
                    .saturating_add(self.owner_offset(mode, process))
            })
            .collect();
        if !self.shape.contains(&global) {
            return Err(LayoutError::GlobalLocationOutOfRange {
                location: global,
                shape: self.shape.dims().to_vec(),
            });
        }
        Ok(global)
    }

    fn max_local_length_unchecked(&self, mode: usize) -> usize {
        let size = self.shape.dims()[mode];
        if size == 0 {
            0
        } else {
            (size - 1) / self.factors[mode] + 1
        }
    }

    fn local_length_unchecked(&self, mode: usize, process: &[usize]) -> usize {
        let size = self.shape.dims()[mode];
        let factor = self.factors[mode];
        let max_length = self.max_local_length_unchecked(mode);
        let remainder = size % factor;

        if remainder == 0 || self.owner_offset(mode, process) < remainder {
            max_length
        } else {
            max_length - 1
        }
    }

    // Linear position of `process` within the sub-grid of `mode`; 0 for undistributed modes.
    fn owner_offset(&self, mode: usize, process: &[usize]) -> usize {
        let coords: Vec<usize> = self.distribution.modes()[mode]
            .axes()
            .iter()
            .map(|&axis| process[axis])
            .collect();
        multi_to_linear(&coords, &self.sub_grid_strides[mode])
    }

    fn check_location(&self, location: &[usize]) -> Result<()> {
        if location.len() != self.order() {
            return Err(LayoutError::RankMismatch {
                expected: self.order(),
                actual: location.len(),
            });
        }
        if !self.shape.contains(location) {
            return Err(LayoutError::GlobalLocationOutOfRange {
                location: location.to_vec(),
                shape: self.shape.dims().to_vec(),
            });
        }
        Ok(())
    }
}
