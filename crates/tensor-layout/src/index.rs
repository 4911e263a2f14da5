//! Shape, stride and index arithmetic.
//!
//! Every layout in this crate is column-major: the first mode varies fastest, so
//! `strides[0] == 1` and `strides[i] == strides[i - 1] * shape[i - 1]`. Tensor shapes, process
//! grids and the sub-grids spanned by a single mode all share these conversions.

use core::fmt;

use crate::error::{LayoutError, Result};

/// Computes the column-major strides of `shape`.
///
/// Fails with [`LayoutError::NonPositiveDimension`] if any extent is zero, and with
/// [`LayoutError::ShapeOverflow`] if the number of elements does not fit in a `usize`.
pub fn shape_to_strides(shape: &[usize]) -> Result<Vec<usize>> {
    if shape.contains(&0) {
        return Err(LayoutError::NonPositiveDimension {
            shape: shape.to_vec(),
        });
    }
    shape
        .iter()
        .try_fold(1usize, |size, &extent| size.checked_mul(extent))
        .ok_or_else(|| LayoutError::ShapeOverflow {
            shape: shape.to_vec(),
        })?;
    Ok(column_major_strides(shape))
}

// Callers guarantee that every extent is positive and that the product fits in a `usize`.
fn column_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut stride = 1;
    for &size in shape {
        strides.push(stride);
        stride *= size;
    }
    strides
}

/// Converts a linear index into one coordinate per stride entry.
///
/// Peels off the largest stride first. `strides` must come from [`shape_to_strides`].
pub fn linear_to_multi(index: usize, strides: &[usize]) -> Vec<usize> {
    let mut remainder = index;
    let mut location = vec![0; strides.len()];
    for (j, &stride) in strides.iter().enumerate().rev() {
        let coord = remainder / stride;
        remainder -= coord * stride;
        location[j] = coord;
    }
    location
}

/// An index into a column-major layout, either already linear or one coordinate per mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Location<'a> {
    /// An already-linear index, passed through unchanged.
    Linear(usize),
    /// One coordinate per mode.
    Multi(&'a [usize]),
}

impl From<usize> for Location<'_> {
    fn from(index: usize) -> Self {
        Location::Linear(index)
    }
}

impl<'a> From<&'a [usize]> for Location<'a> {
    fn from(coords: &'a [usize]) -> Self {
        Location::Multi(coords)
    }
}

impl<'a> From<&'a Vec<usize>> for Location<'a> {
    fn from(coords: &'a Vec<usize>) -> Self {
        Location::Multi(coords.as_slice())
    }
}

impl<'a, const N: usize> From<&'a [usize; N]> for Location<'a> {
    fn from(coords: &'a [usize; N]) -> Self {
        Location::Multi(coords.as_slice())
    }
}

/// Converts a location into its linear index: the dot product of coordinates and strides.
///
/// A [`Location::Linear`] index is returned unchanged, which keeps zero-order layouts and
/// already-flattened indices on the same code path.
pub fn multi_to_linear<'a, L: Into<Location<'a>>>(location: L, strides: &[usize]) -> usize {
    match location.into() {
        Location::Linear(index) => index,
        Location::Multi(coords) => coords.iter().zip(strides).map(|(c, s)| c * s).sum(),
    }
}

/// An ordered list of positive extents, one per mode, with its column-major strides.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
    strides: Vec<usize>,
}

impl Shape {
    /// Creates a shape, rejecting zero extents and shapes with more than `usize::MAX` elements.
    pub fn new<S: Into<Vec<usize>>>(dims: S) -> Result<Self> {
        let dims = dims.into();
        let strides = shape_to_strides(&dims)?;
        Ok(Self { dims, strides })
    }

    /// Parses a comma- or whitespace-separated list of positive integers, e.g. `"4, 8"` or
    /// `"2 3 4"`.
    pub fn parse(text: &str) -> Result<Self> {
        let malformed = |token: &str| LayoutError::MalformedShape {
            input: text.to_string(),
            token: token.to_string(),
        };

        let mut dims = Vec::new();
        for token in text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
        {
            match token.parse::<usize>() {
                Ok(size) if size > 0 => dims.push(size),
                _ => return Err(malformed(token)),
            }
        }
        if dims.is_empty() {
            return Err(malformed(text.trim()));
        }
        Self::new(dims)
    }

    /// Extent of every mode.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Column-major strides.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Number of modes.
    pub fn order(&self) -> usize {
        self.dims.len()
    }

    /// Number of elements; `1` for a zero-order shape.
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns `true` if `location` has one in-range coordinate per mode.
    pub fn contains(&self, location: &[usize]) -> bool {
        location.len() == self.order() && location.iter().zip(&self.dims).all(|(c, d)| c < d)
    }

    /// Multi-index of the element at linear position `index`.
    pub fn linear_to_multi(&self, index: usize) -> Vec<usize> {
        linear_to_multi(index, &self.strides)
    }

    /// Linear position of `location`.
    pub fn multi_to_linear<'a, L: Into<Location<'a>>>(&self, location: L) -> usize {
        multi_to_linear(location, &self.strides)
    }

    /// Every multi-index of this shape, in column-major order.
    pub fn locations(&self) -> impl Iterator<Item = Vec<usize>> + '_ {
        (0..self.size()).map(move |index| self.linear_to_multi(index))
    }

    /// The shape with `mode` removed, or `None` if `mode` is out of range.
    pub fn without_mode(&self, mode: usize) -> Option<Self> {
        if mode >= self.order() {
            return None;
        }
        let mut dims = self.dims.clone();
        dims.remove(mode);
        let strides = column_major_strides(&dims);
        Some(Self { dims, strides })
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_strides_are_column_major() {
        assert_eq!(shape_to_strides(&[4, 8]).unwrap(), vec![1, 4]);
        assert_eq!(shape_to_strides(&[2, 3, 4]).unwrap(), vec![1, 2, 6]);
        assert!(shape_to_strides(&[]).unwrap().is_empty());
    }

    #[test]
    #[should_panic = "NonPositiveDimension { shape: [2, 0] }"]
    fn test_strides_reject_zero_extent() {
        shape_to_strides(&[2, 0]).unwrap();
    }

    #[test]
    fn test_strides_reject_overflowing_shape() {
        assert_eq!(
            Shape::parse("4294967296 4294967296"),
            Err(LayoutError::ShapeOverflow {
                shape: vec![4294967296, 4294967296],
            })
        );
        assert_eq!(
            shape_to_strides(&[usize::MAX, 2]),
            Err(LayoutError::ShapeOverflow {
                shape: vec![usize::MAX, 2],
            })
        );
        assert_eq!(shape_to_strides(&[usize::MAX, 1]).unwrap(), vec![1, usize::MAX]);
    }

    #[test]
    fn test_linear_to_multi() {
        let strides = [1, 4];
        assert_eq!(linear_to_multi(0, &strides), vec![0, 0]);
        assert_eq!(linear_to_multi(5, &strides), vec![1, 1]);
        assert_eq!(linear_to_multi(31, &strides), vec![3, 7]);
    }

    #[test]
    fn test_multi_to_linear_passes_linear_index_through() {
        let strides = [1, 4];
        assert_eq!(multi_to_linear(&[3usize, 7], &strides), 31);
        assert_eq!(multi_to_linear(17usize, &strides), 17);
        assert_eq!(multi_to_linear(&[] as &[usize], &[]), 0);
    }

    #[test]
    fn test_shape_locations_cover_every_element_once() {
        let shape = Shape::new([2, 3]).unwrap();
        let locations: Vec<_> = shape.locations().collect();
        assert_eq!(
            locations,
            vec![
                vec![0, 0],
                vec![1, 0],
                vec![0, 1],
                vec![1, 1],
                vec![0, 2],
                vec![1, 2]
            ]
        );
        for (index, location) in locations.iter().enumerate() {
            assert_eq!(shape.multi_to_linear(location), index);
        }
    }

    #[test]
    fn test_zero_order_shape_has_one_element() {
        let shape = Shape::new(Vec::new()).unwrap();
        assert_eq!(shape.size(), 1);
        assert_eq!(shape.locations().collect::<Vec<_>>(), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn test_without_mode() {
        let shape = Shape::new([4, 8, 2]).unwrap();
        let reduced = shape.without_mode(0).unwrap();
        assert_eq!(reduced.dims(), &[8, 2]);
        assert_eq!(reduced.strides(), &[1, 8]);
        assert!(shape.without_mode(3).is_none());
    }

    #[rstest]
    #[case("4, 8", vec![4, 8])]
    #[case("4 8", vec![4, 8])]
    #[case(" 2,3  4 ", vec![2, 3, 4])]
    #[case("7", vec![7])]
    fn test_shape_parse(#[case] text: &str, #[case] expected: Vec<usize>) {
        assert_eq!(Shape::parse(text).unwrap().dims(), expected.as_slice());
    }

    #[rstest]
    #[case("4, x", "x")]
    #[case("4, 0", "0")]
    #[case("-2", "-2")]
    #[case("  ", "")]
    fn test_shape_parse_rejects(#[case] text: &str, #[case] token: &str) {
        assert_eq!(
            Shape::parse(text),
            Err(LayoutError::MalformedShape {
                input: text.to_string(),
                token: token.to_string(),
            })
        );
    }
}
