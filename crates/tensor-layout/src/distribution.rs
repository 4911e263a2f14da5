//! Distribution descriptors: which grid axes distribute each tensor mode.
//!
//! A [`TensorDistribution`] holds one [`ModeDistribution`] per tensor mode. Its textual form
//! lists one parenthesised group of grid axes per mode:
//!
//! ```text
//! [(0), (1), (2), (3)]   order 4, mode i distributed over grid axis i
//! [(1,0), ()]            mode 0 over grid axes 1 and 0, mode 1 not distributed
//! [(), (), (), ()]       fully replicated
//! ```
//!
//! A distribution is valid for a grid of order `g` when every referenced axis is in `[0, g)`
//! and no axis appears twice. Grid axes referenced by no mode are replication axes.

use core::fmt;
use std::sync::LazyLock;

use hashbrown::HashSet;
use regex::Regex;

use crate::error::{LayoutError, Result};
use crate::grid::ProcessGrid;

const MODE_PATTERN: &str = r"\(\s*(?:\d+\s*(?:,\s*\d+\s*)*)?\)";

static MODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(MODE_PATTERN).expect("mode distribution pattern is valid"));

static MODE_EXACT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s*{MODE_PATTERN}\s*$")).expect("mode distribution pattern is valid")
});

static TENSOR_EXACT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^\s*\[\s*(?:{MODE_PATTERN}(?:\s*,\s*{MODE_PATTERN})*)?\s*\]\s*$"
    ))
    .expect("tensor distribution pattern is valid")
});

const MODE_GRAMMAR: &str = r#""(" [int ("," int)*] ")""#;

/// Specifies how a single tensor mode is distributed over the process grid.
///
/// The mode is block-cyclically distributed over the listed grid axes, folded column-major in
/// the listed order. An empty list means the mode is replicated: every process along the grid
/// holds its full extent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModeDistribution {
    axes: Vec<usize>,
}

impl ModeDistribution {
    /// Creates a mode distribution over `axes`.
    pub fn new<A: Into<Vec<usize>>>(axes: A) -> Self {
        Self { axes: axes.into() }
    }

    /// A mode distributed over no grid axis.
    pub fn replicated() -> Self {
        Self::default()
    }

    /// The grid axes distributing this mode, in fold order.
    pub fn axes(&self) -> &[usize] {
        &self.axes
    }

    /// Returns `true` if no grid axis distributes this mode.
    pub fn is_replicated(&self) -> bool {
        self.axes.is_empty()
    }

    /// Appends the axes of `other` after the axes of `self`.
    pub fn concat(&self, other: &ModeDistribution) -> Self {
        Self::new([self.axes(), other.axes()].concat())
    }

    /// Extent of each listed grid axis: the shape of the sub-grid spanned by this mode.
    ///
    /// Axes outside the grid are skipped; a validated distribution never has any.
    pub fn sub_grid_shape(&self, grid: &ProcessGrid) -> Vec<usize> {
        self.axes()
            .iter()
            .filter_map(|&axis| grid.axis_size(axis))
            .collect()
    }

    /// Parses a single parenthesised axis list such as `(0, 2)` or `()`.
    pub fn parse(text: &str) -> Result<Self> {
        if !MODE_EXACT_REGEX.is_match(text) {
            return Err(LayoutError::MalformedDistributionString {
                expected: format!("{MODE_GRAMMAR}, e.g. (0) or (0, 1) or ()"),
                input: text.to_string(),
            });
        }
        parse_axes(text)
    }
}

impl fmt::Display for ModeDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, axis) in self.axes().iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{axis}")?;
        }
        f.write_str(")")
    }
}

// `text` has already matched the mode grammar, so it is a parenthesised list of digits.
fn parse_axes(text: &str) -> Result<ModeDistribution> {
    let inner = text.trim().trim_start_matches('(').trim_end_matches(')');
    let mut axes = Vec::new();
    for token in inner.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let axis = token
            .parse::<usize>()
            .map_err(|_| LayoutError::MalformedDistributionString {
                expected: MODE_GRAMMAR.to_string(),
                input: text.to_string(),
            })?;
        axes.push(axis);
    }
    Ok(ModeDistribution::new(axes))
}

/// Describes how every mode of a tensor is distributed over a process grid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TensorDistribution {
    modes: Vec<ModeDistribution>,
}

impl TensorDistribution {
    /// Creates a distribution from per-mode assignments.
    pub fn new(modes: Vec<ModeDistribution>) -> Self {
        Self { modes }
    }

    /// A distribution of order `order` in which no mode is distributed.
    pub fn replicated(order: usize) -> Self {
        Self {
            modes: vec![ModeDistribution::replicated(); order],
        }
    }

    /// Parses the textual form of a distribution with exactly `order` modes.
    ///
    /// Only the grammar and the mode count are checked; use [`Self::parse_checked`] or
    /// [`Self::validate`] to check the axes against a grid.
    pub fn parse(text: &str, order: usize) -> Result<Self> {
        let malformed = || LayoutError::MalformedDistributionString {
            expected: tensor_grammar(order),
            input: text.to_string(),
        };

        if !TENSOR_EXACT_REGEX.is_match(text) {
            return Err(malformed());
        }

        let modes = MODE_REGEX
            .find_iter(text)
            .map(|m| parse_axes(m.as_str()))
            .collect::<Result<Vec<_>>>()?;
        if modes.len() != order {
            return Err(malformed());
        }
        Ok(Self { modes })
    }

    /// Parses a distribution with `order` modes and validates it against a grid of order
    /// `grid_order`.
    pub fn parse_checked(text: &str, grid_order: usize, order: usize) -> Result<Self> {
        let distribution = Self::parse(text, order)?;
        distribution.validate(grid_order)?;
        Ok(distribution)
    }

    /// Checks that every referenced grid axis is in `[0, grid_order)` and that no axis
    /// distributes more than one mode.
    pub fn validate(&self, grid_order: usize) -> Result<()> {
        let mut seen = HashSet::new();
        for (mode, mode_distribution) in self.modes.iter().enumerate() {
            for &axis in mode_distribution.axes() {
                if !seen.insert(axis) {
                    return Err(LayoutError::DuplicateGridAxis { mode, axis });
                }
                if axis >= grid_order {
                    return Err(LayoutError::GridAxisOutOfRange {
                        mode,
                        axis,
                        grid_order,
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns `true` if [`Self::validate`] succeeds.
    pub fn is_valid(&self, grid_order: usize) -> bool {
        self.validate(grid_order).is_ok()
    }

    /// Number of modes.
    pub fn order(&self) -> usize {
        self.modes.len()
    }

    /// Per-mode assignments.
    pub fn modes(&self) -> &[ModeDistribution] {
        &self.modes
    }

    /// Assignment of `mode`, if it exists.
    pub fn mode(&self, mode: usize) -> Option<&ModeDistribution> {
        self.modes.get(mode)
    }

    /// Consumes the distribution, returning the per-mode assignments.
    pub fn into_modes(self) -> Vec<ModeDistribution> {
        self.modes
    }

    /// Grid axes that distribute no mode of a grid with order `grid_order`.
    pub fn replication_axes(&self, grid_order: usize) -> Vec<usize> {
        let used: HashSet<usize> = self
            .modes
            .iter()
            .flat_map(|m| m.axes().iter().copied())
            .collect();
        (0..grid_order).filter(|axis| !used.contains(axis)).collect()
    }
}

impl FromIterator<ModeDistribution> for TensorDistribution {
    fn from_iter<I: IntoIterator<Item = ModeDistribution>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl fmt::Display for TensorDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, mode) in self.modes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{mode}")?;
        }
        f.write_str("]")
    }
}

fn tensor_grammar(order: usize) -> String {
    let example = |entry: fn(usize) -> String| {
        (0..order).map(entry).collect::<Vec<_>>().join(", ")
    };
    let list = match order {
        0 => r#""[" "]""#.to_string(),
        1 => r#""[" ModeDist "]""#.to_string(),
        _ => format!(r#""[" ModeDist ("," ModeDist){{{}}} "]""#, order - 1),
    };
    format!(
        "{list} where ModeDist = {MODE_GRAMMAR}, e.g. [{}] or [{}]",
        example(|i| format!("({i})")),
        example(|_| "()".to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn dist(modes: &[&[usize]]) -> TensorDistribution {
        modes.iter().map(|axes| ModeDistribution::new(axes.to_vec())).collect()
    }

    #[test]
    fn test_parse_one_axis_per_mode() {
        let parsed = TensorDistribution::parse("[(0), (1), (2), (3)]", 4).unwrap();
        assert_eq!(parsed, dist(&[&[0], &[1], &[2], &[3]]));
    }

    #[test]
    fn test_parse_fully_replicated() {
        let parsed = TensorDistribution::parse("[(), (), (), ()]", 4).unwrap();
        assert_eq!(parsed, TensorDistribution::replicated(4));
        assert!(parsed.modes().iter().all(ModeDistribution::is_replicated));
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let parsed = TensorDistribution::parse(" [ ( 1 , 0 ) ,() ] ", 2).unwrap();
        assert_eq!(parsed, dist(&[&[1, 0], &[]]));
    }

    #[test]
    fn test_parse_zero_order() {
        assert_eq!(
            TensorDistribution::parse("[]", 0).unwrap(),
            TensorDistribution::default()
        );
    }

    #[rstest]
    #[case("[(0), (1)]", 3)]
    #[case("[(0), (1)]", 1)]
    #[case("[(0) (1)]", 2)]
    #[case("[(0,), (1)]", 2)]
    #[case("(0), (1)", 2)]
    #[case("[(a), (1)]", 2)]
    #[case("[(0), (1)] trailing", 2)]
    fn test_parse_rejects_malformed(#[case] text: &str, #[case] order: usize) {
        match TensorDistribution::parse(text, order) {
            Err(LayoutError::MalformedDistributionString { expected, input }) => {
                assert_eq!(input, text);
                assert!(expected.contains("ModeDist"), "{expected}");
            }
            other => panic!("expected a malformed distribution error, got {other:?}"),
        }
    }

    #[test]
    fn test_grammar_names_mode_count() {
        let err = TensorDistribution::parse("[(0)]", 3).unwrap_err();
        assert!(err.to_string().contains(r#"("," ModeDist){2}"#), "{err}");
        assert!(err.to_string().contains("[(0), (1), (2)]"), "{err}");
    }

    #[test]
    fn test_display_round_trips() {
        let distribution = dist(&[&[1, 0], &[], &[2]]);
        let text = distribution.to_string();

        assert_eq!(text, "[(1,0), (), (2)]");
        assert_eq!(TensorDistribution::parse(&text, 3).unwrap(), distribution);
    }

    #[test]
    fn test_mode_distribution_parse() {
        assert_eq!(
            ModeDistribution::parse("(0, 2)").unwrap(),
            ModeDistribution::new([0, 2])
        );
        assert_eq!(
            ModeDistribution::parse(" ( ) ").unwrap(),
            ModeDistribution::replicated()
        );
        assert!(ModeDistribution::parse("0").is_err());
        assert!(ModeDistribution::parse("(0,)").is_err());
    }

    #[test]
    fn test_empty_axis_list_is_replicated() {
        let empty = ModeDistribution::new(Vec::new());
        assert!(empty.is_replicated());
        assert_eq!(empty, ModeDistribution::replicated());
        assert_eq!(ModeDistribution::default(), ModeDistribution::replicated());
        assert!(!ModeDistribution::new([0]).is_replicated());
    }

    #[test]
    fn test_concat_keeps_order() {
        let scatter = ModeDistribution::new([1]);
        let reduce = ModeDistribution::new([0, 2]);
        assert_eq!(scatter.concat(&reduce).axes(), &[1, 0, 2]);
        assert_eq!(
            ModeDistribution::replicated().concat(&ModeDistribution::replicated()),
            ModeDistribution::replicated()
        );
    }

    #[test]
    fn test_validate_accepts_disjoint_axes() {
        assert!(dist(&[&[0], &[1]]).is_valid(2));
        assert!(dist(&[&[], &[1]]).is_valid(2));
        assert!(TensorDistribution::replicated(3).is_valid(0));
    }

    #[test]
    #[should_panic = "DuplicateGridAxis { mode: 1, axis: 0 }"]
    fn test_validate_rejects_reused_axis() {
        dist(&[&[0], &[0]]).validate(2).unwrap();
    }

    #[test]
    #[should_panic = "DuplicateGridAxis { mode: 0, axis: 1 }"]
    fn test_validate_rejects_axis_repeated_within_mode() {
        dist(&[&[1, 1]]).validate(2).unwrap();
    }

    #[test]
    #[should_panic = "GridAxisOutOfRange { mode: 1, axis: 2, grid_order: 2 }"]
    fn test_validate_rejects_axis_out_of_range() {
        dist(&[&[0], &[2]]).validate(2).unwrap();
    }

    #[test]
    fn test_parse_checked_validates() {
        assert_eq!(
            TensorDistribution::parse_checked("[(0), (0)]", 2, 2),
            Err(LayoutError::DuplicateGridAxis { mode: 1, axis: 0 })
        );
        assert!(TensorDistribution::parse_checked("[(0), (1)]", 2, 2).is_ok());
    }

    #[test]
    fn test_replication_axes() {
        assert_eq!(dist(&[&[2], &[]]).replication_axes(3), vec![0, 1]);
        assert!(dist(&[&[0], &[1]]).replication_axes(2).is_empty());
    }
}
