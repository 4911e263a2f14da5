/// Errors produced while parsing, validating or querying a distributed tensor layout.
///
/// Every variant is recoverable: the core reports the problem to its caller and never
/// applies a partial result.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum LayoutError {
    /// A shape string contained a token that is not a positive integer.
    #[error("malformed shape `{input}`: `{token}` is not a positive integer")]
    MalformedShape {
        /// The full input text.
        input: String,
        /// The offending token.
        token: String,
    },

    /// A distribution string did not match the distribution grammar.
    #[error("malformed distribution string `{input}`: must match pattern {expected}")]
    MalformedDistributionString {
        /// The grammar the input was expected to match.
        expected: String,
        /// The offending input.
        input: String,
    },

    /// A mode parameter was missing, non-numeric or outside `[0, order)`.
    #[error("invalid {parameter} `{value}`: expected a mode in [0, {order})")]
    InvalidMode {
        /// Name of the parameter that carried the mode.
        parameter: String,
        /// The raw value supplied by the caller.
        value: String,
        /// Exclusive upper bound for the mode.
        order: usize,
    },

    /// The same grid axis distributes more than one tensor mode.
    #[error("grid axis {axis} is reused by mode {mode}")]
    DuplicateGridAxis {
        /// The mode that reused the axis.
        mode: usize,
        /// The reused grid axis.
        axis: usize,
    },

    /// A mode references a grid axis outside the grid.
    #[error("mode {mode} references grid axis {axis}, but the grid has order {grid_order}")]
    GridAxisOutOfRange {
        /// The offending mode.
        mode: usize,
        /// The referenced grid axis.
        axis: usize,
        /// Order of the process grid.
        grid_order: usize,
    },

    /// A global location lies outside the tensor shape.
    #[error("global location {location:?} is out of range for shape {shape:?}")]
    GlobalLocationOutOfRange {
        /// The requested location.
        location: Vec<usize>,
        /// The tensor shape.
        shape: Vec<usize>,
    },

    /// ReduceScatter was asked to reduce and scatter the same mode.
    #[error("reduce and scatter modes must be distinct, got {mode} for both")]
    DistinctModesRequired {
        /// The mode supplied twice.
        mode: usize,
    },

    /// A shape contained a zero extent.
    #[error("shape {shape:?} has a non-positive dimension")]
    NonPositiveDimension {
        /// The offending shape.
        shape: Vec<usize>,
    },

    /// A shape holds more elements than a linear index can address.
    #[error("shape {shape:?} has more than usize::MAX elements")]
    ShapeOverflow {
        /// The offending shape.
        shape: Vec<usize>,
    },

    /// A location or distribution has the wrong number of entries.
    #[error("expected {expected} entries, got {actual}")]
    RankMismatch {
        /// Expected number of entries.
        expected: usize,
        /// Number of entries supplied.
        actual: usize,
    },

    /// A process coordinate lies outside the process grid.
    #[error("process {process:?} is out of range for grid {grid_shape:?}")]
    ProcessOutOfRange {
        /// The requested process coordinate.
        process: Vec<usize>,
        /// The grid shape.
        grid_shape: Vec<usize>,
    },

    /// A local-index query named a process that does not hold the element.
    #[error("process {process:?} does not own global location {location:?}")]
    NotAnOwner {
        /// The queried process.
        process: Vec<usize>,
        /// The queried global location.
        location: Vec<usize>,
    },

    /// Two tensors cannot be related by a correspondence.
    #[error("tensor shape {actual:?} does not match the expected shape {expected:?}")]
    ShapeMismatch {
        /// The shape implied by the source tensor.
        expected: Vec<usize>,
        /// The shape of the target tensor.
        actual: Vec<usize>,
    },

    /// A redistribution was requested while a previous transition is still being consumed.
    #[error("a redistribution transition is already in progress")]
    TransitionInProgress,

    /// A layout configuration could not be decoded.
    #[error("invalid layout configuration: {message}")]
    Config {
        /// Decoder message.
        message: String,
    },
}

impl From<serde_json::Error> for LayoutError {
    fn from(err: serde_json::Error) -> Self {
        LayoutError::Config {
            message: err.to_string(),
        }
    }
}

// Checks that `mode` names one of the `order` modes; `parameter` names the operand in the error.
pub(crate) fn check_mode(parameter: &str, mode: usize, order: usize) -> Result<()> {
    if mode < order {
        Ok(())
    } else {
        Err(LayoutError::InvalidMode {
            parameter: parameter.to_string(),
            value: mode.to_string(),
            order,
        })
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = LayoutError> = std::result::Result<T, E>;
