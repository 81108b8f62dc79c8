//! Error types for targetmatch.

use crate::equalizer::Category;
use thiserror::Error;

/// Result alias for targetmatch operations.
pub type LocateResult<T> = std::result::Result<T, LocateError>;

/// Errors that can occur when configuring or running the localization engine.
///
/// Configuration errors (`UnknownAlgorithm`, `UnknownParameter`, `OutOfRange`,
/// `TypeMismatch`, `MalformedConfig`) indicate a caller or profile mistake and
/// should not be retried. `InvalidGeometry` and `NoMatch` describe the current
/// frame only; see [`LocateError::is_no_match`].
#[derive(Clone, Debug, PartialEq, Error)]
pub enum LocateError {
    /// The algorithm name is not registered for the category.
    #[error("unknown algorithm '{name}' for category {category}")]
    UnknownAlgorithm { category: Category, name: String },
    /// The parameter does not exist in the active schema of the category.
    #[error("unknown parameter '{name}' for category {category}")]
    UnknownParameter { category: Category, name: String },
    /// A parameter value violates its declared bounds.
    #[error(
        "value {value} of parameter '{name}' is outside [{}, {}]",
        display_bound(.min),
        display_bound(.max)
    )]
    OutOfRange {
        name: String,
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// A parameter value has the wrong kind (e.g. boolean for an integer).
    #[error("parameter '{name}' expects a {expected} value, got {got}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        got: &'static str,
    },
    /// The match profile text could not be parsed.
    #[error("malformed match profile (line {line}): {reason}")]
    MalformedConfig { line: usize, reason: String },
    /// The needle does not fit into the searched area.
    #[error(
        "needle {needle_width}x{needle_height} does not fit into search area {area_width}x{area_height}"
    )]
    InvalidGeometry {
        needle_width: usize,
        needle_height: usize,
        area_width: usize,
        area_height: usize,
    },
    /// No candidate reached the required similarity.
    #[error("no candidate reached similarity {threshold}")]
    NoMatch { threshold: f64 },
    /// Image dimensions are zero or overflow.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// The backing buffer is smaller than the image layout requires.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// A region lies (partially) outside the image.
    #[error("region ({x}, {y}) {width}x{height} outside image {img_width}x{img_height}")]
    RoiOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        img_width: usize,
        img_height: usize,
    },
    /// Decoding an image from disk failed.
    #[error("image I/O error: {reason}")]
    ImageIo { reason: String },
}

impl LocateError {
    /// Returns true for outcomes that only mean "not found in this frame".
    ///
    /// Polling callers can retry on a later capture when this is true.
    pub fn is_no_match(&self) -> bool {
        matches!(
            self,
            LocateError::NoMatch { .. } | LocateError::InvalidGeometry { .. }
        )
    }

    /// Attaches a parameter name to range and type errors raised by a bare value.
    pub(crate) fn for_parameter(self, param: &str) -> Self {
        match self {
            LocateError::OutOfRange {
                value, min, max, ..
            } => LocateError::OutOfRange {
                name: param.to_owned(),
                value,
                min,
                max,
            },
            LocateError::TypeMismatch { expected, got, .. } => LocateError::TypeMismatch {
                name: param.to_owned(),
                expected,
                got,
            },
            other => other,
        }
    }

    /// Re-anchors a profile parsing error at a concrete line.
    pub(crate) fn at_line(self, line: usize) -> Self {
        match self {
            LocateError::MalformedConfig { reason, .. } => {
                LocateError::MalformedConfig { line, reason }
            }
            other => other,
        }
    }
}

fn display_bound(bound: &Option<f64>) -> String {
    match bound {
        Some(value) => value.to_string(),
        None => "None".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::LocateError;

    #[test]
    fn out_of_range_message_renders_open_bounds() {
        let err = LocateError::OutOfRange {
            name: "nzoom".into(),
            value: 0.5,
            min: Some(1.0),
            max: None,
        };
        assert_eq!(
            err.to_string(),
            "value 0.5 of parameter 'nzoom' is outside [1, None]"
        );
    }

    #[test]
    fn geometry_and_exhaustion_are_no_match_outcomes() {
        assert!(LocateError::NoMatch { threshold: 0.8 }.is_no_match());
        assert!(LocateError::InvalidGeometry {
            needle_width: 10,
            needle_height: 10,
            area_width: 5,
            area_height: 5,
        }
        .is_no_match());
        assert!(!LocateError::MalformedConfig {
            line: 1,
            reason: "x".into()
        }
        .is_no_match());
    }
}
