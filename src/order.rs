//! Orientation of a matrix handle and the physical index arithmetic it implies.
//!
//! Kernels work on physical `(leading, following)` coordinates: the leading
//! index varies fastest in memory, the following index is multiplied by the
//! stride. Logical `(row, col)` maps onto them according to the orientation.

use std::fmt;

/// Physical layout of a matrix handle.
///
/// `RowMajor` is the native, non-transposed layout. `ColMajor` is reported as
/// "transposed" by [`Orientation::is_transposed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    /// Rows are contiguous: element `(i, j)` at `i * stride + j`.
    #[default]
    RowMajor,
    /// Columns are contiguous: element `(i, j)` at `j * stride + i`.
    ColMajor,
}

/// Transpose flag handed to the column-major GEMM delegate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transpose {
    NoTrans,
    Trans,
}

impl Transpose {
    /// The opposite flag.
    #[inline]
    pub fn flipped(self) -> Self {
        match self {
            Transpose::NoTrans => Transpose::Trans,
            Transpose::Trans => Transpose::NoTrans,
        }
    }
}

impl Orientation {
    /// Orientation for a "transposed" flag.
    #[inline]
    pub fn from_transposed(transposed: bool) -> Self {
        if transposed {
            Orientation::ColMajor
        } else {
            Orientation::RowMajor
        }
    }

    #[inline]
    pub fn is_transposed(self) -> bool {
        matches!(self, Orientation::ColMajor)
    }

    #[inline]
    pub fn flipped(self) -> Self {
        match self {
            Orientation::RowMajor => Orientation::ColMajor,
            Orientation::ColMajor => Orientation::RowMajor,
        }
    }

    /// Size of the dimension that varies fastest in memory.
    #[inline]
    pub fn leading_dim(self, rows: usize, cols: usize) -> usize {
        match self {
            Orientation::RowMajor => cols,
            Orientation::ColMajor => rows,
        }
    }

    /// Size of the dimension that varies slowest in memory.
    #[inline]
    pub fn following_dim(self, rows: usize, cols: usize) -> usize {
        match self {
            Orientation::RowMajor => rows,
            Orientation::ColMajor => cols,
        }
    }

    /// Split a logical `(row, col)` into physical `(leading, following)`.
    #[inline]
    pub(crate) fn to_physical(self, row: usize, col: usize) -> (usize, usize) {
        match self {
            Orientation::RowMajor => (col, row),
            Orientation::ColMajor => (row, col),
        }
    }

    /// Inverse of [`Orientation::to_physical`].
    #[inline]
    pub(crate) fn to_logical(self, lead: usize, follow: usize) -> (usize, usize) {
        match self {
            Orientation::RowMajor => (follow, lead),
            Orientation::ColMajor => (lead, follow),
        }
    }

    /// Flag for the column-major GEMM delegate.
    ///
    /// The delegate reads memory column-major, so a row-major buffer looks
    /// like the transpose of the matrix it holds: the flag is the logical
    /// negation of [`Orientation::is_transposed`].
    #[inline]
    pub fn blas_transpose(self) -> Transpose {
        if self.is_transposed() {
            Transpose::NoTrans
        } else {
            Transpose::Trans
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Orientation::RowMajor => "row-major",
            Orientation::ColMajor => "col-major",
        })
    }
}
