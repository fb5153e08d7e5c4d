//! Device-resident dense matrices with orientation-aware kernel dispatch.
//!
//! A [`DeviceMatrix`] is a handle over a device buffer plus
//! `{rows, cols, stride, orientation, ownership}` metadata. Operations never
//! materialize a physically transposed copy to reconcile layouts: the
//! dispatchers inspect the orientation of every operand and launch the kernel
//! variant that addresses each buffer in its own layout.
//!
//! # Core Types
//!
//! - [`DeviceMatrix`] / [`Matrix`]: Matrix handle; owned, or a borrow-checked view
//! - [`Orientation`]: Row-major (native) or column-major ("transposed") layout
//! - [`LaunchGeometry`]: Tile geometry for kernel launches and reductions
//! - [`UnaryOp`], [`BinaryOp`], [`Aggregator`]: Operator capabilities passed to the dispatchers
//!
//! # Operations
//!
//! ## Elementwise
//!
//! - [`DeviceMatrix::apply_binary_into`]: `target = op(self, b)` for any orientation triple
//! - [`DeviceMatrix::apply_unary_into`]: `target = op(self)`
//! - [`binary_layout`], [`unary_layout`], [`bounds_check`]: The dispatch decisions
//!
//! ## Vector broadcast
//!
//! - [`DeviceMatrix::apply_binary_vector_into`]: Row or column vector broadcast
//! - [`broadcast_axis`]: Physical broadcast direction for a vector and matrix
//!
//! ## Reductions
//!
//! - [`DeviceMatrix::reduce_all`]: Whole-matrix aggregate (synchronizes)
//! - [`DeviceMatrix::reduce_axis_into`]: Per-row or per-column aggregate
//! - [`DeviceMatrix::argmax_with`]: Index of the maximum of a transform
//!
//! ## Interop
//!
//! - [`DeviceMatrix::copy_from_host`] / [`DeviceMatrix::copy_to_host`]: `ndarray` transfer
//! - [`DeviceMatrix::right_mult`]: Matrix product through a [`GemmBackend`]
//! - [`init_random`] and friends: Process-wide generator for randomization
//!
//! # Example
//!
//! ```rust
//! use devmat::{DeviceMatrix, Orientation};
//! use ndarray::array;
//!
//! let a = DeviceMatrix::from_host(&array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
//!
//! // A column-major target: the dispatcher picks a transposing kernel variant.
//! let mut target = DeviceMatrix::with_orientation(2, 3, Orientation::ColMajor).unwrap();
//! a.add_into(&a, &mut target).unwrap();
//! assert_eq!(target.get(1, 2).unwrap(), 12.0);
//!
//! // Zero-copy transpose.
//! let t = a.transposed();
//! assert_eq!((t.num_rows(), t.num_cols()), (3, 2));
//! assert_eq!(t.get(2, 0).unwrap(), 3.0);
//! ```

mod blas;
mod broadcast;
mod buffer;
mod device;
mod dispatch;
mod host;
mod kernel;
mod matrix;
mod maybe_sync;
pub mod operators;
mod order;
mod random;
mod reduce;
mod threading;

// ============================================================================
// Matrix handle and layout
// ============================================================================
pub use buffer::DeviceBuffer;
pub use matrix::{DeviceMatrix, Matrix};
pub use order::{Orientation, Transpose};

// ============================================================================
// Device and dispatch
// ============================================================================
pub use broadcast::{broadcast_axis, BroadcastAxis};
pub use device::{default_stream, LaunchGeometry, Stream};
pub use dispatch::{binary_layout, bounds_check, unary_layout, BinaryLayout, BoundsCheck, UnaryLayout};
pub use maybe_sync::MaybeSync;
pub use operators::{BinaryOp, UnaryOp};

// ============================================================================
// Reductions, BLAS delegate, randomization
// ============================================================================
pub use blas::{ActiveBackend, GemmBackend, GemmInput, GemmOutput, NaiveBackend};
#[cfg(feature = "blas")]
pub use blas::BlasBackend;
pub use random::{destroy_random, init_random, init_random_from_time, random_state, RngState};
pub use reduce::{reduce_direction, Aggregator, Max, Min, ReduceDirection, Sum, SumOfSquares};

// ============================================================================
// Constants
// ============================================================================

/// Default tile extent along the leading (fastest varying) dimension.
pub const ELTWISE_TILE_LEAD: usize = 32;

/// Default tile extent along the following dimension.
pub const ELTWISE_TILE_FOLLOW: usize = 8;

/// Default number of execution units producing partials in a whole-matrix reduction.
pub const REDUCE_UNITS: usize = 64;

// ============================================================================
// Error types
// ============================================================================

/// Shape and layout of an operand, carried by errors for diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeInfo {
    pub rows: usize,
    pub cols: usize,
    pub stride: usize,
    pub orientation: Orientation,
}

impl std::fmt::Display for ShapeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} {} (stride {})",
            self.rows, self.cols, self.orientation, self.stride
        )
    }
}

/// Errors that can occur during device matrix operations.
///
/// Everything except [`MatrixError::Device`] is a precondition violation or
/// an allocation failure and leaves all handles untouched. A `Device` error
/// means a kernel did not run to completion; the contents of its target are
/// unspecified and the caller is expected to treat it as fatal.
#[derive(Debug, thiserror::Error)]
pub enum MatrixError {
    /// Operand shapes are incompatible for the operation.
    #[error("shape mismatch: {0} vs {1}")]
    ShapeMismatch(ShapeInfo, ShapeInfo),

    /// Slice bounds do not satisfy `start <= end <= len`.
    #[error("invalid slice {start}..{end} of axis with length {len}")]
    InvalidSlice { start: usize, end: usize, len: usize },

    /// Element index outside the matrix.
    #[error("index ({row}, {col}) out of bounds for {rows}x{cols} matrix")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// A view cannot change its element count.
    #[error("cannot resize a view of {current} elements to {requested} elements")]
    ViewResize { current: usize, requested: usize },

    /// A view cannot change its orientation.
    #[error("cannot change the orientation of view {0}")]
    ViewReorient(ShapeInfo),

    /// Reshape must preserve the element count.
    #[error("cannot reshape {elements} elements into {rows}x{cols}")]
    ReshapeMismatch {
        elements: usize,
        rows: usize,
        cols: usize,
    },

    /// Operation requires `stride == leading_dim` (or a single following index).
    #[error("operation requires contiguous storage: {0}")]
    NonContiguous(ShapeInfo),

    /// Target shares device memory with an operand in an incompatible way.
    #[error("target {target} aliases operand {operand}")]
    Aliasing { target: ShapeInfo, operand: ShapeInfo },

    /// Broadcast source is not a row or column vector.
    #[error("expected a row or column vector, got {0}")]
    InvalidVector(ShapeInfo),

    /// Axis other than 0 (down rows) or 1 (across columns).
    #[error("invalid axis {0} for a matrix")]
    InvalidAxis(usize),

    /// Reduction without elements to reduce.
    #[error("reduction over an empty matrix")]
    Empty,

    /// Device memory allocation failed.
    #[error("failed to allocate {elements} device elements")]
    Allocation { elements: usize },

    /// A kernel or delegate failed on the device.
    #[error("device execution failed in {kernel}: {reason}")]
    Device { kernel: &'static str, reason: String },
}

/// Result type for device matrix operations.
pub type Result<T> = std::result::Result<T, MatrixError>;
