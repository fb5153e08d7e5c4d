//! Matrix multiply through a column-major GEMM delegate.
//!
//! The delegate follows the BLAS convention: every buffer is read
//! column-major. A row-major handle therefore reaches the delegate as the
//! transpose of the matrix it holds, and its transpose flag is the negation
//! of its own orientation flag ([`Orientation::blas_transpose`]).
//!
//! A column-major target is computed directly as `C = op(A) op(B)`. A
//! row-major target is column-major `C^T`, computed as `C^T = B^T A^T` with
//! both operand flags flipped and the operands exchanged.
//!
//! [`ActiveBackend`] is the delegate selected by Cargo features: the `blas`
//! feature routes through `cblas::sgemm`, otherwise [`NaiveBackend`] runs.

use crate::device::default_stream;
use crate::matrix::{resize_validated, DeviceMatrix};
use crate::order::{Orientation, Transpose};
use crate::{MatrixError, Result};

/// A GEMM operand as seen by the column-major delegate.
#[derive(Debug, Clone, Copy)]
pub struct GemmInput {
    pub ptr: *const f32,
    /// Leading dimension (column stride) of the stored matrix.
    pub ld: usize,
    pub trans: Transpose,
}

impl GemmInput {
    fn of(m: &DeviceMatrix<'_>) -> Self {
        Self {
            ptr: m.device_ptr(),
            ld: m.stride().max(1),
            trans: m.orientation().blas_transpose(),
        }
    }

    fn flipped(self) -> Self {
        Self {
            trans: self.trans.flipped(),
            ..self
        }
    }

    /// Element `(i, p)` of `op(stored)`.
    ///
    /// # Safety
    /// The index must lie inside the operand.
    #[inline(always)]
    unsafe fn at(&self, i: usize, p: usize) -> f32 {
        match self.trans {
            Transpose::NoTrans => *self.ptr.add(p * self.ld + i),
            Transpose::Trans => *self.ptr.add(i * self.ld + p),
        }
    }

    /// Number of elements the delegate may touch for an `op` of `rows x cols`.
    #[cfg_attr(not(feature = "blas"), allow(dead_code))]
    fn span(&self, rows: usize, cols: usize) -> usize {
        let (stored_rows, stored_cols) = match self.trans {
            Transpose::NoTrans => (rows, cols),
            Transpose::Trans => (cols, rows),
        };
        if stored_rows == 0 || stored_cols == 0 {
            0
        } else {
            (stored_cols - 1) * self.ld + stored_rows
        }
    }
}

/// The GEMM result buffer, column-major.
#[derive(Debug, Clone, Copy)]
pub struct GemmOutput {
    pub ptr: *mut f32,
    pub ld: usize,
}

/// A column-major single-precision GEMM: `C = alpha * op(A) op(B) + beta * C`
/// with `C` of shape `m x n` and inner dimension `k`.
pub trait GemmBackend {
    const NAME: &'static str;

    /// # Safety
    /// Every pointer must address a live buffer covering its operand under the
    /// given leading dimension, and `c` must not overlap `a` or `b`.
    #[allow(clippy::too_many_arguments)]
    unsafe fn sgemm(
        m: usize,
        n: usize,
        k: usize,
        alpha: f32,
        a: GemmInput,
        b: GemmInput,
        beta: f32,
        c: GemmOutput,
    ) -> Result<()>;
}

/// Triple-loop GEMM with no external library.
pub struct NaiveBackend;

impl GemmBackend for NaiveBackend {
    const NAME: &'static str = "naive_sgemm";

    unsafe fn sgemm(
        m: usize,
        n: usize,
        k: usize,
        alpha: f32,
        a: GemmInput,
        b: GemmInput,
        beta: f32,
        c: GemmOutput,
    ) -> Result<()> {
        for j in 0..n {
            for i in 0..m {
                let mut acc = 0.0f32;
                for p in 0..k {
                    acc += a.at(i, p) * b.at(p, j);
                }
                let dst = c.ptr.add(j * c.ld + i);
                // beta == 0 ignores the previous contents, NaN included
                *dst = if beta == 0.0 {
                    alpha * acc
                } else {
                    alpha * acc + beta * *dst
                };
            }
        }
        Ok(())
    }
}

/// GEMM through `cblas::sgemm`.
#[cfg(feature = "blas")]
pub struct BlasBackend;

#[cfg(feature = "blas")]
impl GemmBackend for BlasBackend {
    const NAME: &'static str = "cblas_sgemm";

    unsafe fn sgemm(
        m: usize,
        n: usize,
        k: usize,
        alpha: f32,
        a: GemmInput,
        b: GemmInput,
        beta: f32,
        c: GemmOutput,
    ) -> Result<()> {
        fn dim(x: usize) -> Result<i32> {
            i32::try_from(x).map_err(|_| MatrixError::Device {
                kernel: BlasBackend::NAME,
                reason: format!("dimension {x} exceeds the BLAS integer range"),
            })
        }
        fn flag(t: Transpose) -> cblas::Transpose {
            match t {
                Transpose::NoTrans => cblas::Transpose::None,
                Transpose::Trans => cblas::Transpose::Ordinary,
            }
        }
        if m == 0 || n == 0 {
            return Ok(());
        }
        let a_len = a.span(m, k);
        let b_len = b.span(k, n);
        let c_len = (n - 1) * c.ld + m;
        let a_slice = std::slice::from_raw_parts(a.ptr, a_len);
        let b_slice = std::slice::from_raw_parts(b.ptr, b_len);
        let c_slice = std::slice::from_raw_parts_mut(c.ptr, c_len);
        cblas::sgemm(
            cblas::Layout::ColumnMajor,
            flag(a.trans),
            flag(b.trans),
            dim(m)?,
            dim(n)?,
            dim(k)?,
            alpha,
            a_slice,
            dim(a.ld)?,
            b_slice,
            dim(b.ld)?,
            beta,
            c_slice,
            dim(c.ld)?,
        );
        Ok(())
    }
}

/// The GEMM delegate selected by Cargo features.
#[cfg(feature = "blas")]
pub type ActiveBackend = BlasBackend;

/// The GEMM delegate selected by Cargo features.
#[cfg(not(feature = "blas"))]
pub type ActiveBackend = NaiveBackend;

fn launch_gemm<B: GemmBackend>(
    a: &DeviceMatrix<'_>,
    b: &DeviceMatrix<'_>,
    target: &DeviceMatrix<'_>,
    alpha: f32,
    beta: f32,
) -> Result<()> {
    let (m, n, k) = (target.num_rows(), target.num_cols(), a.num_cols());
    let (a_in, b_in) = (GemmInput::of(a), GemmInput::of(b));
    let c = GemmOutput {
        ptr: target.device_ptr(),
        ld: target.stride().max(1),
    };
    log::trace!(
        "{}: {}x{}x{}, A {:?}, B {:?}, target {}",
        B::NAME,
        m,
        n,
        k,
        a_in.trans,
        b_in.trans,
        target.orientation()
    );
    let mut outcome = Ok(());
    default_stream().launch(B::NAME, m, n, || {
        outcome = unsafe {
            match target.orientation() {
                Orientation::ColMajor => B::sgemm(m, n, k, alpha, a_in, b_in, beta, c),
                Orientation::RowMajor => {
                    B::sgemm(n, m, k, alpha, b_in.flipped(), a_in.flipped(), beta, c)
                }
            }
        };
    })?;
    outcome
}

fn check_product_alias(target: &DeviceMatrix<'_>, operand: &DeviceMatrix<'_>) -> Result<()> {
    if target.overlaps(operand) {
        return Err(MatrixError::Aliasing {
            target: target.shape_info(),
            operand: operand.shape_info(),
        });
    }
    Ok(())
}

impl DeviceMatrix<'_> {
    fn check_inner_dims(&self, b: &DeviceMatrix<'_>) -> Result<()> {
        if self.num_cols() != b.num_rows() {
            return Err(MatrixError::ShapeMismatch(self.shape_info(), b.shape_info()));
        }
        Ok(())
    }

    /// `target = scale_ab * self * b` with the feature-selected backend.
    ///
    /// `target` is resized to `rows x b.cols`, keeping its orientation, and
    /// must not share memory with either operand.
    pub fn right_mult(
        &self,
        b: &DeviceMatrix<'_>,
        scale_ab: f32,
        target: &mut DeviceMatrix<'_>,
    ) -> Result<()> {
        self.right_mult_with::<ActiveBackend>(b, scale_ab, target)
    }

    pub fn right_mult_with<B: GemmBackend>(
        &self,
        b: &DeviceMatrix<'_>,
        scale_ab: f32,
        target: &mut DeviceMatrix<'_>,
    ) -> Result<()> {
        self.check_inner_dims(b)?;
        let orientation = target.orientation();
        resize_validated(target, self.num_rows(), b.num_cols(), orientation, |planned| {
            check_product_alias(planned, self)?;
            check_product_alias(planned, b)
        })?;
        launch_gemm::<B>(self, b, target, scale_ab, 0.0)
    }

    /// `self = scale_this * self + scale_ab * a * b`.
    pub fn add_product(
        &mut self,
        a: &DeviceMatrix<'_>,
        b: &DeviceMatrix<'_>,
        scale_this: f32,
        scale_ab: f32,
    ) -> Result<()> {
        a.check_inner_dims(b)?;
        if self.num_rows() != a.num_rows() || self.num_cols() != b.num_cols() {
            return Err(MatrixError::ShapeMismatch(self.shape_info(), a.shape_info()));
        }
        check_product_alias(self, a)?;
        check_product_alias(self, b)?;
        launch_gemm::<ActiveBackend>(a, b, self, scale_ab, scale_this)
    }
}
