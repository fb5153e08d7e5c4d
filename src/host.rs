//! Host transfer through `ndarray`.
//!
//! A C-order host array corresponds to [`Orientation::RowMajor`] and a
//! Fortran-order array to [`Orientation::ColMajor`]. When both sides share a
//! packed layout the bytes are copied verbatim; otherwise elements are copied
//! one by one by logical index. Neither path transposes.

use ndarray::{Array2, ArrayBase, Data, DataMut, Ix2, ShapeBuilder};

use crate::device::default_stream;
use crate::matrix::{DeviceMatrix, Matrix};
use crate::order::Orientation;
use crate::{MatrixError, Result, ShapeInfo};

/// Layout of a packed host array, `None` for any other strides.
fn host_orientation<S: Data<Elem = f32>>(host: &ArrayBase<S, Ix2>) -> Option<Orientation> {
    if host.is_standard_layout() {
        Some(Orientation::RowMajor)
    } else if host.t().is_standard_layout() {
        Some(Orientation::ColMajor)
    } else {
        None
    }
}

fn host_shape<S: Data<Elem = f32>>(host: &ArrayBase<S, Ix2>) -> ShapeInfo {
    let (rows, cols) = host.dim();
    let orientation = host_orientation(host).unwrap_or_default();
    ShapeInfo {
        rows,
        cols,
        stride: orientation.leading_dim(rows, cols),
        orientation,
    }
}

impl DeviceMatrix<'static> {
    /// Allocate a matrix holding a copy of `host`, in the host's layout.
    pub fn from_host<S: Data<Elem = f32>>(host: &ArrayBase<S, Ix2>) -> Result<Matrix> {
        let mut m = Matrix::empty();
        m.copy_from_host(host, true)?;
        Ok(m)
    }
}

impl DeviceMatrix<'_> {
    fn fast_path(&self, host: Option<Orientation>) -> bool {
        host == Some(self.orientation()) && self.is_contiguous()
    }

    /// Copy `host` into the device buffer.
    ///
    /// With `resize`, the handle takes the host's shape, and an owning
    /// handle also takes the host's layout. Without it the shapes must match.
    pub fn copy_from_host<S: Data<Elem = f32>>(
        &mut self,
        host: &ArrayBase<S, Ix2>,
        resize: bool,
    ) -> Result<()> {
        let (rows, cols) = host.dim();
        let layout = host_orientation(host);
        if resize {
            match layout {
                Some(orientation) if self.owns_data() => {
                    self.resize_oriented(rows, cols, orientation)?;
                }
                _ => {
                    self.resize(rows, cols)?;
                }
            }
        } else if (rows, cols) != (self.num_rows(), self.num_cols()) {
            return Err(MatrixError::ShapeMismatch(self.shape_info(), host_shape(host)));
        }

        let (target, extent, orientation) = (self.operand(), self.extent(), self.orientation());
        let fast = self.fast_path(layout);
        default_stream().launch("copy_from_host", extent.lead, extent.follow, || unsafe {
            if fast {
                if let Some(values) = host.as_slice_memory_order() {
                    if !values.is_empty() {
                        std::ptr::copy_nonoverlapping(values.as_ptr(), target.at(0, 0), values.len());
                    }
                    return;
                }
            }
            for ((i, j), &x) in host.indexed_iter() {
                let (lead, follow) = orientation.to_physical(i, j);
                *target.at(lead, follow) = x;
            }
        })
    }

    /// Copy the device buffer into `host`. Synchronizes the stream.
    ///
    /// With `resize`, a host array of a different shape is replaced by one of
    /// the device shape in the device's layout. Without it the shapes must
    /// match.
    pub fn copy_to_host(&self, host: &mut Array2<f32>, resize: bool) -> Result<()> {
        let dims = (self.num_rows(), self.num_cols());
        if host.dim() != dims {
            if !resize {
                return Err(MatrixError::ShapeMismatch(self.shape_info(), host_shape(host)));
            }
            *host = match self.orientation() {
                Orientation::RowMajor => Array2::zeros(dims),
                Orientation::ColMajor => Array2::zeros(dims.f()),
            };
        }
        self.write_host(host)
    }

    fn write_host<S: DataMut<Elem = f32>>(&self, host: &mut ArrayBase<S, Ix2>) -> Result<()> {
        let (src, extent, orientation) = (self.operand(), self.extent(), self.orientation());
        let fast = self.fast_path(host_orientation(host));
        default_stream().launch("copy_to_host", extent.lead, extent.follow, || unsafe {
            if fast {
                if let Some(values) = host.as_slice_memory_order_mut() {
                    if !values.is_empty() {
                        std::ptr::copy_nonoverlapping(src.at(0, 0), values.as_mut_ptr(), values.len());
                    }
                    return;
                }
            }
            for ((i, j), x) in host.indexed_iter_mut() {
                let (lead, follow) = orientation.to_physical(i, j);
                *x = *src.at(lead, follow);
            }
        })?;
        default_stream().synchronize();
        Ok(())
    }

    /// A new host array in the device's layout.
    pub fn to_host(&self) -> Result<Array2<f32>> {
        let dims = (self.num_rows(), self.num_cols());
        let mut host = match self.orientation() {
            Orientation::RowMajor => Array2::zeros(dims),
            Orientation::ColMajor => Array2::zeros(dims.f()),
        };
        self.write_host(&mut host)?;
        Ok(host)
    }

    /// Read-only copy of `rows x cols` elements starting at
    /// `(start_row, start_col)`, for printing.
    pub fn print_region(
        &self,
        start_row: usize,
        rows: usize,
        start_col: usize,
        cols: usize,
    ) -> Result<Array2<f32>> {
        let region = self.slice(
            start_row..start_row.saturating_add(rows),
            start_col..start_col.saturating_add(cols),
        )?;
        region.to_host()
    }
}
