//! The matrix handle: shape, stride, orientation and ownership over a
//! [`DeviceBuffer`].
//!
//! An owning handle holds its buffer by value and is move-only. A view holds
//! a shared borrow of another handle's buffer, so the source provably
//! outlives every view and cannot be resized or dropped while one exists:
//!
//! ```compile_fail
//! use devmat::Matrix;
//!
//! let mut a = Matrix::new(4, 4).unwrap();
//! let top = a.slice_rows(0, 2).unwrap();
//! a.resize(8, 8).unwrap(); // `a` is still borrowed by `top`
//! top.get(0, 0).unwrap();
//! ```
//!
//! Views may write into the shared buffer. Writes through views that overlap
//! each other are not ordered by the library.

use std::ops::Range;

use crate::buffer::DeviceBuffer;
use crate::device::default_stream;
use crate::kernel::{Extent, Operand};
use crate::operators::{Constant, Identity};
use crate::order::Orientation;
use crate::{MatrixError, Result, ShapeInfo};

enum Storage<'buf> {
    /// No buffer; the handle has zero elements.
    Empty,
    Owned(DeviceBuffer),
    /// Borrowed from another handle. `None` when that handle had no buffer.
    View(Option<&'buf DeviceBuffer>),
}

/// A dense `f32` matrix resident in device memory.
///
/// Element `(i, j)` lives at `offset + following * stride + leading`, where
/// `(leading, following)` is `(j, i)` for [`Orientation::RowMajor`] and
/// `(i, j)` for [`Orientation::ColMajor`].
///
/// Owned handles are `Send`; no handle is `Sync`.
pub struct DeviceMatrix<'buf> {
    storage: Storage<'buf>,
    offset: usize,
    num_rows: usize,
    num_cols: usize,
    stride: usize,
    orientation: Orientation,
}

/// A matrix handle that owns its buffer.
pub type Matrix = DeviceMatrix<'static>;

impl DeviceMatrix<'static> {
    /// A `0 x 0` row-major handle without a buffer.
    pub fn empty() -> Self {
        Self {
            storage: Storage::Empty,
            offset: 0,
            num_rows: 0,
            num_cols: 0,
            stride: 0,
            orientation: Orientation::RowMajor,
        }
    }

    /// Allocate a zero-filled row-major matrix.
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        Self::with_orientation(rows, cols, Orientation::RowMajor)
    }

    /// Allocate a zero-filled matrix with the given orientation.
    pub fn with_orientation(rows: usize, cols: usize, orientation: Orientation) -> Result<Self> {
        let mut m = Self::empty();
        m.orientation = orientation;
        m.resize(rows, cols)?;
        Ok(m)
    }

    /// Allocate a row-major matrix with every element set to `value`.
    pub fn filled(rows: usize, cols: usize, value: f32) -> Result<Self> {
        let mut m = Self::new(rows, cols)?;
        m.fill(value)?;
        Ok(m)
    }
}

impl Default for DeviceMatrix<'static> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<'buf> DeviceMatrix<'buf> {
    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[inline]
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// Distance between consecutive following indices, in elements.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Whether the handle is column-major.
    #[inline]
    pub fn is_transposed(&self) -> bool {
        self.orientation.is_transposed()
    }

    #[inline]
    pub fn num_elements(&self) -> usize {
        self.num_rows * self.num_cols
    }

    #[inline]
    pub fn leading_dim(&self) -> usize {
        self.orientation.leading_dim(self.num_rows, self.num_cols)
    }

    #[inline]
    pub fn following_dim(&self) -> usize {
        self.orientation.following_dim(self.num_rows, self.num_cols)
    }

    /// `stride == leading_dim()` or a single following index.
    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.stride == self.leading_dim() || self.following_dim() <= 1
    }

    #[inline]
    pub fn is_same_dims(&self, other: &DeviceMatrix<'_>) -> bool {
        self.num_rows == other.num_rows && self.num_cols == other.num_cols
    }

    /// `false` for views.
    #[inline]
    pub fn owns_data(&self) -> bool {
        !matches!(self.storage, Storage::View(_))
    }

    /// Device address of element `(0, 0)`; null when there is no buffer.
    pub fn device_ptr(&self) -> *mut f32 {
        match self.buffer() {
            Some(buf) => buf.as_ptr().wrapping_add(self.offset),
            None => std::ptr::null_mut(),
        }
    }

    pub fn shape_info(&self) -> ShapeInfo {
        ShapeInfo {
            rows: self.num_rows,
            cols: self.num_cols,
            stride: self.stride,
            orientation: self.orientation,
        }
    }

    fn buffer(&self) -> Option<&DeviceBuffer> {
        match &self.storage {
            Storage::Empty => None,
            Storage::Owned(buf) => Some(buf),
            Storage::View(buf) => *buf,
        }
    }

    fn check_index(&self, row: usize, col: usize) -> Result<()> {
        if row >= self.num_rows || col >= self.num_cols {
            return Err(MatrixError::IndexOutOfBounds {
                row,
                col,
                rows: self.num_rows,
                cols: self.num_cols,
            });
        }
        Ok(())
    }

    /// Read one element. Synchronizes the stream.
    pub fn get(&self, row: usize, col: usize) -> Result<f32> {
        self.check_index(row, col)?;
        default_stream().synchronize();
        let (lead, follow) = self.orientation.to_physical(row, col);
        Ok(unsafe { *self.operand().at(lead, follow) })
    }

    /// Write one element.
    pub fn set(&mut self, row: usize, col: usize, value: f32) -> Result<()> {
        self.check_index(row, col)?;
        let (lead, follow) = self.orientation.to_physical(row, col);
        let target = self.operand();
        default_stream().launch("set_element", 1, 1, || unsafe {
            *target.at(lead, follow) = value;
        })
    }

    // ------------------------------------------------------------------
    // Shape and layout metadata
    // ------------------------------------------------------------------

    /// Change the shape, returning whether the buffer was reallocated.
    ///
    /// With an unchanged element count only metadata changes and the stride
    /// is reset to the leading dimension, which requires contiguous storage.
    /// Otherwise an owning handle reallocates (contents become zero) and a
    /// view fails with [`MatrixError::ViewResize`].
    pub fn resize(&mut self, rows: usize, cols: usize) -> Result<bool> {
        if rows == self.num_rows && cols == self.num_cols {
            return Ok(false);
        }
        let requested = rows
            .checked_mul(cols)
            .ok_or(MatrixError::Allocation { elements: usize::MAX })?;
        if requested == self.num_elements() {
            if !self.is_contiguous() {
                return Err(MatrixError::NonContiguous(self.shape_info()));
            }
            self.set_shape(rows, cols);
            return Ok(false);
        }
        if let Storage::View(_) = self.storage {
            return Err(MatrixError::ViewResize {
                current: self.num_elements(),
                requested,
            });
        }

        self.storage = if requested == 0 {
            Storage::Empty
        } else {
            Storage::Owned(DeviceBuffer::zeros(requested)?)
        };
        log::debug!(
            "reallocated {}x{} -> {}x{} ({})",
            self.num_rows,
            self.num_cols,
            rows,
            cols,
            self.orientation
        );
        self.offset = 0;
        self.set_shape(rows, cols);
        Ok(true)
    }

    /// Take the shape and orientation of `other`. A view keeps its
    /// orientation and fails with [`MatrixError::ViewReorient`] otherwise.
    pub fn resize_like(&mut self, other: &DeviceMatrix<'_>) -> Result<bool> {
        self.resize_oriented(other.num_rows, other.num_cols, other.orientation)
    }

    pub(crate) fn resize_oriented(
        &mut self,
        rows: usize,
        cols: usize,
        orientation: Orientation,
    ) -> Result<bool> {
        if orientation != self.orientation {
            if let Storage::View(_) = self.storage {
                return Err(MatrixError::ViewReorient(self.shape_info()));
            }
            if !self.is_contiguous() {
                return Err(MatrixError::NonContiguous(self.shape_info()));
            }
        }
        let reallocated = self.resize(rows, cols)?;
        if orientation != self.orientation {
            self.orientation = orientation;
            self.stride = self.leading_dim();
        }
        Ok(reallocated)
    }

    /// The handle [`resize_oriented`](Self::resize_oriented) would leave
    /// behind, as a view, without touching `self`. `None` when the resize
    /// allocates a fresh buffer.
    pub(crate) fn planned_resize(
        &self,
        rows: usize,
        cols: usize,
        orientation: Orientation,
    ) -> Result<Option<DeviceMatrix<'_>>> {
        let is_view = matches!(self.storage, Storage::View(_));
        if is_view && orientation != self.orientation {
            return Err(MatrixError::ViewReorient(self.shape_info()));
        }
        let requested = rows
            .checked_mul(cols)
            .ok_or(MatrixError::Allocation { elements: usize::MAX })?;
        if requested != self.num_elements() {
            if is_view {
                return Err(MatrixError::ViewResize {
                    current: self.num_elements(),
                    requested,
                });
            }
            return Ok(None);
        }
        let mut planned = self.view();
        if (rows, cols, orientation) != (self.num_rows, self.num_cols, self.orientation) {
            if !self.is_contiguous() {
                return Err(MatrixError::NonContiguous(self.shape_info()));
            }
            planned.orientation = orientation;
            planned.set_shape(rows, cols);
        }
        Ok(Some(planned))
    }

    fn set_shape(&mut self, rows: usize, cols: usize) {
        self.num_rows = rows;
        self.num_cols = cols;
        self.stride = self.leading_dim();
    }

    /// Reinterpret the same elements under a new shape.
    pub fn reshape(&mut self, rows: usize, cols: usize) -> Result<()> {
        if rows.checked_mul(cols) != Some(self.num_elements()) {
            return Err(MatrixError::ReshapeMismatch {
                elements: self.num_elements(),
                rows,
                cols,
            });
        }
        if !self.is_contiguous() {
            return Err(MatrixError::NonContiguous(self.shape_info()));
        }
        self.set_shape(rows, cols);
        Ok(())
    }

    /// Soft transpose: change the orientation flag without moving data.
    ///
    /// Requires contiguous storage. The shape is kept and the stride becomes
    /// the new leading dimension, so applying the opposite orientation
    /// afterwards restores the original handle exactly.
    pub fn set_orientation(&mut self, orientation: Orientation) -> Result<()> {
        if orientation == self.orientation {
            return Ok(());
        }
        if !self.is_contiguous() {
            return Err(MatrixError::NonContiguous(self.shape_info()));
        }
        self.orientation = orientation;
        self.stride = self.leading_dim();
        Ok(())
    }

    /// Soft transpose to the opposite orientation.
    pub fn flip_trans(&mut self) -> Result<()> {
        self.set_orientation(self.orientation.flipped())
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    fn borrowed(&self) -> Storage<'_> {
        Storage::View(self.buffer())
    }

    /// A view of the whole handle.
    pub fn view(&self) -> DeviceMatrix<'_> {
        DeviceMatrix {
            storage: self.borrowed(),
            offset: self.offset,
            num_rows: self.num_rows,
            num_cols: self.num_cols,
            stride: self.stride,
            orientation: self.orientation,
        }
    }

    /// Zero-copy view of the logical transpose: rows and columns swap and the
    /// orientation flips, addressing the same elements with the same stride.
    pub fn transposed(&self) -> DeviceMatrix<'_> {
        DeviceMatrix {
            storage: self.borrowed(),
            offset: self.offset,
            num_rows: self.num_cols,
            num_cols: self.num_rows,
            stride: self.stride,
            orientation: self.orientation.flipped(),
        }
    }

    /// View of the sub-matrix `rows x cols`.
    pub fn slice(&self, rows: Range<usize>, cols: Range<usize>) -> Result<DeviceMatrix<'_>> {
        check_range(&rows, self.num_rows)?;
        check_range(&cols, self.num_cols)?;
        let (lead0, follow0) = self.orientation.to_physical(rows.start, cols.start);
        Ok(DeviceMatrix {
            storage: self.borrowed(),
            offset: self.offset + follow0 * self.stride + lead0,
            num_rows: rows.end - rows.start,
            num_cols: cols.end - cols.start,
            stride: self.stride,
            orientation: self.orientation,
        })
    }

    /// View of rows `start..end`.
    pub fn slice_rows(&self, start: usize, end: usize) -> Result<DeviceMatrix<'_>> {
        self.slice(start..end, 0..self.num_cols)
    }

    /// View of columns `start..end`.
    pub fn slice_cols(&self, start: usize, end: usize) -> Result<DeviceMatrix<'_>> {
        self.slice(0..self.num_rows, start..end)
    }

    // ------------------------------------------------------------------
    // Copies and fills
    // ------------------------------------------------------------------

    /// A new owning handle with the same shape, orientation and values.
    pub fn copy(&self) -> Result<Matrix> {
        let mut out = Matrix::with_orientation(self.num_rows, self.num_cols, self.orientation)?;
        self.copy_into(&mut out)?;
        Ok(out)
    }

    /// Copy into `target`, resizing it and keeping its orientation.
    pub fn copy_into(&self, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_unary_into(&Identity, target)
    }

    /// Copy the sub-matrix `rows x cols` into `target` at `(dest_row, dest_col)`.
    pub fn copy_region(
        &self,
        rows: Range<usize>,
        cols: Range<usize>,
        target: &mut DeviceMatrix<'_>,
        dest_row: usize,
        dest_col: usize,
    ) -> Result<()> {
        let src = self.slice(rows, cols)?;
        let dest_rows = dest_row..dest_row.saturating_add(src.num_rows);
        let dest_cols = dest_col..dest_col.saturating_add(src.num_cols);
        let mut dest = target.slice(dest_rows, dest_cols)?;
        src.copy_into(&mut dest)
    }

    /// Hard transpose: write the logical transpose into `target`, resizing it
    /// to `cols x rows` and keeping its orientation.
    pub fn transpose_into(&self, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.transposed().apply_unary_into(&Identity, target)
    }

    /// Hard transpose into a new handle with the receiver's orientation.
    pub fn transpose(&self) -> Result<Matrix> {
        let mut out = Matrix::with_orientation(self.num_cols, self.num_rows, self.orientation)?;
        self.transpose_into(&mut out)?;
        Ok(out)
    }

    pub fn zero(&mut self) -> Result<()> {
        self.fill(0.0)
    }

    pub fn fill(&mut self, value: f32) -> Result<()> {
        self.apply_unary(&Constant(value))
    }

    // ------------------------------------------------------------------
    // Kernel arguments and aliasing
    // ------------------------------------------------------------------

    #[inline]
    pub(crate) fn operand(&self) -> Operand {
        Operand::new(self.device_ptr(), self.stride)
    }

    #[inline]
    pub(crate) fn extent(&self) -> Extent {
        Extent {
            lead: self.leading_dim(),
            follow: self.following_dim(),
        }
    }

    fn shares_buffer(&self, other: &DeviceMatrix<'_>) -> bool {
        match (self.buffer(), other.buffer()) {
            (Some(a), Some(b)) => std::ptr::eq(a, b),
            _ => false,
        }
    }

    /// Same buffer, same elements, same layout.
    pub(crate) fn same_addressing(&self, other: &DeviceMatrix<'_>) -> bool {
        self.shares_buffer(other)
            && self.offset == other.offset
            && self.stride == other.stride
            && self.orientation == other.orientation
            && self.is_same_dims(other)
    }

    /// Whether the two handles may touch a common element.
    ///
    /// Exact for handles with the same stride and orientation (rectangles in
    /// the shared `(leading, following)` grid); otherwise compares the linear
    /// address spans, which may report overlap for interleaved regions.
    pub(crate) fn overlaps(&self, other: &DeviceMatrix<'_>) -> bool {
        if !self.shares_buffer(other) || self.num_elements() == 0 || other.num_elements() == 0 {
            return false;
        }
        if self.stride == other.stride && self.orientation == other.orientation {
            let s = self.stride;
            let (lead_a, follow_a) = (self.offset % s, self.offset / s);
            let (lead_b, follow_b) = (other.offset % s, other.offset / s);
            let leads = intersects(lead_a, self.leading_dim(), lead_b, other.leading_dim());
            let follows = intersects(follow_a, self.following_dim(), follow_b, other.following_dim());
            return leads && follows;
        }
        intersects(self.offset, self.span(), other.offset, other.span())
    }

    fn span(&self) -> usize {
        (self.following_dim() - 1) * self.stride + self.leading_dim()
    }
}

/// Resize `target` once `validate` accepts the handle the resize would
/// produce. On any error `target` is unchanged.
pub(crate) fn resize_validated<F>(
    target: &mut DeviceMatrix<'_>,
    rows: usize,
    cols: usize,
    orientation: Orientation,
    validate: F,
) -> Result<()>
where
    F: FnOnce(&DeviceMatrix<'_>) -> Result<()>,
{
    if let Some(planned) = target.planned_resize(rows, cols, orientation)? {
        validate(&planned)?;
    }
    target.resize_oriented(rows, cols, orientation)?;
    Ok(())
}

fn check_range(range: &Range<usize>, len: usize) -> Result<()> {
    if range.start > range.end || range.end > len {
        return Err(MatrixError::InvalidSlice {
            start: range.start,
            end: range.end,
            len,
        });
    }
    Ok(())
}

#[inline]
fn intersects(start_a: usize, len_a: usize, start_b: usize, len_b: usize) -> bool {
    start_a < start_b + len_b && start_b < start_a + len_a
}

/// A target must address exactly the elements of an operand it shares
/// memory with, or none of them.
pub(crate) fn check_alias(target: &DeviceMatrix<'_>, operand: &DeviceMatrix<'_>) -> Result<()> {
    if target.same_addressing(operand) || !target.overlaps(operand) {
        Ok(())
    } else {
        Err(MatrixError::Aliasing {
            target: target.shape_info(),
            operand: operand.shape_info(),
        })
    }
}

impl std::fmt::Debug for DeviceMatrix<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceMatrix")
            .field("rows", &self.num_rows)
            .field("cols", &self.num_cols)
            .field("stride", &self.stride)
            .field("orientation", &self.orientation)
            .field("offset", &self.offset)
            .field("owns_data", &self.owns_data())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iota(rows: usize, cols: usize) -> Matrix {
        let mut m = Matrix::new(rows, cols).unwrap();
        for i in 0..rows {
            for j in 0..cols {
                m.set(i, j, (i * cols + j) as f32).unwrap();
            }
        }
        m
    }

    #[test]
    fn test_empty() {
        let m = Matrix::empty();
        assert_eq!(m.num_elements(), 0);
        assert!(m.owns_data());
        assert!(m.device_ptr().is_null());
        assert!(m.is_contiguous());
    }

    #[test]
    fn test_addressing_by_orientation() {
        let m = iota(2, 3);
        let p = m.device_ptr();
        assert_eq!(m.stride(), 3);
        assert_eq!(unsafe { *p.add(3 + 2) }, 5.0);

        let mut c = Matrix::with_orientation(2, 3, Orientation::ColMajor).unwrap();
        c.set(1, 2, 9.0).unwrap();
        assert_eq!(c.stride(), 2);
        assert_eq!(unsafe { *c.device_ptr().add(2 * 2 + 1) }, 9.0);
    }

    #[test]
    fn test_get_out_of_bounds() {
        let m = Matrix::new(2, 2).unwrap();
        assert!(matches!(
            m.get(2, 0),
            Err(MatrixError::IndexOutOfBounds { row: 2, col: 0, .. })
        ));
    }

    #[test]
    fn test_resize_policy() {
        let mut m = Matrix::new(2, 3).unwrap();
        assert!(!m.resize(2, 3).unwrap());
        let before = m.device_ptr();
        assert!(!m.resize(3, 2).unwrap());
        assert_eq!(m.device_ptr(), before);
        assert_eq!(m.stride(), 2);
        assert!(m.resize(4, 4).unwrap());
        assert_eq!(m.num_elements(), 16);
        assert!(m.resize(0, 4).unwrap());
        assert!(m.device_ptr().is_null());
    }

    #[test]
    fn test_view_cannot_change_element_count() {
        let m = Matrix::new(4, 4).unwrap();
        let mut v = m.slice_rows(0, 2).unwrap();
        assert!(matches!(
            v.resize(3, 3),
            Err(MatrixError::ViewResize { current: 8, requested: 9 })
        ));
        // Same count on a contiguous row slice is metadata only.
        assert!(!v.resize(4, 2).unwrap());
    }

    #[test]
    fn test_planned_resize_leaves_handle() {
        let m = Matrix::new(4, 4).unwrap();
        assert!(m.planned_resize(3, 3, Orientation::RowMajor).unwrap().is_none());

        let mut v = m.slice_rows(1, 3).unwrap();
        v.reshape(4, 2).unwrap();
        let planned = v.planned_resize(2, 4, Orientation::RowMajor).unwrap().unwrap();
        assert_eq!((planned.num_rows(), planned.num_cols(), planned.stride()), (2, 4, 4));
        assert_eq!((v.num_rows(), v.num_cols(), v.stride()), (4, 2, 2));
        assert!(matches!(
            v.planned_resize(4, 2, Orientation::ColMajor),
            Err(MatrixError::ViewReorient(_))
        ));
        let col_major = Matrix::with_orientation(4, 2, Orientation::ColMajor).unwrap();
        assert!(matches!(v.resize_like(&col_major), Err(MatrixError::ViewReorient(_))));
        assert_eq!(v.orientation(), Orientation::RowMajor);
    }

    #[test]
    fn test_reshape() {
        let mut m = iota(2, 6);
        m.reshape(3, 4).unwrap();
        assert_eq!(m.get(1, 0).unwrap(), 4.0);
        assert!(matches!(
            m.reshape(5, 5),
            Err(MatrixError::ReshapeMismatch { elements: 12, .. })
        ));
        let mut cols = m.slice_cols(0, 2).unwrap();
        assert!(matches!(cols.reshape(2, 3), Err(MatrixError::NonContiguous(_))));
    }

    #[test]
    fn test_slice_offsets_follow_orientation() {
        let m = iota(4, 5);
        let s = m.slice(1..3, 2..5).unwrap();
        assert!(!s.owns_data());
        assert_eq!(s.stride(), 5);
        assert_eq!((s.num_rows(), s.num_cols()), (2, 3));
        assert_eq!(s.device_ptr(), m.device_ptr().wrapping_add(5 + 2));
        assert_eq!(s.get(0, 0).unwrap(), 7.0);
        assert_eq!(s.get(1, 2).unwrap(), 14.0);

        let c = Matrix::with_orientation(4, 5, Orientation::ColMajor).unwrap();
        let cs = c.slice_cols(2, 4).unwrap();
        assert_eq!(cs.device_ptr(), c.device_ptr().wrapping_add(2 * 4));
        let rs = c.slice_rows(1, 3).unwrap();
        assert_eq!(rs.device_ptr(), c.device_ptr().wrapping_add(1));
    }

    #[test]
    fn test_invalid_slice() {
        let m = Matrix::new(3, 3).unwrap();
        assert!(matches!(
            m.slice_rows(2, 4),
            Err(MatrixError::InvalidSlice { start: 2, end: 4, len: 3 })
        ));
        assert!(matches!(m.slice_cols(2, 1), Err(MatrixError::InvalidSlice { .. })));
        assert_eq!(m.slice_rows(3, 3).unwrap().num_elements(), 0);
    }

    #[test]
    fn test_flip_trans_requires_contiguous() {
        let m = iota(3, 4);
        let mut v = m.slice_cols(1, 3).unwrap();
        assert!(matches!(v.flip_trans(), Err(MatrixError::NonContiguous(_))));
    }

    #[test]
    fn test_transposed_view_addresses_same_elements() {
        let m = iota(3, 4);
        let s = m.slice(1..3, 1..4).unwrap();
        let t = s.transposed();
        assert_eq!((t.num_rows(), t.num_cols()), (3, 2));
        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(t.get(j, i).unwrap(), s.get(i, j).unwrap());
            }
        }
    }

    #[test]
    fn test_overlap_detection() {
        let m = Matrix::new(6, 6).unwrap();
        let a = m.slice(0..3, 0..3).unwrap();
        let b = m.slice(3..6, 0..3).unwrap();
        let c = m.slice(2..4, 2..4).unwrap();
        let d = m.slice(0..3, 3..6).unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(!a.overlaps(&d));
        assert!(check_alias(&a, &a.view()).is_ok());
        assert!(check_alias(&a, &c).is_err());
        let other = Matrix::new(6, 6).unwrap();
        assert!(!a.overlaps(&other));
    }

    #[test]
    fn test_debug_format() {
        let m = Matrix::new(1, 2).unwrap();
        let text = format!("{m:?}");
        assert!(text.contains("rows: 1"));
        assert!(text.contains("owns_data: true"));
    }
}
