//! Reductions: whole-matrix aggregates, per-axis aggregates and arg-max.
//!
//! An [`Aggregator`] supplies an identity, an associative `combine` and an
//! optional per-element `map` applied before combining.
//!
//! Whole-matrix reductions run in two phases. Each execution unit reduces a
//! contiguous chunk of the physical traversal (following-major, leading
//! minor) to one partial; after the stream synchronizes the host combines the
//! partials in unit order. The result is deterministic for a fixed
//! [`LaunchGeometry`] and may differ in the last bits between geometries.
//!
//! Arg-max returns a physical traversal index. Ties resolve to the lowest
//! index in that order, which for a column-major matrix is not the lowest
//! row-major index. Use [`DeviceMatrix::physical_index_to_coords`] to map an
//! index back to `(row, col)`.

use crate::device::{default_stream, LaunchGeometry};
use crate::kernel::{argmax_lines, argmax_partials, reduce_lines, reduce_partials, Partition};
use crate::matrix::{resize_validated, DeviceMatrix, Matrix};
use crate::maybe_sync::MaybeSync;
use crate::operators::{Identity, UnaryOp};
use crate::order::Orientation;
use crate::{MatrixError, Result};

/// Identity, associative combine and optional pre-transform of a reduction.
pub trait Aggregator: MaybeSync {
    fn identity(&self) -> f32;
    fn combine(&self, acc: f32, x: f32) -> f32;
    /// Applied to each element before it is combined.
    #[inline(always)]
    fn map(&self, x: f32) -> f32 {
        x
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl Aggregator for Sum {
    #[inline(always)]
    fn identity(&self) -> f32 {
        0.0
    }
    #[inline(always)]
    fn combine(&self, acc: f32, x: f32) -> f32 {
        acc + x
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Min;

impl Aggregator for Min {
    #[inline(always)]
    fn identity(&self) -> f32 {
        f32::INFINITY
    }
    #[inline(always)]
    fn combine(&self, acc: f32, x: f32) -> f32 {
        acc.min(x)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

impl Aggregator for Max {
    #[inline(always)]
    fn identity(&self) -> f32 {
        f32::NEG_INFINITY
    }
    #[inline(always)]
    fn combine(&self, acc: f32, x: f32) -> f32 {
        acc.max(x)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SumOfSquares;

impl Aggregator for SumOfSquares {
    #[inline(always)]
    fn identity(&self) -> f32 {
        0.0
    }
    #[inline(always)]
    fn combine(&self, acc: f32, x: f32) -> f32 {
        acc + x
    }
    #[inline(always)]
    fn map(&self, x: f32) -> f32 {
        x * x
    }
}

/// `1.0` if any element satisfies the predicate.
struct AnyOf(fn(f32) -> bool);

impl Aggregator for AnyOf {
    fn identity(&self) -> f32 {
        0.0
    }
    fn combine(&self, acc: f32, x: f32) -> f32 {
        acc.max(x)
    }
    fn map(&self, x: f32) -> f32 {
        (self.0)(x) as u8 as f32
    }
}

/// Physical direction of a per-axis reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceDirection {
    /// Each line is a contiguous run at a fixed following index.
    AlongLeading,
    /// Each line is a strided run at a fixed leading index.
    AlongFollowing,
}

/// Direction for reducing `axis` (0 = down rows, 1 = across columns).
pub fn reduce_direction(axis: usize, orientation: Orientation) -> Result<ReduceDirection> {
    match (axis, orientation) {
        (0, Orientation::RowMajor) | (1, Orientation::ColMajor) => Ok(ReduceDirection::AlongFollowing),
        (0, Orientation::ColMajor) | (1, Orientation::RowMajor) => Ok(ReduceDirection::AlongLeading),
        _ => Err(MatrixError::InvalidAxis(axis)),
    }
}

impl DeviceMatrix<'_> {
    fn axis_result_shape(&self, axis: usize) -> Result<(usize, usize)> {
        match axis {
            0 => Ok((1, self.num_cols())),
            1 => Ok((self.num_rows(), 1)),
            _ => Err(MatrixError::InvalidAxis(axis)),
        }
    }

    /// Resize `target` to hold one value per line and check it can be
    /// written linearly.
    fn prepare_axis_target(&self, axis: usize, target: &mut DeviceMatrix<'_>) -> Result<ReduceDirection> {
        let direction = reduce_direction(axis, self.orientation())?;
        let (rows, cols) = self.axis_result_shape(axis)?;
        let orientation = target.orientation();
        resize_validated(target, rows, cols, orientation, |planned| {
            if !planned.is_contiguous() {
                return Err(MatrixError::NonContiguous(planned.shape_info()));
            }
            if planned.overlaps(self) {
                return Err(MatrixError::Aliasing {
                    target: planned.shape_info(),
                    operand: self.shape_info(),
                });
            }
            Ok(())
        })?;
        Ok(direction)
    }

    // ------------------------------------------------------------------
    // Per-axis
    // ------------------------------------------------------------------

    /// Reduce along `axis` into `target`: axis 0 yields `1 x cols`, axis 1
    /// yields `rows x 1`. `target` keeps its orientation.
    pub fn reduce_axis_into<A: Aggregator>(
        &self,
        agg: &A,
        axis: usize,
        target: &mut DeviceMatrix<'_>,
    ) -> Result<()> {
        self.reduce_axis_into_with(agg, axis, target, &LaunchGeometry::default())
    }

    pub fn reduce_axis_into_with<A: Aggregator>(
        &self,
        agg: &A,
        axis: usize,
        target: &mut DeviceMatrix<'_>,
        geometry: &LaunchGeometry,
    ) -> Result<()> {
        let direction = self.prepare_axis_target(axis, target)?;
        let (out, src, extent) = (target.operand(), self.operand(), self.extent());
        log::trace!("axis reduction: axis {}, {:?}", axis, direction);
        default_stream().launch("reduce_lines", extent.lead, extent.follow, || unsafe {
            match direction {
                ReduceDirection::AlongLeading => reduce_lines::<true, _>(out, src, extent, geometry, agg),
                ReduceDirection::AlongFollowing => {
                    reduce_lines::<false, _>(out, src, extent, geometry, agg)
                }
            }
        })
    }

    /// Reduce along `axis` into a new handle with the receiver's orientation.
    pub fn reduce_axis<A: Aggregator>(&self, agg: &A, axis: usize) -> Result<Matrix> {
        let (rows, cols) = self.axis_result_shape(axis)?;
        let mut out = Matrix::with_orientation(rows, cols, self.orientation())?;
        self.reduce_axis_into(agg, axis, &mut out)?;
        Ok(out)
    }

    pub fn sum_axis(&self, axis: usize) -> Result<Matrix> {
        self.reduce_axis(&Sum, axis)
    }

    pub fn max_axis(&self, axis: usize) -> Result<Matrix> {
        self.reduce_axis(&Max, axis)
    }

    pub fn min_axis(&self, axis: usize) -> Result<Matrix> {
        self.reduce_axis(&Min, axis)
    }

    /// Per line, the index along `axis` of the largest `transform(x)`, written
    /// as `f32`. Ties keep the lowest index.
    pub fn argmax_axis_into<T: UnaryOp>(
        &self,
        axis: usize,
        transform: &T,
        target: &mut DeviceMatrix<'_>,
    ) -> Result<()> {
        self.argmax_axis_into_with(axis, transform, target, &LaunchGeometry::default())
    }

    pub fn argmax_axis_into_with<T: UnaryOp>(
        &self,
        axis: usize,
        transform: &T,
        target: &mut DeviceMatrix<'_>,
        geometry: &LaunchGeometry,
    ) -> Result<()> {
        let direction = self.prepare_axis_target(axis, target)?;
        let (out, src, extent) = (target.operand(), self.operand(), self.extent());
        default_stream().launch("argmax_lines", extent.lead, extent.follow, || unsafe {
            match direction {
                ReduceDirection::AlongLeading => {
                    argmax_lines::<true, _>(out, src, extent, geometry, transform)
                }
                ReduceDirection::AlongFollowing => {
                    argmax_lines::<false, _>(out, src, extent, geometry, transform)
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Whole matrix
    // ------------------------------------------------------------------

    /// Aggregate every element. Synchronizes the stream. An empty matrix
    /// yields the aggregator's identity.
    pub fn reduce_all<A: Aggregator>(&self, agg: &A) -> Result<f32> {
        self.reduce_all_with(agg, &LaunchGeometry::default())
    }

    pub fn reduce_all_with<A: Aggregator>(&self, agg: &A, geometry: &LaunchGeometry) -> Result<f32> {
        let extent = self.extent();
        let partition = Partition::new(extent.len(), geometry.reduce_units());
        let src = self.operand();
        let mut partials = Vec::new();
        default_stream().launch("reduce_partials", extent.lead, extent.follow, || {
            partials = unsafe { reduce_partials(src, extent, partition, agg) };
        })?;
        default_stream().synchronize();
        log::trace!("combining {} partials (chunk {})", partials.len(), partition.chunk);
        Ok(partials
            .into_iter()
            .fold(agg.identity(), |acc, partial| agg.combine(acc, partial)))
    }

    pub fn sum(&self) -> Result<f32> {
        self.reduce_all(&Sum)
    }

    /// Smallest element; `+inf` for an empty matrix.
    pub fn min(&self) -> Result<f32> {
        self.reduce_all(&Min)
    }

    /// Largest element; `-inf` for an empty matrix.
    pub fn max(&self) -> Result<f32> {
        self.reduce_all(&Max)
    }

    pub fn sum_of_squares(&self) -> Result<f32> {
        self.reduce_all(&SumOfSquares)
    }

    pub fn mean(&self) -> Result<f32> {
        if self.num_elements() == 0 {
            return Err(MatrixError::Empty);
        }
        Ok(self.sum()? / self.num_elements() as f32)
    }

    /// Squared Frobenius norm.
    pub fn norm2(&self) -> Result<f32> {
        self.sum_of_squares()
    }

    /// Frobenius norm.
    pub fn norm(&self) -> Result<f32> {
        Ok(self.norm2()?.sqrt())
    }

    /// `sum(self .* b)`.
    pub fn dot_product(&self, b: &DeviceMatrix<'_>) -> Result<f32> {
        let mut product = Matrix::with_orientation(self.num_rows(), self.num_cols(), self.orientation())?;
        self.eltwise_mult(b, &mut product)?;
        product.sum()
    }

    pub fn has_nan(&self) -> Result<bool> {
        Ok(self.reduce_all(&AnyOf(f32::is_nan))? > 0.0)
    }

    pub fn has_inf(&self) -> Result<bool> {
        Ok(self.reduce_all(&AnyOf(f32::is_infinite))? > 0.0)
    }

    // ------------------------------------------------------------------
    // Arg-max
    // ------------------------------------------------------------------

    /// Physical traversal index of the largest `transform(x)`; ties resolve
    /// to the lowest index. Synchronizes the stream.
    pub fn argmax_with<T: UnaryOp>(&self, transform: &T) -> Result<usize> {
        self.argmax_with_geometry(transform, &LaunchGeometry::default())
    }

    pub fn argmax_with_geometry<T: UnaryOp>(
        &self,
        transform: &T,
        geometry: &LaunchGeometry,
    ) -> Result<usize> {
        if self.num_elements() == 0 {
            return Err(MatrixError::Empty);
        }
        let extent = self.extent();
        let partition = Partition::new(extent.len(), geometry.reduce_units());
        let src = self.operand();
        let mut partials = Vec::new();
        default_stream().launch("argmax_partials", extent.lead, extent.follow, || {
            partials = unsafe { argmax_partials(src, extent, partition, transform) };
        })?;
        default_stream().synchronize();
        let mut units = partials.into_iter();
        let first = units.next().ok_or(MatrixError::Empty)?;
        let (_, index) = units.fold(first, |best, candidate| {
            if candidate.0 > best.0 {
                candidate
            } else {
                best
            }
        });
        Ok(index)
    }

    /// Physical traversal index of the largest element.
    pub fn argmax(&self) -> Result<usize> {
        self.argmax_with(&Identity)
    }

    /// `(row, col)` of a physical traversal index.
    pub fn physical_index_to_coords(&self, index: usize) -> Result<(usize, usize)> {
        let lead = self.leading_dim();
        if index >= self.num_elements() {
            return Err(MatrixError::IndexOutOfBounds {
                row: index / lead.max(1),
                col: index % lead.max(1),
                rows: self.num_rows(),
                cols: self.num_cols(),
            });
        }
        Ok(self.orientation().to_logical(index % lead, index / lead))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::Abs;
    use approx::assert_relative_eq;

    fn from_fn(rows: usize, cols: usize, o: Orientation, f: impl Fn(usize, usize) -> f32) -> Matrix {
        let mut m = Matrix::with_orientation(rows, cols, o).unwrap();
        for i in 0..rows {
            for j in 0..cols {
                m.set(i, j, f(i, j)).unwrap();
            }
        }
        m
    }

    #[test]
    fn test_reduce_direction() {
        use ReduceDirection::*;
        assert_eq!(reduce_direction(0, Orientation::RowMajor).unwrap(), AlongFollowing);
        assert_eq!(reduce_direction(1, Orientation::RowMajor).unwrap(), AlongLeading);
        assert_eq!(reduce_direction(0, Orientation::ColMajor).unwrap(), AlongLeading);
        assert_eq!(reduce_direction(1, Orientation::ColMajor).unwrap(), AlongFollowing);
        assert!(matches!(
            reduce_direction(2, Orientation::RowMajor),
            Err(MatrixError::InvalidAxis(2))
        ));
    }

    #[test]
    fn test_sum_axis_both_orientations() {
        for o in [Orientation::RowMajor, Orientation::ColMajor] {
            let m = from_fn(3, 4, o, |i, j| (i * 4 + j) as f32);
            let down = m.sum_axis(0).unwrap();
            assert_eq!((down.num_rows(), down.num_cols()), (1, 4));
            assert_eq!(down.get(0, 1).unwrap(), 1.0 + 5.0 + 9.0);
            let across = m.sum_axis(1).unwrap();
            assert_eq!((across.num_rows(), across.num_cols()), (3, 1));
            assert_eq!(across.get(2, 0).unwrap(), 8.0 + 9.0 + 10.0 + 11.0);
        }
    }

    #[test]
    fn test_min_max_axis() {
        let m = from_fn(2, 3, Orientation::ColMajor, |i, j| (i as f32 - 1.0) * (j as f32 + 1.0));
        let mx = m.max_axis(0).unwrap();
        assert_eq!(mx.get(0, 2).unwrap(), 0.0);
        let mn = m.min_axis(1).unwrap();
        assert_eq!(mn.get(0, 0).unwrap(), -3.0);
    }

    #[test]
    fn test_axis_target_must_not_overlap() {
        let m = Matrix::new(4, 4).unwrap();
        let mut top = m.slice_rows(0, 1).unwrap();
        assert!(matches!(
            m.reduce_axis_into(&Sum, 0, &mut top),
            Err(MatrixError::Aliasing { .. })
        ));
    }

    #[test]
    fn test_whole_matrix_aggregates() {
        let m = from_fn(5, 7, Orientation::RowMajor, |i, j| (i * 7 + j) as f32 - 10.0);
        assert_relative_eq!(m.sum().unwrap(), (0..35).map(|x| x as f32 - 10.0).sum::<f32>());
        assert_eq!(m.min().unwrap(), -10.0);
        assert_eq!(m.max().unwrap(), 24.0);
        let ssq: f32 = (0..35).map(|x| (x as f32 - 10.0).powi(2)).sum();
        assert_relative_eq!(m.sum_of_squares().unwrap(), ssq, max_relative = 1e-6);
        assert_relative_eq!(m.norm().unwrap(), ssq.sqrt(), max_relative = 1e-6);
        assert_relative_eq!(m.mean().unwrap(), 7.0, max_relative = 1e-6);
    }

    #[test]
    fn test_reduce_all_on_strided_view() {
        let m = from_fn(4, 4, Orientation::RowMajor, |i, j| (i * 4 + j) as f32);
        let v = m.slice(1..3, 1..3).unwrap();
        assert_eq!(v.sum().unwrap(), 5.0 + 6.0 + 9.0 + 10.0);
    }

    #[test]
    fn test_empty_reductions() {
        let m = Matrix::empty();
        assert_eq!(m.sum().unwrap(), 0.0);
        assert!(matches!(m.argmax(), Err(MatrixError::Empty)));
        assert!(matches!(m.mean(), Err(MatrixError::Empty)));
    }

    #[test]
    fn test_argmax_physical_order() {
        // Ties between (0, 1) and (1, 0). Row-major traversal reaches (0, 1)
        // first; column-major traversal reaches (1, 0) first.
        let f = |i: usize, j: usize| if i + j == 1 { 9.0 } else { 0.0 };
        let rm = from_fn(2, 2, Orientation::RowMajor, f);
        let cm = from_fn(2, 2, Orientation::ColMajor, f);
        let ri = rm.argmax().unwrap();
        let ci = cm.argmax().unwrap();
        assert_eq!(ri, 1);
        assert_eq!(ci, 1);
        assert_eq!(rm.physical_index_to_coords(ri).unwrap(), (0, 1));
        assert_eq!(cm.physical_index_to_coords(ci).unwrap(), (1, 0));
    }

    #[test]
    fn test_argmax_with_transform_across_units() {
        let m = from_fn(1, 100, Orientation::RowMajor, |_, j| if j == 70 { -500.0 } else { j as f32 });
        let geometry = LaunchGeometry::new(32, 8, 7);
        assert_eq!(m.argmax_with_geometry(&Abs, &geometry).unwrap(), 70);
        assert_eq!(m.argmax_with_geometry(&Identity, &geometry).unwrap(), 99);
    }

    #[test]
    fn test_argmax_axis() {
        let m = from_fn(3, 3, Orientation::ColMajor, |i, j| ((i + 2 * j) % 3) as f32);
        let mut t = Matrix::empty();
        m.argmax_axis_into(1, &Identity, &mut t).unwrap();
        // rows: [0,2,1] [1,0,2] [2,1,0]
        assert_eq!(t.get(0, 0).unwrap(), 1.0);
        assert_eq!(t.get(1, 0).unwrap(), 2.0);
        assert_eq!(t.get(2, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_dot_and_special_values() {
        let a = from_fn(2, 3, Orientation::RowMajor, |i, j| (i + j) as f32);
        let b = from_fn(2, 3, Orientation::ColMajor, |_, _| 2.0);
        assert_eq!(a.dot_product(&b).unwrap(), 2.0 * (0.0 + 1.0 + 2.0 + 1.0 + 2.0 + 3.0));
        assert!(!a.has_nan().unwrap());
        let mut c = a.copy().unwrap();
        c.set(1, 1, f32::NAN).unwrap();
        assert!(c.has_nan().unwrap());
        c.set(0, 0, f32::INFINITY).unwrap();
        assert!(c.has_inf().unwrap());
    }
}
