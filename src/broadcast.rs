//! Matrix-vector broadcast.
//!
//! A column vector (`rows x 1`) carries one value per row, a row vector
//! (`1 x cols`) one value per column. Which physical index selects the vector
//! element depends on the matrix orientation: one value per row of a
//! row-major matrix is one value per following index, while one value per
//! row of a column-major matrix is one value per leading index.

use crate::device::{default_stream, LaunchGeometry};
use crate::dispatch::{bounds_check, BoundsCheck};
use crate::kernel::broadcast_binary;
use crate::matrix::{check_alias, resize_validated, DeviceMatrix};
use crate::operators::{BinaryOp, Divide, Equals, Multiply, WeightedAdd};
use crate::order::Orientation;
use crate::{MatrixError, Result};

/// Physical index that selects the vector element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastAxis {
    PerFollowing,
    PerLeading,
}

/// Broadcast axis for `vector` against `matrix`.
///
/// The vector must have one row or one column. A `rows x 1` vector matching
/// the row count broadcasts per row and a `1 x cols` vector matching the
/// column count per column; otherwise its length decides, preferring rows.
pub fn broadcast_axis(vector: &DeviceMatrix<'_>, matrix: &DeviceMatrix<'_>) -> Result<BroadcastAxis> {
    if vector.num_rows() != 1 && vector.num_cols() != 1 {
        return Err(MatrixError::InvalidVector(vector.shape_info()));
    }
    let len = vector.num_elements();
    let per_row = if vector.num_cols() == 1 && len == matrix.num_rows() {
        true
    } else if vector.num_rows() == 1 && len == matrix.num_cols() {
        false
    } else if len == matrix.num_rows() {
        true
    } else if len == matrix.num_cols() {
        false
    } else {
        return Err(MatrixError::ShapeMismatch(vector.shape_info(), matrix.shape_info()));
    };
    let row_major = matrix.orientation() == Orientation::RowMajor;
    Ok(if per_row == row_major {
        BroadcastAxis::PerFollowing
    } else {
        BroadcastAxis::PerLeading
    })
}

impl DeviceMatrix<'_> {
    /// `target = op(self, vector)` with `vector` broadcast along one axis.
    ///
    /// `target` takes the receiver's shape and orientation; a view target
    /// must already have that orientation. It must not share memory with
    /// `vector`.
    pub fn apply_binary_vector_into<Op: BinaryOp>(
        &self,
        op: &Op,
        vector: &DeviceMatrix<'_>,
        target: &mut DeviceMatrix<'_>,
    ) -> Result<()> {
        self.apply_binary_vector_into_with(op, vector, target, &LaunchGeometry::default())
    }

    pub fn apply_binary_vector_into_with<Op: BinaryOp>(
        &self,
        op: &Op,
        vector: &DeviceMatrix<'_>,
        target: &mut DeviceMatrix<'_>,
        geometry: &LaunchGeometry,
    ) -> Result<()> {
        let axis = broadcast_axis(vector, self)?;
        if !vector.is_contiguous() {
            return Err(MatrixError::NonContiguous(vector.shape_info()));
        }
        let (rows, cols) = (self.num_rows(), self.num_cols());
        resize_validated(target, rows, cols, self.orientation(), |planned| {
            if planned.overlaps(vector) {
                return Err(MatrixError::Aliasing {
                    target: planned.shape_info(),
                    operand: vector.shape_info(),
                });
            }
            check_alias(planned, self)
        })?;
        launch_broadcast(op, axis, self, vector, target, geometry)
    }

    /// In place: `self = op(self, vector)`.
    pub fn apply_binary_vector<Op: BinaryOp>(
        &mut self,
        op: &Op,
        vector: &DeviceMatrix<'_>,
    ) -> Result<()> {
        self.apply_binary_vector_with(op, vector, &LaunchGeometry::default())
    }

    pub fn apply_binary_vector_with<Op: BinaryOp>(
        &mut self,
        op: &Op,
        vector: &DeviceMatrix<'_>,
        geometry: &LaunchGeometry,
    ) -> Result<()> {
        let axis = broadcast_axis(vector, self)?;
        if !vector.is_contiguous() {
            return Err(MatrixError::NonContiguous(vector.shape_info()));
        }
        if self.overlaps(vector) {
            return Err(MatrixError::Aliasing {
                target: self.shape_info(),
                operand: vector.shape_info(),
            });
        }
        launch_broadcast(op, axis, self, vector, self, geometry)
    }

    /// `target = self + scale * vector`
    pub fn add_vector(
        &self,
        vector: &DeviceMatrix<'_>,
        scale: f32,
        target: &mut DeviceMatrix<'_>,
    ) -> Result<()> {
        let op = WeightedAdd {
            scale_a: 1.0,
            scale_b: scale,
        };
        self.apply_binary_vector_into(&op, vector, target)
    }

    pub fn eltwise_mult_by_vector(
        &self,
        vector: &DeviceMatrix<'_>,
        target: &mut DeviceMatrix<'_>,
    ) -> Result<()> {
        self.apply_binary_vector_into(&Multiply, vector, target)
    }

    pub fn eltwise_divide_by_vector(
        &self,
        vector: &DeviceMatrix<'_>,
        target: &mut DeviceMatrix<'_>,
    ) -> Result<()> {
        self.apply_binary_vector_into(&Divide, vector, target)
    }

    pub fn equals_vector(&self, vector: &DeviceMatrix<'_>, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_binary_vector_into(&Equals, vector, target)
    }
}

fn launch_broadcast<Op: BinaryOp>(
    op: &Op,
    axis: BroadcastAxis,
    src: &DeviceMatrix<'_>,
    vector: &DeviceMatrix<'_>,
    target: &DeviceMatrix<'_>,
    geometry: &LaunchGeometry,
) -> Result<()> {
    let extent = target.extent();
    let check = bounds_check(extent.lead, extent.follow, geometry);
    let (t, s, v) = (target.operand(), src.operand(), vector.operand());
    let kernel = match axis {
        BroadcastAxis::PerFollowing => "broadcast_per_following",
        BroadcastAxis::PerLeading => "broadcast_per_leading",
    };
    log::trace!("vector dispatch: {:?}, {:?}", axis, check);
    default_stream().launch(kernel, extent.lead, extent.follow, || unsafe {
        match (axis, check) {
            (BroadcastAxis::PerFollowing, BoundsCheck::Unchecked) => {
                broadcast_binary::<true, false, _>(t, s, v, extent, geometry, op)
            }
            (BroadcastAxis::PerFollowing, BoundsCheck::Checked) => {
                broadcast_binary::<true, true, _>(t, s, v, extent, geometry, op)
            }
            (BroadcastAxis::PerLeading, BoundsCheck::Unchecked) => {
                broadcast_binary::<false, false, _>(t, s, v, extent, geometry, op)
            }
            (BroadcastAxis::PerLeading, BoundsCheck::Checked) => {
                broadcast_binary::<false, true, _>(t, s, v, extent, geometry, op)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;
    use crate::operators::Subtract;

    fn column(values: &[f32]) -> Matrix {
        let mut v = Matrix::new(values.len(), 1).unwrap();
        for (i, &x) in values.iter().enumerate() {
            v.set(i, 0, x).unwrap();
        }
        v
    }

    fn row(values: &[f32]) -> Matrix {
        let mut v = Matrix::new(1, values.len()).unwrap();
        for (j, &x) in values.iter().enumerate() {
            v.set(0, j, x).unwrap();
        }
        v
    }

    #[test]
    fn test_axis_selection() {
        let rm = Matrix::new(3, 4).unwrap();
        let cm = Matrix::with_orientation(3, 4, Orientation::ColMajor).unwrap();
        let per_row = column(&[1.0, 2.0, 3.0]);
        let per_col = row(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(broadcast_axis(&per_row, &rm).unwrap(), BroadcastAxis::PerFollowing);
        assert_eq!(broadcast_axis(&per_row, &cm).unwrap(), BroadcastAxis::PerLeading);
        assert_eq!(broadcast_axis(&per_col, &rm).unwrap(), BroadcastAxis::PerLeading);
        assert_eq!(broadcast_axis(&per_col, &cm).unwrap(), BroadcastAxis::PerFollowing);
    }

    #[test]
    fn test_square_matrix_uses_vector_shape() {
        let m = Matrix::new(3, 3).unwrap();
        let per_col = row(&[1.0, 2.0, 3.0]);
        let mut t = Matrix::empty();
        m.add_vector(&per_col, 1.0, &mut t).unwrap();
        assert_eq!(t.get(2, 0).unwrap(), 1.0);
        assert_eq!(t.get(0, 2).unwrap(), 3.0);
    }

    #[test]
    fn test_invalid_vectors() {
        let m = Matrix::new(3, 4).unwrap();
        let not_vector = Matrix::new(2, 2).unwrap();
        assert!(matches!(
            broadcast_axis(&not_vector, &m),
            Err(MatrixError::InvalidVector(_))
        ));
        let wrong_len = column(&[1.0, 2.0]);
        assert!(matches!(
            broadcast_axis(&wrong_len, &m),
            Err(MatrixError::ShapeMismatch(..))
        ));
    }

    #[test]
    fn test_strided_vector_rejected() {
        let m = Matrix::new(3, 4).unwrap();
        let source = Matrix::new(3, 4).unwrap();
        let col = source.slice_cols(1, 2).unwrap();
        let mut t = Matrix::empty();
        assert!(matches!(
            m.add_vector(&col, 1.0, &mut t),
            Err(MatrixError::NonContiguous(_))
        ));
    }

    #[test]
    fn test_target_overlapping_vector_rejected() {
        let m = Matrix::new(4, 4).unwrap();
        let v = m.slice_rows(0, 1).unwrap();
        let mut t = m.view();
        let err = m.add_vector(&v, 1.0, &mut t).unwrap_err();
        assert!(matches!(err, MatrixError::Aliasing { .. }));
    }

    #[test]
    fn test_target_adopts_matrix_orientation() {
        let m = Matrix::filled(2, 3, 5.0).unwrap();
        let mut cm = Matrix::with_orientation(2, 3, Orientation::ColMajor).unwrap();
        m.copy_into(&mut cm).unwrap();
        let v = row(&[1.0, 2.0, 3.0]);
        let mut t = Matrix::new(2, 3).unwrap();
        cm.apply_binary_vector_into(&Subtract, &v, &mut t).unwrap();
        assert_eq!(t.orientation(), Orientation::ColMajor);
        assert_eq!(t.get(1, 2).unwrap(), 2.0);
    }

    #[test]
    fn test_in_place_divide() {
        let mut m = Matrix::filled(2, 2, 6.0).unwrap();
        let v = column(&[2.0, 3.0]);
        m.apply_binary_vector(&Divide, &v).unwrap();
        assert_eq!(m.get(0, 1).unwrap(), 3.0);
        assert_eq!(m.get(1, 0).unwrap(), 2.0);
    }
}
