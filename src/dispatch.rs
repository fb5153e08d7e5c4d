//! Orientation-aware elementwise dispatch.
//!
//! A binary operation involves three orientation flags (operand A, operand B,
//! target). The eight combinations collapse into four kernel layouts, decided
//! once per call by [`binary_layout`]:
//!
//! | target | A | B | layout |
//! |---|---|---|---|
//! | `t` | `t` | `t` | [`BinaryLayout::Direct`] |
//! | `t` | `t` | `!t` | [`BinaryLayout::TransposedB`] |
//! | `t` | `!t` | `!t` | [`BinaryLayout::TransposedAB`] |
//! | `t` | `!t` | `t` | [`BinaryLayout::SwappedTransposedB`] |
//!
//! The swapped layout feeds B first and A second to the B-transposed kernel
//! and calls the operator as `op(a, b)`, so non-commutative operators see
//! their operands in the original order.
//!
//! Independently, [`bounds_check`] selects the kernel variant that skips the
//! per-tile edge test when the target's physical extent is a whole multiple of
//! the launch tile. One call never mixes variants.

use crate::device::{default_stream, LaunchGeometry};
use crate::kernel::{eltwise_binary, eltwise_unary, Extent, Operand};
use crate::matrix::{check_alias, resize_validated, DeviceMatrix};
use crate::operators::{
    Add, AddScalar, BiggerThanScalar, BinaryOp, Divide, Equals, InRangeInc, MaxWithScalar, Maximum,
    MinWithScalar, Minimum, Multiply, Pow, Scale, SmallerThanScalar, Subtract, Swapped, UnaryOp,
    WeightedAdd,
};
use crate::order::Orientation;
use crate::{MatrixError, Result};

/// Kernel layout for a binary elementwise operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryLayout {
    /// All three buffers share a layout.
    Direct,
    /// B is addressed transposed relative to A and the target.
    TransposedB,
    /// A and B agree with each other but not with the target.
    TransposedAB,
    /// B agrees with the target, A does not: operands are fed swapped.
    SwappedTransposedB,
}

/// Kernel layout for a unary elementwise operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryLayout {
    Direct,
    Transposed,
}

/// Whether a launch may skip the tile edge test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsCheck {
    Unchecked,
    Checked,
}

/// Layout for orientations of operand A, operand B and the target.
pub fn binary_layout(a: Orientation, b: Orientation, target: Orientation) -> BinaryLayout {
    match (target.is_transposed(), a.is_transposed(), b.is_transposed()) {
        (false, false, false) | (true, true, true) => BinaryLayout::Direct,
        (false, false, true) | (true, true, false) => BinaryLayout::TransposedB,
        (false, true, true) | (true, false, false) => BinaryLayout::TransposedAB,
        (false, true, false) | (true, false, true) => BinaryLayout::SwappedTransposedB,
    }
}

pub fn unary_layout(src: Orientation, target: Orientation) -> UnaryLayout {
    if src == target {
        UnaryLayout::Direct
    } else {
        UnaryLayout::Transposed
    }
}

/// Unchecked iff both physical dimensions of the target divide evenly into
/// the launch tile.
pub fn bounds_check(lead: usize, follow: usize, geometry: &LaunchGeometry) -> BoundsCheck {
    if geometry.divides(lead, follow) {
        BoundsCheck::Unchecked
    } else {
        BoundsCheck::Checked
    }
}

impl BinaryLayout {
    fn kernel_name(self) -> &'static str {
        match self {
            BinaryLayout::Direct => "eltwise_binary_direct",
            BinaryLayout::TransposedB => "eltwise_binary_trans_b",
            BinaryLayout::TransposedAB => "eltwise_binary_trans_ab",
            BinaryLayout::SwappedTransposedB => "eltwise_binary_swapped_trans_b",
        }
    }
}

impl UnaryLayout {
    fn kernel_name(self) -> &'static str {
        match self {
            UnaryLayout::Direct => "eltwise_unary_direct",
            UnaryLayout::Transposed => "eltwise_unary_trans",
        }
    }
}

/// One kernel argument: where it lives and how it is laid out.
#[derive(Clone, Copy)]
pub(crate) struct KernelArg {
    pub(crate) operand: Operand,
    pub(crate) orientation: Orientation,
}

impl DeviceMatrix<'_> {
    pub(crate) fn kernel_arg(&self) -> KernelArg {
        KernelArg {
            operand: self.operand(),
            orientation: self.orientation(),
        }
    }
}

pub(crate) fn launch_binary<Op: BinaryOp>(
    op: &Op,
    a: KernelArg,
    b: KernelArg,
    target: KernelArg,
    extent: Extent,
    geometry: &LaunchGeometry,
) -> Result<()> {
    let layout = binary_layout(a.orientation, b.orientation, target.orientation);
    let check = bounds_check(extent.lead, extent.follow, geometry);
    log::trace!("binary dispatch: {:?}, {:?}, geometry {:?}", layout, check, geometry);
    let (t, a, b) = (target.operand, a.operand, b.operand);
    default_stream().launch(layout.kernel_name(), extent.lead, extent.follow, || unsafe {
        match (layout, check) {
            (BinaryLayout::Direct, BoundsCheck::Unchecked) => {
                eltwise_binary::<false, false, false, _>(t, a, b, extent, geometry, op)
            }
            (BinaryLayout::Direct, BoundsCheck::Checked) => {
                eltwise_binary::<false, false, true, _>(t, a, b, extent, geometry, op)
            }
            (BinaryLayout::TransposedB, BoundsCheck::Unchecked) => {
                eltwise_binary::<false, true, false, _>(t, a, b, extent, geometry, op)
            }
            (BinaryLayout::TransposedB, BoundsCheck::Checked) => {
                eltwise_binary::<false, true, true, _>(t, a, b, extent, geometry, op)
            }
            (BinaryLayout::TransposedAB, BoundsCheck::Unchecked) => {
                eltwise_binary::<true, true, false, _>(t, a, b, extent, geometry, op)
            }
            (BinaryLayout::TransposedAB, BoundsCheck::Checked) => {
                eltwise_binary::<true, true, true, _>(t, a, b, extent, geometry, op)
            }
            (BinaryLayout::SwappedTransposedB, BoundsCheck::Unchecked) => {
                eltwise_binary::<false, true, false, _>(t, b, a, extent, geometry, &Swapped(op))
            }
            (BinaryLayout::SwappedTransposedB, BoundsCheck::Checked) => {
                eltwise_binary::<false, true, true, _>(t, b, a, extent, geometry, &Swapped(op))
            }
        }
    })
}

pub(crate) fn launch_unary<Op: UnaryOp>(
    op: &Op,
    src: KernelArg,
    target: KernelArg,
    extent: Extent,
    geometry: &LaunchGeometry,
) -> Result<()> {
    let layout = unary_layout(src.orientation, target.orientation);
    let check = bounds_check(extent.lead, extent.follow, geometry);
    log::trace!("unary dispatch: {:?}, {:?}, geometry {:?}", layout, check, geometry);
    let (t, s) = (target.operand, src.operand);
    default_stream().launch(layout.kernel_name(), extent.lead, extent.follow, || unsafe {
        match (layout, check) {
            (UnaryLayout::Direct, BoundsCheck::Unchecked) => {
                eltwise_unary::<false, false, _>(t, s, extent, geometry, op)
            }
            (UnaryLayout::Direct, BoundsCheck::Checked) => {
                eltwise_unary::<false, true, _>(t, s, extent, geometry, op)
            }
            (UnaryLayout::Transposed, BoundsCheck::Unchecked) => {
                eltwise_unary::<true, false, _>(t, s, extent, geometry, op)
            }
            (UnaryLayout::Transposed, BoundsCheck::Checked) => {
                eltwise_unary::<true, true, _>(t, s, extent, geometry, op)
            }
        }
    })
}

impl DeviceMatrix<'_> {
    fn ensure_same_dims(&self, b: &DeviceMatrix<'_>) -> Result<()> {
        if !self.is_same_dims(b) {
            return Err(MatrixError::ShapeMismatch(self.shape_info(), b.shape_info()));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Generic entry points
    // ------------------------------------------------------------------

    /// `target = op(self, b)`.
    ///
    /// `target` is resized to the receiver's shape (keeping its orientation)
    /// when it differs. A target sharing memory with an operand must address
    /// exactly the operand's elements in the same layout.
    pub fn apply_binary_into<Op: BinaryOp>(
        &self,
        op: &Op,
        b: &DeviceMatrix<'_>,
        target: &mut DeviceMatrix<'_>,
    ) -> Result<()> {
        self.apply_binary_into_with(op, b, target, &LaunchGeometry::default())
    }

    pub fn apply_binary_into_with<Op: BinaryOp>(
        &self,
        op: &Op,
        b: &DeviceMatrix<'_>,
        target: &mut DeviceMatrix<'_>,
        geometry: &LaunchGeometry,
    ) -> Result<()> {
        self.ensure_same_dims(b)?;
        let orientation = target.orientation();
        resize_validated(target, self.num_rows(), self.num_cols(), orientation, |planned| {
            check_alias(planned, self)?;
            check_alias(planned, b)
        })?;
        launch_binary(
            op,
            self.kernel_arg(),
            b.kernel_arg(),
            target.kernel_arg(),
            target.extent(),
            geometry,
        )
    }

    /// In place: `self = op(self, b)`.
    pub fn apply_binary<Op: BinaryOp>(&mut self, op: &Op, b: &DeviceMatrix<'_>) -> Result<()> {
        self.apply_binary_with(op, b, &LaunchGeometry::default())
    }

    pub fn apply_binary_with<Op: BinaryOp>(
        &mut self,
        op: &Op,
        b: &DeviceMatrix<'_>,
        geometry: &LaunchGeometry,
    ) -> Result<()> {
        self.ensure_same_dims(b)?;
        check_alias(self, b)?;
        let this = self.kernel_arg();
        launch_binary(op, this, b.kernel_arg(), this, self.extent(), geometry)
    }

    /// `target = op(self)`, resizing `target` to the receiver's shape.
    pub fn apply_unary_into<Op: UnaryOp>(
        &self,
        op: &Op,
        target: &mut DeviceMatrix<'_>,
    ) -> Result<()> {
        self.apply_unary_into_with(op, target, &LaunchGeometry::default())
    }

    pub fn apply_unary_into_with<Op: UnaryOp>(
        &self,
        op: &Op,
        target: &mut DeviceMatrix<'_>,
        geometry: &LaunchGeometry,
    ) -> Result<()> {
        let orientation = target.orientation();
        resize_validated(target, self.num_rows(), self.num_cols(), orientation, |planned| {
            check_alias(planned, self)
        })?;
        launch_unary(op, self.kernel_arg(), target.kernel_arg(), target.extent(), geometry)
    }

    /// In place: `self = op(self)`.
    pub fn apply_unary<Op: UnaryOp>(&mut self, op: &Op) -> Result<()> {
        self.apply_unary_with(op, &LaunchGeometry::default())
    }

    pub fn apply_unary_with<Op: UnaryOp>(&mut self, op: &Op, geometry: &LaunchGeometry) -> Result<()> {
        let this = self.kernel_arg();
        launch_unary(op, this, this, self.extent(), geometry)
    }

    // ------------------------------------------------------------------
    // Binary conveniences
    // ------------------------------------------------------------------

    /// `target = self + b`
    pub fn add_into(&self, b: &DeviceMatrix<'_>, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_binary_into(&Add, b, target)
    }

    /// `self += b`
    pub fn add(&mut self, b: &DeviceMatrix<'_>) -> Result<()> {
        self.apply_binary(&Add, b)
    }

    /// `target = scale_a * self + scale_b * b`
    pub fn add_scaled(
        &self,
        b: &DeviceMatrix<'_>,
        scale_a: f32,
        scale_b: f32,
        target: &mut DeviceMatrix<'_>,
    ) -> Result<()> {
        self.apply_binary_into(&WeightedAdd { scale_a, scale_b }, b, target)
    }

    /// `target = self - b`
    pub fn subtract(&self, b: &DeviceMatrix<'_>, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_binary_into(&Subtract, b, target)
    }

    pub fn eltwise_mult(&self, b: &DeviceMatrix<'_>, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_binary_into(&Multiply, b, target)
    }

    pub fn eltwise_divide(&self, b: &DeviceMatrix<'_>, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_binary_into(&Divide, b, target)
    }

    pub fn eltwise_max(&self, b: &DeviceMatrix<'_>, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_binary_into(&Maximum, b, target)
    }

    pub fn eltwise_min(&self, b: &DeviceMatrix<'_>, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_binary_into(&Minimum, b, target)
    }

    /// `target = (self == b)` as `0.0` / `1.0`.
    pub fn equals(&self, b: &DeviceMatrix<'_>, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_binary_into(&Equals, b, target)
    }

    // ------------------------------------------------------------------
    // Unary conveniences
    // ------------------------------------------------------------------

    pub fn add_scalar(&self, scalar: f32, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_unary_into(&AddScalar(scalar), target)
    }

    pub fn scale(&self, alpha: f32, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_unary_into(&Scale(alpha), target)
    }

    pub fn pow(&self, p: f32, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_unary_into(&Pow(p), target)
    }

    /// Apply a unary operator in place, e.g. [`operators::Exp`](crate::operators::Exp).
    pub fn apply<Op: UnaryOp>(&mut self, op: Op) -> Result<()> {
        self.apply_unary(&op)
    }

    pub fn bigger_than_scalar(&self, scalar: f32, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_unary_into(&BiggerThanScalar(scalar), target)
    }

    pub fn smaller_than_scalar(&self, scalar: f32, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_unary_into(&SmallerThanScalar(scalar), target)
    }

    /// `1.0` where `lower <= x <= upper`.
    pub fn in_range_inc(
        &self,
        lower: f32,
        upper: f32,
        target: &mut DeviceMatrix<'_>,
    ) -> Result<()> {
        self.apply_unary_into(&InRangeInc { lower, upper }, target)
    }

    pub fn max_with_scalar(&self, scalar: f32, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_unary_into(&MaxWithScalar(scalar), target)
    }

    pub fn min_with_scalar(&self, scalar: f32, target: &mut DeviceMatrix<'_>) -> Result<()> {
        self.apply_unary_into(&MinWithScalar(scalar), target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;
    use crate::operators::Exp;
    use approx::assert_relative_eq;

    const R: Orientation = Orientation::RowMajor;
    const C: Orientation = Orientation::ColMajor;

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
    fn test_binary_layout_table() {
        use BinaryLayout::*;
        // (a, b, target)
        assert_eq!(binary_layout(R, R, R), Direct);
        assert_eq!(binary_layout(C, C, C), Direct);
        assert_eq!(binary_layout(R, C, R), TransposedB);
        assert_eq!(binary_layout(C, R, C), TransposedB);
        assert_eq!(binary_layout(C, C, R), TransposedAB);
        assert_eq!(binary_layout(R, R, C), TransposedAB);
        assert_eq!(binary_layout(C, R, R), SwappedTransposedB);
        assert_eq!(binary_layout(R, C, C), SwappedTransposedB);
    }

    #[test]
    fn test_unary_layout_and_bounds() {
        assert_eq!(unary_layout(R, R), UnaryLayout::Direct);
        assert_eq!(unary_layout(R, C), UnaryLayout::Transposed);
        let g = LaunchGeometry::new(4, 2, 1);
        assert_eq!(bounds_check(8, 4, &g), BoundsCheck::Unchecked);
        assert_eq!(bounds_check(8, 3, &g), BoundsCheck::Checked);
        assert_eq!(bounds_check(0, 0, &g), BoundsCheck::Unchecked);
    }

    #[test]
    fn test_swapped_keeps_operand_order() {
        // a col-major, b and target row-major: swapped path, subtraction is
        // not commutative.
        let a = from_fn(3, 5, C, |i, j| (10 * i + j) as f32);
        let b = from_fn(3, 5, R, |i, j| (i + j) as f32);
        let mut t = Matrix::new(3, 5).unwrap();
        a.subtract(&b, &mut t).unwrap();
        for i in 0..3 {
            for j in 0..5 {
                assert_eq!(t.get(i, j).unwrap(), (10 * i + j) as f32 - (i + j) as f32);
            }
        }
    }

    #[test]
    fn test_target_is_resized_keeping_orientation() {
        let a = from_fn(2, 3, R, |i, j| (i * 3 + j) as f32);
        let mut t = Matrix::with_orientation(1, 1, C).unwrap();
        a.add_into(&a, &mut t).unwrap();
        assert_eq!((t.num_rows(), t.num_cols()), (2, 3));
        assert_eq!(t.orientation(), C);
        assert_eq!(t.get(1, 2).unwrap(), 10.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Matrix::new(2, 3).unwrap();
        let b = Matrix::new(3, 2).unwrap();
        let mut t = Matrix::empty();
        let err = a.add_into(&b, &mut t).unwrap_err();
        assert!(matches!(err, MatrixError::ShapeMismatch(x, y) if x.rows == 2 && y.rows == 3));
    }

    #[test]
    fn test_in_place_with_transposed_operand() {
        let mut a = from_fn(4, 4, R, |i, j| (i * 4 + j) as f32);
        let b = from_fn(4, 4, C, |i, j| (i * 4 + j) as f32);
        a.add(&b).unwrap();
        assert_eq!(a.get(3, 1).unwrap(), 26.0);
    }

    #[test]
    fn test_overlapping_view_target_rejected() {
        let m = from_fn(4, 4, R, |i, j| (i + j) as f32);
        let src = m.slice(0..2, 0..2).unwrap();
        let mut dst = m.slice(1..3, 1..3).unwrap();
        let err = src.copy_into(&mut dst).unwrap_err();
        assert!(matches!(err, MatrixError::Aliasing { .. }));
    }

    #[test]
    fn test_disjoint_view_target_accepted() {
        let m = from_fn(4, 4, R, |i, j| (i * 4 + j) as f32);
        {
            let src = m.slice(0..2, 0..2).unwrap();
            let mut dst = m.slice(2..4, 2..4).unwrap();
            src.scale(2.0, &mut dst).unwrap();
        }
        assert_eq!(m.get(3, 3).unwrap(), 10.0);
    }

    #[test]
    fn test_unary_conveniences() {
        let a = from_fn(3, 3, C, |i, j| i as f32 - j as f32);
        let mut t = Matrix::empty();
        a.in_range_inc(-1.0, 0.0, &mut t).unwrap();
        assert_eq!(t.get(0, 0).unwrap(), 1.0);
        assert_eq!(t.get(1, 0).unwrap(), 0.0);
        a.max_with_scalar(0.5, &mut t).unwrap();
        assert_eq!(t.get(0, 2).unwrap(), 0.5);
        let mut e = a.copy().unwrap();
        e.apply(Exp).unwrap();
        assert_relative_eq!(e.get(2, 0).unwrap(), 2.0f32.exp(), max_relative = 1e-6);
    }

    #[test]
    fn test_closure_operator_and_custom_geometry() {
        let a = from_fn(5, 7, R, |i, j| (i + j) as f32);
        let b = from_fn(5, 7, C, |i, j| (i * j) as f32);
        let mut t = Matrix::with_orientation(5, 7, C).unwrap();
        let geometry = LaunchGeometry::new(2, 3, 1);
        a.apply_binary_into_with(&|x: f32, y: f32| 2.0 * x + y, &b, &mut t, &geometry)
            .unwrap();
        assert_eq!(t.get(4, 6).unwrap(), 2.0 * 10.0 + 24.0);
    }
}
