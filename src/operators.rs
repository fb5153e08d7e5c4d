//! Operator capabilities consumed by the dispatchers.
//!
//! Kernels are generic over a [`UnaryOp`] or [`BinaryOp`]: a pure function
//! from one or two floats to one float, with no side effects and no reentry
//! into the matrix library. Closures implement both traits, and the named
//! functors below cover the operations the matrix handle exposes directly.

use crate::maybe_sync::MaybeSync;

/// A pure elementwise function of one value.
pub trait UnaryOp: MaybeSync {
    fn apply(&self, x: f32) -> f32;
}

/// A pure elementwise function of two values, `a` from the receiver and `b`
/// from the second operand.
pub trait BinaryOp: MaybeSync {
    fn apply(&self, a: f32, b: f32) -> f32;
}

impl<F> UnaryOp for F
where
    F: Fn(f32) -> f32 + MaybeSync,
{
    #[inline(always)]
    fn apply(&self, x: f32) -> f32 {
        self(x)
    }
}

impl<F> BinaryOp for F
where
    F: Fn(f32, f32) -> f32 + MaybeSync,
{
    #[inline(always)]
    fn apply(&self, a: f32, b: f32) -> f32 {
        self(a, b)
    }
}

/// Feeds operands to a kernel in swapped positions while calling the wrapped
/// operator in its original argument order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Swapped<'a, Op>(pub(crate) &'a Op);

impl<Op: BinaryOp> BinaryOp for Swapped<'_, Op> {
    #[inline(always)]
    fn apply(&self, first: f32, second: f32) -> f32 {
        self.0.apply(second, first)
    }
}

macro_rules! unary_ops {
    ($($(#[$doc:meta])* $name:ident => |$x:ident| $body:expr;)*) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, Default)]
            pub struct $name;

            impl UnaryOp for $name {
                #[inline(always)]
                fn apply(&self, $x: f32) -> f32 {
                    $body
                }
            }
        )*
    };
}

unary_ops! {
    /// `x`
    Identity => |x| x;
    /// `e^x`
    Exp => |x| x.exp();
    /// `ln(x)`
    Log => |x| x.ln();
    /// `1 / (1 + e^-x)`
    Logistic => |x| 1.0 / (1.0 + (-x).exp());
    /// `tanh(x)`
    Tanh => |x| x.tanh();
    /// `|x|`
    Abs => |x| x.abs();
    /// `-1`, `0` or `1`
    Sign => |x| if x > 0.0 { 1.0 } else if x < 0.0 { -1.0 } else { 0.0 };
    /// `sqrt(x)`
    Sqrt => |x| x.sqrt();
    /// `x * x`
    Square => |x| x * x;
    /// `1 / x`
    Reciprocal => |x| 1.0 / x;
    /// `1` if `x` is NaN, else `0`
    IsNan => |x| if x.is_nan() { 1.0 } else { 0.0 };
    /// `1` if `x` is infinite, else `0`
    IsInf => |x| if x.is_infinite() { 1.0 } else { 0.0 };
}

/// `scale * x`
#[derive(Debug, Clone, Copy)]
pub struct Scale(pub f32);

impl UnaryOp for Scale {
    #[inline(always)]
    fn apply(&self, x: f32) -> f32 {
        self.0 * x
    }
}

/// `x + scalar`
#[derive(Debug, Clone, Copy)]
pub struct AddScalar(pub f32);

impl UnaryOp for AddScalar {
    #[inline(always)]
    fn apply(&self, x: f32) -> f32 {
        x + self.0
    }
}

/// `x ^ p`
#[derive(Debug, Clone, Copy)]
pub struct Pow(pub f32);

impl UnaryOp for Pow {
    #[inline(always)]
    fn apply(&self, x: f32) -> f32 {
        x.powf(self.0)
    }
}

/// Ignores the input and produces a constant.
#[derive(Debug, Clone, Copy)]
pub struct Constant(pub f32);

impl UnaryOp for Constant {
    #[inline(always)]
    fn apply(&self, _x: f32) -> f32 {
        self.0
    }
}

/// `1` if `x > scalar`, else `0`
#[derive(Debug, Clone, Copy)]
pub struct BiggerThanScalar(pub f32);

impl UnaryOp for BiggerThanScalar {
    #[inline(always)]
    fn apply(&self, x: f32) -> f32 {
        (x > self.0) as u8 as f32
    }
}

/// `1` if `x < scalar`, else `0`
#[derive(Debug, Clone, Copy)]
pub struct SmallerThanScalar(pub f32);

impl UnaryOp for SmallerThanScalar {
    #[inline(always)]
    fn apply(&self, x: f32) -> f32 {
        (x < self.0) as u8 as f32
    }
}

/// `1` if `lower <= x <= upper`, else `0`
#[derive(Debug, Clone, Copy)]
pub struct InRangeInc {
    pub lower: f32,
    pub upper: f32,
}

impl UnaryOp for InRangeInc {
    #[inline(always)]
    fn apply(&self, x: f32) -> f32 {
        (x >= self.lower && x <= self.upper) as u8 as f32
    }
}

/// `max(x, scalar)`
#[derive(Debug, Clone, Copy)]
pub struct MaxWithScalar(pub f32);

impl UnaryOp for MaxWithScalar {
    #[inline(always)]
    fn apply(&self, x: f32) -> f32 {
        x.max(self.0)
    }
}

/// `min(x, scalar)`
#[derive(Debug, Clone, Copy)]
pub struct MinWithScalar(pub f32);

impl UnaryOp for MinWithScalar {
    #[inline(always)]
    fn apply(&self, x: f32) -> f32 {
        x.min(self.0)
    }
}

macro_rules! binary_ops {
    ($($(#[$doc:meta])* $name:ident => |$a:ident, $b:ident| $body:expr;)*) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, Default)]
            pub struct $name;

            impl BinaryOp for $name {
                #[inline(always)]
                fn apply(&self, $a: f32, $b: f32) -> f32 {
                    $body
                }
            }
        )*
    };
}

binary_ops! {
    /// `a + b`
    Add => |a, b| a + b;
    /// `a - b`
    Subtract => |a, b| a - b;
    /// `a * b`
    Multiply => |a, b| a * b;
    /// `a / b`
    Divide => |a, b| a / b;
    /// `max(a, b)`
    Maximum => |a, b| a.max(b);
    /// `min(a, b)`
    Minimum => |a, b| a.min(b);
    /// `1` if `a == b`, else `0`
    Equals => |a, b| (a == b) as u8 as f32;
}

/// `scale_a * a + scale_b * b`
#[derive(Debug, Clone, Copy)]
pub struct WeightedAdd {
    pub scale_a: f32,
    pub scale_b: f32,
}

impl BinaryOp for WeightedAdd {
    #[inline(always)]
    fn apply(&self, a: f32, b: f32) -> f32 {
        self.scale_a * a + self.scale_b * b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closures_are_operators() {
        let shift = 2.0f32;
        let unary = move |x: f32| x + shift;
        assert_eq!(UnaryOp::apply(&unary, 1.0), 3.0);
        let binary = |a: f32, b: f32| a - 2.0 * b;
        assert_eq!(BinaryOp::apply(&binary, 5.0, 1.0), 3.0);
    }

    #[test]
    fn test_swapped_preserves_argument_order() {
        let sub = Subtract;
        let swapped = Swapped(&sub);
        // The kernel feeds (b, a); the operator still computes a - b.
        assert_eq!(swapped.apply(1.0, 10.0), 9.0);
    }

    #[test]
    fn test_named_unary() {
        assert_eq!(Sign.apply(-3.0), -1.0);
        assert_eq!(Sign.apply(0.0), 0.0);
        assert_eq!(Logistic.apply(0.0), 0.5);
        assert_eq!(InRangeInc { lower: 1.0, upper: 2.0 }.apply(2.0), 1.0);
        assert_eq!(BiggerThanScalar(1.0).apply(1.0), 0.0);
        assert_eq!(IsNan.apply(f32::NAN), 1.0);
        assert_eq!(IsInf.apply(f32::NEG_INFINITY), 1.0);
        assert_eq!(Constant(4.0).apply(f32::NAN), 4.0);
    }

    #[test]
    fn test_named_binary() {
        assert_eq!(WeightedAdd { scale_a: 2.0, scale_b: -1.0 }.apply(3.0, 4.0), 2.0);
        assert_eq!(Equals.apply(1.0, 1.0), 1.0);
        assert_eq!(Divide.apply(1.0, 4.0), 0.25);
        assert_eq!(Maximum.apply(-1.0, 2.0), 2.0);
    }
}
