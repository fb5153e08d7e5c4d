//! Device stream and launch geometry.
//!
//! All operations enqueue kernels on one implicit, in-order stream per
//! process. The simulated device runs each launch to completion when it is
//! enqueued, which preserves issue order trivially; [`Stream::synchronize`]
//! marks the points where results cross back to host-visible memory.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::{MatrixError, Result, ELTWISE_TILE_FOLLOW, ELTWISE_TILE_LEAD, REDUCE_UNITS};

/// Tile geometry of a kernel launch.
///
/// Elementwise kernels cover the physical `(leading, following)` extent of
/// their target with `tile_lead x tile_follow` tiles. Whole-matrix reductions
/// split the traversal into `reduce_units` partial results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    tile_lead: usize,
    tile_follow: usize,
    reduce_units: usize,
}

impl Default for LaunchGeometry {
    fn default() -> Self {
        Self {
            tile_lead: ELTWISE_TILE_LEAD,
            tile_follow: ELTWISE_TILE_FOLLOW,
            reduce_units: REDUCE_UNITS,
        }
    }
}

impl LaunchGeometry {
    /// Build a geometry; zero extents are raised to one.
    pub fn new(tile_lead: usize, tile_follow: usize, reduce_units: usize) -> Self {
        Self {
            tile_lead: tile_lead.max(1),
            tile_follow: tile_follow.max(1),
            reduce_units: reduce_units.max(1),
        }
    }

    /// Leading extent of one elementwise tile; never zero.
    #[inline]
    pub fn tile_lead(&self) -> usize {
        self.tile_lead
    }

    /// Following extent of one elementwise tile; never zero.
    #[inline]
    pub fn tile_follow(&self) -> usize {
        self.tile_follow
    }

    /// Number of partial results a whole-matrix reduction produces; never zero.
    #[inline]
    pub fn reduce_units(&self) -> usize {
        self.reduce_units
    }

    /// Number of tiles along each physical dimension.
    #[inline]
    pub fn tile_counts(&self, lead: usize, follow: usize) -> (usize, usize) {
        (lead.div_ceil(self.tile_lead), follow.div_ceil(self.tile_follow))
    }

    /// Whether both dimensions are whole multiples of the tile extents.
    #[inline]
    pub fn divides(&self, lead: usize, follow: usize) -> bool {
        lead % self.tile_lead == 0 && follow % self.tile_follow == 0
    }
}

/// The process-wide in-order execution queue.
#[derive(Debug)]
pub struct Stream {
    name: &'static str,
}

static DEFAULT_STREAM: Stream = Stream { name: "default" };

/// The stream every operation is issued on.
pub fn default_stream() -> &'static Stream {
    &DEFAULT_STREAM
}

impl Stream {
    /// Enqueue a kernel and run it to completion.
    ///
    /// A kernel body that panics is reported as [`MatrixError::Device`]; the
    /// memory it was writing is left in an unspecified state.
    pub(crate) fn launch<F>(&self, kernel: &'static str, lead: usize, follow: usize, body: F) -> Result<()>
    where
        F: FnOnce(),
    {
        log::trace!(
            "[{}] launch {} over {}x{} (leading x following)",
            self.name,
            kernel,
            lead,
            follow
        );
        panic::catch_unwind(AssertUnwindSafe(body)).map_err(|payload| {
            let reason = panic_reason(payload.as_ref());
            log::error!("[{}] kernel {} failed: {}", self.name, kernel, reason);
            MatrixError::Device { kernel, reason }
        })
    }

    /// Block until all previously issued work is visible to the host.
    pub fn synchronize(&self) {
        log::trace!("[{}] synchronize", self.name);
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "kernel aborted".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let g = LaunchGeometry::default();
        assert_eq!(g.tile_lead, ELTWISE_TILE_LEAD);
        assert_eq!(g.tile_follow, ELTWISE_TILE_FOLLOW);
        assert_eq!(g.reduce_units, REDUCE_UNITS);
    }

    #[test]
    fn test_new_clamps_zero() {
        let g = LaunchGeometry::new(0, 0, 0);
        assert_eq!(g, LaunchGeometry::new(1, 1, 1));
        assert_eq!((g.tile_lead(), g.tile_follow(), g.reduce_units()), (1, 1, 1));
        assert!(g.divides(7, 3));
        assert_eq!(g.tile_counts(7, 3), (7, 3));
    }

    #[test]
    fn test_tile_counts_and_divides() {
        let g = LaunchGeometry::new(4, 2, 1);
        assert_eq!(g.tile_counts(8, 4), (2, 2));
        assert_eq!(g.tile_counts(9, 5), (3, 3));
        assert!(g.divides(8, 4));
        assert!(!g.divides(9, 4));
        assert!(!g.divides(8, 3));
    }

    #[test]
    fn test_launch_reports_panics() {
        let err = default_stream()
            .launch("failing_kernel", 1, 1, || panic!("bad operand"))
            .unwrap_err();
        match err {
            MatrixError::Device { kernel, reason } => {
                assert_eq!(kernel, "failing_kernel");
                assert_eq!(reason, "bad operand");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_launch_runs_body() {
        let mut ran = false;
        default_stream().launch("noop", 0, 0, || ran = true).unwrap();
        assert!(ran);
    }
}
