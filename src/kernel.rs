//! Kernel bodies executed by the simulated device.
//!
//! Every kernel is monomorphized over its layout variant and bounds mode
//! (`const` generics) and over its operator, the way device kernels are
//! specialized per template instantiation. The dispatchers in `dispatch`,
//! `broadcast` and `reduce` decide which instantiation a call launches; the
//! kernels themselves never branch on layout at run time.
//!
//! Addressing is physical: the kernel iterates its target's `(leading,
//! following)` extent, and an operand whose orientation differs from the
//! target is read with the two indices swapped.

use crate::device::LaunchGeometry;
use crate::operators::{BinaryOp, UnaryOp};
use crate::reduce::Aggregator;
use crate::threading::{for_each_tile, map_units, SendPtr, Tile};

/// Base address and stride of one kernel argument.
#[derive(Clone, Copy)]
pub(crate) struct Operand {
    ptr: SendPtr<f32>,
    stride: usize,
}

impl Operand {
    #[inline]
    pub(crate) fn new(ptr: *mut f32, stride: usize) -> Self {
        Self {
            ptr: SendPtr(ptr),
            stride,
        }
    }

    /// Address of physical element `(lead, follow)`.
    ///
    /// # Safety
    /// `(lead, follow)` must lie inside the operand's extent.
    #[inline(always)]
    pub(crate) unsafe fn at(self, lead: usize, follow: usize) -> *mut f32 {
        self.ptr.as_ptr().add(follow * self.stride + lead)
    }
}

/// Physical extent of a launch: `lead` varies fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Extent {
    pub(crate) lead: usize,
    pub(crate) follow: usize,
}

impl Extent {
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.lead * self.follow
    }
}

/// Number of elements a tile covers along one dimension.
///
/// The unchecked variant assumes every tile is full, which the dispatcher
/// only selects when the dimension divides evenly by the tile extent.
#[inline(always)]
fn tile_len<const CHECKED: bool>(origin: usize, tile: usize, dim: usize) -> usize {
    if CHECKED {
        tile.min(dim - origin)
    } else {
        debug_assert!(origin + tile <= dim);
        tile
    }
}

#[inline(always)]
fn tile_ranges<const CHECKED: bool>(
    tile: Tile,
    extent: Extent,
    geometry: &LaunchGeometry,
) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    let lead_len = tile_len::<CHECKED>(tile.lead0, geometry.tile_lead(), extent.lead);
    let follow_len = tile_len::<CHECKED>(tile.follow0, geometry.tile_follow(), extent.follow);
    (
        tile.lead0..tile.lead0 + lead_len,
        tile.follow0..tile.follow0 + follow_len,
    )
}

// ============================================================================
// Elementwise kernels
// ============================================================================

/// `target = op(src)`, reading `src` transposed relative to the target when
/// `TRANS_SRC` is set.
///
/// # Safety
/// `target` and `src` must cover `extent` in their respective layouts, and a
/// target aliasing `src` must address the same elements in the same layout.
pub(crate) unsafe fn eltwise_unary<const TRANS_SRC: bool, const CHECKED: bool, Op: UnaryOp>(
    target: Operand,
    src: Operand,
    extent: Extent,
    geometry: &LaunchGeometry,
    op: &Op,
) {
    for_each_tile(extent.lead, extent.follow, geometry, &|tile: Tile| {
        let (leads, follows) = tile_ranges::<CHECKED>(tile, extent, geometry);
        for f in follows {
            for l in leads.clone() {
                unsafe {
                    let x = if TRANS_SRC { *src.at(f, l) } else { *src.at(l, f) };
                    *target.at(l, f) = op.apply(x);
                }
            }
        }
    });
}

/// `target = op(a, b)`; `TRANS_A` / `TRANS_B` mark operands whose layout is
/// opposite to the target's.
///
/// # Safety
/// As [`eltwise_unary`], for both operands.
pub(crate) unsafe fn eltwise_binary<
    const TRANS_A: bool,
    const TRANS_B: bool,
    const CHECKED: bool,
    Op: BinaryOp,
>(
    target: Operand,
    a: Operand,
    b: Operand,
    extent: Extent,
    geometry: &LaunchGeometry,
    op: &Op,
) {
    for_each_tile(extent.lead, extent.follow, geometry, &|tile: Tile| {
        let (leads, follows) = tile_ranges::<CHECKED>(tile, extent, geometry);
        for f in follows {
            for l in leads.clone() {
                unsafe {
                    let x = if TRANS_A { *a.at(f, l) } else { *a.at(l, f) };
                    let y = if TRANS_B { *b.at(f, l) } else { *b.at(l, f) };
                    *target.at(l, f) = op.apply(x, y);
                }
            }
        }
    });
}

/// `target = op(src, vector[k])` where `k` is the following index when
/// `PER_FOLLOWING` is set and the leading index otherwise. Target and `src`
/// share a layout; the vector is contiguous.
///
/// # Safety
/// As [`eltwise_unary`]; the vector must hold at least the indexed extent and
/// must not alias the target.
pub(crate) unsafe fn broadcast_binary<const PER_FOLLOWING: bool, const CHECKED: bool, Op: BinaryOp>(
    target: Operand,
    src: Operand,
    vector: Operand,
    extent: Extent,
    geometry: &LaunchGeometry,
    op: &Op,
) {
    for_each_tile(extent.lead, extent.follow, geometry, &|tile: Tile| {
        let (leads, follows) = tile_ranges::<CHECKED>(tile, extent, geometry);
        for f in follows {
            for l in leads.clone() {
                unsafe {
                    let v = if PER_FOLLOWING { *vector.at(f, 0) } else { *vector.at(l, 0) };
                    *target.at(l, f) = op.apply(*src.at(l, f), v);
                }
            }
        }
    });
}

/// Sequential traversal in physical order, for generators that must consume
/// their state in a fixed order.
///
/// # Safety
/// `target` must cover `extent`.
pub(crate) unsafe fn map_sequential<F>(target: Operand, extent: Extent, mut f: F)
where
    F: FnMut(f32) -> f32,
{
    for fi in 0..extent.follow {
        for l in 0..extent.lead {
            let p = target.at(l, fi);
            *p = f(*p);
        }
    }
}

// ============================================================================
// Reduction kernels
// ============================================================================

/// One aggregate per line. With `ALONG_LEADING` a line is a fixed following
/// index (contiguous run); otherwise a fixed leading index (strided run).
/// Result `k` is written to `out[k]`.
///
/// # Safety
/// `src` must cover `extent`; `out` must be contiguous with room for one
/// value per line and must not alias `src`.
pub(crate) unsafe fn reduce_lines<const ALONG_LEADING: bool, Agg: Aggregator>(
    out: Operand,
    src: Operand,
    extent: Extent,
    geometry: &LaunchGeometry,
    agg: &Agg,
) {
    let (lines, len) = if ALONG_LEADING {
        (extent.follow, extent.lead)
    } else {
        (extent.lead, extent.follow)
    };
    let line_geometry = LaunchGeometry::new(geometry.tile_lead(), 1, 1);
    for_each_tile(lines, 1, &line_geometry, &|tile: Tile| {
        let count = line_geometry.tile_lead().min(lines - tile.lead0);
        for line in tile.lead0..tile.lead0 + count {
            let mut acc = agg.identity();
            for k in 0..len {
                let x = unsafe {
                    if ALONG_LEADING {
                        *src.at(k, line)
                    } else {
                        *src.at(line, k)
                    }
                };
                acc = agg.combine(acc, agg.map(x));
            }
            unsafe { *out.at(line, 0) = acc };
        }
    });
}

/// Per line, the position along the line of the largest `transform(x)`.
/// Ties keep the lowest position. Positions are written as `f32`.
///
/// # Safety
/// As [`reduce_lines`].
pub(crate) unsafe fn argmax_lines<const ALONG_LEADING: bool, T: UnaryOp>(
    out: Operand,
    src: Operand,
    extent: Extent,
    geometry: &LaunchGeometry,
    transform: &T,
) {
    let (lines, len) = if ALONG_LEADING {
        (extent.follow, extent.lead)
    } else {
        (extent.lead, extent.follow)
    };
    let line_geometry = LaunchGeometry::new(geometry.tile_lead(), 1, 1);
    for_each_tile(lines, 1, &line_geometry, &|tile: Tile| {
        let count = line_geometry.tile_lead().min(lines - tile.lead0);
        for line in tile.lead0..tile.lead0 + count {
            let mut best = (f32::NEG_INFINITY, 0usize);
            for k in 0..len {
                let x = unsafe {
                    if ALONG_LEADING {
                        *src.at(k, line)
                    } else {
                        *src.at(line, k)
                    }
                };
                let key = transform.apply(x);
                if key > best.0 {
                    best = (key, k);
                }
            }
            unsafe { *out.at(line, 0) = best.1 as f32 };
        }
    });
}

/// Split of a linear traversal into execution units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Partition {
    pub(crate) chunk: usize,
    pub(crate) units: usize,
}

impl Partition {
    pub(crate) fn new(total: usize, units: usize) -> Self {
        if total == 0 {
            return Self { chunk: 0, units: 0 };
        }
        let chunk = total.div_ceil(units.max(1));
        Self {
            chunk,
            units: total.div_ceil(chunk),
        }
    }
}

/// Phase one of a whole-matrix reduction: one partial per execution unit,
/// each over a contiguous range of the physical traversal
/// (`index = follow * lead_extent + lead`). Partials are in unit order.
///
/// # Safety
/// `src` must cover `extent`.
pub(crate) unsafe fn reduce_partials<Agg: Aggregator>(
    src: Operand,
    extent: Extent,
    partition: Partition,
    agg: &Agg,
) -> Vec<f32> {
    let total = extent.len();
    map_units(partition.units, &|unit: usize| {
        let start = unit * partition.chunk;
        let end = total.min(start + partition.chunk);
        let mut acc = agg.identity();
        for index in start..end {
            let x = unsafe { *src.at(index % extent.lead, index / extent.lead) };
            acc = agg.combine(acc, agg.map(x));
        }
        acc
    })
}

/// Phase one of a whole-matrix arg-max: per unit, the largest key and the
/// lowest traversal index achieving it.
///
/// # Safety
/// `src` must cover `extent`.
pub(crate) unsafe fn argmax_partials<T: UnaryOp>(
    src: Operand,
    extent: Extent,
    partition: Partition,
    transform: &T,
) -> Vec<(f32, usize)> {
    let total = extent.len();
    map_units(partition.units, &|unit: usize| {
        let start = unit * partition.chunk;
        let end = total.min(start + partition.chunk);
        let mut best = (f32::NEG_INFINITY, start);
        for index in start..end {
            let x = unsafe { *src.at(index % extent.lead, index / extent.lead) };
            let key = transform.apply(x);
            if key > best.0 {
                best = (key, index);
            }
        }
        best
    })
}
