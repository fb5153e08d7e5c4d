//! Tile-grid execution for kernel launches.
//!
//! A launch covers its physical `(leading, following)` extent with tiles from
//! the [`LaunchGeometry`]. Sequentially, tiles are visited following-major.
//! With the `parallel` feature the range of following tiles is split in half
//! recursively with `rayon::join` until a half is below [`MINTHREADLENGTH`]
//! elements. Tiles never overlap, so workers write disjoint regions.

use crate::device::LaunchGeometry;
use crate::maybe_sync::MaybeSync;

/// A raw pointer wrapper that is `Send` + `Sync`.
///
/// # Safety
/// The caller must guarantee that the pointed-to data is valid for the
/// duration of the launch and that concurrent tiles write disjoint elements.
pub(crate) struct SendPtr<T>(pub(crate) *mut T);

impl<T> Clone for SendPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SendPtr<T> {}

unsafe impl<T> Send for SendPtr<T> {}
unsafe impl<T> Sync for SendPtr<T> {}

impl<T> SendPtr<T> {
    #[inline]
    pub(crate) fn as_ptr(self) -> *mut T {
        self.0
    }
}

/// Minimum number of elements to justify multi-threaded execution.
#[cfg_attr(not(feature = "parallel"), allow(dead_code))]
pub(crate) const MINTHREADLENGTH: usize = 1 << 15;

/// Origin of one tile in physical coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tile {
    pub(crate) lead0: usize,
    pub(crate) follow0: usize,
}

/// Visit every tile covering a `lead x follow` extent.
pub(crate) fn for_each_tile<F>(lead: usize, follow: usize, geometry: &LaunchGeometry, f: &F)
where
    F: Fn(Tile) + MaybeSync,
{
    let (lead_tiles, follow_tiles) = geometry.tile_counts(lead, follow);
    if lead_tiles == 0 || follow_tiles == 0 {
        return;
    }

    #[cfg(feature = "parallel")]
    {
        if rayon::current_num_threads() > 1 && lead * follow > MINTHREADLENGTH {
            split_follow_tiles(0, follow_tiles, lead_tiles, lead, geometry, f);
            return;
        }
    }

    run_tiles(0, follow_tiles, lead_tiles, geometry, f);
}

fn run_tiles<F>(first: usize, last: usize, lead_tiles: usize, geometry: &LaunchGeometry, f: &F)
where
    F: Fn(Tile),
{
    for tf in first..last {
        for tl in 0..lead_tiles {
            f(Tile {
                lead0: tl * geometry.tile_lead(),
                follow0: tf * geometry.tile_follow(),
            });
        }
    }
}

#[cfg(feature = "parallel")]
fn split_follow_tiles<F>(
    first: usize,
    last: usize,
    lead_tiles: usize,
    lead: usize,
    geometry: &LaunchGeometry,
    f: &F,
) where
    F: Fn(Tile) + Sync,
{
    let count = last - first;
    if count <= 1 || count * geometry.tile_follow() * lead <= MINTHREADLENGTH {
        run_tiles(first, last, lead_tiles, geometry, f);
        return;
    }
    let mid = first + count / 2;
    rayon::join(
        || split_follow_tiles(first, mid, lead_tiles, lead, geometry, f),
        || split_follow_tiles(mid, last, lead_tiles, lead, geometry, f),
    );
}

/// Evaluate `f` for each execution unit, returning results in unit order.
pub(crate) fn map_units<R, F>(units: usize, f: &F) -> Vec<R>
where
    R: Send,
    F: Fn(usize) -> R + MaybeSync,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        (0..units).into_par_iter().map(f).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..units).map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn collect_tiles(lead: usize, follow: usize, geometry: &LaunchGeometry) -> Vec<Tile> {
        let seen = Mutex::new(Vec::new());
        for_each_tile(lead, follow, geometry, &|tile: Tile| seen.lock().unwrap().push(tile));
        let mut tiles = seen.into_inner().unwrap();
        tiles.sort_by_key(|t| (t.follow0, t.lead0));
        tiles
    }

    #[test]
    fn test_tiles_cover_extent() {
        let g = LaunchGeometry::new(4, 2, 1);
        let tiles = collect_tiles(9, 3, &g);
        // ceil(9/4) = 3 lead tiles, ceil(3/2) = 2 follow tiles
        assert_eq!(tiles.len(), 6);
        assert_eq!(tiles[0], Tile { lead0: 0, follow0: 0 });
        assert_eq!(tiles[2], Tile { lead0: 8, follow0: 0 });
        assert_eq!(tiles[5], Tile { lead0: 8, follow0: 2 });
    }

    #[test]
    fn test_empty_extent_has_no_tiles() {
        let g = LaunchGeometry::default();
        assert!(collect_tiles(0, 10, &g).is_empty());
        assert!(collect_tiles(10, 0, &g).is_empty());
    }

    #[test]
    fn test_large_extent_visits_each_tile_once() {
        let g = LaunchGeometry::new(32, 8, 1);
        let tiles = collect_tiles(512, 256, &g);
        assert_eq!(tiles.len(), 16 * 32);
        let mut dedup = tiles.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), tiles.len());
    }

    #[test]
    fn test_map_units_preserves_order() {
        let out = map_units(100, &|u: usize| u * 2);
        assert_eq!(out, (0..100).map(|u| u * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_send_ptr_copy() {
        let mut x = 1.0f32;
        let p = SendPtr(&mut x as *mut f32);
        let q = p;
        unsafe { *q.as_ptr() = 2.0 };
        assert_eq!(x, 2.0);
    }
}
