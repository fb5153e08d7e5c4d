//! Feature-gated `Sync` marker for operator bounds.
//!
//! With the `parallel` feature a kernel shares its operator across rayon
//! workers, so [`MaybeSync`] is `Sync`. Without it every type qualifies and
//! operators may capture non-thread-safe state.

#[cfg(feature = "parallel")]
pub trait MaybeSync: Sync {}
#[cfg(feature = "parallel")]
impl<T: Sync + ?Sized> MaybeSync for T {}

#[cfg(not(feature = "parallel"))]
pub trait MaybeSync {}
#[cfg(not(feature = "parallel"))]
impl<T: ?Sized> MaybeSync for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_closure_is_maybe_sync() {
        fn check<T: MaybeSync>(_: &T) {}
        let offset = 1.5f32;
        check(&move |x: f32| x + offset);
    }

    #[cfg(not(feature = "parallel"))]
    #[test]
    fn test_cell_is_maybe_sync_without_parallel() {
        fn check<T: MaybeSync>() {}
        check::<std::cell::Cell<f32>>();
    }
}
