//! Process-wide random generator and the randomization operations.
//!
//! The generator is one `StdRng` behind a mutex. It is created by
//! [`init_random`] or [`init_random_from_time`], released by
//! [`destroy_random`], and created lazily from the clock by the first
//! randomization call that finds it missing. The lock serializes
//! randomization calls across host threads; elements are drawn in the
//! target's physical traversal order, so a fixed seed reproduces the same
//! matrix for the same shape and orientation.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::device::default_stream;
use crate::kernel::map_sequential;
use crate::matrix::DeviceMatrix;
use crate::Result;

struct Generator {
    seed: u64,
    rng: StdRng,
}

impl Generator {
    fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

static GENERATOR: Mutex<Option<Generator>> = Mutex::new(None);

/// Lifecycle state of the process-wide generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngState {
    Uninitialized,
    Initialized { seed: u64 },
}

fn lock() -> MutexGuard<'static, Option<Generator>> {
    // A panic while holding the lock leaves a usable generator behind.
    GENERATOR.lock().unwrap_or_else(PoisonError::into_inner)
}

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// (Re)initialize the generator with `seed`.
pub fn init_random(seed: u64) {
    let mut guard = lock();
    if let Some(previous) = guard.as_ref() {
        log::warn!("re-initializing random generator (previous seed {})", previous.seed);
    }
    *guard = Some(Generator::new(seed));
    log::debug!("random generator initialized with seed {}", seed);
}

/// (Re)initialize the generator from the system clock, returning the seed.
pub fn init_random_from_time() -> u64 {
    let seed = time_seed();
    init_random(seed);
    seed
}

/// Release the generator. The next randomization call re-initializes it.
pub fn destroy_random() {
    if lock().take().is_some() {
        log::debug!("random generator destroyed");
    }
}

pub fn random_state() -> RngState {
    match lock().as_ref() {
        Some(g) => RngState::Initialized { seed: g.seed },
        None => RngState::Uninitialized,
    }
}

fn with_generator<R>(f: impl FnOnce(&mut StdRng) -> R) -> R {
    let mut guard = lock();
    let generator = guard.get_or_insert_with(|| {
        let seed = time_seed();
        log::debug!("random generator lazily initialized with seed {}", seed);
        Generator::new(seed)
    });
    f(&mut generator.rng)
}

impl DeviceMatrix<'_> {
    fn randomize(&mut self, kernel: &'static str, mut draw: impl FnMut(&mut StdRng, f32) -> f32) -> Result<()> {
        let (target, extent) = (self.operand(), self.extent());
        with_generator(|rng| {
            default_stream().launch(kernel, extent.lead, extent.follow, || unsafe {
                map_sequential(target, extent, |x| draw(rng, x));
            })
        })
    }

    /// Fill with uniform samples from `[0, 1)`.
    pub fn randomize_uniform(&mut self) -> Result<()> {
        self.randomize("randomize_uniform", |rng, _| rng.gen::<f32>())
    }

    /// Fill with samples from `N(mean, stdev^2)`.
    pub fn randomize_gaussian(&mut self, mean: f32, stdev: f32) -> Result<()> {
        self.randomize("randomize_gaussian", |rng, _| {
            mean + stdev * rng.sample::<f32, _>(StandardNormal)
        })
    }

    /// Add samples from `N(0, stdev^2)` to every element.
    pub fn add_gaussian_noise(&mut self, stdev: f32) -> Result<()> {
        self.randomize("add_gaussian_noise", |rng, x| {
            x + stdev * rng.sample::<f32, _>(StandardNormal)
        })
    }

    /// Replace each probability `p` with `1.0` with probability `p`, else `0.0`.
    pub fn binarize_probs(&mut self) -> Result<()> {
        self.randomize("binarize_probs", |rng, p| (rng.gen::<f32>() < p) as u8 as f32)
    }
}
