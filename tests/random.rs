use std::sync::{Mutex, MutexGuard, PoisonError};

use approx::assert_abs_diff_eq;
use devmat::{
    destroy_random, init_random, init_random_from_time, random_state, Matrix, Orientation, RngState,
};

// Each test binary has its own generator; these tests still share it.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

#[test]
fn test_time_seed_is_reported() {
    let _guard = serial();
    let seed = init_random_from_time();
    assert_eq!(random_state(), RngState::Initialized { seed });
    destroy_random();
    assert_eq!(random_state(), RngState::Uninitialized);
}

#[test]
fn test_gaussian_moments() {
    let _guard = serial();
    init_random(1234);
    let mut m = Matrix::with_orientation(128, 96, Orientation::ColMajor).unwrap();
    m.randomize_gaussian(2.0, 0.5).unwrap();
    let n = m.num_elements() as f32;
    let mean = m.mean().unwrap();
    let var = m.sum_of_squares().unwrap() / n - mean * mean;
    assert_abs_diff_eq!(mean, 2.0, epsilon = 0.02);
    assert_abs_diff_eq!(var.sqrt(), 0.5, epsilon = 0.02);
}

#[test]
fn test_binarize_half_probability() {
    let _guard = serial();
    init_random(99);
    let mut m = Matrix::filled(100, 100, 0.5).unwrap();
    m.binarize_probs().unwrap();
    let ones = m.sum().unwrap();
    assert!((4500.0..=5500.0).contains(&ones), "{ones} ones out of 10000");
    assert_eq!(m.max().unwrap(), 1.0);
    assert_eq!(m.min().unwrap(), 0.0);
}

#[test]
fn test_reinit_restarts_sequence() {
    let _guard = serial();
    init_random(5);
    let mut first = Matrix::new(7, 3).unwrap();
    first.randomize_uniform().unwrap();
    let mut second = Matrix::new(7, 3).unwrap();
    second.randomize_uniform().unwrap();
    init_random(5);
    let mut again = Matrix::new(7, 3).unwrap();
    again.randomize_uniform().unwrap();
    assert_eq!(first.to_host().unwrap(), again.to_host().unwrap());
    assert_ne!(first.to_host().unwrap(), second.to_host().unwrap());
}

#[test]
fn test_noise_on_view_stays_inside() {
    let _guard = serial();
    init_random(11);
    let m = Matrix::new(6, 6).unwrap();
    {
        let mut inner = m.slice(1..5, 1..5).unwrap();
        inner.add_gaussian_noise(1.0).unwrap();
    }
    for i in 0..6 {
        for j in 0..6 {
            let border = i == 0 || j == 0 || i == 5 || j == 5;
            if border {
                assert_eq!(m.get(i, j).unwrap(), 0.0);
            }
        }
    }
    assert!(m.sum_of_squares().unwrap() > 0.0);
}
