//! Process-global seed source
//!
//! Populations created without an explicit seed draw one from a shared,
//! entropy-initialized generator. The device can be re-seeded to make a
//! whole process reproducible.

use std::sync::{Mutex, OnceLock};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

static DEVICE: OnceLock<Mutex<StdRng>> = OnceLock::new();

fn device() -> &'static Mutex<StdRng> {
    DEVICE.get_or_init(|| Mutex::new(StdRng::from_entropy()))
}

/// Process-wide source of seeds for population construction.
pub struct RandomDevice;

impl RandomDevice {
    /// Draw the next seed.
    pub fn next() -> u64 {
        // The generator state survives a poisoning panic untouched.
        let mut rng = device().lock().unwrap_or_else(|e| e.into_inner());
        rng.next_u64()
    }

    /// Re-seed the device, making subsequent draws deterministic.
    pub fn set_seed(seed: u64) {
        let mut rng = device().lock().unwrap_or_else(|e| e.into_inner());
        *rng = StdRng::seed_from_u64(seed);
    }
}
