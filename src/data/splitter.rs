// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles the pairs and splits them into a training and a
// validation set. Used when no separate validation file is
// given. Corpora are often sorted (by source document, by
// length), so the shuffle matters.
//
// The shuffle is seeded: the same seed and input always give
// the same split, so a resumed or repeated run validates on
// the same sentences.
//
// Reference: rand crate documentation (SliceRandom, SeedableRng)

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` with `seed` and split into (train, validation).
/// `train_fraction` of 0.9 keeps 90% for training.
pub fn split_train_val<T>(mut samples: Vec<T>, train_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let split_at = ((total as f64) * train_fraction.clamp(0.0, 1.0)).round() as usize;
    let val      = samples.split_off(split_at.min(total));

    tracing::debug!(
        "Dataset split: {} training, {} validation",
        samples.len(),
        val.len(),
    );
    (samples, val)
}
