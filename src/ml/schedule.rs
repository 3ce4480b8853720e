// ============================================================
// Layer 5 — Noam Learning-Rate Schedule
// ============================================================
//   rate(s) = factor · d_model^(−0.5) · min(s^(−0.5), s · warmup^(−1.5))
//
// Linear warm-up for `warmup` steps, then inverse-square-root
// decay. The two branches meet exactly at s = warmup.
// Steps are 1-based; step 0 is rejected.
//
// Reference: Vaswani et al. (2017) §5.3

use burn::prelude::*;

use crate::error::{ModelError, Result as ModelResult};

#[derive(Config, Debug)]
pub struct NoamScheduleConfig {
    pub d_model:      usize,
    #[config(default = 4000)]
    pub warmup_steps: usize,
    #[config(default = 1.0)]
    pub factor:       f64,
}

impl NoamScheduleConfig {
    pub fn init(&self) -> ModelResult<NoamSchedule> {
        if self.d_model == 0 || self.warmup_steps == 0 {
            return Err(ModelError::InvalidConfig(format!(
                "noam schedule needs d_model > 0 and warmup_steps > 0 (got {} and {})",
                self.d_model, self.warmup_steps
            )));
        }
        if !(self.factor > 0.0) {
            return Err(ModelError::InvalidConfig(format!(
                "noam factor must be positive, got {}",
                self.factor
            )));
        }
        Ok(NoamSchedule {
            scale:  self.factor * (self.d_model as f64).powf(-0.5),
            warmup: self.warmup_steps as f64,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NoamSchedule {
    scale:  f64,
    warmup: f64,
}

impl NoamSchedule {
    pub fn rate(&self, step: usize) -> ModelResult<f64> {
        if step == 0 {
            return Err(ModelError::ScheduleStepZero);
        }
        let s = step as f64;
        Ok(self.scale * s.powf(-0.5).min(s * self.warmup.powf(-1.5)))
    }

    /// Step with the highest rate.
    pub fn peak_step(&self) -> usize {
        self.warmup as usize
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn schedule(d_model: usize, warmup: usize) -> NoamSchedule {
        NoamScheduleConfig::new(d_model)
            .with_warmup_steps(warmup)
            .init()
            .unwrap()
    }

    #[test]
    fn test_step_zero_rejected() {
        assert_eq!(schedule(512, 4000).rate(0), Err(ModelError::ScheduleStepZero));
    }

    #[test]
    fn test_known_values() {
        let s = schedule(512, 4000);
        let first = s.rate(1).unwrap();
        assert!((first - 512f64.powf(-0.5) * 4000f64.powf(-1.5)).abs() < 1e-15);
        let peak = s.rate(4000).unwrap();
        assert!((peak - 512f64.powf(-0.5) * 4000f64.powf(-0.5)).abs() < 1e-12);
        assert_eq!(s.peak_step(), 4000);
    }

    #[test]
    fn test_continuous_at_warmup() {
        let s = schedule(512, 4000);
        let w = 4000.0f64;
        // both branches evaluated at the boundary agree
        let rising  = 512f64.powf(-0.5) * w * w.powf(-1.5);
        let falling = 512f64.powf(-0.5) * w.powf(-0.5);
        assert!(((rising - falling) / falling).abs() < 1e-12);
        let around = [s.rate(3999).unwrap(), s.rate(4000).unwrap(), s.rate(4001).unwrap()];
        assert!(((around[0] - around[1]) / around[1]).abs() < 1e-3);
        assert!(((around[2] - around[1]) / around[1]).abs() < 1e-3);
    }

    #[test]
    fn test_invalid_config() {
        assert!(NoamScheduleConfig::new(0).init().is_err());
        assert!(NoamScheduleConfig::new(8).with_warmup_steps(0).init().is_err());
        assert!(NoamScheduleConfig::new(8).with_factor(0.0).init().is_err());
    }

    proptest! {
        #[test]
        fn prop_increasing_during_warmup(warmup in 2usize..5000, frac in 0.0f64..1.0) {
            let s = schedule(256, warmup);
            let step = 1 + ((warmup - 2) as f64 * frac) as usize;
            prop_assert!(s.rate(step).unwrap() < s.rate(step + 1).unwrap());
        }

        #[test]
        fn prop_decreasing_after_warmup(warmup in 1usize..5000, offset in 0usize..100_000) {
            let s = schedule(256, warmup);
            let step = warmup + offset;
            prop_assert!(s.rate(step + 1).unwrap() < s.rate(step).unwrap());
        }
    }
}
