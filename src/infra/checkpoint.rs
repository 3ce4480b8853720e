// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// File layout:
//   checkpoints/
//     model_epoch_1.mpk.gz   ← weights after epoch 1
//     model_epoch_2.mpk.gz
//     ...
//     model_best.mpk.gz      ← weights of the best-BLEU epoch
//     latest_epoch.json      ← number of the last saved epoch
//     best_epoch.json        ← number of the best epoch
//     train_config.json      ← run config, rebuilds the architecture
//     tokenizer.json         ← copy of the tokenizer used for training
//
// Loading needs the config first: the recorder restores values
// into an already-built model and fails if shapes differ.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::Transformer;

/// Which stored weights to restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightsChoice {
    /// Best validation BLEU, falling back to the latest epoch.
    #[default]
    Best,
    Latest,
}

/// Manages saving and loading of model checkpoints.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create the manager and its directory.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record<B: Backend>(&self, model: &Transformer<B>, name: &str) -> Result<()> {
        let path = self.dir.join(name);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))
    }

    /// Save weights for `epoch` and move the latest-epoch pointer.
    pub fn save_model<B: Backend>(&self, model: &Transformer<B>, epoch: usize) -> Result<()> {
        self.record(model, &format!("model_epoch_{epoch}"))?;
        fs::write(self.dir.join("latest_epoch.json"), serde_json::to_string(&epoch)?)
            .with_context(|| "Failed to write latest_epoch.json")?;
        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Save weights as the best model so far.
    pub fn save_best<B: Backend>(&self, model: &Transformer<B>, epoch: usize) -> Result<()> {
        self.record(model, "model_best")?;
        fs::write(self.dir.join("best_epoch.json"), serde_json::to_string(&epoch)?)
            .with_context(|| "Failed to write best_epoch.json")?;
        tracing::info!("New best model at epoch {}", epoch);
        Ok(())
    }

    /// Restore weights into an already-built model of the same architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:  Transformer<B>,
        choice: WeightsChoice,
        device: &B::Device,
    ) -> Result<Transformer<B>> {
        let name = match choice {
            WeightsChoice::Best if self.dir.join("best_epoch.json").exists() => "model_best".to_string(),
            _ => format!("model_epoch_{}", self.latest_epoch()?),
        };
        let path = self.dir.join(&name);
        tracing::info!("Loading weights from '{}'", path.display());

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?", path.display())
            })?;
        Ok(model.load_record(record))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'translate'.",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config in '{}'", path.display()))
    }

    /// Copy the tokenizer next to the weights so inference uses the same one.
    pub fn store_tokenizer(&self, source: &Path) -> Result<()> {
        let target = self.dir.join("tokenizer.json");
        if source == target {
            return Ok(());
        }
        fs::copy(source, &target).with_context(|| {
            format!("Cannot copy tokenizer '{}' to '{}'", source.display(), target.display())
        })?;
        Ok(())
    }

    fn latest_epoch(&self) -> Result<usize> {
        let s = fs::read_to_string(self.dir.join("latest_epoch.json"))
            .with_context(|| "Cannot find 'latest_epoch.json'. Have you run 'train' first?")?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::TransformerConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn temp_dir(tag: &str) -> String {
        std::env::temp_dir()
            .join(format!("mt_ckpt_{tag}_{}", std::process::id()))
            .to_string_lossy()
            .to_string()
    }

    fn tiny() -> TransformerConfig {
        TransformerConfig::new(12, 12)
            .with_d_model(8)
            .with_num_heads(2)
            .with_num_layers(1)
            .with_d_ff(16)
    }

    #[test]
    fn test_config_round_trip() {
        let dir = temp_dir("config");
        let manager = CheckpointManager::new(&dir).unwrap();
        let cfg = TrainConfig { epochs: 3, d_model: 8, ..TrainConfig::default() };
        manager.save_config(&cfg).unwrap();
        let loaded = manager.load_config().unwrap();
        assert_eq!(loaded.epochs, 3);
        assert_eq!(loaded.d_model, 8);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_weights_survive_reload() {
        let dir     = temp_dir("weights");
        let device  = Default::default();
        let manager = CheckpointManager::new(&dir).unwrap();
        let model   = tiny().init::<TestBackend>(&device).unwrap();
        manager.save_model(&model, 1).unwrap();

        let fresh    = tiny().init::<TestBackend>(&device).unwrap();
        let restored = manager.load_model(fresh, WeightsChoice::Latest, &device).unwrap();
        let a: Vec<f32> = model.tgt_embedding.weight().into_data().convert::<f32>().to_vec().unwrap();
        let b: Vec<f32> = restored.tgt_embedding.weight().into_data().convert::<f32>().to_vec().unwrap();
        // CompactRecorder stores half precision
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-2);
        }
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_checkpoint_is_error() {
        let dir     = temp_dir("missing");
        let manager = CheckpointManager::new(&dir).unwrap();
        let model   = tiny().init::<TestBackend>(&Default::default()).unwrap();
        assert!(manager.load_model(model, WeightsChoice::Best, &Default::default()).is_err());
        fs::remove_dir_all(dir).ok();
    }
}
