// ============================================================
// Layer 6 - Checkpoint Manager
// ============================================================
// Saves and restores training state using Burn's recorders.
//
// What gets saved per checkpoint (epoch N):
//   decoder_epoch_N.json        manifest with exactly four keys:
//                               epoch, model_state_dict,
//                               optimizer_state_dict, loss
//   decoder_epoch_N_model.mpk   all learnable parameters
//   decoder_epoch_N_optim.mpk   AdamW moment estimates
//
// The two state files are written with full precision so a
// save/load cycle restores identical values.
//
// Checkpoints are never deleted. The registry is simply every
// manifest found in the directory, ordered by epoch, and a
// ResumeStrategy picks one of them (or none).
//
// Also stored here:
//   train_config.json           hyperparameters, needed to
//                               rebuild the model for generation
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{bail, Context, Result};
use burn::{
    module::AutodiffModule,
    optim::Optimizer,
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::application::train_use_case::PretrainConfig;

const PREFIX: &str = "decoder_epoch_";

type StateRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// The persisted checkpoint record. State fields hold file names
/// relative to the checkpoint directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub epoch:                usize,
    pub model_state_dict:     String,
    pub optimizer_state_dict: String,
    pub loss:                 f64,
}

impl CheckpointManifest {
    /// First epoch to run after resuming from this checkpoint
    pub fn start_epoch(&self) -> usize {
        self.epoch + 1
    }
}

/// One entry of the checkpoint registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointEntry {
    pub epoch: usize,
    pub path:  PathBuf,
}

/// Which checkpoint (if any) training resumes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeStrategy {
    /// Always start from scratch
    None,
    /// Highest epoch in the registry, or scratch when empty
    Latest,
    /// A specific epoch; missing is an error
    Epoch(usize),
}

impl FromStr for ResumeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none"   => Ok(Self::None),
            "latest" => Ok(Self::Latest),
            other    => other
                .parse::<usize>()
                .map(Self::Epoch)
                .map_err(|_| format!("expected 'none', 'latest' or an epoch number, got '{other}'")),
        }
    }
}

impl fmt::Display for ResumeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None     => write!(f, "none"),
            Self::Latest   => write!(f, "latest"),
            Self::Epoch(n) => write!(f, "{n}"),
        }
    }
}

/// Manages checkpoint files inside one directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new CheckpointManager, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist model + optimizer state for `epoch`. Returns the manifest path.
    pub fn save<B, M, O>(&self, epoch: usize, model: &M, optim: &O, loss: f64) -> Result<PathBuf>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let manifest = CheckpointManifest {
            epoch,
            model_state_dict:     format!("{PREFIX}{epoch}_model.mpk"),
            optimizer_state_dict: format!("{PREFIX}{epoch}_optim.mpk"),
            loss,
        };

        let model_path = self.dir.join(&manifest.model_state_dict);
        model
            .clone()
            .save_file(model_path.clone(), &StateRecorder::new())
            .with_context(|| format!("Failed to save model state to '{}'", model_path.display()))?;

        let optim_path = self.dir.join(&manifest.optimizer_state_dict);
        Recorder::<B>::record(&StateRecorder::new(), optim.to_record(), optim_path.clone())
            .with_context(|| format!("Failed to save optimizer state to '{}'", optim_path.display()))?;

        // Manifest last: a checkpoint only shows up in the registry once its state is on disk
        let path = self.manifest_path(epoch);
        fs::write(&path, serde_json::to_string_pretty(&manifest)?)
            .with_context(|| format!("Failed to write '{}'", path.display()))?;

        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(path)
    }

    /// All checkpoints on disk, ordered by epoch.
    pub fn registry(&self) -> Result<Vec<CheckpointEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir.display()))?
        {
            let path = entry?.path();
            let epoch = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(PREFIX))
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<usize>().ok());
            if let Some(epoch) = epoch {
                entries.push(CheckpointEntry { epoch, path });
            }
        }
        entries.sort_by_key(|e| e.epoch);
        Ok(entries)
    }

    /// Pick the checkpoint to resume from.
    pub fn resolve(&self, strategy: ResumeStrategy) -> Result<Option<CheckpointEntry>> {
        match strategy {
            ResumeStrategy::None   => Ok(None),
            ResumeStrategy::Latest => Ok(self.registry()?.pop()),
            ResumeStrategy::Epoch(epoch) => match self.registry()?.into_iter().find(|e| e.epoch == epoch) {
                Some(entry) => Ok(Some(entry)),
                None => bail!("No checkpoint for epoch {} in '{}'", epoch, self.dir.display()),
            },
        }
    }

    pub fn load_manifest(&self, entry: &CheckpointEntry) -> Result<CheckpointManifest> {
        let json = fs::read_to_string(&entry.path)
            .with_context(|| format!("Cannot read '{}'", entry.path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed checkpoint manifest '{}'", entry.path.display()))
    }

    /// Load parameter values into `model`. Works on any backend, so the
    /// generator can load straight onto the inference backend.
    pub fn load_model<B: Backend, M: Module<B>>(
        &self,
        manifest: &CheckpointManifest,
        model:    M,
        device:   &B::Device,
    ) -> Result<M> {
        let path = self.dir.join(&manifest.model_state_dict);
        model
            .load_file(path.clone(), &StateRecorder::new(), device)
            .with_context(|| format!("Cannot load model state '{}'", path.display()))
    }

    pub fn load_optimizer<B, M, O>(
        &self,
        manifest: &CheckpointManifest,
        optim:    O,
        device:   &B::Device,
    ) -> Result<O>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let path   = self.dir.join(&manifest.optimizer_state_dict);
        let record = Recorder::<B>::load(&StateRecorder::new(), path.clone(), device)
            .with_context(|| format!("Cannot load optimizer state '{}'", path.display()))?;
        Ok(optim.load_record(record))
    }

    /// Save the training configuration to JSON.
    pub fn save_config(&self, cfg: &PretrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<PretrainConfig> {
        let path = self.dir.join("train_config.json");
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Run 'train' before 'generate'.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn manifest_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("{PREFIX}{epoch}.json"))
    }
}

/// Periodic checkpoint rule: every `save_every` epochs, never at epoch 0.
pub fn should_checkpoint(epoch: usize, save_every: usize) -> bool {
    save_every > 0 && epoch % save_every == 0 && epoch != 0
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        optim::{AdamWConfig, GradientsParams},
    };
    use tempfile::tempdir;

    use crate::ml::model::{MidiDecoder, MidiDecoderConfig};

    type TestBackend = Autodiff<NdArray>;

    fn tiny_model(device: &<TestBackend as Backend>::Device) -> MidiDecoder<TestBackend> {
        MidiDecoderConfig::new(16, 8, 8, 2, 1, 16, 0.0).init(device)
    }

    fn step_loss(model: &MidiDecoder<TestBackend>, device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 1> {
        let input  = Tensor::<TestBackend, 1, Int>::from_ints([1, 5, 6, 7].as_slice(), device).reshape([1, 4]);
        let target = Tensor::<TestBackend, 1, Int>::from_ints([5, 6, 7, 2].as_slice(), device).reshape([1, 4]);
        let logits = model.forward(input, None);
        crate::ml::loss::next_token_loss(logits, target, 0)
    }

    fn weights(model: &MidiDecoder<TestBackend>) -> Vec<f32> {
        model.lm_head.weight.val().into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_checkpoint_cadence() {
        assert!(!should_checkpoint(0, 2));
        assert!(!should_checkpoint(1, 2));
        assert!(should_checkpoint(2, 2));
        assert!(!should_checkpoint(3, 2));
        assert!(should_checkpoint(4, 2));
        assert!(!should_checkpoint(4, 0));
    }

    #[test]
    fn test_resume_one_more_epoch_cadence() {
        // Resuming from epoch k runs epoch k + 1 next
        for k in 0..10usize {
            let next = k + 1;
            assert_eq!(should_checkpoint(next, 2), next % 2 == 0 && next != 0);
        }
    }

    #[test]
    fn test_resume_strategy_parse() {
        assert_eq!("none".parse::<ResumeStrategy>().unwrap(), ResumeStrategy::None);
        assert_eq!("latest".parse::<ResumeStrategy>().unwrap(), ResumeStrategy::Latest);
        assert_eq!("4".parse::<ResumeStrategy>().unwrap(), ResumeStrategy::Epoch(4));
        assert!("soon".parse::<ResumeStrategy>().is_err());
        assert_eq!(ResumeStrategy::Epoch(4).to_string(), "4");
    }

    #[test]
    fn test_registry_orders_by_epoch_and_ignores_other_files() {
        let dir = tempdir().unwrap();
        for name in ["decoder_epoch_10.json", "decoder_epoch_2.json", "decoder_epoch_4.json",
                     "decoder_epoch_4_model.mpk", "metrics.csv", "train_config.json"] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        let mgr    = CheckpointManager::new(dir.path()).unwrap();
        let epochs: Vec<usize> = mgr.registry().unwrap().iter().map(|e| e.epoch).collect();
        assert_eq!(epochs, vec![2, 4, 10]);

        assert_eq!(mgr.resolve(ResumeStrategy::Latest).unwrap().unwrap().epoch, 10);
        assert_eq!(mgr.resolve(ResumeStrategy::Epoch(4)).unwrap().unwrap().epoch, 4);
        assert!(mgr.resolve(ResumeStrategy::None).unwrap().is_none());
        assert!(mgr.resolve(ResumeStrategy::Epoch(6)).is_err());
    }

    #[test]
    fn test_latest_on_empty_registry_starts_fresh() {
        let dir = tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path()).unwrap();
        assert!(mgr.resolve(ResumeStrategy::Latest).unwrap().is_none());
    }

    #[test]
    fn test_round_trip_restores_parameters_and_optimizer_state() {
        let device = Default::default();
        let dir    = tempdir().unwrap();
        let mgr    = CheckpointManager::new(dir.path()).unwrap();

        let mut model = tiny_model(&device);
        let mut optim = AdamWConfig::new().init();

        // One step so AdamW has non-trivial moment estimates
        let loss  = step_loss(&model, &device);
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(1e-2, model, grads);

        let manifest_path = mgr.save::<TestBackend, _, _>(4, &model, &optim, 1.25).unwrap();
        let entry         = mgr.resolve(ResumeStrategy::Latest).unwrap().unwrap();
        assert_eq!(entry.path, manifest_path);

        let manifest = mgr.load_manifest(&entry).unwrap();
        assert_eq!(manifest.epoch, 4);
        assert_eq!(manifest.loss, 1.25);
        assert_eq!(manifest.start_epoch(), 5);

        let restored_model = mgr.load_model(&manifest, tiny_model(&device), &device).unwrap();
        let mut restored_optim = mgr
            .load_optimizer::<TestBackend, MidiDecoder<TestBackend>, _>(&manifest, AdamWConfig::new().init(), &device)
            .unwrap();
        assert_eq!(weights(&restored_model), weights(&model));

        // Identical optimizer state => identical next update
        let grads = GradientsParams::from_grads(step_loss(&model, &device).backward(), &model);
        let next  = optim.step(1e-2, model, grads);
        let grads = GradientsParams::from_grads(step_loss(&restored_model, &device).backward(), &restored_model);
        let restored_next = restored_optim.step(1e-2, restored_model, grads);
        assert_eq!(weights(&restored_next), weights(&next));
    }

    #[test]
    fn test_manifest_has_exactly_four_keys() {
        let manifest = CheckpointManifest {
            epoch:                2,
            model_state_dict:     "m".into(),
            optimizer_state_dict: "o".into(),
            loss:                 0.5,
        };
        let value = serde_json::to_value(&manifest).unwrap();
        let mut keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["epoch", "loss", "model_state_dict", "optimizer_state_dict"]);
    }
}
