// ============================================================
// Layer 5 - Training Loop
// ============================================================
// Autoregressive pretraining with Burn's DataLoader and AdamW.
//
//   INIT      model, AdamW, data loaders
//   RESUME?   pick a checkpoint through the registry
//   EPOCHS    start_epoch..epochs
//     BATCHES shift → forward (causal + padding masks) → masked
//             cross-entropy → backward → AdamW step
//     LOG     every `log_interval` global steps
//     CKPT    when should_checkpoint(epoch, save_every)
//
// Key Burn insight:
//   - Training uses Autodiff<Wgpu> for gradients
//   - model.valid() returns the model on the inner backend,
//     so the validation batcher is built on B::InnerBackend
//
// Loss averaging (step lines only; the epoch line is always
// the epoch loss / batches in the loader):
//   GlobalStep  running epoch loss / global step count. This
//               understates the loss after the first epoch but
//               matches the numbers of earlier runs.
//   EpochStep   running epoch loss / steps in this epoch
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use anyhow::{bail, Result};
use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

use crate::application::train_use_case::PretrainConfig;
use crate::data::{batcher::MidiBatcher, dataset::MidiDataset};
use crate::infra::{
    checkpoint::{should_checkpoint, CheckpointManager},
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::model::{MidiDecoder, MidiDecoderConfig};

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Denominator of the running loss shown in `step N` logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LossAverage {
    #[default]
    GlobalStep,
    EpochStep,
}

impl LossAverage {
    pub fn average(self, total_loss: f64, global_step: usize, epoch_steps: usize) -> f64 {
        let denom = match self {
            Self::GlobalStep => global_step,
            Self::EpochStep  => epoch_steps,
        };
        if denom == 0 { 0.0 } else { total_loss / denom as f64 }
    }
}

impl FromStr for LossAverage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global-step" => Ok(Self::GlobalStep),
            "epoch-step"  => Ok(Self::EpochStep),
            other => Err(format!("expected 'global-step' or 'epoch-step', got '{other}'")),
        }
    }
}

impl fmt::Display for LossAverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GlobalStep => write!(f, "global-step"),
            Self::EpochStep  => write!(f, "epoch-step"),
        }
    }
}

/// What a call to `train_loop` did.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    /// First epoch run, > 0 when resumed
    pub start_epoch: usize,
    /// Batches processed in this run
    pub steps:       usize,
    /// Manifest paths of checkpoints written in this run
    pub checkpoints: Vec<PathBuf>,
    /// Epoch-average training loss of the last epoch run
    pub final_loss:  Option<f64>,
}

/// Train on the default WGPU device.
pub fn run_training(
    cfg:           &PretrainConfig,
    vocab_size:    usize,
    pad_id:        u32,
    train_dataset: MidiDataset,
    val_dataset:   Option<MidiDataset>,
    ckpt_manager:  &CheckpointManager,
) -> Result<TrainingSummary> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?} (single device, no data parallelism)", device);
    train_loop::<MyBackend>(cfg, vocab_size, pad_id, train_dataset, val_dataset, ckpt_manager, device)
}

pub fn train_loop<B: AutodiffBackend>(
    cfg:           &PretrainConfig,
    vocab_size:    usize,
    pad_id:        u32,
    train_dataset: MidiDataset,
    val_dataset:   Option<MidiDataset>,
    ckpt_manager:  &CheckpointManager,
    device:        B::Device,
) -> Result<TrainingSummary> {
    cfg.validate()?;
    if train_dataset.is_empty() {
        bail!("Training set is empty, nothing to train on");
    }
    B::seed(cfg.seed);

    // ── Build model ───────────────────────────────────────────────────────────
    let model_cfg = MidiDecoderConfig::new(
        vocab_size, cfg.max_seq_len, cfg.d_model,
        cfg.num_heads, cfg.num_layers, cfg.d_ff, cfg.dropout,
    );
    let mut model: MidiDecoder<B> = model_cfg.init(&device);
    let mut optim = AdamWConfig::new().init::<B, MidiDecoder<B>>();
    tracing::info!(
        "Model ready: {} layers, d_model={}, vocab={}, {} parameters",
        cfg.num_layers, cfg.d_model, vocab_size, model.num_params()
    );

    // ── Resume ────────────────────────────────────────────────────────────────
    let mut start_epoch = 0;
    if let Some(entry) = ckpt_manager.resolve(cfg.resume)? {
        let manifest = ckpt_manager.load_manifest(&entry)?;
        model = ckpt_manager.load_model(&manifest, model, &device)?;
        optim = ckpt_manager.load_optimizer::<B, MidiDecoder<B>, _>(&manifest, optim, &device)?;
        start_epoch = manifest.start_epoch();
        tracing::info!("Resumed training from checkpoint: epoch {}", manifest.epoch);
    }

    // ── Data loaders ──────────────────────────────────────────────────────────
    let num_batches = train_dataset.len().div_ceil(cfg.batch_size);
    let mut builder = DataLoaderBuilder::new(MidiBatcher::<B>::new(device.clone(), pad_id))
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers);
    if let Some(seed) = cfg.shuffle_seed {
        builder = builder.shuffle(seed);
    }
    let train_loader = builder.build(train_dataset);

    let val_loader = val_dataset.filter(|d| !d.is_empty()).map(|d| {
        DataLoaderBuilder::new(MidiBatcher::<B::InnerBackend>::new(device.clone(), pad_id))
            .batch_size(cfg.batch_size)
            .num_workers(cfg.num_workers)
            .build(d)
    });

    let metrics = MetricsLogger::new(ckpt_manager.dir())?;
    let mut summary = TrainingSummary {
        start_epoch,
        steps:       0,
        checkpoints: Vec::new(),
        final_loss:  None,
    };

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let mut step          = 0usize;
    let mut best_val_loss = f64::INFINITY;
    for epoch in start_epoch..cfg.epochs {
        let pb = ProgressBar::new(num_batches as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {msg}")?,
        );

        let mut total_loss  = 0.0f64;
        let mut last_loss   = 0.0f64;
        let mut epoch_steps = 0usize;

        for batch in train_loader.iter() {
            let loss = model.forward_loss(batch.shift(), pad_id);
            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(cfg.lr, model, grads);

            total_loss  += loss_val;
            last_loss    = loss_val;
            epoch_steps += 1;
            step        += 1;
            pb.inc(1);

            if cfg.log_interval > 0 && step % cfg.log_interval == 0 {
                let avg = cfg.loss_average.average(total_loss, step, epoch_steps);
                pb.suspend(|| tracing::info!("step {} - Loss: {:.4}", step, avg));
                pb.set_message(format!("loss {avg:.4}"));
            }
        }
        pb.finish_and_clear();

        let epoch_loss = if epoch_steps > 0 { total_loss / epoch_steps as f64 } else { f64::NAN };
        tracing::info!("Epoch {} — Loss: {:.4}", epoch + 1, epoch_loss);

        // ── Validation phase ──────────────────────────────────────────────────
        let val_loss = match &val_loader {
            Some(loader) => {
                // dropout disabled for deterministic evaluation
                let model_valid = model.valid();
                let mut sum     = 0.0f64;
                let mut batches = 0usize;
                for batch in loader.iter() {
                    sum += model_valid
                        .forward_loss(batch.shift(), pad_id)
                        .into_scalar()
                        .elem::<f64>();
                    batches += 1;
                }
                (batches > 0).then(|| sum / batches as f64)
            }
            None => None,
        };
        if let Some(v) = val_loss {
            tracing::info!("Epoch {} validation loss: {:.4}", epoch + 1, v);
        }

        let row = EpochMetrics::new(epoch + 1, step, epoch_loss, val_loss);
        if row.is_improvement(best_val_loss) {
            best_val_loss = val_loss.unwrap_or(best_val_loss);
            tracing::info!("New best validation loss: {:.4}", best_val_loss);
        }
        metrics.log(&row)?;
        summary.final_loss = Some(epoch_loss);

        if should_checkpoint(epoch, cfg.save_every) {
            // The manifest records the loss of the last batch
            let path = ckpt_manager.save::<B, _, _>(epoch, &model, &optim, finite_or_zero(last_loss, epoch))?;
            tracing::info!("Checkpoint saved: {}", path.display());
            summary.checkpoints.push(path);
        }
    }

    summary.steps = step;
    tracing::info!("Training complete: {} steps", step);
    Ok(summary)
}

/// The manifest stores a plain number, so a diverged loss becomes 0.0 there.
fn finite_or_zero(loss: f64, epoch: usize) -> f64 {
    if loss.is_finite() {
        return loss;
    }
    tracing::warn!("Epoch {} ended on a non-finite loss ({}), checkpoint records 0.0", epoch + 1, loss);
    0.0
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::TokenSequence;
    use burn::backend::{Autodiff, NdArray};
    use std::{
        io,
        sync::{Arc, Mutex},
    };
    use tempfile::tempdir;

    type TestBackend = Autodiff<NdArray>;

    fn tiny_config(checkpoint_dir: &std::path::Path, epochs: usize) -> PretrainConfig {
        PretrainConfig {
            checkpoint_dir: checkpoint_dir.to_string_lossy().into_owned(),
            epochs,
            batch_size:   2,
            lr:           1e-3,
            log_interval: 1,
            max_seq_len:  8,
            d_model:      8,
            num_heads:    2,
            num_layers:   1,
            d_ff:         16,
            dropout:      0.0,
            num_workers:  1,
            ..PretrainConfig::default()
        }
    }

    fn toy_dataset() -> MidiDataset {
        MidiDataset::from_sequences(vec![
            TokenSequence { input_ids: vec![1, 4, 5, 6, 2] },
            TokenSequence { input_ids: vec![1, 6, 5, 2] },
            TokenSequence { input_ids: vec![1, 4, 2] },
        ])
    }

    fn run(cfg: &PretrainConfig, mgr: &CheckpointManager, val: Option<MidiDataset>) -> TrainingSummary {
        train_loop::<TestBackend>(cfg, 12, 0, toy_dataset(), val, mgr, Default::default()).unwrap()
    }

    /// In-memory sink for formatted log lines
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with INFO logs formatted into a string.
    fn with_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let capture = LogCapture::default();
        let writer  = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        let out  = tracing::subscriber::with_default(subscriber, f);
        let text = String::from_utf8_lossy(&capture.0.lock().unwrap()).into_owned();
        (out, text)
    }

    /// Number printed after `prefix` on the first matching line.
    fn logged(log: &str, prefix: &str) -> f64 {
        log.lines()
            .find_map(|l| l.split_once(prefix).map(|(_, v)| v.trim().parse::<f64>().unwrap()))
            .unwrap_or_else(|| panic!("no '{prefix}' line in:\n{log}"))
    }

    fn csv_train_loss(dir: &std::path::Path, epoch: usize) -> f64 {
        let csv = std::fs::read_to_string(dir.join("metrics.csv")).unwrap();
        csv.lines().nth(epoch).unwrap().split(',').nth(2).unwrap().parse().unwrap()
    }

    #[test]
    fn test_epoch_line_shows_the_epoch_mean() {
        let dir = tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path()).unwrap();
        let (_, log) = with_logs(|| run(&tiny_config(dir.path(), 2), &mgr, None));

        for epoch in [1, 2] {
            let shown = logged(&log, &format!("Epoch {epoch} — Loss: "));
            assert!((shown - csv_train_loss(dir.path(), epoch)).abs() < 1e-3, "epoch {epoch}: {shown}");
        }
        // Global-step running average: step 4 divides the epoch-2 loss by 4, not 2
        let step4 = logged(&log, "step 4 - Loss: ");
        assert!((2.0 * step4 - logged(&log, "Epoch 2 — Loss: ")).abs() < 1e-3, "{log}");
        assert!((logged(&log, "step 2 - Loss: ") - logged(&log, "Epoch 1 — Loss: ")).abs() < 1e-3);
    }

    #[test]
    fn test_epoch_step_average_matches_epoch_line() {
        let dir = tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path()).unwrap();
        let cfg = PretrainConfig { loss_average: LossAverage::EpochStep, ..tiny_config(dir.path(), 2) };
        let (_, log) = with_logs(|| run(&cfg, &mgr, None));

        assert!((logged(&log, "step 4 - Loss: ") - logged(&log, "Epoch 2 — Loss: ")).abs() < 1e-3, "{log}");
    }

    #[test]
    fn test_non_finite_checkpoint_loss_is_logged() {
        let (stored, log) = with_logs(|| finite_or_zero(f64::NAN, 3));
        assert_eq!(stored, 0.0);
        assert!(log.contains("WARN") && log.contains("Epoch 4"), "{log}");

        let (stored, log) = with_logs(|| finite_or_zero(1.5, 3));
        assert_eq!(stored, 1.5);
        assert!(log.is_empty());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path()).unwrap();
        let cfg = PretrainConfig { batch_size: 0, ..tiny_config(dir.path(), 1) };
        let err = train_loop::<TestBackend>(&cfg, 12, 0, toy_dataset(), None, &mgr, Default::default())
            .unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_loss_average_modes() {
        assert_eq!(LossAverage::GlobalStep.average(6.0, 12, 3), 0.5);
        assert_eq!(LossAverage::EpochStep.average(6.0, 12, 3), 2.0);
        assert_eq!(LossAverage::EpochStep.average(6.0, 12, 0), 0.0);
        assert_eq!("epoch-step".parse::<LossAverage>().unwrap(), LossAverage::EpochStep);
        assert!("mean".parse::<LossAverage>().is_err());
    }

    #[test]
    fn test_checkpoints_follow_cadence() {
        let dir = tempdir().unwrap();
        let cfg = tiny_config(dir.path(), 5);
        let mgr = CheckpointManager::new(dir.path()).unwrap();

        let summary = run(&cfg, &mgr, None);
        assert_eq!(summary.start_epoch, 0);
        // 3 samples, batch 2 -> 2 steps per epoch
        assert_eq!(summary.steps, 10);
        let epochs: Vec<usize> = mgr.registry().unwrap().iter().map(|e| e.epoch).collect();
        assert_eq!(epochs, vec![2, 4]);
        assert!(summary.final_loss.is_some_and(f64::is_finite));
    }

    #[test]
    fn test_resume_runs_only_the_remaining_epochs() {
        let dir = tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path()).unwrap();
        run(&tiny_config(dir.path(), 3), &mgr, None);
        assert_eq!(mgr.resolve(crate::infra::checkpoint::ResumeStrategy::Latest).unwrap().unwrap().epoch, 2);

        // Resume from epoch 2 and run epoch 3 only: 3 % 2 != 0, no new checkpoint
        let summary = run(&tiny_config(dir.path(), 4), &mgr, None);
        assert_eq!(summary.start_epoch, 3);
        assert_eq!(summary.steps, 2);
        assert!(summary.checkpoints.is_empty());

        // Epoch 4 does produce one
        let summary = run(&tiny_config(dir.path(), 5), &mgr, None);
        assert_eq!(summary.start_epoch, 3);
        assert_eq!(summary.checkpoints.len(), 1);
    }

    #[test]
    fn test_validation_loss_is_recorded() {
        let dir = tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path()).unwrap();
        run(&tiny_config(dir.path(), 1), &mgr, Some(toy_dataset()));

        let csv  = std::fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        let row  = csv.lines().nth(1).unwrap();
        let cols: Vec<&str> = row.split(',').collect();
        assert_eq!(cols[0], "1");
        assert!(!cols[3].is_empty());
    }

    #[test]
    fn test_empty_training_set_is_an_error() {
        let dir = tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path()).unwrap();
        let err = train_loop::<TestBackend>(
            &tiny_config(dir.path(), 1), 12, 0,
            MidiDataset::from_sequences(vec![]), None, &mgr, Default::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
