// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the subcommands and all their configurable flags.
// Every default equals the value the pipeline used when it had
// no flags at all, so `midi-pretrain train` and a bare
// `midi-pretrain` do the same thing.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{builder::RangedU64ValueParser, Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::{PretrainConfig, DEFAULT_CORPUS_URL};
use crate::infra::checkpoint::ResumeStrategy;
use crate::ml::trainer::LossAverage;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download the corpus and split it into training windows
    Prepare(PrepareArgs),

    /// Pretrain the decoder (default when no command is given)
    Train(TrainArgs),

    /// Sample a new piece from a checkpoint
    Generate(GenerateArgs),

    /// Turn a file of token ids into a MIDI file
    Convert(ConvertArgs),

    /// Print music metrics of a MIDI file or directory as JSON
    Metrics(MetricsArgs),
}

/// Where the corpus comes from and where its splits go
#[derive(Args, Debug, Clone)]
pub struct CorpusArgs {
    /// URL of the zipped MIDI corpus
    #[arg(long, default_value = DEFAULT_CORPUS_URL)]
    pub corpus_url: String,

    /// Temporary download location of the archive
    #[arg(long, default_value = "midis.zip")]
    pub zip_path: String,

    /// Directory the raw corpus is extracted into
    #[arg(long, default_value = "midis")]
    pub midi_dir: String,

    /// Directory holding dataset_train / dataset_validation / dataset_test
    #[arg(long, default_value = "pretrain_data")]
    pub data_dir: String,

    /// Maximum tokens per training window, BOS and EOS included
    #[arg(long, default_value_t = 1024, value_parser = RangedU64ValueParser::<usize>::new().range(3..))]
    pub max_seq_len: usize,
}

#[derive(Args, Debug)]
pub struct PrepareArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    /// Directory for checkpoints, metrics.csv and train_config.json
    #[arg(long, default_value = "pretrain_checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 16, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub batch_size: usize,

    #[arg(long, default_value_t = 20)]
    pub epochs: usize,

    /// AdamW learning rate (fixed, no schedule)
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Save a checkpoint every N epochs (never at epoch 0)
    #[arg(long, default_value_t = 2)]
    pub save_every: usize,

    /// Log the running loss every N steps
    #[arg(long, default_value_t = 500)]
    pub log_interval: usize,

    #[arg(long, default_value_t = 512, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub d_model: usize,

    /// d_model must be divisible by num_heads
    #[arg(long, default_value_t = 8, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub num_heads: usize,

    #[arg(long, default_value_t = 6)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 2048)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Seed for weight initialisation
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Resume from: none, latest, or an epoch number
    #[arg(long, default_value_t = ResumeStrategy::Latest)]
    pub resume: ResumeStrategy,

    /// Running-loss denominator: global-step or epoch-step
    #[arg(long, default_value_t = LossAverage::GlobalStep)]
    pub loss_average: LossAverage,

    /// Shuffle training windows with this seed (default: walk order)
    #[arg(long)]
    pub shuffle_seed: Option<u64>,

    /// Compute a validation loss after every epoch
    #[arg(long)]
    pub validate: bool,

    /// Data loader worker threads
    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,
}

/// Convert CLI TrainArgs into the application-layer PretrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for PretrainConfig {
    fn from(a: TrainArgs) -> Self {
        PretrainConfig {
            corpus_url:     a.corpus.corpus_url,
            zip_path:       a.corpus.zip_path,
            midi_dir:       a.corpus.midi_dir,
            data_dir:       a.corpus.data_dir,
            checkpoint_dir: a.checkpoint_dir,
            max_seq_len:    a.corpus.max_seq_len,
            batch_size:     a.batch_size,
            epochs:         a.epochs,
            lr:             a.lr,
            save_every:     a.save_every,
            log_interval:   a.log_interval,
            d_model:        a.d_model,
            num_heads:      a.num_heads,
            num_layers:     a.num_layers,
            d_ff:           a.d_ff,
            dropout:        a.dropout,
            seed:           a.seed,
            resume:         a.resume,
            loss_average:   a.loss_average,
            shuffle_seed:   a.shuffle_seed,
            validate:       a.validate,
            num_workers:    a.num_workers,
        }
    }
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Directory where training saved its checkpoints
    #[arg(long, default_value = "pretrain_checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Checkpoint to load: latest or an epoch number
    #[arg(long, default_value_t = ResumeStrategy::Latest)]
    pub checkpoint: ResumeStrategy,

    #[arg(long, default_value = "generated.mid")]
    pub output: PathBuf,

    /// Token strings of the generated sequence, one per line
    #[arg(long, default_value = "generated_tokens.txt")]
    pub debug_tokens: PathBuf,

    #[arg(long, default_value_t = 512)]
    pub max_new_tokens: usize,

    /// Sampling temperature, 0 for greedy decoding
    #[arg(long, default_value_t = 1.0)]
    pub temperature: f32,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Text file of token ids separated by whitespace or commas
    pub tokens: PathBuf,

    #[arg(long, default_value = "converted.mid")]
    pub output: PathBuf,

    #[arg(long, default_value = "generated_tokens.txt")]
    pub debug_tokens: PathBuf,
}

#[derive(Args, Debug)]
pub struct MetricsArgs {
    /// A MIDI file, or a directory searched recursively for *.mid
    pub path: PathBuf,
}
