// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All work is delegated to Layer 2 (application).
//
// Commands:
//   prepare   download + split the corpus
//   train     pretrain (also what runs with no command at all)
//   generate  sample a piece from a checkpoint
//   convert   token ids → MIDI
//   metrics   music metrics as JSON
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use commands::{Commands, ConvertArgs, GenerateArgs, MetricsArgs, PrepareArgs, TrainArgs};
use crate::application::train_use_case::PretrainConfig;
use crate::infra::logging;

#[derive(Parser, Debug)]
#[command(
    name = "midi-pretrain",
    version,
    about = "Pretrain a decoder-only transformer on REMI-tokenized MIDI files."
)]
pub struct Cli {
    /// Log file, appended to on every run
    #[arg(long, global = true, default_value = "pretrain_log.log")]
    pub log_file: PathBuf,

    /// Subcommand to run; `train` with default settings when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Install logging once, then dispatch to the use case.
    pub fn run(self) -> Result<()> {
        logging::init(&self.log_file)?;

        match self.command {
            None                          => run_train(PretrainConfig::default()),
            Some(Commands::Prepare(args)) => run_prepare(args),
            Some(Commands::Train(args))   => run_train(args.into()),
            Some(Commands::Generate(args)) => run_generate(args),
            Some(Commands::Convert(args)) => run_convert(args),
            Some(Commands::Metrics(args)) => run_metrics(args),
        }
    }
}

fn run_prepare(args: PrepareArgs) -> Result<()> {
    use crate::application::prepare_use_case::PrepareUseCase;
    use crate::infra::tokenizer::RemiTokenizer;

    let cfg = PretrainConfig {
        corpus_url:  args.corpus.corpus_url,
        zip_path:    args.corpus.zip_path,
        midi_dir:    args.corpus.midi_dir,
        data_dir:    args.corpus.data_dir,
        max_seq_len: args.corpus.max_seq_len,
        ..PretrainConfig::default()
    };
    PrepareUseCase::from_config(&cfg).execute(&RemiTokenizer::new())
}

fn run_train(cfg: PretrainConfig) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting pretraining on '{}'", cfg.data_dir);
    let summary = TrainUseCase::new(cfg).execute()?;
    tracing::info!(
        "Ran {} steps from epoch {}, {} checkpoints written",
        summary.steps,
        summary.start_epoch,
        summary.checkpoints.len()
    );
    Ok(())
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    use crate::application::generate_use_case::GenerateUseCase;

    let use_case = GenerateUseCase {
        checkpoint_dir: args.checkpoint_dir,
        checkpoint:     args.checkpoint,
        output:         args.output,
        debug_tokens:   args.debug_tokens,
        max_new_tokens: args.max_new_tokens,
        temperature:    args.temperature,
        seed:           args.seed,
    };
    let ids = use_case.execute()?;
    println!("Generated {} tokens -> {}", ids.len(), use_case.output.display());
    Ok(())
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    use crate::application::convert_use_case::{convert_to_midi, parse_token_ids};
    use crate::infra::tokenizer::RemiTokenizer;
    use anyhow::Context;

    let text = std::fs::read_to_string(&args.tokens)
        .with_context(|| format!("Cannot read '{}'", args.tokens.display()))?;
    let ids  = parse_token_ids(&text)?;
    let n    = convert_to_midi(&ids, &RemiTokenizer::new(), &args.output, &args.debug_tokens)?;
    println!("Wrote {} notes -> {}", n, args.output.display());
    Ok(())
}

fn run_metrics(args: MetricsArgs) -> Result<()> {
    use crate::application::metrics_use_case::{evaluate, to_json};

    let report = evaluate(&args.path)?;
    println!("{}", to_json(&report)?);
    Ok(())
}
