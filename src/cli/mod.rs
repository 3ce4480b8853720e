// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All work is delegated to Layer 2 (application).
//
//   1. `train`     — trains a model on a parallel corpus
//   2. `translate` — loads a checkpoint and translates a sentence
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use burn::prelude::Backend;
use clap::Parser;
use commands::{Commands, TrainArgs, TranslateArgs};

use crate::application::{
    train_use_case::TrainUseCase,
    translate_use_case::TranslateUseCase,
};
use crate::domain::traits::Translator;
use crate::ml::trainer::ComputeBackend;

#[derive(Parser, Debug)]
#[command(
    name = "transformer-mt",
    version,
    about = "Train an encoder-decoder Transformer for translation, then translate with it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)     => run_train(args),
            Commands::Translate(args) => match args.backend {
                ComputeBackend::Cpu  => run_translate::<burn::backend::NdArray>(args, Default::default()),
                ComputeBackend::Wgpu => run_translate::<burn::backend::Wgpu>(args, Default::default()),
            },
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    tracing::info!("Starting training on '{}'", args.train_file);
    let checkpoint_dir = args.checkpoint_dir.clone();

    let summary = TrainUseCase::new(args.into()).execute()?;

    println!(
        "Training complete: {} epochs, {} steps ({} skipped).",
        summary.epochs_run, summary.steps, summary.skipped_steps
    );
    match summary.best_epoch {
        Some(epoch) => println!("Best BLEU {:.2} at epoch {}. Checkpoints in '{}'.", summary.best_bleu, epoch, checkpoint_dir),
        None        => println!("Checkpoints in '{}'.", checkpoint_dir),
    }
    Ok(())
}

fn run_translate<B: Backend>(args: TranslateArgs, device: B::Device) -> Result<()> {
    let use_case = TranslateUseCase::<B>::new(&args.checkpoint_dir, args.options(), device)?;

    if args.ids {
        let translation = use_case.translate_ids(&args.parse_ids()?)?;
        let ids: Vec<String> = use_case.content(&translation).iter().map(u32::to_string).collect();
        println!("{}", ids.join(" "));
        if translation.is_truncated() {
            println!("(truncated at the length bound)");
        }
    } else {
        println!("{}", use_case.translate(&args.text)?);
    }
    Ok(())
}
