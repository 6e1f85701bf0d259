use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use harmoniq_host_vst2::{AudioBuffer, Module, Precision, Processor, ProcessorConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Inspect a VST2 plugin and optionally run it over silence")]
struct Cli {
    /// Path to the plugin binary.
    plugin: PathBuf,
    /// Processor config (JSON). Falls back to $HARMONIQ_VST2_CONFIG, then defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the configured sample rate.
    #[arg(long)]
    sample_rate: Option<f64>,
    /// Override the configured channel count.
    #[arg(long)]
    channels: Option<usize>,
    /// Override the configured processing precision.
    #[arg(long, value_enum)]
    precision: Option<PrecisionArg>,
    /// Number of blocks of silence to render after printing the plugin info.
    #[arg(long, default_value_t = 0)]
    blocks: usize,
    /// Frames per rendered block.
    #[arg(long, default_value_t = 512)]
    block_size: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum PrecisionArg {
    Auto,
    Single,
    Double,
}

impl From<PrecisionArg> for Precision {
    fn from(value: PrecisionArg) -> Self {
        match value {
            PrecisionArg::Auto => Precision::Auto,
            PrecisionArg::Single => Precision::Single,
            PrecisionArg::Double => Precision::Double,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let module = Module::open(&cli.plugin)
        .with_context(|| format!("failed to open plugin {}", cli.plugin.display()))?;

    let mut plugin = module.load(|_, _, _, _, _, _| 0)?;
    plugin.open()?;
    let info = plugin.info()?;
    plugin.close()?;
    drop(plugin);
    println!("{}", serde_json::to_string_pretty(&info)?);

    if cli.blocks > 0 {
        render(&module, &config, cli.blocks, cli.block_size)?;
    }

    module.close().context("failed to unload plugin module")?;
    Ok(())
}

fn load_config(cli: &Cli) -> Result<ProcessorConfig> {
    let mut config = match &cli.config {
        Some(path) => ProcessorConfig::load(path)?,
        None => ProcessorConfig::from_env_or_default()?,
    };
    if let Some(sample_rate) = cli.sample_rate {
        config = config.with_sample_rate(sample_rate);
    }
    if let Some(channels) = cli.channels {
        config = config.with_channels(channels);
    }
    if let Some(precision) = cli.precision {
        config = config.with_precision(precision.into());
    }
    Ok(config)
}

fn render(module: &Module, config: &ProcessorConfig, blocks: usize, block_size: usize) -> Result<()> {
    let mut processor = Processor::new(module, config).context("failed to start processor")?;
    let mut peaks = vec![0.0f64; config.channels];
    let mut block = AudioBuffer::new(config.channels, block_size);

    for index in 0..blocks {
        block.clear();
        processor
            .process(&mut block)
            .with_context(|| format!("block {index} failed"))?;
        for (peak, channel) in peaks.iter_mut().zip(block.channel_slices()) {
            let block_peak = channel.iter().fold(0.0f64, |acc, sample| acc.max(sample.abs()));
            *peak = peak.max(block_peak);
        }
    }

    println!(
        "rendered {blocks} blocks of {block_size} frames at {} Hz ({:?} precision), peaks {:?}",
        processor.sample_rate(),
        processor.precision(),
        peaks
    );
    processor.close()?;
    Ok(())
}
