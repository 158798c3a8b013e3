use std::f32::consts::PI;
use std::path::PathBuf;

use beatgate_core::{build_engine, Command, TrackedStream, TrackerConfig, TrackerEvent};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn main() -> beatgate_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => run_simulate(&args),
        Commands::Config { config } => print_config(config.as_ref()),
    }
}

fn run_simulate(args: &SimulateArgs) -> beatgate_core::Result<()> {
    let config = args.resolve_config()?;
    tracing::info!(
        sample_rate = config.sample_rate,
        block_size = config.block_size,
        seconds = args.seconds,
        "starting simulation"
    );

    let engine = build_engine(&config)?;
    let mut stream = TrackedStream::new(engine, &config)?;
    let control = stream.control();

    if let Some(bpm) = args.fix_tempo {
        control.fix_tempo(bpm)?;
    }

    let block_ms = config.block_size as f64 * 1000.0 / config.sample_rate as f64;
    let total_blocks = (args.seconds * 1000.0 / block_ms).ceil() as usize;

    // Taps start one second in so the first one is measured against the
    // stream origin and the rest against each other.
    let mut taps: Vec<f64> = match args.count_in_ms {
        Some(interval) => {
            control.off()?;
            (0..config.count_in)
                .map(|k| 1000.0 + f64::from(k) * interval)
                .collect()
        }
        None => Vec::new(),
    };
    taps.reverse();

    let mut block = vec![0.0_f32; config.block_size];
    let mut events: Vec<TrackerEvent> = Vec::with_capacity(2);
    let mut beats = 0_usize;
    let mut beats_due = 0_usize;
    let mut last_tempo = None;

    for index in 0..total_blocks {
        let now_ms = index as f64 * block_ms;
        while taps.last().is_some_and(|at| *at <= now_ms) {
            if let Some(at_ms) = taps.pop() {
                control.send(Command::CountIn { at_ms })?;
            }
        }

        // Not real-time: report control outcomes before the block.
        stream.drain_commands(|command, applied| applied.report(command));

        fill_tone(&mut block, index * config.block_size, config.sample_rate);
        events.clear();
        if stream.process_block(&block, &mut events)? {
            beats_due += 1;
        }

        for event in &events {
            match event {
                TrackerEvent::Beat => beats += 1,
                TrackerEvent::Tempo(bpm) => last_tempo = Some(*bpm),
            }
            if args.json {
                let line = TimedEvent {
                    at_ms: now_ms,
                    event: *event,
                };
                println!("{}", serde_json::to_string(&line)?);
            } else {
                println!("{now_ms:10.1} ms  {event:?}");
            }
        }
    }

    let state = stream.state();
    tracing::info!(
        beats,
        beats_due,
        suppressed = beats_due - beats,
        tempo = ?last_tempo,
        count_in = state.count_in,
        "simulation finished"
    );
    Ok(())
}

fn print_config(path: Option<&PathBuf>) -> beatgate_core::Result<()> {
    let config = match path {
        Some(path) => TrackerConfig::from_json_file(path)?,
        None => TrackerConfig::default(),
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn fill_tone(block: &mut [f32], offset: usize, sample_rate: u32) {
    let step = 2.0 * PI * 440.0 / sample_rate as f32;
    for (i, sample) in block.iter_mut().enumerate() {
        *sample = 0.1 * (step * (offset + i) as f32).sin();
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Serialize)]
struct TimedEvent {
    at_ms: f64,
    event: TrackerEvent,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Beat and tempo event gating host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive one tracked stream with synthetic audio and print its events.
    Simulate(SimulateArgs),
    /// Print the effective configuration as JSON.
    Config {
        /// Configuration file to load instead of the defaults.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// JSON configuration file; command line flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Host audio block size in samples.
    #[arg(long)]
    block_size: Option<usize>,
    #[arg(long)]
    sample_rate: Option<u32>,
    /// Length of the simulated input.
    #[arg(long, default_value_t = 10.0)]
    seconds: f64,
    /// Pin the engine tempo before the first block.
    #[arg(long)]
    fix_tempo: Option<f64>,
    /// Switch output off and count in with taps this many milliseconds apart.
    #[arg(long)]
    count_in_ms: Option<f64>,
    /// Print events as JSON lines.
    #[arg(long)]
    json: bool,
}

impl SimulateArgs {
    fn resolve_config(&self) -> beatgate_core::Result<TrackerConfig> {
        let mut config = match &self.config {
            Some(path) => TrackerConfig::from_json_file(path)?,
            None => TrackerConfig::default(),
        };
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate = sample_rate;
        }
        config.validate()?;
        Ok(config)
    }
}
