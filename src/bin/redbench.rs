use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use redbench::{
    load_library_path, Generator, GeneratorConfig, JoinRange, LibraryIndex, LibraryProfile, Trace,
};

/// Generate a reproducible benchmark workload from a real query trace.
#[derive(Parser, Debug)]
#[command(name = "redbench", version, about)]
struct Args {
    /// Library stats CSV (filepath,num_joins,template)
    #[arg(long)]
    library: PathBuf,

    /// Query trace CSV (Redset columns)
    #[arg(long)]
    trace: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "workloads")]
    out: PathBuf,

    /// Benchmark library, selects the valid join-count range
    #[arg(long, value_enum, default_value_t = LibraryProfile::Imdb)]
    profile: LibraryProfile,

    /// Override the profile's smallest join count
    #[arg(long)]
    min_joins: Option<u32>,

    /// Override the profile's largest join count
    #[arg(long)]
    max_joins: Option<u32>,

    /// Seed for the fallback random picks
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Regenerate even if workloads already exist
    #[arg(long = "override")]
    override_existing: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let preset = args.profile.join_range();
    let range = JoinRange::new(
        args.min_joins.unwrap_or(preset.min),
        args.max_joins.unwrap_or(preset.max),
    );
    if range.min >= range.max {
        bail!("invalid library join range {range}");
    }

    let entries = load_library_path(&args.library, range)
        .with_context(|| format!("loading library stats from {}", args.library.display()))?;
    let library = LibraryIndex::build(entries).context("building library index")?;
    info!(
        instances = library.instance_count(),
        templates = library.template_count(),
        %range,
        "library ready"
    );

    let trace = Trace::from_path(&args.trace)
        .with_context(|| format!("loading trace from {}", args.trace.display()))?;

    let generator = Generator::new(
        Arc::new(library),
        GeneratorConfig {
            out_dir: args.out,
            library_range: range,
            seed: args.seed,
            override_existing: args.override_existing,
        },
    );
    let summary = generator.run(&trace).context("generating workloads")?;

    if !summary.skipped {
        println!(
            "Generated {} workloads ({} queries) across {} groups",
            summary.users, summary.queries, summary.groups
        );
    }
    Ok(())
}
