mod pipeline;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use brachy_core::{
    EnergyUnit, Projection, Projections, RunSnapshot, ScoringConfig, SynthParams, export_json,
    format_summary, import_json, summary, synth,
};
use brachy_store::{
    RunArchive, check_label, default_config_toml, default_data_dir, export_run, load_config,
};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[derive(Parser)]
#[command(name = "brachy", about = "Brachytherapy dose scoring: ingest, archive and export runs")]
struct Cli {
    /// Directory holding the run archive (default: $BRACHY_DATA_DIR or ~/.brachy-dose)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a JSONL step stream and archive the merged run
    Run {
        /// Input file, or `-` for stdin
        input: PathBuf,

        /// Scoring configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Worker threads
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
        workers: u16,

        /// Run label used in the archive and export file names
        #[arg(long)]
        label: Option<String>,

        /// Score a single projection only
        #[arg(long, value_parser = parse_projection)]
        only: Option<Projection>,

        /// Write the export file set into this directory
        #[arg(long)]
        out: Option<PathBuf>,

        /// Energy unit for voxel maps
        #[arg(long, default_value = "kev", value_parser = parse_unit)]
        unit: EnergyUnit,

        /// Also write a JSON snapshot of the run
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Do not store the run in the archive
        #[arg(long)]
        no_archive: bool,
    },

    /// List archived runs
    Runs {
        #[arg(long)]
        json: bool,
    },

    /// Show one archived run
    Show {
        /// Run id or unique prefix
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Export an archived run to files
    Export {
        /// Run id or unique prefix
        id: String,

        /// Output directory
        #[arg(long)]
        out: PathBuf,

        #[arg(long, default_value = "kev", value_parser = parse_unit)]
        unit: EnergyUnit,

        /// Also write a JSON snapshot of the run
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Archive a run from a JSON snapshot
    Import {
        /// Snapshot file written by `run --snapshot` or `export --snapshot`
        path: PathBuf,
    },

    /// Delete an archived run
    Delete {
        /// Run id or unique prefix
        id: String,
    },

    /// Print the default scoring configuration, or validate a file
    Config {
        /// Validate this file instead of printing defaults
        #[arg(long)]
        check: Option<PathBuf>,
    },

    /// Generate a synthetic point-source step stream (JSONL)
    Synth {
        #[arg(long, default_value_t = 100)]
        events: u64,

        #[arg(long, default_value_t = 20)]
        steps: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn parse_unit(s: &str) -> Result<EnergyUnit, String> {
    EnergyUnit::from_str_lossy(s).ok_or_else(|| format!("unknown energy unit '{s}' (kev, mev)"))
}

fn parse_projection(s: &str) -> Result<Projection, String> {
    Projection::from_str_lossy(s)
        .ok_or_else(|| format!("unknown projection '{s}' (radial, angular, voxel)"))
}

fn data_dir(cli: &Cli) -> PathBuf {
    cli.data_dir
        .clone()
        .or_else(|| std::env::var("BRACHY_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(default_data_dir)
}

fn open_archive(cli: &Cli) -> Result<RunArchive> {
    let dir = data_dir(cli);
    RunArchive::open_dir(&dir)
        .with_context(|| format!("failed to open run archive in {}", dir.display()))
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Run {
            input,
            config,
            workers,
            label,
            only,
            out,
            unit,
            snapshot,
            no_archive,
        } => cmd_run(
            &cli,
            RunArgs {
                input,
                config: config.as_deref(),
                workers: usize::from(*workers),
                label: label.clone(),
                projections: only.map_or(Projections::ALL, Projections::only),
                out: out.as_deref(),
                unit: *unit,
                snapshot: snapshot.as_deref(),
                archive: !no_archive,
            },
        ),
        Commands::Runs { json } => cmd_runs(&cli, *json),
        Commands::Show { id, json } => cmd_show(&cli, id, *json),
        Commands::Export {
            id,
            out,
            unit,
            snapshot,
        } => cmd_export(&cli, id, out, *unit, snapshot.as_deref()),
        Commands::Import { path } => cmd_import(&cli, path),
        Commands::Delete { id } => cmd_delete(&cli, id),
        Commands::Config { check } => cmd_config(check.as_deref()),
        Commands::Synth {
            events,
            steps,
            seed,
            output,
        } => cmd_synth(*events, *steps, *seed, output.as_deref()),
    }
}

struct RunArgs<'a> {
    input: &'a Path,
    config: Option<&'a Path>,
    workers: usize,
    label: Option<String>,
    projections: Projections,
    out: Option<&'a Path>,
    unit: EnergyUnit,
    snapshot: Option<&'a Path>,
    archive: bool,
}

fn cmd_run(cli: &Cli, args: RunArgs<'_>) -> Result<()> {
    let config = match args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ScoringConfig::default(),
    };

    let label = args
        .label
        .unwrap_or_else(brachy_store::time::default_label);
    if args.out.is_some() {
        check_label(&label)?;
    }
    tracing::info!(workers = args.workers, label = %label, "starting run");

    let outcome = if args.input == Path::new("-") {
        pipeline::run_stream(&config, args.projections, io::stdin().lock(), args.workers)?
    } else {
        let file = File::open(args.input)
            .with_context(|| format!("failed to open {}", args.input.display()))?;
        pipeline::run_stream(&config, args.projections, BufReader::new(file), args.workers)?
    };
    let (grid, stats, skipped) = (outcome.grid, outcome.stats, outcome.skipped);

    println!(
        "scored {} steps ({} deposited, {} rejected, {} outside volume, {} skipped lines) in {} events",
        stats.seen, stats.deposited, stats.rejected, stats.outside_volume, skipped, stats.events
    );

    if args.archive {
        let archive = open_archive(cli)?;
        let record = archive
            .save_run(&label, &config, &grid, args.workers)
            .context("failed to archive run")?;
        println!("archived run {} ({})", record.id, record.label);
    }

    if let Some(dir) = args.out {
        let written = export_run(dir, &label, &grid, args.unit)
            .with_context(|| format!("failed to export to {}", dir.display()))?;
        for path in written {
            println!("wrote {}", path.display());
        }
    }

    if let Some(path) = args.snapshot {
        write_snapshot(
            path,
            &RunSnapshot::new(&label, &config, &grid).with_workers(args.workers),
        )?;
    }

    print!("{}", format_summary(&summary(&grid)));
    Ok(())
}

fn cmd_runs(cli: &Cli, json: bool) -> Result<()> {
    let archive = open_archive(cli)?;
    let runs = archive.list_runs().context("failed to list runs")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        println!("(no runs archived)");
        return Ok(());
    }
    for run in &runs {
        println!(
            "{}  {}  {:<20}  workers={}  events={}  energy={:.6} MeV",
            run.id, run.created_at, run.label, run.workers, run.events, run.energy_total
        );
    }
    Ok(())
}

fn cmd_show(cli: &Cli, id: &str, json: bool) -> Result<()> {
    let archive = open_archive(cli)?;
    let id = archive.resolve_run_id(id)?;
    let stored = archive.load_run(&id).context("failed to load run")?;
    let summary = summary(&stored.grid);

    if json {
        let value = serde_json::json!({
            "run": stored.record,
            "config": stored.config,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("id:       {}", stored.record.id);
    println!("label:    {}", stored.record.label);
    println!("created:  {}", stored.record.created_at);
    println!("workers:  {}", stored.record.workers);
    println!("volume:   {}", stored.config.scoring_volume);
    print!("{}", format_summary(&summary));
    Ok(())
}

fn cmd_export(
    cli: &Cli,
    id: &str,
    out: &Path,
    unit: EnergyUnit,
    snapshot: Option<&Path>,
) -> Result<()> {
    let archive = open_archive(cli)?;
    let id = archive.resolve_run_id(id)?;
    let stored = archive.load_run(&id).context("failed to load run")?;

    let written = export_run(out, &stored.record.label, &stored.grid, unit)
        .with_context(|| format!("failed to export to {}", out.display()))?;
    for path in written {
        println!("wrote {}", path.display());
    }
    if let Some(path) = snapshot {
        write_snapshot(
            path,
            &RunSnapshot::new(&stored.record.label, &stored.config, &stored.grid)
                .with_workers(stored.record.workers),
        )?;
    }
    Ok(())
}

fn cmd_import(cli: &Cli, path: &Path) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let snapshot = import_json(&json).context("failed to parse snapshot")?;
    snapshot
        .config
        .validate()
        .context("snapshot carries an invalid config")?;

    let archive = open_archive(cli)?;
    let record = archive
        .save_run(&snapshot.label, &snapshot.config, &snapshot.grid, snapshot.workers)
        .context("failed to archive snapshot")?;
    println!("archived run {} ({}) from {}", record.id, record.label, path.display());
    Ok(())
}

fn cmd_delete(cli: &Cli, id: &str) -> Result<()> {
    let archive = open_archive(cli)?;
    let id = archive.resolve_run_id(id)?;
    if !archive.delete_run(&id)? {
        bail!("run {id} vanished before it could be deleted");
    }
    println!("deleted run {id}");
    Ok(())
}

fn cmd_config(check: Option<&Path>) -> Result<()> {
    match check {
        Some(path) => {
            let config = load_config(path)
                .with_context(|| format!("invalid config {}", path.display()))?;
            println!(
                "ok: {} radial bins, {} angular bins, {}x{} voxels, volume '{}'",
                config.radial.bins,
                config.angular.bins,
                config.voxel.bins,
                config.voxel.bins,
                config.scoring_volume
            );
        }
        None => print!("{}", default_config_toml()?),
    }
    Ok(())
}

fn cmd_synth(events: u64, steps: usize, seed: u64, output: Option<&Path>) -> Result<()> {
    let params = SynthParams {
        events,
        steps_per_event: steps,
        ..SynthParams::default()
    };
    let records = synth::stream(&params, &mut SmallRng::seed_from_u64(seed));

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut sink = BufWriter::new(sink);
    for record in &records {
        serde_json::to_writer(&mut sink, record)?;
        sink.write_all(b"\n")?;
    }
    sink.flush()?;

    tracing::info!(events, records = records.len(), seed, "synthesized step stream");
    Ok(())
}

fn write_snapshot(path: &Path, snapshot: &RunSnapshot) -> Result<()> {
    let json = export_json(snapshot).context("failed to serialize snapshot")?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}
