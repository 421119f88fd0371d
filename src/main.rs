use clap::{Args, Parser, Subcommand};
use log::{error, info};
use mach_opt::{
    ArchiveStore, CampaignConfig, CampaignRunner, GenerationStats, PopulationSnapshot,
    PopulationSnapshotStore, RestartCoordinator,
};
use std::path::PathBuf;
use std::process::ExitCode;

mod surrogate;

#[derive(Parser)]
#[command(version, about = "Crash-safe MOEA/D campaigns over electric-machine designs", propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run or resume a campaign over the analytic SPM machine model
    Run(RunArgs),
    /// Diagnose where a campaign left off without evaluating anything
    Status(CampaignArgs),
    /// Print the non-dominated records of a campaign's archive
    Pareto(ParetoArgs),
}

#[derive(Args)]
struct CampaignArgs {
    /// Campaign configuration file
    #[arg(short, long, value_name = "PATH", default_value = "campaign.toml")]
    config: PathBuf,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    campaign: CampaignArgs,

    /// Override `max_generations` from the configuration file
    #[arg(short, long, value_name = "N")]
    generations: Option<usize>,
}

#[derive(Args)]
struct ParetoArgs {
    #[command(flatten)]
    campaign: CampaignArgs,

    /// Emit full records as JSON instead of a table
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Run(args) => run(args),
        Commands::Status(args) => status(args),
        Commands::Pareto(args) => pareto(args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn run(args: RunArgs) -> CliResult {
    let mut config = CampaignConfig::from_toml_file(&args.campaign.config)?;
    if let Some(n) = args.generations {
        config = config.with_max_generations(n);
    }
    if config.bounds.dim() != surrogate::VARIABLES.len() {
        return Err(format!(
            "the SPM model has {} free variables ({}), the configuration bounds {}",
            surrogate::VARIABLES.len(),
            surrogate::VARIABLES.join(", "),
            config.bounds.dim()
        )
        .into());
    }
    if config.num_objectives() != 3 {
        return Err(format!(
            "the SPM model scores 3 objectives, bad_fitness has {}",
            config.num_objectives()
        )
        .into());
    }

    let pipeline = surrogate::pipeline(config.bad_fitness.clone(), &config.work_dir);
    let mut runner = CampaignRunner::new(config, pipeline).with_on_generation(
        |stats: &GenerationStats| {
            println!(
                "gen {:>4}  evals {:>6}  front {:>4}  hv {:.6e}",
                stats.generation, stats.evaluations, stats.front_size, stats.hypervolume
            );
        },
    );
    let result = runner.run()?;

    info!(
        "campaign finished ({}): {} evaluations total, {} new",
        result.status, result.evaluations, result.new_evaluations
    );
    Ok(())
}

fn status(args: CampaignArgs) -> CliResult {
    let config = CampaignConfig::from_toml_file(&args.config)?;
    let archive = ArchiveStore::open(&config.archive_path)?;
    let snapshots = PopulationSnapshotStore::new(&config.snapshot_path);
    let plan = RestartCoordinator::new(&archive, &snapshots, &config).plan()?;
    let snapshot = snapshots.read(config.population_size)?;

    println!("archive:   {} ({} records)", archive.path().display(), archive.len());
    println!("snapshot:  {}", snapshots.path().display());
    println!("seed:      {}", seed_label(&config, snapshot.as_ref()));
    println!("status:    {}", plan.status);
    Ok(())
}

/// Seed the next run will use. Without a snapshot or a configured seed a
/// fresh one is drawn at run time, so there is nothing to report yet.
fn seed_label(config: &CampaignConfig, snapshot: Option<&PopulationSnapshot>) -> String {
    match snapshot.map(|s| s.seed).or(config.seed) {
        Some(seed) => seed.to_string(),
        None => "unseeded".into(),
    }
}

fn pareto(args: ParetoArgs) -> CliResult {
    let config = CampaignConfig::from_toml_file(&args.campaign.config)?;
    let archive = ArchiveStore::open(&config.archive_path)?;
    let records = archive.pareto_records()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!("{} non-dominated of {} archived", records.len(), archive.len());
    for record in &records {
        let x: Vec<String> = record.x.iter().map(|v| format!("{v:.5}")).collect();
        let objs: Vec<String> = record.objs.iter().map(|v| format!("{v:.5}")).collect();
        println!("[{}] -> [{}]", x.join(", "), objs.join(", "));
    }
    Ok(())
}
