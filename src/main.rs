use clap::Parser;
use tracing_subscriber::EnvFilter;

use tessclean::cli::{Cli, Command};
use tessclean::config::AppConfig;
use tessclean::pipeline::Pipeline;
use tessclean::stages;

fn main() {
    if let Err(e) = run() {
        eprintln!("tessclean: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config)?;
    if let Some(working_db) = &cli.working_db {
        config.store.working_db = working_db.clone();
    }
    if let Some(reference_db) = &cli.reference_db {
        config.store.reference_db = reference_db.clone();
    }

    init_logging(&config.logging.log_filter);

    let default_tolerance = config.pipeline.default_tolerance_percent;
    let stage_name = cli.command.registry_name();
    let opts = cli.command.args().into_options(default_tolerance);

    let mut pipeline = Pipeline::open(config)?;

    tracing::info!(stage = stage_name, ?opts, "starting");
    let (examined, changed) = match stage_name {
        "stage1" => stages::stage1(&mut pipeline, &opts)?,
        "stage2" => stages::stage2(&mut pipeline, &opts)?,
        "full" => stages::full(&mut pipeline, &opts)?,
        other => {
            let f = stages::lookup(other).expect("registry_name always names a known stage");
            f(&mut pipeline, &opts)?
        }
    };

    println!("{stage_name}: examined {examined} rows, changed {changed} rows");
    Ok(())
}

fn init_logging(config_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
