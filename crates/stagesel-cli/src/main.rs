use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command, ValueHint};
use log::LevelFilter;
use std::path::PathBuf;

use stagesel_core::config::{load_config, CandidateModel, FeatureSelectionConfig};
use stagesel_core::feature_selection::{FeatureSearch, PrefixStagedSearch};
use stagesel_core::run_feature_selection;

fn main() {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("STAGESEL_LOG", "error,stagesel=info,stagesel_core=info"))
        .init();

    let matches = Command::new("stagesel")
        .version(clap::crate_version!())
        .about("Staged feature selection over mImp/rImp imputed matrices")
        .arg_required_else_help(true)
        .arg(
            Arg::new("base_dir")
                .help(
                    "Experiment base directory. With --config, relative paths in the config are resolved against it.",
                )
                .required_unless_present("config")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("JSON configuration file. Replaces the layout derived from the base directory.")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .help("Number of worker threads per batch. Defaults to the number of cores.")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("models")
                .short('m')
                .long("models")
                .help("Comma-separated candidate models (lr, sv, rf). Overrides the config.")
                .value_delimiter(',')
                .value_parser(|s: &str| s.parse::<CandidateModel>()),
        )
        .arg(
            Arg::new("alpha")
                .long("alpha")
                .help("Significance level for including an attribute set.")
                .value_parser(clap::value_parser!(f64))
                .default_value("0.05"),
        )
        .get_matches();

    if let Err(e) = run(&matches) {
        log::error!("Feature selection failed: {:#}", e);
        std::process::exit(1)
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    let config = build_config(matches)?;
    let alpha = matches.get_one::<f64>("alpha").copied().unwrap_or(0.05);
    let search = PrefixStagedSearch::new(alpha);

    log::info!(
        "[stagesel] Running {} with models [{}], writing to {:?}",
        search.name(),
        config
            .models_to_use
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        config.feature_selection_storage
    );

    let reports = run_feature_selection(&config, &search)?;
    let total: usize = reports.iter().map(|r| r.outcomes.len()).sum();
    log::info!("[stagesel] Completed {} searches", total);
    Ok(())
}

fn build_config(matches: &ArgMatches) -> Result<FeatureSelectionConfig> {
    let base_dir = matches.get_one::<PathBuf>("base_dir");
    let mut config = match (matches.get_one::<PathBuf>("config"), base_dir) {
        (Some(path), base_dir) => {
            log::info!("[stagesel] Using config: {:?}", path);
            let config = load_config(path)?;
            match base_dir {
                Some(base_dir) => config.relative_to(base_dir),
                None => config,
            }
        }
        (None, Some(base_dir)) => {
            let config = FeatureSelectionConfig::from_base_dir(base_dir);
            log::debug!(
                "[stagesel] Derived config:\n{}",
                serde_json::to_string_pretty(&config).context("Failed to serialize config")?
            );
            config
        }
        (None, None) => anyhow::bail!("Either a base directory or --config is required"),
    };

    if let Some(&workers) = matches.get_one::<usize>("workers") {
        config.num_workers = Some(workers);
    }
    if let Some(models) = matches.get_many::<CandidateModel>("models") {
        config.models_to_use = models.copied().collect();
    }

    Ok(config)
}
