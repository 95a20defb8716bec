//! `strata` command line: upgrade plans, pre-flight checks and stale configs

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use strata_checks::{CheckRequest, CheckStatus};
use strata_core::{init_logging, ClusterEngine, EngineConfig, LogOptions, TopologyDocument};
use strata_upgrade::{Direction, UpgradePack};

fn topology_arg() -> Arg {
    Arg::new("topology")
        .long("topology")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Topology JSON document")
}

fn cluster_arg() -> Arg {
    Arg::new("cluster")
        .long("cluster")
        .help("Cluster name; may be omitted when the topology has one cluster")
}

fn cli() -> Command {
    Command::new("strata")
        .version(strata_core::VERSION)
        .about("Cluster state, config staleness and upgrade planning")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .env("STRATA_CONFIG")
                .value_parser(value_parser!(PathBuf))
                .help("Engine configuration (TOML)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("plan")
                .about("Print the upgrade plan as JSON")
                .arg(topology_arg())
                .arg(cluster_arg())
                .arg(
                    Arg::new("pack")
                        .long("pack")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Upgrade pack (JSON, or YAML by extension)"),
                )
                .arg(
                    Arg::new("target")
                        .long("target")
                        .help("Target repository version; defaults to the one on the pack's stack"),
                )
                .arg(
                    Arg::new("downgrade")
                        .long("downgrade")
                        .action(ArgAction::SetTrue)
                        .help("Plan the downgrade instead"),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Run the pre-flight checks")
                .arg(topology_arg())
                .arg(cluster_arg())
                .arg(
                    Arg::new("repo-version")
                        .long("repo-version")
                        .help("Repository version the upgrade targets"),
                )
                .arg(
                    Arg::new("pack")
                        .long("pack")
                        .value_parser(value_parser!(PathBuf))
                        .help("Only run the checks this upgrade pack requires"),
                ),
        )
        .subcommand(
            Command::new("stale")
                .about("List host-components running stale configuration")
                .arg(topology_arg())
                .arg(cluster_arg()),
        )
}

fn load_engine(matches: &ArgMatches, args: &ArgMatches) -> Result<(ClusterEngine, String)> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let path = args
        .get_one::<PathBuf>("topology")
        .context("--topology is required")?;
    let document = TopologyDocument::load(path).with_context(|| format!("loading {}", path.display()))?;
    let cluster = match args.get_one::<String>("cluster") {
        Some(name) => name.clone(),
        None => match document.clusters.as_slice() {
            [only] => only.name.clone(),
            [] => bail!("topology {} has no cluster", path.display()),
            _ => bail!("topology {} has several clusters, pass --cluster", path.display()),
        },
    };
    let topology = document.build().context("building topology")?;
    Ok((ClusterEngine::from_topology(config, topology), cluster))
}

fn load_pack(path: &Path) -> Result<UpgradePack> {
    let input = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml"));
    let pack = if yaml {
        UpgradePack::from_yaml(&input)
    } else {
        UpgradePack::from_json(&input)
    };
    pack.with_context(|| format!("parsing {}", path.display()))
}

fn run(matches: &ArgMatches) -> Result<bool> {
    match matches.subcommand() {
        Some(("plan", args)) => {
            let (engine, cluster) = load_engine(matches, args)?;
            let path = args.get_one::<PathBuf>("pack").context("--pack is required")?;
            let direction = if args.get_flag("downgrade") {
                Direction::Downgrade
            } else {
                Direction::Upgrade
            };
            let target = args.get_one::<String>("target").map(String::as_str);
            let plan = engine.plan_upgrade(&cluster, load_pack(path)?, direction, target)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(true)
        }
        Some(("check", args)) => {
            let (engine, cluster) = load_engine(matches, args)?;
            let mut request = CheckRequest::new(&cluster);
            if let Some(version) = args.get_one::<String>("repo-version") {
                request = request.with_repository_version(version);
            }
            let results = match args.get_one::<PathBuf>("pack") {
                Some(path) => engine.perform_checks_for_pack(&request, &load_pack(path)?),
                None => engine.perform_checks(&request),
            };
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(results.iter().all(|r| r.status != CheckStatus::Fail))
        }
        Some(("stale", args)) => {
            let (engine, cluster) = load_engine(matches, args)?;
            let stale = engine.stale_host_components(&cluster)?;
            println!("{}", serde_json::to_string_pretty(&stale)?);
            Ok(true)
        }
        Some((other, _)) => bail!("unknown command {other}"),
        None => bail!("no command given"),
    }
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(&LogOptions {
        json: matches.get_flag("log-json"),
        ..LogOptions::default()
    })?;

    if !run(&matches)? {
        std::process::exit(1);
    }
    Ok(())
}
