#![deny(warnings)]

//! Headless CLI: load a scenario, run the simulation and materialize the
//! interval record stream.

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_SCENARIO: &str = "assets/scenarios/bottling_plant.yaml";

#[derive(Debug, Default, PartialEq)]
struct Args {
    scenario: Option<String>,
    seed: Option<u64>,
    out: Option<String>,
    db: Option<String>,
    summary: Option<String>,
    list: Option<String>,
    version: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(argv: I) -> Result<Args> {
    let mut args = Args::default();
    let mut it = argv.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--scenario" => args.scenario = it.next(),
            "--seed" => {
                let Some(raw) = it.next() else {
                    bail!("--seed needs a value");
                };
                let seed = raw
                    .parse()
                    .with_context(|| format!("invalid --seed {raw:?}"))?;
                args.seed = Some(seed);
            }
            "--out" => args.out = it.next(),
            "--db" => args.db = it.next(),
            "--summary" => args.summary = it.next(),
            "--list" => args.list = it.next(),
            "--version" | "-V" => args.version = true,
            _ => {}
        }
    }
    Ok(args)
}

/// Formatting subscriber driven entirely by `filter`.
fn subscriber(filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt().with_env_filter(filter).finish()
}

fn store_in_db(
    url: &str,
    name: &str,
    seed: u64,
    records: &[sim_core::IntervalRecord],
) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let pool = persistence::init_db(url).await?;
        let run_id = persistence::create_run(&pool, name, seed).await?;
        persistence::insert_records(&pool, run_id, records).await?;
        info!(run_id, url, "stored run");
        Ok::<(), anyhow::Error>(())
    })
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    subscriber(filter).init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.version {
        println!(
            "plant-sim {} ({} {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_SHA"),
            env!("BUILD_DATE")
        );
        return Ok(());
    }
    if let Some(dir) = &args.list {
        for entry in scenario::list_scenarios(dir)? {
            println!(
                "{} | {} -> {}",
                entry.path.display(),
                entry.horizon.start,
                entry.horizon.end
            );
        }
        return Ok(());
    }
    info!(?args, "starting CLI");

    let path = args.scenario.as_deref().unwrap_or(DEFAULT_SCENARIO);
    let loaded = scenario::load_scenario(path)?;
    let seed = args.seed.unwrap_or(loaded.config.rng_seed);
    let output = sim_runtime::run_seeded(&loaded.config, seed)?;
    data_pipeline::check_time_ordered(&output.records)?;

    if let Some(out) = &args.out {
        persistence::write_jsonl_file(out, &output.records)?;
    }
    if let Some(url) = &args.db {
        store_in_db(url, path, seed, &output.records)?;
    }

    let summary = data_pipeline::summarize(&output.records, loaded.config.interval_minutes);
    if let Some(p) = &args.summary {
        std::fs::write(p, data_pipeline::summary_json(&summary)?)?;
    }

    println!(
        "Scenario OK | lines: {} | equipment: {} | orders: {} | records: {} | seed: {}",
        loaded.master.lines().len(),
        loaded.master.equipment().len(),
        output.schedule.orders().len(),
        summary.records,
        seed
    );
    for line in &summary.lines {
        println!(
            "KPI | {} | equipment: {} | good: {} | scrap: {} | mean OEE: {:.1}%",
            line.line_id, line.equipment, line.good_units, line.scrap_units, line.mean_oee
        );
    }
    println!(
        "Downtime | planned: {} min | unplanned: {} min",
        summary.planned_stop_minutes, summary.unplanned_stop_minutes
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn env_filter_controls_debug_output() {
        tracing::subscriber::with_default(subscriber(EnvFilter::new("debug")), || {
            assert!(tracing::enabled!(Level::DEBUG));
        });
        tracing::subscriber::with_default(subscriber(EnvFilter::new("info")), || {
            assert!(!tracing::enabled!(Level::DEBUG));
            assert!(tracing::enabled!(Level::INFO));
        });
    }

    #[test]
    fn flags_are_parsed() {
        let args = parse_args(argv(&[
            "--scenario",
            "a.yaml",
            "--seed",
            "42",
            "--out",
            "out/r.jsonl",
            "--list",
            "assets/scenarios",
        ]))
        .unwrap();
        assert_eq!(args.scenario.as_deref(), Some("a.yaml"));
        assert_eq!(args.seed, Some(42));
        assert_eq!(args.out.as_deref(), Some("out/r.jsonl"));
        assert_eq!(args.list.as_deref(), Some("assets/scenarios"));
        assert!(!args.version);
    }

    #[test]
    fn bad_seed_is_an_error() {
        assert!(parse_args(argv(&["--seed", "abc"])).is_err());
        assert!(parse_args(argv(&["--seed", "-1"])).is_err());
        assert!(parse_args(argv(&["--seed"])).is_err());
        assert_eq!(parse_args(argv(&[])).unwrap(), Args::default());
    }
}
