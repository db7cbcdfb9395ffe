use anyhow::{Context, Result};
use clap::Parser;
use stopwatch::{
    cli::{Cli, OutputFormat},
    config::StopwatchConfig,
    counter_source::RusageSource,
    report::Report,
    store::MeasurementStore,
    workload,
};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Resolve configuration: file or environment, then command-line overrides
fn load_config(args: &Cli) -> Result<StopwatchConfig> {
    let mut config = match &args.config {
        Some(path) => StopwatchConfig::from_file(path)?,
        None => StopwatchConfig::from_env(),
    };

    if let Some(list) = &args.events {
        config = config.with_events(list);
    }
    if let Some(path) = &args.csv {
        config.csv_path = Some(path.clone());
    }

    config.validate()?;
    Ok(config)
}

/// Run the instrumented workload and snapshot the results
fn measure(args: &Cli, config: &StopwatchConfig) -> Result<Report> {
    let source = RusageSource::new();
    let counters = config.resolve_counters(&source)?;

    let mut store = MeasurementStore::new(source);
    store
        .init(&counters)
        .context("Failed to initialize stopwatch")?;

    let outcome = workload::run_instrumented(&mut store, args.size, args.iterations)
        .and_then(|checksum| {
            tracing::debug!("workload checksum: {}", checksum);
            Report::from_store(&store)
        });

    // Release the counters even when the workload failed
    let released = store.destroy();
    first_failure(outcome, released)
}

/// Prefer the measurement error; a teardown error only surfaces on its own
fn first_failure(
    outcome: stopwatch::Result<Report>,
    released: stopwatch::Result<()>,
) -> Result<Report> {
    match (outcome, released) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(e)) => Err(e).context("Failed to release counters"),
        (Err(e), Ok(())) => Err(e.into()),
        (Err(e), Err(teardown)) => {
            tracing::warn!("Failed to release counters: {}", teardown);
            Err(e.into())
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    if args.size == 0 {
        anyhow::bail!("Invalid value for --size: 0 (must be >= 1)");
    }

    init_tracing(args.debug);

    let config = load_config(&args)?;
    let report = measure(&args, &config)?;

    match args.format {
        OutputFormat::Text => print!("{}", report.render_table(config.indent_spacing)?),
        OutputFormat::Csv => print!("{}", report.to_csv()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    if let Some(path) = &config.csv_path {
        report
            .write_csv(path)
            .with_context(|| format!("Failed to write CSV report to {}", path.display()))?;
    }

    Ok(())
}
