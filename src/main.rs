use anyhow::{anyhow, Context as _, Result};
use clap::Parser;
use regex::Regex;
use simsweep::{
    config::{read_config_file, Config, ConfigOpt, OutputFormat},
    input::read_submissions,
    registry::{apply_all, Registry},
    scheduler::Scheduler,
    store::JsonFileStore,
    token::Interner,
    validate::{print_errors, validate_report},
};
use std::{collections::BTreeSet, path::PathBuf};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(version, about = "Finds suspiciously similar submissions")]
struct Args {
    /// Directories whose entries are the submissions to compare with each other.
    #[arg(value_name = "DIR")]
    submissions: Vec<PathBuf>,

    /// Directories of earlier submissions, compared only against the new ones.
    #[arg(long, value_name = "DIR")]
    archive: Vec<PathBuf>,

    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Stop after this many time slices.
    #[arg(long, value_name = "NUM")]
    slices: Option<usize>,

    /// Delete stored submissions that are not in any of the given directories.
    #[arg(long)]
    prune: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(flatten)]
    config_opt: ConfigOpt,
}

fn init_logging(args: &Args) {
    let level = match (args.quiet, args.verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        (false, 2) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let file_opt = read_config_file(args.config.as_deref())?;
    let config = Config::default().update(file_opt).update(args.config_opt);

    let mut registry = Registry::new();
    if let Some(path) = config.common_code() {
        let common = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read common code {}", path.display()))?;
        registry = registry.with_common_code(&common);
    }
    let pipeline = registry.pipeline(&config.preprocessors)?;
    let settings = config.scheduler_settings(&registry)?;
    let filter = Regex::new(&config.filter).with_context(|| format!("invalid filter {:?}", config.filter))?;

    let store = JsonFileStore::open(&config.store)?;
    info!("using store {}", store.path().display());
    let mut scheduler = Scheduler::open(Box::new(store), settings)?;

    let interner = Interner::new();
    let mut present = BTreeSet::new();
    let sources = args.submissions.iter().map(|dir| (dir, false));
    for (directory, archive) in sources.chain(args.archive.iter().map(|dir| (dir, true))) {
        let submissions = read_submissions(directory, &filter).map_err(|e| anyhow!("{e}"))?;
        info!("read {} submissions from {}", submissions.len(), directory.display());
        for submission in submissions {
            let content = apply_all(&pipeline, &submission.content, &interner)
                .with_context(|| format!("cannot preprocess {}", submission.name))?;
            scheduler.add_submission(&submission.name, content, archive)?;
            present.insert(submission.name);
        }
    }
    if args.prune {
        let missing: Vec<String> = scheduler
            .submissions()
            .map(|submission| submission.name.clone())
            .filter(|name| !present.contains(name))
            .collect();
        for name in missing {
            scheduler.remove_submission(&name)?;
        }
    }

    let slices = scheduler.run(args.slices)?;
    info!("ran {slices} slices");

    let report = scheduler.report();
    print_errors(&validate_report(report));
    match config.output {
        OutputFormat::Table => print!("{}", report.render_table()),
        OutputFormat::Json => {
            for result in report.results.values() {
                println!("{}", serde_json::to_string(&result.to_wire())?);
            }
        }
    }

    Ok(())
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
