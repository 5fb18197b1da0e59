//! Interactive fear & greed session on stdin/stdout.

use std::io::{self, BufReader};
use std::path::PathBuf;

use fearcast::config::{self, AppSettings};
use fearcast::dataset::CsvRowSource;
use fearcast::live_data::{LiveDataFetcher, UreqTransport};
use fearcast::logging;
use fearcast::ml::mlp::MlpClassifier;
use fearcast::runtime::App;
use fearcast::session::Session;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let mut settings = load_settings(options.config.as_ref())?;
    if let Some(dataset) = options.dataset {
        settings.dataset_path = dataset;
    }

    let model = MlpClassifier::new(settings.mlp_options());
    let mut session = Session::new(model, settings.session_settings());
    let mut source = CsvRowSource::from_path(&settings.dataset_path);
    let summary = session
        .initialize(settings.backend.preferred, &mut source)
        .map_err(|err| err.to_string())?;
    if let Some(err) = &summary.normalize_error {
        tracing::warn!("Training data left unnormalized: {err}");
    }

    let fetcher = LiveDataFetcher::new(
        settings.live_data.providers.clone(),
        Box::new(UreqTransport::new(settings.live_data.timeout())),
        settings.live_data.fallback,
    );
    let mut app =
        App::new(session, fetcher, io::stdout()).with_tick_interval(settings.tick_interval());
    app.spawn_input(BufReader::new(io::stdin()))
        .map_err(|err| format!("Failed to read stdin: {err}"))?;
    app.run().map_err(|err| format!("Output failed: {err}"))?;

    let (session, _) = app.into_parts();
    session.teardown();
    Ok(())
}

fn load_settings(path: Option<&PathBuf>) -> Result<AppSettings, String> {
    let loaded = match path {
        Some(path) => config::load_from_path(path),
        None => config::load_or_default(),
    };
    loaded.map_err(|err| err.to_string())
}

#[derive(Debug, Default)]
struct CliOptions {
    config: Option<PathBuf>,
    dataset: Option<PathBuf>,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--config" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                options.config = Some(PathBuf::from(value));
            }
            "--dataset" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--dataset requires a value".to_string())?;
                options.dataset = Some(PathBuf::from(value));
            }
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "fearcast",
        "",
        "Train a fear & greed classifier on a CSV dataset and query it interactively.",
        "",
        "Usage:",
        "  fearcast [--config <path>] [--dataset <path>]",
        "",
        "Type \"help\" once running for the command list.",
    ]
    .join("\n")
}
