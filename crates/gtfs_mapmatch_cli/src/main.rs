use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gtfs_mapmatch_core::{
    build_matcher, get_num_match_calls, match_feed, read_secret, sample_trip_points, GtfsFeed,
    GtfsInput, MatchOptions, MatchService, MatcherConfig, ProgressHandler, SamplingPolicy,
    TripSelection, DEFAULT_NUM_POINTS,
};
use gtfs_mapmatch_model::RouteType;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Debug, Parser)]
#[command(name = "gtfs-mapmatch")]
#[command(about = "Map match GTFS shapes, one request per stop pattern")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Match the selected trips and write a feed with the matched shapes
    Match {
        #[command(flatten)]
        feed: FeedArgs,

        /// Output directory, or zip archive if the path ends in .zip
        #[arg(short = 'o', long = "output")]
        output: PathBuf,

        #[command(flatten)]
        service: ServiceArgs,

        #[command(flatten)]
        sampling: SamplingArgs,
    },
    /// Print how many matcher requests `match` would make
    Count {
        #[command(flatten)]
        feed: FeedArgs,
    },
    /// Print the sample points of every stop pattern as JSON
    Sample {
        #[command(flatten)]
        feed: FeedArgs,

        #[command(flatten)]
        sampling: SamplingArgs,
    },
}

#[derive(Debug, Args)]
struct FeedArgs {
    /// GTFS directory or zip archive
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Route types to match; defaults to tram, bus and cable tram (0, 3, 5)
    #[arg(long = "route-type", value_delimiter = ',')]
    route_types: Vec<String>,

    /// Match only these trips; overrides --route-type
    #[arg(long = "trip-id", value_delimiter = ',')]
    trip_ids: Vec<String>,

    /// Select every trip regardless of route type
    #[arg(long = "all-route-types", conflicts_with = "route_types")]
    all_route_types: bool,
}

impl FeedArgs {
    fn selection(&self) -> anyhow::Result<TripSelection> {
        if !self.trip_ids.is_empty() {
            return Ok(TripSelection::with_trip_ids(self.trip_ids.clone()));
        }
        if self.all_route_types {
            return Ok(TripSelection::all_trips());
        }
        if self.route_types.is_empty() {
            return Ok(TripSelection::default_route_types());
        }
        let route_types = self
            .route_types
            .iter()
            .map(|value| RouteType::parse(value))
            .collect::<Result<Vec<_>, _>>()
            .context("parse --route-type")?;
        Ok(TripSelection::with_route_types(route_types))
    }

    fn load(&self) -> anyhow::Result<GtfsFeed> {
        let input = GtfsInput::from_path(&self.input)
            .with_context(|| format!("open {}", self.input.display()))?;
        info!("input {:?} detected", input.source());
        GtfsFeed::from_input(&input).with_context(|| format!("load {}", self.input.display()))
    }
}

#[derive(Debug, Args)]
struct ServiceArgs {
    /// mapzen (valhalla), osrm, mapbox or google
    #[arg(short = 's', long = "service")]
    service: String,

    #[arg(short = 'k', long = "api-key", conflicts_with = "secrets_file")]
    api_key: Option<String>,

    /// JSON file holding the API key
    #[arg(long = "secrets-file", requires = "secret_key")]
    secrets_file: Option<PathBuf>,

    /// Name of the API key inside --secrets-file
    #[arg(long = "secret-key")]
    secret_key: Option<String>,

    /// Custom endpoint for the service
    #[arg(short = 'u', long = "url")]
    url: Option<String>,

    /// Routing profile or costing, e.g. car, driving, bus
    #[arg(long = "profile")]
    profile: Option<String>,

    /// JSON object of extra request fields
    #[arg(long = "options")]
    options: Option<String>,
}

impl ServiceArgs {
    fn config(&self) -> anyhow::Result<MatcherConfig> {
        let service: MatchService = self.service.parse()?;
        let mut config = MatcherConfig::new(service);
        if let Some(api_key) = &self.api_key {
            config = config.with_api_key(api_key);
        }
        if let (Some(path), Some(key)) = (&self.secrets_file, &self.secret_key) {
            config = config.with_api_key(read_secret(path, key)?);
        }
        if let Some(url) = &self.url {
            config = config.with_url(url);
        }
        if let Some(profile) = &self.profile {
            config = config.with_profile(profile);
        }
        if let Some(options) = &self.options {
            let value: Value = serde_json::from_str(options).context("parse --options")?;
            let Value::Object(options) = value else {
                bail!("--options must be a JSON object");
            };
            config = config.with_options(options);
        }
        Ok(config)
    }
}

#[derive(Debug, Args)]
#[group(multiple = false)]
struct SamplingArgs {
    /// Points to sample per stop pattern [default: 100]
    #[arg(short = 'n', long = "num-points")]
    num_points: Option<usize>,

    /// Maximum distance between sample points, in shape_dist_traveled units
    #[arg(short = 'd', long = "point-dist")]
    point_dist: Option<f64>,

    /// Sample this many times the number of stops
    #[arg(short = 'm', long = "stop-multiplier")]
    stop_multiplier: Option<f64>,
}

impl SamplingArgs {
    fn policy(&self) -> SamplingPolicy {
        if let Some(distance) = self.point_dist {
            SamplingPolicy::Distance(distance)
        } else if let Some(factor) = self.stop_multiplier {
            SamplingPolicy::StopMultiplier(factor)
        } else {
            SamplingPolicy::Count(self.num_points.unwrap_or(DEFAULT_NUM_POINTS))
        }
    }
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Match {
            feed,
            output,
            service,
            sampling,
        } => run_match(&feed, &output, &service, &sampling),
        Command::Count { feed } => {
            let selection = feed.selection()?;
            let gtfs = feed.load()?;
            println!("{}", get_num_match_calls(&gtfs, &selection));
            Ok(())
        }
        Command::Sample { feed, sampling } => {
            let selection = feed.selection()?;
            let gtfs = feed.load()?;
            let samples: BTreeMap<String, _> =
                sample_trip_points(&gtfs, &selection, sampling.policy())
                    .into_iter()
                    .map(|(pattern, points)| (pattern.to_string(), points))
                    .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&samples).context("serialize samples")?
            );
            Ok(())
        }
    }
}

fn run_match(
    feed_args: &FeedArgs,
    output: &Path,
    service: &ServiceArgs,
    sampling: &SamplingArgs,
) -> anyhow::Result<()> {
    let config = service.config()?;
    let matcher = build_matcher(&config)?;
    let options = MatchOptions {
        selection: feed_args.selection()?,
        policy: sampling.policy(),
    };
    let feed = feed_args.load()?;

    let progress = IndicatifHandler::new();
    let outcome = match_feed(&feed, matcher.as_ref(), &options, &progress);
    progress.finish();

    if outcome.matched.is_empty() && !outcome.failed.is_empty() {
        bail!(
            "every one of {} stop patterns failed to match, nothing written",
            outcome.failed.len()
        );
    }
    outcome
        .feed
        .write_to_path(output)
        .with_context(|| format!("write {}", output.display()))?;
    info!(
        "matched {} stop patterns ({} failed), replaced {} shapes, wrote {}",
        outcome.matched.len(),
        outcome.failed.len(),
        outcome.replaced_shape_ids.len(),
        output.display()
    );
    Ok(())
}

struct IndicatifHandler {
    bar: ProgressBar,
}

impl IndicatifHandler {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
        )
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message("Waiting to match...");
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_with_message("done");
    }
}

impl ProgressHandler for IndicatifHandler {
    fn set_total_patterns(&self, count: usize) {
        self.bar.set_length(count as u64);
        self.bar.set_message("Starting matching...");
    }

    fn on_start_pattern(&self, pattern: &str) {
        self.bar.set_message(format!("Matching {}", pattern));
    }

    fn on_finish_pattern(&self, _pattern: &str, _matched: bool) {
        self.bar.inc(1);
    }
}
