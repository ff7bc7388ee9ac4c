pub mod config;
pub mod csv_reader;
pub mod feed;
pub mod geometry;
pub mod input;
pub mod interpolation;
pub mod matcher;
pub mod matchers;
pub mod orchestrator;
pub mod pattern;
pub mod progress;
pub mod sampler;

pub use config::{read_secret, ConfigError, MatchService, MatcherConfig};
pub use csv_reader::{read_csv_table, CsvParseError, CsvTable};
pub use feed::{
    GtfsFeed, GtfsOutputError, SHAPES_FILE, SHAPE_COLUMNS, STOPS_FILE, STOP_TIMES_FILE, TRIPS_FILE,
};
pub use geometry::{haversine_meters, LonLat, ShapeGeometry};
pub use input::{GtfsInput, GtfsInputError, GtfsInputReader, GtfsInputSource};
pub use interpolation::{insert_by_count, insert_by_max_gap, InterpolationError};
pub use matcher::{build_matcher, MatchError, Matcher};
pub use matchers::MAX_POINTS;
pub use orchestrator::{get_num_match_calls, match_feed, MatchOptions, MatchOutcome};
pub use pattern::{
    representative_trips, stop_patterns, PatternGroup, StopPattern, StopVisit, TripSelection,
    DEFAULT_ROUTE_TYPES,
};
pub use progress::{NoOpProgressHandler, ProgressHandler};
pub use sampler::{
    sample_pattern, sample_trip_points, SamplePoint, SamplingPolicy, DEFAULT_NUM_POINTS,
};
