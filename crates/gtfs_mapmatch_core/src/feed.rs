use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use gtfs_mapmatch_model::{Route, Shape, Stop, StopTime, Trip};
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::csv_reader::{strip_utf8_bom, CsvParseError};
use crate::geometry::{LonLat, ShapeGeometry};
use crate::input::is_zip_path;
use crate::{CsvTable, GtfsInput, GtfsInputError, GtfsInputReader};

pub const STOPS_FILE: &str = "stops.txt";
pub const ROUTES_FILE: &str = "routes.txt";
pub const TRIPS_FILE: &str = "trips.txt";
pub const STOP_TIMES_FILE: &str = "stop_times.txt";
pub const SHAPES_FILE: &str = "shapes.txt";

/// Columns written for a `shapes.txt` that did not exist in the input.
pub const SHAPE_COLUMNS: [&str; 5] = [
    "shape_id",
    "shape_pt_lat",
    "shape_pt_lon",
    "shape_pt_sequence",
    "shape_dist_traveled",
];

#[derive(Debug, thiserror::Error)]
pub enum GtfsOutputError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("zip error on {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error(transparent)]
    Csv(#[from] CsvParseError),
}

/// An in-memory snapshot of the tables this tool reads, plus the raw bytes of
/// every file so a rewritten feed differs from its source only in the
/// `shapes.txt` rows of replaced shapes.
#[derive(Debug, Clone, Default)]
pub struct GtfsFeed {
    pub stops: CsvTable<Stop>,
    pub routes: CsvTable<Route>,
    pub trips: CsvTable<Trip>,
    pub stop_times: CsvTable<StopTime>,
    pub shapes: Option<CsvTable<Shape>>,
    pub passthrough: BTreeMap<String, Vec<u8>>,
    /// Shapes whose rows no longer match the source `shapes.txt`.
    pub replaced_shape_ids: BTreeSet<String>,
}

impl GtfsFeed {
    pub fn from_input(input: &GtfsInput) -> Result<Self, GtfsInputError> {
        let reader = input.reader();
        Self::from_reader(&reader)
    }

    pub fn from_reader(reader: &GtfsInputReader) -> Result<Self, GtfsInputError> {
        let stops = reader.read_required_csv(STOPS_FILE)?;
        let routes = reader.read_required_csv(ROUTES_FILE)?;
        let trips = reader.read_required_csv(TRIPS_FILE)?;
        let stop_times = reader.read_required_csv(STOP_TIMES_FILE)?;
        let shapes = reader.read_optional_csv(SHAPES_FILE)?;

        let mut passthrough = BTreeMap::new();
        for name in reader.list_files()? {
            if let Some(data) = reader.read_file(&name)? {
                passthrough.insert(name, data);
            }
        }
        debug!(
            trips = trips.rows.len(),
            stop_times = stop_times.rows.len(),
            files = passthrough.len(),
            "loaded feed"
        );

        Ok(Self {
            stops,
            routes,
            trips,
            stop_times,
            shapes,
            passthrough,
            replaced_shape_ids: BTreeSet::new(),
        })
    }

    /// Geometries for the requested shape ids. Shapes with fewer than two
    /// points, or absent from `shapes.txt`, have no entry.
    pub fn shape_geometries<'a>(
        &self,
        shape_ids: impl IntoIterator<Item = &'a str>,
    ) -> HashMap<String, ShapeGeometry> {
        let Some(shapes) = &self.shapes else {
            return HashMap::new();
        };
        let wanted: HashSet<&str> = shape_ids.into_iter().collect();

        let mut points_by_shape: HashMap<&str, Vec<&Shape>> = HashMap::new();
        for shape in &shapes.rows {
            if wanted.contains(shape.shape_id.as_str()) {
                points_by_shape
                    .entry(shape.shape_id.as_str())
                    .or_default()
                    .push(shape);
            }
        }

        let mut geometries = HashMap::new();
        for (shape_id, mut points) in points_by_shape {
            points.sort_by_key(|point| point.shape_pt_sequence);
            let locations = points
                .iter()
                .map(|point| LonLat::new(point.shape_pt_lon, point.shape_pt_lat));
            if let Some(geometry) = ShapeGeometry::from_points(locations) {
                geometries.insert(shape_id.to_string(), geometry);
            }
        }
        geometries
    }

    /// Replaces the rows of each shape with its path, numbered from zero and
    /// without `shape_dist_traveled`. Rows of other shapes keep their order
    /// and come first.
    pub fn replace_shapes(&mut self, paths_by_shape: &[(&str, &[LonLat])]) {
        if paths_by_shape.is_empty() {
            return;
        }
        let replaced: HashSet<&str> = paths_by_shape.iter().map(|(id, _)| *id).collect();
        let shapes = self.shapes.get_or_insert_with(|| {
            CsvTable::from_rows(
                SHAPE_COLUMNS.iter().map(|name| name.to_string()).collect(),
                Vec::new(),
            )
        });
        shapes
            .rows
            .retain(|row| !replaced.contains(row.shape_id.as_str()));
        for (shape_id, path) in paths_by_shape {
            shapes
                .rows
                .extend(path.iter().enumerate().map(|(index, point)| Shape {
                    shape_id: shape_id.to_string(),
                    shape_pt_lat: point.lat,
                    shape_pt_lon: point.lon,
                    shape_pt_sequence: index as u32,
                    shape_dist_traveled: None,
                }));
            self.replaced_shape_ids.insert(shape_id.to_string());
        }
    }

    /// Writes the feed as a directory of `.txt` files, or as a zip archive
    /// when `path` ends in `.zip`.
    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<(), GtfsOutputError> {
        let path = path.as_ref();
        let files = self.output_files()?;
        if is_zip_path(path) {
            write_zip(path, &files)
        } else {
            write_directory(path, &files)
        }
    }

    fn output_files(&self) -> Result<Vec<(String, Vec<u8>)>, GtfsOutputError> {
        let mut files = self.passthrough.clone();
        let source = self.passthrough.get(SHAPES_FILE);
        if let Some(shapes) = &self.shapes {
            if source.is_none() || !self.replaced_shape_ids.is_empty() {
                let data = self.write_shapes(shapes, source.map(Vec::as_slice))?;
                files.insert(SHAPES_FILE.to_string(), data);
            }
        }
        Ok(files.into_iter().collect())
    }

    /// Serializes `shapes.txt`. Records of untouched shapes are copied from
    /// `source` as they are, under its header line; replaced shapes follow.
    fn write_shapes(
        &self,
        shapes: &CsvTable<Shape>,
        source: Option<&[u8]>,
    ) -> Result<Vec<u8>, GtfsOutputError> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());

        let columns: Vec<String> = match source {
            Some(data) => {
                let mut reader = csv::ReaderBuilder::new()
                    .flexible(true)
                    .from_reader(strip_utf8_bom(data));
                let header = reader.headers().map_err(shapes_csv_error)?.clone();
                writer.write_record(&header).map_err(shapes_csv_error)?;
                let columns: Vec<String> = header
                    .iter()
                    .map(|name| name.trim().to_ascii_lowercase())
                    .collect();
                let id_index = columns.iter().position(|name| name == "shape_id");
                for record in reader.records() {
                    let record = record.map_err(shapes_csv_error)?;
                    let shape_id = id_index
                        .and_then(|index| record.get(index))
                        .map(str::trim)
                        .unwrap_or_default();
                    if !self.replaced_shape_ids.contains(shape_id) {
                        writer.write_record(&record).map_err(shapes_csv_error)?;
                    }
                }
                columns
            }
            None => {
                let columns = if shapes.headers.is_empty() {
                    SHAPE_COLUMNS.iter().map(|name| name.to_string()).collect()
                } else {
                    shapes.headers.clone()
                };
                writer.write_record(&columns).map_err(shapes_csv_error)?;
                columns
            }
        };

        let rows = shapes
            .rows
            .iter()
            .filter(|row| source.is_none() || self.replaced_shape_ids.contains(&row.shape_id));
        for row in rows {
            writer
                .write_record(columns.iter().map(|column| shape_field(row, column)))
                .map_err(shapes_csv_error)?;
        }
        writer.into_inner().map_err(|err| GtfsOutputError::Io {
            path: PathBuf::from(SHAPES_FILE),
            source: err.into_error(),
        })
    }
}

fn shape_field(row: &Shape, column: &str) -> String {
    match column {
        "shape_id" => row.shape_id.clone(),
        "shape_pt_lat" => row.shape_pt_lat.to_string(),
        "shape_pt_lon" => row.shape_pt_lon.to_string(),
        "shape_pt_sequence" => row.shape_pt_sequence.to_string(),
        "shape_dist_traveled" => row
            .shape_dist_traveled
            .map(|dist| dist.to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn shapes_csv_error(err: csv::Error) -> GtfsOutputError {
    let line = err.position().map(|pos| pos.line());
    GtfsOutputError::Csv(CsvParseError::new(SHAPES_FILE, line, err.to_string()))
}

fn write_directory(path: &Path, files: &[(String, Vec<u8>)]) -> Result<(), GtfsOutputError> {
    fs::create_dir_all(path).map_err(|source| GtfsOutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    for (name, data) in files {
        let file_path = path.join(name);
        fs::write(&file_path, data).map_err(|source| GtfsOutputError::Io {
            path: file_path,
            source,
        })?;
    }
    Ok(())
}

fn write_zip(path: &Path, files: &[(String, Vec<u8>)]) -> Result<(), GtfsOutputError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| GtfsOutputError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = File::create(path).map_err(|source| GtfsOutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let zip_err = |source: zip::result::ZipError| GtfsOutputError::Zip {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in files {
        writer.start_file(name.as_str(), options).map_err(zip_err)?;
        writer
            .write_all(data)
            .map_err(|source| GtfsOutputError::Io {
                path: path.join(name),
                source,
            })?;
    }
    writer.finish().map_err(zip_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        std::env::temp_dir().join(format!("{}_{}_{}", prefix, std::process::id(), nanos))
    }

    fn write_minimal_feed(dir: &Path) {
        fs::create_dir_all(dir).expect("create dir");
        fs::write(
            dir.join("agency.txt"),
            "agency_id,agency_name,agency_url,agency_timezone\nA,Agency,https://example.com,UTC\n",
        )
        .expect("write");
        fs::write(
            dir.join(STOPS_FILE),
            "stop_id,stop_name,stop_lat,stop_lon,wheelchair_boarding\n\
             S1,One,0.0,0.0,1\n\
             S2,Two,0.0,1.0,0\n",
        )
        .expect("write");
        fs::write(dir.join(ROUTES_FILE), "route_id,route_type\nR1,3\n").expect("write");
        fs::write(
            dir.join(TRIPS_FILE),
            "route_id,service_id,trip_id,shape_id\nR1,WK,T1,SH1\n",
        )
        .expect("write");
        fs::write(
            dir.join(STOP_TIMES_FILE),
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,08:00:00,08:00:00,S1,1\n\
             T1,08:10:00,08:10:00,S2,2\n",
        )
        .expect("write");
        fs::write(
            dir.join(SHAPES_FILE),
            "shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence,shape_color\n\
             SH1,0.0,1.0,2,red\n\
             SH1,0.0,0.0,1,red\n\
             LONE,5.0,5.0,1,blue\n",
        )
        .expect("write");
    }

    #[test]
    fn loads_tables_and_keeps_other_files() {
        let dir = temp_dir("gtfs_feed_load");
        write_minimal_feed(&dir);

        let feed = GtfsFeed::from_input(&GtfsInput::from_path(&dir).unwrap()).unwrap();
        assert_eq!(feed.trips.rows.len(), 1);
        assert_eq!(feed.stop_times.rows.len(), 2);
        assert_eq!(feed.shapes.as_ref().map(|s| s.rows.len()), Some(3));
        assert!(feed.passthrough.contains_key("agency.txt"));
        assert!(feed.passthrough.contains_key(STOPS_FILE));
        assert!(feed.passthrough.contains_key(SHAPES_FILE));
        assert!(feed.replaced_shape_ids.is_empty());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let dir = temp_dir("gtfs_feed_missing");
        write_minimal_feed(&dir);
        fs::remove_file(dir.join(TRIPS_FILE)).expect("remove");

        let err = GtfsFeed::from_input(&GtfsInput::from_path(&dir).unwrap()).unwrap_err();
        assert!(matches!(err, GtfsInputError::MissingFile(name) if name == TRIPS_FILE));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn builds_geometries_in_sequence_order() {
        let feed = GtfsFeed {
            shapes: Some(CsvTable {
                headers: Vec::new(),
                rows: vec![
                    Shape {
                        shape_id: "SH1".into(),
                        shape_pt_lon: 1.0,
                        shape_pt_sequence: 2,
                        ..Default::default()
                    },
                    Shape {
                        shape_id: "SH1".into(),
                        shape_pt_lon: 0.0,
                        shape_pt_sequence: 1,
                        ..Default::default()
                    },
                    Shape {
                        shape_id: "LONE".into(),
                        shape_pt_sequence: 1,
                        ..Default::default()
                    },
                ],
            }),
            ..Default::default()
        };

        let geometries = feed.shape_geometries(["SH1", "LONE", "NONE"]);
        assert_eq!(geometries.len(), 1);
        let first = geometries["SH1"].vertices().next().unwrap();
        assert_eq!(first, LonLat::new(0.0, 0.0));
    }

    #[test]
    fn writes_directory_and_zip_round_trip() {
        let dir = temp_dir("gtfs_feed_write_src");
        write_minimal_feed(&dir);
        let feed = GtfsFeed::from_input(&GtfsInput::from_path(&dir).unwrap()).unwrap();

        let out_dir = temp_dir("gtfs_feed_write_dir");
        feed.write_to_path(&out_dir).unwrap();
        assert_eq!(
            fs::read(out_dir.join(STOPS_FILE)).unwrap(),
            fs::read(dir.join(STOPS_FILE)).unwrap()
        );
        assert_eq!(
            fs::read(out_dir.join(SHAPES_FILE)).unwrap(),
            fs::read(dir.join(SHAPES_FILE)).unwrap()
        );

        let zip_path = temp_dir("gtfs_feed_write_zip").with_extension("zip");
        feed.write_to_path(&zip_path).unwrap();
        let zipped = GtfsFeed::from_input(&GtfsInput::from_path(&zip_path).unwrap()).unwrap();
        assert_eq!(zipped.trips.rows.len(), 1);
        assert_eq!(zipped.passthrough.len(), feed.passthrough.len());
        assert_eq!(zipped.shapes.unwrap().rows.len(), 3);

        fs::remove_dir_all(&dir).ok();
        fs::remove_dir_all(&out_dir).ok();
        fs::remove_file(&zip_path).ok();
    }

    #[test]
    fn rewrites_only_replaced_shapes() {
        let dir = temp_dir("gtfs_feed_replace_src");
        write_minimal_feed(&dir);
        let mut feed = GtfsFeed::from_input(&GtfsInput::from_path(&dir).unwrap()).unwrap();

        let path = [LonLat::new(2.5, 1.5), LonLat::new(3.0, 1.0)];
        let paths: Vec<(&str, &[LonLat])> = vec![("LONE", &path)];
        feed.replace_shapes(&paths);
        assert_eq!(feed.replaced_shape_ids.len(), 1);
        let rows = &feed.shapes.as_ref().unwrap().rows;
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2].shape_pt_sequence, 0);

        let out_dir = temp_dir("gtfs_feed_replace_out");
        feed.write_to_path(&out_dir).unwrap();
        let written = fs::read_to_string(out_dir.join(SHAPES_FILE)).unwrap();
        assert_eq!(
            written,
            "shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence,shape_color\n\
             SH1,0.0,1.0,2,red\n\
             SH1,0.0,0.0,1,red\n\
             LONE,1.5,2.5,0,\n\
             LONE,1,3,1,\n"
        );

        fs::remove_dir_all(&dir).ok();
        fs::remove_dir_all(&out_dir).ok();
    }

    #[test]
    fn writes_new_shapes_file_with_standard_columns() {
        let mut feed = GtfsFeed::default();
        let path = [LonLat::new(1.0, 2.0)];
        let paths: Vec<(&str, &[LonLat])> = vec![("NEW", &path)];
        feed.replace_shapes(&paths);

        let files = feed.output_files().unwrap();
        let (_, data) = files
            .iter()
            .find(|(name, _)| name == SHAPES_FILE)
            .expect("shapes file");
        assert_eq!(
            String::from_utf8(data.clone()).unwrap(),
            "shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence,shape_dist_traveled\n\
             NEW,2,1,0,\n"
        );
    }
}
