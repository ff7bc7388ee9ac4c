use csv::{ReaderBuilder, StringRecord, Trim};
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{file}: line {line_index:?}: {message}")]
pub struct CsvParseError {
    pub file: String,
    pub line_index: Option<u64>,
    pub message: String,
}

impl CsvParseError {
    pub(crate) fn new(file: &str, line_index: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            file: file.to_string(),
            line_index,
            message: message.into(),
        }
    }
}

/// Rows of one GTFS table together with its normalized header line.
#[derive(Debug, Clone)]
pub struct CsvTable<T> {
    pub headers: Vec<String>,
    pub rows: Vec<T>,
}

impl<T> Default for CsvTable<T> {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            rows: Vec::new(),
        }
    }
}

impl<T> CsvTable<T> {
    pub fn from_rows(headers: Vec<String>, rows: Vec<T>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn read_csv_table<T: DeserializeOwned>(
    file_name: &str,
    data: &[u8],
) -> Result<CsvTable<T>, CsvParseError> {
    let data = strip_utf8_bom(data);
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(data);

    let headers_record = reader
        .headers()
        .map_err(|err| CsvParseError::new(file_name, Some(1), err.to_string()))?
        .clone();
    let headers: Vec<String> = headers_record
        .iter()
        .map(|value| value.trim().to_ascii_lowercase())
        .collect();
    let normalized = StringRecord::from(headers.clone());

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|err| {
            let line = err.position().map(|pos| pos.line());
            CsvParseError::new(file_name, line, err.to_string())
        })?;
        if record.iter().all(|value| value.is_empty()) {
            continue;
        }
        let row_number = record
            .position()
            .map(|pos| pos.line())
            .unwrap_or(index as u64 + 2);
        let row: T = record
            .deserialize(Some(&normalized))
            .map_err(|err| CsvParseError::new(file_name, Some(row_number), err.to_string()))?;
        rows.push(row);
    }

    Ok(CsvTable { headers, rows })
}

pub(crate) fn strip_utf8_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_mapmatch_model::{Shape, StopTime};

    #[test]
    fn reads_rows_skipping_blank_lines() {
        let data = b"\xEF\xBB\xBFtrip_id,stop_id,stop_sequence,shape_dist_traveled\n\
            T1,S1,1,0.0\n\nT1,S2,2,\n";
        let table: CsvTable<StopTime> = read_csv_table("stop_times.txt", data).unwrap();
        assert_eq!(table.headers[0], "trip_id");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].shape_dist_traveled, Some(0.0));
        assert_eq!(table.rows[1].shape_dist_traveled, None);
        assert_eq!(table.rows[1].stop_id, "S2");
    }

    #[test]
    fn reports_row_that_fails_to_parse() {
        let data = b"shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence\n\
            A,1.0,2.0,1\nA,north,2.0,2\n";
        let err = read_csv_table::<Shape>("shapes.txt", data).unwrap_err();
        assert_eq!(err.file, "shapes.txt");
        assert_eq!(err.line_index, Some(3));
    }
}
