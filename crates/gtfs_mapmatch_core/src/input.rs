use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use zip::ZipArchive;

use crate::csv_reader::{read_csv_table, CsvParseError, CsvTable};

#[derive(Debug, thiserror::Error)]
pub enum GtfsInputError {
    #[error("input path does not exist: {0}")]
    MissingPath(PathBuf),
    #[error("input path is neither a directory nor a zip file: {0}")]
    InvalidPath(PathBuf),
    #[error("invalid zip archive: {0}")]
    InvalidZip(PathBuf),
    #[error("missing required file: {0}")]
    MissingFile(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("zip error on {file}: {source}")]
    ZipFile {
        file: String,
        #[source]
        source: zip::result::ZipError,
    },
    #[error(transparent)]
    Csv(#[from] CsvParseError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GtfsInputSource {
    Directory,
    Zip,
}

/// A GTFS dataset on disk, either an unpacked directory or a zip archive.
#[derive(Debug, Clone)]
pub struct GtfsInput {
    path: PathBuf,
    source: GtfsInputSource,
}

impl GtfsInput {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GtfsInputError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(GtfsInputError::MissingPath(path));
        }
        let source = if path.is_dir() {
            GtfsInputSource::Directory
        } else if is_zip_path(&path) {
            GtfsInputSource::Zip
        } else {
            return Err(GtfsInputError::InvalidPath(path));
        };
        Ok(Self { path, source })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &GtfsInputSource {
        &self.source
    }

    pub fn reader(&self) -> GtfsInputReader {
        GtfsInputReader {
            path: self.path.clone(),
            source: self.source.clone(),
        }
    }
}

pub struct GtfsInputReader {
    path: PathBuf,
    source: GtfsInputSource,
}

impl GtfsInputReader {
    /// Names of every regular file in the dataset, without directory prefixes.
    pub fn list_files(&self) -> Result<Vec<String>, GtfsInputError> {
        let mut names = match self.source {
            GtfsInputSource::Directory => {
                let entries = fs::read_dir(&self.path).map_err(|source| GtfsInputError::Io {
                    path: self.path.clone(),
                    source,
                })?;
                let mut names = Vec::new();
                for entry in entries {
                    let entry = entry.map_err(|source| GtfsInputError::Io {
                        path: self.path.clone(),
                        source,
                    })?;
                    if entry.path().is_file() {
                        names.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
                names
            }
            GtfsInputSource::Zip => {
                let archive = self.open_archive()?;
                archive
                    .file_names()
                    .filter(|name| !name.ends_with('/'))
                    .filter(|name| !name.starts_with("__MACOSX"))
                    .map(|name| name.rsplit('/').next().unwrap_or(name).to_string())
                    .collect()
            }
        };
        names.sort();
        names.dedup();
        Ok(names)
    }

    pub fn read_file(&self, file_name: &str) -> Result<Option<Vec<u8>>, GtfsInputError> {
        match self.source {
            GtfsInputSource::Directory => {
                let path = self.path.join(file_name);
                if !path.is_file() {
                    return Ok(None);
                }
                fs::read(&path)
                    .map(Some)
                    .map_err(|source| GtfsInputError::Io { path, source })
            }
            GtfsInputSource::Zip => {
                let mut archive = self.open_archive()?;
                let entry_name = archive
                    .file_names()
                    .filter(|name| !name.starts_with("__MACOSX"))
                    .find(|name| *name == file_name || name.ends_with(&format!("/{}", file_name)))
                    .map(str::to_string);
                let Some(entry_name) = entry_name else {
                    return Ok(None);
                };
                let mut entry =
                    archive
                        .by_name(&entry_name)
                        .map_err(|source| GtfsInputError::ZipFile {
                            file: file_name.to_string(),
                            source,
                        })?;
                let mut data = Vec::new();
                entry
                    .read_to_end(&mut data)
                    .map_err(|source| GtfsInputError::Io {
                        path: self.path.join(file_name),
                        source,
                    })?;
                Ok(Some(data))
            }
        }
    }

    pub fn read_optional_csv<T: DeserializeOwned>(
        &self,
        file_name: &str,
    ) -> Result<Option<CsvTable<T>>, GtfsInputError> {
        match self.read_file(file_name)? {
            Some(data) => Ok(Some(read_csv_table(file_name, &data)?)),
            None => Ok(None),
        }
    }

    pub fn read_required_csv<T: DeserializeOwned>(
        &self,
        file_name: &str,
    ) -> Result<CsvTable<T>, GtfsInputError> {
        self.read_optional_csv(file_name)?
            .ok_or_else(|| GtfsInputError::MissingFile(file_name.to_string()))
    }

    fn open_archive(&self) -> Result<ZipArchive<File>, GtfsInputError> {
        let file = File::open(&self.path).map_err(|source| GtfsInputError::Io {
            path: self.path.clone(),
            source,
        })?;
        ZipArchive::new(file).map_err(|_| GtfsInputError::InvalidZip(self.path.clone()))
    }
}

pub(crate) fn is_zip_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}
