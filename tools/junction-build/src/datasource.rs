//! Input classification
//!
//! Groups the configured input locations by data type. A location is typed
//! either by an explicit tag (`gtfs:/data/feed`) or by its file name.

use junction_common::{suggest_correction, Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Build configuration file looked up in the graph directory
pub const BUILD_CONFIG_FILENAME: &str = "build-config.json";
/// Street graph persisted by `--save-street-graph`
pub const STREET_GRAPH_FILENAME: &str = "streetGraph.json";
/// Complete graph persisted by `--save`
pub const GRAPH_FILENAME: &str = "graph.json";
pub const REPORT_DIRNAME: &str = "report";
pub const CACHE_DIRNAME: &str = "cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FileType {
    /// OpenStreetMap street network
    Osm,
    /// GTFS schedule feed
    Gtfs,
    /// NeTEx schedule export
    Netex,
    /// Elevation raster
    Dem,
}

impl FileType {
    pub const ALL: [FileType; 4] = [FileType::Osm, FileType::Gtfs, FileType::Netex, FileType::Dem];

    pub fn tag(self) -> &'static str {
        match self {
            FileType::Osm => "osm",
            FileType::Gtfs => "gtfs",
            FileType::Netex => "netex",
            FileType::Dem => "dem",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.tag().eq_ignore_ascii_case(tag.trim()))
    }

    /// Infer the type from a file name
    pub fn from_file_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.ends_with(".pbf") || name.ends_with(".osm") || name.ends_with(".osm.xml") {
            Some(FileType::Osm)
        } else if name.contains("gtfs") {
            Some(FileType::Gtfs)
        } else if name.contains("netex") {
            Some(FileType::Netex)
        } else if name.ends_with(".hgt") || name.ends_with(".tif") || name.ends_with(".tiff") {
            Some(FileType::Dem)
        } else {
            None
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// An input location as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLocation {
    pub path: PathBuf,
    pub declared_type: Option<String>,
}

impl InputLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            declared_type: None,
        }
    }

    pub fn tagged(tag: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            declared_type: Some(tag.into()),
        }
    }

    /// Parse a command-line argument of the form `tag:path` or `path`.
    ///
    /// Anything before the first `:` counts as a tag only when it looks like
    /// one (letters only), so Windows drive letters and plain paths pass
    /// through untouched.
    pub fn parse_arg(arg: &str) -> Self {
        match arg.split_once(':') {
            Some((tag, path))
                if tag.len() > 1 && !path.is_empty() && tag.chars().all(|c| c.is_ascii_alphabetic()) =>
            {
                Self::tagged(tag, path)
            }
            _ => Self::new(arg),
        }
    }
}

/// A classified input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataSource {
    pub path: PathBuf,
    pub file_type: FileType,
}

impl DataSource {
    pub fn new(file_type: FileType, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file_type,
        }
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Inputs grouped by type, plus the build's working directories
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataSourceSet {
    sources: BTreeMap<FileType, Vec<DataSource>>,
    cache_dir: PathBuf,
    report_dir: PathBuf,
}

impl DataSourceSet {
    pub fn with_directories(mut self, cache_dir: impl Into<PathBuf>, report_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self.report_dir = report_dir.into();
        self
    }

    /// True when at least one source of this type is present
    pub fn has(&self, file_type: FileType) -> bool {
        self.sources.get(&file_type).is_some_and(|s| !s.is_empty())
    }

    pub fn get(&self, file_type: FileType) -> &[DataSource] {
        self.sources.get(&file_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    pub fn len(&self) -> usize {
        self.sources.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataSource> {
        self.sources.values().flatten()
    }

    fn push(&mut self, source: DataSource) {
        self.sources.entry(source.file_type).or_default().push(source);
    }
}

impl FromIterator<DataSource> for DataSourceSet {
    fn from_iter<I: IntoIterator<Item = DataSource>>(iter: I) -> Self {
        let mut set = DataSourceSet::default();
        for source in iter {
            set.push(source);
        }
        set
    }
}

/// Classify input locations into a [`DataSourceSet`].
///
/// Grouping is lossless and keeps the input order within each type. The first
/// location whose type cannot be determined fails the whole classification.
pub fn classify<I>(locations: I) -> Result<DataSourceSet>
where
    I: IntoIterator<Item = InputLocation>,
{
    let tags: Vec<&str> = FileType::ALL.iter().map(|t| t.tag()).collect();
    let mut set = DataSourceSet::default();

    for location in locations {
        let file_type = match &location.declared_type {
            Some(tag) => FileType::from_tag(tag).ok_or_else(|| Error::UnrecognizedInput {
                location: location.path.display().to_string(),
                reason: format!("unknown type tag '{tag}'"),
                suggestion: suggest_correction(tag, &tags),
            })?,
            None => {
                let name = location
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                FileType::from_file_name(&name).ok_or_else(|| Error::UnrecognizedInput {
                    location: location.path.display().to_string(),
                    reason: "file name matches no known input type".to_string(),
                    suggestion: None,
                })?
            }
        };
        set.push(DataSource::new(file_type, location.path));
    }

    Ok(set)
}

/// List the input candidates of a graph directory, sorted by name.
///
/// Build outputs and configuration (`build-config.json`, persisted graphs,
/// the report and cache directories) and hidden entries are skipped.
pub fn scan_directory(dir: &Path) -> Result<Vec<InputLocation>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.')
            || name == BUILD_CONFIG_FILENAME
            || name == STREET_GRAPH_FILENAME
            || name == GRAPH_FILENAME
            || name == REPORT_DIRNAME
            || name == CACHE_DIRNAME
        {
            continue;
        }
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries.into_iter().map(InputLocation::new).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_convention() {
        assert_eq!(FileType::from_file_name("belgium-latest.osm.pbf"), Some(FileType::Osm));
        assert_eq!(FileType::from_file_name("city.osm"), Some(FileType::Osm));
        assert_eq!(FileType::from_file_name("rut-gtfs"), Some(FileType::Gtfs));
        assert_eq!(FileType::from_file_name("NETEX_export.xml"), Some(FileType::Netex));
        assert_eq!(FileType::from_file_name("N50E004.hgt"), Some(FileType::Dem));
        assert_eq!(FileType::from_file_name("dem.tif"), Some(FileType::Dem));
        assert_eq!(FileType::from_file_name("notes.txt"), None);
    }

    #[test]
    fn test_classify_groups_in_input_order() {
        let set = classify(vec![
            InputLocation::new("b.hgt"),
            InputLocation::new("city.osm.pbf"),
            InputLocation::new("a.hgt"),
            InputLocation::tagged("GTFS", "feeds/local"),
        ])
        .unwrap();

        assert!(set.has(FileType::Osm));
        assert!(set.has(FileType::Gtfs));
        assert!(!set.has(FileType::Netex));
        let dems: Vec<_> = set.get(FileType::Dem).iter().map(|s| s.name()).collect();
        assert_eq!(dems, vec!["b.hgt", "a.hgt"]);
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let inputs = vec![
            InputLocation::new("city.osm.pbf"),
            InputLocation::new("netex.xml"),
            InputLocation::new("N50E004.hgt"),
        ];
        assert_eq!(classify(inputs.clone()).unwrap(), classify(inputs).unwrap());
    }

    #[test]
    fn test_unrecognized_file_name() {
        let err = classify(vec![InputLocation::new("data/readme.md")]).unwrap_err();
        match err {
            Error::UnrecognizedInput { location, suggestion, .. } => {
                assert_eq!(location, "data/readme.md");
                assert_eq!(suggestion, None);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_tag_suggests_correction() {
        let err = classify(vec![InputLocation::tagged("gtsf", "feed")]).unwrap_err();
        assert!(err.to_string().contains("did you mean 'gtfs'"), "{err}");
    }

    #[test]
    fn test_empty_type_is_absent() {
        let set = DataSourceSet::default();
        assert!(!set.has(FileType::Osm));
        assert!(set.get(FileType::Osm).is_empty());
        assert!(set.is_empty());
    }

    #[test]
    fn test_parse_arg() {
        assert_eq!(
            InputLocation::parse_arg("gtfs:/data/feed"),
            InputLocation::tagged("gtfs", "/data/feed")
        );
        assert_eq!(InputLocation::parse_arg("/data/city.osm.pbf"), InputLocation::new("/data/city.osm.pbf"));
        assert_eq!(InputLocation::parse_arg("C:\\data\\x.hgt"), InputLocation::new("C:\\data\\x.hgt"));
    }

    #[test]
    fn test_scan_directory_skips_outputs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["city.osm.pbf", BUILD_CONFIG_FILENAME, STREET_GRAPH_FILENAME, ".hidden"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join(REPORT_DIRNAME)).unwrap();
        fs::create_dir(dir.path().join("gtfs")).unwrap();

        let found = scan_directory(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|l| l.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["city.osm.pbf", "gtfs"]);
    }
}
