use ordered_float::OrderedFloat;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub mod enhancer;
pub mod error;
pub mod lookup;
pub mod trackxml;

pub use enhancer::{Enhancer, EnhancerConfig};
pub use error::{Error, ParseError, Result};
pub use lookup::{ElevationService, HttpElevationService, LookupReply};
pub use trackxml::Document;

/// Number of decimal digits kept by [`normalize`], roughly 1.1m at the equator.
pub const COORDINATE_DIGITS: usize = 5;

/// Rounds a degree value to [`COORDINATE_DIGITS`] decimal places.
///
/// Rounding goes through the exact decimal expansion of the float, so the
/// result is the nearest `f64` to the correctly rounded decimal and
/// normalizing twice gives the same value.
pub fn normalize(value: f64) -> f64 {
    format!("{:.*}", COORDINATE_DIGITS, value)
        .parse()
        .unwrap_or(value)
}

/// Parses and normalizes a raw degree value. Non-numeric and non-finite
/// input yields `None`.
pub fn normalize_str(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    value.is_finite().then(|| normalize(value))
}

/// A normalized (longitude, latitude) pair used as lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coordinate {
    lon: OrderedFloat<f64>,
    lat: OrderedFloat<f64>,
}

impl Coordinate {
    pub fn new(lon: f64, lat: f64) -> Self {
        Coordinate {
            lon: OrderedFloat(normalize(lon)),
            lat: OrderedFloat(normalize(lat)),
        }
    }

    pub fn parse(lon: &str, lat: &str) -> Option<Self> {
        Some(Coordinate {
            lon: OrderedFloat(normalize_str(lon)?),
            lat: OrderedFloat(normalize_str(lat)?),
        })
    }

    pub fn lon(&self) -> f64 {
        self.lon.0
    }

    pub fn lat(&self) -> f64 {
        self.lat.0
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lon, self.lat)
    }
}

/// Insertion-ordered map from [`Coordinate`] to an optional elevation.
///
/// Order is first-occurrence order in the source document. A `None` value
/// means the elevation is still unresolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateSet {
    entries: Vec<(Coordinate, Option<f64>)>,
    index: HashMap<Coordinate, usize>,
}

impl CoordinateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `coordinate` as unresolved. Returns false if it was already present.
    pub fn insert(&mut self, coordinate: Coordinate) -> bool {
        if self.index.contains_key(&coordinate) {
            return false;
        }
        self.index.insert(coordinate, self.entries.len());
        self.entries.push((coordinate, None));
        true
    }

    /// Records a height for a coordinate already in the set. Returns false
    /// for coordinates that were never inserted.
    pub fn set_height(&mut self, coordinate: &Coordinate, height: Option<f64>) -> bool {
        match self.index.get(coordinate) {
            Some(&i) => {
                self.entries[i].1 = height;
                true
            }
            None => false,
        }
    }

    /// `None` if absent, `Some(None)` if present but unresolved.
    pub fn get(&self, coordinate: &Coordinate) -> Option<Option<f64>> {
        self.index.get(coordinate).map(|&i| self.entries[i].1)
    }

    pub fn height(&self, coordinate: &Coordinate) -> Option<f64> {
        self.get(coordinate).flatten()
    }

    pub fn truncate(&mut self, len: usize) {
        if len >= self.entries.len() {
            return;
        }
        for (coordinate, _) in self.entries.drain(len..) {
            self.index.remove(&coordinate);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Coordinate> {
        self.entries.iter().map(|(c, _)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Coordinate, Option<f64>)> {
        self.entries.iter().map(|(c, h)| (c, *h))
    }

    pub fn unresolved_count(&self) -> usize {
        self.entries.iter().filter(|(_, h)| h.is_none()).count()
    }

    /// Share of coordinates without an elevation, 0 for an empty set.
    pub fn empty_fraction(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.unresolved_count() as f64 / self.entries.len() as f64
    }
}

impl FromIterator<(Coordinate, Option<f64>)> for CoordinateSet {
    fn from_iter<I: IntoIterator<Item = (Coordinate, Option<f64>)>>(iter: I) -> Self {
        let mut set = CoordinateSet::new();
        for (coordinate, height) in iter {
            set.insert(coordinate);
            set.set_height(&coordinate, height);
        }
        set
    }
}

/// Splits `items` into consecutive groups of at most `size` items.
/// A size of 0 is treated as 1.
pub fn chunked<T>(items: &[T], size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(size.max(1))
}

/// Supported track file dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Tcx,
    Gpx,
}

impl Format {
    /// Infers the format from a file extension.
    pub fn guess(path: &Path) -> Result<Format> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| Error::UnknownFormat(path.display().to_string()))?;
        ext.parse()
    }

    /// Local name of the trackpoint element.
    pub fn trackpoint_tag(self) -> &'static [u8] {
        match self {
            Format::Tcx => b"Trackpoint",
            Format::Gpx => b"trkpt",
        }
    }

    /// Local name of the elevation element appended to each trackpoint.
    pub fn elevation_tag(self) -> &'static str {
        match self {
            Format::Tcx => "AltitudeMeters",
            Format::Gpx => "ele",
        }
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Format> {
        match s.to_ascii_lowercase().as_str() {
            "tcx" => Ok(Format::Tcx),
            "gpx" => Ok(Format::Gpx),
            _ => Err(Error::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Tcx => f.write_str("tcx"),
            Format::Gpx => f.write_str("gpx"),
        }
    }
}
