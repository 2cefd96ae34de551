//! Coordinate resolution for user-supplied locations
//!
//! Accepts either a British National Grid reference (`SU372155`, `SU 37200 15500`, `S 12 34`)
//! or a decimal `lat,long` pair and produces a WGS84 [`Coordinate`]. Grid references are
//! projected from EPSG:27700 (Airy 1830, transverse Mercator) and shifted to WGS84 with the
//! standard OSGB36 seven-parameter Helmert transform.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::sync::OnceLock;

/// Airy 1830 semi-major axis in meters
const AIRY_A: f64 = 6_377_563.396;
/// Airy 1830 semi-minor axis in meters
const AIRY_B: f64 = 6_356_256.909;

/// WGS84 semi-major axis in meters
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 semi-minor axis in meters
const WGS84_B: f64 = 6_356_752.314245;

/// National Grid scale factor on the central meridian
const SCALE_FACTOR: f64 = 0.9996012717;
/// True origin latitude in degrees
const ORIGIN_LAT: f64 = 49.0;
/// Central meridian in degrees
const ORIGIN_LON: f64 = -2.0;
/// False easting of the true origin in meters
const FALSE_EASTING: f64 = 400_000.0;
/// False northing of the true origin in meters
const FALSE_NORTHING: f64 = -100_000.0;

/// OSGB36 -> WGS84 translation in meters (tx, ty, tz)
const HELMERT_TRANSLATION: [f64; 3] = [446.448, -125.157, 542.06];
/// OSGB36 -> WGS84 rotation in arc-seconds (rx, ry, rz), position-vector convention
const HELMERT_ROTATION: [f64; 3] = [0.15, 0.247, 0.842];
/// OSGB36 -> WGS84 scale change in parts per million
const HELMERT_SCALE_PPM: f64 = -20.489;

/// Size of one first-level grid square in meters
const SQUARE_500KM: u32 = 500_000;
/// Size of one second-level grid square in meters
const SQUARE_100KM: u32 = 100_000;

/// Smallest and largest accepted value for either half of a decimal pair
const POLAR_LIMIT: f64 = 180.0;

/// A validated WGS84 position in decimal degrees
///
/// Only produced by [`convert`]; both components are guaranteed finite and within
/// `[-180, 180]`. Serializes as `[latitude, longitude]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

impl Coordinate {
    #[inline]
    fn checked(lat: f64, lon: f64) -> Option<Self> {
        if is_valid_polar(lat) && is_valid_polar(lon) {
            Some(Self { lat, lon })
        } else {
            None
        }
    }

    /// Latitude in degrees
    #[inline]
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude in degrees
    #[inline]
    pub fn lon(&self) -> f64 {
        self.lon
    }
}

impl From<Coordinate> for geo::Coord<f64> {
    fn from(coordinate: Coordinate) -> Self {
        geo::Coord {
            x: coordinate.lon,
            y: coordinate.lat,
        }
    }
}

impl Serialize for Coordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq([self.lat, self.lon])
    }
}

fn grid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Z])([A-Z]?)([0-9]*)$").expect("grid reference regex must compile")
    })
}

/// Validate a location and return it as latitude/longitude.
///
/// Input is upper-cased and stripped of whitespace, then tried first as a National Grid
/// reference and then as a `lat,long` pair. Returns `None` for anything else.
pub fn convert(text: &str) -> Option<Coordinate> {
    let pos: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    if let Some(coordinate) = grid_ref_to_lat_lon(&pos) {
        return Some(coordinate);
    }

    let tokens: Vec<&str> = pos.split(',').collect();
    if tokens.len() != 2 {
        tracing::debug!(
            "'{}' is not a valid position. It must be either a UK grid reference or two decimal numbers separated by a comma.",
            pos
        );
        return None;
    }

    let first = parse_polar(tokens[0])?;
    let second = parse_polar(tokens[1])?;

    // Reversed lat/long: within the supported region latitude is always the larger value.
    if first < second {
        Coordinate::checked(second, first)
    } else {
        Coordinate::checked(first, second)
    }
}

/// Convert a National Grid reference to absolute (easting, northing) in meters.
///
/// The prefix is a first-level 500km letter (`S`, `T`, `N`, `O`, `H`) optionally followed by
/// a 100km letter (`A`-`Z` without `I`). The digits are split into two equal halves, each
/// right-padded to 5 digits (1m resolution).
pub fn grid_ref_to_easting_northing(ngr: &str) -> Option<(u32, u32)> {
    let caps = grid_pattern().captures(ngr)?;
    let major = caps.get(1)?.as_str().chars().next()?;
    let minor = caps.get(2).and_then(|m| m.as_str().chars().next());
    let digits = caps.get(3).map_or("", |m| m.as_str());

    let (mut easting, mut northing) = match major {
        'S' => (0, 0),
        'T' => (SQUARE_500KM, 0),
        'N' => (0, SQUARE_500KM),
        'O' => (SQUARE_500KM, SQUARE_500KM),
        'H' => (0, 2 * SQUARE_500KM),
        _ => {
            tracing::debug!("'{}' has no valid 500km square letter", ngr);
            return None;
        }
    };

    if let Some(minor) = minor {
        let (column, row) = square_index(minor)?;
        easting += column * SQUARE_100KM;
        northing += row * SQUARE_100KM;
    }

    if digits.len() % 2 == 1 || digits.len() < 2 || digits.len() > 10 {
        tracing::debug!("'{}' has an invalid number of grid digits", ngr);
        return None;
    }

    let (east_digits, north_digits) = digits.split_at(digits.len() / 2);
    easting += partial_grid_ref(east_digits)?;
    northing += partial_grid_ref(north_digits)?;

    Some((easting, northing))
}

/// Column and row (counted from the south) of a 100km letter within its 500km square.
#[inline]
fn square_index(letter: char) -> Option<(u32, u32)> {
    if !letter.is_ascii_uppercase() || letter == 'I' {
        return None;
    }
    let mut index = letter as u32 - 'A' as u32;
    if index > 8 {
        index -= 1;
    }
    Some((index % 5, 4 - index / 5))
}

/// Right-pad up to 5 digits with zeros and parse as meters.
#[inline]
fn partial_grid_ref(digits: &str) -> Option<u32> {
    format!("{digits:0<5}").parse().ok()
}

fn grid_ref_to_lat_lon(ngr: &str) -> Option<Coordinate> {
    let (easting, northing) = grid_ref_to_easting_northing(ngr)?;
    let (lat, lon) = national_grid_to_wgs84(f64::from(easting), f64::from(northing));
    Coordinate::checked(lat, lon)
}

/// Project National Grid (easting, northing) to WGS84 (lat, lon) in degrees.
pub fn national_grid_to_wgs84(easting: f64, northing: f64) -> (f64, f64) {
    let (lat, lon) = inverse_transverse_mercator(easting, northing);
    osgb36_to_wgs84(lat, lon)
}

/// Inverse transverse Mercator on the Airy 1830 ellipsoid, returning OSGB36 radians.
fn inverse_transverse_mercator(easting: f64, northing: f64) -> (f64, f64) {
    let a = AIRY_A;
    let b = AIRY_B;
    let f0 = SCALE_FACTOR;
    let lat0 = ORIGIN_LAT.to_radians();
    let lon0 = ORIGIN_LON.to_radians();
    let e2 = 1.0 - (b * b) / (a * a);
    let n = (a - b) / (a + b);
    let (n2, n3) = (n * n, n * n * n);

    let meridional_arc = |lat: f64| {
        let ma = (1.0 + n + 1.25 * n2 + 1.25 * n3) * (lat - lat0);
        let mb = (3.0 * n + 3.0 * n2 + 21.0 / 8.0 * n3) * (lat - lat0).sin() * (lat + lat0).cos();
        let mc = (15.0 / 8.0 * n2 + 15.0 / 8.0 * n3)
            * (2.0 * (lat - lat0)).sin()
            * (2.0 * (lat + lat0)).cos();
        let md = 35.0 / 24.0 * n3 * (3.0 * (lat - lat0)).sin() * (3.0 * (lat + lat0)).cos();
        b * f0 * (ma - mb + mc - md)
    };

    let mut lat = lat0;
    let mut m = 0.0;
    loop {
        lat += (northing - FALSE_NORTHING - m) / (a * f0);
        m = meridional_arc(lat);
        if (northing - FALSE_NORTHING - m).abs() < 1e-5 {
            break;
        }
    }

    let (sin_lat, cos_lat, tan_lat) = (lat.sin(), lat.cos(), lat.tan());
    let nu = a * f0 / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let rho = a * f0 * (1.0 - e2) / (1.0 - e2 * sin_lat * sin_lat).powf(1.5);
    let eta2 = nu / rho - 1.0;
    let (t2, t4, t6) = (tan_lat.powi(2), tan_lat.powi(4), tan_lat.powi(6));

    let vii = tan_lat / (2.0 * rho * nu);
    let viii = tan_lat / (24.0 * rho * nu.powi(3)) * (5.0 + 3.0 * t2 + eta2 - 9.0 * t2 * eta2);
    let ix = tan_lat / (720.0 * rho * nu.powi(5)) * (61.0 + 90.0 * t2 + 45.0 * t4);
    let x = 1.0 / (cos_lat * nu);
    let xi = 1.0 / (cos_lat * 6.0 * nu.powi(3)) * (nu / rho + 2.0 * t2);
    let xii = 1.0 / (cos_lat * 120.0 * nu.powi(5)) * (5.0 + 28.0 * t2 + 24.0 * t4);
    let xiia = 1.0 / (cos_lat * 5040.0 * nu.powi(7)) * (61.0 + 662.0 * t2 + 1320.0 * t4 + 720.0 * t6);

    let de = easting - FALSE_EASTING;
    let lat = lat - vii * de.powi(2) + viii * de.powi(4) - ix * de.powi(6);
    let lon = lon0 + x * de - xi * de.powi(3) + xii * de.powi(5) - xiia * de.powi(7);
    (lat, lon)
}

/// Shift OSGB36 geodetic radians to WGS84 degrees via geocentric cartesian coordinates.
fn osgb36_to_wgs84(lat: f64, lon: f64) -> (f64, f64) {
    let e2 = 1.0 - (AIRY_B * AIRY_B) / (AIRY_A * AIRY_A);
    let nu = AIRY_A / (1.0 - e2 * lat.sin().powi(2)).sqrt();
    let x1 = nu * lat.cos() * lon.cos();
    let y1 = nu * lat.cos() * lon.sin();
    let z1 = nu * (1.0 - e2) * lat.sin();

    let [tx, ty, tz] = HELMERT_TRANSLATION;
    let [rx, ry, rz] = HELMERT_ROTATION.map(|seconds| (seconds / 3600.0).to_radians());
    let s = 1.0 + HELMERT_SCALE_PPM * 1e-6;

    let x2 = tx + s * (x1 - rz * y1 + ry * z1);
    let y2 = ty + s * (rz * x1 + y1 - rx * z1);
    let z2 = tz + s * (-ry * x1 + rx * y1 + z1);

    let e2 = 1.0 - (WGS84_B * WGS84_B) / (WGS84_A * WGS84_A);
    let p = x2.hypot(y2);
    let mut lat = z2.atan2(p * (1.0 - e2));
    for _ in 0..10 {
        let nu = WGS84_A / (1.0 - e2 * lat.sin().powi(2)).sqrt();
        lat = (z2 + e2 * nu * lat.sin()).atan2(p);
    }
    let lon = y2.atan2(x2);
    (lat.to_degrees(), lon.to_degrees())
}

#[inline]
fn is_valid_polar(value: f64) -> bool {
    value.is_finite() && (-POLAR_LIMIT..=POLAR_LIMIT).contains(&value)
}

fn parse_polar(token: &str) -> Option<f64> {
    match token.parse::<f64>() {
        Ok(value) if is_valid_polar(value) => Some(value),
        _ => {
            tracing::debug!("{} is not a valid coordinate", token);
            None
        }
    }
}

/// Map a legacy OpenSpace scale value to the nearest Data Hub zoom level.
///
/// Unmatched values return `default`.
pub fn scale_to_zoom(scale: f64, default: f64) -> f64 {
    const SCALE_LIST: [(f64, f64); 14] = [
        (2500.0, 0.0),
        (1000.0, 0.0),
        (500.0, 1.0),
        (200.0, 2.0),
        (100.0, 3.0),
        (50.0, 4.0),
        (25.0, 5.0),
        (10.0, 6.0),
        (5.0, 7.0),
        (4.0, 8.0),
        (3.0, 9.0),
        (2.5, 9.0),
        (2.0, 10.0),
        (1.0, 11.0),
    ];
    SCALE_LIST
        .iter()
        .find(|(key, _)| *key == scale)
        .map_or(default, |(_, zoom)| *zoom)
}
