//! Stored plugin defaults, site layout and boundary conversions
//!
//! Raw option values arrive as strings or loosely typed JSON. They are converted into typed
//! values here so the rest of the compiler never inspects strings like `"mobile"` or `"0"`.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::num::IntErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

/// Interpret a boolean-like attribute string.
///
/// Empty, `0`, `false`, `no` and `off` (any case) are false; anything else is true.
pub fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

/// Leading integer of an attribute string (`"12px"` is 12); 0 when there is none.
///
/// Out-of-range values saturate at `i64::MAX` or `i64::MIN`.
pub(crate) fn int_value(value: &str) -> i64 {
    let value = value.trim();
    let digits_end = value
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && matches!(c, '-' | '+'))))
        .map_or(value.len(), |(i, _)| i);
    match value[..digits_end].parse::<i64>() {
        Ok(number) => number,
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => i64::MAX,
            IntErrorKind::NegOverflow => i64::MIN,
            _ => 0,
        },
    }
}

/// Result of the last Maps API key check performed by the settings page
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyState {
    /// No key has been entered
    #[default]
    #[serde(rename = "none")]
    Missing,
    /// The check request itself failed
    Error,
    /// The key was accepted by the tile service
    Good,
    /// The key was rejected by the tile service
    Bad,
}

impl fmt::Display for ApiKeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApiKeyState::Missing => "none",
            ApiKeyState::Error => "error",
            ApiKeyState::Good => "good",
            ApiKeyState::Bad => "bad",
        };
        f.write_str(name)
    }
}

/// When touch gesture handling (two-finger pan) is enabled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureMode {
    #[default]
    Always,
    MobileOnly,
    Never,
}

impl GestureMode {
    /// Convert an attribute value: `mobile` selects mobile-only, other values are flags.
    pub fn from_attr(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "mobile" | "mobile_only" => GestureMode::MobileOnly,
            "always" => GestureMode::Always,
            "never" => GestureMode::Never,
            other if parse_flag(other) => GestureMode::Always,
            _ => GestureMode::Never,
        }
    }
}

impl<'de> Deserialize<'de> for GestureMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match LooseValue::deserialize(deserializer)? {
            LooseValue::Bool(true) => Ok(GestureMode::Always),
            LooseValue::Bool(false) => Ok(GestureMode::Never),
            LooseValue::Number(n) => Ok(if n != 0.0 {
                GestureMode::Always
            } else {
                GestureMode::Never
            }),
            LooseValue::Text(text) => Ok(GestureMode::from_attr(&text)),
        }
    }
}

/// Option values as stored by the settings page: booleans, numbers or strings
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// Accept a number, a numeric string, or a blank string (`None`)
fn blankable_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<LooseValue>::deserialize(deserializer)?;
    match value {
        None | Some(LooseValue::Bool(_)) => Ok(None),
        Some(LooseValue::Number(n)) => Ok(Some(n)),
        Some(LooseValue::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(LooseValue::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("'{text}' is not a valid number"))),
    }
}

fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    blankable_number(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("a number is required"))
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match LooseValue::deserialize(deserializer)? {
        LooseValue::Bool(b) => b,
        LooseValue::Number(n) => n != 0.0,
        LooseValue::Text(text) => parse_flag(&text),
    })
}

/// Plugin-wide defaults, as saved by the settings page
///
/// Every field has a default, so a partial JSON object is enough to configure the compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// OS Data Hub Maps API key
    pub apikey: String,
    /// Validity of `apikey` at the time it was saved
    pub apikey_state: ApiKeyState,
    #[serde(deserialize_with = "number")]
    pub default_zoom: f64,
    /// Map height in pixels (blank = stylesheet default)
    #[serde(deserialize_with = "blankable_number")]
    pub default_height: Option<f64>,
    /// Map width in pixels (blank = full width)
    #[serde(deserialize_with = "blankable_number")]
    pub default_width: Option<f64>,
    /// Elevation profile height in pixels (blank = no profile)
    #[serde(deserialize_with = "blankable_number")]
    pub default_profile: Option<f64>,
    /// Default GPX/KML track colour
    pub default_color: String,
    /// Default GPX/KML track width in pixels
    #[serde(deserialize_with = "number")]
    pub default_track: f64,
    #[serde(deserialize_with = "flag")]
    pub default_hover: bool,
    #[serde(deserialize_with = "flag")]
    pub default_waypoint: bool,
    pub default_gestures: GestureMode,
    /// Permission option for the locate control
    pub default_location: String,
    /// Permission option for premium (zoomed-in) tiles
    pub premium_data: String,
    pub open_data_style: String,
    #[serde(deserialize_with = "number")]
    pub min_zoom: f64,
    #[serde(deserialize_with = "number")]
    pub max_zoom: f64,
    #[serde(deserialize_with = "number")]
    pub zoom_step: f64,
    /// Permission option for the fullscreen control
    pub fullscreen: String,
    /// Elevation profile fill colour
    pub profile_fill: String,
    /// Permission option for unrestricted panning
    pub pan_anywhere: String,
    /// Permission option for the print control
    pub can_print: String,
    #[serde(deserialize_with = "flag")]
    pub show_pane: bool,
    #[serde(deserialize_with = "flag")]
    pub imperial: bool,
    #[serde(deserialize_with = "flag")]
    pub show_scale: bool,
    /// Add a download link below maps showing a single route file
    #[serde(deserialize_with = "flag")]
    pub add_link: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            apikey: String::new(),
            apikey_state: ApiKeyState::Missing,
            default_zoom: 7.0,
            default_height: Some(400.0),
            default_width: None,
            default_profile: None,
            default_color: "#3366cc".to_string(),
            default_track: 4.0,
            default_hover: false,
            default_waypoint: true,
            default_gestures: GestureMode::Always,
            default_location: "none".to_string(),
            premium_data: "all".to_string(),
            open_data_style: "Outdoor".to_string(),
            min_zoom: 2.0,
            max_zoom: 11.0,
            zoom_step: 1.0,
            fullscreen: "all".to_string(),
            profile_fill: "#3366cc".to_string(),
            pan_anywhere: "all".to_string(),
            can_print: "none".to_string(),
            show_pane: false,
            imperial: false,
            show_scale: false,
            add_link: false,
        }
    }
}

/// A rejected administrative setting; the previous value is kept
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("{label} '{value}' is not a valid number. Must lie in the range {min} - {max}{}", blank_suffix(.blank_ok))]
    OutOfRange {
        label: &'static str,
        value: f64,
        min: f64,
        max: f64,
        blank_ok: bool,
    },

    #[error("{label} must not be blank")]
    Blank { label: &'static str },

    #[error("Default track colour '{0}' is invalid. Must be a #hex-color-value eg. #884488")]
    InvalidColor(String),

    #[error("Maps API key check failed (state: {0})")]
    ApiKey(ApiKeyState),
}

fn blank_suffix(blank_ok: &bool) -> &'static str {
    if *blank_ok { " or be left blank" } else { "" }
}

fn hex_color_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^#([0-9A-Fa-f]{3}){1,2}$").expect("hex colour regex must compile")
    })
}

fn check_range(
    label: &'static str,
    value: Option<f64>,
    min: f64,
    max: f64,
    blank_ok: bool,
) -> Result<(), SettingsError> {
    match value {
        None if blank_ok => Ok(()),
        None => Err(SettingsError::Blank { label }),
        Some(v) if v.is_finite() && (min..=max).contains(&v) => Ok(()),
        Some(v) => Err(SettingsError::OutOfRange {
            label,
            value: v,
            min,
            max,
            blank_ok,
        }),
    }
}

impl Settings {
    /// Parse stored options; missing fields take their defaults.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load stored options from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Validate a settings update against `self` (the stored values).
    ///
    /// Fields that fail validation keep their stored value and produce a [`SettingsError`].
    /// Minimum and maximum zoom are widened to include the default zoom.
    pub fn validated_update(&self, candidate: Settings) -> (Settings, Vec<SettingsError>) {
        let mut next = candidate;
        let mut errors = Vec::new();

        next.apikey = next.apikey.trim().to_string();
        if next.min_zoom > next.default_zoom {
            next.min_zoom = next.default_zoom;
        }
        if next.max_zoom < next.default_zoom {
            next.max_zoom = next.default_zoom;
        }

        if matches!(next.apikey_state, ApiKeyState::Bad | ApiKeyState::Missing) {
            errors.push(SettingsError::ApiKey(next.apikey_state));
        }
        if let Err(e) = check_range("Default height", next.default_height, 100.0, 5000.0, true) {
            next.default_height = self.default_height;
            errors.push(e);
        }
        if let Err(e) = check_range("Default width", next.default_width, 100.0, 5000.0, true) {
            next.default_width = self.default_width;
            errors.push(e);
        }
        if let Err(e) = check_range(
            "Default profile height",
            next.default_profile,
            100.0,
            1000.0,
            true,
        ) {
            next.default_profile = self.default_profile;
            errors.push(e);
        }
        if let Err(e) = check_range(
            "Default GPX/KML track width",
            Some(next.default_track),
            1.0,
            15.0,
            false,
        ) {
            next.default_track = self.default_track;
            errors.push(e);
        }
        if !hex_color_pattern().is_match(next.default_color.trim()) {
            errors.push(SettingsError::InvalidColor(next.default_color.clone()));
            next.default_color = self.default_color.clone();
        }

        for error in &errors {
            tracing::warn!("Rejected setting: {}", error);
        }
        (next, errors)
    }
}

/// Where the site lives and where its uploads can be read locally
#[derive(Debug, Clone)]
pub struct SiteContext {
    site_url: Url,
    upload_base_url: Option<String>,
    upload_base_dir: Option<PathBuf>,
    fetch_timeout: Duration,
}

impl SiteContext {
    /// Default connect/read bound for remote feature files
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    pub fn new(site_url: &str) -> crate::Result<Self> {
        Ok(Self {
            site_url: Url::parse(site_url)?,
            upload_base_url: None,
            upload_base_dir: None,
            fetch_timeout: Self::DEFAULT_TIMEOUT,
        })
    }

    /// Map URLs below `base_url` to files below `base_dir`
    pub fn with_uploads(mut self, base_url: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        self.upload_base_url = Some(base_url.into());
        self.upload_base_dir = Some(base_dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    #[inline]
    pub fn site_url(&self) -> &Url {
        &self.site_url
    }

    #[inline]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn upload_base_url(&self) -> Option<&str> {
        self.upload_base_url.as_deref()
    }

    pub fn upload_base_dir(&self) -> Option<&Path> {
        self.upload_base_dir.as_deref()
    }

    /// Make `location` absolute against the site root, forcing the site's scheme.
    ///
    /// Text that is not a URL and cannot be joined is returned unchanged.
    pub fn absolute_url(&self, location: &str) -> String {
        if location.contains("://") {
            match Url::parse(location) {
                Ok(mut url) => {
                    if matches!(url.scheme(), "http" | "https") {
                        // Only fails for scheme changes between special and non-special schemes.
                        let _ = url.set_scheme(self.site_url.scheme());
                    }
                    url.to_string()
                }
                Err(e) => {
                    tracing::debug!("Leaving '{}' unchanged: {}", location, e);
                    location.to_string()
                }
            }
        } else {
            let joined = format!(
                "{}/{}",
                self.site_url.as_str().trim_end_matches('/'),
                location.trim_start_matches('/')
            );
            match Url::parse(&joined) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    tracing::debug!("Leaving '{}' unchanged: {}", location, e);
                    location.to_string()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        for falsy in ["", "0", "false", "FALSE", " no ", "off"] {
            assert!(!parse_flag(falsy), "{falsy:?}");
        }
        for truthy in ["1", "true", "yes", "on", "anything"] {
            assert!(parse_flag(truthy), "{truthy:?}");
        }
    }

    #[test]
    fn test_int_value() {
        assert_eq!(int_value("12"), 12);
        assert_eq!(int_value(" 20px"), 20);
        assert_eq!(int_value("-3"), -3);
        assert_eq!(int_value("2.9"), 2);
        assert_eq!(int_value(""), 0);
        assert_eq!(int_value("abc"), 0);
        assert_eq!(int_value("-"), 0);
    }

    #[test]
    fn test_int_value_saturates() {
        assert_eq!(int_value("9223372036854775807"), i64::MAX);
        assert_eq!(int_value("9223372036854775808"), i64::MAX);
        assert_eq!(int_value("123456789012345678901234px"), i64::MAX);
        assert_eq!(int_value("-9223372036854775809"), i64::MIN);
    }

    #[test]
    fn test_gesture_mode_from_attr() {
        assert_eq!(GestureMode::from_attr("mobile"), GestureMode::MobileOnly);
        assert_eq!(GestureMode::from_attr("false"), GestureMode::Never);
        assert_eq!(GestureMode::from_attr("true"), GestureMode::Always);
        assert_eq!(GestureMode::from_attr("1"), GestureMode::Always);
        assert_eq!(GestureMode::from_attr("never"), GestureMode::Never);
    }

    #[test]
    fn test_settings_json_round_trip() {
        let settings = Settings {
            default_gestures: GestureMode::MobileOnly,
            default_width: Some(640.0),
            ..Settings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.default_zoom, 7.0);
        assert_eq!(settings.default_color, "#3366cc");
        assert_eq!(settings.apikey_state, ApiKeyState::Missing);
        assert_eq!(settings.can_print, "none");
    }

    #[test]
    fn test_settings_from_partial_json() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "apikey": "abc",
                "apikey_state": "good",
                "default_zoom": "5",
                "default_width": "",
                "default_profile": 150,
                "default_gestures": "mobile",
                "show_scale": "on",
                "imperial": 1
            }"#,
        )
        .unwrap();
        assert_eq!(settings.apikey_state, ApiKeyState::Good);
        assert_eq!(settings.default_zoom, 5.0);
        assert_eq!(settings.default_width, None);
        assert_eq!(settings.default_profile, Some(150.0));
        assert_eq!(settings.default_gestures, GestureMode::MobileOnly);
        assert!(settings.show_scale);
        assert!(settings.imperial);
        assert_eq!(settings.max_zoom, 11.0);
    }

    #[test]
    fn test_settings_rejects_bad_number() {
        let result = Settings::from_json(r#"{"default_zoom": "high"}"#);
        assert!(matches!(result, Err(crate::OsMapError::Json(_))));
    }

    #[test]
    fn test_settings_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::load(&dir.path().join("options.json"));
        assert!(matches!(result, Err(crate::OsMapError::Io(_))));
    }

    #[test]
    fn test_validated_update_keeps_previous_values() {
        let stored = Settings::default();
        let candidate = Settings {
            apikey_state: ApiKeyState::Good,
            default_height: Some(50.0),
            default_track: 20.0,
            default_color: "blue".to_string(),
            default_width: Some(600.0),
            ..Settings::default()
        };
        let (next, errors) = stored.validated_update(candidate);
        assert_eq!(errors.len(), 3);
        assert_eq!(next.default_height, stored.default_height);
        assert_eq!(next.default_track, stored.default_track);
        assert_eq!(next.default_color, stored.default_color);
        assert_eq!(next.default_width, Some(600.0));
        assert!(matches!(
            errors[0],
            SettingsError::OutOfRange { label: "Default height", .. }
        ));
    }

    #[test]
    fn test_validated_update_widens_zoom_bounds() {
        let stored = Settings::default();
        let candidate = Settings {
            apikey_state: ApiKeyState::Good,
            default_zoom: 1.0,
            min_zoom: 3.0,
            max_zoom: 0.5,
            ..Settings::default()
        };
        let (next, errors) = stored.validated_update(candidate);
        assert!(errors.is_empty());
        assert_eq!(next.min_zoom, 1.0);
        assert_eq!(next.max_zoom, 1.0);
    }

    #[test]
    fn test_validated_update_reports_missing_key() {
        let (_, errors) = Settings::default().validated_update(Settings::default());
        assert_eq!(errors, vec![SettingsError::ApiKey(ApiKeyState::Missing)]);
    }

    #[test]
    fn test_out_of_range_message() {
        let error = check_range("Default width", Some(20.0), 100.0, 5000.0, true).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Default width '20' is not a valid number. Must lie in the range 100 - 5000 or be left blank"
        );
    }

    #[test]
    fn test_absolute_url_relative_path() {
        let site = SiteContext::new("https://example.org/blog").unwrap();
        assert_eq!(
            site.absolute_url("wp-content/uploads/track.gpx"),
            "https://example.org/blog/wp-content/uploads/track.gpx"
        );
        assert_eq!(
            site.absolute_url("/track.gpx"),
            "https://example.org/blog/track.gpx"
        );
    }

    #[test]
    fn test_absolute_url_forces_site_scheme() {
        let site = SiteContext::new("https://example.org").unwrap();
        assert_eq!(
            site.absolute_url("http://cdn.example.org/route.kml"),
            "https://cdn.example.org/route.kml"
        );
    }

    #[test]
    fn test_invalid_site_url() {
        assert!(SiteContext::new("not a url").is_err());
    }
}
