//! Page rendering session
//!
//! State shared by the shortcodes of one page, advanced strictly in page order: the map
//! identifier counter, the defaults for `[osmap_link]` and the rendering modules the page
//! needs.

use crate::Attributes;
use crate::settings::int_value;
use serde::Serialize;

/// Label of an `[osmap_link]` without one
pub const DEFAULT_LINK_LABEL: &str = "view on map";

/// Optional rendering modules required by the maps of a page
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RequiredModules {
    pub fullscreen: bool,
    pub print: bool,
    pub locate: bool,
    pub gpx: bool,
    pub kml: bool,
    pub elevation: bool,
}

impl RequiredModules {
    /// Add every module `other` needs
    pub fn merge(&mut self, other: &RequiredModules) {
        self.fullscreen |= other.fullscreen;
        self.print |= other.print;
        self.locate |= other.locate;
        self.gpx |= other.gpx;
        self.kml |= other.kml;
        self.elevation |= other.elevation;
    }

    /// Names of the required modules, in load order
    pub fn names(&self) -> Vec<&'static str> {
        [
            ("fullscreen", self.fullscreen),
            ("kml", self.kml),
            ("gpx", self.gpx),
            ("elevation", self.elevation),
            ("print", self.print),
            ("locate", self.locate),
        ]
        .into_iter()
        .filter_map(|(name, used)| used.then_some(name))
        .collect()
    }
}

/// A link that focuses one marker of a map on the page
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MarkerLink {
    pub map_id: i64,
    /// 1-based marker number
    pub marker: i64,
    /// Zoom to apply when focusing; `0` keeps the current zoom
    pub zoom: String,
    pub label: String,
}

#[derive(Clone, Debug)]
struct LinkDefaults {
    map: String,
    marker: String,
    zoom: String,
    label: String,
}

impl Default for LinkDefaults {
    fn default() -> Self {
        Self {
            map: "1".to_string(),
            marker: "1".to_string(),
            zoom: "0".to_string(),
            label: DEFAULT_LINK_LABEL.to_string(),
        }
    }
}

/// State for the shortcodes of one page
#[derive(Debug, Default)]
pub struct PageSession {
    last_map_id: u32,
    link_defaults: Option<LinkDefaults>,
    required: RequiredModules,
}

impl PageSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next map identifier; the first map is 1.
    pub(crate) fn next_map_id(&mut self) -> u32 {
        self.last_map_id += 1;
        self.last_map_id
    }

    /// Has any map been compiled on this page
    pub fn maps_on_page(&self) -> bool {
        self.last_map_id != 0
    }

    pub fn map_count(&self) -> u32 {
        self.last_map_id
    }

    /// Modules needed by every map compiled so far
    pub fn required_modules(&self) -> &RequiredModules {
        &self.required
    }

    /// Record a compiled map: later links point at its first marker.
    pub(crate) fn record_map(&mut self, map_id: u32, marker_zoom: &str, modules: &RequiredModules) {
        let defaults = self.link_defaults.get_or_insert_with(LinkDefaults::default);
        defaults.map = map_id.to_string();
        defaults.marker = "1".to_string();
        defaults.zoom = int_value(marker_zoom).to_string();
        self.required.merge(modules);
    }

    /// Resolve an `[osmap_link]` shortcode.
    ///
    /// `map`, `marker`, `zoom` and `label` attributes override the current defaults. The
    /// result becomes the new defaults, with the marker number advanced by one.
    pub fn marker_link(&mut self, attrs: &Attributes) -> MarkerLink {
        let defaults = self.link_defaults.get_or_insert_with(LinkDefaults::default);
        for (key, slot) in [
            ("map", &mut defaults.map),
            ("marker", &mut defaults.marker),
            ("zoom", &mut defaults.zoom),
            ("label", &mut defaults.label),
        ] {
            if let Some(value) = attrs.get(key) {
                *slot = value.clone();
            }
        }

        let link = MarkerLink {
            map_id: int_value(&defaults.map),
            marker: int_value(&defaults.marker),
            zoom: defaults.zoom.clone(),
            label: defaults.label.clone(),
        };
        defaults.marker = link.marker.saturating_add(1).to_string();
        link
    }
}
