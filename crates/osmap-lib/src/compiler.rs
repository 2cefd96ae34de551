//! MapConfigCompiler - Per-shortcode orchestration
//!
//! Merges the attributes of one `[osmap]` shortcode over the stored defaults, resolves the
//! marker, GPX and KML lists, picks the fit strategy, applies permission gating and emits a
//! [`MapConfig`] together with the problems met on the way.

use crate::fit::{DEFAULT_CENTER, Extent, FeatureCounts, FitRequest, FitStrategy, MapFitResolver};
use crate::gridref::scale_to_zoom;
use crate::settings::int_value;
use crate::{
    ApiKeyState, ErrorAccumulator, FeatureRecord, FeatureSource, GestureMode, OsMapError,
    PageSession, PermissionGate, RequiredModules, ResolverChain, Result, Settings, SiteContext,
    Viewer, parse_flag,
};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Shortcode attributes: lower-case name to raw value
pub type Attributes = BTreeMap<String, String>;

/// Zoom ceiling for viewers without premium data access
const OPEN_DATA_MAX_ZOOM: f64 = 9.5;
/// Leisure style zoom ceiling with premium data
const LEISURE_MAX_ZOOM: f64 = 9.5;
/// Leisure style zoom ceiling on open data
const OPEN_LEISURE_MAX_ZOOM: f64 = 5.5;
const RESTRICTED_PAN_PADDING: f64 = 0.45;
const DEFAULT_OPACITY: f64 = 0.7;
const DEFAULT_FIT_MARGIN: i64 = 20;
/// Profiles lower than this are raised to `SMALL_PROFILE_HEIGHT`
const MIN_PROFILE_HEIGHT: f64 = 30.0;
const SMALL_PROFILE_HEIGHT: f64 = 100.0;
/// Margin the elevation control always adds below the chart
const PROFILE_MARGIN: f64 = 20.0;

/// A display layer; hidden layers start switched off
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Layer {
    pub name: String,
    pub hidden: bool,
}

impl Layer {
    fn parse(text: &str) -> Self {
        match text.strip_prefix('-') {
            Some(name) => Self {
                name: name.to_string(),
                hidden: true,
            },
            None => Self {
                name: text.to_string(),
                hidden: false,
            },
        }
    }
}

/// A marker or route ready for the renderer
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MapFeature {
    /// Position text (markers) or absolute file URL (routes)
    pub location: String,
    pub color: String,
    /// Layer group; 0 is always shown
    pub group: u32,
    /// Popup text
    pub text: String,
}

/// Line style shared by all routes of a map
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RouteStyle {
    pub weight: f64,
    pub opacity: f64,
}

/// Elevation chart below the map for a single GPX route
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElevationProfile {
    pub url: String,
    /// Container height in pixels, margin included
    pub height: f64,
    pub show_pane: bool,
    pub fill: String,
}

/// Size and styling of the map container
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MapFrame {
    pub width: Option<f64>,
    pub height: Option<f64>,
    /// Extra CSS class, empty for none
    pub class: String,
}

/// One entry of the marker list shown below the map
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MarkerListEntry {
    /// 1-based marker number
    pub number: usize,
    pub label: String,
}

/// Everything the rendering engine needs to instantiate one map
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapConfig {
    pub map_id: u32,
    pub open_data_style: String,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// 0 disables the leisure style
    pub max_leisure: f64,
    pub zoom_step: f64,
    pub center: String,
    pub default_center: String,
    pub map_fit: FitStrategy,
    pub extent: Option<Extent>,
    pub gestures: GestureMode,
    pub fullscreen: bool,
    pub auto_fit: bool,
    pub auto_fit_margin: i64,
    /// Popup trigger, empty for the renderer default
    pub popup: String,
    /// Pan padding when panning is restricted to the map area
    pub restrict_pan: Option<f64>,
    pub can_print: bool,
    pub locate: bool,
    pub start_locate: bool,
    pub show_scale: bool,
    pub gpx_style: bool,
    pub waypoint: bool,
    pub imperial: bool,
    pub hover: bool,
    pub marker_link: String,
    pub marker_zoom: String,
    pub start_icon_color: String,
    pub end_icon_color: String,
    pub route_style: RouteStyle,
    pub layers: Vec<Layer>,
    pub layers_open: bool,
    pub markers: Vec<MapFeature>,
    pub gpx: Vec<MapFeature>,
    pub kml: Vec<MapFeature>,
    pub elevation: Option<ElevationProfile>,
}

/// Result of compiling one `[osmap]` shortcode
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompiledMap {
    pub config: MapConfig,
    pub frame: MapFrame,
    /// Download link for the single route file, when enabled
    pub download_link: Option<String>,
    pub marker_list: Vec<MarkerListEntry>,
    pub modules: RequiredModules,
    pub errors: ErrorAccumulator,
}

impl CompiledMap {
    /// Does the map show any marker, GPX or KML feature
    pub fn has_features(&self) -> bool {
        !(self.config.markers.is_empty() && self.config.gpx.is_empty() && self.config.kml.is_empty())
    }

    /// Problem text for `viewer`; only editors see it.
    pub fn visible_errors(&self, viewer: &dyn Viewer) -> Option<String> {
        (viewer.can_edit() && !self.errors.is_empty()).then(|| self.errors.text())
    }
}

/// Compiles shortcodes against one set of stored defaults, site and viewer
pub struct MapConfigCompiler<'a> {
    settings: &'a Settings,
    site: &'a SiteContext,
    viewer: &'a dyn Viewer,
    resolvers: ResolverChain,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a> MapConfigCompiler<'a> {
    /// Compiler fetching feature files with the site's default resolution strategies
    pub fn new(settings: &'a Settings, site: &'a SiteContext, viewer: &'a dyn Viewer) -> Self {
        Self {
            settings,
            site,
            viewer,
            resolvers: ResolverChain::for_site(site),
        }
    }

    /// Replace the feature file resolution strategies
    pub fn with_resolvers(mut self, resolvers: ResolverChain) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Compile one `[osmap]` shortcode.
    ///
    /// Fails only when the stored API key is not known to be good; the map identifier is
    /// then left unused. Every other problem ends up in [`CompiledMap::errors`].
    pub fn compile(&self, session: &mut PageSession, attrs: &Attributes) -> Result<CompiledMap> {
        #[cfg(feature = "profiling")]
        profiling::scope!("compiler::compile");

        let settings = self.settings;
        if settings.apikey_state != ApiKeyState::Good {
            tracing::warn!("Refusing to compile map: API key state is {}", settings.apikey_state);
            return Err(OsMapError::InvalidApiKey {
                state: settings.apikey_state,
            });
        }

        let map_id = session.next_map_id();
        let mut errors = ErrorAccumulator::new();
        let gate = PermissionGate::new(self.viewer);

        // Feature lists, file first then attribute
        let source = FeatureSource::new(self.site, &self.resolvers);
        let gpx = source
            .resolve(text(attrs, "gpxfile", ""), text(attrs, "gpx", ""), true)
            .drain_into(&mut errors);
        let kml = source
            .resolve(text(attrs, "kmlfile", ""), text(attrs, "kml", ""), true)
            .drain_into(&mut errors);
        let markers = source
            .resolve(text(attrs, "markerfile", ""), text(attrs, "markers", ""), false)
            .drain_into(&mut errors);

        let (layers, layers_open) = parse_layers(text(attrs, "layers", ""));

        let counts = FeatureCounts {
            markers: markers.len(),
            gpx: gpx.len(),
            kml: kml.len(),
        };
        let explicit_zoom = number(attrs, "zoom", None, &mut errors);
        let fit = MapFitResolver::fit(&FitRequest {
            extent: text(attrs, "extent", ""),
            center: aliased(attrs, "center", "centre", "").trim(),
            zoom_given: explicit_zoom.is_some(),
            counts,
            first_marker: markers.first().map(FeatureRecord::location),
        })
        .drain_into(&mut errors);

        // Zoom: legacy scale, then premium gating, then clamping
        let zoom = explicit_zoom.unwrap_or(settings.default_zoom);
        let zoom = number(attrs, "scale", None, &mut errors).map_or(zoom, |s| scale_to_zoom(s, zoom));

        let premium = gate.is_permitted(text(attrs, "premium_data", &settings.premium_data), true);
        let (max_zoom, mut max_leisure) = if premium {
            (settings.max_zoom, LEISURE_MAX_ZOOM)
        } else {
            (settings.max_zoom.min(OPEN_DATA_MAX_ZOOM), OPEN_LEISURE_MAX_ZOOM)
        };
        if !flag(attrs, "leisure", true) {
            max_leisure = 0.0;
        }
        let min_zoom = settings.min_zoom.min(max_zoom);
        let zoom = zoom.max(min_zoom).min(max_zoom);
        let zoom_step = if (0.1..=1.0).contains(&settings.zoom_step) {
            settings.zoom_step
        } else {
            1.0
        };

        let fullscreen = gate.is_permitted(&settings.fullscreen, true);
        let can_print = gate.is_permitted(&settings.can_print, false);
        let locate = gate.is_permitted(text(attrs, "location", &settings.default_location), false);
        let restrict_pan =
            (!gate.is_permitted(&settings.pan_anywhere, true)).then_some(RESTRICTED_PAN_PADDING);

        // Features
        let color = aliased(attrs, "color", "colour", &settings.default_color);
        let quote = text(attrs, "quote", "");
        let feature = |record: &FeatureRecord, default_color: &str| MapFeature {
            location: record.location().to_string(),
            color: if record.color().is_empty() {
                default_color.to_string()
            } else {
                record.color().to_string()
            },
            group: layer_group(record.layer(), layers.len()),
            text: popup_text(record.description(), quote),
        };

        // Route used for the download link and the elevation profile
        let route = match (gpx.as_slice(), kml.as_slice()) {
            ([single], _) => Some(single.location()),
            (_, [single]) => Some(single.location()),
            _ => None,
        };

        let elevation = match (
            gpx.as_slice(),
            number(attrs, "profile", settings.default_profile, &mut errors),
        ) {
            ([single], Some(height)) if height != 0.0 => Some(ElevationProfile {
                url: single.location().to_string(),
                height: if height < MIN_PROFILE_HEIGHT {
                    SMALL_PROFILE_HEIGHT
                } else {
                    height
                } + PROFILE_MARGIN,
                show_pane: settings.show_pane,
                fill: settings.profile_fill.clone(),
            }),
            _ => None,
        };

        let marker_link = text(attrs, "marker_link", "");
        let marker_list = if marker_link.to_ascii_lowercase().contains("auto") {
            markers
                .iter()
                .enumerate()
                .map(|(i, marker)| MarkerListEntry {
                    number: i + 1,
                    label: strip_tags(marker.description()),
                })
                .collect()
        } else {
            Vec::new()
        };
        let marker_zoom = text(attrs, "marker_zoom", "");

        let modules = RequiredModules {
            fullscreen,
            print: can_print,
            locate,
            gpx: !gpx.is_empty(),
            kml: !kml.is_empty(),
            elevation: elevation.is_some(),
        };
        session.record_map(map_id, marker_zoom, &modules);

        let frame = MapFrame {
            width: number(attrs, "width", settings.default_width, &mut errors),
            height: number(attrs, "height", settings.default_height, &mut errors),
            class: text(attrs, "class", "").trim().to_string(),
        };

        let config = MapConfig {
            map_id,
            open_data_style: text(attrs, "open_data_style", &settings.open_data_style).to_string(),
            zoom,
            min_zoom,
            max_zoom,
            max_leisure,
            zoom_step,
            center: fit.center,
            default_center: DEFAULT_CENTER.to_string(),
            map_fit: fit.strategy,
            extent: fit.extent,
            gestures: attrs
                .get("gestures")
                .map_or(settings.default_gestures, |v| GestureMode::from_attr(v)),
            fullscreen,
            auto_fit: fit.strategy == FitStrategy::Auto,
            auto_fit_margin: attrs
                .get("fit_margin")
                .map_or(DEFAULT_FIT_MARGIN, |v| int_value(v)),
            popup: text(attrs, "popup", "").to_string(),
            restrict_pan,
            can_print,
            locate,
            start_locate: flag(attrs, "start_locate", false),
            show_scale: settings.show_scale,
            gpx_style: flag(attrs, "gpxstyle", false),
            waypoint: flag(attrs, "waypoint", settings.default_waypoint),
            imperial: settings.imperial,
            hover: flag(attrs, "hover", settings.default_hover),
            marker_link: marker_link.to_string(),
            marker_zoom: marker_zoom.to_string(),
            start_icon_color: text(attrs, "start_marker", "").to_string(),
            end_icon_color: text(attrs, "end_marker", "").to_string(),
            route_style: RouteStyle {
                weight: number(attrs, "track", Some(settings.default_track), &mut errors)
                    .unwrap_or(settings.default_track),
                opacity: number(attrs, "opacity", Some(DEFAULT_OPACITY), &mut errors)
                    .unwrap_or(DEFAULT_OPACITY),
            },
            markers: markers.iter().map(|m| feature(m, "")).collect(),
            gpx: gpx.iter().map(|r| feature(r, color)).collect(),
            kml: kml.iter().map(|r| feature(r, color)).collect(),
            layers,
            layers_open,
            elevation,
        };

        tracing::info!(
            "Compiled map {} ({:?} fit, {} markers, {} GPX, {} KML, {} problems)",
            map_id,
            config.map_fit,
            counts.markers,
            counts.gpx,
            counts.kml,
            errors.len()
        );

        Ok(CompiledMap {
            config,
            frame,
            download_link: if settings.add_link {
                route.map(str::to_string)
            } else {
                None
            },
            marker_list,
            modules,
            errors,
        })
    }
}

/// Attribute value, or `default` when the attribute is absent
fn text<'a>(attrs: &'a Attributes, key: &str, default: &'a str) -> &'a str {
    attrs.get(key).map_or(default, String::as_str)
}

/// Like [`text`], but a non-empty `alias` attribute wins
fn aliased<'a>(attrs: &'a Attributes, key: &str, alias: &str, default: &'a str) -> &'a str {
    match attrs.get(alias) {
        Some(value) if !value.is_empty() => value,
        _ => text(attrs, key, default),
    }
}

fn flag(attrs: &Attributes, key: &str, default: bool) -> bool {
    attrs.get(key).map_or(default, |value| parse_flag(value))
}

/// Numeric attribute: absent gives `default`, blank gives `None`, garbage is reported.
fn number(
    attrs: &Attributes,
    key: &str,
    default: Option<f64>,
    errors: &mut ErrorAccumulator,
) -> Option<f64> {
    match attrs.get(key).map(|value| value.trim()) {
        None => default,
        Some("") => None,
        Some(value) => match value.parse::<f64>() {
            Ok(n) if n.is_finite() => Some(n),
            _ => {
                errors.push(format!("'{value}' is not a valid {key}"));
                default
            }
        },
    }
}

/// Split the layers attribute; a leading `+` opens the layer switcher.
fn parse_layers(list: &str) -> (Vec<Layer>, bool) {
    if list.is_empty() {
        return (Vec::new(), false);
    }
    let (list, open) = match list.strip_prefix('+') {
        Some(rest) => (rest, true),
        None => (list, false),
    };
    (list.split('|').map(Layer::parse).collect(), open)
}

#[inline]
fn layer_group(layer: Option<u32>, layer_count: usize) -> u32 {
    match layer {
        Some(n) if n >= 1 && (n as usize) <= layer_count => n,
        _ => 0,
    }
}

fn popup_text(text: &str, quote: &str) -> String {
    if quote.is_empty() {
        text.to_string()
    } else {
        text.replace(quote, "\"")
    }
}

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag regex must compile"))
}

fn strip_tags(text: &str) -> String {
    tag_pattern().replace_all(text, "").into_owned()
}
