//! Shortcode extraction and page compilation

use osmap_lib::icon::MarkerIcon;
use osmap_lib::{
    Attributes, CompiledMap, MapConfigCompiler, MarkerLink, PageSession, RequiredModules, Viewer,
};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// A shortcode found in page text
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Shortcode {
    Map(Attributes),
    Link(Attributes),
    Marker(Attributes),
}

fn shortcode_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(osmap_link|osmap_marker|osmap)\b([^\]]*)\]")
            .expect("shortcode regex must compile")
    })
}

fn attribute_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([\w-]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s'"]+))"#)
            .expect("attribute regex must compile")
    })
}

/// Parse `name="value" name='value' name=value` pairs; names are lower-cased.
pub fn parse_attributes(text: &str) -> Attributes {
    attribute_pattern()
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps.get(2).or(caps.get(3)).or(caps.get(4))?.as_str();
            Some((name, value.to_string()))
        })
        .collect()
}

/// All supported shortcodes of `page`, in page order
pub fn scan(page: &str) -> Vec<Shortcode> {
    shortcode_pattern()
        .captures_iter(page)
        .map(|caps| {
            let attrs = parse_attributes(caps.get(2).map_or("", |m| m.as_str()));
            match &caps[1] {
                "osmap_link" => Shortcode::Link(attrs),
                "osmap_marker" => Shortcode::Marker(attrs),
                _ => Shortcode::Map(attrs),
            }
        })
        .collect()
}

/// Output for one shortcode
#[derive(Debug, Serialize)]
#[serde(tag = "shortcode", rename_all = "snake_case")]
pub enum PageItem {
    Map {
        #[serde(flatten)]
        map: Box<CompiledMap>,
        /// Problems shown in the page, editors only
        visible_errors: Option<String>,
    },
    MapError {
        message: String,
    },
    Link(MarkerLink),
    Marker {
        color: String,
        icon: String,
    },
}

/// Compilation result for a whole page
#[derive(Debug, Serialize)]
pub struct PageReport {
    pub maps_on_page: bool,
    pub required_modules: RequiredModules,
    pub module_names: Vec<&'static str>,
    pub items: Vec<PageItem>,
}

/// Compile every shortcode of `page` through one session.
pub fn compile_page(page: &str, compiler: &MapConfigCompiler<'_>, viewer: &dyn Viewer) -> PageReport {
    let mut session = PageSession::new();
    let items = scan(page)
        .into_iter()
        .map(|shortcode| match shortcode {
            Shortcode::Map(attrs) => match compiler.compile(&mut session, &attrs) {
                Ok(map) => {
                    let visible_errors = map.visible_errors(viewer);
                    PageItem::Map {
                        map: Box::new(map),
                        visible_errors,
                    }
                }
                Err(e) => PageItem::MapError {
                    message: e.to_string(),
                },
            },
            Shortcode::Link(attrs) => PageItem::Link(session.marker_link(&attrs)),
            Shortcode::Marker(attrs) => {
                let color = attrs.get("color").cloned().unwrap_or_default();
                let icon = MarkerIcon::from_color(&color).file_name();
                PageItem::Marker { color, icon }
            }
        })
        .collect();

    let required_modules = *session.required_modules();
    PageReport {
        maps_on_page: session.maps_on_page(),
        required_modules,
        module_names: required_modules.names(),
        items,
    }
}
