//! Feature specifier parsing
//!
//! Markers, GPX and KML entries are written as `location$layer!color;description`, where only
//! the location is mandatory. JSON feature files carry the same fields as object members.

use crate::SiteContext;
use serde::Serialize;
use serde_json::Value;

/// One marker, GPX route or KML overlay as requested by the author
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FeatureRecord {
    location: String,
    layer: Option<u32>,
    color: String,
    description: String,
}

impl FeatureRecord {
    /// Position text (markers) or absolute file URL (routes)
    #[inline]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Requested layer number, if one was given
    #[inline]
    pub fn layer(&self) -> Option<u32> {
        self.layer
    }

    /// Marker colour or track colour; empty when not specified
    #[inline]
    pub fn color(&self) -> &str {
        &self.color
    }

    /// Popup text; empty when not specified
    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Parses feature specifiers, resolving route locations against the site
#[derive(Clone, Copy, Debug)]
pub struct SpecifierParser<'a> {
    site: &'a SiteContext,
}

impl<'a> SpecifierParser<'a> {
    pub fn new(site: &'a SiteContext) -> Self {
        Self { site }
    }

    /// Split a specifier string into its parts.
    ///
    /// The description is everything after the first `;`, then the colour after the first `!`
    /// of what remains, then the layer after the first `$`. The rest is the location, made
    /// absolute when `treat_as_url` is set.
    pub fn parse(&self, text: &str, treat_as_url: bool) -> FeatureRecord {
        let (rest, description) = extract_specifier(text, ';');
        let (rest, color) = extract_specifier(rest, '!');
        let (location, layer) = extract_specifier(rest, '$');

        FeatureRecord {
            location: self.location(location, treat_as_url),
            layer: parse_layer(layer),
            color: color.to_string(),
            description: description.to_string(),
        }
    }

    /// Build a record from one JSON array element.
    ///
    /// Returns `None` when the element is not an object or has no non-empty `location`.
    /// Missing `desc`, `color` and `layer` members default to empty.
    pub fn sanitize(&self, item: &Value, treat_as_url: bool) -> Option<FeatureRecord> {
        let object = item.as_object()?;
        let location = object.get("location")?.as_str()?;
        if location.is_empty() {
            return None;
        }

        let text = |key: &str| match object.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let layer = match object.get("layer") {
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Some(Value::String(s)) => parse_layer(s),
            _ => None,
        };

        Some(FeatureRecord {
            location: self.location(location, treat_as_url),
            layer,
            color: text("color"),
            description: text("desc"),
        })
    }

    fn location(&self, location: &str, treat_as_url: bool) -> String {
        if treat_as_url {
            self.site.absolute_url(location)
        } else {
            location.to_string()
        }
    }
}

/// Split `text` at the first `delimiter`, returning (before, after). `after` is empty if absent.
#[inline]
fn extract_specifier(text: &str, delimiter: char) -> (&str, &str) {
    text.split_once(delimiter).unwrap_or((text, ""))
}

#[inline]
fn parse_layer(text: &str) -> Option<u32> {
    text.trim().parse().ok()
}
