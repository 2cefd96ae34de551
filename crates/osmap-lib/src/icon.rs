//! Marker icon selection for `[osmap_marker]` and marker colours

use serde::Serialize;

/// Colours that have a dedicated marker image
pub const MARKER_COLORS: [&str; 9] = [
    "red", "orange", "yellow", "green", "blue", "violet", "gold", "grey", "black",
];

/// Highest marker number with its own image
pub const MAX_NUMBERED: u32 = 30;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MarkerIcon {
    /// Default blue marker
    Default,
    /// One of [`MARKER_COLORS`]
    Colored(&'static str),
    /// `1..=30`
    Numbered(u32),
    /// Lower-case letter
    Letter(char),
}

impl MarkerIcon {
    /// Pick the icon for a colour argument.
    ///
    /// Digits select a numbered marker (`0` is the start marker `s`, above 30 falls back to
    /// the default), a single letter selects a lettered marker, and a known colour name
    /// selects that colour.
    pub fn from_color(color: &str) -> Self {
        if !color.is_empty() && color.bytes().all(|b| b.is_ascii_digit()) {
            return match color.parse::<u32>() {
                Ok(0) => MarkerIcon::Letter('s'),
                Ok(n) if n <= MAX_NUMBERED => MarkerIcon::Numbered(n),
                _ => MarkerIcon::Default,
            };
        }

        let mut chars = color.chars();
        if let (Some(c), None) = (chars.next(), chars.next())
            && c.is_ascii_alphabetic()
        {
            return MarkerIcon::Letter(c.to_ascii_lowercase());
        }

        MARKER_COLORS
            .iter()
            .find(|&&name| name == color)
            .map_or(MarkerIcon::Default, |&name| MarkerIcon::Colored(name))
    }

    /// Image file name below the marker image directory
    pub fn file_name(&self) -> String {
        match self {
            MarkerIcon::Default => "marker-icon-2x.png".to_string(),
            MarkerIcon::Colored(name) => format!("marker-icon-2x-{name}.png"),
            MarkerIcon::Numbered(n) => format!("number_{n}.png"),
            MarkerIcon::Letter(c) => format!("letter_{c}.png"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers() {
        assert_eq!(MarkerIcon::from_color("0"), MarkerIcon::Letter('s'));
        assert_eq!(MarkerIcon::from_color("7"), MarkerIcon::Numbered(7));
        assert_eq!(MarkerIcon::from_color("30").file_name(), "number_30.png");
        assert_eq!(MarkerIcon::from_color("31"), MarkerIcon::Default);
        assert_eq!(MarkerIcon::from_color("007"), MarkerIcon::Numbered(7));
    }

    #[test]
    fn test_letters() {
        assert_eq!(MarkerIcon::from_color("A").file_name(), "letter_a.png");
        assert_eq!(MarkerIcon::from_color("z"), MarkerIcon::Letter('z'));
    }

    #[test]
    fn test_named_colors() {
        assert_eq!(
            MarkerIcon::from_color("violet").file_name(),
            "marker-icon-2x-violet.png"
        );
        assert_eq!(MarkerIcon::from_color("Red"), MarkerIcon::Default);
        assert_eq!(MarkerIcon::from_color("pink"), MarkerIcon::Default);
        assert_eq!(MarkerIcon::from_color("").file_name(), "marker-icon-2x.png");
    }
}
