//! How the map view is fitted to the page: explicit extent, explicit center or auto-fit

use crate::{Coordinate, ErrorAccumulator, Resolved, gridref};
use geo::Rect;
use serde::{Deserialize, Serialize, Serializer};

/// OS headquarters, Southampton; used when nothing else gives a center
pub const DEFAULT_CENTER: &str = "50.938064,-1.470971";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitStrategy {
    /// Fit to two explicit corner positions
    Extent,
    /// Center and zoom
    Center,
    /// Fit to the union of all displayed features
    Auto,
}

/// Number of resolved features of each kind
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FeatureCounts {
    pub markers: usize,
    pub gpx: usize,
    pub kml: usize,
}

/// Two corner positions as written, their parsed coordinates and the box they span
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Extent {
    list: [String; 2],
    corners: [Coordinate; 2],
    /// Serialized `[[south, west], [north, east]]` for the renderer's fit-to-bounds
    #[serde(serialize_with = "serialize_bounds")]
    bounds: Rect<f64>,
}

fn serialize_bounds<S: Serializer>(bounds: &Rect<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    let (min, max) = (bounds.min(), bounds.max());
    serializer.collect_seq([[min.y, min.x], [max.y, max.x]])
}

impl Extent {
    /// Parse `position|position`. Both positions must be valid.
    pub fn parse(text: &str) -> Option<Self> {
        let (first, second) = text.split_once('|')?;
        if second.contains('|') {
            return None;
        }
        let corners = [gridref::convert(first)?, gridref::convert(second)?];
        let bounds = Rect::new(geo::Coord::from(corners[0]), geo::Coord::from(corners[1]));
        Some(Self {
            list: [first.to_string(), second.to_string()],
            corners,
            bounds,
        })
    }

    /// Corner positions as written in the attribute
    pub fn list(&self) -> &[String; 2] {
        &self.list
    }

    pub fn corners(&self) -> &[Coordinate; 2] {
        &self.corners
    }

    /// Bounding rectangle (x = longitude, y = latitude)
    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }
}

/// Fit-related inputs of one shortcode
#[derive(Clone, Copy, Debug, Default)]
pub struct FitRequest<'a> {
    /// `extent` attribute, possibly empty
    pub extent: &'a str,
    /// `center` attribute (or `centre`), possibly empty
    pub center: &'a str,
    /// Was a zoom given explicitly
    pub zoom_given: bool,
    pub counts: FeatureCounts,
    /// Location of the first marker, if any
    pub first_marker: Option<&'a str>,
}

/// The chosen fit and the center handed to the renderer
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapFit {
    pub strategy: FitStrategy,
    /// Position text; converted by the renderer
    pub center: String,
    pub extent: Option<Extent>,
}

pub struct MapFitResolver;

impl MapFitResolver {
    /// First match wins: extent, then explicit center and zoom, then auto-fit when there are
    /// routes or several markers, else center.
    pub fn resolve(
        has_extent: bool,
        has_center_and_zoom: bool,
        counts: FeatureCounts,
    ) -> FitStrategy {
        if has_extent {
            FitStrategy::Extent
        } else if has_center_and_zoom {
            FitStrategy::Center
        } else if counts.gpx != 0 || counts.kml != 0 || counts.markers > 1 {
            FitStrategy::Auto
        } else {
            FitStrategy::Center
        }
    }

    /// Choose the strategy for `request` and settle the center.
    ///
    /// A center fit without an explicit center uses the single marker, or [`DEFAULT_CENTER`].
    /// A center that does not parse is reported and replaced by [`DEFAULT_CENTER`].
    pub fn fit(request: &FitRequest<'_>) -> Resolved<MapFit> {
        let mut warnings = ErrorAccumulator::new();

        let extent = match request.extent.trim() {
            "" => None,
            text => {
                let extent = Extent::parse(text);
                if extent.is_none() {
                    warnings.push(format!("'{text}' is not a valid extent"));
                }
                extent
            }
        };

        let strategy = Self::resolve(
            extent.is_some(),
            !request.center.is_empty() && request.zoom_given,
            request.counts,
        );

        let mut center = request.center.to_string();
        if strategy == FitStrategy::Center {
            if center.is_empty() {
                center = match (request.counts.markers, request.first_marker) {
                    (1, Some(location)) => location.to_string(),
                    _ => DEFAULT_CENTER.to_string(),
                };
            }
            if gridref::convert(&center).is_none() {
                warnings.push(format!("'{center}' is not a valid position"));
                center = DEFAULT_CENTER.to_string();
            }
        }

        Resolved {
            value: MapFit {
                strategy,
                center,
                extent,
            },
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(markers: usize, gpx: usize, kml: usize) -> FeatureCounts {
        FeatureCounts { markers, gpx, kml }
    }

    #[test]
    fn test_extent_takes_priority() {
        assert_eq!(
            MapFitResolver::resolve(true, true, counts(3, 1, 1)),
            FitStrategy::Extent
        );
        let fit = MapFitResolver::fit(&FitRequest {
            extent: "SU372155|SU4020",
            center: "NT2573",
            zoom_given: true,
            ..Default::default()
        });
        assert!(fit.warnings.is_empty());
        assert_eq!(fit.value.strategy, FitStrategy::Extent);
        assert_eq!(fit.value.center, "NT2573");
    }

    #[test]
    fn test_two_markers_auto_fit() {
        assert_eq!(
            MapFitResolver::resolve(false, false, counts(2, 0, 0)),
            FitStrategy::Auto
        );
        assert_eq!(
            MapFitResolver::resolve(false, false, counts(0, 0, 1)),
            FitStrategy::Auto
        );
    }

    #[test]
    fn test_center_and_zoom_before_auto() {
        assert_eq!(
            MapFitResolver::resolve(false, true, counts(5, 2, 0)),
            FitStrategy::Center
        );
    }

    #[test]
    fn test_single_marker_becomes_center() {
        let fit = MapFitResolver::fit(&FitRequest {
            counts: counts(1, 0, 0),
            first_marker: Some("NT2573"),
            ..Default::default()
        });
        assert_eq!(fit.value.strategy, FitStrategy::Center);
        assert_eq!(fit.value.center, "NT2573");
    }

    #[test]
    fn test_default_center() {
        let fit = MapFitResolver::fit(&FitRequest::default());
        assert_eq!(fit.value.strategy, FitStrategy::Center);
        assert_eq!(fit.value.center, DEFAULT_CENTER);
        assert!(fit.warnings.is_empty());
    }

    #[test]
    fn test_center_without_zoom_uses_given_center() {
        let fit = MapFitResolver::fit(&FitRequest {
            center: "51.5,-0.12",
            ..Default::default()
        });
        assert_eq!(fit.value.strategy, FitStrategy::Center);
        assert_eq!(fit.value.center, "51.5,-0.12");
    }

    #[test]
    fn test_invalid_center_is_reported() {
        let fit = MapFitResolver::fit(&FitRequest {
            center: "XX99",
            zoom_given: true,
            ..Default::default()
        });
        assert_eq!(fit.value.center, DEFAULT_CENTER);
        assert_eq!(fit.warnings.entries(), ["'XX99' is not a valid position"]);
    }

    #[test]
    fn test_invalid_extent_is_reported() {
        let fit = MapFitResolver::fit(&FitRequest {
            extent: "SU372155",
            counts: counts(2, 0, 0),
            ..Default::default()
        });
        assert_eq!(fit.value.strategy, FitStrategy::Auto);
        assert!(fit.value.extent.is_none());
        assert_eq!(fit.warnings.len(), 1);
    }

    #[test]
    fn test_extent_bounds() {
        let extent = Extent::parse("52,-2|51,-1").unwrap();
        let bounds = extent.bounds();
        assert_eq!(bounds.min().y, 51.0);
        assert_eq!(bounds.max().x, -1.0);
        assert_eq!(extent.list(), &["52,-2".to_string(), "51,-1".to_string()]);

        let json = serde_json::to_value(&extent).unwrap();
        assert_eq!(json["bounds"], serde_json::json!([[51.0, -2.0], [52.0, -1.0]]));
    }
}
