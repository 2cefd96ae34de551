//! OS Map Library - Map Configuration Compiler
//!
//! This library turns the attributes of an `[osmap]` shortcode, together with the stored
//! plugin defaults and any marker/GPX/KML feature lists, into a single [`MapConfig`] that a
//! rendering engine can instantiate without further validation.
//!
//! # Architecture
//!
//! - **[`gridref`]**: National Grid reference and decimal lat/long parsing into [`Coordinate`]
//! - **[`SpecifierParser`]**: `location$layer!color;description` feature specifiers
//! - **[`FeatureSource`]**: inline, flat-file and JSON feature lists with ordered fetch strategies
//! - **[`MapFitResolver`]**: extent / center / auto-fit decision
//! - **[`PermissionGate`]**: `all` / `none` / `logged_in` capability gating
//! - **[`MapConfigCompiler`]**: per-shortcode orchestration, driven through a [`PageSession`]
//!
//! Non-fatal problems (missing files, invalid JSON, unparseable positions) never abort a
//! compilation; they are collected in an [`ErrorAccumulator`] returned alongside the config.

mod accumulator;
mod compiler;
mod fit;
pub mod gridref;
pub mod icon;
mod permission;
mod session;
mod settings;
mod source;
mod specifier;

// Public API exports
pub use accumulator::{ErrorAccumulator, Resolved};
pub use compiler::{
    Attributes, CompiledMap, ElevationProfile, Layer, MapConfig, MapConfigCompiler, MapFeature,
    MapFrame, MarkerListEntry, RouteStyle,
};
pub use fit::{DEFAULT_CENTER, Extent, FeatureCounts, FitRequest, FitStrategy, MapFit, MapFitResolver};
pub use gridref::Coordinate;
pub use permission::{Permission, PermissionGate, Viewer, ViewerIdentity};
pub use session::{MarkerLink, PageSession, RequiredModules};
pub use settings::{ApiKeyState, GestureMode, Settings, SettingsError, SiteContext, parse_flag};
pub use source::{ContentResolver, FeatureSource, FetchError, ResolverChain, UploadDirResolver};
#[cfg(feature = "remote")]
pub use source::RemoteResolver;
pub use specifier::{FeatureRecord, SpecifierParser};

/// Error types for the map compiler
#[derive(Debug, thiserror::Error)]
pub enum OsMapError {
    #[error("OS Maps Error: Invalid Maps API Key (state: {state})")]
    InvalidApiKey { state: ApiKeyState },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OsMapError>;
