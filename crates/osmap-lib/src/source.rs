//! Feature list resolution
//!
//! A marker, GPX or KML list comes from a JSON file, a legacy one-specifier-per-line file, or
//! the `|`-separated shortcode attribute. Files are fetched through an ordered
//! [`ResolverChain`]: by default a remote HTTP fetch, then a direct read from the uploads
//! directory for URLs that point into the site's own upload storage.

use crate::{ErrorAccumulator, FeatureRecord, Resolved, SiteContext, SpecifierParser};
use percent_encoding::percent_decode_str;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

/// Why a resolution strategy could not produce file content
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{strategy} does not handle {url}")]
    NotApplicable { strategy: &'static str, url: String },

    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No resolution strategy could fetch {url}")]
    Exhausted { url: String },
}

/// One way of turning an absolute file URL into its text content
pub trait ContentResolver {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Fetch the whole file as text.
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Fetches `http(s)` URLs with a blocking client
#[cfg(feature = "remote")]
pub struct RemoteResolver {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "remote")]
impl RemoteResolver {
    /// Build a client whose connect and read phases are both bounded by `timeout`.
    pub fn new(timeout: std::time::Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "remote")]
impl ContentResolver for RemoteResolver {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FetchError::NotApplicable {
                strategy: self.name(),
                url: url.to_string(),
            });
        }
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        response
            .text()
            .map_err(|e| FetchError::Request(e.to_string()))
    }
}

/// Reads files below the uploads directory for URLs below the uploads base URL
#[derive(Debug, Clone)]
pub struct UploadDirResolver {
    base_url: String,
    base_dir: PathBuf,
}

impl UploadDirResolver {
    pub fn new(base_url: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into(),
            base_dir: base_dir.into(),
        }
    }

    /// The upload mapping configured for `site`, if any
    pub fn from_site(site: &SiteContext) -> Option<Self> {
        Some(Self::new(site.upload_base_url()?, site.upload_base_dir()?))
    }

    /// Local path for `url`, or `None` when it is outside the uploads area.
    ///
    /// Path segments are percent-decoded; each decoded segment must be a single plain file
    /// name component.
    pub fn local_path(&self, url: &str) -> Option<PathBuf> {
        let base = self.base_url.trim_end_matches('/');
        let rest = url.strip_prefix(base)?;
        if !(rest.is_empty() || rest.starts_with('/')) {
            return None;
        }
        let rest = rest.split(['?', '#']).next().unwrap_or_default();

        let mut path = self.base_dir.clone();
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            let segment = percent_decode_str(segment).decode_utf8().ok()?;
            let mut components = Path::new(segment.as_ref()).components();
            if !matches!(
                (components.next(), components.next()),
                (Some(Component::Normal(_)), None)
            ) {
                return None;
            }
            path.push(segment.as_ref());
        }
        Some(path)
    }
}

impl ContentResolver for UploadDirResolver {
    fn name(&self) -> &'static str {
        "uploads"
    }

    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let path = self
            .local_path(url)
            .ok_or_else(|| FetchError::NotApplicable {
                strategy: self.name(),
                url: url.to_string(),
            })?;
        Ok(std::fs::read_to_string(path)?)
    }
}

/// Resolution strategies tried in order until one succeeds
#[derive(Default)]
pub struct ResolverChain {
    strategies: Vec<Box<dyn ContentResolver>>,
}

impl ResolverChain {
    pub fn new(strategies: Vec<Box<dyn ContentResolver>>) -> Self {
        Self { strategies }
    }

    /// Remote fetch (when compiled in) followed by the site's uploads mapping
    pub fn for_site(site: &SiteContext) -> Self {
        let mut chain = Self::default();
        #[cfg(feature = "remote")]
        match RemoteResolver::new(site.fetch_timeout()) {
            Ok(remote) => chain = chain.with(remote),
            Err(e) => tracing::warn!("Remote fetching disabled: {}", e),
        }
        if let Some(uploads) = UploadDirResolver::from_site(site) {
            chain = chain.with(uploads);
        }
        chain
    }

    /// Append a strategy to the end of the chain
    pub fn with(mut self, strategy: impl ContentResolver + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Try each strategy once, in order. No retries.
    pub fn fetch(&self, url: &str) -> Result<String, FetchError> {
        for strategy in &self.strategies {
            match strategy.fetch(url) {
                Ok(content) => {
                    tracing::debug!("Fetched {} via {}", url, strategy.name());
                    return Ok(content);
                }
                Err(e @ FetchError::NotApplicable { .. }) => tracing::trace!("{}", e),
                Err(e) => tracing::debug!("{} failed for {}: {}", strategy.name(), url, e),
            }
        }
        Err(FetchError::Exhausted {
            url: url.to_string(),
        })
    }
}

impl std::fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.strategy_names()).finish()
    }
}

/// Resolves feature lists from files or attributes
#[derive(Clone, Copy, Debug)]
pub struct FeatureSource<'a> {
    site: &'a SiteContext,
    resolvers: &'a ResolverChain,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a> FeatureSource<'a> {
    pub fn new(site: &'a SiteContext, resolvers: &'a ResolverChain) -> Self {
        Self { site, resolvers }
    }

    /// Resolve one feature list.
    ///
    /// `file_ref` wins over `inline` when non-empty. Fetch and JSON failures are reported as
    /// warnings naming `file_ref` and give an empty list.
    pub fn resolve(
        &self,
        file_ref: &str,
        inline: &str,
        treat_as_url: bool,
    ) -> Resolved<Vec<FeatureRecord>> {
        let parser = SpecifierParser::new(self.site);
        let file_ref = file_ref.trim();
        let mut warnings = ErrorAccumulator::new();

        let features = if file_ref.is_empty() {
            parse_inline(&parser, inline, treat_as_url)
        } else if is_json_file(file_ref) {
            match self.fetch(file_ref) {
                Ok(content) => match parse_json(&parser, &content, treat_as_url) {
                    Some(features) => features,
                    None => {
                        tracing::warn!("{} is not a valid JSON feature list", file_ref);
                        warnings.push(format!("{file_ref} invalid JSON"));
                        Vec::new()
                    }
                },
                Err(message) => {
                    warnings.push(message);
                    Vec::new()
                }
            }
        } else {
            match self.fetch(file_ref) {
                Ok(content) => content
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| parser.parse(line, treat_as_url))
                    .collect(),
                Err(message) => {
                    warnings.push(message);
                    Vec::new()
                }
            }
        };

        Resolved {
            value: features,
            warnings,
        }
    }

    fn fetch(&self, file_ref: &str) -> Result<String, String> {
        let url = self.site.absolute_url(file_ref);
        self.resolvers.fetch(&url).map_err(|e| {
            tracing::warn!("{}: {}", file_ref, e);
            format!("{file_ref} not found")
        })
    }
}

fn is_json_file(file_ref: &str) -> bool {
    Path::new(file_ref)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

fn parse_inline(parser: &SpecifierParser<'_>, inline: &str, treat_as_url: bool) -> Vec<FeatureRecord> {
    let mut tokens = inline.split('|').map(str::trim).peekable();
    if tokens.peek().is_none_or(|first| first.is_empty()) {
        return Vec::new();
    }
    tokens
        .filter(|token| !token.is_empty())
        .map(|token| parser.parse(token, treat_as_url))
        .collect()
}

/// Parse a JSON array of feature objects; invalid elements are dropped silently.
fn parse_json(
    parser: &SpecifierParser<'_>,
    content: &str,
    treat_as_url: bool,
) -> Option<Vec<FeatureRecord>> {
    let Value::Array(items) = serde_json::from_str::<Value>(content).ok()? else {
        return None;
    };
    Some(
        items
            .iter()
            .filter_map(|item| parser.sanitize(item, treat_as_url))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory strategy keyed by absolute URL
    struct MemoryResolver(HashMap<String, String>);

    impl ContentResolver for MemoryResolver {
        fn name(&self) -> &'static str {
            "memory"
        }

        fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.0.get(url).cloned().ok_or_else(|| FetchError::NotApplicable {
                strategy: "memory",
                url: url.to_string(),
            })
        }
    }

    fn site() -> SiteContext {
        SiteContext::new("https://example.org").unwrap()
    }

    fn chain(files: &[(&str, &str)]) -> ResolverChain {
        let map = files
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ResolverChain::default().with(MemoryResolver(map))
    }

    #[test]
    fn test_inline_attribute() {
        let site = site();
        let chain = ResolverChain::default();
        let source = FeatureSource::new(&site, &chain);
        let resolved = source.resolve("", "SU372155!red;HQ|NT2573", false);
        assert!(resolved.warnings.is_empty());
        assert_eq!(resolved.value.len(), 2);
        assert_eq!(resolved.value[0].color(), "red");
        assert_eq!(resolved.value[1].location(), "NT2573");
    }

    #[test]
    fn test_empty_first_token_yields_nothing() {
        let site = site();
        let chain = ResolverChain::default();
        let source = FeatureSource::new(&site, &chain);
        assert!(source.resolve("", "", false).value.is_empty());
        assert!(source.resolve("", "|SU372155", false).value.is_empty());
    }

    #[test]
    fn test_inline_skips_empty_tokens() {
        let site = site();
        let chain = ResolverChain::default();
        let source = FeatureSource::new(&site, &chain);
        let resolved = source.resolve("", "a.gpx||b.gpx|", true);
        let locations: Vec<&str> = resolved.value.iter().map(|f| f.location()).collect();
        assert_eq!(
            locations,
            ["https://example.org/a.gpx", "https://example.org/b.gpx"]
        );
    }

    #[test]
    fn test_line_file() {
        let site = site();
        let chain = chain(&[(
            "https://example.org/markers.txt",
            "SU372155;One\r\n\r\n  \nNT2573$1;Two\n",
        )]);
        let source = FeatureSource::new(&site, &chain);
        let resolved = source.resolve("markers.txt", "ignored", false);
        assert!(resolved.warnings.is_empty());
        assert_eq!(resolved.value.len(), 2);
        assert_eq!(resolved.value[0].description(), "One");
        assert_eq!(resolved.value[1].layer(), Some(1));
    }

    #[test]
    fn test_json_file() {
        let site = site();
        let chain = chain(&[(
            "https://example.org/routes.JSON",
            r#"[{"location": "a.gpx", "color": "red"}, {"desc": "no location"}, 7]"#,
        )]);
        let source = FeatureSource::new(&site, &chain);
        let resolved = source.resolve("routes.JSON", "", true);
        assert!(resolved.warnings.is_empty());
        assert_eq!(resolved.value.len(), 1);
        assert_eq!(resolved.value[0].location(), "https://example.org/a.gpx");
        assert_eq!(resolved.value[0].color(), "red");
    }

    #[test]
    fn test_invalid_json_file() {
        let site = site();
        let chain = chain(&[("https://example.org/bad.json", "{not json")]);
        let source = FeatureSource::new(&site, &chain);
        let resolved = source.resolve("bad.json", "", false);
        assert!(resolved.value.is_empty());
        assert_eq!(resolved.warnings.entries(), ["bad.json invalid JSON"]);
    }

    #[test]
    fn test_missing_file_reports_once() {
        let site = site();
        let chain = chain(&[]);
        let source = FeatureSource::new(&site, &chain);
        let resolved = source.resolve("nowhere/missing.gpx", "fallback.gpx", true);
        assert!(resolved.value.is_empty());
        assert_eq!(resolved.warnings.entries(), ["nowhere/missing.gpx not found"]);
    }

    #[test]
    fn test_chain_tries_strategies_in_order() {
        let first = MemoryResolver(HashMap::from([(
            "https://example.org/a".to_string(),
            "first".to_string(),
        )]));
        let second = MemoryResolver(HashMap::from([
            ("https://example.org/a".to_string(), "second".to_string()),
            ("https://example.org/b".to_string(), "second".to_string()),
        ]));
        let chain = ResolverChain::default().with(first).with(second);
        assert_eq!(chain.fetch("https://example.org/a").unwrap(), "first");
        assert_eq!(chain.fetch("https://example.org/b").unwrap(), "second");
        assert!(matches!(
            chain.fetch("https://example.org/c"),
            Err(FetchError::Exhausted { .. })
        ));
    }

    #[test]
    fn test_upload_dir_local_path() {
        let resolver = UploadDirResolver::new(
            "https://example.org/wp-content/uploads/",
            "/srv/www/wp-content/uploads",
        );
        assert_eq!(
            resolver.local_path("https://example.org/wp-content/uploads/2024/05/walk.gpx"),
            Some(PathBuf::from("/srv/www/wp-content/uploads/2024/05/walk.gpx"))
        );
        assert_eq!(resolver.local_path("https://other.org/walk.gpx"), None);
        assert_eq!(
            resolver.local_path("https://example.org/wp-content/uploads-old/walk.gpx"),
            None
        );
        assert_eq!(
            resolver.local_path("https://example.org/wp-content/uploads/../../etc/passwd"),
            None
        );
    }

    #[test]
    fn test_upload_dir_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("walk.gpx"), "<gpx/>").unwrap();
        let resolver = UploadDirResolver::new("https://example.org/uploads", dir.path());
        assert_eq!(
            resolver.fetch("https://example.org/uploads/walk.gpx").unwrap(),
            "<gpx/>"
        );
        assert!(matches!(
            resolver.fetch("https://example.org/uploads/missing.gpx"),
            Err(FetchError::Io(_))
        ));
    }

    #[test]
    fn test_upload_dir_decodes_segments() {
        let resolver = UploadDirResolver::new("https://example.org/uploads", "/srv/uploads");
        assert_eq!(
            resolver.local_path("https://example.org/uploads/2024/my%20walk.txt?ver=2"),
            Some(PathBuf::from("/srv/uploads/2024/my walk.txt"))
        );
        assert_eq!(resolver.local_path("https://example.org/uploads/a%2F..%2Fb.txt"), None);
        assert_eq!(resolver.local_path("https://example.org/uploads/%2E%2E/secret"), None);
        assert_eq!(resolver.local_path("https://example.org/uploads/bad%FF.txt"), None);
    }

    #[test]
    fn test_uploads_with_spaces_and_accents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("my walk.txt"), "SU372155;Walk\n").unwrap();
        std::fs::write(dir.path().join("café.txt"), "NT2573;Café\n").unwrap();
        let site = site().with_uploads("https://example.org/uploads", dir.path());
        let chain = ResolverChain::default().with(UploadDirResolver::from_site(&site).unwrap());
        let source = FeatureSource::new(&site, &chain);

        let walk = source.resolve("uploads/my walk.txt", "", false);
        assert!(walk.warnings.is_empty(), "{:?}", walk.warnings);
        assert_eq!(walk.value.len(), 1);
        assert_eq!(walk.value[0].description(), "Walk");

        let cafe = source.resolve("uploads/café.txt", "", false);
        assert!(cafe.warnings.is_empty(), "{:?}", cafe.warnings);
        assert_eq!(cafe.value.len(), 1);
        assert_eq!(cafe.value[0].location(), "NT2573");
    }

    #[test]
    fn test_for_site_strategy_order() {
        let site = site().with_uploads("https://example.org/uploads", "/tmp/uploads");
        let names = ResolverChain::for_site(&site).strategy_names();
        #[cfg(feature = "remote")]
        assert_eq!(names, ["remote", "uploads"]);
        #[cfg(not(feature = "remote"))]
        assert_eq!(names, ["uploads"]);
    }
}
