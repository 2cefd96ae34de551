use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Compile the [osmap], [osmap_link] and [osmap_marker] shortcodes of a page into map configurations
pub struct Cli {
    /// Page text containing the shortcodes
    #[clap(value_name = "PAGE")]
    pub page: PathBuf,

    /// JSON file with the stored plugin options (defaults apply when omitted)
    #[clap(short, long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Site root that relative feature file paths are resolved against
    #[clap(long, default_value = "http://localhost")]
    pub site_url: String,

    /// Base URL of the uploads area
    #[clap(long, requires = "upload_dir")]
    pub upload_url: Option<String>,

    /// Local directory holding the files below --upload-url
    #[clap(long, requires = "upload_url", value_name = "DIR")]
    pub upload_dir: Option<PathBuf>,

    /// Compile as a logged-in viewer
    #[clap(long, default_value = "false")]
    pub logged_in: bool,

    /// Compile as a viewer who can edit the page (implies --logged-in)
    #[clap(long, default_value = "false")]
    pub editor: bool,

    /// Never fetch feature files over HTTP, only read them from --upload-dir
    #[clap(long, default_value = "false")]
    pub no_remote: bool,

    /// Connect and read timeout for remote feature files
    #[clap(long, default_value = "15")]
    pub timeout_secs: u64,

    /// Log at debug level unless RUST_LOG says otherwise
    #[clap(short, long, default_value = "false")]
    pub verbose: bool,
}
