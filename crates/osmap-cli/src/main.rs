//! osmap - compile the OS map shortcodes of a page and print the result as JSON

mod cli;
mod logging;
mod page;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use osmap_lib::{MapConfigCompiler, ResolverChain, Settings, SiteContext, UploadDirResolver, ViewerIdentity};
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose);
    run(&cli)
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let settings = match &cli.settings {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    let mut site = SiteContext::new(&cli.site_url)
        .with_context(|| format!("Invalid site URL '{}'", cli.site_url))?
        .with_timeout(Duration::from_secs(cli.timeout_secs));
    if let (Some(url), Some(dir)) = (&cli.upload_url, &cli.upload_dir) {
        site = site.with_uploads(url.clone(), dir.clone());
    }

    let resolvers = if cli.no_remote {
        UploadDirResolver::from_site(&site)
            .map_or_else(ResolverChain::default, |uploads| ResolverChain::default().with(uploads))
    } else {
        ResolverChain::for_site(&site)
    };
    tracing::debug!("Feature file strategies: {:?}", resolvers.strategy_names());

    let viewer = ViewerIdentity {
        logged_in: cli.logged_in || cli.editor,
        editor: cli.editor,
    };
    let compiler = MapConfigCompiler::new(&settings, &site, &viewer).with_resolvers(resolvers);

    let text = std::fs::read_to_string(&cli.page)
        .with_context(|| format!("Failed to read page {}", cli.page.display()))?;
    let report = page::compile_page(&text, &compiler, &viewer);
    tracing::info!(
        "Compiled {} shortcodes from {}",
        report.items.len(),
        cli.page.display()
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
