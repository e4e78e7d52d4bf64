// src/main.rs

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn};
use url::Url;
use vanguard_rs_enum::core::sanitize::DomainScope;
use vanguard_rs_enum::{DnsRequest, EnumConfig, Enumeration, JsonLinesSource, parse_input_line};

mod app;
mod logging;

use app::App;

/// Deduplicates discovered names, expands them into subdomains and prints
/// every record handed to the data sources as JSON lines.
#[derive(Debug, Parser)]
#[command(name = "vanguard-rs-enum", version, about)]
struct Cli {
    /// Root domain to enumerate (repeatable)
    #[arg(short, long = "domain", required = true)]
    domains: Vec<String>,

    /// File with one `name[,tag[,source]]` per line; stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mirror logs to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    logging::initialize_logging(cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => EnumConfig::from_file(path)
            .wrap_err_with(|| format!("failed to load {}", path.display()))?,
        None => EnumConfig::default(),
    };
    config.domains.extend(cli.domains.iter().map(|d| target_domain(d)));

    let enumeration = Enumeration::new(config.clone())?;
    let names = read_names(cli.input.as_deref(), enumeration.scope()).await?;

    let (stdout_source, writer) = JsonLinesSource::spawn("stdout", tokio::io::stdout());
    enumeration.register_source(Arc::new(stdout_source));

    let cancel = enumeration.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping enumeration.");
            cancel.cancel();
        }
    });

    let mut app = App::new(&config);
    app.start();
    let stats = enumeration.run(names).await?;

    // The writer finishes once the last handle to the source is gone.
    drop(enumeration);
    let written = writer.await??;
    info!(written, "Output written.");

    app.finish(stats);
    eprintln!("{}", app.report());
    Ok(())
}

/// Accepts bare domains as well as URLs and returns the host part.
fn target_domain(raw_input: &str) -> String {
    let input_with_scheme =
        if !raw_input.starts_with("http://") && !raw_input.starts_with("https://") {
            format!("https://{}", raw_input)
        } else {
            raw_input.to_string()
        };
    Url::parse(&input_with_scheme)
        .ok()
        .and_then(|url| url.host_str().map(String::from))
        .unwrap_or_else(|| raw_input.to_string())
}

async fn read_names(path: Option<&Path>, scope: &DomainScope) -> Result<Vec<DnsRequest>> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .wrap_err_with(|| format!("failed to open {}", path.display()))?;
            collect_names(file, scope).await
        }
        None => collect_names(tokio::io::stdin(), scope).await,
    }
}

async fn collect_names<R: AsyncRead + Unpin>(
    reader: R,
    scope: &DomainScope,
) -> Result<Vec<DnsRequest>> {
    let mut lines = BufReader::new(reader).lines();
    let mut names = Vec::new();
    let mut skipped = 0usize;

    while let Some(line) = lines.next_line().await? {
        match parse_input_line(&line, scope) {
            Some(req) => names.push(req),
            None => skipped += 1,
        }
    }

    info!(names = names.len(), skipped, "Read input names.");
    Ok(names)
}
