use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset or blank. HTTP stack internals stay at warn.
pub const DEFAULT_FILTER: &str = "info,hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn";

/// Installs the stderr subscriber. Stdout stays reserved for command output.
pub fn init() -> anyhow::Result<()> {
    let raw = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(raw.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

fn build_filter(raw: Option<&str>) -> anyhow::Result<EnvFilter> {
    let directives = raw
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directives).with_context(|| format!("build log filter from {directives:?}"))
}
