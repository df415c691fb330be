use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Installs the stdout subscriber. `log_level` is the default directive,
/// `RUST_LOG` still wins for anything it names.
pub fn init_logging(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            log_level
                .parse()
                .with_context(|| format!("invalid log level {log_level:?}"))?,
        )
        .from_env_lossy();

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_filter(filter);

    Registry::default()
        .with(stdout_layer)
        .try_init()
        .context("logger already installed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_level() {
        assert!(init_logging("loud").is_err());
    }
}
