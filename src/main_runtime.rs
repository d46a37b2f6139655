use gexdesk::config::LoggingConfig;
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

/// RUST_LOG wins; otherwise the configured filter.
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn fmt_layer<S, W>(writer: W, json: bool, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

fn log_dir() -> PathBuf {
    std::env::var("GEXDESK_LOG_DIR")
        .or_else(|_| std::env::var("LOG_DIR"))
        .unwrap_or_else(|_| "logs".to_string())
        .into()
}

/// `tracing_appender::rolling::daily` panics when it cannot open its file.
fn check_writable(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let marker = dir.join(".gexdesk_write_test");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&marker)?;
    let _ = std::fs::remove_file(&marker);
    Ok(())
}

/// Console on stderr plus a daily file under GEXDESK_LOG_DIR when writable
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let dir = log_dir();
    let file_layer = match check_writable(&dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&dir, "gexdesk.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            // Dropping the guard loses buffered lines
            Box::leak(Box::new(guard));
            Some(fmt_layer(non_blocking, config.json, false))
        }
        Err(e) => {
            eprintln!(
                "Warning: log directory {} is not writable ({}), file logging disabled",
                dir.display(),
                e
            );
            None
        }
    };
    let file_logging_enabled = file_layer.is_some();

    // stderr keeps --json command output clean on stdout
    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt_layer(std::io::stderr, config.json, !config.json))
        .with(file_layer)
        .init();

    if file_logging_enabled {
        tracing::debug!("Logging to {}/gexdesk.log", dir.display());
    }
}

/// Warnings only, console only
pub fn init_logging_simple(config: &LoggingConfig) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::WARN);
    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
