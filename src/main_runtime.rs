use agentboard::config::LoggingConfig;
use tokio::signal;
use tracing::error;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info,agentboard=debug";

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config.level.eq_ignore_ascii_case("info") {
            EnvFilter::new(DEFAULT_DIRECTIVES)
        } else {
            EnvFilter::new(&config.level)
        }
    })
}

/// Console logging plus a daily rolling file when `AGENTBOARD_LOG_DIR` is set.
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let log_dir = std::env::var("AGENTBOARD_LOG_DIR").ok();

    // `rolling::daily` panics if it cannot create the first file, so check
    // the directory is writable before handing it over.
    let file_layer = log_dir.as_deref().and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Warning: could not create log directory {dir} ({e}), file logging disabled");
            return None;
        }
        let probe = std::path::Path::new(dir).join(".agentboard_write_test");
        match std::fs::OpenOptions::new().create(true).append(true).open(&probe) {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                let appender = tracing_appender::rolling::daily(dir, "agentboard.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                // flushed for the life of the process
                Box::leak(Box::new(guard));
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!("Warning: could not write to log directory {dir} ({e}), file logging disabled");
                None
            }
        }
    });

    let (json_layer, text_layer) = if config.json {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            ),
            None,
        )
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {dir}/agentboard.log");
    }
}

/// Minimal logging for one-shot commands
pub fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
