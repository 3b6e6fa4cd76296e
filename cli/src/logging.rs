//! Logging setup for the `forge` binary.
//!
//! Output always goes to stderr so `--json` results on stdout stay parseable.
//!
//! Environment variables:
//! - `RUST_LOG`: full filter directive (e.g. `info,forge_wallet=debug`), wins over everything
//! - `LOG_FORMAT`: `pretty`, `json` or `compact`
//! - `LOG_ANSI`: `true`/`false`

use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    /// Step towards `Trace` once per `-v`
    fn raised(self, steps: u8) -> Self {
        let mut level = self;
        for _ in 0..steps {
            level = match level {
                LogLevel::Error => LogLevel::Warn,
                LogLevel::Warn => LogLevel::Info,
                LogLevel::Info => LogLevel::Debug,
                LogLevel::Debug | LogLevel::Trace => LogLevel::Trace,
            };
        }
        level
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub ansi_colors: bool,
    /// Raw `RUST_LOG` directive, if set
    pub directive: Option<String>,
    /// Per-target levels appended to the filter
    pub module_levels: Vec<(String, LogLevel)>,
    /// Emit span open/close events (round start and end)
    pub span_events: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            ansi_colors: true,
            directive: None,
            module_levels: vec![
                ("hyper".to_string(), LogLevel::Warn),
                ("reqwest".to_string(), LogLevel::Warn),
            ],
            span_events: false,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(rust_log) = lookup("RUST_LOG").filter(|v| !v.trim().is_empty()) {
            let default_level = rust_log.split(',').next().unwrap_or("info");
            if !default_level.contains('=') {
                config.level = LogLevel::parse(default_level);
            }
            config.directive = Some(rust_log);
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.format = LogFormat::parse(&format);
        }
        if let Some(ansi) = lookup("LOG_ANSI") {
            config.ansi_colors = ansi.eq_ignore_ascii_case("true");
        }

        config
    }

    /// Apply `-v` counts from the command line
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        self.level = self.level.raised(verbose);
        if verbose >= 2 {
            self.span_events = true;
        }
        self
    }

    fn build_filter(&self) -> String {
        if let Some(directive) = &self.directive {
            return directive.clone();
        }
        let mut filter = self.level.as_str().to_string();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.as_str()));
        }
        filter
    }
}

pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(config.build_filter())
        .map_err(|e| anyhow::anyhow!("Invalid log filter: {}", e))?;

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(span_events)
                    .with_ansi(false),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_span_events(span_events)
                    .with_ansi(config.ansi_colors),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_span_events(span_events)
                    .with_ansi(config.ansi_colors),
            )
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))
}
