use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Crates whose events `--log-level` controls.
const BRIDGE_TARGETS: [&str; 4] = [
    "wakatiwai",
    "wakatiwai_object",
    "wakatiwai_frame",
    "wakatiwai_transport",
];

/// Filter directives: `level` for the bridge crates, at most `warn` for
/// anything else.
fn filter_directives(level: LogLevel) -> String {
    let other = level.min(LogLevel::Warn);
    let mut directives: Vec<String> = BRIDGE_TARGETS
        .iter()
        .map(|target| format!("{target}={}", level.as_str()))
        .collect();
    directives.push(other.as_str().to_string());
    directives.join(",")
}

/// Install the global subscriber. Logs always go to stderr: stdout carries
/// the bridge protocol. Targets are printed from `debug` up, where events
/// from the frame and transport layers interleave with the session's.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(filter_directives(level)))
        .with_ansi(false)
        .with_target(level >= LogLevel::Debug);

    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
}
