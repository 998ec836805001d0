use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{format::FmtSpan, Layer as FmtLayer};
use tracing_subscriber::{prelude::*, registry::Registry, reload, EnvFilter};

mod combined;

use super::app_config::config;
use super::error::Result;

pub mod prelude {
    pub use tracing::{debug, error, info, trace, warn};
    pub use tracing::{debug_span, error_span, info_span, trace_span, warn_span};
    pub use tracing::{event, field::Empty, instrument, span};
}

pub fn setup() -> Result<GlobalLoggingContext> {
    GlobalLoggingContext::new()
}

/// Owns the reload handle and the appender guards, keep it alive for the whole of `main`
pub struct GlobalLoggingContext {
    guards: Vec<WorkerGuard>,
    handle: reload::Handle<combined::Layer<Registry>, Registry>,
}

impl GlobalLoggingContext {
    /// Install the subscriber, logging INFO to stderr until `reconfigure` is called
    pub fn new() -> Result<Self> {
        let (layer, handle) = reload::Layer::new(combined::Layer::empty());
        Registry::default().with(layer).try_init()?;

        let mut ctx = GlobalLoggingContext { guards: vec![], handle };
        ctx.apply(LoggingConfig::default(), false)?;
        Ok(ctx)
    }

    /// Switch to the `logging` section of the global config.
    /// `produces_output` is set for commands printing their results to stdout.
    pub fn reconfigure(&mut self, produces_output: bool) -> Result<()> {
        let cfg: LoggingConfig = config().get("logging")?;
        self.apply(cfg, produces_output)
    }

    fn apply(&mut self, cfg: LoggingConfig, produces_output: bool) -> Result<()> {
        // dropping the old guards flushes whatever the previous outputs buffered
        self.guards.clear();

        let layers: Vec<_> = cfg
            .outputs
            .iter()
            .filter(|output| output.enabled)
            .map(|output| self.output_layer(output, &cfg.filter, produces_output))
            .collect();
        self.handle.reload(combined::Layer::new(layers))?;
        Ok(())
    }

    /// Filter plus formatter for one configured output
    fn output_layer(
        &mut self,
        output: &LoggingOutput,
        global: &FilterConfig,
        produces_output: bool,
    ) -> combined::Layer<Registry> {
        let (writer, guard) = output.target.writer(produces_output);
        self.guards.push(guard);

        let span_events = output
            .span_events
            .iter()
            .fold(FmtSpan::NONE, |acc, e| acc | FmtSpan::from(*e));

        let mut layer = combined::Layer::empty();
        layer.add(output.filter.or(global).env_filter());
        layer.add(
            FmtLayer::default()
                .with_ansi(output.target.is_term())
                .with_target(false)
                .with_span_events(span_events)
                .with_timer(LocalTime)
                .with_writer(writer),
        );
        layer
    }
}

/// Local wall-clock time with milliseconds
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut dyn fmt::Write) -> fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

#[derive(Debug, Deserialize)]
struct LoggingConfig {
    #[serde(default = "FilterConfig::stock")]
    filter: FilterConfig,
    #[serde(default)]
    outputs: Vec<LoggingOutput>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::stock(),
            outputs: vec![LoggingOutput {
                enabled: true,
                span_events: vec![],
                filter: FilterConfig::default(),
                target: LoggingTarget::Term(TermOutput {
                    name: TermStream::Stderr,
                    auto_switch: false,
                }),
            }],
        }
    }
}

/// `EnvFilter` directives, optionally extended from an environment variable
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
struct FilterConfig {
    directives: Option<String>,
    /// `true` means `RUST_LOG`, `false` reads nothing
    #[serde(deserialize_with = "env_var_name")]
    from_env: Option<String>,
}

impl FilterConfig {
    fn stock() -> Self {
        Self {
            directives: Some("info".into()),
            from_env: Some("RUST_LOG".into()),
        }
    }

    /// Fill fields missing here from `fallback`
    fn or(&self, fallback: &FilterConfig) -> FilterConfig {
        Self {
            directives: self.directives.clone().or_else(|| fallback.directives.clone()),
            from_env: self.from_env.clone().or_else(|| fallback.from_env.clone()),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let base = self
            .from_env
            .as_ref()
            .map_or_else(EnvFilter::default, EnvFilter::from_env);
        self.directives
            .iter()
            .flat_map(|dirs| dirs.split(','))
            .filter_map(|dir| match dir.parse() {
                Ok(d) => Some(d),
                Err(err) => {
                    // the subscriber is being rebuilt, nothing to log through yet
                    eprintln!("tiersim: ignoring log directive `{}`: {}", dir, err);
                    None
                }
            })
            .fold(base, EnvFilter::add_directive)
    }
}

#[derive(Debug, Deserialize)]
struct LoggingOutput {
    enabled: bool,
    #[serde(default)]
    span_events: Vec<SpanEvent>,
    #[serde(default)]
    filter: FilterConfig,
    target: LoggingTarget,
}

#[derive(Copy, Clone, Debug, Deserialize)]
enum SpanEvent {
    New,
    Enter,
    Exit,
    Close,
    Active,
    Full,
}

impl From<SpanEvent> for FmtSpan {
    fn from(e: SpanEvent) -> Self {
        match e {
            SpanEvent::New => FmtSpan::NEW,
            SpanEvent::Enter => FmtSpan::ENTER,
            SpanEvent::Exit => FmtSpan::EXIT,
            SpanEvent::Close => FmtSpan::CLOSE,
            SpanEvent::Active => FmtSpan::ACTIVE,
            SpanEvent::Full => FmtSpan::FULL,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum LoggingTarget {
    Term(TermOutput),
    File(FileOutput),
}

#[derive(Debug, Deserialize)]
struct TermOutput {
    name: TermStream,
    /// move to stderr when the command writes its results to stdout
    #[serde(default)]
    auto_switch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TermStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Deserialize)]
struct FileOutput {
    directory: PathBuf,
    name: PathBuf,
}

impl TermOutput {
    fn stream(&self, produces_output: bool) -> TermStream {
        if self.auto_switch && produces_output {
            TermStream::Stderr
        } else {
            self.name
        }
    }
}

impl LoggingTarget {
    fn is_term(&self) -> bool {
        matches!(self, LoggingTarget::Term(_))
    }

    fn writer(&self, produces_output: bool) -> (NonBlocking, WorkerGuard) {
        let builder = NonBlockingBuilder::default().lossy(false);
        match self {
            LoggingTarget::Term(term) => match term.stream(produces_output) {
                TermStream::Stdout => builder.finish(std::io::stdout()),
                TermStream::Stderr => builder.finish(std::io::stderr()),
            },
            LoggingTarget::File(file) => {
                builder.finish(RollingFileAppender::new(Rotation::NEVER, &file.directory, &file.name))
            }
        }
    }
}

/// Accepts a bool or a variable name for `from_env`
fn env_var_name<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FromEnv {
        Flag(bool),
        Name(String),
    }

    Ok(match FromEnv::deserialize(deserializer)? {
        FromEnv::Flag(true) => Some("RUST_LOG".into()),
        FromEnv::Flag(false) => None,
        FromEnv::Name(name) => Some(name),
    })
}
