//! Logging setup. tracing subscriber with a host prefix and a reloadable level.
//!
//! Lines look like `[INFO] [rig-01/10.0.0.4] [axio_common::domain::job:212] message`.
//! The host part defaults to this machine. Inside a [`client_span`] tagged with
//! [`tag_current_span`] it shows the client being served instead, for every
//! event of that request and nothing else.

use crate::utils::hostname::{local_hostname, local_ip_address, UNKNOWN_IP};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{span, Event, Level, Span, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::{ExtensionsMut, LookupSpan, SpanRef};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

/// Name of the span that carries a client's identity.
pub const CLIENT_SPAN: &str = "client";

/// Accepted by [`LogHandle::set_level`], case-insensitive.
pub const AVAILABLE_LEVELS: &[&str] = &[
    "CRITICAL", "FATAL", "ERROR", "WARN", "WARNING", "INFO", "DEBUG", "TRACE", "NOTSET",
];

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log level: {level}\nAvailable levels:\n\t{}", AVAILABLE_LEVELS.join("\n\t"))]
    InvalidLevel { level: String },

    #[error("failed to reload log filter: {0}")]
    Reload(#[from] reload::Error),

    #[error("logging already initialised: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Map a level name onto a filter. `critical`/`fatal` are errors; `notset` lets everything through.
pub fn parse_level(level: &str) -> Result<LevelFilter, LoggingError> {
    let filter = match level.trim().to_ascii_uppercase().as_str() {
        "CRITICAL" | "FATAL" | "ERROR" => LevelFilter::ERROR,
        "WARN" | "WARNING" => LevelFilter::WARN,
        "INFO" => LevelFilter::INFO,
        "DEBUG" => LevelFilter::DEBUG,
        "TRACE" | "NOTSET" => LevelFilter::TRACE,
        _ => {
            return Err(LoggingError::InvalidLevel {
                level: level.to_string(),
            })
        }
    };
    Ok(filter)
}

/// Host identity shown in each line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub hostname: String,
    pub ip_address: String,
}

static LOCAL_HOST: OnceLock<HostIdentity> = OnceLock::new();

fn local_host() -> &'static HostIdentity {
    LOCAL_HOST.get_or_init(|| HostIdentity {
        hostname: local_hostname(),
        ip_address: local_ip_address(),
    })
}

/// Span for one request. Its host fields are empty until [`tag_current_span`].
///
/// Error level, so filters that let any event through keep the span too.
pub fn client_span() -> Span {
    tracing::span!(
        Level::ERROR,
        "client",
        hostname = tracing::field::Empty,
        ip = tracing::field::Empty
    )
}

/// Tag the current [`client_span`] with a client. `None` hostname shows this
/// machine's name; `None` address shows it as unknown. Outside such a span
/// this does nothing.
pub fn tag_current_span(hostname: Option<&str>, ip_address: Option<&str>) {
    let span = Span::current();
    span.record("hostname", hostname.unwrap_or(local_host().hostname.as_str()));
    span.record("ip", ip_address.unwrap_or(UNKNOWN_IP));
}

/// Host identity of the innermost tagged client span, else this machine's.
pub fn current_host() -> HostIdentity {
    Span::current()
        .with_subscriber(|(id, dispatch)| {
            let registry = dispatch.downcast_ref::<Registry>()?;
            let span = registry.span(id)?;
            tagged_host(&span)
        })
        .flatten()
        .unwrap_or_else(|| local_host().clone())
}

fn tagged_host<'a, R: LookupSpan<'a>>(span: &SpanRef<'a, R>) -> Option<HostIdentity> {
    span.scope().find_map(|s| {
        let host = s.extensions().get::<HostIdentity>().cloned();
        host
    })
}

#[derive(Default)]
struct HostFields {
    hostname: Option<String>,
    ip_address: Option<String>,
}

impl HostFields {
    fn apply(self, extensions: &mut ExtensionsMut<'_>) {
        if self.hostname.is_none() && self.ip_address.is_none() {
            return;
        }
        if let Some(host) = extensions.get_mut::<HostIdentity>() {
            self.update(host);
            return;
        }
        let mut host = local_host().clone();
        self.update(&mut host);
        extensions.insert(host);
    }

    fn update(self, host: &mut HostIdentity) {
        if let Some(hostname) = self.hostname {
            host.hostname = hostname;
        }
        if let Some(ip_address) = self.ip_address {
            host.ip_address = ip_address;
        }
    }
}

impl Visit for HostFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "hostname" => self.hostname = Some(value.to_string()),
            "ip" => self.ip_address = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_str(field, &format!("{value:?}"));
    }
}

/// Keeps the `hostname`/`ip` fields of client spans as a [`HostIdentity`] extension.
pub struct HostLayer;

impl<S> Layer<S> for HostLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != CLIENT_SPAN {
            return;
        }
        let mut fields = HostFields::default();
        attrs.record(&mut fields);
        if let Some(span) = ctx.span(id) {
            fields.apply(&mut span.extensions_mut());
        }
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        if span.name() != CLIENT_SPAN {
            return;
        }
        let mut fields = HostFields::default();
        values.record(&mut fields);
        fields.apply(&mut span.extensions_mut());
    }
}

/// `[LEVEL] [hostname/ip] [target:line] message`
pub struct HostFormatter;

impl<S, N> FormatEvent<S, N> for HostFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        let host = ctx
            .lookup_current()
            .and_then(|span| tagged_host(&span))
            .unwrap_or_else(|| local_host().clone());
        write!(
            writer,
            "[{}] [{}/{}] [{}:{}] ",
            meta.level(),
            host.hostname,
            host.ip_address,
            meta.target(),
            meta.line().unwrap_or(0)
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Changes the level of an installed subscriber.
#[derive(Clone)]
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Returns a confirmation line such as `Log level set to DEBUG`.
    pub fn set_level(&self, level: &str) -> Result<String, LoggingError> {
        let filter = parse_level(level)?;
        self.filter.reload(EnvFilter::new(filter.to_string()))?;
        Ok(format!("Log level set to {}", level.trim().to_ascii_uppercase()))
    }
}

/// Install the global subscriber. RUST_LOG wins over `default_level` when set.
pub fn init_logging(default_level: &str) -> Result<LogHandle, LoggingError> {
    let level = parse_level(default_level)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(HostLayer)
        .with(tracing_subscriber::fmt::layer().event_format(HostFormatter))
        .try_init()?;
    Ok(LogHandle { filter: handle })
}

/// In-memory log sink for tests: same layers as [`init_logging`], no filter.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct LogCapture(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
impl LogCapture {
    pub(crate) fn subscriber(&self) -> impl Subscriber + Send + Sync + 'static {
        let writer = self.clone();
        tracing_subscriber::registry().with(HostLayer).with(
            tracing_subscriber::fmt::layer()
                .event_format(HostFormatter)
                .with_ansi(false)
                .with_writer(move || writer.clone()),
        )
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}
