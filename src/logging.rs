//! Structured logging.
//!
//! Two JSON sinks (`error.log` with errors only, `combined.log` with
//! everything at or above the base level) plus a human readable console sink
//! outside production. Every sink runs records through the same redaction:
//! `password` fields are masked, `apiKey` fields are dropped and card-like
//! `dddd-dddd-dddd-dddd` sequences are masked in strings.

use std::{borrow::Cow, fmt, path::Path};

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{
    field::{Field, Visit},
    level_filters::LevelFilter,
    Event, Subscriber,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    field::RecordFields,
    fmt::{
        format::{DefaultFields, Format, Full, Writer},
        layer as fmt_layer, FmtContext, FormatEvent, FormatFields, Layer as FmtLayer, MakeWriter,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::Environment;

pub const SERVICE_NAME: &str = "shanks_web_app_backend";

const MASKED: &str = "****";
const MASKED_CARD: &str = "****-****-****-****";

lazy_static! {
    static ref CARD_RE: Regex = Regex::new(r"\d{4}-\d{4}-\d{4}-\d{4}").unwrap();
}

/// Keeps the non-blocking file writers alive; drop flushes them.
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

pub fn init(env: Environment, log_dir: &Path) -> anyhow::Result<LogGuards> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("create log directory {}", log_dir.display()))?;

    let (error_writer, error_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, "error.log"));
    let (combined_writer, combined_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, "combined.log"));

    let console = (!env.is_production()).then(|| console_layer().with_filter(console_filter()));

    tracing_subscriber::registry()
        .with(json_layer(error_writer).with_filter(LevelFilter::ERROR))
        .with(json_layer(combined_writer).with_filter(base_filter(env)))
        .with(console)
        .try_init()
        .context("install tracing subscriber")?;

    Ok(LogGuards {
        _guards: vec![error_guard, combined_guard],
    })
}

fn base_filter(env: Environment) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if env.is_production() { "info" } else { "debug" };
        EnvFilter::new(format!("{level},hyper=info,h2=info,sqlx=warn,tower_http=info"))
    })
}

fn console_filter() -> EnvFilter {
    EnvFilter::new("debug,hyper=info,h2=info,sqlx=warn,tower_http=debug")
}

/// JSON lines sink with redaction.
pub fn json_layer<S, W>(writer: W) -> FmtLayer<S, DefaultFields, RedactedJson, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fmt_layer()
        .with_ansi(false)
        .event_format(RedactedJson::new(SERVICE_NAME))
        .with_writer(writer)
}

/// Human readable stdout sink with redaction.
pub fn console_layer<S>() -> FmtLayer<S, RedactedFields, Format<Full>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt_layer().with_target(true).fmt_fields(RedactedFields)
}

/// Applies the redaction rules to a flat (or nested) field map in place.
pub fn redact(fields: &mut Map<String, Value>) {
    fields.retain(|key, _| leaf(key) != "apiKey");
    for (key, value) in fields.iter_mut() {
        if leaf(key) == "password" {
            *value = Value::String(MASKED.into());
            continue;
        }
        match value {
            Value::String(s) => {
                if let Cow::Owned(masked) = mask_card_numbers(s) {
                    *s = masked;
                }
            }
            Value::Object(nested) => redact(nested),
            _ => {}
        }
    }
}

pub fn mask_card_numbers(text: &str) -> Cow<'_, str> {
    CARD_RE.replace_all(text, MASKED_CARD)
}

// `error.password` is how nested fields are spelled in tracing macros.
fn leaf(key: &str) -> &str {
    key.rsplit('.').next().unwrap_or(key)
}

#[derive(Default)]
struct FieldMap(Map<String, Value>);

impl FieldMap {
    fn insert(&mut self, field: &Field, value: Value) {
        self.0.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldMap {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }
}

/// Event formatter writing one redacted JSON object per line.
pub struct RedactedJson {
    service: &'static str,
}

impl RedactedJson {
    pub fn new(service: &'static str) -> Self {
        Self { service }
    }
}

impl<S, N> FormatEvent<S, N> for RedactedJson
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let mut fields = FieldMap::default();
        event.record(&mut fields);
        redact(&mut fields.0);

        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|_| fmt::Error)?;

        let mut record = Map::new();
        record.insert("timestamp".into(), timestamp.into());
        record.insert("level".into(), meta.level().as_str().to_lowercase().into());
        record.insert("service".into(), self.service.into());
        record.insert("target".into(), meta.target().into());
        if let Some(scope) = ctx.event_scope() {
            let spans: Vec<Value> = scope
                .from_root()
                .map(|span| Value::String(span.name().to_string()))
                .collect();
            if !spans.is_empty() {
                record.insert("spans".into(), Value::Array(spans));
            }
        }
        record.extend(fields.0);

        let line = serde_json::to_string(&record).map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

/// Field formatter for the console sink: `message key=value ...`.
pub struct RedactedFields;

impl<'writer> FormatFields<'writer> for RedactedFields {
    fn format_fields<R: RecordFields>(&self, mut writer: Writer<'writer>, fields: R) -> fmt::Result {
        let mut map = FieldMap::default();
        fields.record(&mut map);
        redact(&mut map.0);

        let mut first = true;
        if let Some(message) = map.0.remove("message") {
            write_value(&mut writer, &message)?;
            first = false;
        }
        for (key, value) in &map.0 {
            if !first {
                writer.write_char(' ')?;
            }
            first = false;
            write!(writer, "{key}=")?;
            write_value(&mut writer, value)?;
        }
        Ok(())
    }
}

fn write_value(writer: &mut Writer<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => writer.write_str(s),
        other => write!(writer, "{other}"),
    }
}
