//! Logging initialization.
//!
//! One explicit construction at process start: a non-ANSI file layer
//! appending to `BASE/logs/sync.log` plus an optional stderr layer for
//! foreground use. The returned guard must be held for the life of the
//! process so the non-blocking file writer flushes on shutdown.

use tracing::{Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::corpus::paths::CorpusPaths;
use crate::error::Result;

/// `sync.log` line format: `[ISO] [LEVEL] message`.
struct SyncLogFormat;

impl<S, N> FormatEvent<S, N> for SyncLogFormat
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
        let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        write!(writer, "[{}] [{}] ", stamp, event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the global subscriber. Safe to call once per process; later
/// calls are no-ops (the first subscriber wins).
pub fn init(paths: &CorpusPaths, stderr: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(paths.log_dir())?;

    let appender = tracing_appender::rolling::never(paths.log_dir(), "sync.log");
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("maildeck=info,warn"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .event_format(SyncLogFormat);

    let stderr_layer = stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init();

    Ok(guard)
}
