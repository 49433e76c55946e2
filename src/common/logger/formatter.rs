use core::fmt as core_fmt;
use std::fs;

use tracing::{Event, Subscriber};
use tracing_subscriber::{
    fmt::{
        self, FmtContext,
        format::{FormatEvent, FormatFields},
    },
    registry::LookupSpan,
};

/// Resident set size of this process, read from procfs. Empty off Linux.
pub fn rss_label() -> Option<String> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(human_kb(kb))
}

fn human_kb(kb: f64) -> String {
    if kb < 1024.0 {
        format!("{:.2} KB", kb)
    } else if kb < 1024.0 * 1024.0 {
        format!("{:.2} MB", kb / 1024.0)
    } else {
        format!("{:.2} GB", kb / (1024.0 * 1024.0))
    }
}

pub struct CustomFormatter {
    use_ansi: bool,
}

impl CustomFormatter {
    pub fn new(use_ansi: bool) -> Self {
        Self { use_ansi }
    }

    fn paint(&self, code: &'static str) -> &'static str {
        if self.use_ansi { code } else { "" }
    }
}

impl<S, N> FormatEvent<S, N> for CustomFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: fmt::format::Writer<'_>,
        event: &Event<'_>,
    ) -> core_fmt::Result {
        let reset = self.paint("\x1b[0m");
        let bold = self.paint("\x1b[1m");
        let dim = self.paint("\x1b[2m");

        if let Some(rss) = rss_label() {
            write!(writer, "{}[{}]{} ", dim, rss, reset)?;
        }

        let format = time::macros::format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
        );
        let now =
            time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
        let timestamp = now
            .format(&format)
            .unwrap_or_else(|_| "Unknown Time".to_string());
        write!(writer, "{}[{}]{} ", dim, timestamp, reset)?;

        let metadata = event.metadata();
        let level = *metadata.level();
        let color = self.paint(match level {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            tracing::Level::DEBUG => "\x1b[34m",
            tracing::Level::TRACE => "\x1b[35m",
        });
        write!(writer, "{}{}{: <5}{} ", color, bold, level.to_string(), reset)?;

        let line = metadata
            .line()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "??".to_string());
        write!(writer, "{}{}:{}{} ", dim, metadata.target(), line, reset)?;

        // Enclosing spans, outermost first.
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}{}{} ", bold, span.name(), reset)?;
            }
        }

        write!(writer, "> ")?;
        ctx.format_fields(writer.by_ref(), event)?;
        write!(writer, "{}", reset)?;

        writeln!(writer)
    }
}
