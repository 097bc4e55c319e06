//! Tracing subscriber for the service binary.

use std::{
    fmt::Write,
    sync::atomic::Ordering,
    time::{Duration, Instant},
};

use atomic_time::AtomicInstant;
use tap::Pipe;
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tracing_tree::{HierarchicalLayer, time::FormatTime};

/// Install the global subscriber: hierarchical output, span traces for
/// `color_eyre` reports, and `RUST_LOG` filtering defaulting to INFO.
pub fn init() {
    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(
            HierarchicalLayer::default()
                .with_indent_lines(true)
                .with_indent_amount(2)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_verbose_exit(false)
                .with_verbose_entry(false)
                .with_deferred_spans(true)
                .with_bracketed_fields(true)
                .with_span_retrace(true)
                .with_timer(ServiceClock::default())
                .with_targets(false),
        )
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

/// Stamps each event with the service uptime and the gap since the previous
/// event.
pub struct ServiceClock {
    started: Instant,
    last_event: AtomicInstant,
}

impl ServiceClock {
    /// Time since the previous call, or since startup on the first call.
    /// Relaxed ordering: concurrent events may see slightly skewed gaps.
    fn gap(&self) -> Duration {
        self.last_event
            .swap(Instant::now(), Ordering::Relaxed)
            .pipe(|prior| prior.elapsed())
    }
}

impl Default for ServiceClock {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_event: AtomicInstant::new(now),
        }
    }
}

impl FormatTime for ServiceClock {
    fn format_time(&self, w: &mut impl Write) -> std::fmt::Result {
        write!(w, "{:.03}s", self.started.elapsed().as_secs_f64())
    }

    // The span-relative `elapsed` is ignored in favour of the gap between
    // consecutive events.
    fn style_timestamp(&self, _ansi: bool, _elapsed: Duration, w: &mut impl Write) -> std::fmt::Result {
        write!(w, "{: >3}ms", self.gap().as_millis())
    }
}
