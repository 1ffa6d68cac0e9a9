//! Log layer that invalidates the run on the first ERROR event

use crate::observer::RunObserver;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Reason recorded when the layer fires
pub const ERROR_TRIGGER_REASON: &str = "TriggerOnErrorOrWorseLogAppender observed an ERROR or worse. \
     Invalidating TestRun. Please see the Log for more Details.";

/// Watches every log event and invalidates the run once an ERROR is seen.
///
/// The layer fires at most once. Events emitted from threads whose whole name
/// matches a whitelist pattern are ignored.
#[derive(Debug, Clone)]
pub struct ErrorTriggerLayer {
    observer: RunObserver,
    armed: Arc<AtomicBool>,
    thread_whitelist: Arc<Vec<Regex>>,
}

impl ErrorTriggerLayer {
    pub fn new(observer: RunObserver) -> Self {
        Self {
            observer,
            armed: Arc::new(AtomicBool::new(true)),
            thread_whitelist: Arc::new(Vec::new()),
        }
    }

    /// Ignore events logged from threads whose name matches one of `patterns`
    pub fn with_thread_whitelist<I, S>(mut self, patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let whitelist = patterns
            .into_iter()
            .map(|p| Regex::new(&format!("^(?:{})$", p.as_ref())))
            .collect::<Result<Vec<_>, _>>()?;
        self.thread_whitelist = Arc::new(whitelist);
        Ok(self)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    fn is_whitelisted_thread(&self) -> bool {
        if self.thread_whitelist.is_empty() {
            return false;
        }
        let current = std::thread::current();
        current
            .name()
            .map(|name| self.thread_whitelist.iter().any(|w| w.is_match(name)))
            .unwrap_or(false)
    }
}

impl<S: Subscriber> Layer<S> for ErrorTriggerLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR || self.is_whitelisted_thread() {
            return;
        }
        if self.armed.swap(false, Ordering::SeqCst) {
            self.observer.invalidate(ERROR_TRIGGER_REASON);
        }
    }
}
