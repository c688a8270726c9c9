//! Readiness poller: wait for an asynchronously produced value, then act on it once.

use crate::backoff::BackoffSchedule;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// `finalize` ran at the check scheduled `after` the start.
    Finalized { after: Duration },
    /// Every scheduled check came up empty.
    TimedOut { waited: Duration },
}

impl PollOutcome {
    pub fn is_finalized(&self) -> bool {
        matches!(self, PollOutcome::Finalized { .. })
    }
}

/// Checks `getter` at each offset of a [`BackoffSchedule`], measured from
/// the start, and hands the first value it yields to `finalize`.
///
/// One task walks the schedule and stops at the first hit, so `finalize`
/// runs at most once and no check outlives it. If the last check finds
/// nothing a single timeout warning is logged.
pub struct ReadinessPoller<G, F> {
    getter: G,
    finalize: F,
    schedule: BackoffSchedule,
    label: String,
}

impl<T, G, F> ReadinessPoller<G, F>
where
    G: FnMut() -> Option<T>,
    F: FnOnce(T),
{
    pub fn new(getter: G, finalize: F) -> Self {
        Self {
            getter,
            finalize,
            schedule: BackoffSchedule::default(),
            label: "artifact".to_string(),
        }
    }

    pub fn with_schedule(mut self, schedule: BackoffSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Name used in log lines.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub async fn run(self) -> PollOutcome {
        let Self {
            mut getter,
            finalize,
            schedule,
            label,
        } = self;
        let started = Instant::now();

        for delay in schedule.delays() {
            sleep_until(started + delay).await;
            if let Some(value) = getter() {
                debug!(label = %label, after_ms = delay.as_millis() as u64, "ready, finalizing");
                finalize(value);
                return PollOutcome::Finalized { after: delay };
            }
        }

        let waited = schedule.last_delay().unwrap_or_default();
        warn!(
            label = %label,
            waited_ms = waited.as_millis() as u64,
            "Timeout waiting for {label}"
        );
        PollOutcome::TimedOut { waited }
    }

    /// Run on a background task; the caller never waits.
    pub fn spawn(self) -> JoinHandle<PollOutcome>
    where
        T: Send + 'static,
        G: Send + 'static,
        F: Send + 'static,
    {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::slot::readiness_slot;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    /// Formatted log output of the current thread, for counting log lines.
    #[derive(Clone, Default)]
    pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl CapturedLogs {
        /// Install as the thread's default subscriber until the guard drops.
        pub(crate) fn install() -> (Self, tracing::subscriber::DefaultGuard) {
            let logs = Self::default();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(logs.clone())
                .with_ansi(false)
                .finish();
            let guard = tracing::subscriber::set_default(subscriber);
            (logs, guard)
        }

        pub(crate) fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn finalizes_at_first_check_after_ready() {
        let (writer, reader) = readiness_slot::<&'static str>();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            writer.fill("csv");
        });

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let started = Instant::now();
        let outcome = ReadinessPoller::new(reader.getter(), move |value| {
            assert_eq!(value, "csv");
            assert_eq!(started.elapsed(), Duration::from_millis(400));
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .spawn()
        .await
        .unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Finalized {
                after: Duration::from_millis(400)
            }
        );
        // Later checks never happen once finalized.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_before_first_check() {
        let (writer, reader) = readiness_slot::<u8>();
        writer.fill(1);
        let outcome = ReadinessPoller::new(reader.getter(), |_| {}).run().await;
        assert!(outcome.is_finalized());
        assert_eq!(
            outcome,
            PollOutcome::Finalized {
                after: Duration::from_millis(100)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_last_check_with_one_warning() {
        let (logs, _guard) = CapturedLogs::install();

        let (_writer, reader) = readiness_slot::<u8>();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let started = Instant::now();
        let outcome = ReadinessPoller::new(reader.getter(), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .with_label("export")
        .run()
        .await;

        assert!(!outcome.is_finalized());
        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                waited: Duration::from_millis(12800)
            }
        );
        assert_eq!(started.elapsed(), Duration::from_millis(12800));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(logs.text().matches("Timeout waiting for export").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_schedule() {
        let mut checks = 0;
        let outcome = ReadinessPoller::new(
            || {
                checks += 1;
                (checks == 3).then_some(())
            },
            |_| {},
        )
        .with_schedule(BackoffSchedule::new(10, 1000))
        .run()
        .await;
        assert_eq!(
            outcome,
            PollOutcome::Finalized {
                after: Duration::from_millis(40)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_schedule_times_out_immediately() {
        let outcome = ReadinessPoller::new(|| Some(()), |_| panic!("must not finalize"))
            .with_schedule(BackoffSchedule::new(0, 0))
            .run()
            .await;
        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                waited: Duration::ZERO
            }
        );
    }
}
