//! Copy and download actions.
//!
//! Each trigger gets its own context and readiness slot. The producer fills
//! the slot in the background while a poller waits for it; once the artifact
//! is there it goes to the clipboard or to a file.

use crate::backoff::BackoffSchedule;
use crate::encode::artifact_bytes;
use crate::poller::{PollOutcome, ReadinessPoller};
use crate::producer::{producer_for, ViewHost};
use crate::slot::readiness_slot;
use crate::ExportError;
use pf_core::artifact::{Artifact, ViewMode};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportAction {
    Copy,
    Download,
}

impl fmt::Display for ExportAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportAction::Copy => write!(f, "copy"),
            ExportAction::Download => write!(f, "download"),
        }
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

pub trait ClipboardTarget: Send + Sync {
    fn set_text(&self, text: String) -> Result<(), ExportError>;

    /// `rgba` holds `width * height` 8-bit RGBA pixels.
    fn set_image(&self, width: usize, height: usize, rgba: Vec<u8>) -> Result<(), ExportError>;
}

pub trait FileTarget: Send + Sync {
    /// Store `bytes` under `file_name`; returns where they went.
    fn save(&self, file_name: &str, mime: &str, bytes: &[u8]) -> Result<PathBuf, ExportError>;
}

/// The OS clipboard. A handle is opened per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl ClipboardTarget for SystemClipboard {
    fn set_text(&self, text: String) -> Result<(), ExportError> {
        arboard::Clipboard::new()
            .and_then(|mut clipboard| clipboard.set_text(text))
            .map_err(|e| ExportError::Clipboard(e.to_string()))
    }

    fn set_image(&self, width: usize, height: usize, rgba: Vec<u8>) -> Result<(), ExportError> {
        arboard::Clipboard::new()
            .and_then(|mut clipboard| {
                clipboard.set_image(arboard::ImageData {
                    width,
                    height,
                    bytes: Cow::Owned(rgba),
                })
            })
            .map_err(|e| ExportError::Clipboard(e.to_string()))
    }
}

/// Writes downloads into a directory, replacing any file of the same name.
#[derive(Debug, Clone)]
pub struct DirectoryTarget {
    dir: PathBuf,
}

impl DirectoryTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The user's download directory, falling back to the home directory.
    pub fn downloads() -> Result<Self, ExportError> {
        dirs::download_dir()
            .or_else(dirs::home_dir)
            .map(Self::new)
            .ok_or_else(|| {
                ExportError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no download directory",
                ))
            })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FileTarget for DirectoryTarget {
    fn save(&self, file_name: &str, _mime: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Exporter
// ---------------------------------------------------------------------------

/// Identity of one user action.
#[derive(Debug, Clone, Copy)]
struct ExportContext {
    id: Uuid,
    action: ExportAction,
    mode: ViewMode,
}

/// What a finished export did.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub id: Uuid,
    pub action: ExportAction,
    pub mode: ViewMode,
    /// Offset of the readiness check that found the artifact.
    pub after: Duration,
    pub artifact: Artifact,
    /// Set for downloads.
    pub saved_to: Option<PathBuf>,
}

/// Handle to a triggered export. Dropping it does not cancel the export.
#[derive(Debug)]
pub struct ExportTicket {
    pub id: Uuid,
    pub action: ExportAction,
    pub mode: ViewMode,
    task: JoinHandle<Result<ExportReport, ExportError>>,
}

impl ExportTicket {
    pub async fn wait(self) -> Result<ExportReport, ExportError> {
        self.task
            .await
            .map_err(|e| ExportError::Task(e.to_string()))?
    }
}

pub struct Exporter {
    host: Arc<dyn ViewHost>,
    clipboard: Arc<dyn ClipboardTarget>,
    files: Arc<dyn FileTarget>,
    schedule: BackoffSchedule,
}

impl Exporter {
    pub fn new(
        host: Arc<dyn ViewHost>,
        clipboard: Arc<dyn ClipboardTarget>,
        files: Arc<dyn FileTarget>,
    ) -> Self {
        Self {
            host,
            clipboard,
            files,
            schedule: BackoffSchedule::default(),
        }
    }

    pub fn with_schedule(mut self, schedule: BackoffSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Start an export and return immediately. Must be called inside a Tokio
    /// runtime.
    pub fn trigger(&self, action: ExportAction) -> ExportTicket {
        let ctx = ExportContext {
            id: Uuid::new_v4(),
            action,
            mode: self.host.view_mode(),
        };
        info!(id = %ctx.id, action = %ctx.action, mode = ?ctx.mode, "export triggered");

        let (writer, reader) = readiness_slot();
        let producer = producer_for(ctx.mode, self.host.clone());
        tokio::spawn(async move {
            if let Err(e) = producer.produce(writer).await {
                error!(id = %ctx.id, error = %e, "artifact production failed");
            }
        });

        let clipboard = self.clipboard.clone();
        let files = self.files.clone();
        let schedule = self.schedule;
        let task = tokio::spawn(async move {
            let result = run_export(ctx, reader.getter(), schedule, clipboard, files).await;
            match &result {
                // The poller has already warned about the timeout.
                Err(ExportError::Timeout { .. }) | Ok(_) => {}
                Err(e) => error!(id = %ctx.id, action = %ctx.action, error = %e, "export failed"),
            }
            result
        });

        ExportTicket {
            id: ctx.id,
            action,
            mode: ctx.mode,
            task,
        }
    }
}

async fn run_export(
    ctx: ExportContext,
    getter: impl FnMut() -> Option<Artifact>,
    schedule: BackoffSchedule,
    clipboard: Arc<dyn ClipboardTarget>,
    files: Arc<dyn FileTarget>,
) -> Result<ExportReport, ExportError> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let outcome = ReadinessPoller::new(getter, move |artifact| {
        let _ = ready_tx.send(artifact);
    })
    .with_schedule(schedule)
    .with_label(format!("{} {}", ctx.action, ctx.id))
    .run()
    .await;

    let after = match outcome {
        PollOutcome::Finalized { after } => after,
        PollOutcome::TimedOut { waited } => {
            return Err(ExportError::Timeout {
                waited_ms: waited.as_millis() as u64,
            })
        }
    };
    let artifact = ready_rx
        .await
        .map_err(|e| ExportError::Task(e.to_string()))?;

    let delivered = artifact.clone();
    let saved_to = tokio::task::spawn_blocking(move || {
        deliver(ctx.action, &delivered, clipboard.as_ref(), files.as_ref())
    })
    .await
    .map_err(|e| ExportError::Task(e.to_string()))??;

    info!(
        id = %ctx.id,
        action = %ctx.action,
        after_ms = after.as_millis() as u64,
        file = artifact.file_name(),
        "export delivered"
    );
    Ok(ExportReport {
        id: ctx.id,
        action: ctx.action,
        mode: ctx.mode,
        after,
        artifact,
        saved_to,
    })
}

fn deliver(
    action: ExportAction,
    artifact: &Artifact,
    clipboard: &dyn ClipboardTarget,
    files: &dyn FileTarget,
) -> Result<Option<PathBuf>, ExportError> {
    match (action, artifact) {
        (ExportAction::Copy, Artifact::TabularSnapshot(_)) => {
            let text = String::from_utf8_lossy(&artifact_bytes(artifact)).into_owned();
            clipboard.set_text(text)?;
            Ok(None)
        }
        (ExportAction::Copy, Artifact::ImageBlob { bytes, .. }) => {
            let rgba = image::load_from_memory(bytes)?.to_rgba8();
            let (width, height) = rgba.dimensions();
            clipboard.set_image(width as usize, height as usize, rgba.into_raw())?;
            Ok(None)
        }
        (ExportAction::Download, _) => {
            let path = files.save(artifact.file_name(), artifact.mime(), &artifact_bytes(artifact))?;
            Ok(Some(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::tests::CapturedLogs;
    use crate::producer::tests::png_of;
    use crate::producer::{SnapshotHost, VisualCapture};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        texts: Mutex<Vec<String>>,
        images: Mutex<Vec<(usize, usize, usize)>>,
        files: Mutex<Vec<(String, String, Vec<u8>)>>,
    }

    impl ClipboardTarget for Recorder {
        fn set_text(&self, text: String) -> Result<(), ExportError> {
            self.texts.lock().unwrap().push(text);
            Ok(())
        }

        fn set_image(&self, width: usize, height: usize, rgba: Vec<u8>) -> Result<(), ExportError> {
            self.images.lock().unwrap().push((width, height, rgba.len()));
            Ok(())
        }
    }

    impl FileTarget for Recorder {
        fn save(&self, file_name: &str, mime: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
            self.files
                .lock()
                .unwrap()
                .push((file_name.to_string(), mime.to_string(), bytes.to_vec()));
            Ok(PathBuf::from(file_name))
        }
    }

    /// Answers the n-th `rows()` call after `delays[n]` with `[{"call": n}]`.
    struct StaggeredHost {
        delays: Vec<Duration>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ViewHost for StaggeredHost {
        fn view_mode(&self) -> ViewMode {
            ViewMode::Tabular
        }

        async fn rows(&self) -> Result<Vec<Value>, ExportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delays[n]).await;
            Ok(vec![json!({ "call": n })])
        }

        async fn capture(&self) -> Result<VisualCapture, ExportError> {
            Err(ExportError::Produce("tabular only".into()))
        }
    }

    struct NeverReady;

    #[async_trait]
    impl ViewHost for NeverReady {
        fn view_mode(&self) -> ViewMode {
            ViewMode::Tabular
        }

        async fn rows(&self) -> Result<Vec<Value>, ExportError> {
            std::future::pending().await
        }

        async fn capture(&self) -> Result<VisualCapture, ExportError> {
            std::future::pending().await
        }
    }

    fn exporter(host: impl ViewHost + 'static, recorder: &Arc<Recorder>) -> Exporter {
        Exporter::new(Arc::new(host), recorder.clone(), recorder.clone())
    }

    #[tokio::test]
    async fn download_csv_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let host = SnapshotHost::tabular(vec![json!({"a": 1, "b": 2}), json!({"a": 3, "b": 4})]);
        let exporter = Exporter::new(
            Arc::new(host),
            Arc::new(Recorder::default()),
            Arc::new(DirectoryTarget::new(dir.path())),
        );
        assert_eq!(DirectoryTarget::new(dir.path()).dir(), dir.path());

        let report = exporter.trigger(ExportAction::Download).wait().await.unwrap();
        let path = report.saved_to.unwrap();
        assert_eq!(path, dir.path().join("psp.csv"));
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "a, b\r\n1, 2\r\n3, 4\r\n"
        );
        assert_eq!(report.after, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn copy_csv_sets_clipboard_text() {
        let recorder = Arc::new(Recorder::default());
        let exporter = exporter(SnapshotHost::tabular(vec![json!({"x": "y"})]), &recorder);

        let report = exporter.trigger(ExportAction::Copy).wait().await.unwrap();
        assert!(report.saved_to.is_none());
        assert_eq!(*recorder.texts.lock().unwrap(), vec!["x\r\ny\r\n".to_string()]);
        assert!(recorder.files.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn copy_image_sets_clipboard_pixels() {
        let recorder = Arc::new(Recorder::default());
        let host = SnapshotHost::visual(VisualCapture {
            width: 3,
            height: 2,
            encoded: png_of(3, 2, [0, 128, 255, 255]),
        });
        let exporter = exporter(host, &recorder);

        let ticket = exporter.trigger(ExportAction::Copy);
        assert_eq!(ticket.mode, ViewMode::Visual);
        ticket.wait().await.unwrap();
        assert_eq!(*recorder.images.lock().unwrap(), vec![(3, 2, 3 * 2 * 4)]);
    }

    #[tokio::test]
    async fn download_image_saves_png() {
        let recorder = Arc::new(Recorder::default());
        let host = SnapshotHost::from_image(png_of(2, 2, [9, 9, 9, 255])).unwrap();
        let exporter = exporter(host, &recorder);

        exporter.trigger(ExportAction::Download).wait().await.unwrap();
        let files = recorder.files.lock().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "psp.png");
        assert_eq!(files[0].1, "image/png");
        assert!(files[0].2.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[tokio::test(start_paused = true)]
    async fn quick_succession_keeps_slots_apart() {
        let recorder = Arc::new(Recorder::default());
        let host = StaggeredHost {
            delays: vec![Duration::from_millis(900), Duration::from_millis(150)],
            calls: AtomicUsize::new(0),
        };
        let exporter = exporter(host, &recorder);

        let first = exporter.trigger(ExportAction::Download);
        let second = exporter.trigger(ExportAction::Download);
        assert_ne!(first.id, second.id);

        let second = second.wait().await.unwrap();
        let first = first.wait().await.unwrap();

        assert_eq!(first.after, Duration::from_millis(1600));
        assert_eq!(
            first.artifact,
            Artifact::TabularSnapshot(vec![json!({"call": 0})])
        );
        assert_eq!(second.after, Duration::from_millis(200));
        assert_eq!(
            second.artifact,
            Artifact::TabularSnapshot(vec![json!({"call": 1})])
        );
        assert_eq!(recorder.files.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn never_ready_times_out_without_delivery() {
        let recorder = Arc::new(Recorder::default());
        let exporter = exporter(NeverReady, &recorder);
        let (logs, _guard) = CapturedLogs::install();

        let err = exporter.trigger(ExportAction::Copy).wait().await.unwrap_err();
        assert!(matches!(err, ExportError::Timeout { waited_ms: 12800 }), "{err}");
        assert!(recorder.texts.lock().unwrap().is_empty());

        let text = logs.text();
        let problems: Vec<&str> = text
            .lines()
            .filter(|line| line.contains("WARN") || line.contains("ERROR"))
            .collect();
        assert_eq!(problems.len(), 1, "{text}");
        assert!(problems[0].contains("Timeout waiting for copy"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_production_times_out() {
        let recorder = Arc::new(Recorder::default());
        let host = SnapshotHost::tabular(vec![]);
        // A tabular host asked for an image never fills the slot.
        let exporter = Exporter::new(
            Arc::new(VisualOnly(host)),
            recorder.clone(),
            recorder.clone(),
        )
        .with_schedule(BackoffSchedule::new(100, 400));

        let err = exporter.trigger(ExportAction::Download).wait().await.unwrap_err();
        assert!(matches!(err, ExportError::Timeout { waited_ms: 400 }), "{err}");
        assert!(recorder.files.lock().unwrap().is_empty());
    }

    struct VisualOnly(SnapshotHost);

    #[async_trait]
    impl ViewHost for VisualOnly {
        fn view_mode(&self) -> ViewMode {
            ViewMode::Visual
        }

        async fn rows(&self) -> Result<Vec<Value>, ExportError> {
            self.0.rows().await
        }

        async fn capture(&self) -> Result<VisualCapture, ExportError> {
            self.0.capture().await
        }
    }

    #[test]
    fn action_names() {
        assert_eq!(ExportAction::Copy.to_string(), "copy");
        assert_eq!(ExportAction::Download.to_string(), "download");
        assert_eq!(
            serde_json::from_str::<ExportAction>("\"download\"").unwrap(),
            ExportAction::Download
        );
    }
}
