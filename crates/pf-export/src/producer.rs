//! Artifact producers: turn the current view into a tabular snapshot or a PNG.

use crate::slot::SlotWriter;
use crate::ExportError;
use async_trait::async_trait;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use pf_core::artifact::{Artifact, ViewMode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// An encoded frame of the rendered view plus the size to export it at.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualCapture {
    pub width: u32,
    pub height: u32,
    /// Any format `image` can decode (PNG, JPEG).
    pub encoded: Vec<u8>,
}

/// The visualization an export reads from.
#[async_trait]
pub trait ViewHost: Send + Sync {
    fn view_mode(&self) -> ViewMode;

    /// Current rows of the view.
    async fn rows(&self) -> Result<Vec<Value>, ExportError>;

    /// Current rendering of the view.
    async fn capture(&self) -> Result<VisualCapture, ExportError>;
}

#[async_trait]
pub trait ArtifactProducer: Send + Sync {
    /// Build the artifact and fill `slot`. On error the slot stays empty.
    async fn produce(&self, slot: SlotWriter) -> Result<(), ExportError>;
}

pub fn producer_for(mode: ViewMode, host: Arc<dyn ViewHost>) -> Box<dyn ArtifactProducer> {
    match mode {
        ViewMode::Tabular => Box::new(TabularProducer::new(host)),
        ViewMode::Visual => Box::new(VisualProducer::new(host)),
    }
}

// ---------------------------------------------------------------------------
// Tabular
// ---------------------------------------------------------------------------

pub struct TabularProducer {
    host: Arc<dyn ViewHost>,
}

impl TabularProducer {
    pub fn new(host: Arc<dyn ViewHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl ArtifactProducer for TabularProducer {
    async fn produce(&self, slot: SlotWriter) -> Result<(), ExportError> {
        let rows = self.host.rows().await?;
        debug!(rows = rows.len(), "tabular snapshot ready");
        slot.fill(Artifact::TabularSnapshot(rows));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Visual
// ---------------------------------------------------------------------------

pub struct VisualProducer {
    host: Arc<dyn ViewHost>,
}

impl VisualProducer {
    pub fn new(host: Arc<dyn ViewHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl ArtifactProducer for VisualProducer {
    async fn produce(&self, slot: SlotWriter) -> Result<(), ExportError> {
        let capture = self.host.capture().await?;
        if capture.width == 0 || capture.height == 0 {
            return Err(ExportError::Produce(format!(
                "empty capture: {}x{}",
                capture.width, capture.height
            )));
        }
        let VisualCapture {
            width,
            height,
            encoded,
        } = capture;

        let frame = tokio::task::spawn_blocking(move || image::load_from_memory(&encoded))
            .await
            .map_err(|e| ExportError::Task(format!("decode task failed: {e}")))??
            .to_rgba8();

        let png = tokio::task::spawn_blocking(move || render_png(&frame, width, height))
            .await
            .map_err(|e| ExportError::Task(format!("render task failed: {e}")))??;

        debug!(width, height, bytes = png.len(), "image artifact ready");
        slot.fill(Artifact::png(png));
        Ok(())
    }
}

/// Draw `frame` onto a transparent surface of the target size and encode it.
fn render_png(frame: &RgbaImage, width: u32, height: u32) -> Result<Vec<u8>, ExportError> {
    let mut surface = RgbaImage::new(width, height);
    if frame.dimensions() == (width, height) {
        imageops::overlay(&mut surface, frame, 0, 0);
    } else {
        let scaled = imageops::resize(frame, width, height, FilterType::Triangle);
        imageops::overlay(&mut surface, &scaled, 0, 0);
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(surface.as_raw(), width, height, ExtendedColorType::Rgba8)?;
    Ok(png)
}

// ---------------------------------------------------------------------------
// SnapshotHost
// ---------------------------------------------------------------------------

/// A view frozen at construction: fixed rows or a fixed image.
#[derive(Debug, Clone)]
pub struct SnapshotHost {
    mode: ViewMode,
    rows: Vec<Value>,
    capture: Option<VisualCapture>,
    delay: Duration,
}

impl SnapshotHost {
    pub fn tabular(rows: Vec<Value>) -> Self {
        Self {
            mode: ViewMode::Tabular,
            rows,
            capture: None,
            delay: Duration::ZERO,
        }
    }

    pub fn visual(capture: VisualCapture) -> Self {
        Self {
            mode: ViewMode::Visual,
            rows: Vec::new(),
            capture: Some(capture),
            delay: Duration::ZERO,
        }
    }

    /// Visual host exporting `encoded` at its own size.
    pub fn from_image(encoded: Vec<u8>) -> Result<Self, ExportError> {
        let decoded = image::load_from_memory(&encoded)?;
        Ok(Self::visual(VisualCapture {
            width: decoded.width(),
            height: decoded.height(),
            encoded,
        }))
    }

    /// Simulated render latency before rows or the capture are returned.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ViewHost for SnapshotHost {
    fn view_mode(&self) -> ViewMode {
        self.mode
    }

    async fn rows(&self) -> Result<Vec<Value>, ExportError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.rows.clone())
    }

    async fn capture(&self) -> Result<VisualCapture, ExportError> {
        tokio::time::sleep(self.delay).await;
        self.capture
            .clone()
            .ok_or_else(|| ExportError::Produce("view has no rendering".to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::slot::readiness_slot;
    use image::Rgba;
    use serde_json::json;

    pub(crate) fn png_of(width: u32, height: u32, pixel: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(pixel));
        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
            .unwrap();
        png
    }

    #[tokio::test]
    async fn tabular_fills_rows() {
        let host = Arc::new(SnapshotHost::tabular(vec![json!({"a": 1})]));
        let (writer, reader) = readiness_slot();
        producer_for(ViewMode::Tabular, host).produce(writer).await.unwrap();
        assert_eq!(
            reader.get(),
            Some(&Artifact::TabularSnapshot(vec![json!({"a": 1})]))
        );
    }

    #[tokio::test]
    async fn visual_renders_png_at_target_size() {
        let host = Arc::new(SnapshotHost::visual(VisualCapture {
            width: 4,
            height: 2,
            encoded: png_of(2, 1, [255, 0, 0, 255]),
        }));
        let (writer, reader) = readiness_slot();
        producer_for(ViewMode::Visual, host).produce(writer).await.unwrap();

        let Some(Artifact::ImageBlob { bytes, mime }) = reader.get() else {
            panic!("expected an image artifact");
        };
        assert_eq!(mime, "image/png");
        let decoded = image::load_from_memory(bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 2));
        assert_eq!(decoded.get_pixel(3, 1), &Rgba([255, 0, 0, 255]));
    }

    #[tokio::test]
    async fn undecodable_capture_leaves_slot_empty() {
        let host = Arc::new(SnapshotHost::visual(VisualCapture {
            width: 1,
            height: 1,
            encoded: b"not an image".to_vec(),
        }));
        let (writer, reader) = readiness_slot();
        let err = VisualProducer::new(host).produce(writer).await.unwrap_err();
        assert!(matches!(err, ExportError::Image(_)), "{err}");
        assert!(!reader.is_ready());
    }

    #[tokio::test]
    async fn zero_sized_capture_is_rejected() {
        let host = Arc::new(SnapshotHost::visual(VisualCapture {
            width: 0,
            height: 3,
            encoded: png_of(1, 1, [0, 0, 0, 255]),
        }));
        let (writer, _reader) = readiness_slot();
        let err = VisualProducer::new(host).produce(writer).await.unwrap_err();
        assert!(err.to_string().contains("empty capture"));
    }

    #[test]
    fn snapshot_from_image_reads_size() {
        let host = SnapshotHost::from_image(png_of(3, 5, [1, 2, 3, 255])).unwrap();
        assert_eq!(host.view_mode(), ViewMode::Visual);
        let capture = host.capture.unwrap();
        assert_eq!((capture.width, capture.height), (3, 5));
    }
}
