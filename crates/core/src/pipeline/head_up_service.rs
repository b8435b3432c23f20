use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::detection::domain::head_up_rate::HeadUpMetric;
use crate::detection::infrastructure::detector_factory;
use crate::detection::infrastructure::shared_detector::SharedDetector;
use crate::rendering::domain::frame_visualizer::FrameVisualizer;
use crate::rendering::infrastructure::box_overlay_visualizer::BoxOverlayVisualizer;
use crate::shared::error::AnalysisError;
use crate::shared::settings::AnalyzerSettings;
use crate::video::domain::video_reader::VideoReader;
use crate::video::infrastructure::ffmpeg_reader::FfmpegReader;
use crate::video::infrastructure::image_decoder::decode_image;

use super::analyze_video_use_case::{AnalyzeVideoUseCase, VideoSource};
use super::frame_analyzer::{FrameAnalyzer, FrameResult};
use super::session_summary::SessionSummary;
use super::stream_session::{SessionHandle, StreamSession, StreamUpdate};

/// Creates a fresh reader for every video pass.
pub type ReaderFactory = Box<dyn Fn() -> Box<dyn VideoReader> + Send + Sync>;

/// Entry point for transports: single images, video files and live streams.
///
/// All operations share one lazily loaded detector. Each video pass and
/// each stream session owns its own reader and aggregate, so independent
/// operations may run concurrently from different threads.
pub struct HeadUpService {
    analyzer: FrameAnalyzer,
    reader_factory: ReaderFactory,
    history_limit: Option<usize>,
    sessions: Mutex<HashMap<SessionHandle, Arc<Mutex<StreamSession>>>>,
    next_handle: AtomicU64,
}

impl HeadUpService {
    pub fn new(analyzer: FrameAnalyzer) -> Self {
        Self {
            analyzer,
            reader_factory: Box::new(|| Box::new(FfmpegReader::new())),
            history_limit: None,
            sessions: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Wires the ONNX detector, metric and overlay renderer from settings.
    ///
    /// The model is not loaded here; the first analysis does that.
    pub fn from_settings(settings: &AnalyzerSettings) -> Self {
        let detector = detector_factory::shared_from_settings(settings);
        let mut analyzer =
            FrameAnalyzer::new(detector, HeadUpMetric::new(settings.head_up_class_id));
        if settings.visualize {
            analyzer = analyzer.with_visualizer(overlay_from_settings(settings));
        }
        Self::new(analyzer).with_history_limit(settings.stream_history_limit)
    }

    pub fn with_reader_factory(mut self, reader_factory: ReaderFactory) -> Self {
        self.reader_factory = reader_factory;
        self
    }

    pub fn with_history_limit(mut self, history_limit: Option<usize>) -> Self {
        self.history_limit = history_limit;
        self
    }

    pub fn analyzer(&self) -> &FrameAnalyzer {
        &self.analyzer
    }

    pub fn detector(&self) -> &Arc<SharedDetector> {
        self.analyzer.detector()
    }

    /// Decodes and analyzes one encoded image.
    pub fn analyze_image(&self, image_bytes: &[u8]) -> Result<FrameResult, AnalysisError> {
        let frame = decode_image(image_bytes)?;
        self.analyzer.analyze(&frame)
    }

    /// Samples and aggregates a whole video.
    pub fn analyze_video(&self, source: &VideoSource) -> Result<SessionSummary, AnalysisError> {
        self.video_use_case().execute(source)
    }

    /// A video use case bound to this service's analyzer, for callers that
    /// want progress reporting, cancellation or a pipeline logger.
    pub fn video_use_case(&self) -> AnalyzeVideoUseCase {
        AnalyzeVideoUseCase::new((self.reader_factory)(), self.analyzer.clone())
    }

    pub fn open_session(&self) -> SessionHandle {
        let handle = SessionHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let session = StreamSession::new(handle, self.analyzer.clone(), self.history_limit);
        self.registry()
            .insert(handle, Arc::new(Mutex::new(session)));
        handle
    }

    /// Decodes and analyzes one frame of a live stream.
    pub fn submit(
        &self,
        handle: SessionHandle,
        frame_bytes: &[u8],
    ) -> Result<StreamUpdate, AnalysisError> {
        let session = self.session(handle)?;
        let mut session = session.lock().unwrap_or_else(|e| e.into_inner());
        session.submit_bytes(frame_bytes)
    }

    /// Finalizes a session and forgets its handle.
    pub fn close(&self, handle: SessionHandle) -> Result<SessionSummary, AnalysisError> {
        let removed = self.registry().remove(&handle);
        let Some(session) = removed else {
            return Err(self.missing(handle));
        };
        let mut session = session.lock().unwrap_or_else(|e| e.into_inner());
        session.finalize()
    }

    pub fn open_session_count(&self) -> usize {
        self.registry().len()
    }

    fn session(&self, handle: SessionHandle) -> Result<Arc<Mutex<StreamSession>>, AnalysisError> {
        self.registry()
            .get(&handle)
            .cloned()
            .ok_or_else(|| self.missing(handle))
    }

    /// Closed for handles this service issued, unknown otherwise.
    fn missing(&self, handle: SessionHandle) -> AnalysisError {
        let issued = handle.id() >= 1 && handle.id() < self.next_handle.load(Ordering::SeqCst);
        if issued {
            AnalysisError::SessionClosed
        } else {
            AnalysisError::UnknownSession(handle)
        }
    }

    fn registry(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<SessionHandle, Arc<Mutex<StreamSession>>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn overlay_from_settings(settings: &AnalyzerSettings) -> Arc<dyn FrameVisualizer> {
    if let Some(font) = settings.overlay_font.as_deref() {
        match BoxOverlayVisualizer::with_font_file(font, settings.jpeg_quality) {
            Ok(viz) => return Arc::new(viz),
            Err(e) => log::warn!("Overlay labels drawn without text: {e}"),
        }
    }
    Arc::new(BoxOverlayVisualizer::new(settings.jpeg_quality))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::object_detector::ObjectDetector;
    use crate::shared::detection::{BoundingBox, Detection};
    use crate::shared::frame::Frame;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::thread;

    struct HeadUpEverywhere;

    impl ObjectDetector for HeadUpEverywhere {
        fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
            Ok(vec![Detection::new(
                BoundingBox::new(0.0, 0.0, frame.width() as f64, frame.height() as f64),
                0.8,
                0,
                "head-up".into(),
            )])
        }
    }

    fn service() -> HeadUpService {
        let shared = Arc::new(SharedDetector::preloaded(Arc::new(HeadUpEverywhere)));
        HeadUpService::new(FrameAnalyzer::new(shared, HeadUpMetric::default()))
    }

    fn png() -> Vec<u8> {
        let img = RgbImage::from_pixel(8, 8, Rgb([40, 40, 40]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_analyze_image() {
        let result = service().analyze_image(&png()).unwrap();
        assert_eq!(result.head_up_rate, 1.0);
        assert!(result.is_attentive());
    }

    #[test]
    fn test_analyze_image_rejects_garbage() {
        assert!(matches!(
            service().analyze_image(b"\x00\x01"),
            Err(AnalysisError::Decode(_))
        ));
    }

    #[test]
    fn test_handles_are_monotonic() {
        let svc = service();
        let a = svc.open_session();
        let b = svc.open_session();
        assert!(b > a);
        svc.close(a).unwrap();
        let c = svc.open_session();
        assert!(c > b);
    }

    #[test]
    fn test_closed_and_unknown_handles() {
        let svc = service();
        let handle = svc.open_session();
        svc.close(handle).unwrap();

        assert_eq!(svc.close(handle).unwrap_err(), AnalysisError::SessionClosed);
        assert_eq!(
            svc.submit(handle, &png()).unwrap_err(),
            AnalysisError::SessionClosed
        );

        let stranger = SessionHandle::new(999);
        assert_eq!(
            svc.submit(stranger, &png()).unwrap_err(),
            AnalysisError::UnknownSession(stranger)
        );
        assert_eq!(
            svc.close(SessionHandle::new(0)).unwrap_err(),
            AnalysisError::UnknownSession(SessionHandle::new(0))
        );
    }

    #[test]
    fn test_sessions_are_independent() {
        let svc = service();
        let a = svc.open_session();
        let b = svc.open_session();
        svc.submit(a, &png()).unwrap();
        svc.submit(a, &png()).unwrap();
        svc.submit(b, &png()).unwrap();

        assert_eq!(svc.close(a).unwrap().frame_count, 2);
        assert_eq!(svc.open_session_count(), 1);
        assert_eq!(svc.close(b).unwrap().frame_count, 1);
        assert_eq!(svc.open_session_count(), 0);
    }

    #[test]
    fn test_concurrent_sessions_share_detector() {
        let svc = Arc::new(service());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let svc = svc.clone();
                thread::spawn(move || {
                    let handle = svc.open_session();
                    for _ in 0..5 {
                        svc.submit(handle, &png()).unwrap();
                    }
                    svc.close(handle).unwrap().frame_count
                })
            })
            .collect();
        for w in workers {
            assert_eq!(w.join().unwrap(), 5);
        }
    }

    #[test]
    fn test_history_limit_applies_to_sessions() {
        let svc = service().with_history_limit(Some(2));
        let handle = svc.open_session();
        for _ in 0..5 {
            svc.submit(handle, &png()).unwrap();
        }
        let summary = svc.close(handle).unwrap();
        assert_eq!(summary.frame_count, 5);
        assert_eq!(summary.entries.len(), 2);
        assert_eq!(summary.dropped_entries, 3);
    }

    #[test]
    fn test_from_settings_defers_model_load() {
        let settings = AnalyzerSettings {
            model_path: Some("/nonexistent/model.onnx".into()),
            ..AnalyzerSettings::default()
        };
        let svc = HeadUpService::from_settings(&settings);
        assert_eq!(svc.detector().load_attempts(), 0);

        assert!(matches!(
            svc.analyze_image(&png()),
            Err(AnalysisError::ModelUnavailable(_))
        ));
        assert!(matches!(
            svc.analyze_image(&png()),
            Err(AnalysisError::ModelUnavailable(_))
        ));
        assert_eq!(svc.detector().load_attempts(), 1);
    }
}
