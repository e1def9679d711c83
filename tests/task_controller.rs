//! Job lifecycle tests against fake downloader and encoder implementations

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use plugbot::application::errors::{AssemblyError, BotError, DownloadError, JobError};
use plugbot::application::services::{JobSettings, TaskController};
use plugbot::domain::entities::{Artifact, FailureReason, JobEvent, JobOutcome};
use plugbot::domain::traits::{ComicDownloader, JobSink, PdfEncoder};
use plugbot::infrastructure::pdf::PdfAssembler;

#[derive(Default)]
struct FakeDownloader {
    pages: usize,
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ComicDownloader for FakeDownloader {
    async fn download(&self, _comic_id: &str, target_dir: &Path) -> Result<(), DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let chapter = target_dir.join("chapter 1");
        std::fs::create_dir_all(&chapter).unwrap();
        for page in 1..=self.pages {
            std::fs::write(chapter.join(format!("{:05}.jpg", page)), b"jpeg").unwrap();
        }
        tokio::time::sleep(self.delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.fail {
            return Err(DownloadError::Exit {
                status: "exit status: 1".into(),
                stderr: "album not found".into(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Writes `size` bytes regardless of the pages it was given
struct FakeEncoder {
    size: usize,
}

impl PdfEncoder for FakeEncoder {
    fn encode(&self, images: &[PathBuf], output: &Path) -> Result<(), AssemblyError> {
        assert!(!images.is_empty());
        std::fs::write(output, vec![b'%'; self.size])?;
        Ok(())
    }
}

/// Writes a truncated file, pauses, then completes it
struct SlowEncoder {
    pause: Duration,
}

const COMPLETE_PDF: &[u8] = b"%PDF-1.4 COMPLETE %%EOF";

impl PdfEncoder for SlowEncoder {
    fn encode(&self, _images: &[PathBuf], output: &Path) -> Result<(), AssemblyError> {
        std::fs::write(output, b"%PDF-1.4 HALF")?;
        std::thread::sleep(self.pause);
        std::fs::write(output, COMPLETE_PDF)?;
        Ok(())
    }
}

/// Writes part of a file and then fails
struct FailingEncoder;

impl PdfEncoder for FailingEncoder {
    fn encode(&self, _images: &[PathBuf], output: &Path) -> Result<(), AssemblyError> {
        std::fs::write(output, b"%PDF-1.4 trunc")?;
        Err(AssemblyError::Encode("disk full".into()))
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<JobEvent>>,
    delivered: Mutex<Vec<(Artifact, bool)>>,
    contents: Mutex<Vec<Vec<u8>>>,
    refuse_delivery: bool,
}

impl RecordingSink {
    fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }

    fn delivered(&self) -> Vec<(Artifact, bool)> {
        self.delivered.lock().unwrap().clone()
    }

    fn contents(&self) -> Vec<Vec<u8>> {
        self.contents.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobSink for RecordingSink {
    async fn progress(&self, event: JobEvent) {
        self.events.lock().unwrap().push(event);
    }

    async fn deliver(&self, artifact: &Artifact) -> Result<(), BotError> {
        if self.refuse_delivery {
            return Err(BotError::Network("upload rejected".into()));
        }
        let existed = artifact.path.is_file();
        if let Ok(bytes) = std::fs::read(&artifact.path) {
            self.contents.lock().unwrap().push(bytes);
        }
        self.delivered.lock().unwrap().push((artifact.clone(), existed));
        Ok(())
    }
}

fn settings(dir: &Path) -> JobSettings {
    JobSettings {
        download_dir: dir.to_path_buf(),
        file_prefix: "jm".into(),
        timeout: None,
        max_file_size_mb: 0.0,
        keep_images: false,
        keep_pdf: false,
    }
}

fn controller(settings: JobSettings, downloader: Arc<FakeDownloader>, limit: i64) -> TaskController {
    let assembler = PdfAssembler::new(Arc::new(FakeEncoder { size: 1024 }));
    TaskController::new(settings, downloader, assembler, limit)
}

fn entries(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn delivers_and_cleans_up() {
    let tmp = tempfile::tempdir().unwrap();
    let downloader = Arc::new(FakeDownloader {
        pages: 3,
        ..Default::default()
    });
    let controller = controller(settings(tmp.path()), downloader.clone(), 2);
    let sink = RecordingSink::default();

    let outcome = controller.run("350234", &sink).await.unwrap();

    let artifact = outcome.artifact().unwrap();
    assert_eq!(artifact.file_name, "jm_350234.pdf");
    assert_eq!(artifact.size_bytes, 1024);
    assert!(!artifact.partial);
    assert!(!artifact.cached);

    let delivered = sink.delivered();
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].1, "file must exist while it is delivered");

    let events = sink.events();
    assert_eq!(
        events[0],
        JobEvent::Started {
            comic_id: "350234".into(),
            waited: false
        }
    );
    assert!(events.contains(&JobEvent::Downloaded));
    assert!(matches!(events.last(), Some(JobEvent::Ready { partial: false, .. })));

    assert!(entries(tmp.path()).is_empty());
    assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejects_malformed_ids_before_any_work() {
    let tmp = tempfile::tempdir().unwrap();
    let downloader = Arc::new(FakeDownloader::default());
    let controller = controller(settings(tmp.path()), downloader.clone(), 1);
    let sink = RecordingSink::default();

    for id in ["", "abc", "12 3", "../9"] {
        let result = controller.run(id, &sink).await;
        assert!(matches!(result, Err(JobError::InvalidId(_))), "{id:?}");
    }
    assert!(sink.events().is_empty());
    assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn never_exceeds_the_concurrency_limit() {
    let tmp = tempfile::tempdir().unwrap();
    let downloader = Arc::new(FakeDownloader {
        pages: 1,
        delay: Duration::from_millis(100),
        ..Default::default()
    });
    let controller = Arc::new(controller(settings(tmp.path()), downloader.clone(), 2));

    let sinks: Vec<Arc<RecordingSink>> = (0..5).map(|_| Arc::new(RecordingSink::default())).collect();
    let handles: Vec<_> = sinks
        .iter()
        .enumerate()
        .map(|(i, sink)| {
            let controller = controller.clone();
            let sink = sink.clone();
            tokio::spawn(async move { controller.run(&format!("{}", 100 + i), sink.as_ref()).await })
        })
        .collect();

    for outcome in futures::future::join_all(handles).await {
        assert!(outcome.unwrap().unwrap().is_delivered());
    }

    assert_eq!(downloader.calls.load(Ordering::SeqCst), 5);
    assert!(downloader.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(controller.gate().active(), 0);
    assert_eq!(controller.gate().queued(), 0);

    let waited = sinks
        .iter()
        .filter(|s| s.events().iter().any(|e| matches!(e, JobEvent::Queued { .. })))
        .count();
    assert!(waited >= 1);
}

#[tokio::test]
async fn timeout_converts_partial_download() {
    let tmp = tempfile::tempdir().unwrap();
    let downloader = Arc::new(FakeDownloader {
        pages: 2,
        delay: Duration::from_secs(30),
        ..Default::default()
    });
    let mut settings = settings(tmp.path());
    settings.timeout = Some(Duration::from_millis(200));
    let controller = controller(settings, downloader, 0);
    let sink = RecordingSink::default();

    let outcome = controller.run("1", &sink).await.unwrap();

    assert!(outcome.artifact().unwrap().partial);
    let events = sink.events();
    assert!(events.contains(&JobEvent::TimedOut { minutes: 0 }));
    assert!(!events.contains(&JobEvent::Downloaded));
    assert_eq!(events.last(), Some(&JobEvent::PartialNotice));
}

#[tokio::test]
async fn timeout_without_images_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let downloader = Arc::new(FakeDownloader {
        pages: 0,
        delay: Duration::from_secs(30),
        ..Default::default()
    });
    let mut settings = settings(tmp.path());
    settings.timeout = Some(Duration::from_millis(100));
    let controller = controller(settings, downloader, 0);
    let sink = RecordingSink::default();

    let outcome = controller.run("2", &sink).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed(FailureReason::NoImagesAfterTimeout));
    assert!(sink.delivered().is_empty());
    assert!(entries(tmp.path()).is_empty());
}

#[tokio::test]
async fn zero_images_fails_without_output() {
    let tmp = tempfile::tempdir().unwrap();
    let downloader = Arc::new(FakeDownloader::default());
    let controller = controller(settings(tmp.path()), downloader, 1);
    let sink = RecordingSink::default();

    let outcome = controller.run("3", &sink).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed(FailureReason::NoImages));
    assert!(!tmp.path().join("jm_3.pdf").exists());
}

#[tokio::test]
async fn download_error_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let downloader = Arc::new(FakeDownloader {
        pages: 1,
        fail: true,
        ..Default::default()
    });
    let controller = controller(settings(tmp.path()), downloader, 1);
    let sink = RecordingSink::default();

    let outcome = controller.run("4", &sink).await.unwrap();
    match outcome {
        JobOutcome::Failed(FailureReason::Download(e)) => assert!(e.contains("album not found")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(entries(tmp.path()).is_empty());
}

#[tokio::test]
async fn delivery_error_is_reported_and_cleaned_up() {
    let tmp = tempfile::tempdir().unwrap();
    let downloader = Arc::new(FakeDownloader {
        pages: 1,
        ..Default::default()
    });
    let controller = controller(settings(tmp.path()), downloader, 1);
    let sink = RecordingSink {
        refuse_delivery: true,
        ..Default::default()
    };

    let outcome = controller.run("5", &sink).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Failed(FailureReason::Delivery(_))));
    assert!(entries(tmp.path()).is_empty());
}

#[tokio::test]
async fn kept_pdf_is_reused_without_downloading() {
    let tmp = tempfile::tempdir().unwrap();
    let downloader = Arc::new(FakeDownloader {
        pages: 2,
        ..Default::default()
    });
    let mut settings = settings(tmp.path());
    settings.keep_pdf = true;
    let controller = controller(settings, downloader.clone(), 1);

    let first = RecordingSink::default();
    assert!(controller.run("6", &first).await.unwrap().is_delivered());
    assert_eq!(entries(tmp.path()), vec!["jm_6.pdf".to_string()]);

    let second = RecordingSink::default();
    let outcome = controller.run("6", &second).await.unwrap();
    assert!(outcome.artifact().unwrap().cached);
    assert_eq!(second.events(), vec![JobEvent::CachedArtifact]);
    assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
    assert!(tmp.path().join("jm_6.pdf").exists());
}

#[tokio::test]
async fn kept_images_survive_cleanup() {
    let tmp = tempfile::tempdir().unwrap();
    let downloader = Arc::new(FakeDownloader {
        pages: 2,
        ..Default::default()
    });
    let mut settings = settings(tmp.path());
    settings.keep_images = true;
    let controller = controller(settings, downloader, 1);

    controller.run("7", &RecordingSink::default()).await.unwrap();

    let left = entries(tmp.path());
    assert_eq!(left.len(), 1);
    assert!(left[0].starts_with("jm_7_"));
}

#[tokio::test]
async fn oversize_cached_pdf_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("jm_8.pdf"), vec![0u8; 3 * 1024 * 1024 / 2]).unwrap();
    let downloader = Arc::new(FakeDownloader::default());
    let mut settings = settings(tmp.path());
    settings.max_file_size_mb = 1.0;
    let controller = controller(settings, downloader.clone(), 1);
    let sink = RecordingSink::default();

    let outcome = controller.run("8", &sink).await.unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Refused {
            size_mb: 1.5,
            limit_mb: 1.0
        }
    );
    assert!(sink.delivered().is_empty());
    assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversize_fresh_pdf_warns_then_sends() {
    let tmp = tempfile::tempdir().unwrap();
    let downloader = Arc::new(FakeDownloader {
        pages: 1,
        ..Default::default()
    });
    let mut settings = settings(tmp.path());
    settings.max_file_size_mb = 1.0;
    let assembler = PdfAssembler::new(Arc::new(FakeEncoder {
        size: 2 * 1024 * 1024,
    }));
    let controller = TaskController::new(settings, downloader, assembler, 1);
    let sink = RecordingSink::default();

    let outcome = controller.run("9", &sink).await.unwrap();
    assert!(outcome.is_delivered());
    assert!(sink.events().contains(&JobEvent::Oversize {
        size_mb: 2.0,
        limit_mb: 1.0
    }));
}

#[tokio::test]
async fn request_during_encoding_never_sees_a_half_written_pdf() {
    let tmp = tempfile::tempdir().unwrap();
    let downloader = Arc::new(FakeDownloader {
        pages: 1,
        ..Default::default()
    });
    let mut settings = settings(tmp.path());
    settings.keep_pdf = true;
    let assembler = PdfAssembler::new(Arc::new(SlowEncoder {
        pause: Duration::from_millis(400),
    }));
    let controller = Arc::new(TaskController::new(settings, downloader, assembler, 2));

    let first_sink = Arc::new(RecordingSink::default());
    let first = {
        let controller = controller.clone();
        let sink = first_sink.clone();
        tokio::spawn(async move { controller.run("1", sink.as_ref()).await })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!tmp.path().join("jm_1.pdf").exists(), "artifact must not appear mid-encode");

    let second_sink = RecordingSink::default();
    let second = controller.run("1", &second_sink).await.unwrap();
    let first = first.await.unwrap().unwrap();

    assert!(first.is_delivered());
    assert!(second.is_delivered());
    for bytes in first_sink.contents().iter().chain(second_sink.contents().iter()) {
        assert_eq!(bytes.as_slice(), COMPLETE_PDF);
    }
    assert_eq!(entries(tmp.path()), vec!["jm_1.pdf".to_string()]);
}

#[tokio::test]
async fn encoder_error_removes_partial_pdf_and_work_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let downloader = Arc::new(FakeDownloader {
        pages: 2,
        ..Default::default()
    });
    let assembler = PdfAssembler::new(Arc::new(FailingEncoder));
    let controller = TaskController::new(settings(tmp.path()), downloader, assembler, 1);
    let sink = RecordingSink::default();

    let outcome = controller.run("11", &sink).await.unwrap();
    match outcome {
        JobOutcome::Failed(FailureReason::Conversion(e)) => assert!(e.contains("disk full")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(sink.delivered().is_empty());
    assert!(!tmp.path().join("jm_11.pdf").exists());
    assert!(entries(tmp.path()).is_empty());
}

#[tokio::test]
async fn encoder_error_leaves_no_partial_pdf_in_kept_images() {
    let tmp = tempfile::tempdir().unwrap();
    let downloader = Arc::new(FakeDownloader {
        pages: 1,
        ..Default::default()
    });
    let mut settings = settings(tmp.path());
    settings.keep_images = true;
    let assembler = PdfAssembler::new(Arc::new(FailingEncoder));
    let controller = TaskController::new(settings, downloader, assembler, 1);

    let outcome = controller.run("12", &RecordingSink::default()).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Failed(FailureReason::Conversion(_))));

    let left = entries(tmp.path());
    assert_eq!(left.len(), 1);
    assert!(left[0].starts_with("jm_12_"));
    assert_eq!(entries(&tmp.path().join(&left[0])), vec!["chapter 1".to_string()]);
}
