//! End-to-end pipeline tests over a scripted renderer
//!
//! These run the real windowing, resolution, pool, and orchestrator code;
//! only the browser is replaced by stand-ins so no Chrome install is
//! needed. Chrome-backed captures are covered in `cdp_render.rs`.

use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use chatshot::{
    run_batch, BatchRequest, CancelFlag, Canvas, ConversationThread, Corpus, Error, EvidenceImage,
    JobErrorKind, Message, PageRenderer, RenderPool, RendererFactory, Result, Sender,
    TemplateRegistry,
};
use zip::ZipArchive;

/// Smallest well-formed PNG: 1x1, 8-bit grayscale
fn tiny_png() -> Vec<u8> {
    let mut png = Vec::new();
    png.extend_from_slice(b"\x89PNG\r\n\x1a\n");
    png.extend_from_slice(&[0, 0, 0, 13]);
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0]);
    png.extend_from_slice(&[0x3a, 0x7e, 0x9b, 0x55]);
    png.extend_from_slice(&[0, 0, 0, 12]);
    png.extend_from_slice(b"IDAT");
    png.extend_from_slice(&[
        0x08, 0xd7, 0x63, 0x60, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00,
    ]);
    png.extend_from_slice(&[0, 0, 0, 0]);
    png.extend_from_slice(b"IEND");
    png.extend_from_slice(&[0xae, 0x42, 0x60, 0x82]);
    png
}

/// A JPEG-looking payload distinct from the PNG fixture
fn tiny_jpeg() -> Vec<u8> {
    // JFIF header with a recognizable SOF0 segment carrying 1x1 dimensions
    let mut jpeg = vec![
        0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00,
        0x01, 0x00, 0x01, 0x00, 0x00,
    ];
    jpeg.extend_from_slice(&[
        0xff, 0xc0, 0x00, 0x11, 0x08, 0x00, 0x01, 0x00, 0x01, 0x03, 0x01, 0x22, 0x00, 0x02, 0x11,
        0x01, 0x03, 0x11, 0x01,
    ]);
    jpeg.extend_from_slice(&[0xff, 0xd9]);
    jpeg
}

fn image(bytes: Vec<u8>) -> Arc<EvidenceImage> {
    Arc::new(EvidenceImage::from_bytes(bytes).unwrap())
}

fn thread_with(texts: &[&str]) -> Arc<ConversationThread> {
    let messages = texts
        .iter()
        .enumerate()
        .map(|(i, text)| Message {
            sender: if i % 2 == 0 {
                Sender::Received
            } else {
                Sender::Sent
            },
            text: (*text).to_string(),
            timestamp: None,
        })
        .collect::<Vec<_>>();
    let insertion_index = messages.len() / 2;
    Arc::new(ConversationThread {
        messages,
        insertion_index,
    })
}

/// Renderer that hands back the resolved markup as the "capture", so tests
/// can inspect exactly what each job rendered. Stalls past any timeout
/// when the markup carries the slow marker.
struct EchoRenderer;

impl PageRenderer for EchoRenderer {
    fn capture(&mut self, markup: &str, _canvas: Canvas) -> Result<Vec<u8>> {
        if markup.contains("slowpoke") {
            std::thread::sleep(Duration::from_millis(300));
        }
        Ok(markup.as_bytes().to_vec())
    }
}

fn echo_factory() -> Arc<dyn RendererFactory> {
    Arc::new(|| -> Result<Box<dyn PageRenderer>> { Ok(Box::new(EchoRenderer)) })
}

async fn echo_pool(size: usize, timeout: Duration) -> Arc<RenderPool> {
    Arc::new(RenderPool::new(echo_factory(), size, timeout).await.unwrap())
}

fn entry_names(archive_bytes: &[u8]) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(archive_bytes.to_vec())).unwrap();
    let mut names: Vec<String> = archive.file_names().map(String::from).collect();
    names.sort();
    names
}

fn entry_payload(archive_bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes.to_vec())).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut payload = Vec::new();
    entry.read_to_end(&mut payload).unwrap();
    payload
}

#[tokio::test]
async fn batch_of_three_produces_named_entries_and_clean_manifest() {
    let pool = echo_pool(2, Duration::from_secs(5)).await;
    let registry = Arc::new(TemplateRegistry::builtin());
    let request = BatchRequest {
        platform_id: "whatsapp".to_string(),
        count: 3,
        messages_before: 2,
        messages_after: 2,
        images: vec![image(tiny_png())],
        conversations: vec![thread_with(&[
            "first message",
            "second message",
            "third message",
            "fourth message",
            "fifth message",
        ])],
    };

    let output = run_batch(pool, registry, request, CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(
        entry_names(&output.archive),
        vec![
            "screenshot_0000.png",
            "screenshot_0001.png",
            "screenshot_0002.png"
        ]
    );
    assert_eq!(output.manifest.total, 3);
    assert_eq!(output.manifest.succeeded, 3);
    assert_eq!(output.manifest.failed, 0);
}

#[tokio::test]
async fn manifest_covers_every_job_index_exactly_once() {
    let pool = echo_pool(4, Duration::from_secs(5)).await;
    let registry = Arc::new(TemplateRegistry::builtin());
    let request = BatchRequest {
        platform_id: "imessage".to_string(),
        count: 25,
        messages_before: 1,
        messages_after: 1,
        images: vec![image(tiny_png()), image(tiny_jpeg())],
        conversations: vec![
            thread_with(&["alpha one", "alpha two", "alpha three"]),
            thread_with(&["beta one", "beta two", "beta three"]),
        ],
    };

    let output = run_batch(pool, registry, request, CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(output.manifest.total, 25);
    assert_eq!(
        output.manifest.succeeded + output.manifest.failed,
        output.manifest.total
    );
    let mut indices: Vec<usize> = output.manifest.per_job.iter().map(|j| j.job_index).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..25).collect::<Vec<_>>());
}

#[tokio::test]
async fn one_slow_job_times_out_without_sinking_the_batch() {
    let pool = echo_pool(2, Duration::from_millis(100)).await;
    let registry = Arc::new(TemplateRegistry::builtin());
    let request = BatchRequest {
        platform_id: "imessage".to_string(),
        count: 3,
        messages_before: 0,
        messages_after: 0,
        images: vec![image(tiny_png())],
        conversations: vec![
            thread_with(&["fast and fine"]),
            thread_with(&["slowpoke special"]),
            thread_with(&["also fast"]),
        ],
    };

    let output = run_batch(pool, registry, request, CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(output.manifest.succeeded, 2);
    assert_eq!(output.manifest.failed, 1);
    let failed = output
        .manifest
        .per_job
        .iter()
        .find(|j| j.error_kind.is_some())
        .unwrap();
    assert_eq!(failed.job_index, 1);
    assert_eq!(failed.error_kind, Some(JobErrorKind::RenderTimeout));

    // The archive still carries the two successful captures
    assert_eq!(
        entry_names(&output.archive),
        vec!["screenshot_0000.png", "screenshot_0002.png"]
    );
}

#[tokio::test]
async fn unknown_platform_everywhere_fails_the_batch_with_no_archive() {
    let pool = echo_pool(2, Duration::from_secs(5)).await;
    let registry = Arc::new(TemplateRegistry::builtin());
    let request = BatchRequest {
        platform_id: "telegram".to_string(),
        count: 4,
        messages_before: 1,
        messages_after: 1,
        images: vec![image(tiny_png())],
        conversations: vec![thread_with(&["hello there friend", "reply text here"])],
    };

    let err = run_batch(pool, registry, request, CancelFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BatchFailed(4)));
}

#[tokio::test]
async fn malformed_request_fails_fast() {
    let pool = echo_pool(1, Duration::from_secs(5)).await;
    let registry = Arc::new(TemplateRegistry::builtin());

    let request = BatchRequest {
        platform_id: "imessage".to_string(),
        count: 0,
        messages_before: 1,
        messages_after: 1,
        images: vec![image(tiny_png())],
        conversations: vec![],
    };
    let err = run_batch(
        Arc::clone(&pool),
        Arc::clone(&registry),
        request,
        CancelFlag::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::InvalidBatchRequest(_)));

    let request = BatchRequest {
        platform_id: "imessage".to_string(),
        count: 2,
        messages_before: 1,
        messages_after: 1,
        images: vec![],
        conversations: vec![],
    };
    let err = run_batch(pool, registry, request, CancelFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidBatchRequest(_)));
}

#[tokio::test]
async fn concurrent_jobs_never_cross_contaminate() {
    let pool = echo_pool(2, Duration::from_secs(5)).await;
    let registry = Arc::new(TemplateRegistry::builtin());

    let png = image(tiny_png());
    let jpeg = image(tiny_jpeg());
    use base64::Engine as _;
    let png_b64 = base64::engine::general_purpose::STANDARD.encode(png.bytes());
    let jpeg_b64 = base64::engine::general_purpose::STANDARD.encode(jpeg.bytes());

    let request = BatchRequest {
        platform_id: "signal".to_string(),
        count: 2,
        messages_before: 1,
        messages_after: 1,
        images: vec![png, jpeg],
        conversations: vec![thread_with(&["message a", "message b", "message c"])],
    };

    let output = run_batch(pool, registry, request, CancelFlag::new())
        .await
        .unwrap();

    // Job 0 got the PNG, job 1 the JPEG; each capture embeds only its own
    let capture0 = String::from_utf8(entry_payload(&output.archive, "screenshot_0000.png")).unwrap();
    let capture1 = String::from_utf8(entry_payload(&output.archive, "screenshot_0001.png")).unwrap();
    assert!(capture0.contains(&png_b64));
    assert!(!capture0.contains(&jpeg_b64));
    assert!(capture1.contains(&jpeg_b64));
    assert!(!capture1.contains(&png_b64));
}

#[tokio::test]
async fn cancelling_mid_batch_stops_queued_jobs() {
    // Every render takes 300ms on a single slot, so at cancel time (100ms)
    // one job is in flight and the rest are still queued on the semaphore.
    struct SlowRenderer;
    impl PageRenderer for SlowRenderer {
        fn capture(&mut self, markup: &str, _canvas: Canvas) -> Result<Vec<u8>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(markup.as_bytes().to_vec())
        }
    }
    let factory: Arc<dyn RendererFactory> =
        Arc::new(|| -> Result<Box<dyn PageRenderer>> { Ok(Box::new(SlowRenderer)) });
    let pool = Arc::new(
        RenderPool::new(factory, 1, Duration::from_secs(5))
            .await
            .unwrap(),
    );
    let registry = Arc::new(TemplateRegistry::builtin());
    let cancel = CancelFlag::new();

    let request = BatchRequest {
        platform_id: "imessage".to_string(),
        count: 4,
        messages_before: 0,
        messages_after: 0,
        images: vec![image(tiny_png())],
        conversations: vec![thread_with(&["steady message here"])],
    };

    let batch = tokio::spawn(run_batch(pool, registry, request, cancel.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    // The in-flight render completes; every queued job comes back cancelled
    let output = batch.await.unwrap().unwrap();
    assert_eq!(output.manifest.succeeded, 1);
    assert_eq!(output.manifest.failed, 3);
    let cancelled = output
        .manifest
        .per_job
        .iter()
        .filter(|j| j.error_kind == Some(JobErrorKind::Cancelled))
        .count();
    assert_eq!(cancelled, 3);
    assert_eq!(entry_names(&output.archive).len(), 1);
}

#[tokio::test]
async fn cancelled_batch_records_every_job_as_cancelled() {
    let pool = echo_pool(1, Duration::from_secs(5)).await;
    let registry = Arc::new(TemplateRegistry::builtin());
    let cancel = CancelFlag::new();
    cancel.cancel();

    let request = BatchRequest {
        platform_id: "imessage".to_string(),
        count: 3,
        messages_before: 1,
        messages_after: 1,
        images: vec![image(tiny_png())],
        conversations: vec![thread_with(&["hello there friend", "a reply here"])],
    };

    // Every job short-circuits before acquiring a slot, so the whole batch
    // comes back failed rather than producing an empty archive.
    let err = run_batch(pool, registry, request, cancel).await.unwrap_err();
    assert!(matches!(err, Error::BatchFailed(3)));
}

#[tokio::test]
async fn bad_insertion_index_is_a_per_job_failure() {
    let pool = echo_pool(2, Duration::from_secs(5)).await;
    let registry = Arc::new(TemplateRegistry::builtin());

    let broken = Arc::new(ConversationThread {
        messages: vec![Message {
            sender: Sender::Sent,
            text: "only one message".to_string(),
            timestamp: None,
        }],
        insertion_index: 7,
    });

    let request = BatchRequest {
        platform_id: "imessage".to_string(),
        count: 2,
        messages_before: 0,
        messages_after: 0,
        images: vec![image(tiny_png())],
        conversations: vec![broken, thread_with(&["fine message here"])],
    };

    let output = run_batch(pool, registry, request, CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(output.manifest.succeeded, 1);
    assert_eq!(
        output.manifest.per_job[0].error_kind,
        Some(JobErrorKind::InvalidInsertionIndex)
    );
    assert_eq!(entry_names(&output.archive), vec!["screenshot_0001.png"]);
}

#[tokio::test]
async fn corpus_json_feeds_the_pipeline() {
    let json = r#"{
        "source": "test corpus",
        "conversations": [
            {
                "subreddit": "tifu",
                "messages": [
                    {"sender": "received", "text": "so this **actually** happened today"},
                    {"sender": "sent", "text": "no way, tell me more"},
                    {"sender": "received", "text": "[deleted]"},
                    {"sender": "sent", "text": "still waiting..."}
                ]
            }
        ]
    }"#;
    let corpus = Corpus::from_json(json).unwrap();
    let threads: Vec<_> = corpus.into_threads().into_iter().map(Arc::new).collect();
    assert_eq!(threads.len(), 1);
    // The deleted message was cleaned away
    assert_eq!(threads[0].messages.len(), 3);

    let pool = echo_pool(1, Duration::from_secs(5)).await;
    let registry = Arc::new(TemplateRegistry::builtin());
    let request = BatchRequest {
        platform_id: "whatsapp".to_string(),
        count: 1,
        messages_before: 1,
        messages_after: 1,
        images: vec![image(tiny_png())],
        conversations: threads,
    };
    let output = run_batch(pool, registry, request, CancelFlag::new())
        .await
        .unwrap();
    let capture = String::from_utf8(entry_payload(&output.archive, "screenshot_0000.png")).unwrap();
    assert!(capture.contains("so this actually happened today"));
}
