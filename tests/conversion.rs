//! Integration tests for the conversion orchestrator.
//!
//! The x2t engine is replaced by a scripted in-memory engine that reads the
//! job descriptor, records it, copies the input file to the output path and
//! optionally drops media files, so every test runs offline and without an
//! x2t binary. HTTP inputs are served by a throwaway TCP listener.
//!
//! Run with:
//!   cargo test --test conversion -- --nocapture

use edgequake_x2t::{
    save_output, ConversionRequest, ConverterConfig, Directive, DocumentCategory, Engine,
    EngineFs, EngineLoader, EngineState, Input, JobDescriptor, LoadFuture, MemoryFs, X2tConverter,
    X2tError,
};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Engine double: writes `media` into `<root>/media`, then exits with
/// `status` (only for targets ending in `fail_target`, when set) or copies
/// `m_sFileFrom` to `m_sFileTo`.
#[derive(Default)]
struct ScriptedEngine {
    fs: MemoryFs,
    status: i32,
    fail_target: Option<&'static str>,
    media: Vec<(String, Vec<u8>)>,
    jobs: Mutex<Vec<JobDescriptor>>,
}

impl ScriptedEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing(status: i32) -> Arc<Self> {
        Arc::new(Self {
            status,
            ..Self::default()
        })
    }

    fn with_media(files: &[(&str, &[u8])]) -> Arc<Self> {
        Arc::new(Self {
            media: files
                .iter()
                .map(|(name, data)| (name.to_string(), data.to_vec()))
                .collect(),
            ..Self::default()
        })
    }

    fn jobs(&self) -> Vec<JobDescriptor> {
        self.jobs.lock().unwrap().clone()
    }

    /// `(source ext, target ext)` of every job run so far.
    fn steps(&self) -> Vec<(String, String)> {
        self.jobs()
            .iter()
            .map(|j| (extension(&j.file_from), extension(&j.file_to)))
            .collect()
    }
}

fn extension(path: &str) -> String {
    path.rsplit_once('.').map(|(_, e)| e.to_string()).unwrap_or_default()
}

impl Engine for ScriptedEngine {
    fn fs(&self) -> &dyn EngineFs {
        &self.fs
    }

    fn run(&self, descriptor_path: &str) -> io::Result<i32> {
        let xml = String::from_utf8(self.fs.read_file(descriptor_path)?)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let job = JobDescriptor::parse(&xml)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad descriptor"))?;
        self.jobs.lock().unwrap().push(job.clone());

        let root = job.theme_dir.trim_end_matches("/themes");
        for (name, bytes) in &self.media {
            self.fs.write_file(&format!("{root}/media/{name}"), bytes)?;
        }

        let fails_here = self
            .fail_target
            .map_or(true, |ext| job.file_to.ends_with(ext));
        if self.status != 0 && fails_here {
            return Ok(self.status);
        }

        let data = self.fs.read_file(&job.file_from)?;
        self.fs.write_file(&job.file_to, &data)?;
        Ok(0)
    }
}

/// Loader that counts calls and sleeps `delays[attempt]` (last entry
/// repeats) before handing out the engine.
struct TestLoader {
    engine: Arc<ScriptedEngine>,
    calls: Arc<AtomicUsize>,
    delays: Vec<Duration>,
}

impl EngineLoader for TestLoader {
    fn load(&self) -> LoadFuture {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self
            .delays
            .get(attempt)
            .or(self.delays.last())
            .copied()
            .unwrap_or_default();
        let engine: Arc<dyn Engine> = self.engine.clone();
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(engine)
        })
    }
}

fn converter_with(
    engine: &Arc<ScriptedEngine>,
    config: ConverterConfig,
    delays: Vec<Duration>,
) -> (X2tConverter, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let loader = TestLoader {
        engine: Arc::clone(engine),
        calls: Arc::clone(&calls),
        delays,
    };
    (X2tConverter::new(config, loader).unwrap(), calls)
}

fn converter(engine: &Arc<ScriptedEngine>) -> X2tConverter {
    converter_with(engine, ConverterConfig::default(), vec![]).0
}

/// Serve exactly one HTTP response on a random local port.
async fn serve_once(status_line: &'static str, body: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let head = format!(
            "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(body).await.unwrap();
        let _ = socket.shutdown().await;
    });
    addr
}

// ── Conversion chains ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_legacy_doc_passes_through_docx() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    let result = assert_ok!(conv.convert_to_bin(b"legacy-doc".to_vec(), "report.doc", "doc").await);

    assert_eq!(
        engine.steps(),
        vec![
            ("doc".to_string(), "docx".to_string()),
            ("docx".to_string(), "bin".to_string())
        ]
    );
    assert_eq!(result.file_name, "report");
    assert_eq!(result.extension, ".bin");
    assert_eq!(result.category, Some(DocumentCategory::Word));
    assert_eq!(&result.data[..], b"legacy-doc");
    assert_eq!(result.size, 10);
}

#[tokio::test]
async fn test_modern_docx_never_passes_through_docx() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    assert_ok!(conv.convert_to_bin(b"PK".to_vec(), "report.docx", ".docx").await);

    assert_eq!(engine.steps(), vec![("docx".to_string(), "bin".to_string())]);
}

#[tokio::test]
async fn test_dotted_names_survive_the_chain() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    let result = assert_ok!(conv.convert_to_bin(b"x".to_vec(), "q3.final.xls", "xls").await);

    assert_eq!(result.file_name, "q3.final");
    assert_eq!(result.category, Some(DocumentCategory::Cell));
    for job in engine.jobs() {
        assert!(job.file_from.contains("/q3.final."), "{}", job.file_from);
    }
}

#[tokio::test]
async fn test_round_trip_category() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    let bin = assert_ok!(conv.convert_to_bin(b"sheet".to_vec(), "budget.xlsx", "xlsx").await);
    let back = assert_ok!(
        conv.convert_from_bin(bin.data.clone(), "budget.bin", Some("xlsx"))
            .await
    );

    assert_eq!(bin.category, Some(DocumentCategory::Cell));
    assert_eq!(back.category, bin.category);
    assert_eq!(back.extension, ".xlsx");
    assert_eq!(&back.data[..], b"sheet");
}

#[tokio::test]
async fn test_from_bin_defaults_to_docx() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    let result = assert_ok!(conv.convert_from_bin(b"bin".to_vec(), "Editor.bin", None).await);

    assert_eq!(result.extension, ".docx");
    assert_eq!(result.file_name, "Editor");
    assert_eq!(result.category, Some(DocumentCategory::Word));
}

#[tokio::test]
async fn test_hello_text_converts_as_word() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    let result = assert_ok!(conv.convert_to_bin("Hello", "note.txt", "txt").await);

    assert_eq!(result.size, 5);
    assert_eq!(&result.data[..], b"Hello");
    assert_eq!(result.category, Some(DocumentCategory::Word));
    assert_eq!(result.category.map(|c| c.to_string()).as_deref(), Some("word"));
}

#[tokio::test]
async fn test_normalize_legacy_is_none_for_modern_formats() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    let none = assert_ok!(conv.normalize_legacy(b"PK".to_vec(), "a.pptx", "pptx").await);
    assert!(none.is_none());
    assert!(engine.jobs().is_empty());

    let some = assert_ok!(conv.normalize_legacy(b"ppt".to_vec(), "a.ppt", "ppt").await);
    let some = some.expect("ppt is legacy");
    assert_eq!(some.extension, ".pptx");
    assert_eq!(some.category, Some(DocumentCategory::Slide));
}

#[tokio::test]
async fn test_pdf_export_adds_font_dir_and_has_no_category() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    let result = assert_ok!(conv.convert_from_bin(b"bin".to_vec(), "deck.bin", Some("PDF")).await);

    assert_eq!(result.extension, ".pdf");
    assert_eq!(result.category, None);
    let job = &engine.jobs()[0];
    assert_eq!(job.theme_dir, "/working/themes");
    assert!(job
        .directives
        .iter()
        .any(|d| d.name() == "m_sFontDir" && d.value() == "/working/fonts/"));
}

#[tokio::test]
async fn test_extra_directives_reach_the_descriptor() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    let request = ConversionRequest::new("data.csv", "csv", "bin")
        .directive(Directive::new("m_nCsvTxtEncoding", "46").unwrap());
    assert_ok!(conv.convert(b"a,b\n1,2\n".to_vec(), request).await);

    let job = &engine.jobs()[0];
    assert_eq!(job.directives.len(), 1);
    assert_eq!(job.directives[0].value(), "46");
}

// ── Input materialisation ────────────────────────────────────────────────────

#[tokio::test]
async fn test_http_404_names_the_status() {
    let addr = serve_once("404 Not Found", b"").await;
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    let err = assert_err!(
        conv.convert_to_bin(format!("http://{addr}/missing.docx"), "missing.docx", "docx")
            .await
    );

    assert!(matches!(err, X2tError::Materialization { .. }), "{err:?}");
    assert!(err.to_string().contains("404"), "{err}");
    assert!(engine.jobs().is_empty());
}

#[tokio::test]
async fn test_http_download_feeds_the_engine() {
    let addr = serve_once("200 OK", b"remote-docx").await;
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    let result = assert_ok!(
        conv.convert_to_bin(format!("http://{addr}/files/a.docx"), "a.docx", "docx")
            .await
    );

    assert_eq!(&result.data[..], b"remote-docx");
}

#[tokio::test]
async fn test_data_url_and_local_file_inputs() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    let result = assert_ok!(
        conv.convert_to_bin("data:text/plain;base64,SGVsbG8=", "note.txt", "txt")
            .await
    );
    assert_eq!(&result.data[..], b"Hello");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("local.rtf");
    std::fs::write(&path, b"{\\rtf1}").unwrap();
    let handle = edgequake_x2t::FileHandle::open(&path).await.unwrap();
    let result = assert_ok!(conv.convert_to_bin(handle, "local.rtf", "rtf").await);
    assert_eq!(result.size, 7);
}

#[tokio::test]
async fn test_unknown_input_is_not_wrapped() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    let err = assert_err!(
        conv.convert_to_bin(Input::unknown("boolean"), "x.docx", "docx")
            .await
    );

    match err {
        X2tError::ClassificationUnsupported { tag } => assert_eq!(tag, "boolean"),
        other => panic!("unexpected: {other:?}"),
    }
}

// ── Naming and formats ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_hostile_name_is_sanitised() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    let result = assert_ok!(conv.convert_to_bin(b"PK".to_vec(), "../../evil<>.docx", "docx").await);

    assert_eq!(result.file_name, "evil");
    for bad in ['/', '\\', '<', '>', ':', '*', '|', '"'] {
        assert!(!result.file_name.contains(bad));
    }
    let job = &engine.jobs()[0];
    assert!(job.file_from.starts_with("/working/evil-"), "{}", job.file_from);
    assert!(job.file_from.ends_with("/evil.docx"));
    assert!(!job.file_from.contains(".."));
}

#[tokio::test]
async fn test_empty_name_is_invalid() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    let err = assert_err!(conv.convert_to_bin(b"PK".to_vec(), "...", "docx").await);

    assert!(err.to_string().starts_with("Document conversion failed"));
    assert!(matches!(err.root_cause(), X2tError::InvalidName { .. }));
    assert!(engine.jobs().is_empty());
}

#[tokio::test]
async fn test_unknown_extension_is_unsupported_before_the_engine_runs() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    let err = assert_err!(conv.convert_to_bin(b"x".to_vec(), "a.xyz", "xyz").await);

    match err.root_cause() {
        X2tError::UnsupportedFormat { extension } => assert_eq!(extension, ".xyz"),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(engine.jobs().is_empty());
    assert!(engine.fs.files().is_empty());
}

// ── Engine failures ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_nonzero_status_is_a_conversion_failure() {
    let engine = ScriptedEngine::failing(89);
    let conv = converter(&engine);

    let err = assert_err!(conv.convert_to_bin(b"PK".to_vec(), "a.docx", "docx").await);

    assert_eq!(
        err.to_string(),
        "Document conversion failed: Conversion failed with code: 89"
    );
    assert!(matches!(err.root_cause(), X2tError::EngineStatus { code: 89 }));
    assert!(
        engine.fs.files().is_empty(),
        "workspace left behind: {:?}",
        engine.fs.files()
    );
}

#[tokio::test]
async fn test_engine_not_ready_without_auto_initialize() {
    let engine = ScriptedEngine::new();
    let config = ConverterConfig::builder()
        .auto_initialize(false)
        .build()
        .unwrap();
    let (conv, calls) = converter_with(&engine, config, vec![]);

    let err = assert_err!(conv.convert_to_bin(b"PK".to_vec(), "a.docx", "docx").await);
    assert!(matches!(err, X2tError::EngineNotReady));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_ok!(conv.initialize().await);
    assert_ok!(conv.convert_to_bin(b"PK".to_vec(), "a.docx", "docx").await);
}

// ── Engine lifecycle ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_load_timeout_then_retry() {
    let engine = ScriptedEngine::new();
    let config = ConverterConfig::builder()
        .init_timeout_ms(20)
        .build()
        .unwrap();
    let (conv, calls) = converter_with(
        &engine,
        config,
        vec![Duration::from_millis(500), Duration::ZERO],
    );

    let err = conv.initialize().await.err().expect("first load times out");
    assert!(matches!(err, X2tError::EngineTimeout { ms: 20 }), "{err:?}");
    assert!(matches!(conv.state(), EngineState::Failed(_)));

    assert!(conv.initialize().await.is_ok());
    assert_eq!(conv.state(), EngineState::Ready);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_concurrent_initialize_shares_one_load() {
    let engine = ScriptedEngine::new();
    let (conv, calls) = converter_with(
        &engine,
        ConverterConfig::default(),
        vec![Duration::from_millis(50)],
    );

    let results = futures::future::join_all((0..5).map(|_| conv.initialize())).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(conv.state(), EngineState::Ready);
}

#[tokio::test]
async fn test_initialize_creates_layout() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);

    assert!(conv.initialize().await.is_ok());

    for dir in ["/working", "/working/media", "/working/fonts", "/working/themes"] {
        assert!(engine.fs.is_dir(dir), "{dir}");
    }
}

#[tokio::test]
async fn test_release_forces_a_new_load() {
    let engine = ScriptedEngine::new();
    let (conv, calls) = converter_with(&engine, ConverterConfig::default(), vec![]);

    assert!(conv.initialize().await.is_ok());
    assert!(conv.release());
    assert_eq!(conv.state(), EngineState::Unloaded);
    assert!(!conv.release());

    assert_ok!(conv.convert_to_bin(b"PK".to_vec(), "a.docx", "docx").await);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ── Workspace and media ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_media_is_harvested_as_object_urls() {
    let engine = ScriptedEngine::with_media(&[
        ("image1.png", b"png-bytes".as_slice()),
        ("chart.svg", b"<svg/>".as_slice()),
    ]);
    let conv = converter(&engine);

    let result = assert_ok!(conv.convert_to_bin(b"PK".to_vec(), "deck.pptx", "pptx").await);

    assert_eq!(result.media.len(), 2);
    let url = &result.media["media/image1.png"];
    let entry = conv.object_urls().resolve(url).expect("registered");
    assert_eq!(&entry.data[..], b"png-bytes");
    assert_eq!(entry.mime, "image/png");

    // Round-trips through the materializer as an object URL input.
    let again = assert_ok!(conv.convert_to_bin(url.as_str(), "image1.docx", "docx").await);
    assert_eq!(&again.data[..], b"png-bytes");

    // Harvested media and the request workspace are gone from the engine.
    assert!(!engine.fs.exists("/working/media/image1.png"));
    assert!(engine.fs.is_dir("/working/media"));
}

#[tokio::test]
async fn test_retained_workspaces_are_purged_explicitly() {
    let engine = ScriptedEngine::with_media(&[("image1.png", b"png".as_slice())]);
    let config = ConverterConfig::builder()
        .retain_workspaces(true)
        .build()
        .unwrap();
    let (conv, _) = converter_with(&engine, config, vec![]);

    assert_err!(conv.purge_working_directory().await);

    assert_ok!(conv.convert_to_bin(b"PK".to_vec(), "a.docx", "docx").await);
    engine.fs.write_file("/working/fonts/arial.ttf", b"ttf").unwrap();
    let left = engine.fs.files();
    assert!(left.iter().any(|f| f.ends_with("/a.docx")), "{left:?}");
    assert!(left.iter().any(|f| f == "/working/media/image1.png"));

    let report = assert_ok!(conv.purge_working_directory().await);

    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.removed.len(), 2);
    assert_eq!(engine.fs.files(), vec!["/working/fonts/arial.ttf".to_string()]);
    assert!(engine.fs.is_dir("/working/themes"));
}

#[tokio::test]
async fn test_shared_workspace_without_isolation() {
    let engine = ScriptedEngine::new();
    let config = ConverterConfig::builder()
        .isolate_workspaces(false)
        .build()
        .unwrap();
    let (conv, _) = converter_with(&engine, config, vec![]);

    assert_ok!(conv.convert_to_bin(b"PK".to_vec(), "a.docx", "docx").await);

    assert_eq!(engine.jobs()[0].file_from, "/working/a/a.docx");
    assert_eq!(engine.jobs()[0].file_to, "/working/a/a.bin");
}

#[tokio::test]
async fn test_result_can_be_saved() {
    let engine = ScriptedEngine::new();
    let conv = converter(&engine);
    let result = assert_ok!(conv.convert_from_bin(b"docx-bytes".to_vec(), "out.bin", None).await);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(result.file_name_with_extension());
    assert_ok!(save_output(&result.data, &path).await);

    assert_eq!(std::fs::read(&path).unwrap(), b"docx-bytes");
    assert!(path.ends_with("out.docx"));
}

// ── Failure cleanup ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_bin_hop_revokes_legacy_media() {
    let engine = Arc::new(ScriptedEngine {
        status: 5,
        fail_target: Some(".bin"),
        media: vec![("image1.png".to_string(), b"png".to_vec())],
        ..ScriptedEngine::default()
    });
    let conv = converter(&engine);

    let err = assert_err!(conv.convert_to_bin(b"doc".to_vec(), "report.doc", "doc").await);

    assert!(matches!(err.root_cause(), X2tError::EngineStatus { code: 5 }));
    assert_eq!(engine.steps().len(), 2);
    assert!(conv.object_urls().is_empty(), "object URLs left behind");
}

#[tokio::test]
async fn test_failed_conversion_discards_its_media() {
    let engine = Arc::new(ScriptedEngine {
        status: 7,
        fail_target: Some(".xlsx"),
        media: vec![("chart1.png".to_string(), b"stale".to_vec())],
        ..ScriptedEngine::default()
    });
    let conv = converter(&engine);

    assert_err!(conv.convert_from_bin(b"bin".to_vec(), "sheet.bin", Some("xlsx")).await);
    assert!(!engine.fs.exists("/working/media/chart1.png"));
    assert!(engine.fs.is_dir("/working/media"));

    assert!(conv.object_urls().is_empty());
}
