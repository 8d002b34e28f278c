// Unit tests for backend selection, output paths and the asciidoctor engine

use crate::config::EngineSettings;
use crate::engine::{AsciidoctorEngine, Backend, CancellationFlag, ConversionEngine, ConversionRequest};
use crate::error::engine::EngineError;

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// **VALUE**: Verifies the backend name to output extension mapping.
///
/// **WHY THIS MATTERS**: The result path returned to the client is computed from this mapping.
/// A wrong extension means the client is told about a file that does not exist.
///
/// **BUG THIS CATCHES**: Would catch e.g. DocBook mapped to `.docbook` instead of `.xml`, or
/// an unknown backend being rejected instead of passed through.
#[test]
fn given_backend_names_when_parsed_then_map_to_expected_extensions() {
    // GIVEN: Known aliases and one unknown backend
    let cases = [
        ("html", Backend::Html5, "html"),
        ("HTML5", Backend::Html5, "html"),
        ("xhtml", Backend::Xhtml5, "html"),
        ("pdf", Backend::Pdf, "pdf"),
        ("docbook", Backend::DocBook5, "xml"),
        ("manpage", Backend::Manpage, "man"),
        ("epub3", Backend::Epub3, "epub"),
        ("revealjs", Backend::Other("revealjs".to_string()), "revealjs"),
    ];

    // WHEN/THEN: Each maps to the expected backend and extension
    for (name, expected, extension) in cases {
        let backend = Backend::from_name(name);
        assert_eq!(backend, expected, "Backend for '{name}'");
        assert_eq!(backend.extension(), extension, "Extension for '{name}'");
    }
}

/// **VALUE**: Verifies that a request without a `backend` option converts to HTML.
///
/// **BUG THIS CATCHES**: Would catch a default that falls through to `Other("")`.
#[test]
fn given_no_backend_option_when_backend_resolved_then_defaults_to_html5() {
    // GIVEN: A request with unrelated options only
    let request = ConversionRequest::new("j1", "/docs/guide.adoc", options(&[("toc", "left")]));

    // WHEN/THEN: The backend is HTML5
    assert_eq!(request.backend(), Backend::Html5);
    assert_eq!(request.backend().name(), "html5");
}

/// **VALUE**: Verifies where the artifact lands with and without an output directory.
///
/// **BUG THIS CATCHES**: Would catch dropping the source stem, or ignoring `output_dir`.
#[test]
fn given_source_path_when_output_path_computed_then_uses_stem_and_backend_extension() {
    // GIVEN: A PDF request
    let request = ConversionRequest::new("j2", "/docs/guide.adoc", options(&[("backend", "pdf")]));

    // WHEN: Computing output paths
    let beside = request.output_path(None);
    let elsewhere = request.output_path(Some(Path::new("/tmp/out")));

    // THEN: Same stem, PDF extension, chosen directory
    assert_eq!(beside, PathBuf::from("/docs/guide.pdf"));
    assert_eq!(elsewhere, PathBuf::from("/tmp/out/guide.pdf"));
}

/// **VALUE**: Verifies that options other than `backend` become document attributes in a
/// stable order.
///
/// **BUG THIS CATCHES**: Would catch passing `backend` twice (as `-b` and as `-a backend=..`)
/// or nondeterministic argument order from HashMap iteration.
#[test]
fn given_mixed_options_when_passthrough_listed_then_excludes_backend_and_sorts() {
    // GIVEN: Options including backend
    let request = ConversionRequest::new(
        "j3",
        "a.adoc",
        options(&[("toc", "left"), ("backend", "html"), ("icons", "font")]),
    );

    // WHEN: Listing passthrough options
    let passthrough = request.passthrough_options();

    // THEN: Sorted, backend excluded
    assert_eq!(passthrough, vec![("icons", "font"), ("toc", "left")]);
}

/// **VALUE**: Verifies the command line built for an HTML conversion.
///
/// **WHY THIS MATTERS**: The engine is an opaque external tool; the only contract we control
/// is the argument list. A missing `-o` writes the artifact somewhere the client never looks.
///
/// **BUG THIS CATCHES**: Would catch reordering that puts the source before the flags, or a
/// missing `-b` for non-PDF backends.
#[test]
fn given_html_request_when_build_command_called_then_uses_html_command_with_backend_flag() {
    // GIVEN: An HTML request with one attribute
    let engine = AsciidoctorEngine::default();
    let request = ConversionRequest::new("j4", "/docs/guide.adoc", options(&[("toc", "left")]));
    let output = PathBuf::from("/docs/guide.html");

    // WHEN: Building the command
    let cmd = engine.build_command(&request, &output);

    // THEN: Program and arguments match the asciidoctor CLI
    assert_eq!(cmd.get_program(), "asciidoctor");
    let args: Vec<&OsStr> = cmd.get_args().collect();
    assert_eq!(
        args,
        vec![
            "-b",
            "html5",
            "-a",
            "toc=left",
            "-o",
            "/docs/guide.html",
            "/docs/guide.adoc"
        ]
    );
}

/// **VALUE**: Verifies that PDF requests run the dedicated PDF converter without `-b`.
///
/// **BUG THIS CATCHES**: Would catch calling `asciidoctor -b pdf`, which fails unless the PDF
/// extension happens to be loaded.
#[test]
fn given_pdf_request_when_build_command_called_then_uses_pdf_command() {
    // GIVEN: A PDF request and a custom PDF command
    let engine = AsciidoctorEngine::new(EngineSettings {
        pdf_command: "/opt/bin/asciidoctor-pdf".to_string(),
        ..Default::default()
    });
    let request = ConversionRequest::new("j5", "in.adoc", options(&[("backend", "pdf")]));

    // WHEN: Building the command
    let cmd = engine.build_command(&request, Path::new("in.pdf"));

    // THEN: The PDF command runs with output and source only
    assert_eq!(cmd.get_program(), "/opt/bin/asciidoctor-pdf");
    let args: Vec<&OsStr> = cmd.get_args().collect();
    assert_eq!(args, vec!["-o", "in.pdf", "in.adoc"]);
}

/// **VALUE**: Verifies that a missing source file fails before any process is spawned.
///
/// **BUG THIS CATCHES**: Would catch passing a bad path to the converter and reporting its
/// cryptic stderr instead of naming the missing file.
#[test]
fn given_missing_source_when_convert_called_then_returns_source_missing() {
    // GIVEN: A path that does not exist
    let engine = AsciidoctorEngine::default();
    let request = ConversionRequest::new("j6", "/definitely/not/here.adoc", HashMap::new());

    // WHEN: Converting
    let result = engine.convert(&request, &CancellationFlag::new());

    // THEN: SourceMissing names the path
    match result {
        Err(EngineError::SourceMissing { path, .. }) => {
            assert_eq!(path, PathBuf::from("/definitely/not/here.adoc"))
        }
        other => panic!("Expected SourceMissing, got {other:?}"),
    }
}

/// **VALUE**: Verifies that an already canceled job kills the converter and reports Canceled.
///
/// **WHY THIS MATTERS**: The dispatcher relies on the engine noticing cancellation; otherwise
/// every canceled job burns the grace period and leaves an orphaned converter behind.
///
/// **BUG THIS CATCHES**: Would catch an engine that only checks the flag after the child exits.
#[cfg(unix)]
#[test]
fn given_canceled_flag_when_convert_called_then_returns_canceled() {
    // GIVEN: A real source file, a harmless converter and a pre-canceled flag
    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("doc.adoc");
    std::fs::write(&source, "= Title\n").unwrap();
    let engine = AsciidoctorEngine::new(EngineSettings {
        html_command: "true".to_string(),
        ..Default::default()
    });
    let request = ConversionRequest::new("j7", &source, HashMap::new());
    let flag = CancellationFlag::new();
    flag.cancel();

    // WHEN: Converting
    let result = engine.convert(&request, &flag);

    // THEN: The job reports cancellation
    let error = result.unwrap_err();
    assert!(error.is_canceled(), "Expected Canceled, got {error}");
    assert!(error.to_string().contains("canceled"));
}

/// **VALUE**: Verifies that a converter exiting cleanly without writing output is a failure.
///
/// **BUG THIS CATCHES**: Would catch returning a success path for a file that was never written.
#[cfg(unix)]
#[test]
fn given_converter_without_output_when_convert_called_then_returns_failed() {
    // GIVEN: A converter that exits 0 and writes nothing
    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("doc.adoc");
    std::fs::write(&source, "= Title\n").unwrap();
    let engine = AsciidoctorEngine::new(EngineSettings {
        html_command: "true".to_string(),
        ..Default::default()
    });
    let request = ConversionRequest::new("j8", &source, HashMap::new());

    // WHEN: Converting
    let result = engine.convert(&request, &CancellationFlag::new());

    // THEN: Failed mentions the missing file
    match result {
        Err(EngineError::Failed { message, .. }) => {
            assert!(message.contains("produced no file"), "Got: {message}")
        }
        other => panic!("Expected Failed, got {other:?}"),
    }
}

/// **VALUE**: Verifies that a non-zero exit surfaces as Failed.
///
/// **BUG THIS CATCHES**: Would catch ignoring the exit status and only checking for the file.
#[cfg(unix)]
#[test]
fn given_failing_converter_when_convert_called_then_returns_failed_with_status() {
    // GIVEN: A converter that always exits 1
    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("doc.adoc");
    std::fs::write(&source, "= Title\n").unwrap();
    let engine = AsciidoctorEngine::new(EngineSettings {
        html_command: "false".to_string(),
        ..Default::default()
    });
    let request = ConversionRequest::new("j9", &source, HashMap::new());

    // WHEN: Converting
    let result = engine.convert(&request, &CancellationFlag::new());

    // THEN: Failed carries the exit status
    match result {
        Err(EngineError::Failed { message, .. }) => {
            assert!(message.contains("exited with"), "Got: {message}")
        }
        other => panic!("Expected Failed, got {other:?}"),
    }
}

/// **VALUE**: Verifies that canceling a running conversion stops a converter whose work
/// happens in a child process of its own, and that the engine returns promptly.
///
/// **WHY THIS MATTERS**: Real converters are often wrapper scripts (`bundle exec`, distro
/// launchers) that fork the actual tool. Killing only the wrapper leaves the tool running and
/// holding the stderr pipe, so the worker thread stays busy with work nobody wants.
///
/// **BUG THIS CATCHES**: Would catch killing only the direct child, or joining the stderr
/// reader after cancellation, either of which blocks until `sleep 6` finishes.
#[cfg(unix)]
#[test]
fn given_wrapper_script_with_child_process_when_canceled_mid_conversion_then_returns_promptly() {
    use std::os::unix::fs::PermissionsExt;
    use std::time::{Duration, Instant};

    // GIVEN: A converter script that runs `sleep` as a separate child process
    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("doc.adoc");
    std::fs::write(&source, "= Title\n").unwrap();
    let script = dir.path().join("slow-converter.sh");
    std::fs::write(&script, "#!/bin/sh\nsleep 6\nexit 0\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let engine = AsciidoctorEngine::new(EngineSettings {
        html_command: script.to_string_lossy().to_string(),
        ..Default::default()
    });
    let request = ConversionRequest::new("j10", &source, HashMap::new());
    let flag = CancellationFlag::new();

    // WHEN: The job is canceled while the converter is running
    let canceller = {
        let flag = flag.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            flag.cancel();
        })
    };
    let started = Instant::now();
    let result = engine.convert(&request, &flag);
    let elapsed = started.elapsed();
    canceller.join().unwrap();

    // THEN: Canceled is reported well before the grandchild would have finished
    let error = result.unwrap_err();
    assert!(error.is_canceled(), "Expected Canceled, got {error}");
    assert!(
        elapsed < Duration::from_secs(3),
        "Engine blocked {elapsed:?} after cancel"
    );
}

/// **VALUE**: Verifies that an unknown backend name cannot inject path separators into the
/// artifact file name.
///
/// **WHY THIS MATTERS**: The backend option comes straight from the client. Used verbatim as
/// an extension, `../x` would make the result path point outside the output directory.
///
/// **BUG THIS CATCHES**: Would catch `Backend::Other` returning its raw name as the extension.
#[test]
fn given_backend_with_path_separators_when_output_path_computed_then_stays_in_directory() {
    // GIVEN: A request whose backend name contains traversal characters
    let request = ConversionRequest::new(
        "j11",
        "/docs/guide.adoc",
        options(&[("backend", "../../etc/x")]),
    );

    // WHEN: Computing the output path
    let output = request.output_path(Some(Path::new("/tmp/out")));

    // THEN: The file stays directly inside the output directory
    assert_eq!(output.parent(), Some(Path::new("/tmp/out")));
    assert_eq!(output, PathBuf::from("/tmp/out/guide.______etc_x"));
}
