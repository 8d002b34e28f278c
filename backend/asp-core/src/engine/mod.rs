//! Conversion engine boundary.
//!
//! The server never converts documents itself: it hands a [`ConversionRequest`]
//! and a [`CancellationFlag`] to a [`ConversionEngine`] on a blocking worker and
//! translates the outcome into a response. [`AsciidoctorEngine`] delegates to
//! the asciidoctor command-line tools; tests plug in their own engines.

mod asciidoctor;
mod cancellation;

pub use asciidoctor::AsciidoctorEngine;
pub use cancellation::CancellationFlag;

use crate::error::engine::EngineError;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Option key selecting the output format.
pub const BACKEND_OPTION: &str = "backend";

/// A document conversion backend.
///
/// Implementations run on a blocking worker thread and should check
/// `cancellation` regularly, returning [`EngineError::Canceled`] once it is set.
pub trait ConversionEngine: Send + Sync {
    fn convert(
        &self,
        request: &ConversionRequest,
        cancellation: &CancellationFlag,
    ) -> Result<PathBuf, EngineError>;
}

/// One conversion as seen by an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub job_id: String,
    pub source: PathBuf,
    /// Every option the client sent, `backend` included.
    pub options: HashMap<String, String>,
}

impl ConversionRequest {
    pub fn new(
        job_id: impl Into<String>,
        source: impl Into<PathBuf>,
        options: HashMap<String, String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            source: source.into(),
            options,
        }
    }

    pub fn backend(&self) -> Backend {
        Backend::from_options(&self.options)
    }

    /// Options other than `backend`, in a stable order.
    pub fn passthrough_options(&self) -> Vec<(&str, &str)> {
        let mut options: Vec<(&str, &str)> = self
            .options
            .iter()
            .filter(|(key, _)| key.as_str() != BACKEND_OPTION)
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        options.sort_unstable();
        options
    }

    /// Artifact path for this request.
    ///
    /// Lands in `output_dir` when given, otherwise next to the source, with the
    /// source's stem and the backend's extension.
    pub fn output_path(&self, output_dir: Option<&Path>) -> PathBuf {
        let extension = self.backend().extension();
        let file_name = self
            .source
            .file_stem()
            .map(|stem| {
                let mut name = stem.to_os_string();
                name.push(".");
                name.push(&extension);
                name
            })
            .unwrap_or_else(|| format!("{}.{extension}", self.job_id).into());

        match output_dir {
            Some(dir) => dir.join(file_name),
            None => self.source.with_file_name(file_name),
        }
    }
}

/// Output format selected by the `backend` option.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Html5,
    Xhtml5,
    Pdf,
    DocBook5,
    Manpage,
    Epub3,
    /// Unknown names go to the engine untouched.
    Other(String),
}

impl Backend {
    pub fn from_options(options: &HashMap<String, String>) -> Self {
        options
            .get(BACKEND_OPTION)
            .map(|name| Self::from_name(name))
            .unwrap_or_default()
    }

    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "html" | "html5" => Backend::Html5,
            "xhtml" | "xhtml5" => Backend::Xhtml5,
            "pdf" => Backend::Pdf,
            "docbook" | "docbook5" => Backend::DocBook5,
            "manpage" => Backend::Manpage,
            "epub" | "epub3" => Backend::Epub3,
            _ => Backend::Other(name.trim().to_string()),
        }
    }

    /// Name understood by asciidoctor's `-b` flag.
    pub fn name(&self) -> &str {
        match self {
            Backend::Html5 => "html5",
            Backend::Xhtml5 => "xhtml5",
            Backend::Pdf => "pdf",
            Backend::DocBook5 => "docbook5",
            Backend::Manpage => "manpage",
            Backend::Epub3 => "epub3",
            Backend::Other(name) => name,
        }
    }

    pub fn extension(&self) -> String {
        match self {
            Backend::Html5 | Backend::Xhtml5 => "html".to_string(),
            Backend::Pdf => "pdf".to_string(),
            Backend::DocBook5 => "xml".to_string(),
            Backend::Manpage => "man".to_string(),
            Backend::Epub3 => "epub".to_string(),
            Backend::Other(name) => sanitize_extension(name),
        }
    }
}

/// Keeps `[A-Za-z0-9_-]` and replaces everything else with `_`, so a client
/// supplied backend name can never steer the artifact out of its directory.
fn sanitize_extension(name: &str) -> String {
    let extension: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if extension.is_empty() {
        "out".to_string()
    } else {
        extension
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
