use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::ConverterConfig;
use crate::convert::{ConvertError, ConvertedDocument, Converter, DocumentTree};
use crate::upload::InputFormat;

const STAGED_STEM: &str = "document";

/// Runs the `docling` command-line converter as a child process.
///
/// Each call works in its own temp dir under `work_dir`; the dir and any
/// still-running child are cleaned up when the call returns or is dropped.
pub struct DoclingCli {
    binary: String,
    timeout: Duration,
    work_dir: PathBuf,
}

impl DoclingCli {
    pub fn new(config: &ConverterConfig, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: config.docling_bin.clone(),
            timeout: config.timeout,
            work_dir: work_dir.into(),
        }
    }
}

fn from_arg(format: InputFormat) -> &'static str {
    match format {
        InputFormat::Pdf => "pdf",
        InputFormat::Image => "image",
        InputFormat::Docx => "docx",
        InputFormat::Html => "html",
        InputFormat::Pptx => "pptx",
    }
}

/// Docling also looks at the extension, so the staged copy gets one that
/// agrees with the sniffed format.
async fn staged_extension(
    format: InputFormat,
    input: &Path,
) -> Result<&'static str, ConvertError> {
    let ext = match format {
        InputFormat::Pdf => "pdf",
        InputFormat::Docx => "docx",
        InputFormat::Html => "html",
        InputFormat::Pptx => "pptx",
        InputFormat::Image => {
            let mut head = [0u8; 16];
            let n = tokio::fs::File::open(input)
                .await?
                .read(&mut head)
                .await?;
            match crate::sniff::sniff_mime(&head[..n]).as_str() {
                "image/jpeg" => "jpg",
                "image/gif" => "gif",
                "image/webp" => "webp",
                _ => "png",
            }
        }
    };
    Ok(ext)
}

#[async_trait::async_trait]
impl Converter for DoclingCli {
    fn name(&self) -> &str {
        "docling"
    }

    async fn convert(
        &self,
        input: &Path,
        format: InputFormat,
    ) -> Result<ConvertedDocument, ConvertError> {
        let workspace = tempfile::Builder::new()
            .prefix("docling-")
            .tempdir_in(&self.work_dir)?;
        let result = self.run_in(workspace.path(), input, format).await;

        // Removal walks the whole output tree; a dropped future still falls
        // back to the TempDir destructor.
        if let Err(e) = tokio::task::spawn_blocking(move || drop(workspace)).await {
            warn!(error = %e, "workspace cleanup task failed");
        }
        result
    }
}

impl DoclingCli {
    async fn run_in(
        &self,
        workspace: &Path,
        input: &Path,
        format: InputFormat,
    ) -> Result<ConvertedDocument, ConvertError> {
        let out_dir = workspace.join("out");
        tokio::fs::create_dir(&out_dir).await?;

        let ext = staged_extension(format, input).await?;
        let staged = workspace.join(format!("{STAGED_STEM}.{ext}"));
        tokio::fs::copy(input, &staged).await?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("--from")
            .arg(from_arg(format))
            .arg("--to")
            .arg("md")
            .arg("--to")
            .arg("json")
            .arg("--image-export-mode")
            .arg("placeholder")
            .arg("--output")
            .arg(&out_dir)
            .arg(&staged);

        debug!(binary = %self.binary, ?format, "running converter");
        let output = output_with_timeout(cmd, self.timeout, &self.binary).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ConvertError::Failed {
                what: self.binary.clone(),
                stderr,
            });
        }

        let markdown = read_output(&out_dir.join(format!("{STAGED_STEM}.md")), "markdown").await?;
        let json = read_output(&out_dir.join(format!("{STAGED_STEM}.json")), "json").await?;
        let structure = DocumentTree::from_json(&json)?;

        Ok(ConvertedDocument::new(structure, markdown))
    }
}

async fn read_output(path: &Path, what: &'static str) -> Result<String, ConvertError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ConvertError::MissingOutput(what))
        }
        Err(e) => Err(e.into()),
    }
}

async fn output_with_timeout(
    mut cmd: Command,
    process_timeout: Duration,
    what: &str,
) -> Result<Output, ConvertError> {
    cmd.kill_on_drop(true);
    let child = cmd.spawn().map_err(|source| ConvertError::Spawn {
        what: what.to_string(),
        source,
    })?;

    match timeout(process_timeout, child.wait_with_output()).await {
        Ok(output) => Ok(output?),
        Err(_) => Err(ConvertError::TimedOut {
            what: what.to_string(),
            secs: process_timeout.as_secs(),
        }),
    }
}
