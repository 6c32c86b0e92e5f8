//! Converts non-PDF uploads into PDF using an external tool.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::error::ConvertError;
use crate::processor::DocumentFormat;
use crate::sanitize;

/// Something that can render a DOCX or HTML file as a PDF.
pub trait PdfConverter: Send + Sync {
    fn convert(
        &self,
        input: &Path,
        format: DocumentFormat,
        output: &Path,
    ) -> Result<(), ConvertError>;
}

/// Runs a command line tool such as `pandoc` or `soffice`.
///
/// `{input}`, `{output}` and `{format}` in the argument template are replaced
/// per call.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    command: String,
    args: Vec<String>,
}

impl CommandConverter {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    /// `pandoc {input} --from {format} -o {output}`.
    pub fn pandoc() -> Self {
        Self::new(
            "pandoc",
            vec![
                "{input}".to_string(),
                "--from".to_string(),
                "{format}".to_string(),
                "-o".to_string(),
                "{output}".to_string(),
            ],
        )
    }

    fn render_args(&self, input: &Path, format: DocumentFormat, output: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let output = output.display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{output}", &output)
                    .replace("{format}", format.as_str())
            })
            .collect()
    }
}

impl PdfConverter for CommandConverter {
    fn convert(
        &self,
        input: &Path,
        format: DocumentFormat,
        output: &Path,
    ) -> Result<(), ConvertError> {
        let args = self.render_args(input, format, output);
        debug!(command = %self.command, "Running converter");

        let mut command = Command::new(&self.command);
        command.args(&args);
        // Tools that drop side files (soffice, pandoc's media) do so in the
        // scratch directory.
        if let Some(dir) = output.parent() {
            command.current_dir(dir);
        }
        let result = command
            .output()
            .map_err(|e| ConvertError::ToolLaunch {
                command: self.command.clone(),
                source: e,
            })?;

        if !result.status.success() {
            return Err(ConvertError::ToolFailed {
                command: self.command.clone(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Returns a PDF version of `path`.
///
/// PDFs come back unchanged. DOCX and HTML files are converted in a
/// temporary directory beside the original, and the result is moved next to
/// it under the same file name with the extension swapped to `.pdf`.
pub fn to_pdf(path: &Path, converter: &dyn PdfConverter) -> Result<PathBuf, ConvertError> {
    let format = DocumentFormat::detect(path)?;
    if format == DocumentFormat::Pdf {
        return Ok(path.to_path_buf());
    }

    let _span = tracing::info_span!("convert_to_pdf",
        filename = %sanitize::redact_path(path),
        format = format.as_str(),
    )
    .entered();

    let target = path.with_extension("pdf");
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let scratch_dir = tempfile::Builder::new()
        .prefix("sopn_convert")
        .tempdir_in(parent)
        .map_err(|e| ConvertError::WriteOutput {
            path: parent.to_path_buf(),
            source: e,
        })?;
    let scratch = scratch_dir.path().join("converted.pdf");

    converter.convert(path, format, &scratch)?;

    let produced = std::fs::metadata(&scratch)
        .map(|m| m.len() > 0)
        .unwrap_or(false);
    if !produced {
        return Err(ConvertError::MissingOutput(scratch));
    }

    std::fs::rename(&scratch, &target).map_err(|e| ConvertError::WriteOutput {
        path: target.clone(),
        source: e,
    })?;

    info!(output = %sanitize::redact_path(&target), "Converted document to PDF");
    Ok(target)
}
