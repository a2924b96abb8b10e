// Lighthouse CLI driver. Runs one audit against an already-running browser.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{LighthouseError, Result};
use crate::flags::{LighthouseFlags, OutputFormat};

/// Raw Lighthouse result plus the rendered artifacts, one per requested
/// output format and in the same order as `LighthouseFlags::output`.
#[derive(Debug, Clone)]
pub struct AuditOutcome {
    pub lhr: serde_json::Value,
    pub report: Vec<String>,
}

pub struct LighthouseCli {
    binary: String,
}

impl LighthouseCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Uses `LIGHTHOUSE_BIN` when set, `lighthouse` otherwise.
    pub fn from_env() -> Self {
        Self::new(std::env::var("LIGHTHOUSE_BIN").unwrap_or_else(|_| "lighthouse".to_string()))
    }

    pub async fn audit(&self, url: &str, port: u16, flags: &LighthouseFlags) -> Result<AuditOutcome> {
        let workdir = tempfile::tempdir()?;
        let output_path = workdir.path().join("audit");
        let rendered = rendered_formats(flags);
        let args = build_args(url, port, flags, &rendered, &output_path);

        info!(url, port, outputs = rendered.len(), "Running lighthouse");
        debug!(args = ?args, "lighthouse arguments");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(LighthouseError::Audit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let mut files = HashMap::new();
        for format in &rendered {
            let path = output_file(&output_path, *format, rendered.len());
            let body = tokio::fs::read_to_string(&path).await.map_err(|e| {
                LighthouseError::Parse(format!("{}: {e}", path.display()))
            })?;
            files.insert(*format, body);
        }

        let lhr_text = files
            .get(&OutputFormat::Json)
            .ok_or(LighthouseError::MissingReport("json"))?;
        let lhr: serde_json::Value = serde_json::from_str(lhr_text)?;

        let report = flags
            .output_formats()
            .into_iter()
            .map(|format| {
                files
                    .get(&format)
                    .cloned()
                    .ok_or(LighthouseError::MissingReport(format.as_str()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(AuditOutcome { lhr, report })
    }
}

/// Requested formats without duplicates, with JSON always present because
/// the raw result is read back from it.
fn rendered_formats(flags: &LighthouseFlags) -> Vec<OutputFormat> {
    let mut formats = Vec::new();
    for format in flags.output_formats() {
        if !formats.contains(&format) {
            formats.push(format);
        }
    }
    if !formats.contains(&OutputFormat::Json) {
        formats.push(OutputFormat::Json);
    }
    formats
}

fn build_args(
    url: &str,
    port: u16,
    flags: &LighthouseFlags,
    rendered: &[OutputFormat],
    output_path: &Path,
) -> Vec<String> {
    let mut args = vec![url.to_string(), format!("--port={port}")];
    for format in rendered {
        args.push(format!("--output={}", format.as_str()));
    }
    args.push(format!("--output-path={}", output_path.display()));
    args.push("--quiet".to_string());
    args.extend(flags.to_args());
    args
}

/// Lighthouse writes a single output to the exact path and multiple outputs
/// to `<path>.report.<ext>`.
fn output_file(output_path: &Path, format: OutputFormat, count: usize) -> PathBuf {
    if count == 1 {
        return output_path.to_path_buf();
    }
    let mut name = output_path.as_os_str().to_owned();
    name.push(format!(".report.{}", format.extension()));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(output: &[&str]) -> LighthouseFlags {
        LighthouseFlags {
            output: output.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn json_is_always_rendered() {
        assert_eq!(rendered_formats(&flags(&[])), vec![OutputFormat::Json]);
        assert_eq!(
            rendered_formats(&flags(&["html", "csv", "html"])),
            vec![OutputFormat::Html, OutputFormat::Csv, OutputFormat::Json]
        );
    }

    #[test]
    fn args_attach_to_port_and_forward_flags() {
        let mut f = flags(&["html"]);
        f.emulated_form_factor = Some("mobile".to_string());
        let rendered = rendered_formats(&f);
        let args = build_args("https://example.com/", 9222, &f, &rendered, Path::new("/tmp/x/audit"));

        assert_eq!(args[0], "https://example.com/");
        assert!(args.contains(&"--port=9222".to_string()));
        assert!(args.contains(&"--output=html".to_string()));
        assert!(args.contains(&"--output=json".to_string()));
        assert!(args.contains(&"--output-path=/tmp/x/audit".to_string()));
        assert!(args.contains(&"--emulated-form-factor=mobile".to_string()));
    }

    #[test]
    fn output_file_naming_follows_lighthouse() {
        let base = Path::new("/tmp/x/audit");
        assert_eq!(output_file(base, OutputFormat::Json, 1), PathBuf::from("/tmp/x/audit"));
        assert_eq!(
            output_file(base, OutputFormat::Csv, 2),
            PathBuf::from("/tmp/x/audit.report.csv")
        );
    }
}
