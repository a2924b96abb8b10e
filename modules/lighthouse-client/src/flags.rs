use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Rendered report format requested through `LighthouseFlags::output`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Html,
    Csv,
    Json,
}

impl OutputFormat {
    /// Unrecognised names fall back to HTML, Lighthouse's own default.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "csv" => OutputFormat::Csv,
            "json" => OutputFormat::Json,
            _ => OutputFormat::Html,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Html => "text/html",
            OutputFormat::Csv => "text/csv",
            OutputFormat::Json => "application/json",
        }
    }
}

/// Options forwarded to the Lighthouse CLI. Field names follow Lighthouse's
/// own flag object so existing config files load unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LighthouseFlags {
    /// Rendered report formats (`html`, `csv`, `json`), in artifact order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,

    /// `mobile` or `desktop`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emulated_form_factor: Option<String>,

    /// Request URL patterns the browser refuses to load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_url_patterns: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_categories: Option<Vec<String>>,

    /// `simulate`, `devtools` or `provided`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttling_method: Option<String>,
}

impl LighthouseFlags {
    pub fn output_formats(&self) -> Vec<OutputFormat> {
        self.output.iter().map(|name| OutputFormat::from_name(name)).collect()
    }

    /// CLI arguments for everything except url, port and output selection.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(ref form_factor) = self.emulated_form_factor {
            args.push(format!("--emulated-form-factor={form_factor}"));
        }
        for pattern in self.blocked_url_patterns.iter().flatten() {
            args.push(format!("--blocked-url-patterns={pattern}"));
        }
        for category in self.only_categories.iter().flatten() {
            args.push(format!("--only-categories={category}"));
        }
        if let Some(ref method) = self.throttling_method {
            args.push(format!("--throttling-method={method}"));
        }
        args
    }
}
