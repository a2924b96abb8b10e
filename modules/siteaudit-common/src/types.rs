use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// --- Subjects ---

/// A page to audit. `id` is unique within the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Subject {
    pub id: String,
    pub url: String,
}

impl Subject {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }

    /// Why no trigger message can address this id, if none can.
    pub fn id_problem(&self) -> Option<String> {
        if self.id.trim().is_empty() {
            Some("must not be empty".to_string())
        } else if self.id == BROADCAST_ID {
            Some("is reserved".to_string())
        } else if self.id.contains(SEPARATOR) {
            Some(format!("must not contain '{SEPARATOR}'"))
        } else {
            None
        }
    }
}

/// Every unaddressable or duplicated id in a catalog, in catalog order.
/// Entries are labelled by `label(index)`.
pub fn subject_id_errors(subjects: &[Subject], label: impl Fn(usize) -> String) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut errors = Vec::new();
    for (i, subject) in subjects.iter().enumerate() {
        if let Some(problem) = subject.id_problem() {
            errors.push(format!("{} \"{}\" {problem}", label(i), subject.id));
        } else if !seen.insert(subject.id.as_str()) {
            errors.push(format!("{} \"{}\" is duplicated", label(i), subject.id));
        }
    }
    errors
}

// --- Trigger messages ---

pub const BROADCAST_ID: &str = "all";
pub const SEPARATOR: char = '_';

/// Whether third-party requests are blocked during an audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThirdParty {
    Included,
    Blocked,
}

impl ThirdParty {
    pub const ALL: [ThirdParty; 2] = [ThirdParty::Included, ThirdParty::Blocked];

    pub fn as_str(self) -> &'static str {
        match self {
            ThirdParty::Included => "thirdPartyIncluded",
            ThirdParty::Blocked => "thirdPartyBlocked",
        }
    }

    /// Accepts the current sentinels and the older `3PIncluded`/`3PBlocked`.
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "thirdPartyIncluded" | "3PIncluded" => Some(ThirdParty::Included),
            "thirdPartyBlocked" | "3PBlocked" => Some(ThirdParty::Blocked),
            _ => None,
        }
    }
}

impl fmt::Display for ThirdParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEVICE_MODES: [&str; 2] = ["mobile", "desktop"];

/// Decoded `subjectId[_variantFlag[_deviceMode]]` trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMessage {
    raw: String,
    subject_id: String,
    variant_flag: Option<String>,
    device_mode: Option<String>,
}

impl TriggerMessage {
    /// Split on `_`. Shape problems are not errors here; subject validity is
    /// checked against the catalog by the caller.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let mut parts = raw.split(SEPARATOR);
        let subject_id = parts.next().unwrap_or_default().to_string();
        let variant_flag = parts.next().filter(|s| !s.is_empty()).map(String::from);
        let device_mode = parts.next().filter(|s| !s.is_empty()).map(String::from);

        Self {
            raw,
            subject_id,
            variant_flag,
            device_mode,
        }
    }

    pub fn encode(subject_id: &str, third_party: ThirdParty, device_mode: &str) -> String {
        format!("{subject_id}{SEPARATOR}{third_party}{SEPARATOR}{device_mode}")
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn variant_flag(&self) -> Option<&str> {
        self.variant_flag.as_deref()
    }

    pub fn device_mode(&self) -> Option<&str> {
        self.device_mode.as_deref()
    }

    pub fn is_broadcast(&self) -> bool {
        self.subject_id == BROADCAST_ID
    }

    /// Only the blocked sentinel changes behavior; anything else audits with
    /// third parties included.
    pub fn third_party(&self) -> ThirdParty {
        self.variant_flag
            .as_deref()
            .and_then(ThirdParty::from_flag)
            .unwrap_or(ThirdParty::Included)
    }
}

impl fmt::Display for TriggerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// --- Normalized audit record ---

/// Analytical projection of one Lighthouse result. Category sections are
/// single-element lists to match the warehouse's repeated-record columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NormalizedRecord {
    pub fetch_time: String,
    pub site_url: String,
    pub site_id: String,
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emulated_as: Option<String>,
    pub blocked_urls: Vec<String>,
    pub accessibility: Vec<AccessibilityScores>,
    pub best_practices: Vec<BestPracticesScores>,
    pub performance: Vec<PerformanceScores>,
    pub pwa: Vec<PwaScores>,
    pub seo: Vec<SeoScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AccessibilityScores {
    pub total_score: Option<f64>,
    pub bypass_repetitive_content: bool,
    pub color_contrast: bool,
    pub document_title_found: bool,
    pub no_duplicate_id_attribute: bool,
    pub html_has_lang_attribute: bool,
    pub html_lang_is_valid: bool,
    pub images_have_alt_attribute: bool,
    pub form_elements_have_labels: bool,
    pub links_have_names: bool,
    pub lists_are_well_formed: bool,
    pub list_items_within_proper_parents: bool,
    pub meta_viewport_allows_zoom: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BestPracticesScores {
    pub total_score: Option<f64>,
    pub avoid_application_cache: bool,
    pub uses_https: bool,
    pub uses_http2: bool,
    pub uses_passive_event_listeners: bool,
    pub no_document_write: bool,
    pub external_anchors_use_rel_noopener: bool,
    pub no_geolocation_on_start: bool,
    pub doctype_defined: bool,
    pub no_vulnerable_libraries: bool,
    pub notification_asked_on_start: bool,
    pub avoid_deprecated_apis: bool,
    pub allow_paste_to_password_field: bool,
    pub errors_in_console: bool,
    pub images_have_correct_aspect_ratio: bool,
}

/// A timing audit: measured value plus its 0..1 score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricScore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_value: Option<f64>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PerformanceScores {
    pub total_score: Option<f64>,
    pub first_contentful_paint: Vec<MetricScore>,
    pub first_meaningful_paint: Vec<MetricScore>,
    pub speed_index: Vec<MetricScore>,
    pub page_interactive: Vec<MetricScore>,
    pub first_cpu_idle: Vec<MetricScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PwaScores {
    pub total_score: Option<f64>,
    pub load_fast_enough: bool,
    pub works_offline: bool,
    pub installable_manifest: bool,
    pub uses_https: bool,
    pub redirects_http_to_https: bool,
    pub has_meta_viewport: bool,
    pub uses_service_worker: bool,
    pub works_without_javascript: bool,
    pub splash_screen_found: bool,
    pub themed_address_bar: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeoScores {
    pub total_score: Option<f64>,
    pub has_meta_viewport: bool,
    pub document_title_found: bool,
    pub meta_description: bool,
    pub http_status_code: bool,
    pub descriptive_link_text: bool,
    pub is_crawlable: bool,
    pub robots_txt_valid: bool,
    pub hreflang_valid: bool,
    pub font_size_ok: bool,
    pub plugins_ok: bool,
}
