// Lighthouse result → warehouse record.
//
// Every check named here must be present in the report; a missing audit or
// category fails the whole record rather than defaulting. A present audit
// with a null score counts as not passed.

use serde_json::Value;
use thiserror::Error;

use siteaudit_common::{
    AccessibilityScores, BestPracticesScores, MetricScore, NormalizedRecord, PerformanceScores,
    PwaScores, SeoScores,
};

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("report is missing `{0}`")]
    MissingField(&'static str),

    #[error("report is missing audit `{0}`")]
    MissingAudit(&'static str),

    #[error("report is missing category `{0}`")]
    MissingCategory(&'static str),
}

struct Report<'a>(&'a Value);

impl<'a> Report<'a> {
    fn object(&self, key: &'static str) -> Result<&'a Value, NormalizeError> {
        self.0
            .get(key)
            .filter(|v| v.is_object())
            .ok_or(NormalizeError::MissingField(key))
    }

    fn string(&self, key: &'static str) -> Result<String, NormalizeError> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or(NormalizeError::MissingField(key))
    }

    fn audit(&self, id: &'static str) -> Result<&'a Value, NormalizeError> {
        self.object("audits")?
            .get(id)
            .ok_or(NormalizeError::MissingAudit(id))
    }

    /// Binary audits pass only with a score of exactly 1.
    fn passed(&self, id: &'static str) -> Result<bool, NormalizeError> {
        Ok(self.audit(id)?.get("score").and_then(Value::as_f64) == Some(1.0))
    }

    /// Older reports carry `rawValue`, newer ones `numericValue`.
    fn metric(&self, id: &'static str) -> Result<Vec<MetricScore>, NormalizeError> {
        let audit = self.audit(id)?;
        let raw_value = audit
            .get("rawValue")
            .or_else(|| audit.get("numericValue"))
            .and_then(Value::as_f64);
        let score = audit.get("score").and_then(Value::as_f64);
        Ok(vec![MetricScore { raw_value, score }])
    }

    fn category_score(&self, id: &'static str) -> Result<Option<f64>, NormalizeError> {
        let category = self
            .object("categories")?
            .get(id)
            .ok_or(NormalizeError::MissingCategory(id))?;
        Ok(category.get("score").and_then(Value::as_f64))
    }
}

/// Project a raw Lighthouse result onto the fixed analytical schema.
/// `job_id` is left unset; the orchestrator assigns it per run.
pub fn normalize(lhr: &Value, site_id: &str) -> Result<NormalizedRecord, NormalizeError> {
    let r = Report(lhr);
    let settings = r.object("configSettings")?;

    let emulated_as = settings
        .get("emulatedFormFactor")
        .or_else(|| settings.get("formFactor"))
        .and_then(Value::as_str)
        .map(String::from);
    let blocked_urls = settings
        .get("blockedUrlPatterns")
        .and_then(Value::as_array)
        .map(|patterns| {
            patterns
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Ok(NormalizedRecord {
        fetch_time: r.string("fetchTime")?,
        site_url: r.string("finalUrl")?,
        site_id: site_id.to_string(),
        user_agent: r.string("userAgent")?,
        emulated_as,
        blocked_urls,
        accessibility: vec![AccessibilityScores {
            total_score: r.category_score("accessibility")?,
            bypass_repetitive_content: r.passed("bypass")?,
            color_contrast: r.passed("color-contrast")?,
            document_title_found: r.passed("document-title")?,
            no_duplicate_id_attribute: r.passed("duplicate-id")?,
            html_has_lang_attribute: r.passed("html-has-lang")?,
            html_lang_is_valid: r.passed("html-lang-valid")?,
            images_have_alt_attribute: r.passed("image-alt")?,
            form_elements_have_labels: r.passed("label")?,
            links_have_names: r.passed("link-name")?,
            lists_are_well_formed: r.passed("list")?,
            list_items_within_proper_parents: r.passed("listitem")?,
            meta_viewport_allows_zoom: r.passed("meta-viewport")?,
        }],
        best_practices: vec![BestPracticesScores {
            total_score: r.category_score("best-practices")?,
            avoid_application_cache: r.passed("appcache-manifest")?,
            uses_https: r.passed("is-on-https")?,
            uses_http2: r.passed("uses-http2")?,
            uses_passive_event_listeners: r.passed("uses-passive-event-listeners")?,
            no_document_write: r.passed("no-document-write")?,
            external_anchors_use_rel_noopener: r.passed("external-anchors-use-rel-noopener")?,
            no_geolocation_on_start: r.passed("geolocation-on-start")?,
            doctype_defined: r.passed("doctype")?,
            no_vulnerable_libraries: r.passed("no-vulnerable-libraries")?,
            notification_asked_on_start: r.passed("notification-on-start")?,
            avoid_deprecated_apis: r.passed("deprecations")?,
            allow_paste_to_password_field: r.passed("password-inputs-can-be-pasted-into")?,
            errors_in_console: r.passed("errors-in-console")?,
            images_have_correct_aspect_ratio: r.passed("image-aspect-ratio")?,
        }],
        performance: vec![PerformanceScores {
            total_score: r.category_score("performance")?,
            first_contentful_paint: r.metric("first-contentful-paint")?,
            first_meaningful_paint: r.metric("first-meaningful-paint")?,
            speed_index: r.metric("speed-index")?,
            page_interactive: r.metric("interactive")?,
            first_cpu_idle: r.metric("first-cpu-idle")?,
        }],
        pwa: vec![PwaScores {
            total_score: r.category_score("pwa")?,
            load_fast_enough: r.passed("load-fast-enough-for-pwa")?,
            works_offline: r.passed("works-offline")?,
            installable_manifest: r.passed("installable-manifest")?,
            uses_https: r.passed("is-on-https")?,
            redirects_http_to_https: r.passed("redirects-http")?,
            has_meta_viewport: r.passed("viewport")?,
            uses_service_worker: r.passed("service-worker")?,
            works_without_javascript: r.passed("without-javascript")?,
            splash_screen_found: r.passed("splash-screen")?,
            themed_address_bar: r.passed("themed-omnibox")?,
        }],
        seo: vec![SeoScores {
            total_score: r.category_score("seo")?,
            has_meta_viewport: r.passed("viewport")?,
            document_title_found: r.passed("document-title")?,
            meta_description: r.passed("meta-description")?,
            http_status_code: r.passed("http-status-code")?,
            descriptive_link_text: r.passed("link-text")?,
            is_crawlable: r.passed("is-crawlable")?,
            robots_txt_valid: r.passed("robots-txt")?,
            hreflang_valid: r.passed("hreflang")?,
            font_size_ok: r.passed("font-size")?,
            plugins_ok: r.passed("plugins")?,
        }],
        job_id: None,
    })
}
