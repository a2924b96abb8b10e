// Subject catalog resolution: the static config list, or an external
// catalog document fetched over HTTP and flattened into {id, url} pairs.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use siteaudit_common::{subject_id_errors, AuditConfig, Environment, Subject};

#[async_trait]
pub trait SubjectSource: Send + Sync {
    /// The current catalog. Called once per invocation.
    async fn subjects(&self) -> Result<Vec<Subject>>;
}

/// Subjects listed directly in the config file.
pub struct StaticSource {
    subjects: Vec<Subject>,
}

impl StaticSource {
    pub fn new(subjects: Vec<Subject>) -> Self {
        Self { subjects }
    }
}

#[async_trait]
impl SubjectSource for StaticSource {
    async fn subjects(&self) -> Result<Vec<Subject>> {
        Ok(self.subjects.clone())
    }
}

/// Subjects fetched from a content API on every invocation.
pub struct ExternalSource {
    http: reqwest::Client,
    url: String,
    authorization: Option<String>,
    sections: Vec<String>,
}

impl ExternalSource {
    pub fn new(url: impl Into<String>, authorization: Option<String>, sections: Vec<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            authorization,
            sections,
        }
    }
}

#[async_trait]
impl SubjectSource for ExternalSource {
    async fn subjects(&self) -> Result<Vec<Subject>> {
        let mut request = self.http.get(&self.url);
        if let Some(ref auth) = self.authorization {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let resp = request.send().await.context("External catalog request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("External catalog returned {status}: {body}");
        }

        let body = resp.text().await?;
        let subjects = flatten_catalog(&body, &self.sections)?;
        info!(url = self.url.as_str(), subjects = subjects.len(), "Loaded external catalog");
        Ok(subjects)
    }
}

/// Pick the catalog source the environment asks for.
pub fn from_config(config: &AuditConfig, environment: &Environment) -> Arc<dyn SubjectSource> {
    match environment.source_url {
        Some(ref url) => Arc::new(ExternalSource::new(
            url.clone(),
            environment.source_auth.clone(),
            config.external_source.sections.clone(),
        )),
        None => Arc::new(StaticSource::new(config.source.clone())),
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    fields: CatalogFields,
}

#[derive(Debug, Deserialize)]
struct CatalogFields {
    json: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    name: String,
    url: String,
    #[serde(default)]
    list: Vec<CatalogEntry>,
}

impl CatalogEntry {
    fn subject(&self) -> Subject {
        Subject::new(&self.name, &self.url)
    }
}

/// Flatten `fields.json.<section>` entries: the section itself, then each
/// entry of its list followed by that entry's own sub-entries. A duplicated,
/// reserved or `_`-containing name rejects the whole catalog.
pub fn flatten_catalog(body: &str, sections: &[String]) -> Result<Vec<Subject>> {
    let document: CatalogDocument =
        serde_json::from_str(body).context("External catalog is not valid JSON")?;

    let mut subjects = Vec::new();
    for section in sections {
        let raw = document
            .fields
            .json
            .get(section)
            .with_context(|| format!("External catalog has no section `{section}`"))?;
        let entry: CatalogEntry = serde_json::from_value(raw.clone())
            .with_context(|| format!("External catalog section `{section}` is malformed"))?;

        subjects.push(entry.subject());
        for child in &entry.list {
            subjects.push(child.subject());
            subjects.extend(child.list.iter().map(CatalogEntry::subject));
        }
    }

    let errors = subject_id_errors(&subjects, |i| format!("entry {i} name"));
    if !errors.is_empty() {
        anyhow::bail!("External catalog is invalid: {}", errors.join("; "));
    }
    Ok(subjects)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "sys": {"id": "catalog"},
        "fields": {
            "title": "Pages",
            "json": {
                "help": {
                    "name": "help",
                    "url": "https://example.com/help",
                    "list": [
                        {"name": "help-faq", "url": "https://example.com/help/faq"}
                    ]
                },
                "mobilePhones": {
                    "name": "phones",
                    "url": "https://example.com/phones",
                    "list": [
                        {
                            "name": "phones-apple",
                            "url": "https://example.com/phones/apple",
                            "list": [
                                {"name": "phones-apple-x", "url": "https://example.com/phones/apple/x"}
                            ]
                        },
                        {"name": "phones-samsung", "url": "https://example.com/phones/samsung"}
                    ]
                },
                "unused": {"name": "ignored", "url": "https://example.com/ignored", "list": []}
            }
        }
    }"#;

    fn sections(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flattens_sections_in_document_order() {
        let subjects = flatten_catalog(DOCUMENT, &sections(&["help", "mobilePhones"])).unwrap();
        let ids: Vec<&str> = subjects.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["help", "help-faq", "phones", "phones-apple", "phones-apple-x", "phones-samsung"]
        );
        assert_eq!(subjects[4].url, "https://example.com/phones/apple/x");
    }

    #[test]
    fn missing_section_is_an_error() {
        let err = flatten_catalog(DOCUMENT, &sections(&["fixedTariffs"])).unwrap_err();
        assert!(err.to_string().contains("fixedTariffs"));
    }

    #[test]
    fn duplicated_name_is_an_error() {
        let body = r#"{"fields": {"json": {"help": {
            "name": "help", "url": "https://a/",
            "list": [{"name": "help", "url": "https://b/"}]
        }}}}"#;
        let err = flatten_catalog(body, &sections(&["help"])).unwrap_err();
        assert!(err.to_string().contains("entry 1 name \"help\" is duplicated"));
    }

    #[test]
    fn unaddressable_names_are_errors() {
        let body = r#"{"fields": {"json": {"help": {
            "name": "my_help", "url": "https://a/",
            "list": [{"name": "all", "url": "https://b/"}]
        }}}}"#;
        let message = flatten_catalog(body, &sections(&["help"])).unwrap_err().to_string();
        assert!(message.contains("\"my_help\" must not contain '_'"));
        assert!(message.contains("\"all\" is reserved"));
    }

    #[test]
    fn non_json_body_is_an_error() {
        assert!(flatten_catalog("<html>", &sections(&["help"])).is_err());
    }

    #[tokio::test]
    async fn static_source_returns_configured_subjects() {
        let source = StaticSource::new(vec![Subject::new("ebay", "https://www.ebay.com/")]);
        let subjects = source.subjects().await.unwrap();
        assert_eq!(subjects, vec![Subject::new("ebay", "https://www.ebay.com/")]);
    }
}
