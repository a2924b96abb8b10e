// BigQuery REST: table existence, creation and streaming inserts.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GcpError, Result};
use crate::session::{check_status, GcpSession};

const BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// One column of a table schema, in BigQuery's own JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// A streaming-insert row. `insert_id` lets BigQuery dedupe retried rows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertRow {
    pub insert_id: String,
    pub json: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<serde_json::Value>,
}

pub struct BigQueryClient {
    session: GcpSession,
}

impl BigQueryClient {
    pub fn new(session: GcpSession) -> Self {
        Self { session }
    }

    pub async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        let token = self.session.bearer().await?;
        let resp = self
            .session
            .http()
            .get(table_url(table))
            .bearer_auth(token)
            .send()
            .await?;

        match check_status(resp, &table.to_string()).await {
            Ok(_) => Ok(true),
            Err(GcpError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn create_table(&self, table: &TableRef, schema: &[TableFieldSchema]) -> Result<()> {
        let token = self.session.bearer().await?;
        let body = serde_json::json!({
            "tableReference": {
                "projectId": table.project_id,
                "datasetId": table.dataset_id,
                "tableId": table.table_id,
            },
            "schema": { "fields": schema },
        });

        debug!(table = %table, columns = schema.len(), "Creating table");

        let resp = self
            .session
            .http()
            .post(format!(
                "{BASE_URL}/projects/{}/datasets/{}/tables",
                table.project_id, table.dataset_id
            ))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        check_status(resp, &table.to_string()).await?;
        Ok(())
    }

    /// Stream rows into the table. Per-row rejections are reported as an error.
    pub async fn insert_all(&self, table: &TableRef, rows: Vec<InsertRow>) -> Result<()> {
        let token = self.session.bearer().await?;
        let body = serde_json::json!({ "rows": rows });

        let resp = self
            .session
            .http()
            .post(format!("{}/insertAll", table_url(table)))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let resp = check_status(resp, &table.to_string()).await?;
        let parsed: InsertAllResponse = resp.json().await?;
        if !parsed.insert_errors.is_empty() {
            return Err(GcpError::Api {
                status: 200,
                message: serde_json::to_string(&parsed.insert_errors)?,
            });
        }
        Ok(())
    }
}

fn table_url(table: &TableRef) -> String {
    format!(
        "{BASE_URL}/projects/{}/datasets/{}/tables/{}",
        table.project_id, table.dataset_id, table.table_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_field_round_trips_bigquery_json() {
        let raw = r#"{"name":"accessibility","type":"RECORD","mode":"REPEATED","fields":[{"name":"total_score","type":"FLOAT"}]}"#;
        let field: TableFieldSchema = serde_json::from_str(raw).unwrap();
        assert_eq!(field.fields.len(), 1);
        assert_eq!(field.fields[0].mode, None);
        assert_eq!(serde_json::to_string(&field).unwrap(), raw);
    }

    #[test]
    fn insert_row_uses_api_field_names() {
        let row = InsertRow {
            insert_id: "abc".to_string(),
            json: serde_json::json!({"site_id": "ebay"}),
        };
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            serde_json::json!({"insertId": "abc", "json": {"site_id": "ebay"}})
        );
    }

    #[test]
    fn table_ref_formats_as_dotted_path() {
        let table = TableRef {
            project_id: "p".into(),
            dataset_id: "lighthouse".into(),
            table_id: "reports".into(),
        };
        assert_eq!(table.to_string(), "p.lighthouse.reports");
        assert_eq!(
            table_url(&table),
            "https://bigquery.googleapis.com/bigquery/v2/projects/p/datasets/lighthouse/tables/reports"
        );
    }
}
