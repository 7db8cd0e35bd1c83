use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::PollPolicy;
use crate::error::ConnectorError;
use crate::remote::{list_all, segment, ApiRequest, ApiTransport};
use crate::service::ApiService;

const SERVICE: ApiService = ApiService::BidManager;

pub const DEFAULT_DATE_RANGE: &str = "LAST_30_DAYS";
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Reports without a status are treated as still running.
const UNKNOWN_STATE: &str = "UNKNOWN";

pub const FILTER_ADVERTISER: &str = "FILTER_ADVERTISER";
pub const FILTER_CAMPAIGN: &str = "FILTER_MEDIA_PLAN";
pub const FILTER_LINE_ITEM: &str = "FILTER_LINE_ITEM";
pub const FILTER_CREATIVE: &str = "FILTER_CREATIVE_ID";

pub const DEFAULT_METRICS: &[&str] = &[
    "IMPRESSIONS",
    "CLICKS",
    "CTR",
    "TOTAL_CONVERSIONS",
    "MEDIA_COST_USD",
    "REVENUE_USD",
    "BILLABLE_COST_USD",
];

pub const SUMMARY_METRICS: &[&str] = &[
    "IMPRESSIONS",
    "CLICKS",
    "CTR",
    "TOTAL_CONVERSIONS",
    "REVENUE_ADVERTISER",
    "MEDIA_COST_ADVERTISER",
];

pub const AVAILABLE_METRICS: &[(&str, &str)] = &[
    ("IMPRESSIONS", "Number of times ads were displayed"),
    ("CLICKS", "Number of clicks on ads"),
    ("CTR", "Click-through rate (clicks / impressions)"),
    ("TOTAL_CONVERSIONS", "Total number of conversions"),
    ("MEDIA_COST_USD", "Media cost in USD"),
    ("BILLABLE_COST_USD", "Billable cost in USD"),
    ("REVENUE_USD", "Revenue in USD"),
    ("UNIQUE_REACH_IMPRESSION_REACH", "Unique users reached by impressions"),
    ("UNIQUE_REACH_CLICK_REACH", "Unique users who clicked"),
    ("IMPRESSIONS_TO_CONVERSION_RATE", "Conversions per impression"),
];

pub const DATE_RANGES: &[(&str, &str)] = &[
    ("LAST_7_DAYS", "Previous 7 days, excluding today"),
    ("LAST_14_DAYS", "Previous 14 days, excluding today"),
    ("LAST_30_DAYS", "Previous 30 days, excluding today"),
    ("LAST_60_DAYS", "Previous 60 days, excluding today"),
    ("LAST_90_DAYS", "Previous 90 days, excluding today"),
    ("LAST_365_DAYS", "Previous 365 days, excluding today"),
    ("MONTH_TO_DATE", "Current month up to yesterday"),
    ("QUARTER_TO_DATE", "Current quarter up to yesterday"),
    ("YEAR_TO_DATE", "Current year up to yesterday"),
    ("PREVIOUS_MONTH", "Whole previous calendar month"),
    ("PREVIOUS_QUARTER", "Whole previous calendar quarter"),
    ("PREVIOUS_YEAR", "Whole previous calendar year"),
];

/// Accept `last_7_days` style input; reject ranges the API does not know.
pub fn normalize_date_range(raw: &str) -> Result<String, ConnectorError> {
    let upper = raw.trim().to_uppercase();
    if DATE_RANGES.iter().any(|(code, _)| *code == upper) {
        Ok(upper)
    } else {
        Err(ConnectorError::InvalidParams(format!(
            "Unknown date_range '{}'. Use get_available_date_ranges for valid values.",
            raw
        )))
    }
}

/// `IMPRESSIONS` and `METRIC_IMPRESSIONS` both map to the wire name.
pub fn metric_code(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if upper.starts_with("METRIC_") {
        upper
    } else {
        format!("METRIC_{}", upper)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryFilter {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// Builder for a one-time standard CSV report query.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub title: String,
    pub date_range: String,
    pub group_bys: Vec<String>,
    pub filters: Vec<QueryFilter>,
    pub metrics: Vec<String>,
}

impl QuerySpec {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            date_range: DEFAULT_DATE_RANGE.to_string(),
            group_bys: Vec::new(),
            filters: Vec::new(),
            metrics: DEFAULT_METRICS.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn date_range(mut self, range: impl Into<String>) -> Self {
        self.date_range = range.into();
        self
    }

    pub fn group_by(mut self, dimension: &str) -> Self {
        self.group_bys.push(dimension.to_string());
        self
    }

    pub fn filter(mut self, kind: &str, value: impl Into<String>) -> Self {
        self.filters.push(QueryFilter {
            kind: kind.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.metrics = metrics.into_iter().map(|m| m.as_ref().to_string()).collect();
        self
    }

    pub fn to_body(&self) -> Value {
        let metrics: Vec<String> = self.metrics.iter().map(|m| metric_code(m)).collect();
        json!({
            "metadata": {
                "title": self.title,
                "dataRange": {"range": self.date_range},
                "format": "CSV"
            },
            "params": {
                "type": "STANDARD",
                "groupBys": self.group_bys,
                "filters": self.filters,
                "metrics": metrics
            },
            "schedule": {"frequency": "ONE_TIME"}
        })
    }
}

pub fn campaign_query(campaign_id: &str, date_range: &str) -> QuerySpec {
    QuerySpec::new(format!("Campaign Performance - {}", campaign_id))
        .date_range(date_range)
        .group_by(FILTER_CAMPAIGN)
        .filter(FILTER_CAMPAIGN, campaign_id)
}

pub fn summary_query(advertiser_id: &str, campaign_id: &str, date_range: &str) -> QuerySpec {
    QuerySpec::new(format!("Performance Summary - {}", campaign_id))
        .date_range(date_range)
        .group_by(FILTER_CAMPAIGN)
        .filter(FILTER_ADVERTISER, advertiser_id)
        .filter(FILTER_CAMPAIGN, campaign_id)
        .metrics(SUMMARY_METRICS)
}

pub fn campaign_breakdown_query(
    advertiser_id: &str,
    campaign_id: &str,
    date_range: &str,
) -> QuerySpec {
    QuerySpec::new(format!("Campaign Breakdown - {}", campaign_id))
        .date_range(date_range)
        .group_by(FILTER_CAMPAIGN)
        .group_by(FILTER_LINE_ITEM)
        .filter(FILTER_ADVERTISER, advertiser_id)
        .filter(FILTER_CAMPAIGN, campaign_id)
}

pub fn advertiser_query(advertiser_id: &str, date_range: &str) -> QuerySpec {
    QuerySpec::new(format!("Advertiser Performance - {}", advertiser_id))
        .date_range(date_range)
        .group_by(FILTER_CAMPAIGN)
        .group_by(FILTER_LINE_ITEM)
        .filter(FILTER_ADVERTISER, advertiser_id)
}

pub fn line_item_query(advertiser_id: &str, line_item_id: Option<&str>, date_range: &str) -> QuerySpec {
    let spec = QuerySpec::new(format!(
        "Line Item Performance - {}",
        line_item_id.unwrap_or(advertiser_id)
    ))
    .date_range(date_range)
    .group_by(FILTER_LINE_ITEM)
    .group_by(FILTER_CREATIVE)
    .filter(FILTER_ADVERTISER, advertiser_id);
    match line_item_id {
        Some(id) => spec.filter(FILTER_LINE_ITEM, id),
        None => spec,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedQuery {
    pub query_id: String,
    pub query: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportInfo {
    pub query_id: String,
    pub report_id: String,
    pub state: String,
    pub gcs_path: Option<String>,
    pub metadata: Value,
}

impl ReportInfo {
    fn from_report(query_id: &str, report: &Value) -> Self {
        let metadata = report.get("metadata").cloned().unwrap_or_else(|| json!({}));
        Self {
            query_id: query_id.to_string(),
            report_id: report
                .pointer("/key/reportId")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            state: metadata
                .pointer("/status/state")
                .and_then(|v| v.as_str())
                .unwrap_or(UNKNOWN_STATE)
                .to_string(),
            gcs_path: metadata
                .get("googleCloudStoragePath")
                .and_then(|v| v.as_str())
                .filter(|p| !p.is_empty())
                .map(|p| p.to_string()),
            metadata,
        }
    }

    pub fn failure(&self) -> ConnectorError {
        ConnectorError::Other(format!(
            "Report {} for query {} failed",
            self.report_id, self.query_id
        ))
    }
}

/// Readiness of the newest report produced for a query.
#[derive(Debug, Clone)]
pub enum ReportStatus {
    NotReady {
        query_id: String,
        state: Option<String>,
        query: Value,
    },
    Available(ReportInfo),
    Failed(ReportInfo),
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportPreview {
    pub report: ReportInfo,
    pub lines: Vec<String>,
    pub total_lines: usize,
}

#[derive(Debug, Clone)]
pub enum ReportDownload {
    Ready(ReportPreview),
    Pending(ReportStatus),
}

fn newest_report(reports: &[Value]) -> Option<&Value> {
    reports.iter().max_by_key(|r| {
        r.pointer("/key/reportId")
            .and_then(|id| id.as_str())
            .and_then(|id| id.parse::<u64>().ok())
            .unwrap_or(0)
    })
}

fn has_advertiser_filter(query: &Value, advertiser_id: &str) -> bool {
    query
        .pointer("/params/filters")
        .and_then(|f| f.as_array())
        .map(|filters| {
            filters.iter().any(|f| {
                f.get("type").and_then(|t| t.as_str()) == Some(FILTER_ADVERTISER)
                    && f.get("value").and_then(|v| v.as_str()) == Some(advertiser_id)
            })
        })
        .unwrap_or(false)
}

/// Bid Manager v2 query and report calls.
#[derive(Clone)]
pub struct BidManagerClient {
    transport: Arc<dyn ApiTransport>,
}

impl BidManagerClient {
    pub fn new(transport: Arc<dyn ApiTransport>) -> Self {
        Self { transport }
    }

    pub async fn create_query(&self, spec: &QuerySpec) -> Result<CreatedQuery, ConnectorError> {
        let query = self
            .transport
            .execute(SERVICE, ApiRequest::post("queries", spec.to_body()))
            .await?;
        let query_id = query
            .get("queryId")
            .and_then(|id| id.as_str())
            .ok_or_else(|| ConnectorError::Other("Bid Manager returned no queryId".into()))?
            .to_string();
        info!(query_id = %query_id, title = %spec.title, "Created report query");
        Ok(CreatedQuery { query_id, query })
    }

    /// One-time queries only produce a report once run.
    pub async fn run_query(&self, query_id: &str) -> Result<Value, ConnectorError> {
        self.transport
            .execute(
                SERVICE,
                ApiRequest::post(format!("queries/{}:run", segment(query_id)), json!({}))
                    .with_query("synchronous", "false"),
            )
            .await
    }

    pub async fn create_and_run(&self, spec: &QuerySpec) -> Result<CreatedQuery, ConnectorError> {
        let created = self.create_query(spec).await?;
        self.run_query(&created.query_id).await?;
        Ok(created)
    }

    pub async fn get_query(&self, query_id: &str) -> Result<Value, ConnectorError> {
        self.transport
            .execute(SERVICE, ApiRequest::get(format!("queries/{}", segment(query_id))))
            .await
    }

    /// A single page of queries.
    pub async fn list_queries(&self, page_size: u32) -> Result<Vec<Value>, ConnectorError> {
        let response = self
            .transport
            .execute(
                SERVICE,
                ApiRequest::get("queries").with_query("pageSize", page_size.to_string()),
            )
            .await?;
        Ok(response
            .get("queries")
            .and_then(|q| q.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// Saved queries, optionally only those scoped to one advertiser.
    pub async fn list_saved_reports(
        &self,
        advertiser_id: Option<&str>,
    ) -> Result<Vec<Value>, ConnectorError> {
        let queries = list_all(
            self.transport.as_ref(),
            SERVICE,
            ApiRequest::get("queries").with_query("pageSize", DEFAULT_PAGE_SIZE.to_string()),
            "queries",
        )
        .await?;
        Ok(match advertiser_id {
            Some(id) => queries
                .into_iter()
                .filter(|q| has_advertiser_filter(q, id))
                .collect(),
            None => queries,
        })
    }

    pub async fn list_reports(&self, query_id: &str) -> Result<Vec<Value>, ConnectorError> {
        list_all(
            self.transport.as_ref(),
            SERVICE,
            ApiRequest::get(format!("queries/{}/reports", segment(query_id))),
            "reports",
        )
        .await
    }

    pub async fn report_status(&self, query_id: &str) -> Result<ReportStatus, ConnectorError> {
        let (query, reports) =
            tokio::try_join!(self.get_query(query_id), self.list_reports(query_id))?;
        let Some(report) = newest_report(&reports) else {
            return Ok(ReportStatus::NotReady {
                query_id: query_id.to_string(),
                state: None,
                query: query.get("metadata").cloned().unwrap_or(query),
            });
        };
        let info = ReportInfo::from_report(query_id, report);
        Ok(match info.state.as_str() {
            "DONE" => ReportStatus::Available(info),
            "FAILED" => ReportStatus::Failed(info),
            _ => ReportStatus::NotReady {
                query_id: query_id.to_string(),
                state: Some(info.state),
                query: query.get("metadata").cloned().unwrap_or(query),
            },
        })
    }

    /// Poll with exponential backoff until a report is available.
    pub async fn wait_for_report(
        &self,
        query_id: &str,
        policy: PollPolicy,
    ) -> Result<ReportInfo, ConnectorError> {
        let attempts = policy.max_attempts.max(1);
        for attempt in 0..attempts {
            match self.report_status(query_id).await? {
                ReportStatus::Available(info) => {
                    info!(query_id, report_id = %info.report_id, attempt, "Report available");
                    return Ok(info);
                }
                ReportStatus::Failed(info) => {
                    warn!(query_id, report_id = %info.report_id, "Report generation failed");
                    return Err(info.failure());
                }
                ReportStatus::NotReady { state, .. } => {
                    if attempt + 1 < attempts {
                        let delay = policy.delay_for(attempt);
                        debug!(query_id, ?state, attempt, delay_ms = delay.as_millis() as u64, "Report not ready");
                        sleep(delay).await;
                    }
                }
            }
        }
        Err(ConnectorError::Timeout(format!(
            "report for query {} not ready after {} checks; poll it later with get_performance_report_data",
            query_id, attempts
        )))
    }

    /// First `max_lines` lines of the newest available report file.
    pub async fn download_report(
        &self,
        query_id: &str,
        max_lines: usize,
    ) -> Result<ReportDownload, ConnectorError> {
        let info = match self.report_status(query_id).await? {
            ReportStatus::Available(info) => info,
            other => return Ok(ReportDownload::Pending(other)),
        };
        let path = info.gcs_path.clone().ok_or_else(|| {
            ConnectorError::Other(format!(
                "report {} has no Cloud Storage location",
                info.report_id
            ))
        })?;
        let body = self.transport.fetch_text(&path).await?;
        let total_lines = body.lines().count();
        let lines = body.lines().take(max_lines).map(|l| l.to_string()).collect();
        Ok(ReportDownload::Ready(ReportPreview {
            report: info,
            lines,
            total_lines,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_body_shape() {
        let body = summary_query("11", "22", "LAST_7_DAYS").to_body();
        assert_eq!(body["metadata"]["title"], "Performance Summary - 22");
        assert_eq!(body["metadata"]["dataRange"]["range"], "LAST_7_DAYS");
        assert_eq!(body["metadata"]["format"], "CSV");
        assert_eq!(body["params"]["type"], "STANDARD");
        assert_eq!(body["schedule"]["frequency"], "ONE_TIME");
        assert_eq!(body["params"]["filters"][0]["type"], FILTER_ADVERTISER);
        assert_eq!(body["params"]["filters"][1]["value"], "22");
        assert_eq!(body["params"]["metrics"].as_array().unwrap().len(), 6);
        assert_eq!(body["params"]["metrics"][0], "METRIC_IMPRESSIONS");
    }

    #[test]
    fn date_ranges_are_validated() {
        assert_eq!(normalize_date_range("last_7_days").unwrap(), "LAST_7_DAYS");
        assert!(normalize_date_range("LAST_3_DAYS").is_err());
        assert_eq!(DATE_RANGES.len(), 12);
        assert_eq!(AVAILABLE_METRICS.len(), 10);
    }

    #[test]
    fn newest_report_wins() {
        let reports = vec![
            json!({"key": {"reportId": "9"}}),
            json!({"key": {"reportId": "120"}}),
            json!({"key": {"reportId": "15"}}),
        ];
        assert_eq!(newest_report(&reports).unwrap()["key"]["reportId"], "120");
        assert!(newest_report(&[]).is_none());
    }

    #[test]
    fn reports_without_status_are_not_done() {
        let info = ReportInfo::from_report("q9", &json!({"key": {"reportId": "4"}}));
        assert_eq!(info.state, UNKNOWN_STATE);
        assert!(info.failure().to_string().contains("Report 4 for query q9 failed"));
    }

    #[test]
    fn line_item_query_filters_optional_line_item() {
        let all = line_item_query("5", None, "LAST_30_DAYS");
        assert_eq!(all.filters.len(), 1);
        let one = line_item_query("5", Some("77"), "LAST_30_DAYS");
        assert_eq!(one.filters[1].kind, FILTER_LINE_ITEM);
        assert_eq!(one.group_bys, vec![FILTER_LINE_ITEM, FILTER_CREATIVE]);
    }
}
