use once_cell::sync::Lazy;
use rmcp::model::{JsonObject, Tool};
use serde_json::{json, Value};
use std::borrow::Cow;
use std::sync::Arc;

use crate::config::ToolProfile;
use crate::error::ConnectorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    StringList,
}

impl ParamKind {
    fn schema(&self) -> Value {
        match self {
            ParamKind::String => json!({"type": "string"}),
            ParamKind::Integer => json!({"type": "integer", "minimum": 1}),
            ParamKind::StringList => json!({"type": "array", "items": {"type": "string"}}),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub required: bool,
    pub default: Option<&'static str>,
}

const fn required(name: &'static str, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind: ParamKind::String,
        description,
        required: true,
        default: None,
    }
}

const fn optional(name: &'static str, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind: ParamKind::String,
        description,
        required: false,
        default: None,
    }
}

const fn defaulted(
    name: &'static str,
    kind: ParamKind,
    description: &'static str,
    default: &'static str,
) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        description,
        required: false,
        default: Some(default),
    }
}

const fn list(name: &'static str, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind: ParamKind::StringList,
        description,
        required: false,
        default: None,
    }
}

const ADVERTISER: ParamSpec = required("advertiser_id", "DV360 advertiser ID");
const ADVERTISER_OPT: ParamSpec = optional(
    "advertiser_id",
    "DV360 advertiser ID (omit to use the partner)",
);
const CAMPAIGN: ParamSpec = required("campaign_id", "DV360 campaign ID");
const QUERY: ParamSpec = required("query_id", "Bid Manager query ID");
const DATE_RANGE: ParamSpec = defaulted(
    "date_range",
    ParamKind::String,
    "Report date range, e.g. LAST_7_DAYS or MONTH_TO_DATE",
    "LAST_30_DAYS",
);

/// What a tool does once its arguments are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListAdvertisers,
    AdvertiserSummary,
    ListCampaigns,
    ListActiveCampaigns,
    SearchCampaigns,
    CampaignDetails,
    CreateCampaign,
    ListInsertionOrders,
    InsertionOrderDetails,
    ListLineItems,
    LineItemDetails,
    TargetingOptions,
    PauseLineItem,
    ListCreatives,
    CreativeDetails,
    ListAudiences,
    AudienceDetails,
    CreateAudienceList,
    CampaignPerformance,
    CampaignPerformanceSummary,
    CustomPerformanceReport,
    ReportStatus,
    ReportData,
    WaitForReport,
    DownloadReport,
    ListQueries,
    ListSavedReports,
    CampaignPerformanceNow,
    AdvertiserPerformanceNow,
    LineItemPerformanceNow,
    AvailableMetrics,
    AvailableDateRanges,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub operation: Operation,
    /// Exposed in the minimal deployment profile.
    pub minimal: bool,
}

impl ToolSpec {
    pub fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn input_schema(&self) -> JsonObject {
        let mut properties = JsonObject::new();
        for p in self.params {
            let mut schema = p.kind.schema();
            if let Some(obj) = schema.as_object_mut() {
                obj.insert("description".into(), json!(p.description));
                if let Some(default) = p.default {
                    let value = match p.kind {
                        ParamKind::Integer => default
                            .parse::<u64>()
                            .map(Value::from)
                            .unwrap_or_else(|_| json!(default)),
                        _ => json!(default),
                    };
                    obj.insert("default".into(), value);
                }
            }
            properties.insert(p.name.to_string(), schema);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();
        let mut root = JsonObject::new();
        root.insert("type".into(), json!("object"));
        root.insert("properties".into(), Value::Object(properties));
        root.insert("required".into(), json!(required));
        root
    }

    pub fn to_tool(&self) -> Tool {
        Tool {
            name: Cow::Borrowed(self.name),
            title: None,
            description: Some(Cow::Borrowed(self.description)),
            input_schema: Arc::new(self.input_schema()),
            output_schema: None,
            annotations: None,
            icons: None,
        }
    }
}

pub static TOOL_SPECS: &[ToolSpec] = &[
    ToolSpec {
        name: "list_advertisers",
        description: "List DV360 advertisers for a partner (defaults to the configured or first accessible partner).",
        params: &[optional("partner_id", "DV360 partner ID")],
        operation: Operation::ListAdvertisers,
        minimal: true,
    },
    ToolSpec {
        name: "get_advertiser_summary",
        description: "Advertiser details with campaign, insertion order, line item and creative counts.",
        params: &[ADVERTISER],
        operation: Operation::AdvertiserSummary,
        minimal: false,
    },
    ToolSpec {
        name: "list_campaigns",
        description: "List all campaigns of an advertiser.",
        params: &[ADVERTISER],
        operation: Operation::ListCampaigns,
        minimal: false,
    },
    ToolSpec {
        name: "list_active_campaigns",
        description: "List only the active campaigns of an advertiser.",
        params: &[ADVERTISER],
        operation: Operation::ListActiveCampaigns,
        minimal: false,
    },
    ToolSpec {
        name: "search_campaigns",
        description: "Find campaigns whose name contains a search term (case-insensitive).",
        params: &[ADVERTISER, required("search_term", "Text to look for in campaign names")],
        operation: Operation::SearchCampaigns,
        minimal: false,
    },
    ToolSpec {
        name: "get_campaign_details",
        description: "Show one campaign's goal, flight and status.",
        params: &[ADVERTISER, CAMPAIGN],
        operation: Operation::CampaignDetails,
        minimal: false,
    },
    ToolSpec {
        name: "create_campaign",
        description: "Create a paused campaign for an advertiser.",
        params: &[
            ADVERTISER,
            required("campaign_name", "Display name of the new campaign"),
            defaulted(
                "campaign_goal",
                ParamKind::String,
                "Goal type, e.g. brand_awareness, online_action, offline_action, app_install",
                "brand_awareness",
            ),
        ],
        operation: Operation::CreateCampaign,
        minimal: false,
    },
    ToolSpec {
        name: "list_insertion_orders",
        description: "List insertion orders of an advertiser, optionally for one campaign.",
        params: &[ADVERTISER, optional("campaign_id", "Only insertion orders of this campaign")],
        operation: Operation::ListInsertionOrders,
        minimal: false,
    },
    ToolSpec {
        name: "get_insertion_order_details",
        description: "Show one insertion order's budget, pacing and KPI.",
        params: &[ADVERTISER, required("insertion_order_id", "DV360 insertion order ID")],
        operation: Operation::InsertionOrderDetails,
        minimal: false,
    },
    ToolSpec {
        name: "list_line_items",
        description: "List line items of an advertiser, optionally for one insertion order.",
        params: &[
            ADVERTISER,
            optional("insertion_order_id", "Only line items of this insertion order"),
        ],
        operation: Operation::ListLineItems,
        minimal: false,
    },
    ToolSpec {
        name: "get_line_item_details",
        description: "Show one line item's type, flight, bid and budget.",
        params: &[ADVERTISER, required("line_item_id", "DV360 line item ID")],
        operation: Operation::LineItemDetails,
        minimal: false,
    },
    ToolSpec {
        name: "get_targeting_options",
        description: "Show a line item's targeting expansion and assigned targeting options.",
        params: &[ADVERTISER, required("line_item_id", "DV360 line item ID")],
        operation: Operation::TargetingOptions,
        minimal: false,
    },
    ToolSpec {
        name: "pause_line_item",
        description: "Pause a line item. Accepts advertisers/{advertiser}/lineItems/{line item} or a bare ID with advertiser_id.",
        params: &[
            required("line_item_id", "Line item resource name or ID"),
            optional("advertiser_id", "Needed when line_item_id is a bare ID"),
        ],
        operation: Operation::PauseLineItem,
        minimal: false,
    },
    ToolSpec {
        name: "list_creatives",
        description: "List creatives of an advertiser.",
        params: &[ADVERTISER],
        operation: Operation::ListCreatives,
        minimal: false,
    },
    ToolSpec {
        name: "get_creative_details",
        description: "Show one creative's type, size and review status.",
        params: &[ADVERTISER, required("creative_id", "DV360 creative ID")],
        operation: Operation::CreativeDetails,
        minimal: false,
    },
    ToolSpec {
        name: "list_audiences",
        description: "List first- and third-party audiences for an advertiser or the partner.",
        params: &[ADVERTISER_OPT],
        operation: Operation::ListAudiences,
        minimal: false,
    },
    ToolSpec {
        name: "get_audience_details",
        description: "Show one first- or third-party audience.",
        params: &[ADVERTISER, required("audience_id", "First and third party audience ID")],
        operation: Operation::AudienceDetails,
        minimal: false,
    },
    ToolSpec {
        name: "create_audience_list",
        description: "Create a first-party audience list for an advertiser.",
        params: &[
            ADVERTISER,
            required("audience_name", "Display name of the audience list"),
            required(
                "audience_type",
                "Audience type, e.g. CUSTOMER_MATCH_CONTACT_INFO or CUSTOMER_MATCH_DEVICE_ID",
            ),
        ],
        operation: Operation::CreateAudienceList,
        minimal: false,
    },
    ToolSpec {
        name: "get_campaign_performance",
        description: "Create a campaign performance report query and return its query ID.",
        params: &[CAMPAIGN, DATE_RANGE],
        operation: Operation::CampaignPerformance,
        minimal: false,
    },
    ToolSpec {
        name: "get_campaign_performance_summary",
        description: "Look up a campaign and create a summary report query for it.",
        params: &[ADVERTISER, CAMPAIGN, DATE_RANGE],
        operation: Operation::CampaignPerformanceSummary,
        minimal: false,
    },
    ToolSpec {
        name: "create_custom_performance_report",
        description: "Create a report query with caller-chosen metrics and dimensions.",
        params: &[
            ADVERTISER,
            optional("campaign_id", "Restrict the report to one campaign"),
            DATE_RANGE,
            list("metrics", "Metric codes (see get_available_performance_metrics)"),
            list("group_bys", "Dimension codes such as FILTER_MEDIA_PLAN or FILTER_LINE_ITEM"),
            optional("title", "Report title"),
        ],
        operation: Operation::CustomPerformanceReport,
        minimal: false,
    },
    ToolSpec {
        name: "get_report_status",
        description: "Show a report query's definition and schedule.",
        params: &[QUERY],
        operation: Operation::ReportStatus,
        minimal: false,
    },
    ToolSpec {
        name: "get_performance_report_data",
        description: "Check whether a report query has produced a report and where to download it.",
        params: &[QUERY],
        operation: Operation::ReportData,
        minimal: false,
    },
    ToolSpec {
        name: "wait_for_report",
        description: "Poll a report query with backoff until its report is available.",
        params: &[
            QUERY,
            ParamSpec {
                name: "max_attempts",
                kind: ParamKind::Integer,
                description: "Override the configured number of checks",
                required: false,
                default: None,
            },
        ],
        operation: Operation::WaitForReport,
        minimal: false,
    },
    ToolSpec {
        name: "download_report",
        description: "Fetch the first lines of a finished report's CSV file.",
        params: &[
            QUERY,
            defaulted("max_lines", ParamKind::Integer, "Lines to return", "50"),
        ],
        operation: Operation::DownloadReport,
        minimal: false,
    },
    ToolSpec {
        name: "list_performance_queries",
        description: "List saved Bid Manager report queries.",
        params: &[defaulted("page_size", ParamKind::Integer, "Queries per page", "100")],
        operation: Operation::ListQueries,
        minimal: false,
    },
    ToolSpec {
        name: "list_saved_reports",
        description: "List saved report queries, optionally only those filtered to an advertiser.",
        params: &[ADVERTISER_OPT],
        operation: Operation::ListSavedReports,
        minimal: false,
    },
    ToolSpec {
        name: "get_real_campaign_performance",
        description: "Run a campaign report broken down by line item and wait for it to finish.",
        params: &[ADVERTISER, CAMPAIGN, DATE_RANGE],
        operation: Operation::CampaignPerformanceNow,
        minimal: false,
    },
    ToolSpec {
        name: "get_real_advertiser_performance",
        description: "Run an advertiser report broken down by campaign and line item and wait for it to finish.",
        params: &[ADVERTISER, DATE_RANGE],
        operation: Operation::AdvertiserPerformanceNow,
        minimal: false,
    },
    ToolSpec {
        name: "get_real_line_item_performance",
        description: "Run a line item and creative report and wait for it to finish.",
        params: &[
            ADVERTISER,
            optional("line_item_id", "Restrict the report to one line item"),
            DATE_RANGE,
        ],
        operation: Operation::LineItemPerformanceNow,
        minimal: false,
    },
    ToolSpec {
        name: "get_available_performance_metrics",
        description: "List the metric codes accepted by report tools.",
        params: &[],
        operation: Operation::AvailableMetrics,
        minimal: false,
    },
    ToolSpec {
        name: "get_available_date_ranges",
        description: "List the date range codes accepted by report tools.",
        params: &[],
        operation: Operation::AvailableDateRanges,
        minimal: false,
    },
];

static TOOLS: Lazy<Vec<Tool>> = Lazy::new(|| TOOL_SPECS.iter().map(ToolSpec::to_tool).collect());

pub fn find(name: &str) -> Option<&'static ToolSpec> {
    TOOL_SPECS.iter().find(|t| t.name == name)
}

/// Lookup limited to what the profile exposes.
pub fn find_in(profile: ToolProfile, name: &str) -> Option<&'static ToolSpec> {
    find(name).filter(|spec| profile == ToolProfile::Full || spec.minimal)
}

pub fn tools(profile: ToolProfile) -> Vec<Tool> {
    TOOLS
        .iter()
        .zip(TOOL_SPECS)
        .filter(|(_, spec)| profile == ToolProfile::Full || spec.minimal)
        .map(|(tool, _)| tool.clone())
        .collect()
}

/// Validated view over a tool call's arguments.
pub struct ToolArgs {
    spec: &'static ToolSpec,
    map: JsonObject,
}

impl ToolArgs {
    pub fn parse(spec: &'static ToolSpec, map: JsonObject) -> Result<Self, ConnectorError> {
        let args = Self { spec, map };
        let missing: Vec<&str> = spec
            .params
            .iter()
            .filter(|p| p.required && args.text(p.name).is_none())
            .map(|p| p.name)
            .collect();
        if !missing.is_empty() {
            return Err(ConnectorError::InvalidParams(format!(
                "Missing required argument(s): {}",
                missing.join(", ")
            )));
        }
        Ok(args)
    }

    /// Strings and numbers both count; blank strings do not.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.map.get(name)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn required(&self, name: &str) -> Result<String, ConnectorError> {
        self.text(name).ok_or_else(|| {
            ConnectorError::InvalidParams(format!("Missing required argument(s): {}", name))
        })
    }

    /// Caller value, else the declared default.
    pub fn text_or_default(&self, name: &str) -> Option<String> {
        self.text(name).or_else(|| {
            self.spec
                .param(name)
                .and_then(|p| p.default)
                .map(|d| d.to_string())
        })
    }

    pub fn integer(&self, name: &str) -> Result<Option<u64>, ConnectorError> {
        match self.text_or_default(name) {
            None => Ok(None),
            Some(raw) => match raw.parse::<u64>() {
                Ok(n) if n > 0 => Ok(Some(n)),
                _ => Err(ConnectorError::InvalidParams(format!(
                    "{} must be a positive integer",
                    name
                ))),
            },
        }
    }

    /// JSON array of strings, or one comma-separated string.
    pub fn list(&self, name: &str) -> Option<Vec<String>> {
        let items: Vec<String> = match self.map.get(name)? {
            Value::Array(values) => values
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Value::String(s) => s
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            _ => Vec::new(),
        };
        (!items.is_empty()).then_some(items)
    }
}
