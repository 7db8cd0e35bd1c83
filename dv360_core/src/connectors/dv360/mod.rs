pub mod bid_manager;
pub mod catalog;
pub mod display_video;
pub mod format;
pub mod resources;

use async_trait::async_trait;
use rmcp::model::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, PollPolicy};
use crate::error::ConnectorError;
use crate::remote::{ApiTransport, HttpTransport};
use crate::utils::{error_result, pretty_json, text_result};
use crate::Connector;

use self::bid_manager::{
    advertiser_query, campaign_breakdown_query, campaign_query, line_item_query,
    normalize_date_range, summary_query, BidManagerClient, QuerySpec, ReportDownload, ReportStatus,
    AVAILABLE_METRICS, DATE_RANGES, DEFAULT_PAGE_SIZE, FILTER_ADVERTISER, FILTER_CAMPAIGN,
    FILTER_LINE_ITEM,
};
use self::catalog::{Operation, ToolArgs, ToolSpec};
use self::display_video::{parse_line_item_name, DisplayVideoClient};
use self::resources::ResourceKind;

const DEFAULT_PREVIEW_LINES: u64 = 50;

/// Display & Video 360 and Bid Manager exposed as MCP tools and resources.
pub struct Dv360Connector {
    config: Arc<Config>,
    display_video: DisplayVideoClient,
    bid_manager: BidManagerClient,
}

impl Dv360Connector {
    pub fn new(config: Arc<Config>, transport: Arc<dyn ApiTransport>) -> Self {
        Self {
            display_video: DisplayVideoClient::new(
                Arc::clone(&transport),
                config.partner_id.clone(),
            ),
            bid_manager: BidManagerClient::new(transport),
            config,
        }
    }

    /// Connector backed by the live Google APIs.
    pub fn with_http(config: Arc<Config>) -> Result<Self, ConnectorError> {
        let transport: Arc<dyn ApiTransport> = Arc::new(HttpTransport::new(Arc::clone(&config))?);
        Ok(Self::new(config, transport))
    }

    fn date_range(args: &ToolArgs) -> Result<String, ConnectorError> {
        normalize_date_range(
            args.text_or_default("date_range")
                .as_deref()
                .unwrap_or(bid_manager::DEFAULT_DATE_RANGE),
        )
    }

    fn poll_policy(&self, args: &ToolArgs) -> Result<PollPolicy, ConnectorError> {
        let mut policy = self.config.report_poll;
        if let Some(attempts) = args.integer("max_attempts")? {
            policy.max_attempts = attempts.clamp(1, 50) as u32;
        }
        Ok(policy)
    }

    /// Create, run and wait for a query, rendering both steps.
    async fn report_now(
        &self,
        spec: QuerySpec,
        what: &str,
        args: &ToolArgs,
    ) -> Result<String, ConnectorError> {
        let created = self.bid_manager.create_and_run(&spec).await?;
        let report = self
            .bid_manager
            .wait_for_report(&created.query_id, self.poll_policy(args)?)
            .await?;
        Ok(format!(
            "{}\n\n{}",
            format::created_query(&created, what),
            format::report_available(&report, "Report ready")
        ))
    }

    async fn run(&self, spec: &ToolSpec, args: &ToolArgs) -> Result<String, ConnectorError> {
        let dv = &self.display_video;
        let bm = &self.bid_manager;
        match spec.operation {
            Operation::ListAdvertisers => {
                let partner = args.text("partner_id");
                Ok(format::advertisers(&dv.list_advertisers(partner.as_deref()).await?))
            }
            Operation::AdvertiserSummary => {
                let advertiser = args.required("advertiser_id")?;
                Ok(format::advertiser_summary(&dv.advertiser_summary(&advertiser).await?))
            }
            Operation::ListCampaigns => {
                let advertiser = args.required("advertiser_id")?;
                Ok(format::campaigns(&advertiser, &dv.list_campaigns(&advertiser).await?))
            }
            Operation::ListActiveCampaigns => {
                let advertiser = args.required("advertiser_id")?;
                let active = dv.list_active_campaigns(&advertiser).await?;
                Ok(format::active_campaigns(&advertiser, &active))
            }
            Operation::SearchCampaigns => {
                let advertiser = args.required("advertiser_id")?;
                let term = args.required("search_term")?;
                let hits = dv.search_campaigns(&advertiser, &term).await?;
                Ok(format::campaign_search(&term, &hits))
            }
            Operation::CampaignDetails => {
                let campaign = dv
                    .get_campaign(&args.required("advertiser_id")?, &args.required("campaign_id")?)
                    .await?;
                Ok(format::campaign_detail(&campaign))
            }
            Operation::CreateCampaign => {
                let goal = args
                    .text_or_default("campaign_goal")
                    .unwrap_or_else(|| "brand_awareness".to_string());
                let created = dv
                    .create_campaign(
                        &args.required("advertiser_id")?,
                        &args.required("campaign_name")?,
                        &goal,
                    )
                    .await?;
                Ok(format::created_campaign(&created))
            }
            Operation::ListInsertionOrders => {
                let advertiser = args.required("advertiser_id")?;
                let campaign = args.text("campaign_id");
                let orders = dv
                    .list_insertion_orders(&advertiser, campaign.as_deref())
                    .await?;
                Ok(format::insertion_orders(&advertiser, &orders))
            }
            Operation::InsertionOrderDetails => {
                let order = dv
                    .get_insertion_order(
                        &args.required("advertiser_id")?,
                        &args.required("insertion_order_id")?,
                    )
                    .await?;
                Ok(format::insertion_order_detail(&order))
            }
            Operation::ListLineItems => {
                let advertiser = args.required("advertiser_id")?;
                let order = args.text("insertion_order_id");
                let items = dv.list_line_items(&advertiser, order.as_deref()).await?;
                Ok(format::line_items(&advertiser, &items))
            }
            Operation::LineItemDetails => {
                let item = dv
                    .get_line_item(&args.required("advertiser_id")?, &args.required("line_item_id")?)
                    .await?;
                Ok(format::line_item_detail(&item))
            }
            Operation::TargetingOptions => {
                let targeting = dv
                    .line_item_targeting(
                        &args.required("advertiser_id")?,
                        &args.required("line_item_id")?,
                    )
                    .await?;
                Ok(format::targeting(&targeting))
            }
            Operation::PauseLineItem => {
                let raw = args.required("line_item_id")?;
                let (advertiser, line_item) = match parse_line_item_name(&raw) {
                    Some(ids) => ids,
                    None => {
                        let advertiser = args.text("advertiser_id").ok_or_else(|| {
                            ConnectorError::InvalidParams(
                                "Missing required argument(s): advertiser_id (or pass line_item_id as advertisers/{advertiser}/lineItems/{line item})"
                                    .to_string(),
                            )
                        })?;
                        (advertiser, raw)
                    }
                };
                let updated = dv.pause_line_item(&advertiser, &line_item).await?;
                Ok(format::paused_line_item(&updated, &advertiser, &line_item))
            }
            Operation::ListCreatives => {
                let advertiser = args.required("advertiser_id")?;
                Ok(format::creatives(&advertiser, &dv.list_creatives(&advertiser).await?))
            }
            Operation::CreativeDetails => {
                let creative = dv
                    .get_creative(&args.required("advertiser_id")?, &args.required("creative_id")?)
                    .await?;
                Ok(format::creative_detail(&creative))
            }
            Operation::ListAudiences => {
                let advertiser = args.text("advertiser_id");
                Ok(format::audiences(&dv.list_audiences(advertiser.as_deref()).await?))
            }
            Operation::AudienceDetails => {
                let audience = dv
                    .get_audience(&args.required("advertiser_id")?, &args.required("audience_id")?)
                    .await?;
                Ok(format::audience_detail(&audience))
            }
            Operation::CreateAudienceList => {
                let created = dv
                    .create_audience_list(
                        &args.required("advertiser_id")?,
                        &args.required("audience_name")?,
                        &args.required("audience_type")?,
                    )
                    .await?;
                Ok(format::created_audience(&created))
            }
            Operation::CampaignPerformance => {
                let date = Self::date_range(args)?;
                let created = bm
                    .create_and_run(&campaign_query(&args.required("campaign_id")?, &date))
                    .await?;
                Ok(format::created_query(&created, "Campaign performance"))
            }
            Operation::CampaignPerformanceSummary => {
                let advertiser = args.required("advertiser_id")?;
                let campaign_id = args.required("campaign_id")?;
                let date = Self::date_range(args)?;
                let campaign = dv.get_campaign(&advertiser, &campaign_id).await?;
                let created = bm
                    .create_and_run(&summary_query(&advertiser, &campaign_id, &date))
                    .await?;
                Ok(format!(
                    "{}\n\n{}",
                    format::campaign_detail(&campaign),
                    format::created_query(&created, "Performance summary")
                ))
            }
            Operation::CustomPerformanceReport => {
                let advertiser = args.required("advertiser_id")?;
                let title = args
                    .text("title")
                    .unwrap_or_else(|| format!("Custom Performance Report - {}", advertiser));
                let mut query = QuerySpec::new(title)
                    .date_range(Self::date_range(args)?)
                    .filter(FILTER_ADVERTISER, advertiser.as_str());
                if let Some(campaign) = args.text("campaign_id") {
                    query = query.filter(FILTER_CAMPAIGN, campaign);
                }
                if let Some(metrics) = args.list("metrics") {
                    query = query.metrics(metrics);
                }
                let dimensions = args
                    .list("group_bys")
                    .unwrap_or_else(|| vec![FILTER_CAMPAIGN.to_string(), FILTER_LINE_ITEM.to_string()]);
                for dimension in &dimensions {
                    query = query.group_by(&dimension.to_uppercase());
                }
                let created = bm.create_and_run(&query).await?;
                Ok(format::created_query(&created, "Custom performance"))
            }
            Operation::ReportStatus => {
                Ok(format::query_detail(&bm.get_query(&args.required("query_id")?).await?))
            }
            Operation::ReportData => match bm.report_status(&args.required("query_id")?).await? {
                ReportStatus::Failed(info) => Err(info.failure()),
                status => Ok(format::report_status(&status)),
            },
            Operation::WaitForReport => {
                let query_id = args.required("query_id")?;
                let report = bm.wait_for_report(&query_id, self.poll_policy(args)?).await?;
                Ok(format::report_available(&report, "Report available"))
            }
            Operation::DownloadReport => {
                let max_lines = args.integer("max_lines")?.unwrap_or(DEFAULT_PREVIEW_LINES);
                match bm
                    .download_report(&args.required("query_id")?, max_lines as usize)
                    .await?
                {
                    ReportDownload::Ready(preview) => Ok(format::report_preview(&preview)),
                    ReportDownload::Pending(ReportStatus::Failed(info)) => Err(info.failure()),
                    ReportDownload::Pending(status) => Ok(format::report_status(&status)),
                }
            }
            Operation::ListQueries => {
                let page_size = args
                    .integer("page_size")?
                    .map(|n| n.min(100) as u32)
                    .unwrap_or(DEFAULT_PAGE_SIZE);
                Ok(format::queries(&bm.list_queries(page_size).await?, "Report queries"))
            }
            Operation::ListSavedReports => {
                let advertiser = args.text("advertiser_id");
                let saved = bm.list_saved_reports(advertiser.as_deref()).await?;
                let heading = match &advertiser {
                    Some(id) => format!("Saved reports for advertiser {}", id),
                    None => "Saved reports".to_string(),
                };
                Ok(format::queries(&saved, &heading))
            }
            Operation::CampaignPerformanceNow => {
                let spec = campaign_breakdown_query(
                    &args.required("advertiser_id")?,
                    &args.required("campaign_id")?,
                    &Self::date_range(args)?,
                );
                self.report_now(spec, "Campaign performance", args).await
            }
            Operation::AdvertiserPerformanceNow => {
                let spec =
                    advertiser_query(&args.required("advertiser_id")?, &Self::date_range(args)?);
                self.report_now(spec, "Advertiser performance", args).await
            }
            Operation::LineItemPerformanceNow => {
                let line_item = args.text("line_item_id");
                let spec = line_item_query(
                    &args.required("advertiser_id")?,
                    line_item.as_deref(),
                    &Self::date_range(args)?,
                );
                self.report_now(spec, "Line item performance", args).await
            }
            Operation::AvailableMetrics => {
                Ok(format::catalog("Available performance metrics", AVAILABLE_METRICS))
            }
            Operation::AvailableDateRanges => {
                Ok(format::catalog("Available date ranges", DATE_RANGES))
            }
        }
    }

    async fn read(&self, kind: ResourceKind) -> Result<Value, ConnectorError> {
        let items = match kind {
            ResourceKind::Advertisers => self.display_video.list_advertisers(None).await?,
            ResourceKind::Campaigns => self.display_video.list_all_campaigns().await?,
            ResourceKind::LineItems => self.display_video.list_all_line_items().await?,
            ResourceKind::Audiences => self.display_video.list_audiences(None).await?,
            ResourceKind::Reports => self.bid_manager.list_saved_reports(None).await?,
        };
        Ok(Value::Array(items))
    }
}

#[async_trait]
impl Connector for Dv360Connector {
    fn name(&self) -> &'static str {
        "dv360"
    }

    fn description(&self) -> &'static str {
        "Display & Video 360 campaign management and Bid Manager reporting."
    }

    async fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(Default::default()),
            resources: Some(Default::default()),
            ..Default::default()
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
    ) -> Result<InitializeResult, ConnectorError> {
        Ok(InitializeResult {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: self.capabilities().await,
            server_info: Implementation {
                name: "dv360-mcp".to_string(),
                title: Some("DV360 MCP Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Tools for Display & Video 360 advertisers, campaigns, insertion orders, line items, creatives and audiences, plus Bid Manager performance reports. Reports are asynchronous: create a query, then check it with get_performance_report_data."
                    .to_string(),
            ),
        })
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, ConnectorError> {
        Ok(ListResourcesResult {
            resources: resources::resources(self.config.tool_profile),
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
    ) -> Result<ReadResourceResult, ConnectorError> {
        let spec = resources::find(self.config.tool_profile, &request.uri)
            .ok_or(ConnectorError::ResourceNotFound)?;
        let body = match self.read(spec.kind).await {
            Ok(items) => items,
            Err(e) => {
                warn!(uri = %request.uri, error = %e, "Resource read failed");
                json!({"error": e.to_string()})
            }
        };
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(pretty_json(&body)?, request.uri)],
        })
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        Ok(ListToolsResult {
            tools: catalog::tools(self.config.tool_profile),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        let name = request.name.as_ref();
        let Some(spec) = catalog::find_in(self.config.tool_profile, name) else {
            warn!(tool = name, "Unknown tool requested");
            return Ok(error_result(format::unknown_tool(name)));
        };
        debug!(tool = name, "Calling tool");
        let outcome = match ToolArgs::parse(spec, request.arguments.clone().unwrap_or_default()) {
            Ok(args) => self.run(spec, &args).await,
            Err(e) => Err(e),
        };
        Ok(match outcome {
            Ok(text) => {
                info!(tool = name, "Tool call succeeded");
                text_result(text)
            }
            Err(e) => {
                warn!(tool = name, code = e.code_str(), error = %e, "Tool call failed");
                error_result(format::error(e))
            }
        })
    }
}
