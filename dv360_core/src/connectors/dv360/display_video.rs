use chrono::{Datelike, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ConnectorError;
use crate::remote::{list_all, segment, ApiRequest, ApiTransport};
use crate::service::ApiService;

const SERVICE: ApiService = ApiService::DisplayVideo;
const PAGE_SIZE: &str = "100";
const RECENT_CAMPAIGNS: usize = 5;
pub const ACTIVE_STATUS: &str = "ENTITY_STATUS_ACTIVE";
pub const PAUSED_STATUS: &str = "ENTITY_STATUS_PAUSED";

/// Keep only campaigns whose `entityStatus` is active, preserving order.
pub fn filter_active(campaigns: Vec<Value>) -> Vec<Value> {
    campaigns
        .into_iter()
        .filter(|c| c.get("entityStatus").and_then(|s| s.as_str()) == Some(ACTIVE_STATUS))
        .collect()
}

/// Case-insensitive substring match on `displayName`, preserving order.
pub fn search_by_name(campaigns: Vec<Value>, term: &str) -> Vec<Value> {
    let needle = term.to_lowercase();
    campaigns
        .into_iter()
        .filter(|c| {
            c.get("displayName")
                .and_then(|n| n.as_str())
                .map(|n| n.to_lowercase().contains(&needle))
                .unwrap_or(false)
        })
        .collect()
}

/// Split `advertisers/{a}/lineItems/{l}` into its two ids.
pub fn parse_line_item_name(name: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = name.trim_matches('/').split('/').collect();
    match parts.as_slice() {
        ["advertisers", advertiser, "lineItems", line_item]
            if !advertiser.is_empty() && !line_item.is_empty() =>
        {
            Some((advertiser.to_string(), line_item.to_string()))
        }
        _ => None,
    }
}

/// `brand_awareness` and `CAMPAIGN_GOAL_TYPE_BRAND_AWARENESS` name the same goal.
pub fn normalize_goal_type(goal: &str) -> String {
    let upper = goal.trim().to_uppercase().replace([' ', '-'], "_");
    if upper.starts_with("CAMPAIGN_GOAL_TYPE_") {
        upper
    } else {
        format!("CAMPAIGN_GOAL_TYPE_{}", upper)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SummaryCounts {
    pub total_campaigns: usize,
    pub active_campaigns: usize,
    pub insertion_orders: usize,
    pub line_items: usize,
    pub creatives: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvertiserSummary {
    pub advertiser: Value,
    pub summary: SummaryCounts,
    pub recent_campaigns: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineItemTargeting {
    pub line_item: Value,
    pub targeting_expansion: Value,
    pub assigned_options: Vec<Value>,
}

/// Display & Video 360 calls. Records stay opaque JSON.
#[derive(Clone)]
pub struct DisplayVideoClient {
    transport: Arc<dyn ApiTransport>,
    default_partner: Option<String>,
}

impl DisplayVideoClient {
    pub fn new(transport: Arc<dyn ApiTransport>, default_partner: Option<String>) -> Self {
        Self {
            transport,
            default_partner,
        }
    }

    async fn list(&self, request: ApiRequest, key: &str) -> Result<Vec<Value>, ConnectorError> {
        list_all(
            self.transport.as_ref(),
            SERVICE,
            request.with_query("pageSize", PAGE_SIZE),
            key,
        )
        .await
    }

    async fn get(&self, path: String) -> Result<Value, ConnectorError> {
        self.transport.execute(SERVICE, ApiRequest::get(path)).await
    }

    pub async fn list_partners(&self) -> Result<Vec<Value>, ConnectorError> {
        self.list(ApiRequest::get("partners"), "partners").await
    }

    /// Explicit id, then the configured partner, then the first accessible one.
    pub async fn resolve_partner(
        &self,
        partner_id: Option<&str>,
    ) -> Result<Option<String>, ConnectorError> {
        if let Some(id) = partner_id.or(self.default_partner.as_deref()) {
            return Ok(Some(id.to_string()));
        }
        let partners = self.list_partners().await?;
        let first = partners
            .first()
            .and_then(|p| p.get("partnerId"))
            .and_then(|id| id.as_str())
            .map(|id| id.to_string());
        debug!(partner = ?first, "Resolved default partner");
        Ok(first)
    }

    pub async fn list_advertisers(
        &self,
        partner_id: Option<&str>,
    ) -> Result<Vec<Value>, ConnectorError> {
        let Some(partner) = self.resolve_partner(partner_id).await? else {
            return Ok(Vec::new());
        };
        self.list(
            ApiRequest::get("advertisers").with_query("partnerId", partner),
            "advertisers",
        )
        .await
    }

    pub async fn get_advertiser(&self, advertiser_id: &str) -> Result<Value, ConnectorError> {
        self.get(format!("advertisers/{}", segment(advertiser_id)))
            .await
    }

    pub async fn list_campaigns(&self, advertiser_id: &str) -> Result<Vec<Value>, ConnectorError> {
        self.list(
            ApiRequest::get(format!("advertisers/{}/campaigns", segment(advertiser_id))),
            "campaigns",
        )
        .await
    }

    pub async fn list_active_campaigns(
        &self,
        advertiser_id: &str,
    ) -> Result<Vec<Value>, ConnectorError> {
        Ok(filter_active(self.list_campaigns(advertiser_id).await?))
    }

    pub async fn search_campaigns(
        &self,
        advertiser_id: &str,
        term: &str,
    ) -> Result<Vec<Value>, ConnectorError> {
        Ok(search_by_name(self.list_campaigns(advertiser_id).await?, term))
    }

    /// Campaigns of every advertiser under the resolved partner.
    pub async fn list_all_campaigns(&self) -> Result<Vec<Value>, ConnectorError> {
        let advertisers = self.list_advertisers(None).await?;
        let ids = advertiser_ids(&advertisers);
        let batches = try_join_all(ids.iter().map(|id| self.list_campaigns(id))).await?;
        Ok(batches.into_iter().flatten().collect())
    }

    pub async fn get_campaign(
        &self,
        advertiser_id: &str,
        campaign_id: &str,
    ) -> Result<Value, ConnectorError> {
        self.get(format!(
            "advertisers/{}/campaigns/{}",
            segment(advertiser_id),
            segment(campaign_id)
        ))
        .await
    }

    /// New campaigns start paused with no frequency cap, flighted from today.
    pub async fn create_campaign(
        &self,
        advertiser_id: &str,
        display_name: &str,
        goal: &str,
    ) -> Result<Value, ConnectorError> {
        let today = Utc::now().date_naive();
        let body = json!({
            "displayName": display_name,
            "entityStatus": PAUSED_STATUS,
            "campaignGoal": {
                "campaignGoalType": normalize_goal_type(goal),
                "performanceGoal": {"performanceGoalType": "PERFORMANCE_GOAL_TYPE_NONE"}
            },
            "campaignFlight": {
                "plannedDates": {
                    "startDate": {"year": today.year(), "month": today.month(), "day": today.day()}
                }
            },
            "frequencyCap": {"unlimited": true}
        });
        let created = self
            .transport
            .execute(
                SERVICE,
                ApiRequest::post(
                    format!("advertisers/{}/campaigns", segment(advertiser_id)),
                    body,
                ),
            )
            .await?;
        info!(advertiser_id, display_name, "Created campaign");
        Ok(created)
    }

    pub async fn list_insertion_orders(
        &self,
        advertiser_id: &str,
        campaign_id: Option<&str>,
    ) -> Result<Vec<Value>, ConnectorError> {
        let mut request = ApiRequest::get(format!(
            "advertisers/{}/insertionOrders",
            segment(advertiser_id)
        ));
        if let Some(campaign) = campaign_id {
            request = request.with_query("filter", format!("campaignId=\"{}\"", campaign));
        }
        self.list(request, "insertionOrders").await
    }

    pub async fn get_insertion_order(
        &self,
        advertiser_id: &str,
        insertion_order_id: &str,
    ) -> Result<Value, ConnectorError> {
        self.get(format!(
            "advertisers/{}/insertionOrders/{}",
            segment(advertiser_id),
            segment(insertion_order_id)
        ))
        .await
    }

    pub async fn list_line_items(
        &self,
        advertiser_id: &str,
        insertion_order_id: Option<&str>,
    ) -> Result<Vec<Value>, ConnectorError> {
        let mut request =
            ApiRequest::get(format!("advertisers/{}/lineItems", segment(advertiser_id)));
        if let Some(io) = insertion_order_id {
            request = request.with_query("filter", format!("insertionOrderId=\"{}\"", io));
        }
        self.list(request, "lineItems").await
    }

    pub async fn list_all_line_items(&self) -> Result<Vec<Value>, ConnectorError> {
        let advertisers = self.list_advertisers(None).await?;
        let ids = advertiser_ids(&advertisers);
        let batches = try_join_all(ids.iter().map(|id| self.list_line_items(id, None))).await?;
        Ok(batches.into_iter().flatten().collect())
    }

    pub async fn get_line_item(
        &self,
        advertiser_id: &str,
        line_item_id: &str,
    ) -> Result<Value, ConnectorError> {
        self.get(line_item_path(advertiser_id, line_item_id)).await
    }

    pub async fn line_item_targeting(
        &self,
        advertiser_id: &str,
        line_item_id: &str,
    ) -> Result<LineItemTargeting, ConnectorError> {
        let assigned_request = ApiRequest::get(format!(
            "{}:bulkListAssignedTargetingOptions",
            line_item_path(advertiser_id, line_item_id)
        ));
        let (line_item, assigned) = tokio::try_join!(
            self.get_line_item(advertiser_id, line_item_id),
            self.list(assigned_request, "lineItemAssignedTargetingOptions"),
        )?;
        let assigned_options = assigned
            .into_iter()
            .map(|entry| entry.get("assignedTargetingOption").cloned().unwrap_or(entry))
            .collect();
        Ok(LineItemTargeting {
            targeting_expansion: line_item
                .get("targetingExpansion")
                .cloned()
                .unwrap_or_else(|| json!({})),
            line_item,
            assigned_options,
        })
    }

    pub async fn pause_line_item(
        &self,
        advertiser_id: &str,
        line_item_id: &str,
    ) -> Result<Value, ConnectorError> {
        let request = ApiRequest::patch(
            line_item_path(advertiser_id, line_item_id),
            json!({"entityStatus": PAUSED_STATUS}),
        )
        .with_query("updateMask", "entityStatus");
        let updated = self.transport.execute(SERVICE, request).await?;
        info!(advertiser_id, line_item_id, "Paused line item");
        Ok(updated)
    }

    pub async fn list_creatives(&self, advertiser_id: &str) -> Result<Vec<Value>, ConnectorError> {
        self.list(
            ApiRequest::get(format!("advertisers/{}/creatives", segment(advertiser_id))),
            "creatives",
        )
        .await
    }

    pub async fn get_creative(
        &self,
        advertiser_id: &str,
        creative_id: &str,
    ) -> Result<Value, ConnectorError> {
        self.get(format!(
            "advertisers/{}/creatives/{}",
            segment(advertiser_id),
            segment(creative_id)
        ))
        .await
    }

    /// Audiences owned by an advertiser, or by the resolved partner when none is given.
    pub async fn list_audiences(
        &self,
        advertiser_id: Option<&str>,
    ) -> Result<Vec<Value>, ConnectorError> {
        let request = ApiRequest::get("firstAndThirdPartyAudiences");
        let request = match advertiser_id {
            Some(advertiser) => request.with_query("advertiserId", advertiser),
            None => match self.resolve_partner(None).await? {
                Some(partner) => request.with_query("partnerId", partner),
                None => return Ok(Vec::new()),
            },
        };
        self.list(request, "firstAndThirdPartyAudiences").await
    }

    pub async fn get_audience(
        &self,
        advertiser_id: &str,
        audience_id: &str,
    ) -> Result<Value, ConnectorError> {
        self.transport
            .execute(
                SERVICE,
                ApiRequest::get(format!("firstAndThirdPartyAudiences/{}", segment(audience_id)))
                    .with_query("advertiserId", advertiser_id),
            )
            .await
    }

    pub async fn create_audience_list(
        &self,
        advertiser_id: &str,
        display_name: &str,
        audience_type: &str,
    ) -> Result<Value, ConnectorError> {
        let body = json!({
            "displayName": display_name,
            "audienceType": audience_type.trim().to_uppercase(),
            "firstAndThirdPartyAudienceType": "FIRST_AND_THIRD_PARTY_AUDIENCE_TYPE_FIRST_PARTY",
            "description": format!("Audience list created via MCP server: {}", display_name),
        });
        let created = self
            .transport
            .execute(
                SERVICE,
                ApiRequest::post("firstAndThirdPartyAudiences", body)
                    .with_query("advertiserId", advertiser_id),
            )
            .await?;
        info!(advertiser_id, display_name, "Created audience list");
        Ok(created)
    }

    /// Advertiser record plus entity counts, fetched concurrently.
    ///
    /// Any failing call aborts the whole summary.
    pub async fn advertiser_summary(
        &self,
        advertiser_id: &str,
    ) -> Result<AdvertiserSummary, ConnectorError> {
        let (advertiser, campaigns, insertion_orders, line_items, creatives) = tokio::try_join!(
            self.get_advertiser(advertiser_id),
            self.list_campaigns(advertiser_id),
            self.list_insertion_orders(advertiser_id, None),
            self.list_line_items(advertiser_id, None),
            self.list_creatives(advertiser_id),
        )?;

        let total_campaigns = campaigns.len();
        let recent_campaigns: Vec<Value> =
            campaigns.iter().take(RECENT_CAMPAIGNS).cloned().collect();
        let active_campaigns = filter_active(campaigns).len();

        Ok(AdvertiserSummary {
            advertiser,
            summary: SummaryCounts {
                total_campaigns,
                active_campaigns,
                insertion_orders: insertion_orders.len(),
                line_items: line_items.len(),
                creatives: creatives.len(),
            },
            recent_campaigns,
        })
    }
}

fn line_item_path(advertiser_id: &str, line_item_id: &str) -> String {
    format!(
        "advertisers/{}/lineItems/{}",
        segment(advertiser_id),
        segment(line_item_id)
    )
}

fn advertiser_ids(advertisers: &[Value]) -> Vec<String> {
    advertisers
        .iter()
        .filter_map(|a| a.get("advertiserId").and_then(|id| id.as_str()))
        .map(|id| id.to_string())
        .collect()
}
