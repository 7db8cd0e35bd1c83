#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dv360_core::utils::result_text;
use dv360_core::{
    ApiRequest, ApiService, ApiTransport, CallToolRequestParam, CallToolResult, Config,
    Connector, ConnectorError, Dv360Connector, HttpMethod, PollPolicy, ToolProfile,
};

pub const ADVERTISER: &str = "111";
pub const PARTNER: &str = "900";
pub const ACTIVE: &str = "ENTITY_STATUS_ACTIVE";
pub const PAUSED: &str = "ENTITY_STATUS_PAUSED";

fn key(service: ApiService, method: HttpMethod, path: &str) -> String {
    format!("{} {:?} {}", service, method, path)
}

/// Canned API responses keyed by service, method and path.
///
/// Queued responses are served in order; the last one repeats.
#[derive(Default)]
pub struct StubTransport {
    responses: Mutex<HashMap<String, VecDeque<Value>>>,
    requests: Mutex<Vec<(ApiService, ApiRequest)>>,
    failure: Mutex<Option<(u16, String)>>,
    text: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, service: ApiService, method: HttpMethod, path: &str, response: Value) {
        self.responses
            .lock()
            .unwrap()
            .entry(key(service, method, path))
            .or_default()
            .push_back(response);
    }

    pub fn on_get(&self, service: ApiService, path: &str, response: Value) {
        self.on(service, HttpMethod::Get, path, response);
    }

    /// Every `execute` fails with this API status from now on.
    pub fn fail_with(&self, status: u16, message: &str) {
        *self.failure.lock().unwrap() = Some((status, message.to_string()));
    }

    /// Every `execute` sleeps this long before answering.
    pub fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn serve_text(&self, body: &str) {
        *self.text.lock().unwrap() = Some(body.to_string());
    }

    pub fn requests(&self) -> Vec<(ApiService, ApiRequest)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|(_, r)| r.path == path)
            .map(|(_, r)| r)
            .collect()
    }
}

#[async_trait]
impl ApiTransport for StubTransport {
    async fn execute(
        &self,
        service: ApiService,
        request: ApiRequest,
    ) -> Result<Value, ConnectorError> {
        self.requests
            .lock()
            .unwrap()
            .push((service, request.clone()));
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((status, message)) = self.failure.lock().unwrap().clone() {
            return Err(ConnectorError::Api { status, message });
        }
        let mut responses = self.responses.lock().unwrap();
        let Some(queue) = responses.get_mut(&key(service, request.method, &request.path)) else {
            return Ok(json!({}));
        };
        let response = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        Ok(response.unwrap_or_else(|| json!({})))
    }

    async fn fetch_text(&self, url: &str) -> Result<String, ConnectorError> {
        self.text
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ConnectorError::Api {
                status: 404,
                message: format!("no object at {}", url),
            })
    }
}

pub fn fast_poll(max_attempts: u32) -> PollPolicy {
    PollPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    }
}

pub fn test_config(profile: ToolProfile) -> Config {
    Config {
        partner_id: Some(PARTNER.to_string()),
        tool_profile: profile,
        report_poll: fast_poll(3),
        ..Config::default()
    }
}

pub fn connector(stub: &Arc<StubTransport>) -> Dv360Connector {
    connector_with(stub, test_config(ToolProfile::Full))
}

pub fn connector_with(stub: &Arc<StubTransport>, config: Config) -> Dv360Connector {
    let transport: Arc<dyn ApiTransport> = stub.clone();
    Dv360Connector::new(Arc::new(config), transport)
}

pub async fn call(connector: &Dv360Connector, tool: &str, arguments: Value) -> CallToolResult {
    let request: CallToolRequestParam =
        serde_json::from_value(json!({"name": tool, "arguments": arguments})).unwrap();
    connector.call_tool(request).await.unwrap()
}

pub async fn call_text(connector: &Dv360Connector, tool: &str, arguments: Value) -> String {
    result_text(&call(connector, tool, arguments).await)
}

pub fn campaign(id: &str, name: &str, status: &str) -> Value {
    json!({
        "campaignId": id,
        "displayName": name,
        "entityStatus": status,
        "advertiserId": ADVERTISER
    })
}

/// One advertiser with seven campaigns (three active), two insertion
/// orders, five line items and no creatives.
pub fn seed_account(stub: &StubTransport) {
    let dv = ApiService::DisplayVideo;
    let advertiser = json!({
        "advertiserId": ADVERTISER,
        "displayName": "Acme Outdoor",
        "entityStatus": ACTIVE
    });
    stub.on_get(dv, "partners", json!({"partners": [{"partnerId": PARTNER}]}));
    stub.on_get(dv, "advertisers", json!({"advertisers": [advertiser.clone()]}));
    stub.on_get(dv, "advertisers/111", advertiser);
    stub.on_get(
        dv,
        "advertisers/111/campaigns",
        json!({"campaigns": [
            campaign("1", "Spring Sale 2024", ACTIVE),
            campaign("2", "Summer Launch", PAUSED),
            campaign("3", "spring clearance", ACTIVE),
            campaign("4", "Autumn Always-On", "ENTITY_STATUS_ARCHIVED"),
            campaign("5", "Winter Boots", ACTIVE),
            campaign("6", "Holiday Gifts", PAUSED),
            campaign("7", "Evergreen Retargeting", "ENTITY_STATUS_DRAFT")
        ]}),
    );
    stub.on_get(dv, "advertisers/111/campaigns/1", campaign("1", "Spring Sale 2024", ACTIVE));
    stub.on_get(
        dv,
        "advertisers/111/insertionOrders",
        json!({"insertionOrders": [
            {"insertionOrderId": "41", "displayName": "IO One", "campaignId": "1", "entityStatus": ACTIVE},
            {"insertionOrderId": "42", "displayName": "IO Two", "campaignId": "3", "entityStatus": PAUSED}
        ]}),
    );
    stub.on_get(
        dv,
        "advertisers/111/insertionOrders/41",
        json!({"insertionOrderId": "41", "displayName": "IO One", "campaignId": "1"}),
    );
    let line_items: Vec<Value> = (1..=5)
        .map(|i| {
            json!({
                "lineItemId": format!("5{}", i),
                "displayName": format!("LI {}", i),
                "insertionOrderId": "41",
                "entityStatus": ACTIVE
            })
        })
        .collect();
    stub.on_get(dv, "advertisers/111/lineItems", json!({"lineItems": line_items}));
    stub.on_get(
        dv,
        "advertisers/111/lineItems/51",
        json!({
            "lineItemId": "51",
            "displayName": "LI 1",
            "entityStatus": ACTIVE,
            "targetingExpansion": {"targetingExpansionLevel": "NO_EXPANSION"}
        }),
    );
    stub.on_get(
        dv,
        "advertisers/111/lineItems/51:bulkListAssignedTargetingOptions",
        json!({"lineItemAssignedTargetingOptions": [
            {"assignedTargetingOption": {"targetingType": "TARGETING_TYPE_GEO_REGION", "assignedTargetingOptionId": "2840"}}
        ]}),
    );
    stub.on(
        dv,
        HttpMethod::Patch,
        "advertisers/111/lineItems/51",
        json!({"lineItemId": "51", "displayName": "LI 1", "entityStatus": PAUSED}),
    );
    stub.on(
        dv,
        HttpMethod::Post,
        "advertisers/111/campaigns",
        campaign("8", "New Campaign", PAUSED),
    );
    stub.on_get(dv, "advertisers/111/creatives", json!({"creatives": []}));
    stub.on_get(
        dv,
        "advertisers/111/creatives/61",
        json!({"creativeId": "61", "displayName": "Banner"}),
    );
    stub.on_get(
        dv,
        "firstAndThirdPartyAudiences",
        json!({"firstAndThirdPartyAudiences": [
            {"firstAndThirdPartyAudienceId": "71", "displayName": "Site visitors"}
        ]}),
    );
    stub.on_get(
        dv,
        "firstAndThirdPartyAudiences/71",
        json!({"firstAndThirdPartyAudienceId": "71", "displayName": "Site visitors"}),
    );
    stub.on(
        dv,
        HttpMethod::Post,
        "firstAndThirdPartyAudiences",
        json!({"firstAndThirdPartyAudienceId": "72", "displayName": "Buyers"}),
    );
}

pub fn query_record(query_id: &str, title: &str) -> Value {
    json!({
        "queryId": query_id,
        "metadata": {"title": title, "dataRange": {"range": "LAST_30_DAYS"}, "format": "CSV"},
        "params": {
            "type": "STANDARD",
            "filters": [{"type": "FILTER_ADVERTISER", "value": ADVERTISER}]
        },
        "schedule": {"frequency": "ONE_TIME"}
    })
}

pub fn done_report(query_id: &str, report_id: &str) -> Value {
    json!({
        "key": {"queryId": query_id, "reportId": report_id},
        "metadata": {
            "status": {"state": "DONE"},
            "googleCloudStoragePath": format!("https://storage.googleapis.com/reports/{}.csv", report_id),
            "reportDataStartDate": {"year": 2024, "month": 5, "day": 1},
            "reportDataEndDate": {"year": 2024, "month": 5, "day": 30}
        }
    })
}

/// A query `q1` that is created and run; its reports list stays empty
/// unless the caller queues more responses.
pub fn seed_reporting(stub: &StubTransport) {
    let bm = ApiService::BidManager;
    stub.on(bm, HttpMethod::Post, "queries", query_record("q1", "Campaign Performance"));
    stub.on(bm, HttpMethod::Post, "queries/q1:run", json!({"key": {"queryId": "q1"}}));
    stub.on_get(bm, "queries/q1", query_record("q1", "Campaign Performance"));
    stub.on_get(
        bm,
        "queries",
        json!({"queries": [query_record("q1", "Campaign Performance"), {
            "queryId": "q2",
            "metadata": {"title": "Other advertiser"},
            "params": {"filters": [{"type": "FILTER_ADVERTISER", "value": "222"}]}
        }]}),
    );
}
