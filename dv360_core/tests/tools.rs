mod common;

use serde_json::{json, Map, Value};
use std::sync::Arc;

use common::*;
use dv360_core::connectors::dv360::catalog::{ParamKind, TOOL_SPECS};
use dv360_core::connectors::dv360::display_video::DisplayVideoClient;
use dv360_core::utils::result_text;
use dv360_core::{ApiService, ApiTransport, Config, Connector, HttpMethod, ToolProfile};

fn sample_value(name: &str) -> Value {
    match name {
        "advertiser_id" => json!(ADVERTISER),
        "campaign_id" => json!("1"),
        "insertion_order_id" => json!("41"),
        "line_item_id" => json!("51"),
        "creative_id" => json!("61"),
        "audience_id" => json!("71"),
        "query_id" => json!("q1"),
        "search_term" => json!("spring"),
        "campaign_name" => json!("New Campaign"),
        "audience_name" => json!("Buyers"),
        "audience_type" => json!("CUSTOMER_MATCH_CONTACT_INFO"),
        other => json!(other),
    }
}

/// Arguments filling every required parameter of a tool.
fn required_args(tool: &str) -> Value {
    let spec = TOOL_SPECS.iter().find(|s| s.name == tool).unwrap();
    let mut args = Map::new();
    for p in spec.params.iter().filter(|p| p.required) {
        assert_eq!(p.kind, ParamKind::String, "{} {}", tool, p.name);
        args.insert(p.name.to_string(), sample_value(p.name));
    }
    Value::Object(args)
}

#[tokio::test]
async fn every_tool_answers_with_text() {
    let stub = StubTransport::new();
    seed_account(&stub);
    seed_reporting(&stub);
    stub.serve_text("date,impressions\n2024-05-01,100\n");
    let connector = connector(&stub);

    for spec in TOOL_SPECS {
        let result = call(&connector, spec.name, required_args(spec.name)).await;
        let text = result_text(&result);
        assert!(!text.trim().is_empty(), "{} returned empty text", spec.name);
    }
}

/// Static catalogs answered without any API call.
const CATALOG_TOOLS: [&str; 2] = ["get_available_performance_metrics", "get_available_date_ranges"];

#[tokio::test]
async fn every_tool_reports_upstream_failures_as_text() {
    let stub = StubTransport::new();
    stub.fail_with(403, "The caller does not have permission");
    let connector = connector(&stub);

    for spec in TOOL_SPECS {
        let result = call(&connector, spec.name, required_args(spec.name)).await;
        let text = result_text(&result);
        assert!(!text.trim().is_empty(), "{} returned empty text", spec.name);
        if CATALOG_TOOLS.contains(&spec.name) {
            assert_ne!(result.is_error, Some(true), "{}: {}", spec.name, text);
            continue;
        }
        assert_eq!(result.is_error, Some(true), "{}: {}", spec.name, text);
        assert!(text.starts_with("❌ Error:"), "{}: {}", spec.name, text);
        assert!(text.contains("permission"), "{}: {}", spec.name, text);
    }

    // Catalog tools never touch the network.
    let text = call_text(&connector, "get_available_date_ranges", json!({})).await;
    assert!(text.contains("LAST_30_DAYS"));
}

#[tokio::test]
async fn zero_page_size_is_rejected_before_any_call() {
    let stub = StubTransport::new();
    seed_reporting(&stub);
    let connector = connector(&stub);

    let result = call(&connector, "list_performance_queries", json!({"page_size": 0})).await;
    assert_eq!(result.is_error, Some(true));
    assert!(result_text(&result).contains("page_size must be a positive integer"));

    let result = call(
        &connector,
        "download_report",
        json!({"query_id": "q1", "max_lines": "0"}),
    )
    .await;
    assert_eq!(result.is_error, Some(true));
    assert!(result_text(&result).contains("max_lines must be a positive integer"));
    assert!(stub.requests().is_empty());
}

#[tokio::test]
async fn missing_argument_is_named() {
    let stub = StubTransport::new();
    let connector = connector(&stub);

    let result = call(&connector, "get_campaign_details", json!({"advertiser_id": "111"})).await;
    assert_eq!(result.is_error, Some(true));
    let text = result_text(&result);
    assert!(text.contains("campaign_id"), "{}", text);
    assert!(!text.contains("advertiser_id"), "{}", text);

    let text = call_text(&connector, "search_campaigns", json!({"search_term": "  "})).await;
    assert!(text.contains("advertiser_id, search_term"), "{}", text);
    assert!(stub.requests().is_empty());
}

#[tokio::test]
async fn active_campaigns_keep_api_order() {
    let stub = StubTransport::new();
    seed_account(&stub);
    let connector = connector(&stub);

    let text = call_text(
        &connector,
        "list_active_campaigns",
        json!({"advertiser_id": ADVERTISER}),
    )
    .await;
    assert!(text.contains("Found 3 active campaigns"), "{}", text);
    let spring = text.find("Spring Sale 2024").unwrap();
    let clearance = text.find("spring clearance").unwrap();
    let winter = text.find("Winter Boots").unwrap();
    assert!(spring < clearance && clearance < winter);
    assert!(!text.contains("Summer Launch"));
}

#[tokio::test]
async fn search_is_case_insensitive() {
    let stub = StubTransport::new();
    seed_account(&stub);
    let connector = connector(&stub);

    let text = call_text(
        &connector,
        "search_campaigns",
        json!({"advertiser_id": ADVERTISER, "search_term": "SPRING"}),
    )
    .await;
    assert!(text.contains("Found 2 campaigns matching 'SPRING'"), "{}", text);
    assert!(text.contains("Spring Sale 2024"));
    assert!(text.contains("spring clearance"));

    let text = call_text(
        &connector,
        "search_campaigns",
        json!({"advertiser_id": ADVERTISER, "search_term": "nothing like it"}),
    )
    .await;
    assert_eq!(text, "No campaigns found matching 'nothing like it'");
}

#[tokio::test]
async fn advertiser_summary_counts_entities() {
    let stub = StubTransport::new();
    seed_account(&stub);
    let transport: Arc<dyn ApiTransport> = stub.clone();
    let client = DisplayVideoClient::new(transport, None);

    let summary = client.advertiser_summary(ADVERTISER).await.unwrap();
    assert_eq!(summary.summary.total_campaigns, 7);
    assert_eq!(summary.summary.active_campaigns, 3);
    assert_eq!(summary.summary.insertion_orders, 2);
    assert_eq!(summary.summary.line_items, 5);
    assert_eq!(summary.summary.creatives, 0);
    assert_eq!(summary.recent_campaigns.len(), 5);
    assert_eq!(summary.advertiser["displayName"], "Acme Outdoor");

    let text = call_text(
        &connector(&stub),
        "get_advertiser_summary",
        json!({"advertiser_id": ADVERTISER}),
    )
    .await;
    assert!(text.contains("Total campaigns: 7"));
    assert!(text.contains("Creatives: 0"));
}

#[tokio::test]
async fn advertiser_summary_small_account() {
    let stub = StubTransport::new();
    let dv = ApiService::DisplayVideo;
    stub.on_get(dv, "advertisers/222", json!({"advertiserId": "222", "displayName": "Small"}));
    stub.on_get(
        dv,
        "advertisers/222/campaigns",
        json!({"campaigns": [
            campaign("1", "One", ACTIVE),
            campaign("2", "Two", PAUSED),
            campaign("3", "Three", PAUSED)
        ]}),
    );
    stub.on_get(
        dv,
        "advertisers/222/insertionOrders",
        json!({"insertionOrders": [{"insertionOrderId": "1"}, {"insertionOrderId": "2"}]}),
    );
    stub.on_get(
        dv,
        "advertisers/222/lineItems",
        json!({"lineItems": [{}, {}, {}, {}, {}]}),
    );
    let transport: Arc<dyn ApiTransport> = stub.clone();
    let client = DisplayVideoClient::new(transport, None);

    let summary = client.advertiser_summary("222").await.unwrap();
    assert_eq!(
        serde_json::to_value(&summary.summary).unwrap(),
        json!({
            "total_campaigns": 3,
            "active_campaigns": 1,
            "insertion_orders": 2,
            "line_items": 5,
            "creatives": 0
        })
    );
    assert_eq!(summary.recent_campaigns.len(), 3);
}

#[tokio::test]
async fn no_campaigns_means_no_active_campaigns() {
    let stub = StubTransport::new();
    let text = call_text(
        &connector(&stub),
        "list_active_campaigns",
        json!({"advertiser_id": "333"}),
    )
    .await;
    assert_eq!(text, "No active campaigns found for advertiser 333");
}

#[tokio::test]
async fn advertiser_summary_fails_as_a_whole() {
    let stub = StubTransport::new();
    stub.fail_with(500, "backend unavailable");
    let connector = connector(&stub);

    let result = call(
        &connector,
        "get_advertiser_summary",
        json!({"advertiser_id": ADVERTISER}),
    )
    .await;
    assert_eq!(result.is_error, Some(true));
    let text = result_text(&result);
    assert!(text.starts_with("❌ Error:"), "{}", text);
    assert!(!text.contains("Total campaigns"));
}

#[tokio::test]
async fn advertisers_use_configured_then_first_partner() {
    let stub = StubTransport::new();
    seed_account(&stub);

    call_text(&connector(&stub), "list_advertisers", json!({})).await;
    let listed = stub.requests_to("advertisers");
    assert_eq!(listed[0].query_value("partnerId"), Some(PARTNER));
    assert!(stub.requests_to("partners").is_empty());

    let stub = StubTransport::new();
    seed_account(&stub);
    let config = Config {
        partner_id: None,
        ..test_config(ToolProfile::Full)
    };
    let text = call_text(&connector_with(&stub, config), "list_advertisers", json!({})).await;
    assert!(text.contains("Acme Outdoor"), "{}", text);
    assert_eq!(stub.requests_to("partners").len(), 1);

    call_text(&connector(&stub), "list_advertisers", json!({"partner_id": "777"})).await;
    let last = stub.requests_to("advertisers").pop().unwrap();
    assert_eq!(last.query_value("partnerId"), Some("777"));
}

#[tokio::test]
async fn no_accessible_partner_means_no_advertisers() {
    let stub = StubTransport::new();
    stub.on_get(ApiService::DisplayVideo, "partners", json!({"partners": []}));
    let config = Config {
        partner_id: None,
        ..test_config(ToolProfile::Full)
    };
    let text = call_text(&connector_with(&stub, config), "list_advertisers", json!({})).await;
    assert!(text.starts_with("No advertisers found"), "{}", text);
}

#[tokio::test]
async fn create_campaign_starts_paused() {
    let stub = StubTransport::new();
    seed_account(&stub);

    let text = call_text(
        &connector(&stub),
        "create_campaign",
        json!({"advertiser_id": ADVERTISER, "campaign_name": "New Campaign", "campaign_goal": "drive online action"}),
    )
    .await;
    assert!(text.contains("Created campaign 'New Campaign'"), "{}", text);

    let (_, request) = stub
        .requests()
        .into_iter()
        .find(|(_, r)| r.method == HttpMethod::Post)
        .unwrap();
    let body = request.body.unwrap();
    assert_eq!(body["entityStatus"], PAUSED);
    assert_eq!(
        body["campaignGoal"]["campaignGoalType"],
        "CAMPAIGN_GOAL_TYPE_DRIVE_ONLINE_ACTION"
    );
    assert_eq!(body["frequencyCap"]["unlimited"], true);
    assert!(body["campaignFlight"]["plannedDates"]["startDate"]["year"].is_u64());
}

#[tokio::test]
async fn pause_accepts_resource_names() {
    let stub = StubTransport::new();
    seed_account(&stub);
    let connector = connector(&stub);

    let text = call_text(
        &connector,
        "pause_line_item",
        json!({"line_item_id": "advertisers/111/lineItems/51"}),
    )
    .await;
    assert!(text.contains("Line item 51 (advertiser 111) is now ENTITY_STATUS_PAUSED"), "{}", text);
    let patch = stub
        .requests()
        .into_iter()
        .find(|(_, r)| r.method == HttpMethod::Patch)
        .map(|(_, r)| r)
        .unwrap();
    assert_eq!(patch.query_value("updateMask"), Some("entityStatus"));

    let result = call(&connector, "pause_line_item", json!({"line_item_id": "51"})).await;
    assert_eq!(result.is_error, Some(true));
    assert!(result_text(&result).contains("advertiser_id"));
}

#[tokio::test]
async fn targeting_lists_assigned_options() {
    let stub = StubTransport::new();
    seed_account(&stub);

    let text = call_text(
        &connector(&stub),
        "get_targeting_options",
        json!({"advertiser_id": ADVERTISER, "line_item_id": "51"}),
    )
    .await;
    assert!(text.contains("TARGETING_TYPE_GEO_REGION"), "{}", text);
}

#[tokio::test]
async fn unknown_tool_is_reported() {
    let stub = StubTransport::new();
    let result = call(&connector(&stub), "get_weather", json!({})).await;
    assert_eq!(result.is_error, Some(true));
    assert_eq!(result_text(&result), "❌ Unknown tool: get_weather");
}

#[tokio::test]
async fn minimal_profile_exposes_one_tool() {
    let stub = StubTransport::new();
    seed_account(&stub);
    let connector = connector_with(&stub, test_config(ToolProfile::Minimal));

    let tools = connector.list_tools(None).await.unwrap().tools;
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "list_advertisers");

    let text = call_text(&connector, "list_campaigns", json!({"advertiser_id": ADVERTISER})).await;
    assert_eq!(text, "❌ Unknown tool: list_campaigns");
    let text = call_text(&connector, "list_advertisers", json!({})).await;
    assert!(text.contains("Acme Outdoor"));
}

#[tokio::test]
async fn full_profile_lists_every_tool_with_schema() {
    let stub = StubTransport::new();
    let tools = connector(&stub).list_tools(None).await.unwrap().tools;
    assert_eq!(tools.len(), TOOL_SPECS.len());
    for tool in &tools {
        assert_eq!(tool.input_schema["type"], "object");
        assert!(tool.description.is_some());
    }
}
