//! Human-readable renderings of API records for tool results.

use serde_json::Value;

use super::bid_manager::{CreatedQuery, ReportInfo, ReportPreview, ReportStatus};
use super::display_video::{AdvertiserSummary, LineItemTargeting};

pub const ADVERTISER_LIMIT: usize = 15;
pub const CAMPAIGN_LIMIT: usize = 20;
pub const ENTITY_LIMIT: usize = 15;
pub const REPORT_LIMIT: usize = 10;

const MISSING: &str = "N/A";

/// String field at a JSON pointer, or `N/A`.
fn at<'a>(record: &'a Value, pointer: &str) -> &'a str {
    record
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(MISSING)
}

/// Any scalar at a pointer rendered as text.
fn scalar(record: &Value, pointer: &str) -> String {
    match record.pointer(pointer) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => MISSING.to_string(),
    }
}

fn date(record: &Value, pointer: &str) -> String {
    match record.pointer(pointer) {
        Some(d) if d.get("year").is_some() => format!(
            "{}-{:02}-{:02}",
            d["year"].as_u64().unwrap_or(0),
            d["month"].as_u64().unwrap_or(0),
            d["day"].as_u64().unwrap_or(0)
        ),
        _ => MISSING.to_string(),
    }
}

/// `"1500000"` micros to `"1.50"` currency units.
fn micros(record: &Value, pointer: &str) -> String {
    let raw = match record.pointer(pointer) {
        Some(Value::String(s)) => s.parse::<i64>().ok(),
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    };
    match raw {
        Some(m) => format!("{:.2}", m as f64 / 1_000_000.0),
        None => MISSING.to_string(),
    }
}

fn capped_list<F>(header: String, items: &[Value], limit: usize, noun: &str, line: F) -> String
where
    F: Fn(&Value) -> String,
{
    let mut out = vec![header, String::new()];
    out.extend(items.iter().take(limit).map(|item| line(item)));
    if items.len() > limit {
        out.push(format!("... and {} more {}", items.len() - limit, noun));
    }
    out.join("\n")
}

pub fn error(message: impl std::fmt::Display) -> String {
    format!("❌ Error: {}", message)
}

pub fn unknown_tool(name: &str) -> String {
    format!("❌ Unknown tool: {}", name)
}

pub fn advertisers(items: &[Value]) -> String {
    if items.is_empty() {
        return "No advertisers found. Check that the credentials have access to a partner."
            .to_string();
    }
    capped_list(
        format!("✅ Found {} advertisers:", items.len()),
        items,
        ADVERTISER_LIMIT,
        "advertisers",
        |a| {
            format!(
                "• {} (ID: {}) - Status: {}",
                at(a, "/displayName"),
                at(a, "/advertiserId"),
                at(a, "/entityStatus")
            )
        },
    )
}

fn campaign_line(c: &Value) -> String {
    format!(
        "• {} (ID: {}) - Status: {}",
        at(c, "/displayName"),
        at(c, "/campaignId"),
        at(c, "/entityStatus")
    )
}

pub fn campaigns(advertiser_id: &str, items: &[Value]) -> String {
    if items.is_empty() {
        return format!("No campaigns found for advertiser {}", advertiser_id);
    }
    capped_list(
        format!("✅ Found {} campaigns for advertiser {}:", items.len(), advertiser_id),
        items,
        CAMPAIGN_LIMIT,
        "campaigns",
        campaign_line,
    )
}

pub fn active_campaigns(advertiser_id: &str, items: &[Value]) -> String {
    if items.is_empty() {
        return format!("No active campaigns found for advertiser {}", advertiser_id);
    }
    capped_list(
        format!("✅ Found {} active campaigns for advertiser {}:", items.len(), advertiser_id),
        items,
        CAMPAIGN_LIMIT,
        "campaigns",
        campaign_line,
    )
}

pub fn campaign_search(term: &str, items: &[Value]) -> String {
    if items.is_empty() {
        return format!("No campaigns found matching '{}'", term);
    }
    capped_list(
        format!("✅ Found {} campaigns matching '{}':", items.len(), term),
        items,
        CAMPAIGN_LIMIT,
        "campaigns",
        campaign_line,
    )
}

pub fn campaign_detail(c: &Value) -> String {
    [
        format!("📊 Campaign: {}", at(c, "/displayName")),
        format!("ID: {}", at(c, "/campaignId")),
        format!("Advertiser: {}", at(c, "/advertiserId")),
        format!("Status: {}", at(c, "/entityStatus")),
        format!("Goal: {}", at(c, "/campaignGoal/campaignGoalType")),
        format!(
            "Performance goal: {}",
            at(c, "/campaignGoal/performanceGoal/performanceGoalType")
        ),
        format!("Start date: {}", date(c, "/campaignFlight/plannedDates/startDate")),
        format!("End date: {}", date(c, "/campaignFlight/plannedDates/endDate")),
        format!("Frequency cap unlimited: {}", scalar(c, "/frequencyCap/unlimited")),
        format!("Last updated: {}", at(c, "/updateTime")),
    ]
    .join("\n")
}

pub fn created_campaign(c: &Value) -> String {
    format!(
        "✅ Created campaign '{}' (ID: {}) with status {}",
        at(c, "/displayName"),
        at(c, "/campaignId"),
        at(c, "/entityStatus")
    )
}

pub fn insertion_orders(advertiser_id: &str, items: &[Value]) -> String {
    if items.is_empty() {
        return format!("No insertion orders found for advertiser {}", advertiser_id);
    }
    capped_list(
        format!("✅ Found {} insertion orders:", items.len()),
        items,
        ENTITY_LIMIT,
        "insertion orders",
        |io| {
            format!(
                "• {} (ID: {}) - Campaign: {} - Status: {}",
                at(io, "/displayName"),
                at(io, "/insertionOrderId"),
                at(io, "/campaignId"),
                at(io, "/entityStatus")
            )
        },
    )
}

pub fn insertion_order_detail(io: &Value) -> String {
    [
        format!("📋 Insertion order: {}", at(io, "/displayName")),
        format!("ID: {}", at(io, "/insertionOrderId")),
        format!("Campaign: {}", at(io, "/campaignId")),
        format!("Status: {}", at(io, "/entityStatus")),
        format!("Budget unit: {}", at(io, "/budget/budgetUnit")),
        format!(
            "First budget segment: {}",
            micros(io, "/budget/budgetSegments/0/budgetAmountMicros")
        ),
        format!("Pacing: {}", at(io, "/pacing/pacingPeriod")),
        format!("KPI: {}", at(io, "/kpi/kpiType")),
    ]
    .join("\n")
}

pub fn line_items(advertiser_id: &str, items: &[Value]) -> String {
    if items.is_empty() {
        return format!("No line items found for advertiser {}", advertiser_id);
    }
    capped_list(
        format!("✅ Found {} line items:", items.len()),
        items,
        ENTITY_LIMIT,
        "line items",
        |li| {
            format!(
                "• {} (ID: {}) - Type: {} - Status: {}",
                at(li, "/displayName"),
                at(li, "/lineItemId"),
                at(li, "/lineItemType"),
                at(li, "/entityStatus")
            )
        },
    )
}

pub fn line_item_detail(li: &Value) -> String {
    [
        format!("📈 Line item: {}", at(li, "/displayName")),
        format!("ID: {}", at(li, "/lineItemId")),
        format!("Insertion order: {}", at(li, "/insertionOrderId")),
        format!("Campaign: {}", at(li, "/campaignId")),
        format!("Type: {}", at(li, "/lineItemType")),
        format!("Status: {}", at(li, "/entityStatus")),
        format!("Flight: {}", at(li, "/flight/flightDateType")),
        format!(
            "Fixed bid: {}",
            micros(li, "/bidStrategy/fixedBid/bidAmountMicros")
        ),
        format!("Budget allocation: {}", at(li, "/budget/budgetAllocationType")),
    ]
    .join("\n")
}

pub fn targeting(t: &LineItemTargeting) -> String {
    let mut out = vec![
        format!(
            "🎯 Targeting for line item {} ({})",
            at(&t.line_item, "/displayName"),
            at(&t.line_item, "/lineItemId")
        ),
        format!(
            "Optimized targeting: {}",
            scalar(&t.targeting_expansion, "/enableOptimizedTargeting")
        ),
        format!(
            "Expansion level: {}",
            at(&t.targeting_expansion, "/targetingExpansionLevel")
        ),
        String::new(),
    ];
    if t.assigned_options.is_empty() {
        out.push("No assigned targeting options.".to_string());
    } else {
        out.push(format!("Assigned options ({}):", t.assigned_options.len()));
        out.extend(t.assigned_options.iter().take(ENTITY_LIMIT * 2).map(|o| {
            format!(
                "• {} - {}",
                at(o, "/targetingType"),
                at(o, "/assignedTargetingOptionId")
            )
        }));
        if t.assigned_options.len() > ENTITY_LIMIT * 2 {
            out.push(format!(
                "... and {} more options",
                t.assigned_options.len() - ENTITY_LIMIT * 2
            ));
        }
    }
    out.join("\n")
}

pub fn paused_line_item(li: &Value, advertiser_id: &str, line_item_id: &str) -> String {
    format!(
        "✅ Line item {} (advertiser {}) is now {}",
        line_item_id,
        advertiser_id,
        li.get("entityStatus")
            .and_then(|s| s.as_str())
            .unwrap_or("ENTITY_STATUS_PAUSED")
    )
}

pub fn creatives(advertiser_id: &str, items: &[Value]) -> String {
    if items.is_empty() {
        return format!("No creatives found for advertiser {}", advertiser_id);
    }
    capped_list(
        format!("✅ Found {} creatives:", items.len()),
        items,
        ENTITY_LIMIT,
        "creatives",
        |c| {
            format!(
                "• {} (ID: {}) - Type: {} - Status: {}",
                at(c, "/displayName"),
                at(c, "/creativeId"),
                at(c, "/creativeType"),
                at(c, "/entityStatus")
            )
        },
    )
}

pub fn creative_detail(c: &Value) -> String {
    [
        format!("🎨 Creative: {}", at(c, "/displayName")),
        format!("ID: {}", at(c, "/creativeId")),
        format!("Type: {}", at(c, "/creativeType")),
        format!("Status: {}", at(c, "/entityStatus")),
        format!(
            "Dimensions: {}x{}",
            scalar(c, "/dimensions/widthPixels"),
            scalar(c, "/dimensions/heightPixels")
        ),
        format!("Approval: {}", at(c, "/reviewStatus/approvalStatus")),
        format!("Hosting: {}", at(c, "/hostingSource")),
    ]
    .join("\n")
}

pub fn audiences(items: &[Value]) -> String {
    if items.is_empty() {
        return "No audiences found.".to_string();
    }
    capped_list(
        format!("✅ Found {} audiences:", items.len()),
        items,
        ENTITY_LIMIT,
        "audiences",
        |a| {
            format!(
                "• {} (ID: {}) - Type: {} - Size: {}",
                at(a, "/displayName"),
                at(a, "/firstAndThirdPartyAudienceId"),
                at(a, "/audienceType"),
                scalar(a, "/displayAudienceSize")
            )
        },
    )
}

pub fn audience_detail(a: &Value) -> String {
    [
        format!("👥 Audience: {}", at(a, "/displayName")),
        format!("ID: {}", at(a, "/firstAndThirdPartyAudienceId")),
        format!("Type: {}", at(a, "/audienceType")),
        format!("Source: {}", at(a, "/audienceSource")),
        format!("Display size: {}", scalar(a, "/displayAudienceSize")),
        format!("Membership days: {}", scalar(a, "/membershipDurationDays")),
        format!("Description: {}", at(a, "/description")),
    ]
    .join("\n")
}

pub fn created_audience(a: &Value) -> String {
    format!(
        "✅ Created audience list '{}' (ID: {})",
        at(a, "/displayName"),
        at(a, "/firstAndThirdPartyAudienceId")
    )
}

pub fn advertiser_summary(s: &AdvertiserSummary) -> String {
    let mut out = vec![
        format!("📊 Advertiser summary: {}", at(&s.advertiser, "/displayName")),
        format!("ID: {}", at(&s.advertiser, "/advertiserId")),
        format!("Status: {}", at(&s.advertiser, "/entityStatus")),
        String::new(),
        format!("Total campaigns: {}", s.summary.total_campaigns),
        format!("Active campaigns: {}", s.summary.active_campaigns),
        format!("Insertion orders: {}", s.summary.insertion_orders),
        format!("Line items: {}", s.summary.line_items),
        format!("Creatives: {}", s.summary.creatives),
    ];
    if !s.recent_campaigns.is_empty() {
        out.push(String::new());
        out.push("Recent campaigns:".to_string());
        out.extend(s.recent_campaigns.iter().map(campaign_line));
    }
    out.join("\n")
}

pub fn created_query(created: &CreatedQuery, what: &str) -> String {
    [
        format!("✅ {} report query created", what),
        format!("Query ID: {}", created.query_id),
        format!("Title: {}", at(&created.query, "/metadata/title")),
        format!("Date range: {}", at(&created.query, "/metadata/dataRange/range")),
        String::new(),
        "Use get_performance_report_data with this query ID to check for results.".to_string(),
    ]
    .join("\n")
}

fn report_lines(info: &ReportInfo) -> Vec<String> {
    vec![
        format!("Query ID: {}", info.query_id),
        format!("Report ID: {}", info.report_id),
        format!("State: {}", info.state),
        format!(
            "Date range: {} to {}",
            date(&info.metadata, "/reportDataStartDate"),
            date(&info.metadata, "/reportDataEndDate")
        ),
        format!(
            "Download: {}",
            info.gcs_path.as_deref().unwrap_or(MISSING)
        ),
    ]
}

pub fn report_available(info: &ReportInfo, heading: &str) -> String {
    let mut out = vec![format!("✅ {}", heading)];
    out.extend(report_lines(info));
    out.join("\n")
}

pub fn report_status(status: &ReportStatus) -> String {
    match status {
        ReportStatus::Available(info) => report_available(info, "Report available"),
        ReportStatus::Failed(info) => {
            let mut out = vec!["❌ Report generation failed".to_string()];
            out.extend(report_lines(info));
            out.join("\n")
        }
        ReportStatus::NotReady {
            query_id,
            state,
            query,
        } => [
            "⏳ No report data available yet".to_string(),
            format!("Query ID: {}", query_id),
            format!("Title: {}", at(query, "/title")),
            format!("Report state: {}", state.as_deref().unwrap_or("NOT_STARTED")),
            "Reports usually take a few minutes. Check again shortly.".to_string(),
        ]
        .join("\n"),
    }
}

pub fn query_detail(q: &Value) -> String {
    [
        format!("📄 Query: {}", at(q, "/metadata/title")),
        format!("Query ID: {}", at(q, "/queryId")),
        format!("Format: {}", at(q, "/metadata/format")),
        format!("Date range: {}", at(q, "/metadata/dataRange/range")),
        format!("Report type: {}", at(q, "/params/type")),
        format!("Schedule: {}", at(q, "/schedule/frequency")),
    ]
    .join("\n")
}

pub fn report_preview(p: &ReportPreview) -> String {
    let mut out = vec![
        format!("✅ Report {} for query {}", p.report.report_id, p.report.query_id),
        format!("Showing {} of {} lines", p.lines.len(), p.total_lines),
        String::new(),
    ];
    out.extend(p.lines.iter().cloned());
    out.join("\n")
}

pub fn queries(items: &[Value], heading: &str) -> String {
    if items.is_empty() {
        return "No report queries found.".to_string();
    }
    capped_list(
        format!("✅ {} ({}):", heading, items.len()),
        items,
        REPORT_LIMIT,
        "queries",
        |q| {
            format!(
                "• {} (Query ID: {}) - {}",
                at(q, "/metadata/title"),
                at(q, "/queryId"),
                at(q, "/metadata/dataRange/range")
            )
        },
    )
}

pub fn catalog(heading: &str, entries: &[(&str, &str)]) -> String {
    let mut out = vec![format!("📚 {}:", heading), String::new()];
    out.extend(
        entries
            .iter()
            .map(|(code, description)| format!("• {} - {}", code, description)),
    );
    out.join("\n")
}
