use rmcp::model::{Annotated, RawResource, Resource};

use crate::config::ToolProfile;

pub const JSON_MIME: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Advertisers,
    Campaigns,
    LineItems,
    Audiences,
    Reports,
}

#[derive(Debug, Clone, Copy)]
pub struct ResourceSpec {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ResourceKind,
}

pub static RESOURCE_SPECS: &[ResourceSpec] = &[
    ResourceSpec {
        uri: "dv360://advertisers",
        name: "DV360 Advertisers",
        description: "Advertisers of the configured or first accessible partner",
        kind: ResourceKind::Advertisers,
    },
    ResourceSpec {
        uri: "dv360://campaigns",
        name: "DV360 Campaigns",
        description: "Campaigns across the partner's advertisers",
        kind: ResourceKind::Campaigns,
    },
    ResourceSpec {
        uri: "dv360://line-items",
        name: "DV360 Line Items",
        description: "Line items across the partner's advertisers",
        kind: ResourceKind::LineItems,
    },
    ResourceSpec {
        uri: "dv360://audiences",
        name: "DV360 Audiences",
        description: "First- and third-party audiences available to the partner",
        kind: ResourceKind::Audiences,
    },
    ResourceSpec {
        uri: "dv360://reports",
        name: "DV360 Reports",
        description: "Saved Bid Manager report queries",
        kind: ResourceKind::Reports,
    },
];

fn exposed(profile: ToolProfile, spec: &ResourceSpec) -> bool {
    profile == ToolProfile::Full || spec.kind == ResourceKind::Advertisers
}

pub fn find(profile: ToolProfile, uri: &str) -> Option<&'static ResourceSpec> {
    RESOURCE_SPECS
        .iter()
        .find(|r| r.uri == uri)
        .filter(|r| exposed(profile, r))
}

pub fn resources(profile: ToolProfile) -> Vec<Resource> {
    RESOURCE_SPECS
        .iter()
        .filter(|r| exposed(profile, r))
        .map(|r| Annotated {
            raw: RawResource {
                uri: r.uri.to_string(),
                name: r.name.to_string(),
                title: None,
                description: Some(r.description.to_string()),
                mime_type: Some(JSON_MIME.to_string()),
                size: None,
                icons: None,
            },
            annotations: None,
        })
        .collect()
}
