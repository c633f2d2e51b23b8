//! Service catalog
//!
//! The catalog is rebuilt wholesale from every `allUnifiedRequests`
//! payload; there is no incremental update. Each entry carries the
//! explanatory text and type glyph the UI shows next to the service.

use crate::codec::split_service_id;
use crate::protocol::{ProviderServices, ServiceDescriptor};
use serde::{Deserialize, Serialize};

/// Catalog entry describing one subscribable service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceProposal {
    /// Provider this service belongs to (the record's endpoint)
    pub social_network: String,
    /// Whether the user currently holds an auth token for the provider
    pub social_network_token: bool,
    /// Second segment of the composite id, e.g. `user` or `hashtag`
    pub type_service: String,
    pub type_service_char: String,
    pub explain_service: String,
    pub has_parser: bool,
    /// The underlying server-shape descriptor
    pub service: ServiceDescriptor,
}

/// Build the full proposal list from catalog records.
pub fn build_catalog(records: &[ProviderServices]) -> Vec<ServiceProposal> {
    let mut proposals = Vec::new();
    for record in records {
        for descriptor in &record.services {
            let (_, type_service) = split_service_id(&descriptor.service);
            let explain_service = if descriptor.has_parser {
                explain(type_service, &record.endpoint)
            } else {
                "Coming soon...".to_string()
            };
            proposals.push(ServiceProposal {
                social_network: record.endpoint.clone(),
                social_network_token: record.has_token,
                type_service: type_service.to_string(),
                type_service_char: type_glyph(&descriptor.service).to_string(),
                explain_service,
                has_parser: descriptor.has_parser,
                service: descriptor.clone(),
            });
        }
    }
    proposals
}

/// Glyph shown next to a service, keyed by its composite id.
pub fn type_glyph(service_id: &str) -> &'static str {
    let (social_network, type_service) = split_service_id(service_id);
    match type_service {
        "group" => "ഹ",
        "user" => {
            if social_network == "twitter" {
                "@"
            } else {
                "😊"
            }
        }
        "hashtag" => "#",
        _ => "",
    }
}

fn explain(type_service: &str, social_network: &str) -> String {
    match type_service {
        "group" => "Click here to display a specific Facebook group.".to_string(),
        "user" => {
            if social_network == "twitter" {
                "Click here to display tweets of a specific Twitter user.".to_string()
            } else {
                "Click here to display the wall of a specific Facebook user.".to_string()
            }
        }
        "hashtag" => "Click here to display tweets of a specific Twitter hashtag.".to_string(),
        _ => format!("Click here to display your {social_network} {type_service}."),
    }
}
