//! Conversions between server-shape and client-shape subscription requests
//!
//! The server keys a subscription by its composite `provider.service` id
//! and an unordered argument mapping; the UI layer works with the id split
//! apart and a labeled argument list. All three conversions are total.

use crate::protocol::{ServerUnifiedRequest, ServiceDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One labeled argument of a client-shape subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arg {
    pub key: String,
    pub value: String,
}

/// Client-shape subscription request used by the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Composite `provider.service` id, kept alongside its split parts
    pub service: String,
    pub provider_name: String,
    pub service_name: String,
    pub args: Vec<Arg>,
    pub has_arguments: bool,
    /// Whether this subscription came from a server snapshot, as opposed
    /// to being added locally during the current edit
    pub from_server: bool,
}

/// Split a composite service id at the first `.`. The service part keeps
/// any remaining dots so the id survives a round trip intact.
pub fn split_service_id(service: &str) -> (&str, &str) {
    match service.split_once('.') {
        Some((provider, rest)) => (provider, rest),
        None => (service, ""),
    }
}

/// Expand a catalog descriptor into a client shape ready for editing:
/// every argument present by name, value still empty.
pub fn for_sending(descriptor: &ServiceDescriptor) -> SubscriptionRequest {
    let (provider_name, service_name) = split_service_id(&descriptor.service);
    let args: Vec<Arg> = descriptor
        .args
        .iter()
        .map(|key| Arg {
            key: key.clone(),
            value: String::new(),
        })
        .collect();
    SubscriptionRequest {
        service: descriptor.service.clone(),
        provider_name: provider_name.to_string(),
        service_name: service_name.to_string(),
        has_arguments: !args.is_empty(),
        args,
        from_server: false,
    }
}

/// Expand a snapshot entry into a client shape for display, argument
/// values populated from the server mapping.
pub fn for_display(request: &ServerUnifiedRequest) -> SubscriptionRequest {
    let (provider_name, service_name) = split_service_id(&request.service);
    let args: Vec<Arg> = request
        .args
        .iter()
        .map(|(key, value)| Arg {
            key: key.clone(),
            value: value.clone(),
        })
        .collect();
    SubscriptionRequest {
        service: request.service.clone(),
        provider_name: provider_name.to_string(),
        service_name: service_name.to_string(),
        has_arguments: !args.is_empty(),
        args,
        from_server: true,
    }
}

/// Collapse a client shape back to the server mapping, dropping argument
/// order.
pub fn to_server(request: &SubscriptionRequest) -> ServerUnifiedRequest {
    let args: BTreeMap<String, String> = request
        .args
        .iter()
        .map(|arg| (arg.key.clone(), arg.value.clone()))
        .collect();
    ServerUnifiedRequest {
        service: format!("{}.{}", request.provider_name, request.service_name),
        args,
    }
}
