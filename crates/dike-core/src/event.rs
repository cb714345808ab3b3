//! Audit event model and wire envelope.
//!
//! Events follow the Kubernetes `audit.k8s.io` `Event` schema. Every field is
//! optional: the pipeline forwards events without interpreting them, so a
//! partially populated event is as valid as a complete one.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// An ordered batch of events delivered together in one processing call.
///
/// Batches are shared by reference between sinks and never mutated.
pub type EventBatch = Arc<[AuditEvent]>;

/// Stage of the request handling at which an event was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// The audit handler received the request.
    RequestReceived,
    /// Response headers were sent, the body was not.
    ResponseStarted,
    /// The response body was completed.
    ResponseComplete,
    /// A panic occurred while handling the request.
    Panic,
    /// A stage this build does not know about.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RequestReceived => "RequestReceived",
            Self::ResponseStarted => "ResponseStarted",
            Self::ResponseComplete => "ResponseComplete",
            Self::Panic => "Panic",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Amount of information recorded for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    /// Nothing is logged.
    None,
    /// Request metadata only.
    Metadata,
    /// Metadata and request body.
    Request,
    /// Metadata, request and response bodies.
    RequestResponse,
    /// A level this build does not know about.
    #[serde(other)]
    Unknown,
}

/// Identity of the actor that issued the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// User name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Unique identifier of the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Groups the user belongs to.
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "nullable")]
    pub groups: Vec<String>,

    /// Additional authenticator-provided information.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", deserialize_with = "nullable")]
    pub extra: BTreeMap<String, Vec<String>>,
}

/// Reference to the object the request acted on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// Resource type, e.g. `certificates`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Namespace of the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Object name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Object UID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// API group of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,

    /// API version of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Resource version of the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Subresource, e.g. `status`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subresource: Option<String>,
}

/// A single audit record describing one observed action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Audit level the event was generated at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,

    /// Unique audit ID, shared by all events of one request.
    #[serde(default, rename = "auditID", skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<String>,

    /// Stage of request handling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,

    /// Request URI as sent by the client.
    #[serde(default, rename = "requestURI", skip_serializing_if = "Option::is_none")]
    pub request_uri: Option<String>,

    /// Kubernetes verb, e.g. `create`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verb: Option<String>,

    /// Authenticated user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,

    /// Impersonated user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonated_user: Option<UserInfo>,

    /// Source IPs, origin first.
    #[serde(
        default,
        rename = "sourceIPs",
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "nullable"
    )]
    pub source_ips: Vec<String>,

    /// User agent reported by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Object targeted by the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_ref: Option<ObjectReference>,

    /// Response status (a `metav1.Status`), kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<serde_json::Value>,

    /// Request body, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_object: Option<serde_json::Value>,

    /// Response body, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_object: Option<serde_json::Value>,

    /// Time the request reached the API server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_received_timestamp: Option<DateTime<Utc>>,

    /// Time the request reached the current stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_timestamp: Option<DateTime<Utc>>,

    /// Unstructured annotations set by admission plugins and others.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", deserialize_with = "nullable")]
    pub annotations: BTreeMap<String, String>,
}

/// Wire envelope carrying a batch of events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventList {
    /// Discriminator; must equal [`EventList::KIND`].
    #[serde(default, deserialize_with = "nullable")]
    pub kind: String,

    /// API version of the envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Events in their original order.
    #[serde(default, deserialize_with = "nullable")]
    pub items: Vec<AuditEvent>,
}

impl EventList {
    /// The only accepted discriminator value.
    pub const KIND: &'static str = "EventList";

    /// Creates an envelope with the correct discriminator.
    #[must_use]
    pub fn new(items: Vec<AuditEvent>) -> Self {
        Self {
            kind: Self::KIND.to_string(),
            api_version: Some("audit.k8s.io/v1".to_string()),
            items,
        }
    }

    /// Returns true if the discriminator is `EventList`.
    #[must_use]
    pub fn is_event_list(&self) -> bool {
        self.kind == Self::KIND
    }

    /// Flattens the envelope into a batch, preserving event order.
    #[must_use]
    pub fn into_batch(self) -> EventBatch {
        self.items.into()
    }
}

/// Treats an explicit JSON `null` like a missing collection.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
