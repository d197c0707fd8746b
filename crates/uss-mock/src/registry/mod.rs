//! Registry (DSS) and peer USS client.
//!
//! [`RegistryClient`] is the only way the planning engine talks to the
//! network. [`HttpRegistryClient`] is the production implementation.

mod http;

pub use http::{HttpRegistryClient, DEFAULT_HTTP_TIMEOUT};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    FailureDiagnostics, OperationalIntent, OperationalIntentReference, OperationalIntentState,
    Volume4D,
};

/// Failure talking to the registry or a peer USS.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The remote answered, but not with what we asked for.
    #[error("{message}")]
    Query {
        status: Option<u16>,
        message: String,
        payload: Option<String>,
    },

    /// The remote could not be reached.
    #[error("connection error: {message}")]
    Connection { message: String, trace: String },
}

impl RegistryError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Query { status, .. } => *status,
            Self::Connection { .. } => None,
        }
    }

    /// Detail to attach to a `Failed` outcome.
    pub fn diagnostics(&self) -> FailureDiagnostics {
        match self {
            Self::Query {
                status, payload, ..
            } => FailureDiagnostics {
                status: *status,
                payload: payload.clone(),
                trace: None,
            },
            Self::Connection { trace, .. } => FailureDiagnostics {
                status: None,
                payload: None,
                trace: Some(trace.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub subscription_id: String,
    #[serde(default)]
    pub notification_index: i32,
}

/// A USS the registry says should hear about a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberToNotify {
    pub subscriptions: Vec<SubscriptionState>,
    pub uss_base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplicitSubscriptionParameters {
    pub uss_base_url: String,
    #[serde(default)]
    pub notify_for_constraints: bool,
}

/// Body of a create or update of an operational intent reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutOperationalIntentReferenceParameters {
    pub extents: Vec<Volume4D>,
    /// OVNs of every intent the writer has seen in the area.
    pub key: Vec<String>,
    pub state: OperationalIntentState,
    pub uss_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_subscription: Option<ImplicitSubscriptionParameters>,
}

/// Registry answer to a create, update or delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeOperationalIntentReferenceResponse {
    #[serde(default)]
    pub subscribers: Vec<SubscriberToNotify>,
    pub operational_intent_reference: OperationalIntentReference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOperationalIntentReferenceParameters {
    pub area_of_interest: Volume4D,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOperationalIntentReferenceResponse {
    #[serde(default)]
    pub operational_intent_references: Vec<OperationalIntentReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetOperationalIntentDetailsResponse {
    pub operational_intent: OperationalIntent,
}

/// Notification that an operational intent changed. A `None` intent means it
/// was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutOperationalIntentDetailsParameters {
    pub operational_intent_id: String,
    #[serde(default)]
    pub operational_intent: Option<OperationalIntent>,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionState>,
}

/// Calls made against the registry and peer USSs.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// References whose extents intersect `area`.
    async fn query_references(
        &self,
        area: &Volume4D,
    ) -> Result<Vec<OperationalIntentReference>, RegistryError>;

    /// Full intent from the USS that manages it.
    async fn get_details(
        &self,
        uss_base_url: &str,
        id: &str,
    ) -> Result<OperationalIntent, RegistryError>;

    async fn create_reference(
        &self,
        id: &str,
        params: &PutOperationalIntentReferenceParameters,
    ) -> Result<ChangeOperationalIntentReferenceResponse, RegistryError>;

    async fn update_reference(
        &self,
        id: &str,
        ovn: &str,
        params: &PutOperationalIntentReferenceParameters,
    ) -> Result<ChangeOperationalIntentReferenceResponse, RegistryError>;

    async fn delete_reference(
        &self,
        id: &str,
        ovn: &str,
    ) -> Result<ChangeOperationalIntentReferenceResponse, RegistryError>;

    /// Tell the peer at `uss_base_url` about a change.
    async fn notify_details_changed(
        &self,
        uss_base_url: &str,
        payload: &PutOperationalIntentDetailsParameters,
    ) -> Result<(), RegistryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_and_connection_errors_give_different_diagnostics() {
        let query = RegistryError::Query {
            status: Some(412),
            message: "missing key".into(),
            payload: Some("{}".into()),
        };
        assert_eq!(query.status(), Some(412));
        assert_eq!(query.diagnostics().payload.as_deref(), Some("{}"));
        assert!(query.diagnostics().trace.is_none());

        let connection = RegistryError::Connection {
            message: "refused".into(),
            trace: "tcp connect error".into(),
        };
        assert_eq!(connection.status(), None);
        assert_eq!(connection.diagnostics().trace.as_deref(), Some("tcp connect error"));
    }

    #[test]
    fn removal_notification_has_null_intent() {
        let payload = PutOperationalIntentDetailsParameters {
            operational_intent_id: "op1".into(),
            operational_intent: None,
            subscriptions: vec![],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["operational_intent"].is_null());
    }
}
