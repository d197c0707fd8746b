//! Registry writes and subscriber notification.

use futures::future::join_all;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{FlowError, ScdEngine};
use crate::models::{
    FlightRecord, NotificationFailures, OperationalIntent, OperationalIntentDetails,
    OperationalIntentReference, OperationalIntentState,
};
use crate::registry::{
    ImplicitSubscriptionParameters, PutOperationalIntentDetailsParameters,
    PutOperationalIntentReferenceParameters, RegistryError, SubscriberToNotify,
};

impl ScdEngine {
    /// Write the intent to the registry and notify its subscribers.
    ///
    /// Updates the existing reference if the flight already has one,
    /// otherwise creates a new one under a fresh id.
    pub(crate) async fn share_op_intent(
        &self,
        state: OperationalIntentState,
        details: OperationalIntentDetails,
        existing: Option<&FlightRecord>,
        key: Vec<String>,
    ) -> Result<(OperationalIntent, NotificationFailures), FlowError> {
        let mut params = PutOperationalIntentReferenceParameters {
            extents: details.all_volumes(),
            key,
            state,
            uss_base_url: self.identity.base_url.clone(),
            new_subscription: None,
        };

        let response = match existing {
            Some(record) => {
                let reference = &record.op_intent.reference;
                let ovn = reference.ovn.as_deref().unwrap_or_default();
                debug!(op_intent_id = %reference.id, %state, "updating operational intent");
                self.registry
                    .update_reference(&reference.id, ovn, &params)
                    .await?
            }
            None => {
                let id = Uuid::new_v4().to_string();
                params.new_subscription = Some(ImplicitSubscriptionParameters {
                    uss_base_url: self.identity.base_url.clone(),
                    notify_for_constraints: false,
                });
                debug!(op_intent_id = %id, %state, "creating operational intent");
                self.registry.create_reference(&id, &params).await?
            }
        };

        let op_intent = OperationalIntent {
            reference: response.operational_intent_reference,
            details,
        };
        let failures = self
            .notify_subscribers(op_intent.id(), Some(&op_intent), &response.subscribers)
            .await;
        Ok((op_intent, failures))
    }

    /// Remove the reference from the registry and tell its subscribers.
    pub(crate) async fn delete_op_intent(
        &self,
        reference: &OperationalIntentReference,
    ) -> Result<NotificationFailures, RegistryError> {
        let ovn = reference.ovn.as_deref().unwrap_or_default();
        let response = self.registry.delete_reference(&reference.id, ovn).await?;
        Ok(self
            .notify_subscribers(&reference.id, None, &response.subscribers)
            .await)
    }

    /// Deliver a change to every subscriber but this USS.
    ///
    /// Every delivery is attempted; failures are collected by subscriber URL
    /// and never abort the operation.
    pub(crate) async fn notify_subscribers(
        &self,
        op_intent_id: &str,
        op_intent: Option<&OperationalIntent>,
        subscribers: &[SubscriberToNotify],
    ) -> NotificationFailures {
        let deliveries = subscribers
            .iter()
            .filter(|subscriber| !self.identity.is_self(&subscriber.uss_base_url))
            .map(|subscriber| async move {
                let payload = PutOperationalIntentDetailsParameters {
                    operational_intent_id: op_intent_id.to_string(),
                    operational_intent: op_intent.cloned(),
                    subscriptions: subscriber.subscriptions.clone(),
                };
                let outcome = self
                    .registry
                    .notify_details_changed(&subscriber.uss_base_url, &payload)
                    .await;
                (subscriber.uss_base_url.as_str(), outcome)
            });

        let mut failures = NotificationFailures::new();
        for (url, outcome) in join_all(deliveries).await {
            match outcome {
                Ok(()) => debug!(op_intent_id, subscriber = url, "subscriber notified"),
                Err(e) => {
                    warn!(op_intent_id, subscriber = url, error = %e, "failed to notify subscriber");
                    failures.insert(url.to_string(), e.to_string());
                }
            }
        }
        failures
    }
}
