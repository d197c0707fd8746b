//! HTTP implementation of [`RegistryClient`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{
    ChangeOperationalIntentReferenceResponse, GetOperationalIntentDetailsResponse,
    PutOperationalIntentDetailsParameters, PutOperationalIntentReferenceParameters,
    QueryOperationalIntentReferenceParameters, QueryOperationalIntentReferenceResponse,
    RegistryClient, RegistryError,
};
use crate::error::{Error, Result};
use crate::models::{OperationalIntent, OperationalIntentReference, Volume4D};

/// Default timeout for registry and peer calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to the registry at `dss_base_url` and to peers at their own base URLs.
pub struct HttpRegistryClient {
    http: reqwest::Client,
    dss_base_url: String,
    token: Option<String>,
}

impl HttpRegistryClient {
    pub fn new(dss_base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            dss_base_url: dss_base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn dss_url(&self, path: &str) -> String {
        format!("{}/dss/v1/{}", self.dss_base_url, path)
    }

    /// Send a request and decode a JSON answer (or nothing, for `()`).
    async fn call<B, R>(&self, method: Method, url: &str, body: Option<&B>) -> std::result::Result<R, RegistryError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self.http.request(method.clone(), url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| connection_error(&e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| connection_error(&e))?;
        debug!(%method, url, status = status.as_u16(), "registry call");

        if !status.is_success() {
            return Err(RegistryError::Query {
                status: Some(status.as_u16()),
                message: format!("{method} {url} returned {status}"),
                payload: Some(text),
            });
        }

        let text = if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            "null"
        } else {
            text.as_str()
        };
        serde_json::from_str(text).map_err(|e| RegistryError::Query {
            status: Some(status.as_u16()),
            message: format!("malformed response from {method} {url}: {e}"),
            payload: Some(text.to_string()),
        })
    }
}

fn connection_error(e: &reqwest::Error) -> RegistryError {
    RegistryError::Connection {
        message: e.to_string(),
        trace: format!("{e:?}"),
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn query_references(
        &self,
        area: &Volume4D,
    ) -> std::result::Result<Vec<OperationalIntentReference>, RegistryError> {
        let body = QueryOperationalIntentReferenceParameters {
            area_of_interest: area.clone(),
        };
        let url = self.dss_url("operational_intent_references/query");
        let response: QueryOperationalIntentReferenceResponse =
            self.call(Method::POST, &url, Some(&body)).await?;
        Ok(response.operational_intent_references)
    }

    async fn get_details(
        &self,
        uss_base_url: &str,
        id: &str,
    ) -> std::result::Result<OperationalIntent, RegistryError> {
        let url = format!(
            "{}/uss/v1/operational_intents/{}",
            uss_base_url.trim_end_matches('/'),
            id
        );
        let response: GetOperationalIntentDetailsResponse =
            self.call::<(), _>(Method::GET, &url, None).await?;
        Ok(response.operational_intent)
    }

    async fn create_reference(
        &self,
        id: &str,
        params: &PutOperationalIntentReferenceParameters,
    ) -> std::result::Result<ChangeOperationalIntentReferenceResponse, RegistryError> {
        let url = self.dss_url(&format!("operational_intent_references/{id}"));
        self.call(Method::PUT, &url, Some(params)).await
    }

    async fn update_reference(
        &self,
        id: &str,
        ovn: &str,
        params: &PutOperationalIntentReferenceParameters,
    ) -> std::result::Result<ChangeOperationalIntentReferenceResponse, RegistryError> {
        let url = self.dss_url(&format!("operational_intent_references/{id}/{ovn}"));
        self.call(Method::PUT, &url, Some(params)).await
    }

    async fn delete_reference(
        &self,
        id: &str,
        ovn: &str,
    ) -> std::result::Result<ChangeOperationalIntentReferenceResponse, RegistryError> {
        let url = self.dss_url(&format!("operational_intent_references/{id}/{ovn}"));
        self.call::<(), _>(Method::DELETE, &url, None).await
    }

    async fn notify_details_changed(
        &self,
        uss_base_url: &str,
        payload: &PutOperationalIntentDetailsParameters,
    ) -> std::result::Result<(), RegistryError> {
        let url = format!("{}/uss/v1/operational_intents", uss_base_url.trim_end_matches('/'));
        let _: serde_json::Value = self.call(Method::POST, &url, Some(payload)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{delete, get, post};
    use axum::Router;
    use tokio::net::TcpListener;

    #[test]
    fn registry_paths_are_rooted_at_dss_base() {
        let client = HttpRegistryClient::new("http://dss.local/", None, DEFAULT_HTTP_TIMEOUT).unwrap();
        assert_eq!(
            client.dss_url("operational_intent_references/op1"),
            "http://dss.local/dss/v1/operational_intent_references/op1"
        );
    }

    /// Serve `app` on an ephemeral local port and return its base URL.
    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}")
    }

    fn client(base_url: &str) -> HttpRegistryClient {
        HttpRegistryClient::new(base_url, Some("token".into()), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn error_status_keeps_code_and_body() {
        let app = Router::new()
            .route(
                "/dss/v1/operational_intent_references/:id/:ovn",
                delete(|| async { (AxumStatus::CONFLICT, "ovn mismatch") }),
            )
            .route(
                "/dss/v1/operational_intent_references/query",
                post(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "boom") }),
            );
        let client = client(&serve(app).await);

        let err = client.delete_reference("op1", "ovn1").await.unwrap_err();
        match err {
            RegistryError::Query { status, payload, .. } => {
                assert_eq!(status, Some(409));
                assert_eq!(payload.as_deref(), Some("ovn mismatch"));
            }
            other => panic!("expected a query error, got {other:?}"),
        }

        let area = crate::testing::now_area(46.0, 7.0).remove(0);
        let err = client.query_references(&area).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_query_error() {
        let app = Router::new().route(
            "/uss/v1/operational_intents/:id",
            get(|| async { "{\"operational_intent\": 42" }),
        );
        let base = serve(app).await;

        let err = client(&base).get_details(&base, "op1").await.unwrap_err();
        match err {
            RegistryError::Query { status, message, payload } => {
                assert_eq!(status, Some(200));
                assert!(message.contains("malformed"), "{message}");
                assert!(payload.is_some());
            }
            other => panic!("expected a query error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_content_notification_is_accepted() {
        let app = Router::new().route(
            "/uss/v1/operational_intents",
            post(|| async { AxumStatus::NO_CONTENT }),
        );
        let base = serve(app).await;
        let payload = PutOperationalIntentDetailsParameters {
            operational_intent_id: "op1".into(),
            operational_intent: None,
            subscriptions: Vec::new(),
        };

        client(&base).notify_details_changed(&base, &payload).await.unwrap();
    }

    #[tokio::test]
    async fn closed_port_is_a_connection_error_with_trace() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}"))
            .delete_reference("op1", "ovn1")
            .await
            .unwrap_err();
        match err {
            RegistryError::Connection { message, trace } => {
                assert!(!message.is_empty());
                assert!(!trace.is_empty());
            }
            other => panic!("expected a connection error, got {other:?}"),
        }
    }
}
