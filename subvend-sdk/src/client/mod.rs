//! Typed HTTP client for the subvend server API.
//!
//! Used by the chat frontend to drive deposits and purchases.  Every request
//! carries the shared service secret as a bearer token.

use reqwest::Client;
use uuid::Uuid;

use crate::objects::{
    AccountId, BalanceView, CreateDepositRequest, CreatePurchaseRequest, DepositInstructions,
    EnqueuedTask, HistoryPage,
};

/// Errors returned by [`ServiceClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid response body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Typed client for the user-facing service API.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: Client,
    base_url: String,
    secret: String,
}

impl ServiceClient {
    /// * `base_url` – root URL of the subvend server, without trailing slash.
    /// * `service_secret` – the shared bearer secret from the server config.
    pub fn new(base_url: impl Into<String>, service_secret: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            secret: service_secret.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/deposits` – create a deposit order.
    pub async fn create_deposit(
        &self,
        request: &CreateDepositRequest,
    ) -> Result<DepositInstructions, ClientError> {
        let url = format!("{}/api/deposits", self.base_url);
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.secret)
            .json(request)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `DELETE /api/deposits/{token}` – cancel an open deposit order.
    ///
    /// Returns `false` when the order was not open anymore.
    pub async fn cancel_deposit(&self, order_token: Uuid) -> Result<bool, ClientError> {
        let url = format!("{}/api/deposits/{order_token}", self.base_url);
        let resp = self
            .http
            .delete(url)
            .bearer_auth(&self.secret)
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        Ok(true)
    }

    /// `POST /api/purchases` – enqueue a purchase intent.
    pub async fn create_purchase(
        &self,
        request: &CreatePurchaseRequest,
    ) -> Result<EnqueuedTask, ClientError> {
        let url = format!("{}/api/purchases", self.base_url);
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.secret)
            .json(request)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /api/accounts/{id}/balance` – point-in-time balance.
    pub async fn balance(&self, account_id: AccountId) -> Result<BalanceView, ClientError> {
        let url = format!("{}/api/accounts/{account_id}/balance", self.base_url);
        let resp = self.http.get(url).bearer_auth(&self.secret).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/accounts/{id}/history?page=N` – paginated purchase history,
    /// newest first.
    pub async fn history(
        &self,
        account_id: AccountId,
        page: u32,
    ) -> Result<HistoryPage, ClientError> {
        let url = format!(
            "{}/api/accounts/{account_id}/history?page={page}",
            self.base_url
        );
        let resp = self.http.get(url).bearer_auth(&self.secret).send().await?;
        parse_response(resp).await
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
