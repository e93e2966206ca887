//! Typed calls to the JSON API.

use std::sync::Arc;

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use time::Date;

use crate::{
    FcmToken, FundSource, Message, MessageType, NotificationLog, PaymentMethod, Period, Profile,
    Report, Stats, Transaction, TransactionType, UserId,
    client::{
        ClientError,
        network::{HttpRequest, HttpResponse, Network},
    },
    endpoints::{self, format_endpoint},
    envelope::DataEnvelope,
};

/// The body for creating a transaction.
///
/// Optional fields left as `None` take the server's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    /// The owner of the transaction.
    pub user_id: UserId,
    /// Whether money came in or went out.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// The amount of money.
    pub amount: f64,
    /// What the transaction was for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// A free-form category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// How the transaction was paid, `cash` by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    /// Where the money came from, `other` by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fund_source: Option<FundSource>,
    /// The day of the transaction, today by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_date: Option<Date>,
}

impl TransactionDraft {
    /// A draft with only the required fields set.
    pub fn new(user_id: UserId, transaction_type: TransactionType, amount: f64) -> Self {
        Self {
            user_id,
            transaction_type,
            amount,
            description: None,
            category: None,
            payment_method: None,
            fund_source: None,
            transaction_date: None,
        }
    }
}

/// The fields to change on a transaction. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransactionPatch {
    /// The new type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<TransactionType>,
    /// The new amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// The new description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The new category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// The new payment method.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    /// The new source of funds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fund_source: Option<FundSource>,
    /// The new date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_date: Option<Date>,
}

/// Which of a user's transactions to list.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransactionFilter {
    /// Only list this type, or every type when `None`.
    pub transaction_type: Option<TransactionType>,
    /// Only list transactions in this period.
    pub period: Period,
    /// The maximum number of transactions, the server's default when `None`.
    pub limit: Option<u32>,
}

/// The body for sending a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageDraft {
    /// The sender.
    pub sender_id: UserId,
    /// The recipient.
    pub recipient_id: UserId,
    /// The text of the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// An attached file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    /// The kind of message, inferred by the server when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    /// The message this one replies to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replied_to_message_id: Option<i64>,
    /// Free-form data for the recipient's client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl MessageDraft {
    /// A plain text message.
    pub fn text(sender_id: UserId, recipient_id: UserId, content: impl Into<String>) -> Self {
        Self {
            sender_id,
            recipient_id,
            content: Some(content.into()),
            file_url: None,
            message_type: None,
            replied_to_message_id: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Read the `data` field of a successful response, or turn an error status
/// into [ClientError::Api].
pub(crate) fn decode_data<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ClientError> {
    check_status(response)?;

    let envelope: DataEnvelope<T> = serde_json::from_slice(&response.body)?;

    Ok(envelope.data)
}

/// Turn an error status into [ClientError::Api].
pub(crate) fn check_status(response: &HttpResponse) -> Result<(), ClientError> {
    if response.is_success() {
        return Ok(());
    }

    let message = serde_json::from_slice::<ErrorBody>(&response.body)
        .map(|body| body.error)
        .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned());

    Err(ClientError::Api {
        status: response.status,
        message,
    })
}

/// Makes typed calls to the API at `base_url`.
#[derive(Clone)]
pub struct ApiClient {
    network: Arc<dyn Network>,
    base_url: Url,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client for the server at `base_url`.
    pub fn new(network: Arc<dyn Network>, base_url: Url) -> Self {
        Self { network, base_url }
    }

    /// The server the client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The absolute URL for `path` with the query pairs appended.
    ///
    /// # Errors
    /// Returns [ClientError::InvalidUrl] if `path` is not a valid relative URL.
    pub fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ClientError> {
        let mut url = self.base_url.join(path)?;

        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(key, value)| (*key, value.as_str())));
        }

        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, ClientError> {
        let response = self.network.fetch(&request).await?;

        decode_data(&response)
    }

    async fn send_without_data(&self, request: HttpRequest) -> Result<(), ClientError> {
        let response = self.network.fetch(&request).await?;

        check_status(&response)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        self.send(HttpRequest::get(self.url(path, query)?)).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, ClientError> {
        let request = HttpRequest::with_json(method, self.url(path, &[])?, body)?;

        self.send(request).await
    }

    /// List a user's transactions, newest first.
    ///
    /// # Errors
    /// Returns an error if the request failed or the API rejected it.
    pub async fn list_transactions(
        &self,
        user_id: &UserId,
        filter: TransactionFilter,
    ) -> Result<Vec<Transaction>, ClientError> {
        let mut query = vec![("userId", user_id.to_string())];
        if let Some(transaction_type) = filter.transaction_type {
            query.push(("type", transaction_type.to_string()));
        }
        if filter.period != Period::All {
            query.push(("period", filter.period.as_str().to_owned()));
        }
        if let Some(limit) = filter.limit {
            query.push(("limit", limit.to_string()));
        }

        self.get(endpoints::TRANSACTIONS_API, &query).await
    }

    /// Record a new transaction.
    ///
    /// # Errors
    /// Returns an error if the request failed or the API rejected it.
    pub async fn create_transaction(
        &self,
        draft: &TransactionDraft,
    ) -> Result<Transaction, ClientError> {
        self.send_json(Method::POST, endpoints::TRANSACTIONS_API, draft)
            .await
    }

    /// Change a transaction owned by the signed-in user.
    ///
    /// # Errors
    /// Returns an error if the request failed or the API rejected it.
    pub async fn update_transaction(
        &self,
        id: &str,
        patch: &TransactionPatch,
    ) -> Result<Transaction, ClientError> {
        self.send_json(
            Method::PUT,
            &format_endpoint(endpoints::TRANSACTION, id),
            patch,
        )
        .await
    }

    /// Delete a transaction owned by the signed-in user.
    ///
    /// # Errors
    /// Returns an error if the request failed or the API rejected it.
    pub async fn delete_transaction(&self, id: &str) -> Result<(), ClientError> {
        let url = self.url(&format_endpoint(endpoints::TRANSACTION, id), &[])?;

        self.send_without_data(HttpRequest {
            method: Method::DELETE,
            url,
            body: None,
        })
        .await
    }

    /// The latest messages between two users, oldest first.
    ///
    /// # Errors
    /// Returns an error if the request failed or the API rejected it.
    pub async fn list_messages(
        &self,
        user_id: &UserId,
        contact_id: &UserId,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ClientError> {
        let mut query = vec![
            ("userId", user_id.to_string()),
            ("contactId", contact_id.to_string()),
        ];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        self.get(endpoints::MESSAGES_API, &query).await
    }

    /// Send a message.
    ///
    /// # Errors
    /// Returns an error if the request failed or the API rejected it.
    pub async fn send_message(&self, draft: &MessageDraft) -> Result<Message, ClientError> {
        self.send_json(Method::POST, endpoints::MESSAGES_API, draft)
            .await
    }

    /// Every profile, ordered by first name.
    ///
    /// # Errors
    /// Returns an error if the request failed or the API rejected it.
    pub async fn list_profiles(&self) -> Result<Vec<Profile>, ClientError> {
        self.get(endpoints::PROFILES_API, &[]).await
    }

    /// The profile of one user.
    ///
    /// # Errors
    /// Returns an error if the request failed or the API rejected it.
    pub async fn get_profile(&self, user_id: &UserId) -> Result<Profile, ClientError> {
        self.get(endpoints::PROFILES_API, &[("userId", user_id.to_string())])
            .await
    }

    /// The dashboard summary for a user.
    ///
    /// # Errors
    /// Returns an error if the request failed or the API rejected it.
    pub async fn stats(&self, user_id: &UserId) -> Result<Stats, ClientError> {
        self.get(endpoints::STATS_API, &[("userId", user_id.to_string())])
            .await
    }

    /// The report for a user over `period`.
    ///
    /// # Errors
    /// Returns an error if the request failed or the API rejected it.
    pub async fn report(&self, user_id: &UserId, period: Period) -> Result<Report, ClientError> {
        self.get(
            endpoints::REPORTS_API,
            &[
                ("userId", user_id.to_string()),
                ("period", period.as_str().to_owned()),
            ],
        )
        .await
    }

    /// Register the device's push token for a user.
    ///
    /// # Errors
    /// Returns an error if the request failed or the API rejected it.
    pub async fn register_fcm_token(
        &self,
        user_id: &UserId,
        token: &str,
    ) -> Result<FcmToken, ClientError> {
        self.send_json(
            Method::POST,
            endpoints::FCM_TOKENS_API,
            &json!({ "token": token, "user_id": user_id }),
        )
        .await
    }

    /// Append an entry to the notification log.
    ///
    /// # Errors
    /// Returns an error if the request failed or the API rejected it.
    pub async fn log_notification(
        &self,
        user_id: Option<&UserId>,
        status: &str,
        details: Option<Value>,
    ) -> Result<NotificationLog, ClientError> {
        self.send_json(
            Method::POST,
            endpoints::NOTIFICATION_LOGS_API,
            &json!({ "user_id": user_id, "status": status, "details": details }),
        )
        .await
    }
}


#[cfg(test)]
mod tests {
    use reqwest::Method;
    use serde_json::json;
    use time::macros::date;

    use crate::{
        Period, TransactionType, UserId,
        client::{ClientError, HttpResponse, NetworkError},
    };

    use super::{
        MessageDraft, TransactionDraft, TransactionFilter, TransactionPatch,
        test_utils::{fake_api, transaction_json, url},
    };

    #[tokio::test]
    async fn list_transactions_sends_filters() {
        let (api, network) = fake_api();
        network.reply(
            Method::GET,
            &url("/api/transactions?userId=u1&type=expense&period=week&limit=10"),
            HttpResponse::json(200, &json!({ "data": [transaction_json("t1", 12.5)] })),
        );

        let transactions = api
            .list_transactions(
                &UserId::new("u1"),
                TransactionFilter {
                    transaction_type: Some(TransactionType::Expense),
                    period: Period::Week,
                    limit: Some(10),
                },
            )
            .await
            .unwrap();

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].amount, 12.5);
        assert_eq!(transactions[0].transaction_date, date!(2025 - 03 - 05));
    }

    #[tokio::test]
    async fn create_transaction_omits_unset_fields() {
        let (api, network) = fake_api();
        network.reply(
            Method::POST,
            &url("/api/transactions"),
            HttpResponse::json(201, &json!({ "data": transaction_json("t1", 5.0) })),
        );

        api.create_transaction(&TransactionDraft::new(
            UserId::new("u1"),
            TransactionType::Expense,
            5.0,
        ))
        .await
        .unwrap();

        let body: serde_json::Value =
            serde_json::from_slice(network.requests()[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({ "user_id": "u1", "type": "expense", "amount": 5.0 }));
    }

    #[tokio::test]
    async fn update_uses_path_id() {
        let (api, network) = fake_api();
        network.reply(
            Method::PUT,
            &url("/api/transactions/t1"),
            HttpResponse::json(200, &json!({ "data": transaction_json("t1", 8.0) })),
        );

        let updated = api
            .update_transaction(
                "t1",
                &TransactionPatch {
                    amount: Some(8.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.amount, 8.0);
    }

    #[tokio::test]
    async fn error_status_becomes_api_error() {
        let (api, network) = fake_api();
        network.reply(
            Method::DELETE,
            &url("/api/transactions/t1"),
            HttpResponse::json(
                404,
                &json!({ "error": "the requested resource could not be found" }),
            ),
        );

        let result = api.delete_transaction("t1").await;

        assert_eq!(
            result,
            Err(ClientError::Api {
                status: 404,
                message: "the requested resource could not be found".to_owned()
            })
        );
    }

    #[tokio::test]
    async fn offline_becomes_network_error() {
        let (api, _network) = fake_api();

        let result = api.stats(&UserId::new("u1")).await;

        assert!(matches!(
            result,
            Err(ClientError::Network(NetworkError::Unreachable(_)))
        ));
    }

    #[tokio::test]
    async fn unexpected_body_is_decode_error() {
        let (api, network) = fake_api();
        network.reply(
            Method::GET,
            &url("/api/stats?userId=u1"),
            HttpResponse::json(200, &json!({ "rows": [] })),
        );

        let result = api.stats(&UserId::new("u1")).await;

        assert!(matches!(result, Err(ClientError::Decode(_))));
    }

    #[tokio::test]
    async fn send_message_posts_draft() {
        let (api, network) = fake_api();
        network.reply(
            Method::POST,
            &url("/api/messages"),
            HttpResponse::json(
                201,
                &json!({ "data": {
                    "id": 1,
                    "sender_id": "u1",
                    "recipient_id": "u2",
                    "message_type": "text",
                    "content": "hi",
                    "file_url": null,
                    "replied_to_message_id": null,
                    "metadata": null,
                    "created_at": "2025-03-05T08:00:00Z",
                    "delivered_at": null,
                    "read_at": null
                } }),
            ),
        );

        let message = api
            .send_message(&MessageDraft::text(UserId::new("u1"), UserId::new("u2"), "hi"))
            .await
            .unwrap();

        assert_eq!(message.content.as_deref(), Some("hi"));
        let body: serde_json::Value =
            serde_json::from_slice(network.requests()[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({ "sender_id": "u1", "recipient_id": "u2", "content": "hi" })
        );
    }
}
