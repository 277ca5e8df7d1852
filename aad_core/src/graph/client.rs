use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use super::auth::ClientSecretCredential;
use super::dto::{ApplicationRecord, GraphErrorResponse, GraphPage, SignInRecord};
use super::pagination::{Page, PageFetcher, PageIterator};
use crate::error::{CleanerError, CleanerResult};
use crate::helpers::config::CleanerConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const APPLICATION_SELECT: &str = "id,appId,displayName,createdDateTime,tags";
const SIGN_IN_EVENT_TYPES: [&str; 4] = [
    "interactiveUser",
    "nonInteractiveUser",
    "servicePrincipal",
    "managedIdentity",
];

/// The directory operations the cleaner depends on.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Every application registration matching `filter`, across all pages.
    async fn list_applications(&self, filter: &str) -> CleanerResult<Vec<ApplicationRecord>>;

    /// The most recent sign-in for `app_id`, if there is one.
    async fn latest_sign_ins(&self, app_id: &str) -> CleanerResult<Vec<SignInRecord>>;

    async fn delete_application(&self, id: &str) -> CleanerResult<()>;
}

pub struct GraphClient {
    http: Client,
    base_url: String,
    credential: ClientSecretCredential,
}

impl GraphClient {
    pub fn new(config: &CleanerConfig) -> CleanerResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("aad-cleaner/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let credential = ClientSecretCredential::new(http.clone(), config);

        Ok(Self {
            http,
            base_url: config.graph_base_url.trim_end_matches('/').to_string(),
            credential,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> CleanerResult<Response> {
        let token = self.credential.access_token().await?;
        let response = request
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(graph_error(response).await)
        }
    }

    async fn get_page<T: DeserializeOwned>(&self, request: RequestBuilder) -> CleanerResult<Page<T>> {
        let response = self.send(request).await?;
        let body = response.text().await?;
        let page: GraphPage<T> = serde_json::from_str(&body)?;
        Ok(page.into())
    }
}

#[async_trait]
impl<T> PageFetcher<T> for GraphClient
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch_page(&self, next_link: &str) -> CleanerResult<Page<T>> {
        // Advanced queries need the consistency header on every page, not just the first.
        let request = self
            .http
            .get(next_link)
            .header("ConsistencyLevel", "eventual");
        self.get_page(request).await
    }
}

#[async_trait]
impl DirectoryService for GraphClient {
    async fn list_applications(&self, filter: &str) -> CleanerResult<Vec<ApplicationRecord>> {
        let request = self
            .http
            .get(self.url("applications"))
            .query(&[
                ("$select", APPLICATION_SELECT),
                ("$orderby", "displayName"),
                ("$count", "true"),
                ("$filter", filter),
            ])
            .header("ConsistencyLevel", "eventual");

        let first: Page<ApplicationRecord> = self.get_page(request).await?;
        let applications = PageIterator::new(first, self).collect_all().await?;

        log::info!("Found {} application registrations", applications.len());
        Ok(applications)
    }

    async fn latest_sign_ins(&self, app_id: &str) -> CleanerResult<Vec<SignInRecord>> {
        let filter = sign_in_filter(app_id);
        let request = self.http.get(self.url("auditLogs/signIns")).query(&[
            ("$filter", filter.as_str()),
            ("$orderby", "createdDateTime desc"),
            ("$top", "1"),
        ]);

        // An empty page can still carry a cursor, so walk pages until the
        // first record turns up and stop there.
        let first: Page<SignInRecord> = self.get_page(request).await?;
        let mut found = Vec::new();
        PageIterator::new(first, self)
            .iterate(|sign_in| {
                found.push(sign_in);
                false
            })
            .await?;
        Ok(found)
    }

    async fn delete_application(&self, id: &str) -> CleanerResult<()> {
        let url = self.url(&format!("applications/{}", urlencoding::encode(id)));
        self.send(self.http.delete(url)).await?;
        Ok(())
    }
}

pub fn sign_in_filter(app_id: &str) -> String {
    let event_types = SIGN_IN_EVENT_TYPES
        .iter()
        .map(|event_type| format!("t eq '{}'", event_type))
        .collect::<Vec<_>>()
        .join(" or ");

    format!(
        "signInEventTypes/any(t: {}) and appId eq '{}'",
        event_types,
        escape_odata_literal(app_id)
    )
}

fn escape_odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

async fn graph_error(response: Response) -> CleanerError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let body = match serde_json::from_str::<GraphErrorResponse>(&body) {
        Ok(parsed) => match (parsed.error.code, parsed.error.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (None, Some(message)) => message,
            (Some(code), None) => code,
            (None, None) => body,
        },
        Err(_) => body,
    };

    CleanerError::Graph { status, body }
}
