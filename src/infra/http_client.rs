use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::app::ports::{ContentPort, DirectoryPort, ProfilePort};
use crate::config::{PipelineConfig, ServicesConfig};
use crate::constants::{CONTENT_SERVICE, DIRECTORY_SERVICE, PROFILE_SERVICE};
use crate::error::{AggregatorError, Result};
use crate::types::{ContentItem, Entity, Page};

const ERROR_BODY_LIMIT: usize = 200;

/// Pre-authenticated bearer token. Never logged.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Shared HTTP client for every adapter, with the configured request timeout.
pub fn build_http_client(config: &ServicesConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .gzip(true)
        .build()?;
    Ok(client)
}

/// REST adapter for the directory, content and profile services, acting with
/// one caller's token.
#[derive(Clone)]
pub struct WorkspaceClient {
    http: reqwest::Client,
    services: ServicesConfig,
    listing: ListingOptions,
    token: AccessToken,
}

#[derive(Debug, Clone)]
struct ListingOptions {
    customer: String,
    max_results: u32,
    order_by: String,
    page_size: u32,
}

impl WorkspaceClient {
    pub fn new(http: reqwest::Client, services: &ServicesConfig, pipeline: &PipelineConfig, token: AccessToken) -> Self {
        Self {
            http,
            services: services.clone(),
            listing: ListingOptions {
                customer: pipeline.customer.clone(),
                max_results: pipeline.max_results,
                order_by: pipeline.order_by.clone(),
                page_size: pipeline.page_size,
            },
            token,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, service: &str, url: &str, query: &[(&str, String)]) -> Result<T> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(self.token.as_str())
            .query(query)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AggregatorError::service(
                service,
                format!("{} {}", status.as_u16(), truncate(&body, ERROR_BODY_LIMIT)),
            ));
        }
        Ok(resp.json::<T>().await?)
    }
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    #[serde(default)]
    users: Vec<DirectoryUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryUser {
    primary_email: Option<String>,
    name: Option<UserName>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserName {
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilesResponse {
    #[serde(default)]
    files: Vec<StoredFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StoredFile {
    // decimal string on the wire
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    messages_total: Option<u64>,
}

#[async_trait]
impl DirectoryPort for WorkspaceClient {
    async fn list_entities(&self) -> Result<Vec<Entity>> {
        let url = format!("{}/admin/directory/v1/users", base(&self.services.directory_base_url));
        let query = [
            ("customer", self.listing.customer.clone()),
            ("maxResults", self.listing.max_results.to_string()),
            ("orderBy", self.listing.order_by.clone()),
        ];
        let response: UsersResponse = self.get_json(DIRECTORY_SERVICE, &url, &query).await?;
        Ok(users_to_entities(response.users))
    }
}

#[async_trait]
impl ContentPort for WorkspaceClient {
    async fn list_page(&self, owner: &str, page_token: Option<&str>) -> Result<Page<ContentItem>> {
        let url = format!("{}/drive/v3/files", base(&self.services.content_base_url));
        let mut query = vec![
            ("q", owner_query(owner)),
            ("pageSize", self.listing.page_size.to_string()),
            ("fields", "files(size), nextPageToken".to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        let response: FilesResponse = self.get_json(CONTENT_SERVICE, &url, &query).await?;
        let items = response
            .files
            .into_iter()
            .map(|file| ContentItem {
                size_bytes: parse_size(file.size.as_deref()),
            })
            .collect();
        Ok(Page {
            items,
            next_page_token: response.next_page_token,
        })
    }
}

#[async_trait]
impl ProfilePort for WorkspaceClient {
    async fn message_count(&self, entity_id: &str) -> Result<u64> {
        let url = profile_url(&self.services.profile_base_url, entity_id)?;
        let response: ProfileResponse = self.get_json(PROFILE_SERVICE, url.as_str(), &[]).await?;
        Ok(response.messages_total.unwrap_or(0))
    }
}

fn base(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Profile endpoint for one member; the id is escaped as a single path segment.
fn profile_url(base_url: &str, entity_id: &str) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(base_url)
        .map_err(|e| AggregatorError::Config(format!("invalid profile base URL '{}': {}", base_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| AggregatorError::Config(format!("profile base URL '{}' cannot carry a path", base_url)))?
        .pop_if_empty()
        .extend(["gmail", "v1", "users", entity_id, "profile"]);
    Ok(url)
}

/// Items owned by `owner` that are not in the trash.
pub fn owner_query(owner: &str) -> String {
    let escaped = owner.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}' in owners and trashed=false", escaped)
}

/// Sizes arrive as decimal strings; anything unparsable counts as no size.
fn parse_size(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse().ok())
}

fn users_to_entities(users: Vec<DirectoryUser>) -> Vec<Entity> {
    users
        .into_iter()
        .filter_map(|user| match user.primary_email {
            Some(email) if !email.is_empty() => {
                let display_name = user.name.and_then(|n| n.full_name).unwrap_or_default();
                Some(Entity::new(email, display_name))
            }
            _ => {
                warn!("Skipping directory member without a primary email");
                None
            }
        })
        .collect()
}

fn truncate(body: &str, limit: usize) -> &str {
    match body.char_indices().nth(limit) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_query_excludes_trash_and_escapes_quotes() {
        assert_eq!(owner_query("ada@example.com"), "'ada@example.com' in owners and trashed=false");
        assert_eq!(owner_query("o'neil@example.com"), "'o\\'neil@example.com' in owners and trashed=false");
    }

    #[test]
    fn profile_url_escapes_the_member_id() {
        let url = profile_url("https://gmail.example.test/", "ada@example.com").unwrap();
        assert_eq!(url.as_str(), "https://gmail.example.test/gmail/v1/users/ada@example.com/profile");

        let url = profile_url("https://gmail.example.test", "a/b?c#d").unwrap();
        assert_eq!(url.as_str(), "https://gmail.example.test/gmail/v1/users/a%2Fb%3Fc%23d/profile");

        let url = profile_url("http://127.0.0.1:9000/proxy/", "grace@example.com").unwrap();
        assert_eq!(url.path(), "/proxy/gmail/v1/users/grace@example.com/profile");

        assert!(matches!(profile_url("not a url", "x"), Err(AggregatorError::Config(_))));
    }

    #[test]
    fn sizes_parse_from_decimal_strings() {
        assert_eq!(parse_size(Some("1048576")), Some(1_048_576));
        assert_eq!(parse_size(Some("not-a-number")), None);
        assert_eq!(parse_size(None), None);
    }

    #[test]
    fn users_without_email_are_skipped_and_names_default_to_empty() {
        let response: UsersResponse = serde_json::from_str(
            r#"{"users":[
                {"primaryEmail":"ada@example.com","name":{"fullName":"Ada Lovelace"}},
                {"name":{"fullName":"No Mail"}},
                {"primaryEmail":"grace@example.com"}
            ]}"#,
        )
        .unwrap();
        let entities = users_to_entities(response.users);
        assert_eq!(
            entities,
            vec![
                Entity::new("ada@example.com", "Ada Lovelace"),
                Entity::new("grace@example.com", ""),
            ]
        );
    }

    #[test]
    fn file_listing_keeps_only_sizes() {
        let files: FilesResponse = serde_json::from_str(
            r#"{"files":[{"id":"a","size":"42"},{"id":"b"}],"nextPageToken":"t2"}"#,
        )
        .unwrap();
        let sizes: Vec<Option<u64>> = files.files.iter().map(|f| parse_size(f.size.as_deref())).collect();
        assert_eq!(sizes, vec![Some(42), None]);
        assert_eq!(files.next_page_token.as_deref(), Some("t2"));
    }

    #[test]
    fn empty_listing_body_has_no_users() {
        let response: UsersResponse = serde_json::from_str("{}").unwrap();
        assert!(response.users.is_empty());
        let files: FilesResponse = serde_json::from_str("{}").unwrap();
        assert!(files.files.is_empty());
        assert!(files.next_page_token.is_none());
    }

    #[test]
    fn token_debug_is_redacted() {
        assert_eq!(format!("{:?}", AccessToken::new("secret")), "AccessToken(***)");
    }
}
