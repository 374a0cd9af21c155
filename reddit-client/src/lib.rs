pub mod api;
pub mod flatten;
pub mod rate_limiter;
pub mod retry;
pub mod search;
pub mod tree;

#[cfg(test)]
mod tests;

pub use api::{
    MorePlaceholder, RawCommentData, RedditApiClient, RedditUserData, REDDIT_API_BASE,
};
pub use flatten::{
    flatten_comments, flatten_with_report, BatchOutcome, CommentSource, FlattenReport,
};
pub use search::{harvest, PostSource};
pub use tree::{CommentTree, RawThing};

use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, ResourceOwnerPassword,
    ResourceOwnerUsername, Scope, TokenResponse, TokenUrl,
};
use sentiment_core::{
    ConfigError, CoreError, Post, RedditApiError, RedditCredentials, SearchParameters,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

pub const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
    pub scope: Vec<String>,
}

impl RedditToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() + EXPIRY_MARGIN >= self.expires_at
    }
}

/// Authenticated Reddit client.
///
/// Uses the password grant when account credentials are configured and the
/// application-only client-credentials grant otherwise. Tokens are fetched lazily and
/// renewed shortly before they expire.
pub struct RedditClient {
    credentials: RedditCredentials,
    oauth_client: BasicClient,
    api: RedditApiClient,
    token: Mutex<Option<RedditToken>>,
    comment_sort: String,
}

impl RedditClient {
    pub fn new(credentials: RedditCredentials) -> Result<Self, CoreError> {
        Self::with_endpoints(credentials, REDDIT_API_BASE, REDDIT_TOKEN_URL)
    }

    pub fn with_endpoints(
        credentials: RedditCredentials,
        api_base: &str,
        token_url: &str,
    ) -> Result<Self, CoreError> {
        let invalid_url = |field: &str, value: &str, e: url::ParseError| {
            CoreError::from(ConfigError::InvalidValue {
                field: field.to_string(),
                value: format!("{} ({})", value, e),
            })
        };

        let oauth_client = BasicClient::new(
            ClientId::new(credentials.client_id.clone()),
            Some(ClientSecret::new(credentials.client_secret.clone())),
            AuthUrl::new(REDDIT_AUTH_URL.to_string())
                .map_err(|e| invalid_url("auth_url", REDDIT_AUTH_URL, e))?,
            Some(
                TokenUrl::new(token_url.to_string())
                    .map_err(|e| invalid_url("token_url", token_url, e))?,
            ),
        );

        let api = RedditApiClient::with_base_url(&credentials.user_agent, api_base)?;

        Ok(Self {
            credentials,
            oauth_client,
            api,
            token: Mutex::new(None),
            comment_sort: "best".to_string(),
        })
    }

    pub fn with_comment_sort(mut self, sort: &str) -> Self {
        self.comment_sort = sort.to_string();
        self
    }

    pub fn comment_sort(&self) -> &str {
        &self.comment_sort
    }

    pub fn uses_password_grant(&self) -> bool {
        self.credentials.username.is_some() && self.credentials.password.is_some()
    }

    pub fn get_required_scopes(&self) -> Vec<&'static str> {
        if self.uses_password_grant() {
            vec!["identity", "read"]
        } else {
            vec!["read"]
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token
            .lock()
            .await
            .as_ref()
            .map(|token| !token.is_expired())
            .unwrap_or(false)
    }

    pub async fn set_token(&self, token: RedditToken) {
        *self.token.lock().await = Some(token);
    }

    /// Forgets the current token so the next request authenticates again.
    pub async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    pub async fn authenticate(&self) -> Result<RedditToken, CoreError> {
        let scopes: Vec<Scope> = self
            .get_required_scopes()
            .into_iter()
            .map(|s| Scope::new(s.to_string()))
            .collect();
        let user_agent = self.credentials.user_agent.clone();
        let http_client = move |request: HttpRequest| send_token_request(user_agent, request);

        let response = match (&self.credentials.username, &self.credentials.password) {
            (Some(username), Some(password)) => {
                info!("Authenticating with Reddit as {}", username);
                let username = ResourceOwnerUsername::new(username.clone());
                let password = ResourceOwnerPassword::new(password.clone());
                self.oauth_client
                    .exchange_password(&username, &password)
                    .add_scopes(scopes)
                    .request_async(http_client)
                    .await
            }
            _ => {
                info!("Authenticating with Reddit using application-only credentials");
                self.oauth_client
                    .exchange_client_credentials()
                    .add_scopes(scopes)
                    .request_async(http_client)
                    .await
            }
        };

        let response = response.map_err(|e| {
            error!("Reddit token request failed: {}", e);
            CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                reason: e.to_string(),
            })
        })?;

        let token = RedditToken {
            access_token: response.access_token().secret().clone(),
            expires_at: SystemTime::now() + response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME),
            scope: response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default(),
        };

        debug!("Obtained Reddit token with scopes {:?}", token.scope);
        *self.token.lock().await = Some(token.clone());
        Ok(token)
    }

    /// Returns a valid access token, authenticating first if needed.
    pub async fn ensure_authenticated(&self) -> Result<String, CoreError> {
        if let Some(token) = self.token.lock().await.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
            debug!("Reddit token expired, renewing");
        }
        Ok(self.authenticate().await?.access_token)
    }

    // A 401 means the token went stale server-side.
    async fn checked<T>(&self, result: Result<T, CoreError>) -> Result<T, CoreError> {
        if let Err(CoreError::RedditApi(RedditApiError::InvalidToken)) = &result {
            self.invalidate_token().await;
        }
        result
    }

    /// The authenticated account, or `None` for application-only access.
    pub async fn current_user(&self) -> Result<Option<RedditUserData>, CoreError> {
        if !self.uses_password_grant() {
            return Ok(None);
        }
        let token = self.ensure_authenticated().await?;
        let result = self.api.get_user_info(&token).await;
        self.checked(result).await.map(Some)
    }

    pub async fn search(&self, params: &SearchParameters) -> Result<Vec<Post>, CoreError> {
        let token = self.ensure_authenticated().await?;
        let result = self.api.search_posts(&token, params).await;
        let listing = self.checked(result).await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| Post::from(child.data))
            .collect())
    }

    pub async fn comment_tree(&self, post_id: &str) -> Result<CommentTree, CoreError> {
        let token = self.ensure_authenticated().await?;
        let result = self
            .api
            .get_comments(&token, post_id, &self.comment_sort, None)
            .await;
        let listing = self.checked(result).await?;
        Ok(CommentTree::from_listing(post_id, listing))
    }

    async fn expand_placeholder(
        &self,
        link_fullname: &str,
        placeholder: &MorePlaceholder,
    ) -> Result<Vec<RawThing>, CoreError> {
        let token = self.ensure_authenticated().await?;

        if placeholder.is_continue_thread() {
            let post_id = link_fullname.trim_start_matches("t3_");
            let focus = placeholder.parent_id.trim_start_matches("t1_");
            debug!("Following continued thread under {}", placeholder.parent_id);
            let result = self
                .api
                .get_comments(&token, post_id, &self.comment_sort, Some(focus))
                .await;
            let listing = self.checked(result).await?;
            return Ok(tree::things_from_listing(listing));
        }

        let mut things = Vec::new();
        for chunk in placeholder.children.chunks(api::MORE_CHILDREN_MAX_IDS) {
            let result = self
                .api
                .get_more_children(&token, link_fullname, chunk, &self.comment_sort)
                .await;
            let values = self.checked(result).await?;
            things.extend(tree::things_from_values(values));
        }
        Ok(things)
    }
}

impl CommentSource for RedditClient {
    async fn resolve_placeholders(
        &self,
        link_fullname: &str,
        batch: &[MorePlaceholder],
    ) -> Result<Vec<Vec<RawThing>>, CoreError> {
        let mut groups = Vec::with_capacity(batch.len());
        for placeholder in batch {
            groups.push(self.expand_placeholder(link_fullname, placeholder).await?);
        }
        Ok(groups)
    }
}

/// Token requests go through our own reqwest client so they carry the configured
/// User-Agent; Reddit throttles requests that use a generic one.
async fn send_token_request(
    user_agent: String,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(30))
        .build()?;

    let mut builder = client
        .request(request.method, request.url.as_str())
        .body(request.body);
    for (name, value) in request.headers.iter() {
        builder = builder.header(name, value);
    }

    let response = builder.send().await?;
    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}
