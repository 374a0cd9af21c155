use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use reqwest::{Client, Method, Response};
use sentiment_core::{
    absolute_permalink, timestamp_from_epoch, ConfigError, CoreError, Distinguished, Post,
    RedditApiError, SearchParameters,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

/// Reddit refuses `morechildren` requests carrying more ids than this.
pub const MORE_CHILDREN_MAX_IDS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub upvote_ratio: Option<f64>,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub spoiler: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub distinguished: Option<Distinguished>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditUserData {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub link_karma: i64,
    #[serde(default)]
    pub comment_karma: i64,
}

/// The `data` object of a `t1` thing, minus its `replies`.
///
/// Every field is optional; whether a node carries enough to become a comment is
/// decided when the tree is flattened.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawCommentData {
    pub id: Option<String>,
    pub name: Option<String>,
    pub parent_id: Option<String>,
    pub author: Option<String>,
    pub body: Option<String>,
    pub score: Option<i64>,
    pub created_utc: Option<f64>,
    pub permalink: Option<String>,
    pub is_submitter: Option<bool>,
    pub distinguished: Option<Distinguished>,
    #[serde(default, deserialize_with = "edited_flag")]
    pub edited: bool,
}

/// The `data` object of a `more` thing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MorePlaceholder {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub depth: usize,
    #[serde(default)]
    pub children: Vec<String>,
}

impl MorePlaceholder {
    /// A "continue this thread" link: no child ids, only reachable by re-fetching the
    /// thread focused on the parent comment.
    pub fn is_continue_thread(&self) -> bool {
        self.children.is_empty()
    }

    /// Identity used to notice a placeholder coming back unchanged after resolution.
    pub fn key(&self) -> String {
        format!("{}:{}", self.parent_id, self.children.join(","))
    }
}

// `edited` is `false` or the edit timestamp.
fn edited_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(flag) => flag,
        serde_json::Value::Number(_) => true,
        _ => false,
    })
}

#[derive(Debug, Deserialize)]
struct MoreChildrenResponse {
    json: MoreChildrenJson,
}

#[derive(Debug, Deserialize)]
struct MoreChildrenJson {
    #[serde(default)]
    errors: Vec<serde_json::Value>,
    #[serde(default)]
    data: Option<MoreChildrenData>,
}

#[derive(Debug, Deserialize)]
struct MoreChildrenData {
    #[serde(default)]
    things: Vec<serde_json::Value>,
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: RateLimiter,
    base_url: Url,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(user_agent: &str) -> Result<Self, CoreError> {
        Self::with_base_url(user_agent, REDDIT_API_BASE)
    }

    pub fn with_base_url(user_agent: &str, base_url: &str) -> Result<Self, CoreError> {
        let base_url = Url::parse(base_url).map_err(|e| ConfigError::InvalidValue {
            field: "reddit_api_base".to_string(),
            value: format!("{} ({})", base_url, e),
        })?;

        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::new(RateLimitConfig::reddit_oauth()),
            base_url,
            user_agent: user_agent.to_string(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: Option<&[(&str, &str)]>,
    ) -> Result<Response, CoreError> {
        let url = self.base_url.join(endpoint).map_err(|e| CoreError::InvalidInput {
            message: format!("invalid endpoint {}: {}", endpoint, e),
        })?;

        self.rate_limiter.acquire_permit().await;

        let mut request_builder = self
            .http_client
            .request(method.clone(), url)
            .bearer_auth(access_token)
            .header("User-Agent", &self.user_agent);

        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }

        info!("Making Reddit API request: {} {}", method, endpoint);
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    return Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
                }
                return Err(CoreError::Network(e));
            }
        };

        self.observe_rate_limit_headers(&response).await;

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        match status.as_u16() {
            429 => {
                let retry_seconds = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!("Rate limited, retry after {} seconds", retry_seconds);
                Err(CoreError::RedditApi(RedditApiError::RateLimitExceeded {
                    retry_after: retry_seconds,
                }))
            }
            401 => Err(CoreError::RedditApi(RedditApiError::InvalidToken)),
            403 => Err(CoreError::RedditApi(RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            })),
            404 => Err(not_found_error(endpoint)),
            code if status.is_server_error() => {
                Err(CoreError::RedditApi(RedditApiError::ServerError { status_code: code }))
            }
            code => Err(CoreError::RequestFailed {
                message: format!("{} {} returned {}", method, endpoint, status),
                status_code: Some(code),
            }),
        }
    }

    async fn observe_rate_limit_headers(&self, response: &Response) {
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_string())
        };
        let remaining = header("x-ratelimit-remaining").and_then(|v| v.parse::<f64>().ok());
        let reset = header("x-ratelimit-reset").and_then(|v| v.parse::<u64>().ok());
        self.rate_limiter.observe_server_window(remaining, reset).await;
    }

    pub async fn get_user_info(&self, access_token: &str) -> Result<RedditUserData, CoreError> {
        let response = self
            .make_request(Method::GET, "/api/v1/me", access_token, None)
            .await?;

        let user_data: RedditUserData = response.json().await.map_err(|e| {
            error!("Failed to parse user data: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: "Failed to parse user data".to_string(),
            })
        })?;

        debug!("Retrieved user info for: {}", user_data.name);
        Ok(user_data)
    }

    /// Keyword search across one subreddit, or across the whole site for `all`.
    pub async fn search_posts(
        &self,
        access_token: &str,
        params: &SearchParameters,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let subreddit = if params.subreddit.trim().is_empty() {
            "all"
        } else {
            params.subreddit.trim()
        };
        let endpoint = format!("/r/{}/search", subreddit);
        let limit = params.limit.to_string();
        let restrict_sr = if subreddit.eq_ignore_ascii_case("all") {
            "false"
        } else {
            "true"
        };

        let query = [
            ("q", params.search_term.as_str()),
            ("sort", params.sort.as_str()),
            ("t", params.time_filter.as_str()),
            ("limit", limit.as_str()),
            ("restrict_sr", restrict_sr),
            ("type", "link"),
            ("raw_json", "1"),
        ];

        let response = self
            .make_request(Method::GET, &endpoint, access_token, Some(query.as_slice()))
            .await?;

        let listing: RedditListing<RedditPostData> = response.json().await.map_err(|e| {
            error!("Failed to parse search results: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse search results for '{}'", params.search_term),
            })
        })?;

        info!(
            "Search for '{}' in r/{} returned {} posts",
            params.search_term,
            subreddit,
            listing.data.children.len()
        );
        Ok(listing)
    }

    /// Fetches a post's comment listing.
    ///
    /// With `focus_comment` set, the listing is rooted at that comment; this is how
    /// "continue this thread" links are followed.
    pub async fn get_comments(
        &self,
        access_token: &str,
        post_id: &str,
        sort: &str,
        focus_comment: Option<&str>,
    ) -> Result<serde_json::Value, CoreError> {
        let endpoint = format!("/comments/{}", post_id);
        let mut query = vec![("sort", sort), ("raw_json", "1")];
        if let Some(comment) = focus_comment {
            query.push(("comment", comment));
        }

        let response = self
            .make_request(Method::GET, &endpoint, access_token, Some(query.as_slice()))
            .await?;

        // [post listing, comment listing]
        let mut pair: Vec<serde_json::Value> = response.json().await.map_err(|e| {
            error!("Failed to parse comments for {}: {}", post_id, e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse comments for post {}", post_id),
            })
        })?;

        if pair.len() < 2 {
            return Err(CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Comment response for post {} has no comment listing", post_id),
            }));
        }
        Ok(pair.swap_remove(1))
    }

    /// Expands up to [`MORE_CHILDREN_MAX_IDS`] collapsed comment ids.
    pub async fn get_more_children(
        &self,
        access_token: &str,
        link_fullname: &str,
        children: &[String],
        sort: &str,
    ) -> Result<Vec<serde_json::Value>, CoreError> {
        if children.len() > MORE_CHILDREN_MAX_IDS {
            return Err(CoreError::InvalidInput {
                message: format!(
                    "morechildren accepts at most {} ids, got {}",
                    MORE_CHILDREN_MAX_IDS,
                    children.len()
                ),
            });
        }

        let ids = children.join(",");
        let query = [
            ("api_type", "json"),
            ("link_id", link_fullname),
            ("children", ids.as_str()),
            ("sort", sort),
            ("raw_json", "1"),
        ];

        let response = self
            .make_request(Method::GET, "/api/morechildren", access_token, Some(query.as_slice()))
            .await?;

        let parsed: MoreChildrenResponse = response.json().await.map_err(|e| {
            error!("Failed to parse morechildren response: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: "Failed to parse morechildren response".to_string(),
            })
        })?;

        if !parsed.json.errors.is_empty() {
            return Err(CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("morechildren errors: {:?}", parsed.json.errors),
            }));
        }

        let things = parsed.json.data.map(|d| d.things).unwrap_or_default();
        debug!("morechildren returned {} things for {}", things.len(), link_fullname);
        Ok(things)
    }
}

/// A 404 names a thread or subreddit that is gone; none of these are worth retrying.
fn not_found_error(endpoint: &str) -> CoreError {
    let mut segments = endpoint.trim_start_matches('/').split('/');
    match (segments.next(), segments.next()) {
        (Some("comments"), Some(post_id)) => CoreError::RedditApi(RedditApiError::PostNotFound {
            post_id: post_id.to_string(),
        }),
        (Some("r"), Some(subreddit)) => CoreError::RedditApi(RedditApiError::SubredditNotFound {
            subreddit: subreddit.to_string(),
        }),
        _ => CoreError::NotFound {
            resource: endpoint.to_string(),
        },
    }
}

impl From<RedditPostData> for Post {
    fn from(post_data: RedditPostData) -> Self {
        Self {
            id: post_data.id,
            title: post_data.title,
            author: post_data
                .author
                .unwrap_or_else(|| sentiment_core::DELETED_AUTHOR.to_string()),
            subreddit: post_data.subreddit,
            score: post_data.score,
            upvote_ratio: post_data.upvote_ratio,
            num_comments: post_data.num_comments,
            created_utc: timestamp_from_epoch(post_data.created_utc),
            url: post_data.url,
            permalink: absolute_permalink(&post_data.permalink),
            selftext: post_data.selftext,
            is_self: post_data.is_self,
            over_18: post_data.over_18,
            spoiler: post_data.spoiler,
            locked: post_data.locked,
            distinguished: post_data.distinguished,
            stickied: post_data.stickied,
            comments: Vec::new(),
            comments_count: 0,
            post_summary: None,
            error: None,
        }
    }
}
