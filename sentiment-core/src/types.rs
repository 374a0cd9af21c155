use crate::CoreError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DELETED_AUTHOR: &str = "[deleted]";
pub const REDDIT_WEB_BASE: &str = "https://reddit.com";

/// Converts Reddit's floating-point epoch seconds into a UTC timestamp.
pub fn timestamp_from_epoch(seconds: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds.trunc() as i64, 0)
        .single()
        .unwrap_or_default()
}

/// Turns a site-relative permalink into an absolute one.
pub fn absolute_permalink(permalink: &str) -> String {
    if permalink.starts_with("http") {
        permalink.to_string()
    } else {
        format!("{}{}", REDDIT_WEB_BASE, permalink)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distinguished {
    Moderator,
    Admin,
    Special,
    #[serde(other)]
    Other,
}

/// Derived attributes produced by the annotation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub summary: String,
    pub sentiment: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_utc: DateTime<Utc>,
    pub permalink: String,
    #[serde(default)]
    pub is_submitter: bool,
    #[serde(default)]
    pub distinguished: Option<Distinguished>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub reply_count: usize,
    #[serde(default)]
    pub depth: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Comment {
    pub fn apply_annotation(&mut self, annotation: Annotation) {
        self.summary = Some(annotation.summary);
        self.sentiment = Some(annotation.sentiment);
        self.stock_action = Some(annotation.action);
        self.error = None;
    }

    /// Records a failed classification with sentinel labels.
    pub fn mark_failed(&mut self, sentinel: &str, error: String) {
        self.summary = Some(String::new());
        self.sentiment = Some(sentinel.to_string());
        self.stock_action = Some("NA".to_string());
        self.error = Some(error);
    }

    pub fn is_annotated(&self) -> bool {
        self.sentiment.is_some() && self.stock_action.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub author: String,
    pub subreddit: String,
    pub score: i64,
    #[serde(default)]
    pub upvote_ratio: Option<f64>,
    #[serde(default)]
    pub num_comments: u64,
    pub created_utc: DateTime<Utc>,
    #[serde(default)]
    pub url: String,
    pub permalink: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub spoiler: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub distinguished: Option<Distinguished>,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub comments_count: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Post {
    pub fn set_comments(&mut self, comments: Vec<Comment>) {
        self.comments_count = comments.len();
        self.comments = comments;
    }

    pub fn apply_summary(&mut self, summary: String) {
        self.post_summary = Some(summary);
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: String) {
        self.post_summary = Some(String::new());
        self.error = Some(error);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Hour,
    Day,
    #[default]
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Hour => "hour",
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFilter {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hour" => Ok(TimeFilter::Hour),
            "day" => Ok(TimeFilter::Day),
            "week" => Ok(TimeFilter::Week),
            "month" => Ok(TimeFilter::Month),
            "year" => Ok(TimeFilter::Year),
            "all" => Ok(TimeFilter::All),
            other => Err(CoreError::InvalidInput {
                message: format!(
                    "unknown time filter '{}' (expected hour, day, week, month, year or all)",
                    other
                ),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Relevance,
    Hot,
    Top,
    New,
    Comments,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Relevance => "relevance",
            SortMode::Hot => "hot",
            SortMode::Top => "top",
            SortMode::New => "new",
            SortMode::Comments => "comments",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "relevance" => Ok(SortMode::Relevance),
            "hot" => Ok(SortMode::Hot),
            "top" => Ok(SortMode::Top),
            "new" => Ok(SortMode::New),
            "comments" => Ok(SortMode::Comments),
            other => Err(CoreError::InvalidInput {
                message: format!(
                    "unknown sort mode '{}' (expected relevance, hot, top, new or comments)",
                    other
                ),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    pub search_executed_at: DateTime<Utc>,
    #[serde(default)]
    pub search_executed_at_readable: String,
    #[serde(default)]
    pub tool_version: String,
}

impl SearchMetadata {
    pub fn now(tool_version: &str) -> Self {
        let now = Utc::now();
        Self {
            search_executed_at: now,
            search_executed_at_readable: now.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            tool_version: tool_version.to_string(),
        }
    }
}

impl Default for SearchMetadata {
    fn default() -> Self {
        Self {
            search_executed_at: DateTime::<Utc>::default(),
            search_executed_at_readable: "Unknown".to_string(),
            tool_version: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParameters {
    pub search_term: String,
    pub limit: u32,
    pub time_filter: TimeFilter,
    pub sort: SortMode,
    pub subreddit: String,
    pub comment_sort: String,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            search_term: "Unknown".to_string(),
            limit: 0,
            time_filter: TimeFilter::default(),
            sort: SortMode::default(),
            subreddit: "all".to_string(),
            comment_sort: "best".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub posts_retrieved: usize,
    pub total_comments: usize,
    pub success: bool,
    #[serde(default)]
    pub output_file: Option<String>,
}

/// The persisted envelope shared by the search, annotate and report stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub metadata: SearchMetadata,
    #[serde(default)]
    pub search_parameters: SearchParameters,
    #[serde(default)]
    pub results_summary: ResultsSummary,
    #[serde(default)]
    pub posts: Vec<Post>,
}

impl SearchResults {
    pub fn new(
        metadata: SearchMetadata,
        search_parameters: SearchParameters,
        posts: Vec<Post>,
    ) -> Self {
        let total_comments = posts.iter().map(|p| p.comments.len()).sum();
        Self {
            metadata,
            search_parameters,
            results_summary: ResultsSummary {
                posts_retrieved: posts.len(),
                total_comments,
                success: !posts.is_empty(),
                output_file: None,
            },
            posts,
        }
    }

    pub fn total_comments(&self) -> usize {
        self.posts.iter().map(|p| p.comments.len()).sum()
    }
}
