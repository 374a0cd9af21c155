use crate::flatten::{flatten_with_report, CommentSource};
use crate::tree::CommentTree;
use crate::RedditClient;
use sentiment_core::{
    CoreError, ErrorExt, FlattenConfig, Post, SearchMetadata, SearchParameters, SearchResults,
};
use tracing::{info, warn};

/// Search plus comment retrieval, on top of placeholder expansion.
pub trait PostSource: CommentSource {
    async fn search_posts(&self, params: &SearchParameters) -> Result<Vec<Post>, CoreError>;
    async fn fetch_comment_tree(&self, post_id: &str) -> Result<CommentTree, CoreError>;
}

impl PostSource for RedditClient {
    async fn search_posts(&self, params: &SearchParameters) -> Result<Vec<Post>, CoreError> {
        self.search(params).await
    }

    async fn fetch_comment_tree(&self, post_id: &str) -> Result<CommentTree, CoreError> {
        self.comment_tree(post_id).await
    }
}

/// Runs a search and attaches each hit's flattened comments.
///
/// A failed search yields an empty envelope; a post whose comments cannot be fetched
/// is left out.
pub async fn harvest<S: PostSource>(
    source: &S,
    params: &SearchParameters,
    config: &FlattenConfig,
    tool_version: &str,
) -> SearchResults {
    let metadata = SearchMetadata::now(tool_version);

    let posts = match source.search_posts(params).await {
        Ok(posts) => posts,
        Err(e) => {
            e.log_error();
            warn!("Search for '{}' failed, returning no posts", params.search_term);
            Vec::new()
        }
    };
    info!(
        "Found {} posts for '{}' in r/{}",
        posts.len(),
        params.search_term,
        params.subreddit
    );

    let total = posts.len();
    let mut harvested = Vec::with_capacity(total);
    for (index, mut post) in posts.into_iter().enumerate() {
        info!("Processing post {}/{}: {}", index + 1, total, post.title);

        let mut tree = match source.fetch_comment_tree(&post.id).await {
            Ok(tree) => tree,
            Err(e) => {
                warn!("Skipping post {}: {}", post.id, e.user_friendly_message());
                continue;
            }
        };

        let report = flatten_with_report(source, &mut tree, config, 0).await;
        if report.aborted() {
            warn!(
                "Comments for post {} are incomplete; expansion stopped early",
                post.id
            );
        }
        info!("Retrieved {} comments for post {}", report.comments.len(), post.id);
        post.set_comments(report.comments);
        harvested.push(post);
    }

    SearchResults::new(metadata, params.clone(), harvested)
}
