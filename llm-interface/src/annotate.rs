use crate::TextGenerator;
use sentiment_core::{AnnotateConfig, Annotation, CoreError, ErrorExt, Post};
use tracing::{debug, info, warn};

pub const DEFAULT_SUMMARY: &str = "No summary available";
pub const DEFAULT_SENTIMENT: &str = "neutral";
pub const DEFAULT_ACTION: &str = "na";

pub fn summary_prompt(title: &str, selftext: &str) -> String {
    format!(
        "You are a financial summarizer. Given the title and selftext of a Reddit post, \
         summarize its core message in 1-3 sentences.\n\n\
         ### TITLE:\n{title}\n\n\
         ### SELF TEXT:\n{selftext}\n\n\
         Respond with just the summary text."
    )
}

pub fn classification_prompt(comment_body: &str, post_summary: &str) -> String {
    format!(
        "You are a financial assistant. Given a Reddit comment and the post summary it is \
         replying to, analyze it and respond with exactly 3 lines:\n\n\
         SUMMARY: [1-sentence summary of the comment]\n\
         SENTIMENT: [positive/neutral/negative]\n\
         ACTION: [buy/sell/hold/NA]\n\n\
         ### POST SUMMARY:\n{post_summary}\n\n\
         ### COMMENT:\n{comment_body}\n\n\
         Remember: Respond with exactly 3 lines starting with SUMMARY:, SENTIMENT:, and ACTION:"
    )
}

/// Summarizes a post in one call. Errors are returned as-is; there is no retry.
pub async fn summarize<G: TextGenerator>(
    generator: &G,
    title: &str,
    selftext: &str,
    config: &AnnotateConfig,
) -> Result<String, CoreError> {
    generator
        .generate(
            &summary_prompt(title, selftext),
            config.temperature,
            config.summary_max_tokens,
        )
        .await
}

pub async fn classify<G: TextGenerator>(
    generator: &G,
    comment_body: &str,
    post_summary: &str,
    config: &AnnotateConfig,
) -> Result<Annotation, CoreError> {
    let text = generator
        .generate(
            &classification_prompt(comment_body, post_summary),
            config.temperature,
            config.classify_max_tokens,
        )
        .await?;
    Ok(parse_classification(&text))
}

/// Reads the `SUMMARY:`/`SENTIMENT:`/`ACTION:` lines out of a model reply.
///
/// Prefixes are matched case-sensitively after trimming; a later line wins over an
/// earlier one with the same prefix. Unrecognized lines are ignored and missing fields
/// fall back to their defaults, so this never fails.
pub fn parse_classification(text: &str) -> Annotation {
    let mut summary = None;
    let mut sentiment = None;
    let mut action = None;

    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("SUMMARY:") {
            summary = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("SENTIMENT:") {
            sentiment = Some(rest.trim().to_lowercase());
        } else if let Some(rest) = line.strip_prefix("ACTION:") {
            action = Some(rest.trim().to_lowercase());
        }
    }

    Annotation {
        summary: summary.unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
        sentiment: sentiment.unwrap_or_else(|| DEFAULT_SENTIMENT.to_string()),
        action: action.unwrap_or_else(|| DEFAULT_ACTION.to_string()),
    }
}

/// Sentiment label recorded on a comment whose classification failed.
pub fn failure_sentinel(error: &CoreError) -> &'static str {
    if error.is_response_format_error() {
        "json_error"
    } else {
        "error"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationStats {
    pub posts_annotated: usize,
    pub posts_failed: usize,
    pub comments_annotated: usize,
    pub comments_failed: usize,
}

/// Annotates posts in order, then the leading comments of each successfully
/// summarized post.
///
/// Failures are recorded on the affected record and never stop the run.
pub async fn annotate_posts<G: TextGenerator>(
    generator: &G,
    posts: &mut [Post],
    config: &AnnotateConfig,
) -> AnnotationStats {
    let mut stats = AnnotationStats::default();
    let total = posts.len();
    let pacing = config.pacing_delay();

    for (index, post) in posts.iter_mut().enumerate() {
        info!("Summarizing post {}/{}: {}", index + 1, total, post.title);

        let post_summary = match summarize(generator, &post.title, &post.selftext, config).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Could not summarize post {}: {}", post.id, e.user_friendly_message());
                post.mark_failed(e.to_string());
                stats.posts_failed += 1;
                continue;
            }
        };
        post.apply_summary(post_summary.clone());
        stats.posts_annotated += 1;

        let limit = config.max_comments.min(post.comments.len());
        for (position, comment) in post.comments.iter_mut().take(limit).enumerate() {
            debug!("Classifying comment {}/{} ({})", position + 1, limit, comment.id);

            match classify(generator, &comment.body, &post_summary, config).await {
                Ok(annotation) => {
                    comment.apply_annotation(annotation);
                    stats.comments_annotated += 1;
                }
                Err(e) => {
                    let sentinel = failure_sentinel(&e);
                    warn!("Could not classify comment {}: {}", comment.id, e);
                    comment.mark_failed(sentinel, e.to_string());
                    stats.comments_failed += 1;
                }
            }

            if !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
        }
        info!("Annotated {} comments for post {}", limit, post.id);
    }

    stats
}
