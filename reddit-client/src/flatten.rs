//! Placeholder expansion and flattening of comment trees.
//!
//! Expansion works through an iterative worklist: the tree is scanned for pending
//! `more` placeholders, up to `batch_size` of them are handed to a [`CommentSource`],
//! and the returned things are spliced in where the placeholders stood. Once nothing
//! is pending, the budget runs out, or a batch exhausts its retries, the tree is read
//! out depth first.

use crate::api::MorePlaceholder;
use crate::retry::{execute_with_retry, RetryConfig, RetryOutcome};
use crate::tree::{CommentTree, NodeId, RawThing, TreeNode};
use sentiment_core::{
    absolute_permalink, timestamp_from_epoch, Comment, CoreError, FlattenConfig, DELETED_AUTHOR,
};
use std::collections::HashSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Anything that can expand `more` placeholders.
pub trait CommentSource {
    /// Resolves one batch. Returns one group of things per placeholder, in batch order.
    async fn resolve_placeholders(
        &self,
        link_fullname: &str,
        batch: &[MorePlaceholder],
    ) -> Result<Vec<Vec<RawThing>>, CoreError>;
}

/// State of the expansion after a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Nothing is pending any more.
    Resolved,
    /// The batch succeeded but placeholders remain.
    PartiallyResolved { remaining: usize },
    /// The batch failed on every attempt; expansion stopped here.
    Exhausted { attempts: u32, error: String },
}

#[derive(Debug, Clone, Default)]
pub struct FlattenReport {
    pub comments: Vec<Comment>,
    pub batches: usize,
    pub placeholders_resolved: usize,
    pub placeholders_discarded: usize,
    pub skipped_nodes: usize,
    pub last_outcome: Option<BatchOutcome>,
}

impl FlattenReport {
    pub fn aborted(&self) -> bool {
        matches!(self.last_outcome, Some(BatchOutcome::Exhausted { .. }))
    }
}

/// Expands and flattens `tree`, returning its comments parent first.
///
/// Never fails: an exhausted batch or a malformed node only shrinks the output.
pub async fn flatten_comments<S: CommentSource>(
    source: &S,
    tree: &mut CommentTree,
    config: &FlattenConfig,
    current_depth: usize,
) -> Vec<Comment> {
    flatten_with_report(source, tree, config, current_depth)
        .await
        .comments
}

pub async fn flatten_with_report<S: CommentSource>(
    source: &S,
    tree: &mut CommentTree,
    config: &FlattenConfig,
    current_depth: usize,
) -> FlattenReport {
    let mut report = FlattenReport::default();

    if current_depth >= config.max_depth {
        debug!(
            "Depth {} reached limit {}, not expanding {}",
            current_depth,
            config.max_depth,
            tree.link_fullname()
        );
        return report;
    }

    expand_placeholders(source, tree, config, &mut report).await;
    report.comments = collect_comments(tree, &mut report.skipped_nodes);

    info!(
        "Flattened {} comments for {} ({} batches, {} placeholders resolved, {} discarded, {} nodes skipped)",
        report.comments.len(),
        tree.link_fullname(),
        report.batches,
        report.placeholders_resolved,
        report.placeholders_discarded,
        report.skipped_nodes
    );
    report
}

async fn expand_placeholders<S: CommentSource>(
    source: &S,
    tree: &mut CommentTree,
    config: &FlattenConfig,
    report: &mut FlattenReport,
) {
    let retry = RetryConfig::from(config);
    let batch_size = config.batch_size.max(1);
    let link = tree.link_fullname().to_string();
    let mut seen: HashSet<String> = HashSet::new();

    loop {
        let mut pending: Vec<(NodeId, MorePlaceholder)> = Vec::new();
        for id in tree.pending_placeholders() {
            let Some(placeholder) = tree.placeholder(id).cloned() else {
                continue;
            };
            if seen.contains(&placeholder.key()) {
                // Came back unchanged from an earlier expansion
                tree.discard(id);
                report.placeholders_discarded += 1;
            } else {
                pending.push((id, placeholder));
            }
        }

        if pending.is_empty() {
            break;
        }

        let budget = config
            .expansion_limit
            .map(|limit| limit.saturating_sub(report.placeholders_resolved));
        if budget == Some(0) {
            debug!(
                "Expansion limit reached for {}, discarding {} placeholders",
                link,
                pending.len()
            );
            for (id, _) in pending {
                tree.discard(id);
                report.placeholders_discarded += 1;
            }
            break;
        }

        let take = pending
            .len()
            .min(batch_size)
            .min(budget.unwrap_or(usize::MAX));
        let (ids, batch): (Vec<NodeId>, Vec<MorePlaceholder>) =
            pending.into_iter().take(take).unzip();

        report.batches += 1;
        let operation = format!("placeholder batch {} for {}", report.batches, link);
        let outcome =
            execute_with_retry(&retry, &operation, || source.resolve_placeholders(&link, &batch))
                .await;

        match outcome {
            RetryOutcome::Succeeded { value: groups, .. } => {
                let mut groups = groups.into_iter();
                for (id, placeholder) in ids.iter().zip(batch.iter()) {
                    seen.insert(placeholder.key());
                    match groups.next() {
                        Some(things) => tree.replace_placeholder(*id, things),
                        None => {
                            tree.discard(*id);
                            report.placeholders_discarded += 1;
                        }
                    }
                }
                report.placeholders_resolved += ids.len();

                let remaining = tree.pending_placeholders().len();
                let state = if remaining == 0 {
                    BatchOutcome::Resolved
                } else {
                    BatchOutcome::PartiallyResolved { remaining }
                };
                debug!("Batch {} for {}: {:?}", report.batches, link, state);
                report.last_outcome = Some(state);

                if remaining > 0 && !retry.delay.is_zero() {
                    info!(
                        "{} placeholders still pending for {}, waiting {:?}",
                        remaining, link, retry.delay
                    );
                    sleep(retry.delay).await;
                }
            }
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                warn!(
                    "Giving up on placeholder expansion for {} after {} attempts: {}",
                    link, attempts, last_error
                );
                report.last_outcome = Some(BatchOutcome::Exhausted {
                    attempts,
                    error: last_error.to_string(),
                });
                break;
            }
        }
    }
}

fn collect_comments(tree: &CommentTree, skipped: &mut usize) -> Vec<Comment> {
    let mut comments = Vec::new();
    for id in tree.depth_first() {
        let built = match tree.node(id) {
            Some(TreeNode::Comment(raw)) => {
                build_comment(raw, tree.depth(id), tree.reply_count(id))
            }
            _ => None,
        };
        match built {
            Some(comment) => comments.push(comment),
            None => *skipped += 1,
        }
    }
    comments
}

fn build_comment(
    raw: &crate::api::RawCommentData,
    depth: usize,
    reply_count: usize,
) -> Option<Comment> {
    let id = raw.id.clone()?;
    let body = raw.body.clone()?;
    let created_utc = timestamp_from_epoch(raw.created_utc?);

    Some(Comment {
        id,
        author: raw
            .author
            .clone()
            .unwrap_or_else(|| DELETED_AUTHOR.to_string()),
        body,
        score: raw.score.unwrap_or_default(),
        created_utc,
        permalink: raw
            .permalink
            .as_deref()
            .map(absolute_permalink)
            .unwrap_or_default(),
        is_submitter: raw.is_submitter.unwrap_or_default(),
        distinguished: raw.distinguished,
        edited: raw.edited,
        reply_count,
        depth,
        summary: None,
        sentiment: None,
        stock_action: None,
        error: None,
    })
}
