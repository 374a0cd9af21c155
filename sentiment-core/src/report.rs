//! Aggregate sentiment statistics over an annotated envelope.

use crate::SearchResults;
use std::fmt;

const GENERIC_TERMS: &[&str] = &["stock", "stocks", "share", "shares", "price", "the", "and"];
const MOOD_MARGIN: f64 = 20.0;
const RULE: &str = "==================================================";
const WIDE_RULE: &str =
    "================================================================================";

#[derive(Debug, Clone, PartialEq)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopComment {
    pub score: i64,
    pub sentiment: String,
    pub stock_action: String,
    pub summary: String,
    pub post_title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketMood {
    Bullish,
    Bearish,
    CautiouslyOptimistic,
    Cautious,
    Neutral,
}

impl MarketMood {
    pub fn classify(positive_pct: f64, negative_pct: f64) -> Self {
        if positive_pct > negative_pct + MOOD_MARGIN {
            MarketMood::Bullish
        } else if negative_pct > positive_pct + MOOD_MARGIN {
            MarketMood::Bearish
        } else if positive_pct > negative_pct {
            MarketMood::CautiouslyOptimistic
        } else if negative_pct > positive_pct {
            MarketMood::Cautious
        } else {
            MarketMood::Neutral
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            MarketMood::Bullish => "🚀 BULLISH - Strong positive sentiment",
            MarketMood::Bearish => "🐻 BEARISH - Negative sentiment prevails",
            MarketMood::CautiouslyOptimistic => "📈 CAUTIOUSLY OPTIMISTIC - Slight positive bias",
            MarketMood::Cautious => "📉 CAUTIOUS - Slight negative bias",
            MarketMood::Neutral => "😐 NEUTRAL - Mixed opinions, no clear direction",
        }
    }
}

/// Keywords a post must mention to count as related to the search term.
pub fn related_keywords(search_term: &str) -> Vec<String> {
    search_term
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() >= 2 && !GENERIC_TERMS.contains(&w.as_str()))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentimentReport {
    pub search_term: String,
    pub analysis_date: String,
    pub posts_analyzed: usize,
    pub related_posts: usize,
    pub total_comments: usize,
    pub sentiment_counts: Vec<LabelCount>,
    pub action_counts: Vec<LabelCount>,
    /// Upvote-weighted share of positive, neutral and negative, in that order.
    pub weighted_sentiment: Vec<(String, f64)>,
    pub positive_pct: f64,
    pub neutral_pct: f64,
    pub negative_pct: f64,
    pub buy_pct: f64,
    pub hold_pct: f64,
    pub sell_pct: f64,
    pub mood: MarketMood,
    pub top_comments: Vec<TopComment>,
}

fn tally(labels: impl Iterator<Item = String>, total: usize) -> Vec<LabelCount> {
    let mut counts: Vec<LabelCount> = Vec::new();
    for label in labels {
        match counts.iter_mut().find(|c| c.label == label) {
            Some(existing) => existing.count += 1,
            None => counts.push(LabelCount {
                label,
                count: 1,
                percentage: 0.0,
            }),
        }
    }
    for c in &mut counts {
        c.percentage = percentage(c.count, total);
    }
    // stable: ties keep first-seen order
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn pct_of(counts: &[LabelCount], label: &str) -> f64 {
    counts
        .iter()
        .find(|c| c.label == label)
        .map(|c| c.percentage)
        .unwrap_or(0.0)
}

impl SentimentReport {
    pub fn from_results(results: &SearchResults) -> Self {
        let keywords = related_keywords(&results.search_parameters.search_term);

        let mut related_posts = 0;
        let mut annotated = Vec::new();
        for post in &results.posts {
            let haystack = format!("{} {}", post.title, post.selftext).to_lowercase();
            let is_related = keywords.iter().any(|k| haystack.contains(k.as_str()));
            if is_related {
                related_posts += 1;
            }

            for comment in &post.comments {
                let (Some(sentiment), Some(action)) = (&comment.sentiment, &comment.stock_action)
                else {
                    continue;
                };
                if sentiment.is_empty() || action.is_empty() {
                    continue;
                }
                annotated.push(TopComment {
                    score: comment.score,
                    sentiment: sentiment.clone(),
                    stock_action: action.clone(),
                    summary: comment.summary.clone().unwrap_or_default(),
                    post_title: post.title.clone(),
                });
            }
        }

        let total = annotated.len();
        let sentiment_counts = tally(annotated.iter().map(|c| c.sentiment.clone()), total);
        let action_counts = tally(annotated.iter().map(|c| c.stock_action.clone()), total);

        let mut weights = [("positive", 0i64), ("neutral", 0i64), ("negative", 0i64)];
        let mut total_weight = 0i64;
        for comment in &annotated {
            let weight = comment.score.max(1);
            if let Some(slot) = weights.iter_mut().find(|(l, _)| *l == comment.sentiment) {
                slot.1 += weight;
                total_weight += weight;
            }
        }
        let weighted_sentiment = weights
            .iter()
            .map(|(label, weight)| {
                let pct = if total_weight > 0 {
                    *weight as f64 / total_weight as f64 * 100.0
                } else {
                    0.0
                };
                (label.to_string(), pct)
            })
            .collect();

        let positive_pct = pct_of(&sentiment_counts, "positive");
        let negative_pct = pct_of(&sentiment_counts, "negative");

        let mut top_comments = annotated;
        top_comments.sort_by(|a, b| b.score.cmp(&a.score));
        top_comments.truncate(3);

        Self {
            search_term: results.search_parameters.search_term.clone(),
            analysis_date: results.metadata.search_executed_at_readable.clone(),
            posts_analyzed: results.posts.len(),
            related_posts,
            total_comments: total,
            positive_pct,
            neutral_pct: pct_of(&sentiment_counts, "neutral"),
            negative_pct,
            buy_pct: pct_of(&action_counts, "buy"),
            hold_pct: pct_of(&action_counts, "hold"),
            sell_pct: pct_of(&action_counts, "sell"),
            mood: MarketMood::classify(positive_pct, negative_pct),
            sentiment_counts,
            action_counts,
            weighted_sentiment,
            top_comments,
        }
    }

    pub fn has_data(&self) -> bool {
        self.total_comments > 0
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

impl fmt::Display for SentimentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", WIDE_RULE)?;
        writeln!(f, "📊 {} - REDDIT PUBLIC PERCEPTION REPORT", self.search_term.to_uppercase())?;
        writeln!(f, "{}", WIDE_RULE)?;
        writeln!(f)?;
        writeln!(f, "🔍 Search Query: {}", self.search_term)?;
        writeln!(f, "📅 Analysis Date: {}", self.analysis_date)?;
        writeln!(f, "📈 Posts Analyzed: {}", self.posts_analyzed)?;
        writeln!(f, "🎯 Related Posts: {}", self.related_posts)?;
        writeln!(f, "💬 Total Comments Analyzed: {}", self.total_comments)?;

        if !self.has_data() {
            writeln!(f)?;
            return writeln!(f, "❌ No sentiment data found in comments!");
        }

        writeln!(f, "\n{}\n📈 SENTIMENT ANALYSIS\n{}", RULE, RULE)?;
        for c in &self.sentiment_counts {
            writeln!(
                f,
                "{:>10}: {:>3} comments ({:>5.1}%)",
                c.label.to_uppercase(),
                c.count,
                c.percentage
            )?;
        }

        writeln!(f, "\n{}\n📊 STOCK ACTION INDICATORS\n{}", RULE, RULE)?;
        for c in &self.action_counts {
            let label = if c.label.eq_ignore_ascii_case("na") {
                "NO ACTION".to_string()
            } else {
                c.label.to_uppercase()
            };
            writeln!(f, "{:>10}: {:>3} comments ({:>5.1}%)", label, c.count, c.percentage)?;
        }

        writeln!(f, "\n{}\n⚖️  WEIGHTED SENTIMENT (by upvotes)\n{}", RULE, RULE)?;
        for (label, pct) in &self.weighted_sentiment {
            writeln!(f, "{:>10}: {:>5.1}% (weighted by upvotes)", label.to_uppercase(), pct)?;
        }

        writeln!(f, "\n{}\n🎯 OVERALL MARKET SENTIMENT ASSESSMENT\n{}", RULE, RULE)?;
        writeln!(f, "\n📊 Sentiment Breakdown:")?;
        writeln!(f, "   • Positive: {:.1}%", self.positive_pct)?;
        writeln!(f, "   • Neutral:  {:.1}%", self.neutral_pct)?;
        writeln!(f, "   • Negative: {:.1}%", self.negative_pct)?;
        writeln!(f, "\n💰 Investment Intent:")?;
        writeln!(f, "   • Buy signals:  {:.1}%", self.buy_pct)?;
        writeln!(f, "   • Hold signals: {:.1}%", self.hold_pct)?;
        writeln!(f, "   • Sell signals: {:.1}%", self.sell_pct)?;
        writeln!(f, "\n🔮 MARKET MOOD:\n   {}", self.mood.description())?;

        writeln!(f, "\n💡 KEY INSIGHTS:")?;
        if self.related_posts == 0 {
            writeln!(f, "   • ⚠️  No posts directly mention the search term")?;
        } else {
            writeln!(
                f,
                "   • 🎯 {} out of {} posts directly mention the search term",
                self.related_posts, self.posts_analyzed
            )?;
        }
        if self.buy_pct > self.sell_pct {
            writeln!(
                f,
                "   • 💚 More buy signals ({:.1}%) than sell signals ({:.1}%)",
                self.buy_pct, self.sell_pct
            )?;
        } else if self.sell_pct > self.buy_pct {
            writeln!(
                f,
                "   • 🔴 More sell signals ({:.1}%) than buy signals ({:.1}%)",
                self.sell_pct, self.buy_pct
            )?;
        }
        if self.neutral_pct > 60.0 {
            writeln!(f, "   • 😐 Majority of comments are neutral - limited strong opinions")?;
        }

        writeln!(f, "\n🔥 TOP UPVOTED COMMENTS:")?;
        for (i, c) in self.top_comments.iter().enumerate() {
            writeln!(
                f,
                "\n   {}. Score: {} | {} | {}",
                i + 1,
                c.score,
                c.sentiment.to_uppercase(),
                c.stock_action.to_uppercase()
            )?;
            writeln!(f, "      Post: {}...", truncate(&c.post_title, 60))?;
            writeln!(f, "      Summary: {}...", truncate(&c.summary, 80))?;
        }

        writeln!(f, "\n{}", WIDE_RULE)?;
        writeln!(f, "📋 DISCLAIMER: This analysis is based on a small sample of Reddit comments")?;
        writeln!(f, "and should not be used as the sole basis for investment decisions.")?;
        writeln!(f, "{}", WIDE_RULE)
    }
}
