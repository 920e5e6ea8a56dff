//! Engagement dashboard: statistic cards, chart series and insights derived
//! from a video's statistics and its engagement analysis.

use crate::model::{CommentThread, EngagementData, Video};

/// How many threads the "recent comments" panel shows.
pub const RECENT_COMMENTS: usize = 5;

const LOW_VIEWS_PER_DAY: f64 = 1.0;
const LOW_RATE_PER_VIEW: f64 = 0.01;
const OLD_CONTENT_DAYS: u32 = 365;

#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub label: &'static str,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightKind {
    ViewsPerDay,
    LikesPerView,
    CommentsPerView,
    ContentAge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insight {
    pub kind: InsightKind,
    /// `true` when the metric is below expectations and the creator should act.
    pub needs_attention: bool,
    pub message: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub video_id: String,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
    pub engagement: Option<EngagementData>,
    pub recent_comments: Vec<CommentThread>,
}

impl Dashboard {
    pub fn new(
        video: &Video,
        engagement: Option<EngagementData>,
        comments: &[CommentThread],
    ) -> Self {
        Self {
            video_id: video.id.clone(),
            views: video.view_count(),
            likes: video.like_count(),
            comments: video.comment_count(),
            engagement,
            recent_comments: comments.iter().take(RECENT_COMMENTS).cloned().collect(),
        }
    }

    /// Likes plus comments per view, as a percentage.
    pub fn engagement_rate(&self) -> Option<f64> {
        self.engagement
            .as_ref()
            .map(|e| (e.likes_per_view + e.comments_per_view) * 100.0)
    }

    pub fn metric_series(&self) -> Vec<ChartPoint> {
        vec![
            ChartPoint {
                label: "Views",
                value: self.views as f64,
            },
            ChartPoint {
                label: "Likes",
                value: self.likes as f64,
            },
            ChartPoint {
                label: "Comments",
                value: self.comments as f64,
            },
        ]
    }

    /// The three engagement ratios scaled against the largest of them so they
    /// share one 0-100 axis. Empty without engagement data.
    pub fn engagement_series(&self) -> Vec<ChartPoint> {
        let Some(engagement) = &self.engagement else {
            return Vec::new();
        };
        let labels = ["Views/day", "Likes/view", "Comments/view"];
        let raw = [
            engagement.views_per_day,
            engagement.likes_per_view,
            engagement.comments_per_view,
        ];
        labels
            .into_iter()
            .zip(normalize(&raw))
            .map(|(label, value)| ChartPoint { label, value })
            .collect()
    }

    pub fn insights(&self) -> Vec<Insight> {
        self.engagement.as_ref().map(insights).unwrap_or_default()
    }
}

/// Scales each value to `value / max * 100`. Zero values and an all-zero
/// input map to 0.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(0.0_f64, f64::max);
    values
        .iter()
        .map(|&v| {
            if v == 0.0 || max == 0.0 {
                0.0
            } else {
                v / max * 100.0
            }
        })
        .collect()
}

pub fn insights(engagement: &EngagementData) -> Vec<Insight> {
    let pick = |kind, needs_attention, low: &'static str, good: &'static str| Insight {
        kind,
        needs_attention,
        message: if needs_attention { low } else { good },
    };
    vec![
        pick(
            InsightKind::ViewsPerDay,
            engagement.views_per_day < LOW_VIEWS_PER_DAY,
            "This video gets few daily views. Consider improving its tags and search optimization.",
            "The video is getting a healthy number of daily views.",
        ),
        pick(
            InsightKind::LikesPerView,
            engagement.likes_per_view < LOW_RATE_PER_VIEW,
            "The like rate per view is below average. Consider improving the content to raise engagement.",
            "The video is receiving a good like rate per view.",
        ),
        pick(
            InsightKind::CommentsPerView,
            engagement.comments_per_view < LOW_RATE_PER_VIEW,
            "The comment rate is below average. Encourage viewers to comment with questions or calls to action.",
            "The video is generating good discussion in the comments.",
        ),
        pick(
            InsightKind::ContentAge,
            engagement.days_online > OLD_CONTENT_DAYS,
            "This is older content. Consider refreshing it or making a new video on the topic.",
            "This is relatively recent content.",
        ),
    ]
}
