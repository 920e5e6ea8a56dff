//! Server-rendered HTML for the editor page.
//!
//! Every card is an askama template under `templates/components/` fed by a
//! small view struct built from the page data, the comment feed or the
//! thumbnail slot. The templates escape all text; numbers and dates are
//! formatted here. Charts are inline SVG whose geometry is computed in Rust.

use std::f64::consts::{FRAC_PI_2, TAU};

use askama::Template;
use chrono::{DateTime, NaiveDate};

use crate::dashboard::{ChartPoint, Dashboard};
use crate::editor::VideoEditForm;
use crate::feed::{CommentFeed, FeedStatus};
use crate::model::{CommentReply, CommentThread, PrivacyStatus, Video};
use crate::page::{PageData, UpdateResult};
use crate::thumbnail::{
    CandidateState, Dimensions, MAX_FILE_SIZE, MIN_WIDTH, RECOMMENDED_HEIGHT, RECOMMENDED_WIDTH,
    ThumbnailSlot,
};

const CHART_COLORS: [&str; 3] = ["#36a2eb", "#ff6384", "#ffce56"];

const PIE_RADIUS: f64 = 80.0;
const PIE_CENTER: f64 = 100.0;
const BAR_AREA_HEIGHT: f64 = 160.0;
const BAR_WIDTH: f64 = 50.0;

/// `1234567` -> `1,234,567`.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Renders an RFC 3339 timestamp or a bare `YYYY-MM-DD` date as
/// `dd/mm/yyyy`. Anything else is shown as given.
pub fn format_date(raw: &str) -> String {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return timestamp.format("%d/%m/%Y").to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format("%d/%m/%Y").to_string();
    }
    raw.to_string()
}

fn video_path(video_id: &str) -> String {
    format!("/videos/{video_id}")
}

/// The whole editor page.
pub fn render_page(
    data: &PageData,
    feed: &CommentFeed,
    thumbnail: &ThumbnailSlot,
) -> askama::Result<String> {
    PageView::new(data, feed, thumbnail).render()
}

#[derive(Template)]
#[template(path = "page.html")]
pub struct PageView<'a> {
    signed_in: bool,
    authorization_url: Option<&'a str>,
    banner: Option<&'a UpdateResult>,
    video: VideoCard,
    editor: EditorCard,
    thumbnail: ThumbnailCard,
    dashboard: Option<DashboardCard>,
    comments: CommentSection,
}

impl<'a> PageView<'a> {
    pub fn new(data: &'a PageData, feed: &CommentFeed, thumbnail: &ThumbnailSlot) -> Self {
        let video_id = data.video_id.as_deref();
        let dashboard = data.video.as_ref().map(|video| {
            DashboardCard::new(&Dashboard::new(
                video,
                data.engagement.clone(),
                feed.threads(),
            ))
        });
        Self {
            signed_in: data.has_token,
            authorization_url: data.authorization_url.as_deref(),
            banner: data.update_result.as_ref(),
            video: VideoCard::new(data.video.as_ref()),
            editor: EditorCard::new(video_id, data.video.as_ref()),
            thumbnail: ThumbnailCard::new(video_id, thumbnail),
            dashboard,
            comments: CommentSection::new(feed),
        }
    }
}

pub struct VideoSummary {
    id: String,
    title: String,
    channel: String,
    published: String,
    privacy: &'static str,
    privacy_label: &'static str,
    thumbnail_url: Option<String>,
}

/// Preview and facts of the loaded video, or "Video not found".
#[derive(Template)]
#[template(path = "components/video.html")]
pub struct VideoCard {
    video: Option<VideoSummary>,
}

impl VideoCard {
    pub fn new(video: Option<&Video>) -> Self {
        let video = video.map(|video| {
            let status = video.privacy_status();
            VideoSummary {
                id: video.id.clone(),
                title: video.snippet.title.clone(),
                channel: video.snippet.channel_title.clone(),
                published: format_date(&video.snippet.published_at),
                privacy: status.as_str(),
                privacy_label: status.label(),
                thumbnail_url: video.thumbnail_url().map(str::to_string),
            }
        });
        Self { video }
    }
}

pub struct PrivacyOption {
    value: &'static str,
    label: &'static str,
    selected: bool,
}

/// Metadata form, prefilled from the video. Submitting is disabled until a
/// video id is known.
#[derive(Template)]
#[template(path = "components/editor.html")]
pub struct EditorCard {
    action: Option<String>,
    title: String,
    description: String,
    tags: String,
    category_id: String,
    privacy_options: Vec<PrivacyOption>,
}

impl EditorCard {
    pub fn new(video_id: Option<&str>, video: Option<&Video>) -> Self {
        let form = VideoEditForm::from_video(video);
        let privacy_options = PrivacyStatus::ALL
            .iter()
            .map(|status| PrivacyOption {
                value: status.as_str(),
                label: status.label(),
                selected: *status == form.privacy_status,
            })
            .collect();
        Self {
            action: video_id.map(video_path),
            title: form.title,
            description: form.description,
            tags: form.tags,
            category_id: form.category_id,
            privacy_options,
        }
    }
}

#[derive(Template)]
#[template(path = "components/thumbnail.html")]
pub struct ThumbnailCard {
    base_path: Option<String>,
    accepted: Option<Dimensions>,
    rejection: Option<String>,
    recommended_width: u32,
    recommended_height: u32,
    min_width: u32,
    max_megabytes: u64,
}

impl ThumbnailCard {
    pub fn new(video_id: Option<&str>, slot: &ThumbnailSlot) -> Self {
        let (accepted, rejection) = match slot.candidate().map(|candidate| candidate.state()) {
            Some(CandidateState::Accepted { dimensions, .. }) => (Some(*dimensions), None),
            Some(CandidateState::Rejected(rejection)) => (None, Some(rejection.to_string())),
            Some(CandidateState::Pending) | None => (None, None),
        };
        Self {
            base_path: video_id.map(video_path),
            accepted,
            rejection,
            recommended_width: RECOMMENDED_WIDTH,
            recommended_height: RECOMMENDED_HEIGHT,
            min_width: MIN_WIDTH,
            max_megabytes: MAX_FILE_SIZE / 1024 / 1024,
        }
    }
}

pub struct StatTile {
    title: &'static str,
    value: String,
    detail: Option<String>,
}

pub struct EngagementSummary {
    upload_date: String,
    days_online: u32,
    views_per_day: String,
    rate: String,
}

#[derive(Template)]
#[template(path = "components/dashboard.html")]
pub struct DashboardCard {
    stats: Vec<StatTile>,
    engagement: Option<EngagementSummary>,
    metrics: PieChart,
    ratios: BarChart,
    insights: Vec<&'static str>,
    recent: Vec<CommentView>,
}

impl DashboardCard {
    pub fn new(dashboard: &Dashboard) -> Self {
        let engagement = dashboard.engagement.as_ref();
        let stats = vec![
            StatTile {
                title: "Views",
                value: group_thousands(dashboard.views),
                detail: engagement.map(|e| format!("{:.2} views/day", e.views_per_day)),
            },
            StatTile {
                title: "Likes",
                value: group_thousands(dashboard.likes),
                detail: engagement
                    .map(|e| format!("{:.2}% of viewers liked", e.likes_per_view * 100.0)),
            },
            StatTile {
                title: "Comments",
                value: group_thousands(dashboard.comments),
                detail: engagement
                    .map(|e| format!("{:.2}% of viewers commented", e.comments_per_view * 100.0)),
            },
        ];
        let summary = engagement
            .zip(dashboard.engagement_rate())
            .map(|(e, rate)| EngagementSummary {
                upload_date: format_date(&e.upload_date),
                days_online: e.days_online,
                views_per_day: format!("{:.2}", e.views_per_day),
                rate: format!("{rate:.2}"),
            });
        Self {
            stats,
            engagement: summary,
            metrics: PieChart::new(&dashboard.metric_series()),
            ratios: BarChart::new(&dashboard.engagement_series()),
            insights: dashboard
                .insights()
                .into_iter()
                .map(|insight| insight.message)
                .collect(),
            recent: dashboard
                .recent_comments
                .iter()
                .map(CommentView::thread)
                .collect(),
        }
    }
}

pub struct LegendEntry {
    label: &'static str,
    color: &'static str,
}

fn legend(points: &[ChartPoint]) -> Vec<LegendEntry> {
    points
        .iter()
        .zip(CHART_COLORS.iter().copied().cycle())
        .map(|(point, color)| LegendEntry {
            label: point.label,
            color,
        })
        .collect()
}

/// One wedge; `path` is `None` when the wedge is the whole disc.
pub struct PieSlice {
    path: Option<String>,
    color: &'static str,
    title: String,
}

/// Pie chart of the absolute counts. An all-zero series draws an empty ring.
#[derive(Template)]
#[template(path = "components/pie_chart.html")]
pub struct PieChart {
    slices: Vec<PieSlice>,
    legend: Vec<LegendEntry>,
}

impl PieChart {
    pub fn new(points: &[ChartPoint]) -> Self {
        let total: f64 = points.iter().map(|p| p.value).sum();
        let mut slices = Vec::new();
        if total > 0.0 {
            let mut start = -FRAC_PI_2;
            for (point, color) in points.iter().zip(CHART_COLORS.iter().copied().cycle()) {
                if point.value <= 0.0 {
                    continue;
                }
                let title = format!("{}: {}", point.label, group_thousands(point.value as u64));
                let share = point.value / total;
                if share >= 1.0 {
                    slices.push(PieSlice {
                        path: None,
                        color,
                        title,
                    });
                    break;
                }
                let end = start + share * TAU;
                let large = if share > 0.5 { 1 } else { 0 };
                let path = format!(
                    "M{c},{c} L{:.2},{:.2} A{r},{r} 0 {large} 1 {:.2},{:.2} Z",
                    PIE_CENTER + PIE_RADIUS * start.cos(),
                    PIE_CENTER + PIE_RADIUS * start.sin(),
                    PIE_CENTER + PIE_RADIUS * end.cos(),
                    PIE_CENTER + PIE_RADIUS * end.sin(),
                    c = PIE_CENTER,
                    r = PIE_RADIUS,
                );
                slices.push(PieSlice {
                    path: Some(path),
                    color,
                    title,
                });
                start = end;
            }
        }
        Self {
            slices,
            legend: legend(points),
        }
    }
}

pub struct Bar {
    x: f64,
    y: String,
    width: f64,
    height: String,
    color: &'static str,
    title: String,
}

/// Bar chart on a 0-100 scale.
#[derive(Template)]
#[template(path = "components/bar_chart.html")]
pub struct BarChart {
    bars: Vec<Bar>,
    legend: Vec<LegendEntry>,
}

impl BarChart {
    pub fn new(points: &[ChartPoint]) -> Self {
        let bars = points
            .iter()
            .zip(CHART_COLORS.iter().copied().cycle())
            .enumerate()
            .map(|(index, (point, color))| {
                let h = point.value.clamp(0.0, 100.0) / 100.0 * BAR_AREA_HEIGHT;
                Bar {
                    x: 20.0 + index as f64 * (BAR_WIDTH + 20.0),
                    y: format!("{:.2}", BAR_AREA_HEIGHT - h),
                    width: BAR_WIDTH,
                    height: format!("{h:.2}"),
                    color,
                    title: format!("{}: {:.1}", point.label, point.value),
                }
            })
            .collect();
        Self {
            bars,
            legend: legend(points),
        }
    }
}

/// A comment or reply. Replies carry no channel link and no counters.
#[derive(Template)]
#[template(path = "components/comment.html")]
pub struct CommentView {
    avatar: String,
    author: String,
    channel_url: Option<String>,
    date: String,
    text: String,
    likes: Option<String>,
    reply_count: u64,
}

impl CommentView {
    pub fn thread(thread: &CommentThread) -> Self {
        Self {
            avatar: thread.author_profile_image_url.clone(),
            author: thread.author_display_name.clone(),
            channel_url: Some(thread.author_channel_url.clone()),
            date: format_date(&thread.published_at),
            text: thread.text.clone(),
            likes: Some(group_thousands(thread.like_count)),
            reply_count: thread.total_reply_count,
        }
    }

    pub fn reply(reply: &CommentReply) -> Self {
        Self {
            avatar: reply.author_profile_image_url.clone(),
            author: reply.author_display_name.clone(),
            channel_url: None,
            date: format_date(&reply.published_at),
            text: reply.text.clone(),
            likes: None,
            reply_count: 0,
        }
    }
}

pub struct ThreadView {
    comment: CommentView,
    path: String,
    toggle: Option<&'static str>,
    replies: Option<Vec<CommentView>>,
}

/// The comment list with its post, reply, toggle and "load more" forms.
#[derive(Template)]
#[template(path = "components/comments.html")]
pub struct CommentSection {
    base_path: Option<String>,
    error: Option<String>,
    empty: bool,
    threads: Vec<ThreadView>,
    /// `Some(loading)` while more pages exist.
    more: Option<bool>,
}

impl CommentSection {
    pub fn new(feed: &CommentFeed) -> Self {
        let Some(video_id) = feed.video_id() else {
            return Self {
                base_path: None,
                error: None,
                empty: false,
                threads: Vec::new(),
                more: None,
            };
        };
        let base = format!("{}/comments", video_path(video_id));
        let threads = feed
            .threads()
            .iter()
            .map(|thread| {
                let expanded = feed.is_expanded(&thread.id);
                let label = if expanded { "Hide replies" } else { "Show replies" };
                ThreadView {
                    comment: CommentView::thread(thread),
                    path: format!("{base}/{}", thread.id),
                    toggle: (thread.total_reply_count > 0 || expanded).then_some(label),
                    replies: expanded
                        .then(|| thread.replies.iter().map(CommentView::reply).collect()),
                }
            })
            .collect();
        Self {
            error: feed.error().map(str::to_string),
            empty: feed.threads().is_empty() && *feed.status() == FeedStatus::Loaded,
            threads,
            more: feed.has_more().then(|| feed.is_loading()),
            base_path: Some(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EngagementData;
    use crate::testing::{FakePlatform, page, thread, video};
    use crate::thumbnail::ThumbnailFile;

    fn signed_in(video: Option<Video>) -> PageData {
        PageData {
            has_token: true,
            authorization_url: None,
            video_id: Some("v1".into()),
            video,
            update_result: None,
            engagement: None,
        }
    }

    fn render(data: &PageData, feed: &CommentFeed) -> String {
        render_page(data, feed, &ThumbnailSlot::new()).unwrap()
    }

    #[test]
    fn user_text_is_escaped() {
        let mut hostile = thread("c1");
        hostile.author_display_name = "\"><b>x</b>".into();
        hostile.text = "<script>alert(1)</script> & more".into();
        let html = CommentView::thread(&hostile).render().unwrap();
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<b>x</b>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt; &amp; more"));
    }

    #[test]
    fn thousands_are_grouped() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1234), "1,234");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn dates_render_day_first() {
        assert_eq!(format_date("2024-03-05T10:00:00Z"), "05/03/2024");
        assert_eq!(format_date("2024-12-31"), "31/12/2024");
        assert_eq!(format_date("soon"), "soon");
    }

    #[test]
    fn no_token_shows_only_sign_in() {
        let data = PageData {
            authorization_url: Some("https://accounts.example/auth?a=1&b=2".into()),
            ..PageData::default()
        };
        let html = render(&data, &CommentFeed::new(None));
        assert!(html.contains("Sign in with Google"));
        assert!(html.contains("a=1&amp;b=2"));
        assert!(!html.contains("Edit video"));
    }

    #[test]
    fn page_shows_video_and_prefilled_form() {
        let data = signed_in(Some(video("v1")));
        let html = render(&data, &CommentFeed::new(Some("v1".into())));
        assert!(html.contains("<h3>Video v1</h3>"));
        assert!(html.contains("badge-unlisted"));
        assert!(html.contains("value=\"rust, video\""));
        assert!(html.contains("<option value=\"unlisted\" selected>"));
        assert!(html.contains("action=\"/videos/v1\""));
        assert!(html.contains("1,234"));
    }

    #[test]
    fn missing_video_renders_not_found() {
        let mut data = signed_in(None);
        data.update_result = Some(UpdateResult::failure("video not found on the platform"));
        let html = render(&data, &CommentFeed::new(Some("v1".into())));
        assert!(html.contains("Video not found"));
        assert!(html.contains("alert-error"));
        assert!(!html.contains("Video dashboard"));
    }

    #[test]
    fn editor_without_video_id_cannot_submit() {
        let html = EditorCard::new(None, None).render().unwrap();
        assert!(!html.contains("action="));
        assert!(html.contains("<button type=\"submit\" disabled>"));
    }

    #[test]
    fn dashboard_renders_charts_and_insights() {
        let mut data = signed_in(Some(video("v1")));
        data.engagement = Some(EngagementData {
            views_per_day: 0.5,
            likes_per_view: 0.02,
            comments_per_view: 0.001,
            upload_date: "2024-01-01".into(),
            days_online: 400,
        });
        let html = render(&data, &CommentFeed::new(Some("v1".into())));
        assert!(html.contains("<svg"));
        assert!(html.contains("<rect"));
        assert!(html.contains("Engagement rate:</b> 2.10%"));
        assert!(html.contains("01/01/2024"));
        assert!(html.contains("This is older content."));
    }

    #[test]
    fn empty_pie_draws_a_ring() {
        let points = vec![
            ChartPoint { label: "Views", value: 0.0 },
            ChartPoint { label: "Likes", value: 0.0 },
        ];
        let svg = PieChart::new(&points).render().unwrap();
        assert!(svg.contains("<circle"));
        assert!(!svg.contains("<path"));
    }

    #[test]
    fn single_nonzero_value_fills_the_pie() {
        let points = vec![
            ChartPoint { label: "Views", value: 10.0 },
            ChartPoint { label: "Likes", value: 0.0 },
        ];
        let chart = PieChart::new(&points);
        assert_eq!(chart.slices.len(), 1);
        assert!(chart.slices[0].path.is_none());
        assert_eq!(chart.slices[0].title, "Views: 10");
    }

    #[test]
    fn comments_render_reply_state_and_more_link() {
        let fake = FakePlatform::new();
        let mut first = thread("c1");
        first.total_reply_count = 1;
        fake.push_page(crate::model::CommentThreadPage {
            items: vec![first, thread("c2")],
            next_page_token: Some("next".into()),
        });
        let mut feed = CommentFeed::new(Some("v1".into()));
        feed.load(&fake).unwrap();
        feed.toggle_replies("c1");

        let html = CommentSection::new(&feed).render().unwrap();
        assert!(html.contains("/videos/v1/comments/c1/replies"));
        assert!(html.contains("Hide replies"));
        assert!(html.contains("Load more comments"));
        assert!(!html.contains("/videos/v1/comments/c2/toggle"));
    }

    #[test]
    fn feed_error_is_shown() {
        let fake = FakePlatform::new();
        fake.push_page(page(&["c1"], None));
        let mut feed = CommentFeed::new(Some("v1".into()));
        feed.load(&fake).unwrap();
        fake.fail_with(crate::client::ClientError::Status { code: 403 });
        assert!(feed.reload(&fake).is_err());
        let html = CommentSection::new(&feed).render().unwrap();
        assert!(html.contains("alert-error"));
        assert!(html.contains("text of c1"));
    }

    #[test]
    fn thumbnail_card_shows_rejection_and_requirements() {
        let mut slot = ThumbnailSlot::new();
        slot.select(ThumbnailFile::new("image/bmp", vec![0; 10])).unwrap();
        let html = ThumbnailCard::new(Some("v1"), &slot).render().unwrap();
        assert!(html.contains("unsupported format"));
        assert!(html.contains("Minimum width: 640 pixels"));
        assert!(html.contains("Maximum file size: 2MB"));
        assert!(!html.contains("thumbnail/upload"));
    }
}
