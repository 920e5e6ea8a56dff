//! Resource shapes exchanged with the video platform.
//!
//! The platform speaks YouTube Data API JSON, which nests everything under
//! `snippet` objects. Comment threads are flattened on the way in (and nested
//! again on the way out) so the rest of the crate works with plain fields.
//! Videos keep the nested layout because the views read it almost verbatim.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Parts requested whenever a video is loaded for the editor page.
pub const VIDEO_PARTS: [&str; 5] = [
    "snippet",
    "status",
    "contentDetails",
    "statistics",
    "topicDetails",
];

/// One top-level comment plus the replies the platform shipped with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCommentThread", into = "RawCommentThread")]
pub struct CommentThread {
    pub id: String,
    pub video_id: String,
    pub author_display_name: String,
    pub author_profile_image_url: String,
    pub author_channel_url: String,
    pub text: String,
    pub like_count: u64,
    pub published_at: String,
    pub updated_at: String,
    pub total_reply_count: u64,
    pub replies: Vec<CommentReply>,
}

/// A reply shown under an expanded thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawComment", into = "RawComment")]
pub struct CommentReply {
    pub id: String,
    pub author_display_name: String,
    pub author_profile_image_url: String,
    pub text: String,
    pub like_count: u64,
    pub published_at: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCommentThread {
    id: String,
    snippet: RawThreadSnippet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    replies: Option<RawReplies>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawThreadSnippet {
    #[serde(default)]
    video_id: String,
    top_level_comment: RawComment,
    #[serde(default)]
    total_reply_count: u64,
}

#[derive(Serialize, Deserialize)]
struct RawReplies {
    #[serde(default)]
    comments: Vec<RawComment>,
}

#[derive(Serialize, Deserialize)]
struct RawComment {
    #[serde(default)]
    id: String,
    snippet: RawCommentSnippet,
}

#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawCommentSnippet {
    author_display_name: String,
    author_profile_image_url: String,
    author_channel_url: String,
    text_original: String,
    like_count: u64,
    published_at: String,
    updated_at: String,
}

impl From<RawCommentThread> for CommentThread {
    fn from(raw: RawCommentThread) -> Self {
        let top = raw.snippet.top_level_comment.snippet;
        Self {
            id: raw.id,
            video_id: raw.snippet.video_id,
            author_display_name: top.author_display_name,
            author_profile_image_url: top.author_profile_image_url,
            author_channel_url: top.author_channel_url,
            text: top.text_original,
            like_count: top.like_count,
            published_at: top.published_at,
            updated_at: top.updated_at,
            total_reply_count: raw.snippet.total_reply_count,
            replies: raw
                .replies
                .map(|replies| replies.comments.into_iter().map(CommentReply::from).collect())
                .unwrap_or_default(),
        }
    }
}

impl From<CommentThread> for RawCommentThread {
    fn from(thread: CommentThread) -> Self {
        let replies = (!thread.replies.is_empty()).then(|| RawReplies {
            comments: thread.replies.into_iter().map(RawComment::from).collect(),
        });
        Self {
            id: thread.id.clone(),
            snippet: RawThreadSnippet {
                video_id: thread.video_id,
                top_level_comment: RawComment {
                    id: thread.id,
                    snippet: RawCommentSnippet {
                        author_display_name: thread.author_display_name,
                        author_profile_image_url: thread.author_profile_image_url,
                        author_channel_url: thread.author_channel_url,
                        text_original: thread.text,
                        like_count: thread.like_count,
                        published_at: thread.published_at,
                        updated_at: thread.updated_at,
                    },
                },
                total_reply_count: thread.total_reply_count,
            },
            replies,
        }
    }
}

impl From<RawComment> for CommentReply {
    fn from(raw: RawComment) -> Self {
        Self {
            id: raw.id,
            author_display_name: raw.snippet.author_display_name,
            author_profile_image_url: raw.snippet.author_profile_image_url,
            text: raw.snippet.text_original,
            like_count: raw.snippet.like_count,
            published_at: raw.snippet.published_at,
        }
    }
}

impl From<CommentReply> for RawComment {
    fn from(reply: CommentReply) -> Self {
        Self {
            id: reply.id,
            snippet: RawCommentSnippet {
                author_display_name: reply.author_display_name,
                author_profile_image_url: reply.author_profile_image_url,
                text_original: reply.text,
                like_count: reply.like_count,
                published_at: reply.published_at,
                ..RawCommentSnippet::default()
            },
        }
    }
}

/// A page of comment threads. A missing `nextPageToken` means the feed is
/// exhausted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThreadPage {
    #[serde(default)]
    pub items: Vec<CommentThread>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Result of posting a top-level comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentComment {
    pub comment: CommentThread,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub snippet: VideoSnippet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VideoStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<VideoStatistics>,
}

impl Video {
    /// Largest thumbnail the platform reported, falling back to smaller ones.
    pub fn thumbnail_url(&self) -> Option<&str> {
        let thumbs = &self.snippet.thumbnails;
        thumbs
            .high
            .as_ref()
            .or(thumbs.medium.as_ref())
            .or(thumbs.default.as_ref())
            .map(|thumb| thumb.url.as_str())
    }

    pub fn privacy_status(&self) -> PrivacyStatus {
        self.status
            .as_ref()
            .map(|status| status.privacy_status)
            .unwrap_or_default()
    }

    pub fn view_count(&self) -> u64 {
        self.statistics
            .as_ref()
            .map_or(0, |stats| parse_count(stats.view_count.as_deref()))
    }

    pub fn like_count(&self) -> u64 {
        self.statistics
            .as_ref()
            .map_or(0, |stats| parse_count(stats.like_count.as_deref()))
    }

    pub fn comment_count(&self) -> u64 {
        self.statistics
            .as_ref()
            .map_or(0, |stats| parse_count(stats.comment_count.as_deref()))
    }
}

/// Statistics arrive as decimal strings; anything absent or malformed counts
/// as zero.
fn parse_count(value: Option<&str>) -> u64 {
    value.and_then(|raw| raw.trim().parse().ok()).unwrap_or(0)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub channel_title: String,
    #[serde(default)]
    pub published_at: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thumbnails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<Thumbnail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Thumbnail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatus {
    #[serde(default)]
    pub privacy_status: PrivacyStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_count: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    Public,
    Unlisted,
    #[default]
    Private,
}

impl PrivacyStatus {
    pub const ALL: [PrivacyStatus; 3] = [Self::Public, Self::Unlisted, Self::Private];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Private => "private",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Unlisted => "Unlisted",
            Self::Private => "Private",
        }
    }
}

impl fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivacyStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "unlisted" => Ok(Self::Unlisted),
            "private" => Ok(Self::Private),
            other => Err(format!("unknown privacy status `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoList {
    #[serde(default)]
    pub items: Vec<Video>,
}

/// Derived engagement ratios for the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementData {
    pub views_per_day: f64,
    pub likes_per_view: f64,
    pub comments_per_view: f64,
    pub upload_date: String,
    pub days_online: u32,
}

/// Options for `analyze_video`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeOptions {
    pub comment_count: u32,
    pub related_videos_count: u32,
    pub include_engagement: bool,
    pub parts: Vec<String>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            comment_count: 10,
            related_videos_count: 10,
            include_engagement: true,
            parts: VIDEO_PARTS.iter().map(|part| part.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement: Option<EngagementData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<CommentThread>,
}

/// Metadata edit submitted by the editor form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUpdate {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: PrivacyStatus,
}

/// Thumbnail replacement. `image_data` is bare base64, never a data URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailUpdate {
    pub video_id: String,
    pub image_data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
}

impl Authentication {
    pub fn has_token(&self) -> bool {
        self.access_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn thread_json() -> serde_json::Value {
        json!({
            "kind": "youtube#commentThread",
            "etag": "abc",
            "id": "Ugx1",
            "snippet": {
                "videoId": "vid-1",
                "topLevelComment": {
                    "kind": "youtube#comment",
                    "id": "Ugx1",
                    "snippet": {
                        "authorDisplayName": "Ana",
                        "authorProfileImageUrl": "https://img/ana.png",
                        "authorChannelUrl": "https://youtube.com/@ana",
                        "textOriginal": "great video",
                        "likeCount": 4,
                        "publishedAt": "2024-03-01T10:00:00Z",
                        "updatedAt": "2024-03-02T10:00:00Z"
                    }
                },
                "totalReplyCount": 2
            },
            "replies": {
                "comments": [
                    {"id": "Ugx1.r1", "snippet": {"authorDisplayName": "Bo", "textOriginal": "agreed", "likeCount": 1}}
                ]
            }
        })
    }

    #[test]
    fn comment_thread_flattens_nested_snippets() {
        let thread: CommentThread = serde_json::from_value(thread_json()).unwrap();
        assert_eq!(thread.id, "Ugx1");
        assert_eq!(thread.video_id, "vid-1");
        assert_eq!(thread.author_display_name, "Ana");
        assert_eq!(thread.text, "great video");
        assert_eq!(thread.like_count, 4);
        assert_eq!(thread.total_reply_count, 2);
        assert_eq!(thread.replies.len(), 1);
        assert_eq!(thread.replies[0].text, "agreed");
    }

    #[test]
    fn comment_thread_serializes_back_to_platform_layout() {
        let thread: CommentThread = serde_json::from_value(thread_json()).unwrap();
        let value = serde_json::to_value(&thread).unwrap();
        assert_eq!(
            value["snippet"]["topLevelComment"]["snippet"]["textOriginal"],
            "great video"
        );
        assert_eq!(value["snippet"]["totalReplyCount"], 2);
    }

    #[test]
    fn page_without_token_is_last_page() {
        let page: CommentThreadPage = serde_json::from_value(json!({"items": []})).unwrap();
        assert!(page.next_page_token.is_none());
        assert!(page.items.is_empty());
    }

    #[test]
    fn video_statistics_default_to_zero() {
        let video: Video = serde_json::from_value(json!({
            "id": "v",
            "snippet": {"title": "t"},
            "statistics": {"viewCount": "1500", "likeCount": "oops"}
        }))
        .unwrap();
        assert_eq!(video.view_count(), 1500);
        assert_eq!(video.like_count(), 0);
        assert_eq!(video.comment_count(), 0);
        assert_eq!(video.privacy_status(), PrivacyStatus::Private);
    }

    #[test]
    fn thumbnail_prefers_high_resolution() {
        let video: Video = serde_json::from_value(json!({
            "id": "v",
            "snippet": {
                "title": "t",
                "thumbnails": {
                    "default": {"url": "d"},
                    "medium": {"url": "m"}
                }
            }
        }))
        .unwrap();
        assert_eq!(video.thumbnail_url(), Some("m"));
    }

    #[test]
    fn privacy_status_parses_case_insensitively() {
        assert_eq!("Unlisted".parse::<PrivacyStatus>(), Ok(PrivacyStatus::Unlisted));
        assert!("hidden".parse::<PrivacyStatus>().is_err());
    }
}
