//! Remote invocation layer.
//!
//! Everything the front-end does against the platform goes through the
//! [`VideoPlatform`] trait so that the feed controller, the forms and the page
//! loader can be driven by a fake in tests. [`HttpPlatform`] is the production
//! implementation, a blocking `ureq` agent talking to the YouTube Data API.
//! Callers running on the async runtime hop onto `spawn_blocking` before
//! calling it.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::Settings;
use crate::model::{
    AnalyzeOptions, Authentication, CommentThread, CommentThreadPage, EngagementData,
    SentComment, ThumbnailUpdate, Video, VideoAnalysis, VideoList, VideoUpdate,
};
use crate::thumbnail::strip_data_uri;

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const OAUTH_SCOPE: &str = "https://www.googleapis.com/auth/youtube.force-ssl";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("the platform answered with HTTP {code}")]
    Status { code: u16 },
    #[error("unexpected response from the platform: {0}")]
    Decode(String),
    #[error("no access token available; sign in first")]
    Unauthorized,
}

impl From<ureq::Error> for ClientError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => ClientError::Status { code },
            ureq::Error::Transport(transport) => ClientError::Transport(transport.to_string()),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// The remote operations the front-end relies on.
pub trait VideoPlatform: Send + Sync {
    fn list_comments(
        &self,
        parent_id: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> ClientResult<CommentThreadPage>;

    fn send_comment(&self, video_id: &str, text: &str) -> ClientResult<SentComment>;

    /// Succeeds on any 2xx answer; the body carries nothing the UI needs.
    fn reply_comment(&self, parent_id: &str, text: &str) -> ClientResult<()>;

    fn update_video(&self, update: &VideoUpdate) -> ClientResult<()>;

    fn update_thumbnail(&self, update: &ThumbnailUpdate) -> ClientResult<()>;

    fn get_video_details(&self, video_id: &str, parts: &[String]) -> ClientResult<VideoList>;

    fn analyze_video(&self, video_id: &str, options: &AnalyzeOptions)
    -> ClientResult<VideoAnalysis>;

    fn authenticate(&self) -> ClientResult<Authentication>;
}

pub struct HttpPlatform {
    agent: ureq::Agent,
    api_base_url: String,
    upload_base_url: String,
    access_token: Option<String>,
    oauth_client_id: Option<String>,
    oauth_redirect_uri: Option<String>,
}

impl HttpPlatform {
    pub fn new(settings: &Settings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(settings.request_timeout)
            .user_agent(concat!("tubedesk/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            api_base_url: settings.api_base_url.clone(),
            upload_base_url: settings.upload_base_url.clone(),
            access_token: settings.access_token.clone(),
            oauth_client_id: settings.oauth_client_id.clone(),
            oauth_redirect_uri: settings.oauth_redirect_uri.clone(),
        }
    }

    fn endpoint(&self, resource: &str) -> String {
        format!("{}/youtube/v3/{resource}", self.api_base_url)
    }

    fn bearer(&self) -> ClientResult<String> {
        self.access_token
            .as_deref()
            .map(|token| format!("Bearer {token}"))
            .ok_or(ClientError::Unauthorized)
    }

    fn read_json<T: DeserializeOwned>(response: ureq::Response) -> ClientResult<T> {
        response
            .into_json()
            .map_err(|err| ClientError::Decode(err.to_string()))
    }

    fn authorization_url(&self) -> Option<String> {
        let client_id = self.oauth_client_id.as_deref()?;
        let redirect_uri = self.oauth_redirect_uri.as_deref().unwrap_or_default();
        let url = url::Url::parse_with_params(
            AUTHORIZATION_ENDPOINT,
            &[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", OAUTH_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .ok()?;
        Some(url.to_string())
    }
}

impl VideoPlatform for HttpPlatform {
    fn list_comments(
        &self,
        parent_id: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> ClientResult<CommentThreadPage> {
        let mut request = self
            .agent
            .get(&self.endpoint("commentThreads"))
            .set("Authorization", &self.bearer()?)
            .query("part", "snippet,replies")
            .query("videoId", parent_id)
            .query("maxResults", &max_results.to_string())
            .query("textFormat", "plainText");
        if let Some(token) = page_token {
            request = request.query("pageToken", token);
        }
        tracing::debug!(video_id = parent_id, page_token, "listing comment threads");
        Self::read_json(request.call()?)
    }

    fn send_comment(&self, video_id: &str, text: &str) -> ClientResult<SentComment> {
        let body = json!({
            "snippet": {
                "videoId": video_id,
                "topLevelComment": { "snippet": { "textOriginal": text } }
            }
        });
        let response = self
            .agent
            .post(&self.endpoint("commentThreads"))
            .set("Authorization", &self.bearer()?)
            .query("part", "snippet")
            .send_json(body)?;
        let comment: CommentThread = Self::read_json(response)?;
        tracing::info!(video_id, thread_id = %comment.id, "posted comment");
        Ok(SentComment { comment })
    }

    fn reply_comment(&self, parent_id: &str, text: &str) -> ClientResult<()> {
        let body = json!({ "snippet": { "parentId": parent_id, "textOriginal": text } });
        self.agent
            .post(&self.endpoint("comments"))
            .set("Authorization", &self.bearer()?)
            .query("part", "snippet")
            .send_json(body)?;
        tracing::info!(parent_id, "posted reply");
        Ok(())
    }

    fn update_video(&self, update: &VideoUpdate) -> ClientResult<()> {
        let body = json!({
            "id": update.video_id,
            "snippet": {
                "title": update.title,
                "description": update.description,
                "tags": update.tags,
                "categoryId": update.category_id,
            },
            "status": { "privacyStatus": update.privacy_status },
        });
        self.agent
            .put(&self.endpoint("videos"))
            .set("Authorization", &self.bearer()?)
            .query("part", "snippet,status")
            .send_json(body)?;
        tracing::info!(video_id = %update.video_id, "updated video metadata");
        Ok(())
    }

    fn update_thumbnail(&self, update: &ThumbnailUpdate) -> ClientResult<()> {
        let bytes = STANDARD
            .decode(strip_data_uri(&update.image_data))
            .map_err(|err| ClientError::Decode(format!("thumbnail payload: {err}")))?;
        let content_type = image::guess_format(&bytes)
            .map(|format| format.to_mime_type())
            .unwrap_or("application/octet-stream");
        self.agent
            .post(&format!(
                "{}/youtube/v3/thumbnails/set",
                self.upload_base_url
            ))
            .set("Authorization", &self.bearer()?)
            .set("Content-Type", content_type)
            .query("videoId", &update.video_id)
            .send_bytes(&bytes)?;
        tracing::info!(video_id = %update.video_id, bytes = bytes.len(), "replaced thumbnail");
        Ok(())
    }

    fn get_video_details(&self, video_id: &str, parts: &[String]) -> ClientResult<VideoList> {
        let response = self
            .agent
            .get(&self.endpoint("videos"))
            .set("Authorization", &self.bearer()?)
            .query("part", &parts.join(","))
            .query("id", video_id)
            .call()?;
        Self::read_json(response)
    }

    fn analyze_video(
        &self,
        video_id: &str,
        options: &AnalyzeOptions,
    ) -> ClientResult<VideoAnalysis> {
        // Related videos are no longer offered by the Data API, so the count
        // is only logged.
        tracing::debug!(
            video_id,
            related_videos = options.related_videos_count,
            "analyzing video"
        );
        let list = self.get_video_details(video_id, &options.parts)?;
        let Some(video) = list.items.first() else {
            return Ok(VideoAnalysis::default());
        };
        let engagement = options
            .include_engagement
            .then(|| compute_engagement(video, Utc::now()));
        let comments = if options.comment_count > 0 {
            self.list_comments(video_id, options.comment_count, None)?
                .items
        } else {
            Vec::new()
        };
        Ok(VideoAnalysis {
            engagement,
            comments,
        })
    }

    fn authenticate(&self) -> ClientResult<Authentication> {
        Ok(Authentication {
            access_token: self.access_token.clone(),
            authorization_url: self.authorization_url(),
        })
    }
}

/// Derives per-day and per-view ratios from the video's statistics. A video
/// always counts as online for at least one day.
pub fn compute_engagement(video: &Video, now: DateTime<Utc>) -> EngagementData {
    let published = DateTime::parse_from_rfc3339(&video.snippet.published_at)
        .map(|date| date.with_timezone(&Utc))
        .unwrap_or(now);
    let days_online = (now - published).num_days().max(1);
    let days_online = u32::try_from(days_online).unwrap_or(u32::MAX);

    let views = video.view_count() as f64;
    let per_view = |count: u64| {
        if views > 0.0 {
            count as f64 / views
        } else {
            0.0
        }
    };

    EngagementData {
        views_per_day: views / f64::from(days_online),
        likes_per_view: per_view(video.like_count()),
        comments_per_view: per_view(video.comment_count()),
        upload_date: published.date_naive().to_string(),
        days_online,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvConfig, resolve};
    use chrono::TimeZone;
    use serde_json::json;

    fn video(published: &str, views: &str, likes: &str, comments: &str) -> Video {
        serde_json::from_value(json!({
            "id": "v1",
            "snippet": {"title": "t", "publishedAt": published},
            "statistics": {"viewCount": views, "likeCount": likes, "commentCount": comments}
        }))
        .unwrap()
    }

    #[test]
    fn engagement_ratios_follow_statistics() {
        let now = Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap();
        let data = compute_engagement(&video("2024-01-01T00:00:00Z", "1000", "50", "10"), now);
        assert_eq!(data.days_online, 10);
        assert!((data.views_per_day - 100.0).abs() < f64::EPSILON);
        assert!((data.likes_per_view - 0.05).abs() < 1e-12);
        assert!((data.comments_per_view - 0.01).abs() < 1e-12);
        assert_eq!(data.upload_date, "2024-01-01");
    }

    #[test]
    fn engagement_handles_fresh_video_without_views() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
        let data = compute_engagement(&video("2024-01-01T00:00:00Z", "0", "0", "0"), now);
        assert_eq!(data.days_online, 1);
        assert_eq!(data.likes_per_view, 0.0);
        assert_eq!(data.views_per_day, 0.0);
    }

    #[test]
    fn authorization_url_requires_client_id() {
        let platform = HttpPlatform::new(&resolve(EnvConfig::default()));
        let auth = platform.authenticate().unwrap();
        assert!(!auth.has_token());
        assert!(auth.authorization_url.is_none());

        let platform = HttpPlatform::new(&resolve(EnvConfig {
            oauth_client_id: Some("client-123".into()),
            oauth_redirect_uri: Some("http://localhost:8080/".into()),
            access_token: Some("tok".into()),
            ..EnvConfig::default()
        }));
        let auth = platform.authenticate().unwrap();
        assert!(auth.has_token());
        let url = auth.authorization_url.unwrap();
        assert!(url.starts_with(AUTHORIZATION_ENDPOINT));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2F"));
    }

    #[test]
    fn calls_without_token_fail_before_the_network() {
        let platform = HttpPlatform::new(&resolve(EnvConfig::default()));
        assert_eq!(
            platform.list_comments("v1", 20, None),
            Err(ClientError::Unauthorized)
        );
    }
}
