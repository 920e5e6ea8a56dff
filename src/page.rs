//! Data behind one render of the editor page.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::{ClientResult, VideoPlatform};
use crate::model::{AnalyzeOptions, EngagementData, VIDEO_PARTS, Video};

/// Query string of `GET /`. `success`/`message` carry the outcome of the
/// previous form submission across the redirect.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PageQuery {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
    pub success: Option<String>,
    pub message: Option<String>,
}

impl PageQuery {
    pub fn video_id(&self) -> Option<&str> {
        self.video_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Outcome banner, present only when both `success` and a non-empty
    /// `message` were passed.
    pub fn update_result(&self) -> Option<UpdateResult> {
        let success = self.success.as_deref()?;
        let message = self.message.as_deref().filter(|m| !m.is_empty())?;
        Some(UpdateResult {
            success: success == "true",
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateResult {
    pub success: bool,
    pub message: String,
}

impl UpdateResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageData {
    pub has_token: bool,
    pub authorization_url: Option<String>,
    pub video_id: Option<String>,
    pub video: Option<Video>,
    pub update_result: Option<UpdateResult>,
    pub engagement: Option<EngagementData>,
}

/// Authenticates, then fetches the video and its engagement analysis. Remote
/// failures end up in `update_result` rather than failing the page.
pub fn load_page(client: &dyn VideoPlatform, query: &PageQuery) -> ClientResult<PageData> {
    let auth = client.authenticate()?;
    let mut data = PageData {
        has_token: auth.has_token(),
        authorization_url: auth.authorization_url,
        video_id: query.video_id().map(str::to_string),
        update_result: query.update_result(),
        ..PageData::default()
    };
    if !data.has_token {
        return Ok(data);
    }
    let Some(video_id) = data.video_id.clone() else {
        data.update_result
            .get_or_insert_with(|| UpdateResult::failure("video id not provided"));
        return Ok(data);
    };

    let parts: Vec<String> = VIDEO_PARTS.iter().map(|part| part.to_string()).collect();
    let details = match client.get_video_details(&video_id, &parts) {
        Ok(details) => details,
        Err(err) => {
            warn!(video_id = %video_id, error = %err, "failed to load video details");
            data.update_result
                .get_or_insert_with(|| UpdateResult::failure(format!("failed to load the video: {err}")));
            return Ok(data);
        }
    };

    // The comment feed loads its own first page, so the analysis skips it.
    let options = AnalyzeOptions {
        comment_count: 0,
        ..AnalyzeOptions::default()
    };
    debug!(
        video_id = %video_id,
        comment_count = options.comment_count,
        related_videos_count = options.related_videos_count,
        "analyzing video"
    );
    data.engagement = match client.analyze_video(&video_id, &options) {
        Ok(analysis) => analysis.engagement,
        Err(err) => {
            warn!(video_id = %video_id, error = %err, "engagement analysis failed");
            None
        }
    };

    data.video = details.items.into_iter().next();
    if data.video.is_none() {
        data.update_result
            .get_or_insert_with(|| UpdateResult::failure("video not found on the platform"));
    }
    Ok(data)
}
