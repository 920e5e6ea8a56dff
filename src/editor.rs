//! Metadata editor form: title, description, tags and privacy.

use serde::Deserialize;

use crate::client::{ClientError, VideoPlatform};
use crate::model::{PrivacyStatus, Video, VideoUpdate};

/// The platform caps titles at 100 characters.
pub const MAX_TITLE_CHARS: usize = 100;
pub const DEFAULT_CATEGORY_ID: &str = "1";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditorError {
    #[error("video id not provided")]
    MissingVideoId,
    #[error("the title must not be empty")]
    EmptyTitle,
    #[error("the title has {0} characters; the limit is 100")]
    TitleTooLong(usize),
    #[error("failed to update the video: {0}")]
    Remote(#[from] ClientError),
}

/// Form fields as posted by the browser. Tags travel as one comma-separated
/// string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VideoEditForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub privacy_status: PrivacyStatus,
    #[serde(default = "default_category")]
    pub category_id: String,
}

fn default_category() -> String {
    DEFAULT_CATEGORY_ID.to_string()
}

impl Default for VideoEditForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            tags: String::new(),
            privacy_status: PrivacyStatus::default(),
            category_id: default_category(),
        }
    }
}

impl VideoEditForm {
    /// Prefills the form from the loaded video; missing pieces fall back to
    /// empty fields and a private video.
    pub fn from_video(video: Option<&Video>) -> Self {
        let Some(video) = video else {
            return Self::default();
        };
        Self {
            title: video.snippet.title.clone(),
            description: video.snippet.description.clone(),
            tags: video.snippet.tags.join(", "),
            privacy_status: video.privacy_status(),
            category_id: video
                .snippet
                .category_id
                .clone()
                .unwrap_or_else(default_category),
        }
    }

    pub fn tag_list(&self) -> Vec<String> {
        parse_tags(&self.tags)
    }

    pub fn to_update(&self, video_id: Option<&str>) -> Result<VideoUpdate, EditorError> {
        let video_id = video_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(EditorError::MissingVideoId)?;
        let title = self.title.trim();
        if title.is_empty() {
            return Err(EditorError::EmptyTitle);
        }
        let length = title.chars().count();
        if length > MAX_TITLE_CHARS {
            return Err(EditorError::TitleTooLong(length));
        }
        Ok(VideoUpdate {
            video_id: video_id.to_string(),
            title: title.to_string(),
            description: self.description.clone(),
            tags: self.tag_list(),
            category_id: self.category_id.clone(),
            privacy_status: self.privacy_status,
        })
    }

    pub fn submit(&self, client: &dyn VideoPlatform, video_id: Option<&str>) -> Result<(), EditorError> {
        let update = self.to_update(video_id)?;
        client.update_video(&update)?;
        Ok(())
    }
}

/// Splits on commas, trims, and drops empty and repeated tags.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|tag| !tag.is_empty()) {
        if !tags.iter().any(|seen| seen.eq_ignore_ascii_case(tag)) {
            tags.push(tag.to_string());
        }
    }
    tags
}
