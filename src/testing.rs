//! In-memory `VideoPlatform` used by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;

use crate::client::{ClientError, ClientResult, VideoPlatform};
use crate::model::{
    AnalyzeOptions, Authentication, CommentThread, CommentThreadPage, EngagementData,
    SentComment, ThumbnailUpdate, Video, VideoAnalysis, VideoList, VideoUpdate,
};

pub fn thread(id: &str) -> CommentThread {
    thread_for("vid-1", id)
}

pub fn thread_for(video_id: &str, id: &str) -> CommentThread {
    CommentThread {
        id: id.to_string(),
        video_id: video_id.to_string(),
        author_display_name: format!("author of {id}"),
        author_profile_image_url: format!("https://img.example/{id}.png"),
        author_channel_url: format!("https://youtube.example/{id}"),
        text: format!("text of {id}"),
        like_count: 0,
        published_at: "2024-05-01T12:00:00Z".to_string(),
        updated_at: "2024-05-01T12:00:00Z".to_string(),
        total_reply_count: 0,
        replies: Vec::new(),
    }
}

pub fn page(ids: &[&str], next: Option<&str>) -> CommentThreadPage {
    CommentThreadPage {
        items: ids.iter().map(|id| thread(id)).collect(),
        next_page_token: next.map(str::to_string),
    }
}

pub fn video(id: &str) -> Video {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "snippet": {
            "title": format!("Video {id}"),
            "description": "a description",
            "channelTitle": "Channel",
            "publishedAt": "2024-01-01T00:00:00Z",
            "tags": ["rust", "video"],
            "categoryId": "22",
            "thumbnails": {"high": {"url": format!("https://i.example/{id}/hq.jpg")}}
        },
        "status": {"privacyStatus": "unlisted"},
        "statistics": {"viewCount": "1234", "likeCount": "56", "commentCount": "7"}
    }))
    .expect("fixture video")
}

#[derive(Default)]
struct State {
    pages: VecDeque<ClientResult<CommentThreadPage>>,
    list_calls: Vec<(String, u32, Option<String>)>,
    list_delay: Option<Duration>,
    analyze_calls: Vec<(String, AnalyzeOptions)>,
    posted: Vec<(String, String)>,
    next_comment: Option<CommentThread>,
    replies: Vec<(String, String)>,
    video_updates: Vec<VideoUpdate>,
    thumbnail_updates: Vec<ThumbnailUpdate>,
    videos: HashMap<String, Video>,
    engagement: Option<EngagementData>,
    access_token: Option<String>,
    failure: Option<ClientError>,
}

/// Scripted platform. Comment pages are served in the order they were pushed;
/// once the queue is empty an empty last page is returned. `fail_with` makes
/// every call fail until `recover` is called. `delay_next_list` stalls the
/// next comment listing on the calling thread.
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<State>,
}

impl FakePlatform {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state.lock().access_token = Some("token".to_string());
        fake
    }

    pub fn push_page(&self, page: CommentThreadPage) {
        self.state.lock().pages.push_back(Ok(page));
    }

    pub fn push_page_error(&self, err: ClientError) {
        self.state.lock().pages.push_back(Err(err));
    }

    pub fn next_comment(&self, thread: CommentThread) {
        self.state.lock().next_comment = Some(thread);
    }

    pub fn add_video(&self, video: Video) {
        self.state.lock().videos.insert(video.id.clone(), video);
    }

    pub fn delay_next_list(&self, delay: Duration) {
        self.state.lock().list_delay = Some(delay);
    }

    pub fn set_engagement(&self, engagement: EngagementData) {
        self.state.lock().engagement = Some(engagement);
    }

    pub fn set_access_token(&self, token: Option<&str>) {
        self.state.lock().access_token = token.map(str::to_string);
    }

    pub fn fail_with(&self, err: ClientError) {
        self.state.lock().failure = Some(err);
    }

    pub fn recover(&self) {
        self.state.lock().failure = None;
    }

    pub fn list_calls(&self) -> Vec<(String, u32, Option<String>)> {
        self.state.lock().list_calls.clone()
    }

    pub fn analyze_calls(&self) -> Vec<(String, AnalyzeOptions)> {
        self.state.lock().analyze_calls.clone()
    }

    pub fn posted_comments(&self) -> Vec<(String, String)> {
        self.state.lock().posted.clone()
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.state.lock().replies.clone()
    }

    pub fn video_updates(&self) -> Vec<VideoUpdate> {
        self.state.lock().video_updates.clone()
    }

    pub fn thumbnail_updates(&self) -> Vec<ThumbnailUpdate> {
        self.state.lock().thumbnail_updates.clone()
    }

    fn check(state: &State) -> ClientResult<()> {
        match &state.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl VideoPlatform for FakePlatform {
    fn list_comments(
        &self,
        parent_id: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> ClientResult<CommentThreadPage> {
        let delay = self.state.lock().list_delay.take();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let mut state = self.state.lock();
        state.list_calls.push((
            parent_id.to_string(),
            max_results,
            page_token.map(str::to_string),
        ));
        Self::check(&state)?;
        state
            .pages
            .pop_front()
            .unwrap_or_else(|| Ok(CommentThreadPage::default()))
    }

    fn send_comment(&self, video_id: &str, text: &str) -> ClientResult<SentComment> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        state.posted.push((video_id.to_string(), text.to_string()));
        let count = state.posted.len();
        let comment = state.next_comment.take().unwrap_or_else(|| {
            let mut posted = thread_for(video_id, &format!("posted-{count}"));
            posted.text = text.to_string();
            posted
        });
        Ok(SentComment { comment })
    }

    fn reply_comment(&self, parent_id: &str, text: &str) -> ClientResult<()> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        state.replies.push((parent_id.to_string(), text.to_string()));
        Ok(())
    }

    fn update_video(&self, update: &VideoUpdate) -> ClientResult<()> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        state.video_updates.push(update.clone());
        Ok(())
    }

    fn update_thumbnail(&self, update: &ThumbnailUpdate) -> ClientResult<()> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        state.thumbnail_updates.push(update.clone());
        Ok(())
    }

    fn get_video_details(&self, video_id: &str, _parts: &[String]) -> ClientResult<VideoList> {
        let state = self.state.lock();
        Self::check(&state)?;
        Ok(VideoList {
            items: state.videos.get(video_id).cloned().into_iter().collect(),
        })
    }

    fn analyze_video(
        &self,
        video_id: &str,
        options: &AnalyzeOptions,
    ) -> ClientResult<VideoAnalysis> {
        let mut state = self.state.lock();
        state
            .analyze_calls
            .push((video_id.to_string(), options.clone()));
        Self::check(&state)?;
        if !state.videos.contains_key(video_id) {
            return Ok(VideoAnalysis::default());
        }
        Ok(VideoAnalysis {
            engagement: state
                .engagement
                .clone()
                .filter(|_| options.include_engagement),
            comments: Vec::new(),
        })
    }

    fn authenticate(&self) -> ClientResult<Authentication> {
        let state = self.state.lock();
        Ok(Authentication {
            access_token: state.access_token.clone(),
            authorization_url: Some("https://accounts.example/auth".to_string()),
        })
    }
}
