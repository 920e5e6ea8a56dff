//! Thumbnail selection and validation.
//!
//! A selected image goes through three checks before anything is sent to the
//! platform: declared media type, byte size, then decoded dimensions (minimum
//! width and a 16:9 aspect ratio with some slack). The first failing check
//! wins. An accepted image gets a preview handle, a temporary file the server
//! can stream back to the browser; the file disappears with the handle.

use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::ImageReader;
use tempfile::NamedTempFile;

use crate::client::{ClientError, VideoPlatform};
use crate::model::ThumbnailUpdate;

pub const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;
pub const MIN_WIDTH: u32 = 640;
pub const RECOMMENDED_WIDTH: u32 = 1280;
pub const RECOMMENDED_HEIGHT: u32 = 720;
pub const ASPECT_RATIO_TOLERANCE: f64 = 0.1;
pub const ALLOWED_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThumbnailRejection {
    #[error("unsupported format: thumbnails must be JPG, PNG or GIF (got `{media_type}`)")]
    UnsupportedFormat { media_type: String },
    #[error("file too large: the limit is 2MB and this file is {}MB", size_label(.size))]
    FileTooLarge { size: u64 },
    #[error("width too small: thumbnails need at least 640px, this image is {width}px")]
    WidthTooSmall { width: u32 },
    #[error("wrong aspect ratio: thumbnails must be 16:9, this image is {ratio:.2}")]
    WrongAspectRatio { ratio: f64 },
    #[error("unreadable image: the file could not be decoded")]
    UnreadableImage,
}

impl ThumbnailRejection {
    /// Short machine-friendly reason, used in logs and JSON responses.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } => "unsupported format",
            Self::FileTooLarge { .. } => "file too large",
            Self::WidthTooSmall { .. } => "width too small",
            Self::WrongAspectRatio { .. } => "wrong aspect ratio",
            Self::UnreadableImage => "unreadable image",
        }
    }
}

/// Size in MiB with two decimals, as shown to the user.
pub fn megabytes(size: u64) -> String {
    format!("{:.2}", size as f64 / 1024.0 / 1024.0)
}

fn size_label(size: &u64) -> String {
    megabytes(*size)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// A file picked by the user: what it claims to be plus its raw content.
#[derive(Debug, Clone)]
pub struct ThumbnailFile {
    pub file_name: Option<String>,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl ThumbnailFile {
    pub fn new(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: None,
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Reads a local file, guessing the declared type from its extension the
    /// way a browser would.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        let media_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok(Self {
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            media_type,
            bytes,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Type and size checks, which need nothing but the declared metadata.
pub fn check_declared(media_type: &str, size: u64) -> Result<(), ThumbnailRejection> {
    if !ALLOWED_TYPES.contains(&media_type) {
        return Err(ThumbnailRejection::UnsupportedFormat {
            media_type: media_type.to_string(),
        });
    }
    if size > MAX_FILE_SIZE {
        return Err(ThumbnailRejection::FileTooLarge { size });
    }
    Ok(())
}

/// Width is checked before the ratio.
pub fn check_dimensions(dimensions: Dimensions) -> Result<(), ThumbnailRejection> {
    let Dimensions { width, height } = dimensions;
    if height == 0 {
        return Err(ThumbnailRejection::UnreadableImage);
    }
    if width < MIN_WIDTH {
        return Err(ThumbnailRejection::WidthTooSmall { width });
    }
    let ratio = f64::from(width) / f64::from(height);
    let expected = f64::from(RECOMMENDED_WIDTH) / f64::from(RECOMMENDED_HEIGHT);
    if (ratio - expected).abs() > ASPECT_RATIO_TOLERANCE {
        return Err(ThumbnailRejection::WrongAspectRatio { ratio });
    }
    Ok(())
}

/// Reads only the image header; the pixels are never decoded.
pub fn decode_dimensions(bytes: &[u8]) -> Result<Dimensions, ThumbnailRejection> {
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|_| ThumbnailRejection::UnreadableImage)?
        .into_dimensions()
        .map_err(|_| ThumbnailRejection::UnreadableImage)?;
    Ok(Dimensions { width, height })
}

pub fn validate(file: &ThumbnailFile) -> Result<Dimensions, ThumbnailRejection> {
    check_declared(&file.media_type, file.size())?;
    let dimensions = decode_dimensions(&file.bytes)?;
    check_dimensions(dimensions)?;
    Ok(dimensions)
}

/// Temporary copy of an accepted image, removed from disk on drop.
#[derive(Debug)]
pub struct PreviewHandle {
    file: NamedTempFile,
    media_type: String,
}

impl PreviewHandle {
    fn create(file: &ThumbnailFile) -> io::Result<Self> {
        let suffix = mime_guess::get_mime_extensions_str(&file.media_type)
            .and_then(|exts| exts.first())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let mut temp = tempfile::Builder::new()
            .prefix("tubedesk-thumb-")
            .suffix(&suffix)
            .tempfile()?;
        temp.write_all(&file.bytes)?;
        temp.flush()?;
        Ok(Self {
            file: temp,
            media_type: file.media_type.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }
}

#[derive(Debug)]
pub enum CandidateState {
    Pending,
    Accepted {
        dimensions: Dimensions,
        preview: PreviewHandle,
    },
    Rejected(ThumbnailRejection),
}

#[derive(Debug)]
pub struct ThumbnailCandidate {
    file: ThumbnailFile,
    state: CandidateState,
}

impl ThumbnailCandidate {
    pub fn new(file: ThumbnailFile) -> Self {
        Self {
            file,
            state: CandidateState::Pending,
        }
    }

    /// Runs validation once; later calls keep the first outcome. Only an
    /// I/O failure while writing the preview is reported as an error.
    pub fn evaluate(&mut self) -> io::Result<&CandidateState> {
        if matches!(self.state, CandidateState::Pending) {
            self.state = match validate(&self.file) {
                Ok(dimensions) => CandidateState::Accepted {
                    dimensions,
                    preview: PreviewHandle::create(&self.file)?,
                },
                Err(rejection) => CandidateState::Rejected(rejection),
            };
        }
        Ok(&self.state)
    }

    pub fn state(&self) -> &CandidateState {
        &self.state
    }

    pub fn file(&self) -> &ThumbnailFile {
        &self.file
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.state, CandidateState::Accepted { .. })
    }

    pub fn rejection(&self) -> Option<&ThumbnailRejection> {
        match &self.state {
            CandidateState::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }

    pub fn preview(&self) -> Option<&PreviewHandle> {
        match &self.state {
            CandidateState::Accepted { preview, .. } => Some(preview),
            _ => None,
        }
    }
}

/// Base64 body for the upload call.
pub fn encode_image_data(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Drops a `data:<type>;base64,` header if present.
pub fn strip_data_uri(data: &str) -> &str {
    match data.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(data, |(_, payload)| payload),
        None => data,
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UploadError {
    #[error("video id not provided")]
    MissingVideoId,
    #[error("no accepted image selected")]
    NoFile,
    #[error("failed to update thumbnail: {0}")]
    Remote(#[from] ClientError),
}

/// Form-level holder for the currently selected thumbnail.
#[derive(Debug, Default)]
pub struct ThumbnailSlot {
    candidate: Option<ThumbnailCandidate>,
}

impl ThumbnailSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current selection (releasing its preview) and validates
    /// the new file.
    pub fn select(&mut self, file: ThumbnailFile) -> io::Result<&ThumbnailCandidate> {
        self.candidate = None;
        let mut candidate = ThumbnailCandidate::new(file);
        candidate.evaluate()?;
        Ok(self.install(candidate))
    }

    /// Replaces the current selection with a candidate evaluated elsewhere.
    /// A still-pending candidate is installed as is.
    pub fn install(&mut self, candidate: ThumbnailCandidate) -> &ThumbnailCandidate {
        match candidate.rejection() {
            Some(rejection) => {
                tracing::info!(reason = rejection.reason(), "thumbnail rejected")
            }
            None => tracing::debug!("thumbnail accepted"),
        }
        self.candidate.insert(candidate)
    }

    pub fn clear(&mut self) {
        self.candidate = None;
    }

    pub fn candidate(&self) -> Option<&ThumbnailCandidate> {
        self.candidate.as_ref()
    }

    pub fn preview_path(&self) -> Option<PathBuf> {
        self.candidate
            .as_ref()
            .and_then(ThumbnailCandidate::preview)
            .map(|preview| preview.path().to_path_buf())
    }

    /// Builds the upload request for the accepted selection.
    pub fn prepare_upload(&self, video_id: Option<&str>) -> Result<ThumbnailUpdate, UploadError> {
        let video_id = video_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(UploadError::MissingVideoId)?;
        let candidate = self
            .candidate
            .as_ref()
            .filter(|candidate| candidate.is_accepted())
            .ok_or(UploadError::NoFile)?;
        Ok(ThumbnailUpdate {
            video_id: video_id.to_string(),
            image_data: encode_image_data(&candidate.file().bytes),
        })
    }

    pub fn upload(
        &self,
        client: &dyn VideoPlatform,
        video_id: Option<&str>,
    ) -> Result<(), UploadError> {
        let update = self.prepare_upload(video_id)?;
        client.update_thumbnail(&update)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePlatform;
    use image::{ImageFormat, RgbImage};

    fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::new(width, height).write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    fn png(width: u32, height: u32) -> ThumbnailFile {
        ThumbnailFile::new("image/png", encoded(width, height, ImageFormat::Png))
    }

    #[test]
    fn disallowed_type_is_rejected_before_anything_else() {
        let file = ThumbnailFile::new("image/webp", vec![0; 10 * 1024 * 1024]);
        let err = validate(&file).unwrap_err();
        assert_eq!(err.reason(), "unsupported format");
    }

    #[test]
    fn oversized_file_reports_megabytes() {
        let err = check_declared("image/jpeg", MAX_FILE_SIZE + 1).unwrap_err();
        assert_eq!(err, ThumbnailRejection::FileTooLarge { size: 2_097_153 });
        assert!(err.to_string().contains("2.00MB"));

        let err = check_declared("image/png", 3_500_000).unwrap_err();
        assert!(err.to_string().contains("3.34MB"));
    }

    #[test]
    fn exact_size_limit_is_allowed() {
        assert!(check_declared("image/gif", MAX_FILE_SIZE).is_ok());
    }

    #[test]
    fn width_check_precedes_ratio_check() {
        let err = check_dimensions(Dimensions { width: 639, height: 360 }).unwrap_err();
        assert_eq!(err, ThumbnailRejection::WidthTooSmall { width: 639 });
    }

    #[test]
    fn square_image_has_wrong_ratio() {
        let err = check_dimensions(Dimensions { width: 1000, height: 1000 }).unwrap_err();
        assert_eq!(err.reason(), "wrong aspect ratio");
        assert!(err.to_string().contains("1.00"));
    }

    #[test]
    fn ratio_within_tolerance_passes() {
        assert!(check_dimensions(Dimensions { width: 1280, height: 720 }).is_ok());
        assert!(check_dimensions(Dimensions { width: 1920, height: 1080 }).is_ok());
        assert!(check_dimensions(Dimensions { width: 640, height: 380 }).is_ok());
    }

    #[test]
    fn zero_height_is_unreadable() {
        let err = check_dimensions(Dimensions { width: 1280, height: 0 }).unwrap_err();
        assert_eq!(err, ThumbnailRejection::UnreadableImage);
    }

    #[test]
    fn real_image_of_target_size_is_accepted() {
        let dims = validate(&png(1280, 720)).unwrap();
        assert_eq!(dims, Dimensions { width: 1280, height: 720 });
    }

    #[test]
    fn declared_type_need_not_match_content() {
        let file = ThumbnailFile::new("image/jpeg", encoded(1280, 720, ImageFormat::Png));
        assert!(validate(&file).is_ok());
    }

    #[test]
    fn garbage_bytes_are_unreadable() {
        let file = ThumbnailFile::new("image/png", b"definitely not a png".to_vec());
        assert_eq!(validate(&file), Err(ThumbnailRejection::UnreadableImage));
    }

    #[test]
    fn accepted_candidate_has_preview_that_is_released() {
        let mut slot = ThumbnailSlot::new();
        slot.select(png(1280, 720)).unwrap();
        let first = slot.preview_path().unwrap();
        assert!(first.exists());
        assert_eq!(fs::read(&first).unwrap(), slot.candidate().unwrap().file().bytes);

        slot.select(png(1000, 1000)).unwrap();
        assert!(!first.exists());
        assert!(slot.preview_path().is_none());
        assert_eq!(
            slot.candidate().unwrap().rejection().map(ThumbnailRejection::reason),
            Some("wrong aspect ratio")
        );
    }

    #[test]
    fn installing_an_evaluated_candidate_replaces_the_selection() {
        let mut slot = ThumbnailSlot::new();
        slot.select(png(1280, 720)).unwrap();
        let previous = slot.preview_path().unwrap();

        let mut candidate = ThumbnailCandidate::new(png(1920, 1080));
        candidate.evaluate().unwrap();
        let fresh = candidate.preview().unwrap().path().to_path_buf();
        assert!(fresh.exists());

        let installed = slot.install(candidate);
        assert!(installed.is_accepted());
        assert!(!previous.exists());
        assert_eq!(slot.preview_path(), Some(fresh));
    }

    #[test]
    fn clearing_releases_preview() {
        let mut slot = ThumbnailSlot::new();
        slot.select(png(1280, 720)).unwrap();
        let path = slot.preview_path().unwrap();
        slot.clear();
        assert!(!path.exists());
        assert!(slot.candidate().is_none());
    }

    #[test]
    fn strip_data_uri_removes_header_only() {
        assert_eq!(strip_data_uri("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_uri("QUJD"), "QUJD");
        assert_eq!(strip_data_uri("data:broken"), "data:broken");
    }

    #[test]
    fn upload_requires_video_id_and_accepted_file() {
        let fake = FakePlatform::new();
        let mut slot = ThumbnailSlot::new();
        assert_eq!(slot.upload(&fake, Some("v1")), Err(UploadError::NoFile));

        slot.select(png(1000, 1000)).unwrap();
        assert_eq!(slot.upload(&fake, Some("v1")), Err(UploadError::NoFile));

        slot.select(png(1280, 720)).unwrap();
        assert_eq!(slot.upload(&fake, None), Err(UploadError::MissingVideoId));
        assert!(fake.thumbnail_updates().is_empty());

        slot.upload(&fake, Some("v1")).unwrap();
        let sent = fake.thumbnail_updates();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].video_id, "v1");
        let decoded = STANDARD.decode(&sent[0].image_data).unwrap();
        assert_eq!(decoded, slot.candidate().unwrap().file().bytes);
    }

    #[test]
    fn upload_surfaces_remote_failure() {
        let fake = FakePlatform::new();
        fake.fail_with(ClientError::Status { code: 403 });
        let mut slot = ThumbnailSlot::new();
        slot.select(png(1280, 720)).unwrap();
        assert_eq!(
            slot.upload(&fake, Some("v1")),
            Err(UploadError::Remote(ClientError::Status { code: 403 }))
        );
    }

    #[test]
    fn from_path_guesses_media_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thumb.png");
        fs::write(&path, encoded(1280, 720, ImageFormat::Png)).unwrap();
        let file = ThumbnailFile::from_path(&path).unwrap();
        assert_eq!(file.media_type, "image/png");
        assert_eq!(file.file_name.as_deref(), Some("thumb.png"));
        assert!(validate(&file).is_ok());
    }
}
