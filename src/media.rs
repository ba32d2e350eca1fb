//! Media-kind inference for optimized image records.
//!
//! The store only keeps the media URL; the kind is derived here once, at the
//! response boundary, instead of per-row CASE expressions in query text.

use serde::{Deserialize, Serialize};
use url::Url;

/// Extensions treated as still images.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp"];

/// Extensions treated as video files.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "wmv", "flv", "webm", "mkv"];

/// Hosts whose URLs are video regardless of extension (any subdomain).
const VIDEO_HOSTS: &[&str] = &["youtube.com", "youtu.be", "vimeo.com", "streamable.com"];

/// Kind of media a URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Infer the media kind from a URL.
    ///
    /// Checks known video hosts first, then the path's file extension with
    /// query and fragment ignored. Returns `None` when neither matches.
    #[must_use]
    pub fn infer(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;

        if let Some(host) = parsed.host_str() {
            let host = host.to_ascii_lowercase();
            for video_host in VIDEO_HOSTS {
                if host == *video_host || host.ends_with(&format!(".{video_host}")) {
                    return Some(Self::Video);
                }
            }
        }

        let extension = parsed
            .path_segments()
            .and_then(Iterator::last)
            .and_then(|segment| segment.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())?;

        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extensions() {
        assert_eq!(
            MediaKind::infer("https://cdn.example.com/a/b/photo.JPG"),
            Some(MediaKind::Image)
        );
        assert_eq!(
            MediaKind::infer("https://cdn.example.com/pic.webp?w=640"),
            Some(MediaKind::Image)
        );
    }

    #[test]
    fn test_video_extensions() {
        assert_eq!(
            MediaKind::infer("https://cdn.example.com/clip.mp4"),
            Some(MediaKind::Video)
        );
        assert_eq!(
            MediaKind::infer("https://cdn.example.com/clip.webm#t=10"),
            Some(MediaKind::Video)
        );
    }

    #[test]
    fn test_video_hosts() {
        assert_eq!(
            MediaKind::infer("https://www.youtube.com/watch?v=abc123"),
            Some(MediaKind::Video)
        );
        assert_eq!(
            MediaKind::infer("https://youtu.be/abc123"),
            Some(MediaKind::Video)
        );
    }

    #[test]
    fn test_unknown_urls() {
        assert_eq!(MediaKind::infer("https://example.com/page.html"), None);
        assert_eq!(MediaKind::infer("https://example.com/"), None);
        assert_eq!(MediaKind::infer("not a url"), None);
    }
}
