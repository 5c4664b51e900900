//! Track handle supplied by a playlist.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

/// A single playlist entry.
///
/// The engine only looks at the URI; everything else is carried along for
/// observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Track {
    /// Location of the audio data (file path or URL).
    uri: String,
    /// Display title, if the playlist knows one.
    title: Option<String>,
}

impl Track {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Lowercased file extension of the URI path.
    ///
    /// For URLs the query string and fragment are ignored.
    pub fn extension(&self) -> Option<String> {
        uri_extension(&self.uri)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.title {
            Some(title) => write!(f, "{title} ({})", self.uri),
            None => f.write_str(&self.uri),
        }
    }
}

/// Lowercased extension of a path or URL.
pub fn uri_extension(uri: &str) -> Option<String> {
    // Single letter schemes are Windows drive letters, not URLs.
    let path = match Url::parse(uri) {
        Ok(url) if url.scheme().len() > 1 => url.path().to_string(),
        _ => uri.to_string(),
    };

    Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_from_path() {
        assert_eq!(Track::new("/music/a.FLAC").extension().as_deref(), Some("flac"));
        assert_eq!(Track::new("song.mp3").extension().as_deref(), Some("mp3"));
        assert_eq!(Track::new("/music/noext").extension(), None);
    }

    #[test]
    fn test_extension_from_url() {
        let track = Track::new("http://host:8080/media/track.ogg?sid=42#t=1");
        assert_eq!(track.extension().as_deref(), Some("ogg"));
        assert_eq!(
            Track::new("file:///home/me/x.Wav").extension().as_deref(),
            Some("wav")
        );
    }

    #[test]
    fn test_windows_drive_path() {
        assert_eq!(
            Track::new(r"C:\music\a.mp3").extension().as_deref(),
            Some("mp3")
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Track::new("a.mp3").to_string(), "a.mp3");
        assert_eq!(
            Track::new("a.mp3").with_title("Intro").to_string(),
            "Intro (a.mp3)"
        );
    }
}
