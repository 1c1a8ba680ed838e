//! Turning what a user typed or uploaded into queueable tracks.

use crate::{
    error::MusicError,
    queue::{Requester, Track, TrackSource},
};
use log::{debug, warn};
use poise::serenity_prelude::Attachment;
use reqwest::Client;
use serde::Deserialize;
use songbird::input::{AuxMetadata, Compose, HttpRequest, Input, YoutubeDl};
use std::time::Duration;
use tokio::process::Command;
use url::Url;

pub const MAX_QUERY_LEN: usize = 200;
pub const SEARCH_RESULTS: usize = 5;

const YOUTUBE_HOSTS: [&str; 5] = [
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];
const AUDIO_EXTENSIONS: [&str; 6] = [".mp3", ".wav", ".flac", ".ogg", ".m4a", ".webm"];
const AUDIO_MIME_TYPES: [&str; 7] = [
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/flac",
    "audio/ogg",
    "audio/x-m4a",
    "audio/webm",
];

/// http(s) only; anything else is treated as search text.
pub fn is_safe_url(s: &str) -> bool {
    Url::parse(s).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

fn youtube_url(s: &str) -> Option<Url> {
    let url = Url::parse(s)
        .or_else(|_| Url::parse(&format!("https://{s}")))
        .ok()?;
    let host = url.host_str()?;

    YOUTUBE_HOSTS.contains(&host).then_some(url)
}

pub fn is_youtube_url(s: &str) -> bool {
    youtube_url(s).is_some_and(|url| url.path().len() > 1 || url.query().is_some())
}

pub fn is_youtube_playlist_url(s: &str) -> bool {
    youtube_url(s).is_some_and(|url| url.query_pairs().any(|(key, _)| key == "list"))
}

pub fn sanitize_query(query: &str) -> String {
    query
        .chars()
        .filter(|c| !matches!(c, '<' | '>'))
        .collect::<String>()
        .trim()
        .chars()
        .take(MAX_QUERY_LEN)
        .collect()
}

pub fn validate_attachment(
    filename: &str,
    content_type: Option<&str>,
    size: u64,
    max_mb: u64,
) -> Result<(), MusicError> {
    let lower = filename.to_ascii_lowercase();
    if !AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return Err(MusicError::InvalidFile(format!(
            "Invalid file type. Allowed: {}",
            AUDIO_EXTENSIONS.join(", ")
        )));
    }

    if let Some(mime) = content_type {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        if !AUDIO_MIME_TYPES.contains(&essence) {
            return Err(MusicError::InvalidFile("Invalid file MIME type".to_string()));
        }
    }

    if size > max_mb.saturating_mul(1024 * 1024) {
        return Err(MusicError::FileTooLarge { max_mb });
    }

    Ok(())
}

pub fn attachment_track(
    attachment: &Attachment,
    requester: Requester,
    max_mb: u64,
) -> Result<Track, MusicError> {
    validate_attachment(
        &attachment.filename,
        attachment.content_type.as_deref(),
        u64::from(attachment.size),
        max_mb,
    )?;

    Ok(Track::new(
        attachment.filename.clone(),
        attachment.url.clone(),
        TrackSource::Attachment,
        requester,
    ))
}

/// Builds the songbird input that streams a track.
pub fn input_for(client: &Client, track: &Track) -> Input {
    match track.source {
        TrackSource::Youtube => YoutubeDl::new(client.clone(), track.url.clone()).into(),
        TrackSource::Attachment => HttpRequest::new(client.clone(), track.url.clone()).into(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    pub channel: Option<String>,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
}

impl Candidate {
    fn from_metadata(meta: AuxMetadata) -> Option<Self> {
        Some(Self {
            url: meta.source_url?,
            title: meta.title.unwrap_or_else(|| "Unknown Title".to_string()),
            channel: meta.channel.or(meta.artist),
            duration: meta.duration,
            thumbnail: meta.thumbnail,
        })
    }

    pub fn into_track(self, requester: Requester) -> Track {
        Track::new(self.title, self.url, TrackSource::Youtube, requester)
            .with_duration(self.duration)
            .with_thumbnail(self.thumbnail)
    }
}

#[derive(Debug)]
pub enum Resolution {
    Single(Track),
    Playlist { title: String, tracks: Vec<Track> },
    Candidates(Vec<Candidate>),
}

pub async fn resolve(
    client: &Client,
    query: &str,
    requester: Requester,
) -> Result<Resolution, MusicError> {
    let query = sanitize_query(query);
    if query.is_empty() {
        return Err(MusicError::MissingQuery);
    }

    if is_youtube_playlist_url(&query) {
        let (title, tracks) = fetch_playlist(&query, &requester).await?;
        return Ok(Resolution::Playlist { title, tracks });
    }

    if is_safe_url(&query) {
        if !is_youtube_url(&query) {
            debug!("Resolving non-YouTube link {} through yt-dlp", query);
        }
        let mut source = YoutubeDl::new(client.clone(), query.clone());
        let meta = source.aux_metadata().await.map_err(|e| {
            warn!("Failed to fetch metadata for {}: {}", query, e);
            MusicError::NoResults
        })?;
        return Ok(Resolution::Single(track_from_metadata(meta, &query, requester)));
    }

    let mut candidates = search(client, &query).await?;
    if candidates.len() == 1 {
        if let Some(only) = candidates.pop() {
            return Ok(Resolution::Single(only.into_track(requester)));
        }
    }

    Ok(Resolution::Candidates(candidates))
}

pub async fn search(client: &Client, query: &str) -> Result<Vec<Candidate>, MusicError> {
    let mut yt = YoutubeDl::new_search(client.clone(), query.to_string());
    let results = yt
        .search(Some(SEARCH_RESULTS))
        .await
        .map_err(|e| MusicError::Playback(e.to_string()))?;

    let candidates: Vec<Candidate> = results
        .into_iter()
        .filter_map(Candidate::from_metadata)
        .take(SEARCH_RESULTS)
        .collect();
    debug!("Search for {:?} returned {} results", query, candidates.len());

    if candidates.is_empty() {
        return Err(MusicError::NoResults);
    }
    Ok(candidates)
}

pub fn track_from_metadata(meta: AuxMetadata, fallback_url: &str, requester: Requester) -> Track {
    Track::new(
        meta.title.unwrap_or_else(|| "Unknown Title".to_string()),
        meta.source_url.unwrap_or_else(|| fallback_url.to_string()),
        TrackSource::Youtube,
        requester,
    )
    .with_duration(meta.duration)
    .with_thumbnail(meta.thumbnail)
}

#[derive(Deserialize)]
struct FlatPlaylist {
    title: Option<String>,
    #[serde(default)]
    entries: Vec<FlatEntry>,
}

#[derive(Deserialize)]
struct FlatEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    thumbnails: Vec<FlatThumbnail>,
}

#[derive(Deserialize)]
struct FlatThumbnail {
    url: String,
}

async fn fetch_playlist(
    url: &str,
    requester: &Requester,
) -> Result<(String, Vec<Track>), MusicError> {
    let output = Command::new("yt-dlp")
        .args(["--flat-playlist", "-J", "--no-warnings", url])
        .output()
        .await
        .map_err(|e| MusicError::Playback(format!("Failed to run yt-dlp: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("yt-dlp failed for playlist {}: {}", url, stderr.trim());
        return Err(MusicError::NoResults);
    }

    parse_playlist(&String::from_utf8_lossy(&output.stdout), requester)
}

/// Reads `yt-dlp --flat-playlist -J` output. Private and deleted entries are skipped.
pub fn parse_playlist(
    json: &str,
    requester: &Requester,
) -> Result<(String, Vec<Track>), MusicError> {
    let playlist: FlatPlaylist = serde_json::from_str(json)
        .map_err(|e| MusicError::Playback(format!("Unreadable playlist data: {e}")))?;

    let tracks: Vec<Track> = playlist
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title?;
            if title == "[Private video]" || title == "[Deleted video]" {
                return None;
            }
            let url = entry
                .url
                .or_else(|| entry.id.map(|id| format!("https://www.youtube.com/watch?v={id}")))?;

            Some(
                Track::new(title, url, TrackSource::Youtube, requester.clone())
                    .with_duration(
                        entry
                            .duration
                            .filter(|secs| secs.is_finite() && *secs >= 0.0)
                            .map(Duration::from_secs_f64),
                    )
                    .with_thumbnail(entry.thumbnails.into_iter().last().map(|t| t.url)),
            )
        })
        .collect();

    if tracks.is_empty() {
        return Err(MusicError::NoResults);
    }

    Ok((
        playlist.title.unwrap_or_else(|| "Unknown Playlist".to_string()),
        tracks,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use poise::serenity_prelude::UserId;

    fn requester() -> Requester {
        Requester {
            id: UserId::new(1),
            name: "dj".into(),
        }
    }

    #[test]
    fn recognises_youtube_links() {
        assert!(is_youtube_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_youtube_url("youtu.be/dQw4w9WgXcQ"));
        assert!(!is_youtube_url("https://vimeo.com/123"));
        assert!(!is_youtube_url("never gonna give you up"));
    }

    #[test]
    fn playlist_links_need_a_list_parameter() {
        assert!(is_youtube_playlist_url(
            "https://www.youtube.com/playlist?list=PL1234"
        ));
        assert!(is_youtube_playlist_url(
            "https://www.youtube.com/watch?v=abc&list=PL1234"
        ));
        assert!(!is_youtube_playlist_url("https://www.youtube.com/watch?v=abc"));
        assert!(!is_youtube_playlist_url("https://example.com/?list=PL1234"));
    }

    #[test]
    fn only_http_urls_are_safe() {
        assert!(is_safe_url("https://example.com/a.mp3"));
        assert!(is_safe_url("http://example.com"));
        assert!(!is_safe_url("file:///etc/passwd"));
        assert!(!is_safe_url("javascript:alert(1)"));
        assert!(!is_safe_url("lofi beats"));
    }

    #[test]
    fn queries_are_cleaned_and_capped() {
        assert_eq!(sanitize_query("  <b>lofi</b> beats  "), "blofi/b beats");
        assert_eq!(sanitize_query(&"x".repeat(500)).len(), MAX_QUERY_LEN);
        assert_eq!(sanitize_query(" <> "), "");
    }

    #[test]
    fn attachments_are_checked() {
        assert!(validate_attachment("song.MP3", Some("audio/mpeg"), 1024, 25).is_ok());
        assert!(validate_attachment("song.ogg", None, 1024, 25).is_ok());
        assert!(validate_attachment("song.flac", Some("audio/flac; charset=binary"), 1, 25).is_ok());

        assert!(matches!(
            validate_attachment("notes.txt", Some("text/plain"), 10, 25),
            Err(MusicError::InvalidFile(msg)) if msg.starts_with("Invalid file type")
        ));
        assert_eq!(
            validate_attachment("song.mp3", Some("video/mp4"), 10, 25),
            Err(MusicError::InvalidFile("Invalid file MIME type".into()))
        );
        assert_eq!(
            validate_attachment("song.mp3", None, 26 * 1024 * 1024, 25),
            Err(MusicError::FileTooLarge { max_mb: 25 })
        );
    }

    #[test]
    fn huge_size_limits_do_not_overflow() {
        assert!(validate_attachment("song.mp3", None, u64::MAX, u64::MAX).is_ok());
        assert!(validate_attachment("song.mp3", None, 1 << 50, 1 << 44).is_ok());
    }

    #[test]
    fn flat_playlist_json_becomes_tracks() {
        let json = r#"{
            "title": "Road trip",
            "entries": [
                {"id": "aaa", "title": "First", "url": "https://www.youtube.com/watch?v=aaa", "duration": 61.0,
                 "thumbnails": [{"url": "https://i.ytimg.com/small.jpg"}, {"url": "https://i.ytimg.com/big.jpg"}]},
                {"id": "bbb", "title": "[Deleted video]", "url": "https://www.youtube.com/watch?v=bbb"},
                {"id": "ccc", "title": "Third"}
            ]
        }"#;

        let (title, tracks) = parse_playlist(json, &requester()).unwrap();

        assert_eq!(title, "Road trip");
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].duration, Some(Duration::from_secs(61)));
        assert_eq!(tracks[0].thumbnail.as_deref(), Some("https://i.ytimg.com/big.jpg"));
        assert_eq!(tracks[1].url, "https://www.youtube.com/watch?v=ccc");
        assert_eq!(tracks[1].requested_by, requester());
    }

    #[test]
    fn empty_playlist_has_no_results() {
        let json = r#"{"title": "Nothing", "entries": []}"#;
        assert_eq!(
            parse_playlist(json, &requester()).map(|(_, t)| t.len()),
            Err(MusicError::NoResults)
        );
    }

    #[test]
    fn search_candidates_convert_to_tracks() {
        let candidate = Candidate {
            title: "Song".into(),
            url: "https://youtu.be/x".into(),
            channel: Some("Artist".into()),
            duration: Some(Duration::from_secs(200)),
            thumbnail: None,
        };

        let track = candidate.into_track(requester());
        assert_eq!(track.source, TrackSource::Youtube);
        assert_eq!(track.duration, Some(Duration::from_secs(200)));
    }
}
