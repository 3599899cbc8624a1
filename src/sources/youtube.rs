use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serenity::model::id::UserId;
use songbird::input::{HttpRequest, Input};
use std::{sync::LazyLock, time::Duration};
use tracing::{debug, info, warn};

use super::Resolver;
use crate::{
    audio::queue::{Playable, QueueItem, TrackSummary},
    error::{ResolutionError, StreamOpenError},
};

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://\S+$").expect("patrón de URL válido"));

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    uploader_url: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    #[serde(default)]
    entries: Vec<Option<YtDlpInfo>>,
}

impl YtDlpInfo {
    /// La primera entrada reproducible (las búsquedas y playlists anidan).
    fn into_playable(self) -> Option<YtDlpInfo> {
        if !self.entries.is_empty() {
            return self
                .entries
                .into_iter()
                .flatten()
                .find_map(YtDlpInfo::into_playable);
        }
        self.webpage_url.is_some().then_some(self)
    }

    fn into_summary(self) -> Option<TrackSummary> {
        let url = self.webpage_url?;
        let mut summary = TrackSummary::new(self.title.unwrap_or_else(|| "-".to_string()), url);

        if let Some(duration) = self.duration.filter(|secs| secs.is_finite() && *secs > 0.0) {
            summary = summary.with_duration(Duration::from_secs_f64(duration));
        }
        if let Some(uploader) = self.uploader {
            summary = summary.with_uploader(uploader, self.uploader_url);
        }
        if let Some(thumbnail) = self.thumbnail {
            summary = summary.with_thumbnail(thumbnail);
        }

        Some(summary)
    }
}

enum ExtractorFailure {
    Io(std::io::Error),
    Timeout(u64),
    Failed(String),
}

impl From<ExtractorFailure> for ResolutionError {
    fn from(failure: ExtractorFailure) -> Self {
        match failure {
            ExtractorFailure::Io(e) => ResolutionError::Io(e),
            ExtractorFailure::Timeout(secs) => ResolutionError::Timeout(secs),
            ExtractorFailure::Failed(stderr) => ResolutionError::Extractor(stderr),
        }
    }
}

impl From<ExtractorFailure> for StreamOpenError {
    fn from(failure: ExtractorFailure) -> Self {
        match failure {
            ExtractorFailure::Io(e) => StreamOpenError::Io(e),
            ExtractorFailure::Timeout(secs) => {
                StreamOpenError::Extractor(format!("sin respuesta tras {}s", secs))
            }
            ExtractorFailure::Failed(stderr) => StreamOpenError::Extractor(stderr),
        }
    }
}

async fn run_ytdlp(binary: &str, timeout: Duration, args: &[&str]) -> Result<String, ExtractorFailure> {
    let mut command = Command::new(binary);
    command.args(args).kill_on_drop(true);

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| ExtractorFailure::Timeout(timeout.as_secs()))?
        .map_err(ExtractorFailure::Io)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(ExtractorFailure::Failed(stderr));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub(crate) fn is_url(query: &str) -> bool {
    URL_PATTERN.is_match(query)
}

/// Lo que se le pasa a yt-dlp: la URL tal cual o una búsqueda del primer resultado.
pub(crate) fn search_target(query: &str) -> String {
    if is_url(query) {
        query.to_string()
    } else {
        format!("ytsearch1:{}", query)
    }
}

/// Toma la primera línea de `--dump-json` que tenga algo reproducible.
fn parse_summary(stdout: &str, query: &str) -> Result<TrackSummary, ResolutionError> {
    for line in stdout.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let info: YtDlpInfo = serde_json::from_str(line)?;
        if let Some(summary) = info.into_playable().and_then(YtDlpInfo::into_summary) {
            return Ok(summary);
        }
    }

    Err(ResolutionError::NotFound(query.to_string()))
}

/// Resolvedor basado en yt-dlp.
#[derive(Clone)]
pub struct YtDlpResolver {
    binary: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Resolver<Input> for YtDlpResolver {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<QueueItem<Input>, ResolutionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolutionError::NotFound(String::new()));
        }

        info!("🔍 Resolviendo: {}", query);
        let target = search_target(query);
        let stdout = run_ytdlp(
            &self.binary,
            self.timeout,
            &["--dump-json", "--no-playlist", "--no-warnings", &target],
        )
        .await?;

        let summary = parse_summary(&stdout, query)?;
        debug!("📊 Resuelto {} -> {}", query, summary.url);

        Ok(QueueItem::new(
            YtDlpTrack {
                summary,
                binary: self.binary.clone(),
                timeout: self.timeout,
                http: self.http.clone(),
            },
            requested_by,
        ))
    }
}

/// Track resuelto por yt-dlp. La URL de stream caduca, así que se pide
/// recién al reproducir.
pub struct YtDlpTrack {
    summary: TrackSummary,
    binary: String,
    timeout: Duration,
    http: reqwest::Client,
}

#[async_trait]
impl Playable<Input> for YtDlpTrack {
    fn summary(&self) -> TrackSummary {
        self.summary.clone()
    }

    async fn open_stream(&self) -> Result<Input, StreamOpenError> {
        debug!("🎵 Obteniendo URL de stream para: {}", self.summary.url);

        let stdout = run_ytdlp(
            &self.binary,
            self.timeout,
            &[
                "-f",
                "bestaudio/best",
                "--get-url",
                "--no-playlist",
                "--no-warnings",
                &self.summary.url,
            ],
        )
        .await?;

        let Some(stream_url) = stdout.lines().map(str::trim).find(|line| !line.is_empty()) else {
            warn!("yt-dlp no devolvió URL para {}", self.summary.url);
            return Err(StreamOpenError::NoStreamUrl(self.summary.title.clone()));
        };

        let request = HttpRequest::new(self.http.clone(), stream_url.to_string());
        Ok(Input::from(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_url_detection() {
        assert!(is_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_url("http://example.com/song.mp3"));
        assert!(!is_url("never gonna give you up"));
        assert!(!is_url("https://example.com/with space"));
    }

    #[test]
    fn test_search_target() {
        assert_eq!(search_target("lofi beats"), "ytsearch1:lofi beats");
        assert_eq!(search_target("https://youtu.be/abc"), "https://youtu.be/abc");
    }

    #[test]
    fn test_parse_single_video() {
        let stdout = r#"{"title":"Song","duration":205.0,"uploader":"Band","uploader_url":"https://yt/band","thumbnail":"https://img/1.jpg","webpage_url":"https://yt/watch?v=1","view_count":3}"#;

        let summary = parse_summary(stdout, "song").unwrap();

        assert_eq!(
            summary,
            TrackSummary::new("Song", "https://yt/watch?v=1")
                .with_duration(Duration::from_secs(205))
                .with_uploader("Band", Some("https://yt/band".into()))
                .with_thumbnail("https://img/1.jpg")
        );
    }

    #[test]
    fn test_parse_picks_first_non_null_entry() {
        let stdout = r#"{"title":"results","entries":[null,{"title":"First","webpage_url":"https://yt/watch?v=2"},{"title":"Second","webpage_url":"https://yt/watch?v=3"}]}"#;

        let summary = parse_summary(stdout, "q").unwrap();

        assert_eq!(summary.title, "First");
        assert_eq!(summary.uploader, "Unknown");
        assert_eq!(summary.duration, None);
    }

    #[test]
    fn test_parse_without_results_is_not_found() {
        let err = parse_summary("", "xyz").unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound(q) if q == "xyz"));

        let err = parse_summary(r#"{"entries":[]}"#, "xyz").unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound(_)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_summary("not json", "q"),
            Err(ResolutionError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported_as_resolution_error() {
        let resolver = YtDlpResolver::new("/nonexistent/yt-dlp", Duration::from_secs(5));

        let err = resolver.resolve("xyz", UserId::new(1)).await.unwrap_err();

        assert!(matches!(err, ResolutionError::Io(_)));
    }
}
