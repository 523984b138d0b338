//! Video links - recognize YouTube links and turn them into embeddable players

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static VIDEO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:www\.|m\.)?(?:youtube\.com|youtu\.be)\S*$").expect("valid video regex")
});

const EMBED_BASE: &str = "https://www.youtube.com/embed/";

/// True for a whole line that is a YouTube link (with or without scheme)
pub fn is_video_link(line: &str) -> bool {
    VIDEO_RE.is_match(line)
}

fn parse_lenient(url: &str) -> Option<Url> {
    Url::parse(url)
        .or_else(|_| Url::parse(&format!("https://{}", url)))
        .ok()
}

/// Video id from a shorts link, a youtu.be short link or a `v=` query
pub fn video_id(url: &str) -> Option<String> {
    let url = url.trim();
    if let Some((_, rest)) = url.split_once("/shorts/") {
        let id = rest.split(['?', '#', '/']).next().unwrap_or_default();
        return (!id.is_empty()).then(|| id.to_string());
    }

    let parsed = parse_lenient(url)?;
    let host = parsed.host_str()?.to_lowercase();
    if host == "youtu.be" {
        let id = parsed.path_segments()?.next()?;
        return (!id.is_empty()).then(|| id.to_string());
    }

    parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
}

/// Autoplaying embed URL, or `None` when the link can't be played
pub fn embed_url(url: &str) -> Option<String> {
    video_id(url).map(|id| format!("{}{}?autoplay=1", EMBED_BASE, id))
}
