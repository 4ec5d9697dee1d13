//! Playback negotiation
//!
//! Decides how a ready stream reaches the client:
//!
//! | Device  | Preference           | Template | Mode          |
//! |---------|----------------------|----------|---------------|
//! | desktop | `nativeplayer`       | any      | native        |
//! | any     | `externalPlayerLink` | set      | external-link |
//! | any     | anything else        | any      | embedded      |

use regex::{Captures, Regex};
use url::{Host, Url};

use crate::error::{Result, StreamError};
use crate::models::{DeviceKind, PlaybackDescriptor, PlaybackMode, PlaybackType, StreamRequest};
use crate::stream::engine::FileRef;

const PLACEHOLDERS: &[&str] = &["url", "scheme", "host", "mediaTitle", "episodeNumber"];

/// What negotiation needs to know about a ready stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationInput {
    pub stream_url: String,
    pub media_title: String,
    pub episode_number: u32,
    /// Path of the streamed file, used for the MIME hint
    pub file_path: Option<String>,
    pub client_hostname: Option<String>,
}

impl NegotiationInput {
    pub fn new(stream_url: impl Into<String>, media_title: impl Into<String>, episode_number: u32) -> Self {
        Self {
            stream_url: stream_url.into(),
            media_title: media_title.into(),
            episode_number,
            file_path: None,
            client_hostname: None,
        }
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_client_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.client_hostname = Some(hostname.into());
        self
    }

    /// Build from the request a session was started with and the engine's URL
    pub fn for_request(request: &StreamRequest, file: &FileRef, stream_url: impl Into<String>) -> Self {
        Self {
            stream_url: stream_url.into(),
            media_title: request.display_title(),
            episode_number: request.episode_number,
            file_path: file.path().map(String::from),
            client_hostname: request.client.hostname.clone(),
        }
    }

    /// Window title shown by the player
    pub fn window_title(&self) -> String {
        format!("{} - Episode {}", self.media_title, self.episode_number)
    }
}

/// Picks the delivery mode and builds the URL handed to the client
#[derive(Debug, Clone, Default)]
pub struct Negotiator {
    external_player_link: Option<String>,
}

impl Negotiator {
    pub fn new(external_player_link: Option<String>) -> Self {
        Self {
            external_player_link: external_player_link.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn negotiate(
        &self,
        input: &NegotiationInput,
        device: DeviceKind,
        preference: PlaybackType,
    ) -> Result<PlaybackDescriptor> {
        let title = input.window_title();
        let mime_hint = guess_mime(input);

        if device == DeviceKind::Desktop && preference == PlaybackType::NativePlayer {
            return Ok(PlaybackDescriptor {
                url: input.stream_url.clone(),
                mode: PlaybackMode::Native,
                mime_hint,
                title,
            });
        }

        let url = rewrite_loopback(&input.stream_url, input.client_hostname.as_deref());

        if let (PlaybackType::ExternalPlayerLink, Some(template)) =
            (preference, self.external_player_link.as_deref())
        {
            return Ok(PlaybackDescriptor {
                url: render_external_link(template, &url, input)?,
                mode: PlaybackMode::ExternalLink,
                mime_hint,
                title,
            });
        }

        Ok(PlaybackDescriptor {
            url,
            mode: PlaybackMode::Embedded,
            mime_hint,
            title,
        })
    }
}

/// Fill an external player template such as `vlc://{url}`
///
/// The stream URL is percent-encoded when the template carries its own query
/// string, so its parameters do not leak into the outer URL.
pub fn render_external_link(template: &str, stream_url: &str, input: &NegotiationInput) -> Result<String> {
    let re = Regex::new(r"\{(\w*)\}").map_err(|e| StreamError::Configuration(e.to_string()))?;

    let mut has_url = false;
    for caps in re.captures_iter(template) {
        let name = &caps[1];
        if !PLACEHOLDERS.contains(&name) {
            return Err(StreamError::Configuration(format!(
                "unknown placeholder {{{}}} in external player link",
                name
            )));
        }
        has_url |= name == "url";
    }
    if !has_url {
        return Err(StreamError::Configuration(
            "external player link must contain {url}".to_string(),
        ));
    }

    let url = if template.contains('?') {
        urlencoding::encode(stream_url).into_owned()
    } else {
        stream_url.to_string()
    };
    let parsed = Url::parse(stream_url).ok();
    let scheme = parsed.as_ref().map(|u| u.scheme().to_string()).unwrap_or_default();
    let host = parsed.as_ref().map(host_with_port).unwrap_or_default();
    let media_title = sanitize_title(&input.media_title);
    let episode = input.episode_number.to_string();

    let rendered = re.replace_all(template, |caps: &Captures| match &caps[1] {
        "url" => url.clone(),
        "scheme" => scheme.clone(),
        "host" => host.clone(),
        "mediaTitle" => media_title.clone(),
        "episodeNumber" => episode.clone(),
        other => format!("{{{}}}", other),
    });
    Ok(rendered.into_owned())
}

/// Point loopback stream URLs at the host the client reaches the server on
pub fn rewrite_loopback(stream_url: &str, client_hostname: Option<&str>) -> String {
    let Some(hostname) = client_hostname.filter(|h| !h.is_empty()) else {
        return stream_url.to_string();
    };
    let Ok(mut parsed) = Url::parse(stream_url) else {
        return stream_url.to_string();
    };

    let is_loopback = match parsed.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    };
    if !is_loopback || parsed.set_host(Some(hostname)).is_err() {
        return stream_url.to_string();
    }
    parsed.to_string()
}

/// Strip characters that are illegal in file names on common filesystems
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

fn host_with_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn guess_mime(input: &NegotiationInput) -> Option<String> {
    let from_path = input
        .file_path
        .as_deref()
        .and_then(|p| mime_guess::from_path(p).first());
    let from_url = || {
        Url::parse(&input.stream_url)
            .ok()
            .and_then(|u| mime_guess::from_path(u.path()).first())
    };
    from_path.or_else(from_url).map(|m| m.essence_str().to_string())
}
