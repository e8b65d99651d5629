use serde::Deserialize;
use serde_json::Value;

/// the bits of a channel's `cmds[]` entry the resolver cares about, everything else in the entry
/// is left alone. An entry that doesn't fit this shape is simply not touched.
///
/// ```json
/// {"id": "12", "url": "ffmpeg http://localhost/ch/1234", "use_http_tmp_link": "1", ...}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelCommand {
    pub url: String,
    pub use_http_tmp_link: String,
}

impl ChannelCommand {
    pub fn from_value(value: &Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }

    pub fn wants_tmp_link(&self) -> bool {
        self.use_http_tmp_link == "1"
    }
}

/// answer of both `get_link_for_ch` and `create_link`
///
/// ```json
/// {"js": {"id": "1", "cmd": "ffmpeg http://cdn.example/stream.m3u8", "error": ""}}
/// ```
#[derive(Debug, Deserialize)]
pub struct LinkResponse {
    pub js: LinkPayload,
}

#[derive(Debug, Deserialize)]
pub struct LinkPayload {
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl LinkResponse {
    /// the cmd, provided the portal didn't report an error and it actually points somewhere
    pub fn into_link(self) -> Option<String> {
        if self.js.error.as_deref().is_some_and(|e| !e.trim().is_empty()) {
            return None;
        }
        self.js
            .cmd
            .map(|cmd| cmd.trim().to_string())
            .filter(|cmd| stream_url(cmd).is_some())
    }
}

/// channel records of a portal payload. Paged listings keep them in `js.data`, some endpoints
/// just return the bare list.
pub fn channels_mut(payload: &mut Value) -> Option<&mut Vec<Value>> {
    match payload {
        Value::Array(channels) => Some(channels),
        Value::Object(root) => root
            .get_mut("js")?
            .as_object_mut()?
            .get_mut("data")?
            .as_array_mut(),
        _ => None,
    }
}

/// url part of a command like `ffmpeg http://host/path`, the first whitespace separated token
/// that looks like `scheme://...`
pub fn stream_url(cmd: &str) -> Option<&str> {
    cmd.split_whitespace().find(|token| {
        token
            .split_once("://")
            .is_some_and(|(scheme, rest)| !scheme.is_empty() && !rest.is_empty())
    })
}

/// last non empty path segment of the command's url, that's where loopback links keep the
/// channel id (`ffmpeg http://localhost/ch/1234_` -> `1234_`)
pub fn channel_id(cmd: &str) -> Option<String> {
    let token = stream_url(cmd)?;

    let from_url = url::Url::parse(token).ok().and_then(|parsed| {
        parsed
            .path_segments()?
            .filter(|segment| !segment.is_empty())
            .next_back()
            .map(|segment| segment.to_string())
    });

    from_url.or_else(|| {
        // not a url the parser likes, take the tail by hand
        let (_, rest) = token.split_once("://")?;
        let path = rest.split(['?', '#']).next()?.trim_end_matches('/');
        let (_, segment) = path.rsplit_once('/')?;
        (!segment.is_empty()).then(|| segment.to_string())
    })
}
