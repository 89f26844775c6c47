use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ChatSyncError, Result};
use crate::media::DEFAULT_MAX_MEDIA_BYTES;

const DEFAULT_TYPING_IDLE_MS: u64 = 1500;
const DEFAULT_REMOTE_TYPING_TIMEOUT_MS: u64 = 5000;
const DEFAULT_SCROLL_THRESHOLD: f64 = 50.0;
const DEFAULT_PENDING_EVENT_LIMIT: usize = 256;
const DEFAULT_CHANNEL_BUFFER: usize = 100;

#[derive(Clone, Debug, PartialEq)]
pub struct ChatSyncConfig {
    /// Base URL of the REST API (history, send, media assets)
    pub api_base_url: String,

    /// URL of the push-event WebSocket endpoint
    pub socket_url: String,

    /// Directory for rolling log files; stdout only when unset
    pub logs_dir: Option<PathBuf>,

    /// Keystroke inactivity window before an outbound typing-stop
    pub typing_idle_timeout: Duration,

    /// Auto-clear window for the remote typing indicator, `None` disables it
    pub remote_typing_timeout: Option<Duration>,

    /// Slack in pixels when deciding whether the viewport is at the bottom
    pub scroll_threshold: f64,

    /// Largest media attachment accepted by `send`
    pub max_media_bytes: usize,

    /// Push events buffered per conversation while its history is loading
    pub pending_event_limit: usize,

    /// Capacity of the broadcast and outbound queues
    pub channel_buffer: usize,
}

impl ChatSyncConfig {
    pub fn new(api_base_url: &str) -> Self {
        let api_base_url = api_base_url.trim_end_matches('/').to_string();
        let socket_url = socket_url_for(&api_base_url);
        Self {
            api_base_url,
            socket_url,
            logs_dir: None,
            typing_idle_timeout: Duration::from_millis(DEFAULT_TYPING_IDLE_MS),
            remote_typing_timeout: Some(Duration::from_millis(DEFAULT_REMOTE_TYPING_TIMEOUT_MS)),
            scroll_threshold: DEFAULT_SCROLL_THRESHOLD,
            max_media_bytes: DEFAULT_MAX_MEDIA_BYTES,
            pending_event_limit: DEFAULT_PENDING_EVENT_LIMIT,
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
        }
    }

    pub fn with_logs_dir(mut self, logs_dir: &Path) -> Self {
        self.logs_dir = Some(logs_dir.to_path_buf());
        self
    }

    /// Builds a configuration from the process environment, loading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// `CHATSYNC_API_BASE_URL` is required; every other key falls back to its default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup("CHATSYNC_API_BASE_URL").ok_or_else(|| {
            ChatSyncError::Configuration("CHATSYNC_API_BASE_URL is not set".to_string())
        })?;
        let mut config = Self::new(&api_base_url);

        if let Some(socket_url) = lookup("CHATSYNC_SOCKET_URL") {
            config.socket_url = socket_url;
        }
        if let Some(logs_dir) = lookup("CHATSYNC_LOGS_DIR") {
            config.logs_dir = Some(PathBuf::from(logs_dir));
        }
        if let Some(ms) = parse_key::<u64>(&lookup, "CHATSYNC_TYPING_IDLE_MS")? {
            config.typing_idle_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_key::<u64>(&lookup, "CHATSYNC_REMOTE_TYPING_TIMEOUT_MS")? {
            config.remote_typing_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(threshold) = parse_key::<f64>(&lookup, "CHATSYNC_SCROLL_THRESHOLD")? {
            config.scroll_threshold = threshold;
        }
        if let Some(bytes) = parse_key::<usize>(&lookup, "CHATSYNC_MAX_MEDIA_BYTES")? {
            config.max_media_bytes = bytes;
        }

        Ok(config)
    }

    /// Resolves a server-relative media or avatar reference to an absolute URL.
    pub fn asset_url(&self, reference: &str) -> String {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return reference.to_string();
        }
        format!("{}/{}", self.api_base_url, reference.trim_start_matches('/'))
    }
}

fn parse_key<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ChatSyncError::Configuration(format!("{key}={raw}: {e}"))),
        None => Ok(None),
    }
}

fn socket_url_for(api_base_url: &str) -> String {
    if let Some(rest) = api_base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_base_url.to_string()
    }
}
