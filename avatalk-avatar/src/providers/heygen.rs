//! HeyGen streaming avatar provider
//!
//! Control calls go over the `/v1/streaming.*` REST API using the session
//! token as bearer credential. User and avatar speech events arrive on the
//! realtime websocket advertised by `streaming.new`.

use crate::error::AvatarError;
use crate::transport::{AvatarConnection, AvatarConnector, AvatarTransport, EVENT_CHANNEL_CAPACITY};
use async_trait::async_trait;
use avatalk_core::{
    AvatarConfig, Credential, SessionInfo, SessionRequest, SpeakRequest, TaskMode, TransportEvent,
};
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

const MAX_TOKEN_LEN: usize = 4096;
const MAX_RESPONSE_SIZE: u64 = 100 * 1024; // 100KB
const MAX_ERROR_TEXT_SIZE: usize = 2_000;
const MAX_SPEAK_TEXT_LEN: usize = 10_000;
const MAX_FRAME_SIZE: usize = 64 * 1024;
const WS_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type RealtimeStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Builds [`HeyGenTransport`]s from session tokens.
pub struct HeyGenConnector {
    client: Client,
    base_url: String,
    speak_timeout: Duration,
    allow_insecure: bool,
}

impl HeyGenConnector {
    pub fn new(config: &AvatarConfig) -> Result<Self, AvatarError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)?;
        match parsed.scheme() {
            "https" => {}
            "http" if config.allow_insecure => {
                warn!("HeyGen base URL {} is not encrypted", base_url);
            }
            _ => return Err(AvatarError::Config("Base URL must use HTTPS".to_string())),
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AvatarError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            speak_timeout: Duration::from_secs(config.speak_timeout_secs),
            allow_insecure: config.allow_insecure,
        })
    }
}

#[async_trait]
impl AvatarConnector for HeyGenConnector {
    async fn connect(&self, credential: &Credential) -> Result<AvatarConnection, AvatarError> {
        if credential.is_empty() {
            return Err(AvatarError::Config("Session token is empty".to_string()));
        }
        let token = credential.expose();
        if token.len() > MAX_TOKEN_LEN || token.chars().any(|c| c.is_control()) {
            return Err(AvatarError::Config("Session token is malformed".to_string()));
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (stop_talking, _) = watch::channel(0u64);
        let transport = HeyGenTransport {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: credential.clone(),
            speak_timeout: self.speak_timeout,
            allow_insecure: self.allow_insecure,
            events: events_tx,
            session: Mutex::new(None),
            realtime: Mutex::new(None),
            stop_talking,
            input_muted: AtomicBool::new(true),
        };

        info!("Connected HeyGen transport with token {}", credential.redacted());
        Ok(AvatarConnection {
            transport: Arc::new(transport),
            events: events_rx,
        })
    }
}

/// One HeyGen streaming session.
pub struct HeyGenTransport {
    client: Client,
    base_url: String,
    token: Credential,
    speak_timeout: Duration,
    allow_insecure: bool,
    events: mpsc::Sender<TransportEvent>,
    session: Mutex<Option<SessionInfo>>,
    realtime: Mutex<Option<JoinHandle<()>>>,
    /// Bumped on every `avatar_stop_talking`; sync speech waits on it.
    stop_talking: watch::Sender<u64>,
    input_muted: AtomicBool,
}

impl HeyGenTransport {
    pub fn is_input_muted(&self) -> bool {
        self.input_muted.load(Ordering::Relaxed)
    }

    fn session_id(&self) -> Result<String, AvatarError> {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.session_id.clone())
            .ok_or_else(|| AvatarError::Stream("No active session".to_string()))
    }

    fn realtime_active(&self) -> bool {
        self.realtime
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// POST to `/v1/{path}` and return the decoded JSON body.
    async fn post(&self, path: &str, body: &Value) -> Result<Value, AvatarError> {
        let url = format!("{}/v1/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token.expose())
            .json(body)
            .send()
            .await
            .map_err(|e| AvatarError::Network(format!("{} request failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = match response.bytes().await {
                Ok(bytes) => {
                    let end = bytes.len().min(MAX_ERROR_TEXT_SIZE);
                    String::from_utf8_lossy(&bytes[..end]).to_string()
                }
                Err(_) => String::new(),
            };
            return Err(AvatarError::Api(format!(
                "{} returned {} - {}",
                path, status, error_text
            )));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_RESPONSE_SIZE {
                return Err(AvatarError::Api(format!(
                    "{} response too large (max {} bytes)",
                    path, MAX_RESPONSE_SIZE
                )));
            }
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AvatarError::Network(format!("Failed to read {} response: {}", path, e)))?;
        if bytes.len() as u64 > MAX_RESPONSE_SIZE {
            return Err(AvatarError::Api(format!(
                "{} response too large (max {} bytes)",
                path, MAX_RESPONSE_SIZE
            )));
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn validate_realtime_endpoint(&self, endpoint: &str) -> Result<(), AvatarError> {
        let url = Url::parse(endpoint)?;
        match url.scheme() {
            "wss" => Ok(()),
            "ws" if self.allow_insecure => Ok(()),
            other => Err(AvatarError::Config(format!(
                "Realtime endpoint must use wss, got '{}'",
                other
            ))),
        }
    }
}

#[async_trait]
impl AvatarTransport for HeyGenTransport {
    fn provider_name(&self) -> &'static str {
        "heygen"
    }

    async fn create_session(&self, request: &SessionRequest) -> Result<SessionInfo, AvatarError> {
        if self.session.lock().is_some() {
            return Err(AvatarError::Stream("Session already created".to_string()));
        }
        info!(
            "Creating HeyGen session for avatar {} ({})",
            request.avatar_name, request.language
        );

        let payload = json!({
            "version": "v2",
            "quality": request.quality,
            "avatar_name": request.avatar_name,
            "language": request.language,
            "knowledge_base_id": request.knowledge_id,
            "knowledge_base": request.knowledge_base,
            "voice": {
                "rate": request.voice.rate,
                "emotion": request.voice.emotion,
            },
            "disable_idle_timeout": request.disable_idle_timeout,
            "video_encoding": "H264",
        });
        let response = self.post("streaming.new", &payload).await?;
        let data = response
            .get("data")
            .cloned()
            .ok_or_else(|| AvatarError::Api("streaming.new response has no data".to_string()))?;
        let info: SessionInfo = serde_json::from_value(data)?;
        if info.session_id.is_empty() || info.session_id.len() > 256 {
            return Err(AvatarError::Api("Invalid session ID in response".to_string()));
        }

        // Recorded before starting so a failed start can still be stopped.
        *self.session.lock() = Some(info.clone());

        self.post("streaming.start", &json!({ "session_id": info.session_id }))
            .await?;
        info!("HeyGen session {} started", info.session_id);

        let _ = self
            .events
            .send(TransportEvent::StreamReady {
                media: info.media_handle(),
            })
            .await;
        Ok(info)
    }

    async fn start_voice_chat(&self, muted: bool) -> Result<(), AvatarError> {
        if self.realtime_active() {
            debug!("Voice chat already running");
            return Ok(());
        }
        let endpoint = self
            .session
            .lock()
            .as_ref()
            .and_then(|s| s.realtime_endpoint.clone())
            .ok_or_else(|| AvatarError::Stream("Session has no realtime endpoint".to_string()))?;
        self.validate_realtime_endpoint(&endpoint)?;

        let (ws, _) = tokio::time::timeout(WS_CONNECT_TIMEOUT, connect_async(endpoint.as_str()))
            .await
            .map_err(|_| AvatarError::Network("Realtime connection timed out".to_string()))?
            .map_err(|e| AvatarError::Network(format!("Realtime connection failed: {}", e)))?;

        self.input_muted.store(muted, Ordering::Relaxed);
        let reader = tokio::spawn(read_realtime(
            ws,
            self.events.clone(),
            self.stop_talking.clone(),
        ));
        *self.realtime.lock() = Some(reader);

        info!("Voice chat started (input muted: {})", muted);
        Ok(())
    }

    async fn speak(&self, request: SpeakRequest) -> Result<(), AvatarError> {
        let session_id = self.session_id()?;
        if request.text.trim().is_empty() {
            return Err(AvatarError::Stream("Cannot speak empty text".to_string()));
        }
        if request.text.len() > MAX_SPEAK_TEXT_LEN {
            return Err(AvatarError::Stream(format!(
                "Speech text too long (max {} bytes)",
                MAX_SPEAK_TEXT_LEN
            )));
        }

        // Subscribe before sending so a fast stop-talking is not missed.
        let mut stopped = self.stop_talking.subscribe();
        let response = self
            .post(
                "streaming.task",
                &json!({
                    "session_id": session_id,
                    "text": request.text,
                    "task_type": request.task_type,
                    "task_mode": request.task_mode,
                }),
            )
            .await?;
        debug!("Speak task accepted: {:?}", response.pointer("/data/task_id"));

        if request.task_mode == TaskMode::Async {
            return Ok(());
        }

        if self.realtime_active() {
            return match tokio::time::timeout(self.speak_timeout, stopped.changed()).await {
                Ok(_) => Ok(()),
                Err(_) => Err(AvatarError::Stream(format!(
                    "Speech did not finish within {:?}",
                    self.speak_timeout
                ))),
            };
        }

        // Without an event feed, fall back on the duration the API reports.
        if let Some(ms) = response.pointer("/data/duration_ms").and_then(Value::as_f64) {
            let wait = Duration::from_millis(ms.max(0.0) as u64).min(self.speak_timeout);
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    async fn stop_session(&self) -> Result<(), AvatarError> {
        if let Some(reader) = self.realtime.lock().take() {
            reader.abort();
        }
        let session = self.session.lock().take();
        let Some(session) = session else {
            debug!("No HeyGen session to stop");
            return Ok(());
        };

        self.post("streaming.stop", &json!({ "session_id": session.session_id }))
            .await?;
        info!("HeyGen session {} stopped", session.session_id);
        Ok(())
    }
}

impl Drop for HeyGenTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.realtime.get_mut().take() {
            reader.abort();
        }
    }
}

async fn read_realtime(
    mut ws: RealtimeStream,
    events: mpsc::Sender<TransportEvent>,
    stop_talking: watch::Sender<u64>,
) {
    while let Some(frame) = ws.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if text.len() > MAX_FRAME_SIZE {
                    warn!("Dropping oversized realtime frame ({} bytes)", text.len());
                    continue;
                }
                let Some(event) = TransportEvent::from_frame(&text) else {
                    debug!("Ignoring realtime frame");
                    continue;
                };
                if event == TransportEvent::AvatarStopTalking {
                    stop_talking.send_modify(|count| *count += 1);
                }
                if events.send(event).await.is_err() {
                    // Nobody is listening any more.
                    return;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Realtime connection error: {}", e);
                break;
            }
        }
    }
    info!("Realtime connection closed");
    let _ = events.send(TransportEvent::StreamDisconnected).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_requires_https() {
        let mut config = AvatarConfig::default();
        config.base_url = "http://api.example.com".to_string();
        assert!(matches!(
            HeyGenConnector::new(&config),
            Err(AvatarError::Config(_))
        ));

        config.allow_insecure = true;
        assert!(HeyGenConnector::new(&config).is_ok());
    }

    #[test]
    fn test_connector_rejects_invalid_url() {
        let mut config = AvatarConfig::default();
        config.base_url = "not a url".to_string();
        assert!(HeyGenConnector::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_token() {
        let connector = HeyGenConnector::new(&AvatarConfig::default()).unwrap();
        let result = connector.connect(&Credential::empty()).await;
        assert!(matches!(result, Err(AvatarError::Config(_))));

        let result = connector.connect(&Credential::new("bad\u{0}token")).await;
        assert!(matches!(result, Err(AvatarError::Config(_))));
    }

    #[tokio::test]
    async fn test_speak_without_session_fails() {
        let connector = HeyGenConnector::new(&AvatarConfig::default()).unwrap();
        let connection = connector.connect(&Credential::new("token")).await.unwrap();
        let result = connection
            .transport
            .speak(SpeakRequest::repeat_sync("Hello."))
            .await;
        assert!(matches!(result, Err(AvatarError::Stream(_))));
        // Nothing to stop either.
        assert!(connection.transport.stop_session().await.is_ok());
    }
}
