use serde::Serialize;
use std::sync::Arc;

/// Custom key/value payload attached to every push.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushData {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
}

impl PushData {
    /// Chat pushes point the client at the room.
    pub fn chat(room_id: i64) -> Self {
        PushData {
            kind: "chat_msg".to_string(),
            data: room_id.to_string(),
        }
    }

    /// General pushes carry the originating frame verbatim.
    pub fn general(frame: &str) -> Self {
        PushData {
            kind: "notification".to_string(),
            data: frame.to_string(),
        }
    }
}

/// The single capability the engine needs from the push provider.
/// Delivery is fire-and-forget: outcomes are logged on this side of the
/// trait and never reach a client.
pub trait PushSender: Send + Sync {
    fn deliver(&self, device_token: &str, title: &str, body: &str, data: PushData);
}

pub type PushHandle = Arc<dyn PushSender>;

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";

/// FCM-backed gateway. The server key comes from a JSON credentials file;
/// without one the gateway stays disabled and the relay runs without push.
pub struct FcmGateway {
    client: reqwest::Client,
    server_key: Option<String>,
}

impl FcmGateway {
    pub fn from_env() -> Self {
        let path = std::env::var("FCM_CREDENTIALS_PATH")
            .unwrap_or_else(|_| "fcm_credentials.json".to_string());
        Self::from_credentials_file(&path)
    }

    pub fn from_credentials_file(path: &str) -> Self {
        let server_key = std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
            .and_then(|v| v["server_key"].as_str().map(String::from));
        match &server_key {
            Some(_) => println!("🔔 FCM push gateway ready"),
            None => eprintln!("⚠️ FCM credentials not found at {path} (push delivery disabled)"),
        }
        FcmGateway {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .expect("Failed to create HTTP client"),
            server_key,
        }
    }
}

impl PushSender for FcmGateway {
    fn deliver(&self, device_token: &str, title: &str, body: &str, data: PushData) {
        let Some(key) = &self.server_key else { return };
        let payload = serde_json::json!({
            "to": device_token,
            "notification": {"title": title, "body": body},
            "data": data,
        });
        let request = self
            .client
            .post(FCM_SEND_URL)
            .header("Authorization", format!("key={key}"))
            .json(&payload);

        // Fire-and-forget: the originating handler never waits on FCM.
        let token = device_token.to_string();
        tokio::spawn(async move {
            match request.send().await {
                Ok(resp) if !resp.status().is_success() => {
                    eprintln!("⚠️ Push to {token} failed: HTTP {}", resp.status());
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("⚠️ Push to {token} error: {e}");
                }
            }
        });
    }
}
