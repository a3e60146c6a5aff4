use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::FileSourceConfig;
use crate::nats::NatsTransportConfig;
use crate::session::{ConnectionParams, SessionConfig};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionConfig {
    pub nats_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_true")]
    pub smart_format: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
}

#[derive(Debug, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    /// 0 disables the limit
    #[serde(default = "default_max_buffered_chunks")]
    pub max_buffered_chunks: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            max_buffered_chunks: default_max_buffered_chunks(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AudioConfig {
    /// WAV file played back as the capture source
    pub wav_path: Option<String>,
    #[serde(default = "default_chunk_duration_ms")]
    pub chunk_duration_ms: u64,
    #[serde(default)]
    pub loop_playback: bool,
}

fn default_model() -> String {
    "nova-2".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u16 {
    1
}

fn default_grace_period_secs() -> u64 {
    60
}

fn default_keepalive_interval_secs() -> u64 {
    5
}

fn default_max_buffered_chunks() -> usize {
    1500
}

fn default_chunk_duration_ms() -> u64 {
    200
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connection: ConnectionParams {
                model: self.transcription.model.clone(),
                language: self.transcription.language.clone(),
                smart_format: self.transcription.smart_format,
            },
            grace_period: Duration::from_secs(self.session.grace_period_secs),
            keepalive_interval: Duration::from_secs(self.session.keepalive_interval_secs.max(1)),
            max_buffered_chunks: match self.session.max_buffered_chunks {
                0 => None,
                n => Some(n),
            },
            ..SessionConfig::default()
        }
    }

    pub fn transport_config(&self) -> NatsTransportConfig {
        NatsTransportConfig {
            url: self.transcription.nats_url.clone(),
            connect_timeout: Duration::from_secs(self.transcription.connect_timeout_secs),
            sample_rate: self.transcription.sample_rate,
            channels: self.transcription.channels,
        }
    }

    /// Source config for the configured WAV file, if any
    pub fn file_source_config(&self) -> Option<FileSourceConfig> {
        let path = self.audio.wav_path.as_ref()?;
        Some(FileSourceConfig {
            path: PathBuf::from(path),
            chunk_duration: Duration::from_millis(self.audio.chunk_duration_ms.max(1)),
            target_sample_rate: self.transcription.sample_rate,
            target_channels: self.transcription.channels,
            loop_playback: self.audio.loop_playback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp config");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_load_applies_defaults() {
        let file = write_config(
            r#"
[service]
name = "loqa-dictation"

[service.http]
bind = "127.0.0.1"
port = 3100

[transcription]
nats_url = "nats://localhost:4222"
"#,
        );

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        let session = config.session_config();

        assert_eq!(session.grace_period, Duration::from_secs(60));
        assert_eq!(session.keepalive_interval, Duration::from_secs(5));
        assert_eq!(session.max_buffered_chunks, Some(1500));
        assert_eq!(session.connection.model, "nova-2");
        assert_eq!(session.connection.language, "en-US");
        assert!(session.connection.smart_format);
        assert!(config.file_source_config().is_none());
    }

    #[test]
    fn test_load_overrides() {
        let file = write_config(
            r#"
[service]
name = "dictation"

[service.http]
bind = "0.0.0.0"
port = 8080

[transcription]
nats_url = "nats://stt:4222"
model = "whisper-large"
language = "de-DE"
smart_format = false

[session]
grace_period_secs = 15
max_buffered_chunks = 0

[audio]
wav_path = "/tmp/input.wav"
chunk_duration_ms = 100
"#,
        );

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        let session = config.session_config();

        assert_eq!(config.service.http.port, 8080);
        assert_eq!(session.grace_period, Duration::from_secs(15));
        assert_eq!(session.max_buffered_chunks, None);
        assert_eq!(session.connection.language, "de-DE");
        assert!(!session.connection.smart_format);

        let transport = config.transport_config();
        assert_eq!(transport.url, "nats://stt:4222");

        let source = config.file_source_config().unwrap();
        assert_eq!(source.chunk_duration, Duration::from_millis(100));
        assert_eq!(source.target_sample_rate, 16000);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Config::load("/nonexistent/loqa-dictation").is_err());
    }
}
