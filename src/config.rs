//! Application-level configuration loading, including per-room defaults and stage timings.

use std::{
    env, fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::state::game::{QuestionType, RoomConfig};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MIXMATCH_BACK_CONFIG_PATH";

const DEFAULT_ROOM_CODE_LENGTH: usize = 4;
const MIN_ROOM_CODE_LENGTH: usize = 3;
const MAX_ROOM_CODE_LENGTH: usize = 8;
const DEFAULT_MAX_QUESTIONS: u32 = 10;
const DEFAULT_DURATION_MS: u64 = 20_000;
const DEFAULT_REVEAL_DURATION_MS: u64 = 5_000;
const DEFAULT_RESULT_DURATION_MS: u64 = 5_000;
const DEFAULT_EMPTY_ROOM_GRACE_MS: u64 = 60_000;
const DEFAULT_POINTS_PER_CORRECT: u32 = 1;
const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Why a configuration file could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No file at the configured path.
    #[error("config file not found")]
    Missing,
    /// The file exists but could not be read.
    #[error("failed to read config: {0}")]
    Read(#[from] io::Error),
    /// The file is not valid configuration JSON.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Server-wide settings, fixed for the process lifetime.
pub struct AppConfig {
    room_code_length: usize,
    default_max_questions: u32,
    default_duration_ms: u64,
    reveal_duration_ms: u64,
    result_duration_ms: u64,
    empty_room_grace_ms: u64,
    points_per_correct: u32,
    history_capacity: usize,
}

/// Stage timings and scoring shared by every room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// How long the correct answer stays on screen.
    pub reveal_duration_ms: u64,
    /// How long the leaderboard stays on screen between questions.
    pub result_duration_ms: u64,
    /// How long a room without connected members survives.
    pub empty_room_grace_ms: u64,
    /// Points awarded per correct answer.
    pub points_per_correct: u32,
}

impl AppConfig {
    /// Load the configuration file, falling back to built-in defaults when it is
    /// missing or unreadable.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match Self::load_from(&path) {
            Ok(config) => {
                info!(
                    path = %path.display(),
                    room_code_length = config.room_code_length,
                    default_max_questions = config.default_max_questions,
                    history_capacity = config.history_capacity,
                    "loaded configuration"
                );
                config
            }
            Err(ConfigError::Missing) => {
                info!(path = %path.display(), "no config file, using built-in defaults");
                Self::default()
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring config file, using built-in defaults");
                Self::default()
            }
        }
    }

    /// Parse the JSON file at `path`; absent keys keep their defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => ConfigError::Missing,
            _ => ConfigError::Read(err),
        })?;
        let raw: RawConfig = serde_json::from_str(&contents)?;
        Ok(raw.into())
    }

    /// Length of generated room codes.
    pub fn room_code_length(&self) -> usize {
        self.room_code_length
    }

    /// Maximum number of round summaries kept in memory.
    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Configuration every new room starts with.
    pub fn room_defaults(&self) -> RoomConfig {
        RoomConfig {
            max_questions: self.default_max_questions,
            default_duration_ms: self.default_duration_ms,
            selected_playlist_ids: Vec::new(),
            question_type: QuestionType::default(),
        }
    }

    /// Timings handed to each room session.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            reveal_duration_ms: self.reveal_duration_ms,
            result_duration_ms: self.result_duration_ms,
            empty_room_grace_ms: self.empty_room_grace_ms,
            points_per_correct: self.points_per_correct,
        }
    }

    /// Copy of this configuration with different stage timings.
    pub fn with_timings(mut self, reveal_ms: u64, result_ms: u64, grace_ms: u64) -> Self {
        self.reveal_duration_ms = reveal_ms;
        self.result_duration_ms = result_ms;
        self.empty_room_grace_ms = grace_ms;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        AppConfig::default().session_settings()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
/// On-disk shape of the configuration file; every key is optional.
struct RawConfig {
    room_code_length: Option<usize>,
    default_max_questions: Option<u32>,
    default_duration_ms: Option<u64>,
    reveal_duration_ms: Option<u64>,
    result_duration_ms: Option<u64>,
    empty_room_grace_ms: Option<u64>,
    points_per_correct: Option<u32>,
    history_capacity: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            room_code_length: value
                .room_code_length
                .unwrap_or(DEFAULT_ROOM_CODE_LENGTH)
                .clamp(MIN_ROOM_CODE_LENGTH, MAX_ROOM_CODE_LENGTH),
            default_max_questions: value
                .default_max_questions
                .unwrap_or(DEFAULT_MAX_QUESTIONS)
                .max(1),
            default_duration_ms: value.default_duration_ms.unwrap_or(DEFAULT_DURATION_MS),
            reveal_duration_ms: value
                .reveal_duration_ms
                .unwrap_or(DEFAULT_REVEAL_DURATION_MS),
            result_duration_ms: value
                .result_duration_ms
                .unwrap_or(DEFAULT_RESULT_DURATION_MS),
            empty_room_grace_ms: value
                .empty_room_grace_ms
                .unwrap_or(DEFAULT_EMPTY_ROOM_GRACE_MS),
            points_per_correct: value.points_per_correct.unwrap_or(DEFAULT_POINTS_PER_CORRECT),
            history_capacity: value
                .history_capacity
                .unwrap_or(DEFAULT_HISTORY_CAPACITY)
                .max(1),
        }
    }
}

fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
