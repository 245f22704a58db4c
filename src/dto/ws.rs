use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dto::{
        room::{
            GameEndPayload, HubMediaPayload, ProgressPayload, QuestionPayload, ReseedPayload,
            ResultPayload, RevealPayload, RoomConfigView, RoomUpdate, TickPayload,
        },
        validation::{validate_player_name, validate_room_code},
    },
    error::{ErrorCode, ServiceError},
    state::game::{Answer, ConfigPatch, QuestionType, SeedSource, Track},
};

/// Envelope of every frame received from a client.
#[derive(Debug, Deserialize, ToSchema)]
pub struct InboundFrame {
    /// Command name, e.g. `player:joinRoom`.
    pub event: String,
    /// Command payload; defaults to `null`.
    #[serde(default)]
    pub data: Value,
    /// Acknowledgement id echoed back in the reply.
    #[serde(default)]
    pub ack: Option<u64>,
}

/// Errors raised while decoding a client command.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame is not valid JSON or does not match the payload shape.
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    /// The command name is not known.
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    /// The payload failed validation.
    #[error("validation failed: {0}")]
    Invalid(#[from] ValidationErrors),
}

impl From<FrameError> for ServiceError {
    fn from(err: FrameError) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

impl InboundFrame {
    /// Parse the envelope of a text frame.
    pub fn from_json_str(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode and validate the command carried by this frame.
    pub fn command(&self) -> Result<ClientCommand, FrameError> {
        ClientCommand::parse(&self.event, self.data.clone())
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
/// Payload naming the target room only.
pub struct RoomRef {
    #[validate(custom(function = "validate_room_code"))]
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
/// Join a room as a player.
pub struct JoinRoomRequest {
    #[validate(custom(function = "validate_room_code"))]
    pub code: String,
    /// Blank names fall back to `Player`.
    #[serde(default)]
    #[validate(custom(function = "validate_player_name"))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Track reference seeded by the hub.
pub struct TrackInput {
    #[validate(length(min = 1, max = 256))]
    pub id: String,
    #[validate(length(min = 1, max = 512))]
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
}

impl TrackInput {
    /// Convert into the internal track type.
    pub fn into_track(self) -> Track {
        Track {
            id: self.id,
            title: self.title,
            artist: self.artist,
            uri: self.uri,
            preview_url: self.preview_url,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Content source the tracks were resolved from.
pub struct SeedMetaInput {
    #[validate(length(min = 1))]
    pub playlist_id: String,
    #[validate(range(min = 1))]
    pub num_tracks: u32,
}

impl From<SeedMetaInput> for SeedSource {
    fn from(meta: SeedMetaInput) -> Self {
        SeedSource {
            playlist_id: meta.playlist_id,
            num_tracks: meta.num_tracks,
        }
    }
}

fn validate_tracks(tracks: &[TrackInput]) -> Result<(), ValidationErrors> {
    tracks.iter().try_for_each(Validate::validate)
}

pub(crate) fn into_tracks(tracks: Vec<TrackInput>) -> Vec<Track> {
    tracks.into_iter().map(TrackInput::into_track).collect()
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
/// Seed the ordered track list of a room.
pub struct SeedTracksRequest {
    pub code: String,
    pub tracks: Vec<TrackInput>,
    #[serde(default)]
    pub meta: Option<SeedMetaInput>,
}

impl Validate for SeedTracksRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        validate_code_field(&self.code)?;
        if self.tracks.is_empty() {
            let mut errors = ValidationErrors::new();
            errors.add("tracks", ValidationError::new("empty_track_list"));
            return Err(errors);
        }
        validate_tracks(&self.tracks)?;
        self.meta.as_ref().map_or(Ok(()), Validate::validate)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
/// Start the round, optionally seeding tracks in the same call.
pub struct StartGameRequest {
    pub code: String,
    #[serde(default, rename = "lstTracks")]
    pub lst_tracks: Option<Vec<TrackInput>>,
}

impl Validate for StartGameRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        validate_code_field(&self.code)?;
        self.lst_tracks
            .as_deref()
            .map_or(Ok(()), validate_tracks)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
/// Start a new round after the final leaderboard.
pub struct PlayAgainRequest {
    pub code: String,
    #[serde(default)]
    pub tracks: Option<Vec<TrackInput>>,
    #[serde(default)]
    pub meta: Option<SeedMetaInput>,
}

impl Validate for PlayAgainRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        validate_code_field(&self.code)?;
        self.tracks.as_deref().map_or(Ok(()), validate_tracks)?;
        self.meta.as_ref().map_or(Ok(()), Validate::validate)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Answer the open question with either an option index or a text guess.
pub struct SubmitAnswerRequest {
    pub code: String,
    pub question_id: u64,
    #[serde(default)]
    pub answer_index: Option<usize>,
    #[serde(default)]
    pub text: Option<String>,
}

impl Validate for SubmitAnswerRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        validate_code_field(&self.code)?;
        let mut errors = ValidationErrors::new();
        match (&self.answer_index, &self.text) {
            (None, None) => errors.add("answerIndex", ValidationError::new("missing_answer")),
            (None, Some(text)) if text.chars().count() > 512 => {
                errors.add("text", ValidationError::new("answer_too_long"))
            }
            _ => {}
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl SubmitAnswerRequest {
    /// Answer carried by the request; the index wins when both are present.
    pub fn answer(&self) -> Option<Answer> {
        match (&self.answer_index, &self.text) {
            (Some(index), _) => Some(Answer::Choice(*index)),
            (None, Some(text)) => Some(Answer::Text(text.clone())),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Partial room configuration update.
pub struct UpdateConfigRequest {
    pub code: String,
    #[serde(default)]
    pub max_questions: Option<u32>,
    #[serde(default)]
    pub default_duration_ms: Option<u64>,
    #[serde(default, rename = "selectedPlaylistIDs")]
    pub selected_playlist_ids: Option<Vec<String>>,
    #[serde(default)]
    pub question_type: Option<QuestionType>,
}

/// Bounds enforced on host configuration updates.
pub const MAX_QUESTIONS_RANGE: std::ops::RangeInclusive<u32> = 1..=50;
/// Bounds on the answer window of a question.
pub const DURATION_RANGE_MS: std::ops::RangeInclusive<u64> = 5_000..=120_000;

impl Validate for UpdateConfigRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        validate_code_field(&self.code)?;
        let mut errors = ValidationErrors::new();

        if let Some(max) = self.max_questions {
            if !MAX_QUESTIONS_RANGE.contains(&max) {
                let mut err = ValidationError::new("range");
                err.message = Some(format!("maxQuestions must be within 1..=50 (got {max})").into());
                errors.add("maxQuestions", err);
            }
        }

        if let Some(duration) = self.default_duration_ms {
            if !DURATION_RANGE_MS.contains(&duration) {
                let mut err = ValidationError::new("range");
                err.message = Some(
                    format!("defaultDurationMs must be within 5000..=120000 (got {duration})")
                        .into(),
                );
                errors.add("defaultDurationMs", err);
            }
        }

        if let Some(ids) = &self.selected_playlist_ids {
            if ids.iter().any(|id| id.trim().is_empty()) {
                let mut err = ValidationError::new("empty_playlist_id");
                err.message = Some("playlist ids must not be empty".into());
                errors.add("selectedPlaylistIDs", err);
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl UpdateConfigRequest {
    /// Fields to apply to the room configuration.
    pub fn patch(&self) -> ConfigPatch {
        ConfigPatch {
            max_questions: self.max_questions,
            default_duration_ms: self.default_duration_ms,
            selected_playlist_ids: self.selected_playlist_ids.clone(),
            question_type: self.question_type,
        }
    }
}

fn validate_code_field(code: &str) -> Result<(), ValidationErrors> {
    validate_room_code(code).map_err(|err| {
        let mut errors = ValidationErrors::new();
        errors.add("code", err);
        errors
    })
}

/// Commands accepted from WebSocket clients.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    /// `host:createRoom`
    CreateRoom,
    /// `host:closeRoom`
    CloseRoom(RoomRef),
    /// `player:joinRoom`
    JoinRoom(JoinRoomRequest),
    /// `player:leaveRoom`
    LeaveRoom(RoomRef),
    /// `game:seedTracks`
    SeedTracks(SeedTracksRequest),
    /// `game:startGame`
    StartGame(StartGameRequest),
    /// `game:requestStart`
    RequestStart(RoomRef),
    /// `game:advance`
    Advance(RoomRef),
    /// `game:reveal`
    Reveal(RoomRef),
    /// `game:playAgain`
    PlayAgain(PlayAgainRequest),
    /// `game:toLobby`
    ToLobby(RoomRef),
    /// `game:updateConfig`
    UpdateConfig(UpdateConfigRequest),
    /// `answer:submit`
    SubmitAnswer(SubmitAnswerRequest),
}

fn decode<T>(data: Value) -> Result<T, FrameError>
where
    T: for<'de> Deserialize<'de> + Validate,
{
    let payload: T = serde_json::from_value(data)?;
    payload.validate()?;
    Ok(payload)
}

impl ClientCommand {
    /// Decode the payload of `event` and validate it.
    pub fn parse(event: &str, data: Value) -> Result<Self, FrameError> {
        let command = match event {
            "host:createRoom" => ClientCommand::CreateRoom,
            "host:closeRoom" => ClientCommand::CloseRoom(decode(data)?),
            "player:joinRoom" => ClientCommand::JoinRoom(decode(data)?),
            "player:leaveRoom" => ClientCommand::LeaveRoom(decode(data)?),
            "game:seedTracks" => ClientCommand::SeedTracks(decode(data)?),
            "game:startGame" => ClientCommand::StartGame(decode(data)?),
            "game:requestStart" => ClientCommand::RequestStart(decode(data)?),
            "game:advance" => ClientCommand::Advance(decode(data)?),
            "game:reveal" => ClientCommand::Reveal(decode(data)?),
            "game:playAgain" => ClientCommand::PlayAgain(decode(data)?),
            "game:toLobby" => ClientCommand::ToLobby(decode(data)?),
            "game:updateConfig" => ClientCommand::UpdateConfig(decode(data)?),
            "answer:submit" => ClientCommand::SubmitAnswer(decode(data)?),
            other => return Err(FrameError::UnknownEvent(other.to_string())),
        };
        Ok(command)
    }

    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::CreateRoom => "host:createRoom",
            ClientCommand::CloseRoom(_) => "host:closeRoom",
            ClientCommand::JoinRoom(_) => "player:joinRoom",
            ClientCommand::LeaveRoom(_) => "player:leaveRoom",
            ClientCommand::SeedTracks(_) => "game:seedTracks",
            ClientCommand::StartGame(_) => "game:startGame",
            ClientCommand::RequestStart(_) => "game:requestStart",
            ClientCommand::Advance(_) => "game:advance",
            ClientCommand::Reveal(_) => "game:reveal",
            ClientCommand::PlayAgain(_) => "game:playAgain",
            ClientCommand::ToLobby(_) => "game:toLobby",
            ClientCommand::UpdateConfig(_) => "game:updateConfig",
            ClientCommand::SubmitAnswer(_) => "answer:submit",
        }
    }

    /// Room targeted by the command, as sent by the client.
    pub fn room_code(&self) -> Option<&str> {
        match self {
            ClientCommand::CreateRoom => None,
            ClientCommand::CloseRoom(r)
            | ClientCommand::LeaveRoom(r)
            | ClientCommand::RequestStart(r)
            | ClientCommand::Advance(r)
            | ClientCommand::Reveal(r)
            | ClientCommand::ToLobby(r) => Some(&r.code),
            ClientCommand::JoinRoom(r) => Some(&r.code),
            ClientCommand::SeedTracks(r) => Some(&r.code),
            ClientCommand::StartGame(r) => Some(&r.code),
            ClientCommand::PlayAgain(r) => Some(&r.code),
            ClientCommand::UpdateConfig(r) => Some(&r.code),
            ClientCommand::SubmitAnswer(r) => Some(&r.code),
        }
    }
}

/// Helpers turning validated requests into engine inputs.
pub(crate) fn tracks_from(tracks: Option<Vec<TrackInput>>) -> Option<Vec<Track>> {
    tracks.map(into_tracks)
}

/// Events pushed to room members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "room:update")]
    RoomUpdate(RoomUpdate),
    #[serde(rename = "room:closed")]
    RoomClosed,
    #[serde(rename = "game:lobby")]
    Lobby,
    #[serde(rename = "question:new")]
    QuestionNew(QuestionPayload),
    #[serde(rename = "question:next")]
    QuestionNext(QuestionPayload),
    #[serde(rename = "question:tick")]
    Tick(TickPayload),
    #[serde(rename = "progress:update")]
    Progress(ProgressPayload),
    #[serde(rename = "question:hubMedia")]
    HubMedia(HubMediaPayload),
    #[serde(rename = "question:reveal")]
    Reveal(RevealPayload),
    #[serde(rename = "question:result")]
    Result(ResultPayload),
    #[serde(rename = "game:end")]
    GameEnd(GameEndPayload),
    #[serde(rename = "server:requestReseed")]
    RequestReseed(ReseedPayload),
}

impl ServerEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::RoomUpdate(_) => "room:update",
            ServerEvent::RoomClosed => "room:closed",
            ServerEvent::Lobby => "game:lobby",
            ServerEvent::QuestionNew(_) => "question:new",
            ServerEvent::QuestionNext(_) => "question:next",
            ServerEvent::Tick(_) => "question:tick",
            ServerEvent::Progress(_) => "progress:update",
            ServerEvent::HubMedia(_) => "question:hubMedia",
            ServerEvent::Reveal(_) => "question:reveal",
            ServerEvent::Result(_) => "question:result",
            ServerEvent::GameEnd(_) => "game:end",
            ServerEvent::RequestReseed(_) => "server:requestReseed",
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Reply to a command carrying an acknowledgement id.
pub struct Ack {
    pub ok: bool,
    pub error: Option<ErrorCode>,
    pub message: Option<String>,
    /// Room code, on `host:createRoom`.
    pub code: Option<String>,
    /// Updated configuration, on `game:updateConfig`.
    pub config: Option<RoomConfigView>,
    /// Set when the hub was asked for fresh tracks instead of starting.
    pub reseed_requested: Option<bool>,
}

impl Ack {
    /// Plain success.
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    /// Failure carrying the error code and message.
    pub fn failure(err: &ServiceError) -> Self {
        Self {
            ok: false,
            error: Some(err.code()),
            message: Some(err.to_string()),
            ..Self::default()
        }
    }
}

/// Frames queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Room event.
    Event(ServerEvent),
    /// Acknowledgement of command `ack`.
    Ack {
        /// Id sent by the client.
        ack: u64,
        /// Reply body.
        reply: Ack,
    },
    /// Pong answering a ping.
    Pong(Vec<u8>),
    /// Close the socket after flushing.
    Close,
}

#[derive(Serialize)]
struct AckEnvelope<'a> {
    event: &'static str,
    ack: u64,
    data: &'a Ack,
}

impl OutboundFrame {
    /// JSON text of event and ack frames; `None` for control frames.
    pub fn to_json(&self) -> Option<Result<String, serde_json::Error>> {
        match self {
            OutboundFrame::Event(event) => Some(serde_json::to_string(event)),
            OutboundFrame::Ack { ack, reply } => Some(serde_json::to_string(&AckEnvelope {
                event: "ack",
                ack: *ack,
                data: reply,
            })),
            OutboundFrame::Pong(_) | OutboundFrame::Close => None,
        }
    }
}
