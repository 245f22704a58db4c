//! Authoritative state of a single room.
//!
//! [`RoomSession`] is synchronous and never touches I/O. Every call takes the
//! current time explicitly and queues [`Effect`]s that the owning actor must
//! deliver in order. A failed command leaves both the state and the effect
//! queue untouched.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::{
    config::SessionSettings,
    dao::models::{RoundSummary, StandingEntity},
    dto::{
        phase::VisibleStage,
        room::{
            GameEndPayload, HubMediaPayload, PlayerSummary, ProgressPayload, QuestionPayload,
            ReseedPayload, ResultPayload, RevealPayload, RoomConfigView, RoomUpdate,
            SeedSourceView, TickPayload, TrackMeta, leaderboard_entries,
        },
        validation::display_name,
        ws::ServerEvent,
    },
    error::ServiceError,
    state::{
        aggregator::AnswerAggregator,
        clock::system_time_from_ms,
        game::{
            Answer, ConfigPatch, ConnectionId, Player, Question, QuestionId, RoomConfig,
            SeedSource, Standing, Track, leaderboard,
        },
        state_machine::{RevealTrigger, RoomStateMachine, Stage, StageEvent},
        timer::{TimerKind, TimerScheduler, TimerSignal},
    },
};

/// Recipients of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Host and every player subscribed to the room.
    Room,
    /// The hub connection only.
    Host,
    /// A single connection.
    Connection(ConnectionId),
}

/// Side effect queued by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Push `event` to `audience`.
    Deliver {
        /// Who receives the event.
        audience: Audience,
        /// The event itself.
        event: ServerEvent,
    },
    /// Hand a finished round to the history recorder.
    Record(RoundSummary),
}

/// Commands routed to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomCommand {
    /// Join as a player, or reclaim a disconnected seat mid-game.
    Join {
        /// Requested display name; blank means `Player`.
        name: String,
    },
    /// Leave the room as a player.
    Leave,
    /// Replace the track list.
    SeedTracks {
        /// Ordered tracks, one per question.
        tracks: Vec<Track>,
        /// Source the tracks came from, reused for reseeding.
        source: Option<SeedSource>,
    },
    /// Start the round, optionally seeding tracks first.
    StartGame {
        /// Tracks to seed before starting.
        tracks: Option<Vec<Track>>,
    },
    /// Start with seeded tracks, or ask the hub for some.
    RequestStart,
    /// Move to the next stage.
    Advance,
    /// Close the answer window now.
    Reveal,
    /// Start a new round from the final leaderboard.
    PlayAgain {
        /// Fresh tracks for the new round.
        tracks: Option<Vec<Track>>,
        /// Source the tracks came from.
        source: Option<SeedSource>,
    },
    /// Return everyone to the lobby.
    ToLobby,
    /// Answer the open question.
    SubmitAnswer {
        /// Question the answer targets.
        question_id: QuestionId,
        /// The answer.
        answer: Answer,
    },
    /// Change the room configuration.
    UpdateConfig(ConfigPatch),
    /// Close the room.
    Close,
}

/// Successful outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    /// Applied; nothing else to report.
    Done,
    /// The connection is now a player of the room.
    Joined,
    /// New configuration after an update.
    Config(RoomConfigView),
    /// The hub was asked for fresh tracks instead of starting.
    ReseedRequested,
}

/// State of one room.
#[derive(Debug)]
pub struct RoomSession {
    code: String,
    host_id: Option<ConnectionId>,
    players: IndexMap<ConnectionId, Player>,
    machine: RoomStateMachine,
    config: RoomConfig,
    settings: SessionSettings,
    track_list: Vec<Track>,
    seed_source: Option<SeedSource>,
    question_index: usize,
    next_question_id: QuestionId,
    current_question: Option<Question>,
    aggregator: AnswerAggregator,
    timers: TimerScheduler,
    last_reveal: Option<RevealPayload>,
    leaderboard: Vec<Standing>,
    evict_at: Option<u64>,
    closed: bool,
    effects: Vec<Effect>,
}

impl RoomSession {
    /// Create a room in the lobby, owned by `host`.
    pub fn new(
        code: String,
        host: ConnectionId,
        config: RoomConfig,
        settings: SessionSettings,
    ) -> Self {
        let mut session = Self {
            code,
            host_id: Some(host),
            players: IndexMap::new(),
            machine: RoomStateMachine::new(),
            config,
            settings,
            track_list: Vec::new(),
            seed_source: None,
            question_index: 0,
            next_question_id: 1,
            current_question: None,
            aggregator: AnswerAggregator::new(),
            timers: TimerScheduler::new(),
            last_reveal: None,
            leaderboard: Vec::new(),
            evict_at: None,
            closed: false,
            effects: Vec::new(),
        };
        if let Err(err) = session.transition(StageEvent::RoomCreated) {
            warn!(room = %session.code, error = %err, "room created in unexpected stage");
        }
        session.publish_room_update();
        session
    }

    /// Room code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.machine.stage()
    }

    /// Connection of the hub, if attached.
    pub fn host_id(&self) -> Option<ConnectionId> {
        self.host_id
    }

    /// Earliest-joined player still in the room.
    pub fn first_player_id(&self) -> Option<ConnectionId> {
        self.players.keys().next().copied()
    }

    /// Players in join order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Current configuration.
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Question on screen, during `question` and `reveal`.
    pub fn current_question(&self) -> Option<&Question> {
        self.current_question.as_ref()
    }

    /// Zero-based index of the current question.
    pub fn question_index(&self) -> usize {
        self.question_index
    }

    /// True once the room was closed or evicted.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Drain queued effects in emission order.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Number of queued effects.
    pub fn effects_len(&self) -> usize {
        self.effects.len()
    }

    /// Drop effects queued after `mark`.
    pub fn discard_effects_from(&mut self, mark: usize) {
        self.effects.truncate(mark);
    }

    /// Earliest instant [`on_clock`](Self::on_clock) has work to do.
    pub fn next_wake(&self, now_ms: u64) -> Option<u64> {
        if self.closed {
            return None;
        }
        match (self.timers.next_wake(now_ms), self.evict_at) {
            (Some(timer), Some(evict)) => Some(timer.min(evict)),
            (timer, evict) => timer.or(evict),
        }
    }

    /// Apply `command` issued by `actor`.
    pub fn handle(
        &mut self,
        actor: ConnectionId,
        command: RoomCommand,
        now_ms: u64,
    ) -> Result<CommandReply, ServiceError> {
        if self.closed {
            return Err(ServiceError::RoomNotFound(self.code.clone()));
        }

        match command {
            RoomCommand::Join { name } => self.join(actor, &name, now_ms),
            RoomCommand::Leave => self.leave(actor, now_ms),
            RoomCommand::SeedTracks { tracks, source } => self.seed_tracks(actor, tracks, source),
            RoomCommand::StartGame { tracks } => self.start_game(actor, tracks, now_ms),
            RoomCommand::RequestStart => self.request_start(actor, now_ms),
            RoomCommand::Advance => self.advance(actor, now_ms),
            RoomCommand::Reveal => self.force_reveal(actor, now_ms),
            RoomCommand::PlayAgain { tracks, source } => {
                self.play_again(actor, tracks, source, now_ms)
            }
            RoomCommand::ToLobby => self.to_lobby(actor, now_ms),
            RoomCommand::SubmitAnswer {
                question_id,
                answer,
            } => self.submit_answer(actor, question_id, answer, now_ms),
            RoomCommand::UpdateConfig(patch) => self.update_config(actor, patch),
            RoomCommand::Close => {
                self.require_host(actor)?;
                self.close("closed by host");
                Ok(CommandReply::Done)
            }
        }
    }

    /// A member's socket went away.
    pub fn disconnect(&mut self, connection: ConnectionId, now_ms: u64) {
        if self.closed {
            return;
        }

        if self.host_id == Some(connection) {
            self.host_id = None;
            info!(room = %self.code, host = %connection, "host disconnected");
            self.publish_room_update();
        } else if self.players.contains_key(&connection) {
            if self.stage() == Stage::Lobby {
                self.remove_player(connection, now_ms);
                return;
            }
            if let Some(player) = self.players.get_mut(&connection) {
                player.connected = false;
            }
            info!(room = %self.code, player = %connection, "player disconnected mid-game");
            self.publish_room_update();
        }

        self.refresh_eviction(now_ms);
    }

    /// Process countdown ticks, expiries and eviction due at `now_ms`.
    pub fn on_clock(&mut self, now_ms: u64) {
        if self.closed {
            return;
        }

        for signal in self.timers.poll(now_ms) {
            match signal {
                TimerSignal::Tick { kind, seconds } => {
                    debug!(room = %self.code, ?kind, seconds, "countdown tick");
                    self.broadcast(ServerEvent::Tick(TickPayload { seconds }));
                }
                TimerSignal::Expired { kind, .. } => {
                    let outcome = match kind {
                        TimerKind::Question => self.close_question(RevealTrigger::Timer, now_ms),
                        TimerKind::Reveal => self.show_results(now_ms),
                        TimerKind::Result => self.next_or_finish(now_ms),
                    };
                    if let Err(err) = outcome {
                        warn!(room = %self.code, ?kind, error = %err, "timer expiry ignored");
                    }
                }
            }
        }

        if let Some(at) = self.evict_at {
            if now_ms >= at {
                self.close("no connected members");
            }
        }
    }

    /// Close the room on behalf of the server.
    pub fn shutdown(&mut self) {
        self.close("server shutdown");
    }

    /// Snapshot broadcast as `room:update`.
    pub fn room_update(&self) -> RoomUpdate {
        RoomUpdate {
            code: self.code.clone(),
            players: self.players.values().map(PlayerSummary::from).collect(),
            host_id: self.host_id,
            first_player_id: self.first_player_id(),
            config: RoomConfigView::from(&self.config),
            stage: VisibleStage::from(self.stage()),
        }
    }

    fn join(
        &mut self,
        actor: ConnectionId,
        name: &str,
        now_ms: u64,
    ) -> Result<CommandReply, ServiceError> {
        let name = display_name(name);
        if self.host_id == Some(actor) {
            return Err(ServiceError::Forbidden(
                "the host cannot join its own room as a player".into(),
            ));
        }

        if let Some(player) = self.players.get_mut(&actor) {
            player.name = name;
            player.connected = true;
        } else {
            match self.stage() {
                Stage::Lobby => {
                    info!(room = %self.code, player = %actor, %name, "player joined");
                    self.players.insert(actor, Player::new(actor, name));
                }
                Stage::Idle => return Err(ServiceError::RoomNotFound(self.code.clone())),
                stage => {
                    let wanted = name.to_lowercase();
                    let seat = self
                        .players
                        .values()
                        .find(|player| !player.connected && player.name.to_lowercase() == wanted)
                        .map(|player| player.id);
                    let Some(previous) = seat else {
                        return Err(ServiceError::RoomLocked(format!(
                            "room {} is in {stage} and has no free seat for {name}",
                            self.code
                        )));
                    };
                    self.rebind(previous, actor);
                    info!(room = %self.code, player = %actor, %previous, %name, "player reclaimed seat");
                }
            }
        }

        self.refresh_eviction(now_ms);
        self.publish_room_update();
        self.send_snapshot(actor, now_ms);
        Ok(CommandReply::Joined)
    }

    fn leave(&mut self, actor: ConnectionId, now_ms: u64) -> Result<CommandReply, ServiceError> {
        if !self.players.contains_key(&actor) {
            return Err(ServiceError::Forbidden("not a player of this room".into()));
        }
        self.remove_player(actor, now_ms);
        Ok(CommandReply::Done)
    }

    fn seed_tracks(
        &mut self,
        actor: ConnectionId,
        tracks: Vec<Track>,
        source: Option<SeedSource>,
    ) -> Result<CommandReply, ServiceError> {
        self.require_host(actor)?;
        let stage = self.stage();
        if !matches!(stage, Stage::Lobby | Stage::GameOver) {
            return Err(ServiceError::InvalidState(format!(
                "tracks cannot be seeded while in {stage}"
            )));
        }
        if tracks.is_empty() {
            return Err(ServiceError::InvalidInput(
                "track list must not be empty".into(),
            ));
        }

        info!(room = %self.code, count = tracks.len(), "tracks seeded");
        self.track_list = tracks;
        if source.is_some() {
            self.seed_source = source;
        }
        Ok(CommandReply::Done)
    }

    fn start_game(
        &mut self,
        actor: ConnectionId,
        tracks: Option<Vec<Track>>,
        now_ms: u64,
    ) -> Result<CommandReply, ServiceError> {
        self.require_controller(actor)?;
        let tracks = tracks.filter(|tracks| !tracks.is_empty());
        self.check_start(tracks.as_deref())?;

        if let Some(tracks) = tracks {
            self.track_list = tracks;
        }
        self.begin_round(StageEvent::StartRound, now_ms)?;
        Ok(CommandReply::Done)
    }

    fn check_start(&self, incoming: Option<&[Track]>) -> Result<(), ServiceError> {
        let stage = self.stage();
        if self.machine.check(StageEvent::StartRound).is_err() {
            return Err(ServiceError::InvalidStartState(format!(
                "a round cannot start while in {stage}"
            )));
        }
        if self.players.is_empty() {
            return Err(ServiceError::InvalidStartState(
                "at least one player must join".into(),
            ));
        }
        if self.config.selected_playlist_ids.is_empty() && self.seed_source.is_none() {
            return Err(ServiceError::InvalidStartState(
                "no content source selected".into(),
            ));
        }
        if incoming.is_none() && self.track_list.is_empty() {
            return Err(ServiceError::InvalidStartState("no tracks seeded".into()));
        }
        Ok(())
    }

    fn request_start(
        &mut self,
        actor: ConnectionId,
        now_ms: u64,
    ) -> Result<CommandReply, ServiceError> {
        self.require_controller(actor)?;
        if !self.track_list.is_empty() {
            return self.start_game(actor, None, now_ms);
        }

        let stage = self.stage();
        if stage != Stage::Lobby {
            return Err(ServiceError::InvalidStartState(format!(
                "a round cannot start while in {stage}"
            )));
        }
        if self.players.is_empty() {
            return Err(ServiceError::InvalidStartState(
                "at least one player must join".into(),
            ));
        }
        let source = self.reseed_source().ok_or_else(|| {
            ServiceError::InvalidStartState("no content source selected".into())
        })?;
        self.request_reseed(source)?;
        Ok(CommandReply::ReseedRequested)
    }

    fn advance(&mut self, actor: ConnectionId, now_ms: u64) -> Result<CommandReply, ServiceError> {
        self.require_controller(actor)?;
        match self.stage() {
            Stage::Question => self.close_question(RevealTrigger::Manual, now_ms)?,
            Stage::Reveal => self.show_results(now_ms)?,
            Stage::Result => self.next_or_finish(now_ms)?,
            stage => {
                return Err(ServiceError::InvalidState(format!(
                    "nothing to advance while in {stage}"
                )));
            }
        }
        Ok(CommandReply::Done)
    }

    fn force_reveal(
        &mut self,
        actor: ConnectionId,
        now_ms: u64,
    ) -> Result<CommandReply, ServiceError> {
        self.require_controller(actor)?;
        self.close_question(RevealTrigger::Manual, now_ms)?;
        Ok(CommandReply::Done)
    }

    fn play_again(
        &mut self,
        actor: ConnectionId,
        tracks: Option<Vec<Track>>,
        source: Option<SeedSource>,
        now_ms: u64,
    ) -> Result<CommandReply, ServiceError> {
        self.require_host(actor)?;
        self.machine.check(StageEvent::PlayAgain)?;

        match tracks.filter(|tracks| !tracks.is_empty()) {
            Some(tracks) => {
                if source.is_some() {
                    self.seed_source = source;
                }
                self.track_list = tracks;
                self.begin_round(StageEvent::PlayAgain, now_ms)?;
                Ok(CommandReply::Done)
            }
            None => {
                let source = source.or_else(|| self.reseed_source()).ok_or_else(|| {
                    ServiceError::InvalidStartState("no content source to reseed from".into())
                })?;
                self.request_reseed(source.clone())?;
                self.seed_source = Some(source);
                Ok(CommandReply::ReseedRequested)
            }
        }
    }

    fn to_lobby(&mut self, actor: ConnectionId, now_ms: u64) -> Result<CommandReply, ServiceError> {
        self.require_host(actor)?;
        self.transition(StageEvent::ReturnToLobby)?;

        // Seats kept for in-game reconnects do not survive into the lobby.
        let before = self.players.len();
        self.players.retain(|_, player| player.connected);
        let dropped = before - self.players.len();
        if dropped > 0 {
            info!(room = %self.code, dropped, "disconnected players removed on return to lobby");
        }
        self.refresh_eviction(now_ms);

        self.timers.cancel();
        self.current_question = None;
        self.aggregator.clear();
        self.last_reveal = None;
        self.leaderboard.clear();
        self.question_index = 0;

        self.broadcast(ServerEvent::Lobby);
        self.publish_room_update();
        Ok(CommandReply::Done)
    }

    fn submit_answer(
        &mut self,
        actor: ConnectionId,
        question_id: QuestionId,
        answer: Answer,
        now_ms: u64,
    ) -> Result<CommandReply, ServiceError> {
        if !self.players.contains_key(&actor) {
            return Err(ServiceError::Forbidden("only players can answer".into()));
        }
        let stage = self.stage();
        let Some(question) = self.current_question.as_ref() else {
            return Err(ServiceError::StaleSubmission("no question is open".into()));
        };
        self.aggregator
            .submit(stage, question, now_ms, actor, question_id, answer)?;

        debug!(room = %self.code, player = %actor, question = question_id, "answer recorded");
        self.publish_progress();
        self.reveal_if_complete(now_ms);
        Ok(CommandReply::Done)
    }

    fn update_config(
        &mut self,
        actor: ConnectionId,
        patch: ConfigPatch,
    ) -> Result<CommandReply, ServiceError> {
        self.require_host(actor)?;
        let stage = self.stage();
        if stage != Stage::Lobby {
            return Err(ServiceError::InvalidState(format!(
                "configuration is locked while in {stage}"
            )));
        }

        self.config.apply(patch);
        info!(
            room = %self.code,
            max_questions = self.config.max_questions,
            duration_ms = self.config.default_duration_ms,
            "room configuration updated"
        );
        self.publish_room_update();
        Ok(CommandReply::Config(RoomConfigView::from(&self.config)))
    }

    fn begin_round(&mut self, event: StageEvent, now_ms: u64) -> Result<(), ServiceError> {
        self.transition(event)?;

        for player in self.players.values_mut() {
            player.score = 0;
        }
        self.question_index = 0;
        self.leaderboard.clear();
        self.last_reveal = None;

        info!(
            room = %self.code,
            tracks = self.track_list.len(),
            max_questions = self.config.max_questions,
            "round started"
        );
        self.publish_room_update();
        self.present_question(true, now_ms);
        Ok(())
    }

    fn present_question(&mut self, first: bool, now_ms: u64) {
        let Some(track) = self.track_list.get(self.question_index).cloned() else {
            warn!(room = %self.code, index = self.question_index, "no track left for question");
            return;
        };

        let id = self.next_question_id;
        self.next_question_id += 1;
        let kind = self.config.question_type.kind_for(self.question_index);
        let duration_ms = self.config.default_duration_ms;
        let question = Question::build(
            id,
            kind,
            &track,
            &self.track_list,
            duration_ms,
            now_ms + duration_ms,
            &mut rand::rng(),
        );

        self.aggregator.open(id);
        self.timers.start(TimerKind::Question, now_ms, question.deadline_ms);
        let payload = QuestionPayload::from_question(
            &question,
            self.question_index + 1,
            self.round_length(),
            now_ms,
        );
        self.current_question = Some(question);

        debug!(room = %self.code, question = id, index = self.question_index, "question presented");
        self.broadcast(if first {
            ServerEvent::QuestionNew(payload)
        } else {
            ServerEvent::QuestionNext(payload)
        });
        self.send_to_host(ServerEvent::HubMedia(HubMediaPayload::from(&track)));
        self.publish_progress();
    }

    fn close_question(&mut self, trigger: RevealTrigger, now_ms: u64) -> Result<(), ServiceError> {
        self.machine.check(StageEvent::RevealAnswers(trigger))?;
        let Some(question) = self.current_question.clone() else {
            return Err(ServiceError::InvalidState("no question is open".into()));
        };

        self.timers.cancel();
        let (per_option_counts, correct_count) = match self.aggregator.settle(&question) {
            Some(tally) => {
                for id in &tally.correct {
                    if let Some(player) = self.players.get_mut(id) {
                        player.score = player.score.saturating_add(self.settings.points_per_correct);
                    }
                }
                (tally.per_option_counts, tally.correct.len())
            }
            None => (self.aggregator.counts(&question), 0),
        };

        let reveal_until = now_ms + self.settings.reveal_duration_ms;
        self.timers.start(TimerKind::Reveal, now_ms, reveal_until);
        self.transition(StageEvent::RevealAnswers(trigger))?;

        let payload = RevealPayload {
            question_id: question.id,
            correct_index: question.correct_index,
            per_option_counts,
            correct_count,
            reveal_until,
            track_meta: TrackMeta::from(&question.track),
        };
        self.last_reveal = Some(payload.clone());
        self.broadcast(ServerEvent::Reveal(payload));
        self.publish_room_update();
        Ok(())
    }

    fn show_results(&mut self, now_ms: u64) -> Result<(), ServiceError> {
        self.transition(StageEvent::ShowResults)?;

        self.current_question = None;
        self.aggregator.clear();
        self.leaderboard = leaderboard(self.players.values());
        let result_until = now_ms + self.settings.result_duration_ms;
        self.timers.start(TimerKind::Result, now_ms, result_until);

        self.broadcast(ServerEvent::Result(ResultPayload {
            leaderboard: leaderboard_entries(&self.leaderboard),
            result_until,
        }));
        Ok(())
    }

    fn next_or_finish(&mut self, now_ms: u64) -> Result<(), ServiceError> {
        let stage = self.stage();
        if stage != Stage::Result {
            return Err(ServiceError::InvalidState(format!(
                "no next question while in {stage}"
            )));
        }

        let played = self.question_index + 1;
        if played >= self.config.max_questions as usize || played >= self.track_list.len() {
            self.question_index = played;
            return self.finish_game(now_ms);
        }

        self.transition(StageEvent::NextQuestion)?;
        self.question_index = played;
        self.present_question(false, now_ms);
        Ok(())
    }

    fn finish_game(&mut self, now_ms: u64) -> Result<(), ServiceError> {
        self.transition(StageEvent::FinishGame)?;
        self.timers.cancel();
        self.leaderboard = leaderboard(self.players.values());

        info!(
            room = %self.code,
            questions = self.question_index,
            winner = self.leaderboard.first().map(|s| s.name.as_str()).unwrap_or("-"),
            "round finished"
        );
        self.broadcast(ServerEvent::GameEnd(GameEndPayload {
            leaderboard: leaderboard_entries(&self.leaderboard),
        }));
        self.effects.push(Effect::Record(RoundSummary {
            room_code: self.code.clone(),
            leaderboard: self.leaderboard.iter().map(StandingEntity::from).collect(),
            config: (&self.config).into(),
            tracks_played: self.question_index,
            ended_at: system_time_from_ms(now_ms),
        }));
        Ok(())
    }

    fn reveal_if_complete(&mut self, now_ms: u64) {
        if self.stage() != Stage::Question {
            return;
        }
        if self.aggregator.progress(self.players.len()).is_complete() {
            if let Err(err) = self.close_question(RevealTrigger::AllAnswered, now_ms) {
                warn!(room = %self.code, error = %err, "early reveal failed");
            }
        }
    }

    fn remove_player(&mut self, id: ConnectionId, now_ms: u64) {
        if self.players.shift_remove(&id).is_none() {
            return;
        }
        self.aggregator.remove(&id);
        info!(room = %self.code, player = %id, "player left");

        self.publish_room_update();
        if self.stage() == Stage::Question {
            self.publish_progress();
            self.reveal_if_complete(now_ms);
        }
        self.refresh_eviction(now_ms);
    }

    fn rebind(&mut self, from: ConnectionId, to: ConnectionId) {
        self.players = std::mem::take(&mut self.players)
            .into_iter()
            .map(|(id, mut player)| {
                if id == from {
                    player.id = to;
                    player.connected = true;
                    (to, player)
                } else {
                    (id, player)
                }
            })
            .collect();
        self.aggregator.rebind(&from, to);
        for standing in self.leaderboard.iter_mut().filter(|s| s.id == from) {
            standing.id = to;
        }
    }

    fn close(&mut self, reason: &str) {
        if self.closed {
            return;
        }
        self.timers.cancel();
        self.evict_at = None;
        self.current_question = None;
        self.aggregator.clear();
        if let Err(err) = self.transition(StageEvent::Close) {
            warn!(room = %self.code, error = %err, "close applied outside the table");
        }
        self.closed = true;
        info!(room = %self.code, reason, "room closed");
        self.broadcast(ServerEvent::RoomClosed);
    }

    fn refresh_eviction(&mut self, now_ms: u64) {
        let connected = usize::from(self.host_id.is_some())
            + self.players.values().filter(|p| p.connected).count();
        if connected > 0 {
            self.evict_at = None;
        } else if self.evict_at.is_none() {
            let at = now_ms + self.settings.empty_room_grace_ms;
            info!(room = %self.code, evict_at = at, "room has no connected members");
            self.evict_at = Some(at);
        }
    }

    fn reseed_source(&self) -> Option<SeedSource> {
        self.seed_source.clone().or_else(|| {
            self.config
                .selected_playlist_ids
                .first()
                .map(|playlist_id| SeedSource {
                    playlist_id: playlist_id.clone(),
                    num_tracks: self.config.max_questions,
                })
        })
    }

    fn request_reseed(&mut self, source: SeedSource) -> Result<(), ServiceError> {
        if self.host_id.is_none() {
            return Err(ServiceError::InvalidStartState(
                "the hub is not connected".into(),
            ));
        }
        info!(room = %self.code, playlist = %source.playlist_id, "requesting reseed from hub");
        self.send_to_host(ServerEvent::RequestReseed(ReseedPayload {
            source: SeedSourceView::from(&source),
        }));
        Ok(())
    }

    fn require_host(&self, actor: ConnectionId) -> Result<(), ServiceError> {
        match self.host_id {
            Some(host) if host == actor => Ok(()),
            None if self.first_player_id() == Some(actor) => Ok(()),
            _ => Err(ServiceError::Forbidden("host only".into())),
        }
    }

    fn require_controller(&self, actor: ConnectionId) -> Result<(), ServiceError> {
        if self.host_id == Some(actor) || self.first_player_id() == Some(actor) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "only the host or the first player can do this".into(),
            ))
        }
    }

    fn round_length(&self) -> u32 {
        (self.config.max_questions as usize).min(self.track_list.len()) as u32
    }

    fn send_snapshot(&mut self, connection: ConnectionId, now_ms: u64) {
        let number = self.question_index + 1;
        let total = self.round_length();
        match self.stage() {
            Stage::Question | Stage::Reveal => {
                if let Some(question) = &self.current_question {
                    let payload = QuestionPayload::from_question(question, number, total, now_ms);
                    self.send_to(connection, ServerEvent::QuestionNew(payload));
                }
                if let Some(reveal) = self.last_reveal.clone().filter(|_| self.stage() == Stage::Reveal) {
                    self.send_to(connection, ServerEvent::Reveal(reveal));
                } else {
                    let progress = self.aggregator.progress(self.players.len());
                    self.send_to(
                        connection,
                        ServerEvent::Progress(ProgressPayload {
                            answered: progress.answered,
                            total: progress.total,
                        }),
                    );
                }
            }
            Stage::Result => {
                let result_until = self
                    .timers
                    .active()
                    .map(|(_, deadline)| deadline)
                    .unwrap_or(now_ms);
                self.send_to(
                    connection,
                    ServerEvent::Result(ResultPayload {
                        leaderboard: leaderboard_entries(&self.leaderboard),
                        result_until,
                    }),
                );
            }
            Stage::GameOver => {
                self.send_to(
                    connection,
                    ServerEvent::GameEnd(GameEndPayload {
                        leaderboard: leaderboard_entries(&self.leaderboard),
                    }),
                );
            }
            Stage::Lobby | Stage::Idle => {}
        }
    }

    fn publish_room_update(&mut self) {
        let update = self.room_update();
        self.broadcast(ServerEvent::RoomUpdate(update));
    }

    fn publish_progress(&mut self) {
        let progress = self.aggregator.progress(self.players.len());
        self.broadcast(ServerEvent::Progress(ProgressPayload {
            answered: progress.answered,
            total: progress.total,
        }));
    }

    fn transition(&mut self, event: StageEvent) -> Result<Stage, ServiceError> {
        let from = self.machine.stage();
        let to = self.machine.apply(event)?;
        info!(room = %self.code, %from, %to, ?event, "stage transition");
        Ok(to)
    }

    fn broadcast(&mut self, event: ServerEvent) {
        self.effects.push(Effect::Deliver {
            audience: Audience::Room,
            event,
        });
    }

    fn send_to_host(&mut self, event: ServerEvent) {
        self.effects.push(Effect::Deliver {
            audience: Audience::Host,
            event,
        });
    }

    fn send_to(&mut self, connection: ConnectionId, event: ServerEvent) {
        self.effects.push(Effect::Deliver {
            audience: Audience::Connection(connection),
            event,
        });
    }
}
