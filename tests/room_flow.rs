use std::time::Duration;

use mixmatch_back::{
    config::AppConfig,
    dto::ws::{Ack, ClientCommand, OutboundFrame, ServerEvent},
    error::{ErrorCode, ServiceError},
    services::room_service,
    state::{AppState, EventSender, SharedState, game::ConnectionId},
};
use serde_json::{Value, json};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

struct Client {
    id: ConnectionId,
    tx: EventSender,
    rx: UnboundedReceiver<OutboundFrame>,
}

impl Client {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            id: Uuid::new_v4(),
            tx,
            rx,
        }
    }

    async fn send(&self, state: &SharedState, event: &str, data: Value) -> Result<Ack, ServiceError> {
        let command = ClientCommand::parse(event, data)?;
        room_service::dispatch(state, self.id, &self.tx, command).await
    }

    fn events(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            if let OutboundFrame::Event(event) = frame {
                events.push(event);
            }
        }
        events
    }
}

fn tracks(count: usize) -> Value {
    Value::Array(
        (1..=count)
            .map(|i| json!({"id": format!("t{i}"), "title": format!("Song {i}"), "uri": format!("spotify:track:{i}")}))
            .collect(),
    )
}

struct Lobby {
    state: SharedState,
    code: String,
    host: Client,
    players: Vec<Client>,
}

async fn lobby(player_count: usize) -> Lobby {
    let state = AppState::new(AppConfig::default());
    let host = Client::new();
    let code = host
        .send(&state, "host:createRoom", json!({}))
        .await
        .unwrap()
        .code
        .unwrap();
    host.send(
        &state,
        "game:updateConfig",
        json!({"code": code, "selectedPlaylistIDs": ["playlist-1"]}),
    )
    .await
    .unwrap();

    let mut players = Vec::new();
    for i in 0..player_count {
        let player = Client::new();
        player
            .send(&state, "player:joinRoom", json!({"code": code, "name": format!("p{i}")}))
            .await
            .unwrap();
        players.push(player);
    }
    Lobby {
        state,
        code,
        host,
        players,
    }
}

fn first_question(events: &[ServerEvent]) -> (u64, u64) {
    events
        .iter()
        .find_map(|event| match event {
            ServerEvent::QuestionNew(question) => Some((question.id, question.duration_ms)),
            _ => None,
        })
        .expect("question:new")
}

fn reveal_total(events: &[ServerEvent]) -> Option<u32> {
    events.iter().find_map(|event| match event {
        ServerEvent::Reveal(reveal) => Some(reveal.per_option_counts.iter().sum()),
        _ => None,
    })
}

#[tokio::test(start_paused = true)]
async fn both_players_answering_reveals_immediately() {
    let mut room = lobby(2).await;
    room.host
        .send(
            &room.state,
            "game:seedTracks",
            json!({"code": room.code, "tracks": tracks(3)}),
        )
        .await
        .unwrap();
    room.host
        .send(&room.state, "game:startGame", json!({"code": room.code}))
        .await
        .unwrap();

    let (question_id, duration_ms) = first_question(&room.players[0].events());
    assert_eq!(duration_ms, 20_000);
    room.players[1].events();

    for (index, player) in room.players.iter().enumerate() {
        let ack = player
            .send(
                &room.state,
                "answer:submit",
                json!({"code": room.code, "questionId": question_id, "answerIndex": index}),
            )
            .await
            .unwrap();
        assert!(ack.ok);
    }

    let events = room.players[1].events();
    assert_eq!(reveal_total(&events), Some(2));
}

#[tokio::test(start_paused = true)]
async fn deadline_reveals_partial_answers() {
    let mut room = lobby(2).await;
    room.host
        .send(
            &room.state,
            "game:startGame",
            json!({"code": room.code, "lstTracks": tracks(3)}),
        )
        .await
        .unwrap();
    let (question_id, _) = first_question(&room.players[0].events());
    room.players[0]
        .send(
            &room.state,
            "answer:submit",
            json!({"code": room.code, "questionId": question_id, "answerIndex": 0}),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(19_900)).await;
    assert_eq!(reveal_total(&room.players[1].events()), None);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(reveal_total(&room.players[1].events()), Some(1));

    let err = room.players[1]
        .send(
            &room.state,
            "answer:submit",
            json!({"code": room.code, "questionId": question_id, "answerIndex": 0}),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::StaleSubmission);
}

#[tokio::test(start_paused = true)]
async fn three_questions_then_game_end() {
    let mut room = lobby(1).await;
    room.host
        .send(
            &room.state,
            "game:updateConfig",
            json!({"code": room.code, "maxQuestions": 3}),
        )
        .await
        .unwrap();
    room.host
        .send(
            &room.state,
            "game:startGame",
            json!({"code": room.code, "lstTracks": tracks(5)}),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(3 * 30 + 1)).await;
    let events = room.players[0].events();
    let results = events
        .iter()
        .filter(|event| matches!(event, ServerEvent::Result(_)))
        .count();
    assert_eq!(results, 3);
    assert!(matches!(events.last(), Some(ServerEvent::GameEnd(_))));

    let summary = mixmatch_back::services::stats_service::summary(&room.state, 10)
        .await
        .unwrap();
    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.results[0].player, "p0");
    assert_eq!(summary.results[0].questions, 3);
}

#[tokio::test(start_paused = true)]
async fn config_update_rejected_mid_question() {
    let room = lobby(1).await;
    room.host
        .send(
            &room.state,
            "game:startGame",
            json!({"code": room.code, "lstTracks": tracks(2)}),
        )
        .await
        .unwrap();
    let err = room
        .host
        .send(
            &room.state,
            "game:updateConfig",
            json!({"code": room.code, "maxQuestions": 2}),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);
}

#[tokio::test(start_paused = true)]
async fn late_joiner_is_locked_out_but_dropped_player_reclaims_seat() {
    let room = lobby(2).await;
    room.host
        .send(
            &room.state,
            "game:startGame",
            json!({"code": room.code, "lstTracks": tracks(2)}),
        )
        .await
        .unwrap();

    let stranger = Client::new();
    let err = stranger
        .send(&room.state, "player:joinRoom", json!({"code": room.code, "name": "late"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::RoomLocked);

    room_service::disconnect(&room.state, room.players[0].id).await;
    let mut returning = Client::new();
    returning
        .send(&room.state, "player:joinRoom", json!({"code": room.code, "name": "P0"}))
        .await
        .unwrap();
    let events = returning.events();
    assert!(matches!(events.first(), Some(ServerEvent::RoomUpdate(_))));
    assert!(events.iter().any(|event| matches!(event, ServerEvent::QuestionNew(_))));
}
