use tracing::{debug, info};

use crate::{
    dto::{
        validation::normalize_room_code,
        ws::{Ack, ClientCommand, JoinRoomRequest, into_tracks, tracks_from},
    },
    error::ServiceError,
    state::{
        CommandReply, EventSender, RoomCommand, SharedState,
        Role,
        game::ConnectionId,
    },
};

/// Route a decoded client command to its room and build the acknowledgement.
///
/// Failures are returned to the caller only; they never reach other members.
pub async fn dispatch(
    state: &SharedState,
    connection: ConnectionId,
    events: &EventSender,
    command: ClientCommand,
) -> Result<Ack, ServiceError> {
    match command {
        ClientCommand::CreateRoom => create_room(state, connection, events).await,
        ClientCommand::JoinRoom(request) => join_room(state, connection, events, request).await,
        command => {
            let code = normalize_room_code(command.room_code().unwrap_or_default());
            let room = state.registry().get_room(&code)?;
            let membership = state
                .membership(&connection)
                .filter(|membership| membership.code == code)
                .ok_or_else(|| ServiceError::Forbidden(format!("not a member of room {code}")))?;

            let room_command = room_command(command)?;
            if matches!(room_command, RoomCommand::SubmitAnswer { .. })
                && membership.role != Role::Player
            {
                return Err(ServiceError::Forbidden("only players can answer".into()));
            }
            let ends_membership = matches!(room_command, RoomCommand::Leave | RoomCommand::Close);

            let reply = room.request(connection, room_command, None).await?;
            if ends_membership {
                state.clear_membership(&connection);
            }
            Ok(ack_for(reply))
        }
    }
}

/// Detach `connection` from whatever room it belongs to.
pub async fn disconnect(state: &SharedState, connection: ConnectionId) {
    let Some(membership) = state.clear_membership(&connection) else {
        return;
    };
    match state.registry().get_room(&membership.code) {
        Ok(room) => room.disconnect(connection).await,
        Err(_) => debug!(%connection, room = %membership.code, "room already gone on disconnect"),
    }
}

async fn create_room(
    state: &SharedState,
    connection: ConnectionId,
    events: &EventSender,
) -> Result<Ack, ServiceError> {
    disconnect(state, connection).await;
    let room = state.registry().create_room(connection, events.clone())?;
    let code = room.code().to_string();
    state.set_membership(connection, code.clone(), Role::Host);
    Ok(Ack {
        code: Some(code),
        ..Ack::ok()
    })
}

async fn join_room(
    state: &SharedState,
    connection: ConnectionId,
    events: &EventSender,
    request: JoinRoomRequest,
) -> Result<Ack, ServiceError> {
    let code = normalize_room_code(&request.code);
    let room = state.registry().get_room(&code)?;
    let previous = state.membership(&connection);
    if let Some(previous) = &previous {
        if previous.code == code && previous.role == Role::Host {
            return Err(ServiceError::Forbidden(
                "the host cannot join its own room as a player".into(),
            ));
        }
    }

    room.request(
        connection,
        RoomCommand::Join { name: request.name },
        Some(events.clone()),
    )
    .await?;

    if let Some(previous) = previous.filter(|previous| previous.code != code) {
        info!(%connection, from = %previous.code, to = %code, "connection switched rooms");
        disconnect(state, connection).await;
    }
    state.set_membership(connection, code, Role::Player);
    Ok(Ack::ok())
}

fn room_command(command: ClientCommand) -> Result<RoomCommand, ServiceError> {
    let command = match command {
        ClientCommand::CloseRoom(_) => RoomCommand::Close,
        ClientCommand::LeaveRoom(_) => RoomCommand::Leave,
        ClientCommand::SeedTracks(request) => RoomCommand::SeedTracks {
            tracks: into_tracks(request.tracks),
            source: request.meta.map(Into::into),
        },
        ClientCommand::StartGame(request) => RoomCommand::StartGame {
            tracks: tracks_from(request.lst_tracks),
        },
        ClientCommand::RequestStart(_) => RoomCommand::RequestStart,
        ClientCommand::Advance(_) => RoomCommand::Advance,
        ClientCommand::Reveal(_) => RoomCommand::Reveal,
        ClientCommand::PlayAgain(request) => RoomCommand::PlayAgain {
            tracks: tracks_from(request.tracks),
            source: request.meta.map(Into::into),
        },
        ClientCommand::ToLobby(_) => RoomCommand::ToLobby,
        ClientCommand::UpdateConfig(request) => RoomCommand::UpdateConfig(request.patch()),
        ClientCommand::SubmitAnswer(request) => {
            let answer = request
                .answer()
                .ok_or_else(|| ServiceError::InvalidInput("an answer is required".into()))?;
            RoomCommand::SubmitAnswer {
                question_id: request.question_id,
                answer,
            }
        }
        ClientCommand::CreateRoom | ClientCommand::JoinRoom(_) => {
            return Err(ServiceError::InvalidInput(
                "command does not target an existing membership".into(),
            ));
        }
    };
    Ok(command)
}

fn ack_for(reply: CommandReply) -> Ack {
    match reply {
        CommandReply::Done | CommandReply::Joined => Ack::ok(),
        CommandReply::Config(config) => Ack {
            config: Some(config),
            ..Ack::ok()
        },
        CommandReply::ReseedRequested => Ack {
            reseed_requested: Some(true),
            ..Ack::ok()
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dto::ws::{OutboundFrame, ServerEvent},
        error::ErrorCode,
        state::AppState,
    };

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

        async fn send(
            &self,
            state: &SharedState,
            event: &str,
            data: serde_json::Value,
        ) -> Result<Ack, ServiceError> {
            let command = ClientCommand::parse(event, data)?;
            dispatch(state, self.id, &self.tx, command).await
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

    async fn hosted_room(state: &SharedState, host: &Client) -> String {
        let ack = host.send(state, "host:createRoom", json!({})).await.unwrap();
        ack.code.unwrap()
    }

    #[tokio::test]
    async fn create_and_join_flow() {
        let state = AppState::new(AppConfig::default());
        let mut host = Client::new();
        let mut player = Client::new();
        let code = hosted_room(&state, &host).await;
        assert_eq!(code.len(), 4);
        assert_eq!(state.membership(&host.id).unwrap().role, Role::Host);

        let ack = player
            .send(
                &state,
                "player:joinRoom",
                json!({"code": code.to_lowercase(), "name": "Ana"}),
            )
            .await
            .unwrap();
        assert!(ack.ok);
        assert_eq!(state.membership(&player.id).unwrap().role, Role::Player);

        tokio::task::yield_now().await;
        let host_updates = host
            .events()
            .into_iter()
            .filter(|event| matches!(event, ServerEvent::RoomUpdate(_)))
            .count();
        assert_eq!(host_updates, 2);
        assert!(
            player
                .events()
                .iter()
                .any(|event| matches!(event, ServerEvent::RoomUpdate(update) if update.players.len() == 1))
        );
    }

    #[tokio::test]
    async fn unknown_room_is_reported_before_membership() {
        let state = AppState::new(AppConfig::default());
        let stranger = Client::new();
        let err = stranger
            .send(&state, "game:advance", json!({"code": "ZZZZ"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoSuchRoom);
    }

    #[tokio::test]
    async fn non_members_are_forbidden() {
        let state = AppState::new(AppConfig::default());
        let host = Client::new();
        let stranger = Client::new();
        let code = hosted_room(&state, &host).await;
        let err = stranger
            .send(&state, "game:toLobby", json!({"code": code}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn host_cannot_submit_answers() {
        let state = AppState::new(AppConfig::default());
        let host = Client::new();
        let code = hosted_room(&state, &host).await;
        let err = host
            .send(
                &state,
                "answer:submit",
                json!({"code": code, "questionId": 1, "answerIndex": 0}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);

        let err = host
            .send(&state, "player:joinRoom", json!({"code": code, "name": "me"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn update_config_acks_with_new_config() {
        let state = AppState::new(AppConfig::default());
        let host = Client::new();
        let code = hosted_room(&state, &host).await;
        let ack = host
            .send(
                &state,
                "game:updateConfig",
                json!({"code": code, "maxQuestions": 3, "selectedPlaylistIDs": ["p1"]}),
            )
            .await
            .unwrap();
        let config = ack.config.unwrap();
        assert_eq!(config.max_questions, 3);
        assert_eq!(config.selected_playlist_ids, vec!["p1".to_string()]);

        let err = host
            .send(
                &state,
                "game:updateConfig",
                json!({"code": code, "maxQuestions": 51}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn leave_and_close_end_membership() {
        let state = AppState::new(AppConfig::default());
        let host = Client::new();
        let player = Client::new();
        let code = hosted_room(&state, &host).await;
        player
            .send(&state, "player:joinRoom", json!({"code": code, "name": "Ana"}))
            .await
            .unwrap();

        player
            .send(&state, "player:leaveRoom", json!({"code": code}))
            .await
            .unwrap();
        assert!(state.membership(&player.id).is_none());

        host.send(&state, "host:closeRoom", json!({"code": code}))
            .await
            .unwrap();
        assert!(state.membership(&host.id).is_none());
        tokio::task::yield_now().await;
        let err = player
            .send(&state, "player:joinRoom", json!({"code": code, "name": "Ana"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoSuchRoom);
    }

    #[tokio::test]
    async fn closing_a_room_releases_every_member() {
        let state = AppState::new(AppConfig::default());
        let host = Client::new();
        let code = hosted_room(&state, &host).await;
        let players = [Client::new(), Client::new()];
        for (i, player) in players.iter().enumerate() {
            player
                .send(&state, "player:joinRoom", json!({"code": code, "name": format!("p{i}")}))
                .await
                .unwrap();
        }
        assert_eq!(state.connection_count(), 3);

        host.send(&state, "host:closeRoom", json!({"code": code}))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert_eq!(state.connection_count(), 0);
        assert!(players.iter().all(|player| state.membership(&player.id).is_none()));
    }

    #[tokio::test]
    async fn creating_a_second_room_leaves_the_first() {
        let state = AppState::new(AppConfig::default());
        let host = Client::new();
        let first = hosted_room(&state, &host).await;
        let second = hosted_room(&state, &host).await;
        assert_ne!(first, second);
        assert_eq!(state.membership(&host.id).unwrap().code, second);
        assert_eq!(state.registry().len(), 2);
    }
}
