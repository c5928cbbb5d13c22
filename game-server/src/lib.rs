use serde::Deserialize;
use std::sync::Arc;
use warp::Filter;
use warp::http::StatusCode;

use crate::gateway::ActionGateway;
use crate::relay::{RelayRooms, room_updated_message};
use crate::session::RoomSessionManager;
use game_types::{
    ActionRequest, CreateRoomRequest, ErrorBody, GameError, JoinRoomRequest, LeaveReply,
    LeaveRoomRequest, NotifyRequest, RoomReply, StartGameRequest, normalize_room_id,
};

pub mod config;
pub mod gateway;
pub mod outbox;
pub mod relay;
pub mod session;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateQuery {
    client_id: Option<String>,
}

pub fn create_routes(
    session: Arc<RoomSessionManager>,
    gateway: Arc<ActionGateway>,
    relay_rooms: Arc<RelayRooms>,
    relay_token: Option<String>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let session_filter = warp::any().map({
        let session = session.clone();
        move || session.clone()
    });

    let gateway_filter = warp::any().map({
        let gateway = gateway.clone();
        move || gateway.clone()
    });

    let relay_rooms_filter = warp::any().map({
        let relay_rooms = relay_rooms.clone();
        move || relay_rooms.clone()
    });

    let relay_token_filter = warp::any().map({
        let relay_token = relay_token.clone();
        move || relay_token.clone()
    });

    // WebSocket endpoint for room subscriptions and peer hints
    let websocket = warp::path("ws")
        .and(warp::ws())
        .and(relay_rooms_filter.clone())
        .map(|ws: warp::ws::Ws, rooms: Arc<RelayRooms>| {
            ws.on_upgrade(move |socket| relay::handle_connection(socket, rooms))
        });

    // Health check endpoint
    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", StatusCode::OK));

    let create_room = warp::path!("room")
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .and(session_filter.clone())
        .and_then(handle_create_room);

    let room_state = warp::path!("room" / String)
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::query::<StateQuery>())
        .and(gateway_filter.clone())
        .and_then(handle_room_state);

    let join_room = warp::path!("room" / String / "join")
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .and(session_filter.clone())
        .and_then(handle_join_room);

    let leave_room = warp::path!("room" / String / "leave")
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .and(session_filter.clone())
        .and_then(handle_leave_room);

    let start_game = warp::path!("room" / String / "start")
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .and(session_filter.clone())
        .and_then(handle_start_game);

    let game_action = warp::path!("room" / String / "action")
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .and(gateway_filter.clone())
        .and_then(handle_game_action);

    // Relay fan-out endpoint used by split deployments
    let notify = warp::path!("notify")
        .and(warp::post())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::json())
        .and(relay_rooms_filter.clone())
        .and(relay_token_filter.clone())
        .and_then(handle_notify);

    // CORS configuration
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "authorization"])
        .allow_methods(vec!["GET", "POST"]);

    websocket
        .or(health)
        .or(create_room)
        .or(room_state)
        .or(join_room)
        .or(leave_room)
        .or(start_game)
        .or(game_action)
        .or(notify)
        .with(cors)
        .with(warp::log("game_server"))
}

/// Caller identity is a bearer uid; anything else is rejected before the
/// session layer sees the request.
fn authenticate(auth_header: Option<String>) -> Result<String, GameError> {
    let header = auth_header.ok_or(GameError::Unauthorized)?;
    let uid = header
        .strip_prefix("Bearer ")
        .unwrap_or(&header)
        .trim()
        .to_string();
    if uid.is_empty() {
        return Err(GameError::Unauthorized);
    }
    Ok(uid)
}

fn status_for(err: &GameError) -> StatusCode {
    match err {
        GameError::Unauthorized => StatusCode::UNAUTHORIZED,
        GameError::Forbidden => StatusCode::FORBIDDEN,
        GameError::BadRequest(_) => StatusCode::BAD_REQUEST,
        GameError::RoomNotFound => StatusCode::NOT_FOUND,
        GameError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::CONFLICT,
    }
}

fn room_reply(
    result: Result<RoomReply, GameError>,
) -> warp::reply::WithStatus<warp::reply::Json> {
    match result {
        Ok(reply) => warp::reply::with_status(warp::reply::json(&reply), StatusCode::OK),
        Err(err) => {
            warp::reply::with_status(warp::reply::json(&ErrorBody::from(&err)), status_for(&err))
        }
    }
}

fn leave_reply(
    result: Result<LeaveReply, GameError>,
) -> warp::reply::WithStatus<warp::reply::Json> {
    match result {
        Ok(reply) => warp::reply::with_status(warp::reply::json(&reply), StatusCode::OK),
        Err(err) => {
            warp::reply::with_status(warp::reply::json(&ErrorBody::from(&err)), status_for(&err))
        }
    }
}

async fn handle_create_room(
    auth_header: Option<String>,
    body: CreateRoomRequest,
    session: Arc<RoomSessionManager>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = match authenticate(auth_header) {
        Ok(uid) => session.create_room(&uid, body.client_id.as_deref()).await,
        Err(e) => Err(e),
    };
    Ok(room_reply(result))
}

async fn handle_room_state(
    room_id: String,
    auth_header: Option<String>,
    query: StateQuery,
    gateway: Arc<ActionGateway>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = match authenticate(auth_header) {
        Ok(uid) => {
            gateway
                .get_room_state(&room_id, &uid, query.client_id.as_deref())
                .await
        }
        Err(e) => Err(e),
    };
    Ok(room_reply(result))
}

async fn handle_join_room(
    room_id: String,
    auth_header: Option<String>,
    body: JoinRoomRequest,
    session: Arc<RoomSessionManager>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = match authenticate(auth_header) {
        Ok(uid) => {
            session
                .join_room(&room_id, &uid, body.client_id.as_deref(), body.debug)
                .await
        }
        Err(e) => Err(e),
    };
    Ok(room_reply(result))
}

async fn handle_leave_room(
    room_id: String,
    auth_header: Option<String>,
    body: LeaveRoomRequest,
    session: Arc<RoomSessionManager>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = match authenticate(auth_header) {
        Ok(uid) => {
            session
                .leave_room(&room_id, &uid, body.client_id.as_deref(), body.exit)
                .await
        }
        Err(e) => Err(e),
    };
    Ok(leave_reply(result))
}

async fn handle_start_game(
    room_id: String,
    auth_header: Option<String>,
    body: StartGameRequest,
    session: Arc<RoomSessionManager>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = match authenticate(auth_header) {
        Ok(_uid) => session.start_game(&room_id, &body.client_id).await,
        Err(e) => Err(e),
    };
    Ok(room_reply(result))
}

async fn handle_game_action(
    room_id: String,
    auth_header: Option<String>,
    body: ActionRequest,
    gateway: Arc<ActionGateway>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let result = match authenticate(auth_header) {
        Ok(uid) => {
            gateway
                .perform_action(&room_id, &uid, &body.client_id, &body.action, body.debug)
                .await
        }
        Err(e) => Err(e),
    };
    Ok(room_reply(result))
}

async fn handle_notify(
    auth_header: Option<String>,
    mut body: NotifyRequest,
    relay_rooms: Arc<RelayRooms>,
    relay_token: Option<String>,
) -> Result<impl warp::Reply, warp::Rejection> {
    if let Some(expected) = relay_token {
        let bearer = auth_header
            .as_deref()
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string);
        let provided = body.token.clone().or(bearer);
        if provided.as_deref() != Some(expected.as_str()) {
            return Ok(warp::reply::with_status(
                warp::reply::json(&ErrorBody::from(&GameError::Unauthorized)),
                StatusCode::UNAUTHORIZED,
            ));
        }
    }

    body.room_id = normalize_room_id(&body.room_id);
    let delivered = relay_rooms.broadcast(&body.room_id, &room_updated_message(&body));
    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "ok": true,
            "roomId": body.room_id,
            "delivered": delivered,
            "ts": chrono::Utc::now().timestamp_millis(),
        })),
        StatusCode::OK,
    ))
}
