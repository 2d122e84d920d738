use crate::{
    Result,
    config::{Config, CorsConfig, GameConfig},
    dictionary::{self, Dictionary},
    engine::GameEngine,
    message::{ClientIntent, ErrorCode, GameMessage},
    validation::SubmitOutcome,
};
use axum::{
    Router,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::{Html, Json},
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::{fs, path::Path, sync::Arc};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 同屏对战服务器
///
/// 每个 WebSocket 连接拥有一局独立的游戏，两名玩家共用同一个连接轮流输入。
pub struct ShiritoriServer {
    sessions: Arc<DashMap<Uuid, GameEngine>>,
    dictionary: Arc<dyn Dictionary>,
    settings: GameConfig,
    error_display_ms: u64,
}

impl ShiritoriServer {
    pub fn new(settings: GameConfig, dictionary: Arc<dyn Dictionary>, error_display_ms: u64) -> Self {
        ShiritoriServer {
            sessions: Arc::new(DashMap::new()),
            dictionary,
            settings,
            error_display_ms,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let dictionary = dictionary::from_config(&config.dictionary)?;
        Ok(Self::new(
            config.game.clone(),
            dictionary,
            config.ui.error_display_ms,
        ))
    }

    /// 构建路由（不含 CORS）
    pub fn router(&self) -> Router {
        let sessions = self.sessions.clone();
        let dictionary = self.dictionary.clone();
        let settings = self.settings.clone();
        let error_display_ms = self.error_display_ms;

        Router::new()
            .route("/", get(serve_index))
            .route("/index.html", get(serve_index))
            .route("/health", get(|| async { Json(serde_json::json!({ "status": "ok" })) }))
            .route(
                "/sessions/status",
                get({
                    let sessions = sessions.clone();
                    move || async move { handle_sessions_status(sessions.clone()).await }
                }),
            )
            .route(
                "/ws",
                get(move |ws: WebSocketUpgrade| async move {
                    ws.on_upgrade(move |socket| async move {
                        debug!("WebSocket连接已升级，开始处理连接");
                        let engine = GameEngine::new(settings, dictionary);
                        handle_connection(socket, engine, sessions, error_display_ms).await;
                        debug!("WebSocket连接处理完成");
                    })
                }),
            )
    }

    /// 启动服务器
    pub async fn start(&self, addr: &str) -> Result<()> {
        let app = self.router().layer(cors_layer(&Config::get().cors));

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("绑定地址失败: {} - {}", addr, e);
            crate::Error::Network(anyhow::anyhow!(e))
        })?;

        axum::serve(listener, app).await.map_err(|e| {
            error!("服务器运行错误: {}", e);
            crate::Error::Network(anyhow::anyhow!(e))
        })?;
        Ok(())
    }
}

/// 根据配置文件设置CORS
fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let allow_any = || {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_credentials(false)
    };

    if cors.allow_all_origins.unwrap_or(true) {
        debug!("CORS配置: 允许所有来源");
        return allow_any();
    }

    match &cors.allowed_origins {
        Some(allowed_origins) if !allowed_origins.is_empty() => {
            let origins = allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<axum::http::HeaderValue>().ok())
                .collect::<Vec<_>>();

            debug!("CORS允许的来源: {:?}", origins);
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
                .allow_credentials(true)
        }
        _ => {
            debug!("CORS配置: 没有设置允许的来源，默认允许所有来源");
            allow_any()
        }
    }
}

/// 提供index.html文件
async fn serve_index() -> Html<String> {
    let index_path = Path::new("index.html");
    match fs::read_to_string(index_path) {
        Ok(content) => Html(content),
        Err(e) => {
            error!("读取index.html失败: {}", e);
            Html("<h1>404 Not Found</h1><p>找不到index.html文件</p>".to_string())
        }
    }
}

async fn handle_sessions_status(
    sessions: Arc<DashMap<Uuid, GameEngine>>,
) -> Json<serde_json::Value> {
    // 先取出引擎，避免持有 DashMap 的引用跨越 await
    let engines: Vec<(Uuid, GameEngine)> = sessions
        .iter()
        .map(|entry| (*entry.key(), entry.value().clone()))
        .collect();

    let mut statuses = Vec::with_capacity(engines.len());
    for (session_id, engine) in engines {
        let state = engine.snapshot().await;
        statuses.push(serde_json::json!({
            "session_id": session_id,
            "status": state.status,
            "turn": state.turn,
            "points": [state.players[0].points, state.players[1].points],
            "validating": engine.is_validating(),
        }));
    }

    Json(serde_json::json!({
        "success": true,
        "total_sessions": statuses.len(),
        "sessions": statuses,
    }))
}

async fn handle_connection(
    socket: WebSocket,
    engine: GameEngine,
    sessions: Arc<DashMap<Uuid, GameEngine>>,
    error_display_ms: u64,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let session_id = Uuid::new_v4();

    let (listener_id, mut broadcasts) = engine.subscribe();
    // 提交结果和错误只回给本连接，与广播共用一个发送任务
    let (reply_tx, mut replies) = mpsc::channel::<GameMessage>(32);

    sessions.insert(session_id, engine.clone());
    info!("新对局 {} 已建立，当前共 {} 局", session_id, sessions.len());
    engine.start().await;

    let send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                Some(message) = broadcasts.recv() => message,
                Some(message) = replies.recv() => message,
                else => break,
            };

            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("序列化消息失败: {}", e);
                    continue;
                }
            };

            if let Err(e) = ws_sender.send(Message::Text(text)).await {
                debug!("发送消息失败，连接可能已关闭: {}", e);
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                handle_client_message(&engine, &text, &reply_tx, error_display_ms).await;
            }
            Ok(Message::Close(_)) => {
                debug!("对局 {} 的连接已关闭", session_id);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket接收错误: {}", e);
                break;
            }
        }
    }

    engine.unsubscribe(&listener_id);
    engine.shutdown();
    sessions.remove(&session_id);
    send_task.abort();
    info!("对局 {} 已结束，剩余 {} 局", session_id, sessions.len());
}

async fn reply(reply_tx: &mpsc::Sender<GameMessage>, message: GameMessage) {
    if reply_tx.send(message).await.is_err() {
        debug!("回复通道已关闭");
    }
}

fn submit_result(outcome: &SubmitOutcome, clear_after_ms: u64) -> GameMessage {
    GameMessage::new(
        "submit_result",
        serde_json::json!({
            "success": outcome.success,
            "reason": outcome.reason,
            "clear_after_ms": (!outcome.success).then_some(clear_after_ms),
        }),
    )
}

async fn handle_client_message(
    engine: &GameEngine,
    text: &str,
    reply_tx: &mpsc::Sender<GameMessage>,
    clear_after_ms: u64,
) {
    let intent = serde_json::from_str::<GameMessage>(text)
        .map_err(|e| crate::Error::Message(e.to_string()))
        .and_then(ClientIntent::try_from);

    let intent = match intent {
        Ok(intent) => intent,
        Err(e) => {
            warn!("无法解析客户端消息: {}", e);
            reply(reply_tx, GameMessage::error(ErrorCode::InvalidMessage, e.to_string())).await;
            return;
        }
    };

    match intent {
        ClientIntent::SubmitWord { player, word } => {
            if word.trim().is_empty() {
                return;
            }

            let state = engine.snapshot().await;
            if state.current_slot() != player {
                reply(
                    reply_tx,
                    GameMessage::error(
                        ErrorCode::NotYourTurn,
                        format!("It's {}'s turn!", state.current_player().name),
                    ),
                )
                .await;
                return;
            }

            // 词典查询可能较慢，放到后台，期间仍可处理其它消息
            let engine = engine.clone();
            let reply_tx = reply_tx.clone();
            tokio::spawn(async move {
                let outcome = engine.submit_word(&word).await;
                reply(&reply_tx, submit_result(&outcome, clear_after_ms)).await;
            });
        }
        ClientIntent::UpdateName { player, name } => {
            if !engine.snapshot().await.status.is_pre_start() {
                reply(
                    reply_tx,
                    GameMessage::error(
                        ErrorCode::NameLocked,
                        "Names can only be changed before the game starts",
                    ),
                )
                .await;
                return;
            }
            engine.update_player_name(player, &name).await;
        }
        ClientIntent::SkipCountdown => engine.skip_countdown().await,
        ClientIntent::ResetGame => engine.reset_game().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::WordListDictionary;
    use crate::game::{GameStatus, PlayerSlot};
    use std::time::Duration;

    fn engine() -> GameEngine {
        let dictionary = WordListDictionary::from_words(["blue", "eagle", "bird"]);
        let state = crate::game::GameState::with_starting_letter(&GameConfig::default(), 'b');
        GameEngine::with_state(GameConfig::default(), Arc::new(dictionary), state)
    }

    async fn next_reply(replies: &mut mpsc::Receiver<GameMessage>) -> GameMessage {
        tokio::time::timeout(Duration::from_secs(5), replies.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_turn_submission_is_rejected_locally() {
        let engine = engine();
        engine.skip_countdown().await;
        let (reply_tx, mut replies) = mpsc::channel(8);

        handle_client_message(
            &engine,
            r#"{"type":"submit_word","data":{"player":2,"word":"blue"}}"#,
            &reply_tx,
            3000,
        )
        .await;

        let message = next_reply(&mut replies).await;
        assert_eq!(message.type_, "error");
        assert_eq!(message.data["code"], "NotYourTurn");
        assert_eq!(message.data["message"], "It's Player 1's turn!");
        assert!(engine.snapshot().await.players[1].words.is_empty());
        engine.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn submission_result_is_sent_back() {
        let engine = engine();
        engine.skip_countdown().await;
        let (reply_tx, mut replies) = mpsc::channel(8);

        handle_client_message(
            &engine,
            r#"{"type":"submit_word","data":{"player":1,"word":"apple"}}"#,
            &reply_tx,
            3000,
        )
        .await;
        let message = next_reply(&mut replies).await;
        assert_eq!(message.type_, "submit_result");
        assert_eq!(message.data["success"], false);
        assert_eq!(message.data["reason"], "Word must start with \"B\"");
        assert_eq!(message.data["clear_after_ms"], 3000);

        handle_client_message(
            &engine,
            r#"{"type":"submit_word","data":{"player":1,"word":"Blue"}}"#,
            &reply_tx,
            3000,
        )
        .await;
        let message = next_reply(&mut replies).await;
        assert_eq!(message.data["success"], true);
        assert!(message.data["clear_after_ms"].is_null());
        assert_eq!(engine.snapshot().await.last_word, "blue");
        engine.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn blank_words_are_ignored() {
        let engine = engine();
        engine.skip_countdown().await;
        let (reply_tx, mut replies) = mpsc::channel(8);

        handle_client_message(
            &engine,
            r#"{"type":"submit_word","data":{"player":1,"word":"   "}}"#,
            &reply_tx,
            3000,
        )
        .await;
        tokio::task::yield_now().await;
        assert!(replies.try_recv().is_err());
        engine.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn renames_are_locked_after_start() {
        let engine = engine();
        let (reply_tx, mut replies) = mpsc::channel(8);

        handle_client_message(
            &engine,
            r#"{"type":"update_name","data":{"player":2,"name":"Bea"}}"#,
            &reply_tx,
            3000,
        )
        .await;
        assert_eq!(engine.snapshot().await.player(PlayerSlot::Two).name, "Bea");

        engine.skip_countdown().await;
        assert_eq!(engine.snapshot().await.status, GameStatus::Playing);

        handle_client_message(
            &engine,
            r#"{"type":"update_name","data":{"player":2,"name":"Cy"}}"#,
            &reply_tx,
            3000,
        )
        .await;
        let message = next_reply(&mut replies).await;
        assert_eq!(message.data["code"], "NameLocked");
        assert_eq!(engine.snapshot().await.player(PlayerSlot::Two).name, "Bea");
        engine.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_messages_get_an_error() {
        let engine = engine();
        let (reply_tx, mut replies) = mpsc::channel(8);

        handle_client_message(&engine, "not json", &reply_tx, 3000).await;
        let message = next_reply(&mut replies).await;
        assert_eq!(message.data["code"], "InvalidMessage");

        handle_client_message(&engine, r#"{"type":"vote","data":{}}"#, &reply_tx, 3000).await;
        let message = next_reply(&mut replies).await;
        assert_eq!(message.data["code"], "InvalidMessage");
    }

    #[tokio::test(start_paused = true)]
    async fn status_lists_every_session() {
        let sessions = Arc::new(DashMap::new());
        let engine = engine();
        engine.skip_countdown().await;
        sessions.insert(Uuid::new_v4(), engine.clone());

        let Json(body) = handle_sessions_status(sessions).await;
        assert_eq!(body["total_sessions"], 1);
        assert_eq!(body["sessions"][0]["status"], "playing");
        assert_eq!(body["sessions"][0]["points"][0], 100);
        engine.shutdown();
    }

    #[test]
    fn cors_layer_accepts_every_configuration() {
        let _ = cors_layer(&CorsConfig::default());
        let _ = cors_layer(&CorsConfig {
            allow_all_origins: Some(false),
            allowed_origins: Some(vec!["http://localhost:3000".to_string()]),
        });
        let _ = cors_layer(&CorsConfig {
            allow_all_origins: Some(false),
            allowed_origins: Some(Vec::new()),
        });
    }
}
