use crate::game::{GameState, PlayerSlot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMessage {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl GameMessage {
    pub fn new(type_: &str, data: serde_json::Value) -> Self {
        GameMessage {
            type_: type_.to_string(),
            data,
        }
    }

    pub fn notification(message: impl Into<String>) -> Self {
        Self::new(
            "notification",
            serde_json::json!({ "message": message.into() }),
        )
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            "error",
            serde_json::json!({ "code": code, "message": message.into() }),
        )
    }

    /// 完整快照，附带校验中标记和下一个首字母
    ///
    /// 快照无法序列化时改发 `InternalError`。
    pub fn state_update(state: &GameState, validating: bool) -> Self {
        let mut data = match serde_json::to_value(state) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("序列化游戏状态失败: {}", e);
                return Self::error(ErrorCode::InternalError, "Failed to encode game state");
            }
        };
        if let Some(map) = data.as_object_mut() {
            map.insert("validating".to_string(), validating.into());
            map.insert(
                "required_letter".to_string(),
                state.required_letter().to_uppercase().to_string().into(),
            );
            map.insert(
                "history".to_string(),
                serde_json::Value::Array(
                    state
                        .players
                        .iter()
                        .map(|player| {
                            serde_json::Value::from(
                                player.words.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
                            )
                        })
                        .collect(),
                ),
            );
        }
        Self::new("state_update", data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidMessage,
    NotYourTurn,
    NameLocked,
    InternalError,
}

/// 前端发来的操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientIntent {
    SubmitWord { player: PlayerSlot, word: String },
    UpdateName { player: PlayerSlot, name: String },
    SkipCountdown,
    ResetGame,
}

fn player_field(data: &serde_json::Value) -> crate::Result<PlayerSlot> {
    let id = data["player"]
        .as_u64()
        .ok_or_else(|| crate::Error::Message("无效的玩家编号".to_string()))?;
    u8::try_from(id)
        .map_err(|_| crate::Error::Message(format!("无效的玩家编号: {}", id)))
        .and_then(|id| PlayerSlot::try_from(id).map_err(crate::Error::Message))
}

fn text_field<'a>(data: &'a serde_json::Value, key: &str) -> crate::Result<&'a str> {
    data[key]
        .as_str()
        .ok_or_else(|| crate::Error::Message(format!("缺少字段 {}", key)))
}

impl TryFrom<GameMessage> for ClientIntent {
    type Error = crate::Error;

    fn try_from(message: GameMessage) -> crate::Result<Self> {
        let data = &message.data;
        match message.type_.as_str() {
            "submit_word" => Ok(ClientIntent::SubmitWord {
                player: player_field(data)?,
                word: text_field(data, "word")?.to_string(),
            }),
            "update_name" => Ok(ClientIntent::UpdateName {
                player: player_field(data)?,
                name: text_field(data, "name")?.to_string(),
            }),
            "skip_countdown" => Ok(ClientIntent::SkipCountdown),
            "reset_game" => Ok(ClientIntent::ResetGame),
            other => Err(crate::Error::Message(format!("未知的消息类型: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    fn parse(text: &str) -> crate::Result<ClientIntent> {
        let message: GameMessage = serde_json::from_str(text).unwrap();
        ClientIntent::try_from(message)
    }

    #[test]
    fn parses_submit_and_rename() {
        assert_eq!(
            parse(r#"{"type":"submit_word","data":{"player":2,"word":"eagle"}}"#).unwrap(),
            ClientIntent::SubmitWord {
                player: PlayerSlot::Two,
                word: "eagle".to_string()
            }
        );
        assert_eq!(
            parse(r#"{"type":"update_name","data":{"player":1,"name":"Ann"}}"#).unwrap(),
            ClientIntent::UpdateName {
                player: PlayerSlot::One,
                name: "Ann".to_string()
            }
        );
        assert_eq!(
            parse(r#"{"type":"reset_game","data":null}"#).unwrap(),
            ClientIntent::ResetGame
        );
    }

    #[test]
    fn rejects_bad_player_and_unknown_type() {
        assert!(parse(r#"{"type":"submit_word","data":{"player":3,"word":"eagle"}}"#).is_err());
        assert!(parse(r#"{"type":"submit_word","data":{"player":1}}"#).is_err());
        assert!(parse(r#"{"type":"vote","data":{}}"#).is_err());
    }

    #[test]
    fn state_update_includes_derived_fields() {
        let settings = GameConfig::default();
        let state = GameState::with_starting_letter(&settings, 'q');
        let (state, _) = state.begin_play(&settings).0.time_out(&settings);

        let message = GameMessage::state_update(&state, true);
        assert_eq!(message.type_, "state_update");
        assert_eq!(message.data["validating"], true);
        assert_eq!(message.data["required_letter"], "Q");
        assert_eq!(message.data["status"], "playing");
        assert_eq!(message.data["current_player_index"], 1);
        assert_eq!(message.data["history"][0][0], "PASS #1");
    }

    #[test]
    fn error_message_uses_code_name() {
        let message = GameMessage::error(ErrorCode::NotYourTurn, "It's Player 1's turn!");
        assert_eq!(message.data["code"], "NotYourTurn");
    }
}
