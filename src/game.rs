use crate::config::GameConfig;
use chrono::{DateTime, Utc};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 玩家座位，固定两个
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PlayerSlot {
    One,
    Two,
}

impl PlayerSlot {
    pub fn index(self) -> usize {
        match self {
            PlayerSlot::One => 0,
            PlayerSlot::Two => 1,
        }
    }

    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            PlayerSlot::One
        } else {
            PlayerSlot::Two
        }
    }

    pub fn other(self) -> Self {
        match self {
            PlayerSlot::One => PlayerSlot::Two,
            PlayerSlot::Two => PlayerSlot::One,
        }
    }
}

impl From<PlayerSlot> for u8 {
    fn from(slot: PlayerSlot) -> Self {
        match slot {
            PlayerSlot::One => 1,
            PlayerSlot::Two => 2,
        }
    }
}

impl TryFrom<u8> for PlayerSlot {
    type Error = String;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(PlayerSlot::One),
            2 => Ok(PlayerSlot::Two),
            _ => Err(format!("无效的玩家编号: {}", id)),
        }
    }
}

impl fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// 玩家历史记录中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEntry {
    /// 已接受的单词（小写、去空白）
    Word(String),
    /// 超时记录，携带第几次超时
    Pass(u32),
}

impl HistoryEntry {
    pub fn as_word(&self) -> Option<&str> {
        match self {
            HistoryEntry::Word(word) => Some(word),
            HistoryEntry::Pass(_) => None,
        }
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryEntry::Word(word) => write!(f, "{}", word),
            HistoryEntry::Pass(count) => write!(f, "PASS #{}", count),
        }
    }
}

/// 玩家信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub slot: PlayerSlot,
    pub name: String,
    pub points: u32,
    pub words: Vec<HistoryEntry>,
    pub pass_count: u32,
}

impl Player {
    fn new(slot: PlayerSlot, points: u32) -> Self {
        Player {
            slot,
            name: format!("Player {}", slot),
            points,
            words: Vec::new(),
            pass_count: 0,
        }
    }

    /// 已接受的单词，不含超时记录
    pub fn accepted_words(&self) -> impl Iterator<Item = &str> {
        self.words.iter().filter_map(HistoryEntry::as_word)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// 开局前展示起始字母的倒计时
    Countdown,
    /// 保留的空闲状态，当前流程不会进入
    Waiting,
    Playing,
    Ended,
}

impl GameStatus {
    /// 是否还未正式开局，此时允许改名
    pub fn is_pre_start(self) -> bool {
        matches!(self, GameStatus::Countdown | GameStatus::Waiting)
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::Countdown => write!(f, "countdown"),
            GameStatus::Waiting => write!(f, "waiting"),
            GameStatus::Playing => write!(f, "playing"),
            GameStatus::Ended => write!(f, "ended"),
        }
    }
}

/// 游戏状态快照
///
/// 所有转换都返回新的快照，调用方整体替换旧值。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// 每局唯一，重置后改变
    pub game_id: Uuid,
    pub players: [Player; 2],
    pub current_player_index: usize,
    pub status: GameStatus,
    pub time_left: u32,
    pub turn_start_time: DateTime<Utc>,
    pub last_word: String,
    pub winner: Option<PlayerSlot>,
    pub starting_letter: char,
    pub countdown_time: u32,
    /// 已结束的回合数，用于识别过期的提交
    pub turn: u32,
}

/// 游戏事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    CountdownTick(u32),
    GameStarted(PlayerSlot),
    TurnTick(u32),
    WordAccepted {
        slot: PlayerSlot,
        word: String,
        points: u32,
    },
    TurnTimedOut {
        slot: PlayerSlot,
        pass_count: u32,
        points: u32,
    },
    GameOver(PlayerSlot),
    PlayerRenamed(PlayerSlot, String),
    GameReset,
}

/// 随机抽取起始字母，A-Z 均匀分布
pub fn random_letter() -> char {
    let mut rng = rand::rng();
    (b'A' + rng.random_range(0..26u8)) as char
}

impl GameState {
    /// 创建新的游戏状态
    pub fn new(settings: &GameConfig) -> Self {
        Self::with_starting_letter(settings, random_letter())
    }

    pub fn with_starting_letter(settings: &GameConfig, letter: char) -> Self {
        GameState {
            game_id: Uuid::new_v4(),
            players: [
                Player::new(PlayerSlot::One, settings.starting_points),
                Player::new(PlayerSlot::Two, settings.starting_points),
            ],
            current_player_index: 0,
            status: GameStatus::Countdown,
            time_left: settings.turn_duration,
            turn_start_time: Utc::now(),
            last_word: String::new(),
            winner: None,
            starting_letter: letter.to_ascii_uppercase(),
            countdown_time: settings.countdown_duration,
            turn: 0,
        }
    }

    pub fn current_slot(&self) -> PlayerSlot {
        PlayerSlot::from_index(self.current_player_index)
    }

    pub fn current_player(&self) -> &Player {
        &self.players[self.current_player_index]
    }

    pub fn player(&self, slot: PlayerSlot) -> &Player {
        &self.players[slot.index()]
    }

    pub fn winner_player(&self) -> Option<&Player> {
        self.winner.map(|slot| self.player(slot))
    }

    /// 两名玩家所有已接受的单词
    pub fn used_words(&self) -> impl Iterator<Item = &str> {
        self.players.iter().flat_map(|player| player.accepted_words())
    }

    /// 下一个单词需要的首字母（小写）
    pub fn required_letter(&self) -> char {
        self.last_word
            .chars()
            .last()
            .unwrap_or(self.starting_letter)
            .to_lowercase()
            .next()
            .unwrap_or(self.starting_letter)
    }

    /// 倒计时走一秒，归零时开局
    pub fn tick_countdown(&self, settings: &GameConfig) -> (GameState, GameEvent) {
        if self.countdown_time <= 1 {
            return self.begin_play(settings);
        }
        let mut next = self.clone();
        next.countdown_time -= 1;
        let event = GameEvent::CountdownTick(next.countdown_time);
        (next, event)
    }

    /// 开局：进入 playing 并重置回合计时
    pub fn begin_play(&self, settings: &GameConfig) -> (GameState, GameEvent) {
        let mut next = self.clone();
        next.status = GameStatus::Playing;
        next.countdown_time = 0;
        next.time_left = settings.turn_duration;
        next.turn_start_time = Utc::now();
        (next, GameEvent::GameStarted(self.current_slot()))
    }

    /// 回合计时走一秒，不足一秒时按超时处理
    pub fn tick_turn(&self, settings: &GameConfig) -> (GameState, GameEvent) {
        if self.time_left <= 1 {
            return self.time_out(settings);
        }
        let mut next = self.clone();
        next.time_left -= 1;
        let event = GameEvent::TurnTick(next.time_left);
        (next, event)
    }

    /// 当前玩家超时：扣除整回合分数并记一次 pass
    pub fn time_out(&self, settings: &GameConfig) -> (GameState, GameEvent) {
        let slot = self.current_slot();
        let mut next = self.clone();

        let player = &mut next.players[slot.index()];
        player.pass_count += 1;
        player.points = player.points.saturating_sub(settings.turn_duration);
        player.words.push(HistoryEntry::Pass(player.pass_count));
        let (pass_count, points) = (player.pass_count, player.points);

        if points == 0 {
            return next.finish(slot);
        }

        next.pass_turn(settings);
        (
            next,
            GameEvent::TurnTimedOut {
                slot,
                pass_count,
                points,
            },
        )
    }

    /// 接受当前玩家的单词
    ///
    /// `time_left` 是提交时剩余的秒数，扣分为本回合已用时间。
    pub fn accept_word(
        &self,
        word: &str,
        time_left: u32,
        settings: &GameConfig,
    ) -> (GameState, GameEvent) {
        let slot = self.current_slot();
        let elapsed = settings.turn_duration.saturating_sub(time_left);
        let mut next = self.clone();

        let player = &mut next.players[slot.index()];
        player.points = player.points.saturating_sub(elapsed);
        player.words.push(HistoryEntry::Word(word.to_string()));
        let points = player.points;
        next.last_word = word.to_string();

        if points == 0 {
            return next.finish(slot);
        }

        next.status = GameStatus::Playing;
        next.countdown_time = 0;
        next.pass_turn(settings);
        (
            next,
            GameEvent::WordAccepted {
                slot,
                word: word.to_string(),
                points,
            },
        )
    }

    pub fn rename(&self, slot: PlayerSlot, name: &str) -> (GameState, GameEvent) {
        let mut next = self.clone();
        next.players[slot.index()].name = name.to_string();
        (next, GameEvent::PlayerRenamed(slot, name.to_string()))
    }

    fn pass_turn(&mut self, settings: &GameConfig) {
        self.current_player_index = self.current_slot().other().index();
        self.time_left = settings.turn_duration;
        self.turn_start_time = Utc::now();
        self.turn += 1;
    }

    /// `loser` 分数归零，对手获胜
    fn finish(mut self, loser: PlayerSlot) -> (GameState, GameEvent) {
        let winner = loser.other();
        self.status = GameStatus::Ended;
        self.winner = Some(winner);
        self.turn += 1;
        (self, GameEvent::GameOver(winner))
    }
}
