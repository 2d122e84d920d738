use crate::config::GameConfig;
use crate::dictionary::Dictionary;
use crate::game::{GameEvent, GameState, GameStatus, PlayerSlot};
use crate::message::GameMessage;
use crate::validation::{self, Rejection, SubmitOutcome};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

const LISTENER_BUFFER: usize = 64;

/// 两种计时器，由状态决定哪一个在运行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Countdown,
    Turn,
}

impl TimerKind {
    fn governing(status: GameStatus) -> Option<Self> {
        match status {
            GameStatus::Countdown => Some(TimerKind::Countdown),
            GameStatus::Playing => Some(TimerKind::Turn),
            GameStatus::Waiting | GameStatus::Ended => None,
        }
    }

    fn status(self) -> GameStatus {
        match self {
            TimerKind::Countdown => GameStatus::Countdown,
            TimerKind::Turn => GameStatus::Playing,
        }
    }
}

/// 计时器只对创建它的那一局、那一回合生效
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimerKey {
    game_id: Uuid,
    kind: TimerKind,
    turn: u32,
}

impl TimerKey {
    fn for_state(state: &GameState) -> Option<Self> {
        TimerKind::governing(state.status).map(|kind| TimerKey {
            game_id: state.game_id,
            kind,
            turn: state.turn,
        })
    }

    fn matches(&self, state: &GameState) -> bool {
        state.game_id == self.game_id
            && state.status == self.kind.status()
            && state.turn == self.turn
    }
}

struct ActiveTimer {
    key: TimerKey,
    handle: JoinHandle<()>,
}

/// 校验中标记，离开作用域时自动清除
struct ValidatingGuard<'a>(&'a AtomicBool);

impl<'a> ValidatingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ValidatingGuard(flag))
    }
}

impl Drop for ValidatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 游戏引擎，持有唯一的游戏状态并提供全部操作
///
/// 状态只在写锁内整体替换；计时器是引擎自己启动的任务，
/// 每次状态变化后重新安排，并在每一跳时再次核对状态。
#[derive(Clone)]
pub struct GameEngine {
    state: Arc<RwLock<GameState>>,
    settings: Arc<GameConfig>,
    dictionary: Arc<dyn Dictionary>,
    validating: Arc<AtomicBool>,
    /// 关闭后不再启动计时器，也不再接受单词
    closed: Arc<AtomicBool>,
    timer: Arc<Mutex<Option<ActiveTimer>>>,
    listeners: Arc<DashMap<Uuid, mpsc::Sender<GameMessage>>>,
}

impl GameEngine {
    /// 创建新引擎，起始字母随机
    pub fn new(settings: GameConfig, dictionary: Arc<dyn Dictionary>) -> Self {
        let state = GameState::new(&settings);
        Self::with_state(settings, dictionary, state)
    }

    pub fn with_state(
        settings: GameConfig,
        dictionary: Arc<dyn Dictionary>,
        state: GameState,
    ) -> Self {
        GameEngine {
            state: Arc::new(RwLock::new(state)),
            settings: Arc::new(settings),
            dictionary,
            validating: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
            timer: Arc::new(Mutex::new(None)),
            listeners: Arc::new(DashMap::new()),
        }
    }

    /// 启动当前状态对应的计时器
    pub async fn start(&self) {
        let state = self.state.read().await;
        self.schedule_timer(&state);
        self.broadcast(GameMessage::state_update(&state, self.is_validating()));
    }

    /// 停止计时器并断开所有监听者
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(active) = self.lock_timer().take() {
            active.handle.abort();
        }
        self.listeners.clear();
        debug!("游戏引擎已关闭");
    }

    pub async fn snapshot(&self) -> GameState {
        self.state.read().await.clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_validating(&self) -> bool {
        self.validating.load(Ordering::Acquire)
    }

    /// 注册监听者，之后的状态变化都会推送过去
    pub fn subscribe(&self) -> (Uuid, mpsc::Receiver<GameMessage>) {
        let (tx, rx) = mpsc::channel(LISTENER_BUFFER);
        let id = Uuid::new_v4();
        self.listeners.insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: &Uuid) {
        self.listeners.remove(id);
    }

    /// 提交单词
    ///
    /// 同一时间只处理一个提交；本地规则先于词典查询，
    /// 所有拒绝都在修改状态之前完成。
    pub async fn submit_word(&self, word: &str) -> SubmitOutcome {
        if self.is_closed() || self.state.read().await.status == GameStatus::Ended {
            debug!("游戏未在进行，直接拒绝 {:?}", word);
            return SubmitOutcome::from(Err(Rejection::NotActive));
        }

        let result = match ValidatingGuard::acquire(&self.validating) {
            Some(guard) => {
                self.broadcast_state_update().await;
                let result = self.validate_and_apply(word).await;
                drop(guard);
                self.broadcast_state_update().await;
                result
            }
            None => Err(Rejection::NotActive),
        };

        if let Err(rejection) = &result {
            debug!("单词 {:?} 被拒绝: {}", word, rejection);
        }
        SubmitOutcome::from(result)
    }

    async fn validate_and_apply(&self, word: &str) -> Result<(), Rejection> {
        let snapshot = self.snapshot().await;
        if snapshot.status == GameStatus::Ended {
            return Err(Rejection::NotActive);
        }

        let normalized =
            validation::check_structure(&snapshot, word, self.settings.min_word_length)?;

        match self.dictionary.contains(&normalized).await {
            Ok(true) => {}
            Ok(false) => return Err(Rejection::NotInDictionary),
            Err(e) => {
                warn!("词典查询 {} 失败: {}", normalized, e);
                return Err(Rejection::NotInDictionary);
            }
        }

        let mut state = self.state.write().await;
        if self.is_closed() {
            debug!("单词 {} 查询完成时引擎已关闭", normalized);
            return Err(Rejection::NotActive);
        }
        if state.game_id != snapshot.game_id
            || state.turn != snapshot.turn
            || state.status == GameStatus::Ended
        {
            debug!("单词 {} 查询完成时所属回合已结束", normalized);
            return Err(Rejection::NotActive);
        }

        let transition = state.accept_word(&normalized, snapshot.time_left, &self.settings);
        self.commit(&mut state, transition);
        Ok(())
    }

    /// 跳过开局倒计时
    pub async fn skip_countdown(&self) {
        let mut state = self.state.write().await;
        if !state.status.is_pre_start() {
            debug!("当前状态 {} 不能跳过倒计时", state.status);
            return;
        }
        let transition = state.begin_play(&self.settings);
        self.commit(&mut state, transition);
    }

    /// 重新开局，整体替换状态
    pub async fn reset_game(&self) {
        let mut state = self.state.write().await;
        let next = GameState::new(&self.settings);
        self.commit(&mut state, (next, GameEvent::GameReset));
    }

    /// 修改玩家名称，是否允许由调用方决定
    pub async fn update_player_name(&self, slot: PlayerSlot, name: &str) {
        let mut state = self.state.write().await;
        let transition = state.rename(slot, name);
        self.commit(&mut state, transition);
    }

    /// 替换快照，然后重新安排计时器并通知监听者
    fn commit(&self, state: &mut GameState, (next, event): (GameState, GameEvent)) {
        *state = next;
        self.schedule_timer(state);
        self.handle_game_event(state, event);
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<ActiveTimer>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_timer(&self, state: &GameState) {
        let wanted = TimerKey::for_state(state);
        let mut slot = self.lock_timer();
        if self.is_closed() {
            return;
        }

        if let Some(active) = slot.as_ref() {
            if Some(active.key) == wanted {
                return;
            }
        }

        if let Some(active) = slot.take() {
            active.handle.abort();
            debug!("停止计时器 {:?}", active.key.kind);
        }

        if let Some(key) = wanted {
            let handle = tokio::spawn(self.clone().run_timer(key));
            *slot = Some(ActiveTimer { key, handle });
            debug!("启动计时器 {:?}，回合 {}", key.kind, key.turn);
        }
    }

    async fn run_timer(self, key: TimerKey) {
        let period = self.settings.tick_interval();
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let mut state = self.state.write().await;
            if !key.matches(&state) {
                debug!("计时器 {:?} 已失效", key.kind);
                break;
            }

            let transition = match key.kind {
                TimerKind::Countdown => state.tick_countdown(&self.settings),
                TimerKind::Turn => state.tick_turn(&self.settings),
            };
            self.commit(&mut state, transition);
        }
    }

    async fn broadcast_state_update(&self) {
        let state = self.state.read().await;
        self.broadcast(GameMessage::state_update(&state, self.is_validating()));
    }

    /// 推送给所有监听者，队列满时丢弃，已关闭的监听者移除
    fn broadcast(&self, message: GameMessage) {
        let mut closed = Vec::new();
        for entry in self.listeners.iter() {
            match entry.value().try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("监听者 {} 的消息队列已满，丢弃 {}", entry.key(), message.type_);
                }
                Err(TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }
        for id in closed {
            self.listeners.remove(&id);
        }
    }

    /// 处理游戏事件
    fn handle_game_event(&self, state: &GameState, event: GameEvent) {
        match event {
            GameEvent::CountdownTick(_) | GameEvent::TurnTick(_) => {}
            GameEvent::GameStarted(slot) => {
                info!("游戏 {} 开始，起始字母 {}", state.game_id, state.starting_letter);
                self.broadcast(GameMessage::notification(format!(
                    "{} goes first with \"{}\"",
                    state.player(slot).name,
                    state.starting_letter
                )));
            }
            GameEvent::WordAccepted { slot, word, points } => {
                debug!("玩家 {} 提交 {}，剩余 {} 分", slot, word, points);
                self.broadcast(GameMessage::notification(format!(
                    "{} played \"{}\" ({} points left)",
                    state.player(slot).name,
                    word,
                    points
                )));
            }
            GameEvent::TurnTimedOut {
                slot,
                pass_count,
                points,
            } => {
                debug!("玩家 {} 超时，第 {} 次，剩余 {} 分", slot, pass_count, points);
                self.broadcast(GameMessage::notification(format!(
                    "{} ran out of time (pass #{})",
                    state.player(slot).name,
                    pass_count
                )));
            }
            GameEvent::GameOver(winner) => {
                info!("游戏 {} 结束，玩家 {} 获胜", state.game_id, winner);
                self.broadcast(GameMessage::notification(format!(
                    "{} wins!",
                    state.player(winner).name
                )));
            }
            GameEvent::PlayerRenamed(slot, name) => {
                debug!("玩家 {} 改名为 {}", slot, name);
                self.broadcast(GameMessage::notification(format!(
                    "Player {} is now {}",
                    slot, name
                )));
            }
            GameEvent::GameReset => {
                info!("重新开局 {}，起始字母 {}", state.game_id, state.starting_letter);
                self.broadcast(GameMessage::notification(format!(
                    "New game! Starting letter: {}",
                    state.starting_letter
                )));
            }
        }
        self.broadcast(GameMessage::state_update(state, self.is_validating()));
    }
}
