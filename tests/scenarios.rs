use shiritori::config::GameConfig;
use shiritori::dictionary::WordListDictionary;
use shiritori::{GameEngine, GameState, GameStatus, HistoryEntry, PlayerSlot};
use std::sync::Arc;
use std::time::Duration;

fn dictionary() -> Arc<WordListDictionary> {
    Arc::new(WordListDictionary::from_words([
        "blue", "eagle", "elephant", "tiger", "river", "bear", "cat",
    ]))
}

async fn engine_with(state: GameState) -> GameEngine {
    let engine = GameEngine::with_state(GameConfig::default(), dictionary(), state);
    engine.start().await;
    engine
}

async fn playing_engine(letter: char) -> GameEngine {
    let engine = engine_with(GameState::with_starting_letter(&GameConfig::default(), letter)).await;
    engine.skip_countdown().await;
    engine
}

async fn advance(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

#[tokio::test(start_paused = true)]
async fn ten_seconds_on_blue_costs_ten_points() {
    let engine = playing_engine('B').await;
    advance(10_200).await;

    let outcome = engine.submit_word("blue").await;
    assert!(outcome.success);

    let state = engine.snapshot().await;
    assert_eq!(state.player(PlayerSlot::One).points, 90);
    assert_eq!(state.current_slot(), PlayerSlot::Two);
    assert_eq!(state.required_letter(), 'e');
    assert_eq!(state.last_word, "blue");
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn timing_out_at_fifteen_points_ends_the_game() {
    let settings = GameConfig::default();
    let mut state = GameState::with_starting_letter(&settings, 'B')
        .begin_play(&settings)
        .0;
    state.current_player_index = PlayerSlot::Two.index();
    state.players[1].points = 15;
    let engine = engine_with(state).await;

    advance(15_500).await;

    let state = engine.snapshot().await;
    assert_eq!(state.status, GameStatus::Ended);
    assert_eq!(state.player(PlayerSlot::Two).points, 0);
    assert_eq!(state.winner, Some(PlayerSlot::One));
    assert_eq!(state.player(PlayerSlot::Two).words, vec![HistoryEntry::Pass(1)]);
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn three_letter_words_are_too_short_whatever_the_letter() {
    let engine = playing_engine('B').await;
    let before = engine.snapshot().await;

    let outcome = engine.submit_word("cat").await;
    assert_eq!(
        outcome.reason.as_deref(),
        Some("Word must be at least 4 letters long")
    );
    assert_eq!(engine.snapshot().await, before);
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn opponent_words_count_as_used() {
    let engine = playing_engine('E').await;
    assert!(engine.submit_word("eagle").await.success);
    assert!(engine.submit_word("elephant").await.success);
    assert!(engine.submit_word("tiger").await.success);
    assert!(engine.submit_word("river").await.success);

    // 重复检查先于首字母检查
    let outcome = engine.submit_word("Eagle").await;
    assert_eq!(outcome.reason.as_deref(), Some("Word has already been used"));

    let outcome = engine.submit_word("bear").await;
    assert_eq!(outcome.reason.as_deref(), Some("Word must start with \"R\""));
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn turns_alternate_and_points_never_rise() {
    let engine = playing_engine('B').await;
    let mut previous = engine.snapshot().await;

    for (word, wait) in [("blue", 3_000), ("eagle", 7_000), ("elephant", 1_000)] {
        advance(wait).await;
        assert!(engine.submit_word(word).await.success);
        let state = engine.snapshot().await;
        assert_ne!(state.current_player_index, previous.current_player_index);
        for slot in [PlayerSlot::One, PlayerSlot::Two] {
            assert!(state.player(slot).points <= previous.player(slot).points);
        }
        previous = state;
    }

    advance(15_500).await;
    let state = engine.snapshot().await;
    assert_ne!(state.current_player_index, previous.current_player_index);
    assert_eq!(state.player(PlayerSlot::Two).pass_count, 1);
    engine.shutdown();
}

#[tokio::test(start_paused = true)]
async fn reset_restores_a_fresh_game() {
    let engine = playing_engine('B').await;
    assert!(engine.submit_word("blue").await.success);
    advance(15_500).await;

    engine.reset_game().await;
    let state = engine.snapshot().await;
    assert_eq!(state.status, GameStatus::Countdown);
    assert_eq!(state.countdown_time, 3);
    assert!(state.last_word.is_empty());
    assert!(state.starting_letter.is_ascii_uppercase());
    for player in &state.players {
        assert_eq!(player.points, 100);
        assert!(player.words.is_empty());
        assert_eq!(player.pass_count, 0);
    }
    engine.shutdown();
}
