use crate::game::GameState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 单词被拒绝的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    TooShort(usize),
    AlreadyUsed,
    WrongLetter(char),
    NotInDictionary,
    /// 游戏已结束、正在校验其它单词，或提交所属的回合已经结束
    NotActive,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooShort(min) => write!(f, "Word must be at least {} letters long", min),
            Rejection::AlreadyUsed => write!(f, "Word has already been used"),
            Rejection::WrongLetter(letter) => {
                write!(f, "Word must start with \"{}\"", letter.to_uppercase())
            }
            Rejection::NotInDictionary => write!(f, "Word not found in dictionary"),
            Rejection::NotActive => write!(f, "Game not active"),
        }
    }
}

/// 提交结果，直接返回给前端
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SubmitOutcome {
    pub fn accepted() -> Self {
        SubmitOutcome {
            success: true,
            reason: None,
        }
    }
}

impl From<Result<(), Rejection>> for SubmitOutcome {
    fn from(result: Result<(), Rejection>) -> Self {
        match result {
            Ok(()) => SubmitOutcome::accepted(),
            Err(rejection) => SubmitOutcome {
                success: false,
                reason: Some(rejection.to_string()),
            },
        }
    }
}

pub fn normalize(word: &str) -> String {
    word.trim().to_lowercase()
}

/// 本地规则校验：长度、重复、首字母
///
/// 按顺序检查，第一条不满足的规则决定拒绝原因。通过时返回规范化后的单词。
pub fn check_rules<'a>(
    word: &str,
    used_words: impl IntoIterator<Item = &'a str>,
    required_letter: char,
    min_length: usize,
) -> Result<String, Rejection> {
    let normalized = normalize(word);

    if normalized.chars().count() < min_length {
        return Err(Rejection::TooShort(min_length));
    }

    if used_words.into_iter().any(|used| used == normalized) {
        return Err(Rejection::AlreadyUsed);
    }

    let required = required_letter.to_lowercase().next().unwrap_or(required_letter);
    if normalized.chars().next() != Some(required) {
        return Err(Rejection::WrongLetter(required));
    }

    Ok(normalized)
}

/// 针对当前快照做本地规则校验
pub fn check_structure(
    state: &GameState,
    word: &str,
    min_length: usize,
) -> Result<String, Rejection> {
    check_rules(word, state.used_words(), state.required_letter(), min_length)
}
