use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub game: GameConfig,
    pub dictionary: DictionaryConfig,
    pub ui: UiConfig,
    pub log: LogConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 对局参数，引擎按值持有一份
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct GameConfig {
    /// 每回合秒数，超时扣除同样的分数
    pub turn_duration: u32,
    pub starting_points: u32,
    /// 开局倒计时秒数
    pub countdown_duration: u32,
    pub min_word_length: usize,
    /// 计时器一"秒"的实际毫秒数
    pub tick_interval_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            turn_duration: 15,
            starting_points: 100,
            countdown_duration: 3,
            min_word_length: 4,
            tick_interval_ms: 1000,
        }
    }
}

impl GameConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DictionaryConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// 离线词表路径，设置后不再请求词典接口
    pub word_list: Option<String>,
}

impl DictionaryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UiConfig {
    /// 前端显示拒绝原因的时长
    pub error_display_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct CorsConfig {
    pub allow_all_origins: Option<bool>,
    pub allowed_origins: Option<Vec<String>>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::build(config::File::with_name("config").required(false))
    }

    /// 从指定来源加载，缺失的字段使用默认值
    pub fn build<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = GameConfig::default();
        let config = config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000_i64)?
            .set_default("game.turn_duration", defaults.turn_duration as i64)?
            .set_default("game.starting_points", defaults.starting_points as i64)?
            .set_default("game.countdown_duration", defaults.countdown_duration as i64)?
            .set_default("game.min_word_length", defaults.min_word_length as i64)?
            .set_default("game.tick_interval_ms", defaults.tick_interval_ms as i64)?
            .set_default(
                "dictionary.base_url",
                "https://api.dictionaryapi.dev/api/v2/entries/en",
            )?
            .set_default("dictionary.timeout_secs", 5_i64)?
            .set_default("ui.error_display_ms", 3000_i64)?
            .set_default("log.level", "info")?
            .add_source(source)
            .build()?;

        let config = config.try_deserialize::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.game.turn_duration == 0 {
            anyhow::bail!("game.turn_duration 必须大于 0");
        }
        if self.game.tick_interval_ms == 0 {
            anyhow::bail!("game.tick_interval_ms 必须大于 0");
        }
        if self.dictionary.word_list.is_none() {
            url::Url::parse(&self.dictionary.base_url)
                .map_err(|e| anyhow::anyhow!("dictionary.base_url 无效: {}", e))?;
        }
        Ok(())
    }

    /// 初始化全局配置
    pub fn init() -> Result<()> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| anyhow::anyhow!("配置已经初始化"))?;
        Ok(())
    }

    /// 获取全局配置实例
    pub fn get() -> &'static Config {
        CONFIG.get().expect("配置未初始化，请先调用 Config::init()")
    }

    pub fn server_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("无效的服务器地址: {}", e))
    }

    pub fn log_filter(&self) -> String {
        format!("shiritori={}", self.log.level)
    }
}
