use crate::Result;
use crate::config::DictionaryConfig;
use crate::validation::normalize;
use anyhow::Context;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// 外部词典查询
///
/// 只关心单词是否存在。查询失败由调用方按"不存在"处理。
pub trait Dictionary: Send + Sync {
    fn contains<'a>(&'a self, word: &'a str) -> BoxFuture<'a, Result<bool>>;
}

/// 词典接口返回的词条
#[derive(Debug, Clone, Deserialize)]
pub struct DictionaryEntry {
    pub word: String,
    #[serde(default)]
    pub meanings: Vec<Meaning>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Meaning {
    #[serde(rename = "partOfSpeech", default)]
    pub part_of_speech: String,
    #[serde(default)]
    pub definitions: Vec<Definition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Definition {
    pub definition: String,
}

/// 至少一个词条带有至少一条释义
pub fn has_definition(entries: &[DictionaryEntry]) -> bool {
    entries
        .iter()
        .flat_map(|entry| entry.meanings.iter())
        .any(|meaning| !meaning.definitions.is_empty())
}

/// dictionaryapi.dev 风格的 HTTP 词典
pub struct DictionaryApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl DictionaryApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Network(anyhow::anyhow!(e)))?;

        Ok(DictionaryApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn entry_url(&self, word: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(&word.to_lowercase()))
    }

    /// 查询词条，接口返回非 2xx 时视为没有词条
    pub async fn lookup(&self, word: &str) -> Result<Vec<DictionaryEntry>> {
        let url = self.entry_url(word);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| crate::Error::Network(anyhow::anyhow!(e)))?;

        let status = response.status();
        if !status.is_success() {
            debug!("词典查询 {} 返回状态码 {}", word, status);
            return Ok(Vec::new());
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| crate::Error::Network(anyhow::anyhow!(e)))?;

        let entries: Vec<DictionaryEntry> = serde_json::from_str(&response_text)
            .map_err(|e| crate::Error::Dictionary(format!("无法解析词典响应: {}", e)))?;

        Ok(entries)
    }
}

impl Dictionary for DictionaryApiClient {
    fn contains<'a>(&'a self, word: &'a str) -> BoxFuture<'a, Result<bool>> {
        async move {
            let entries = self.lookup(word).await?;
            Ok(has_definition(&entries))
        }
        .boxed()
    }
}

/// 本地词表，每行一个单词
#[derive(Debug, Clone, Default)]
pub struct WordListDictionary {
    words: HashSet<String>,
}

impl WordListDictionary {
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        WordListDictionary {
            words: words
                .into_iter()
                .map(|w| normalize(w.as_ref()))
                .filter(|w| !w.is_empty() && !w.starts_with('#'))
                .collect(),
        }
    }

    /// 从文件加载词表
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("无法读取词表文件: {}", path))?;
        Ok(Self::from_words(content.lines()))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Dictionary for WordListDictionary {
    fn contains<'a>(&'a self, word: &'a str) -> BoxFuture<'a, Result<bool>> {
        futures_util::future::ready(Ok(self.words.contains(&normalize(word)))).boxed()
    }
}

/// 按配置创建词典：配置了词表则离线查询，否则请求接口
pub fn from_config(config: &DictionaryConfig) -> Result<Arc<dyn Dictionary>> {
    match &config.word_list {
        Some(path) => {
            let dictionary = WordListDictionary::load_from_file(path)?;
            debug!("已加载离线词表 {}，共 {} 个单词", path, dictionary.len());
            Ok(Arc::new(dictionary))
        }
        None => Ok(Arc::new(DictionaryApiClient::new(
            &config.base_url,
            config.timeout(),
        )?)),
    }
}
