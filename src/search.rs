use url::form_urlencoded::byte_serialize;

use crate::models::{RunConfig, DEFAULT_LOCALE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEngine {
    Google,
    Yandex,
    Bing,
    DuckDuckGo,
}

impl SearchEngine {
    /// Resolves an engine id. Unknown ids map to Google.
    pub fn from_id(id: &str) -> Self {
        match id.trim().to_ascii_lowercase().as_str() {
            "yandex" => SearchEngine::Yandex,
            "bing" => SearchEngine::Bing,
            "duckduckgo" | "ddg" => SearchEngine::DuckDuckGo,
            _ => SearchEngine::Google,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            SearchEngine::Google => "google",
            SearchEngine::Yandex => "yandex",
            SearchEngine::Bing => "bing",
            SearchEngine::DuckDuckGo => "duckduckgo",
        }
    }
}

fn encode(component: &str) -> String {
    byte_serialize(component.as_bytes()).collect()
}

fn or_default_locale(value: &str) -> &str {
    if value.trim().is_empty() { DEFAULT_LOCALE } else { value }
}

/// Search URL for one task under the given run configuration.
pub fn build_search_url(task: &str, config: &RunConfig) -> String {
    let query = if config.use_quotes {
        format!("\"{}\"", task)
    } else {
        task.to_string()
    };
    let q = encode(&query);

    match SearchEngine::from_id(&config.engine) {
        SearchEngine::Google => format!(
            "https://www.google.com/search?q={}&hl={}&gl={}",
            q,
            encode(or_default_locale(&config.locale_hl)),
            encode(or_default_locale(&config.locale_gl)),
        ),
        SearchEngine::Yandex => format!("https://yandex.ru/search/?text={}", q),
        SearchEngine::Bing => format!("https://www.bing.com/search?q={}", q),
        SearchEngine::DuckDuckGo => format!("https://duckduckgo.com/?q={}", q),
    }
}
