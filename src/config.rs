use serde::Deserialize;
use std::path::Path;

use crate::parser::FeedSelectors;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// Upper bound on feeds fetched at the same time
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub websites: Vec<WebsiteConfig>,
}

fn default_refresh_interval() -> u64 {
    15
}

fn default_max_concurrency() -> usize {
    8
}

fn default_request_timeout() -> u64 {
    10
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_item_node() -> String {
    "item".to_string()
}

fn default_title_field() -> String {
    "title".to_string()
}

fn default_link_field() -> String {
    "link".to_string()
}

fn default_content_field() -> String {
    "description".to_string()
}

fn default_guid_field() -> String {
    "guid".to_string()
}

/// A website as declared in `feeds.toml`. The field names describe where
/// each news attribute lives inside that site's feed.
#[derive(Debug, Deserialize, Clone)]
pub struct WebsiteConfig {
    pub name: String,
    pub rss_url: String,
    #[serde(default = "default_item_node")]
    pub item_node: String,
    #[serde(default = "default_title_field")]
    pub title_field: String,
    #[serde(default = "default_link_field")]
    pub link_field: String,
    #[serde(default = "default_content_field")]
    pub content_field: String,
    #[serde(default = "default_guid_field")]
    pub guid_field: String,
    #[serde(default)]
    pub author_field: Option<String>,
    #[serde(default)]
    pub published_field: Option<String>,
}

impl WebsiteConfig {
    pub fn selectors(&self) -> FeedSelectors {
        FeedSelectors {
            item_node: self.item_node.clone(),
            title_field: self.title_field.clone(),
            link_field: self.link_field.clone(),
            content_field: self.content_field.clone(),
            guid_field: self.guid_field.clone(),
            author_field: self.author_field.clone(),
            published_field: self.published_field.clone(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.max_concurrency == 0 {
            anyhow::bail!("max_concurrency must be at least 1");
        }
        if config.refresh_interval == 0 {
            anyhow::bail!("refresh_interval must be at least 1");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        assert_eq!(default_refresh_interval(), 15);
        assert_eq!(default_max_concurrency(), 8);
        assert_eq!(default_request_timeout(), 10);
        assert_eq!(default_listen_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
            refresh_interval = 30
            max_concurrency = 4

            [[websites]]
            name = "Test Site"
            rss_url = "https://example.com/feed.xml"

            [[websites]]
            name = "Atom Site"
            rss_url = "https://example.org/atom"
            item_node = "entry"
            content_field = "summary"
            guid_field = "id"
            author_field = "name"
            published_field = "updated"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.refresh_interval, 30);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.request_timeout, 10);
        assert_eq!(config.websites.len(), 2);
        assert_eq!(config.websites[0].name, "Test Site");
        assert_eq!(config.websites[0].item_node, "item");
        assert_eq!(config.websites[0].content_field, "description");
        assert!(config.websites[0].author_field.is_none());
        assert_eq!(config.websites[1].item_node, "entry");
        assert_eq!(config.websites[1].guid_field, "id");
        assert_eq!(config.websites[1].published_field.as_deref(), Some("updated"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let content = "this is not valid toml {{{";

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_missing_required_fields() {
        let content = r#"
            [[websites]]
            name = "Test Site"
            # Missing rss_url
        "#;

        let result = Config::from_str(content);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = Config::from_str("max_concurrency = 0");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_refresh_interval_rejected() {
        let err = Config::from_str("refresh_interval = 0").unwrap_err();
        assert!(err.to_string().contains("refresh_interval"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert!(config.websites.is_empty());
        assert_eq!(config.refresh_interval, 15);
        assert_eq!(config.listen_addr, "0.0.0.0:3000");
    }

    #[test]
    fn test_selectors_carry_config_fields() {
        let content = r#"
            [[websites]]
            name = "Blog"
            rss_url = "https://blog.example.com/rss"
            content_field = "encoded"
            author_field = "creator"
        "#;

        let config = Config::from_str(content).unwrap();
        let selectors = config.websites[0].selectors();

        assert_eq!(selectors.item_node, "item");
        assert_eq!(selectors.content_field, "encoded");
        assert_eq!(selectors.author_field.as_deref(), Some("creator"));
        assert!(selectors.published_field.is_none());
    }
}
