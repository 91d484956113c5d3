//! Web search and page fetch

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::{parse_args, ActionOutcome, ActionSpec, BoxError, Capability, ParamSpec, Params};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const DEFAULT_MAX_CHARS: usize = 50_000;

/// `web` provider: Brave search plus plain-text page fetch
pub struct WebProvider {
    client: reqwest::Client,
    api_key: String,
    max_results: u32,
    search_endpoint: String,
}

impl WebProvider {
    pub fn new(api_key: Option<String>, max_results: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.unwrap_or_default(),
            max_results,
            search_endpoint: BRAVE_ENDPOINT.to_string(),
        }
    }

    pub fn from_config(config: &hivemind_config::Config) -> Self {
        Self::new(
            config.search_api_key(),
            config.capabilities.web.max_results,
        )
    }

    /// Point searches at another endpoint
    pub fn with_search_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.search_endpoint = endpoint.into();
        self
    }

    async fn search(&self, args: SearchArgs) -> Result<ActionOutcome, BoxError> {
        if self.api_key.is_empty() {
            return Ok(ActionOutcome::failure("search API key not configured"));
        }
        let count = args.count.unwrap_or(self.max_results).clamp(1, 10);
        debug!("◆ SEARCHING: {}", args.query);

        let count_param = count.to_string();
        let response = self
            .client
            .get(&self.search_endpoint)
            .query(&[("q", args.query.as_str()), ("count", count_param.as_str())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Ok(ActionOutcome::failure(format!(
                "search API returned {}",
                status.as_u16()
            )));
        }

        let data: Value = response.json().await?;
        let results: Vec<Value> = data["web"]["results"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .take(count as usize)
                    .map(|item| {
                        json!({
                            "title": item["title"].as_str().unwrap_or(""),
                            "url": item["url"].as_str().unwrap_or(""),
                            "description": item["description"].as_str().unwrap_or(""),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        if results.is_empty() {
            return Ok(ActionOutcome::failure_with_details("no results", args.query));
        }
        let message = format!("{} results for {}", results.len(), args.query);
        Ok(ActionOutcome::success_with_message(json!(results), message))
    }

    async fn fetch(&self, args: FetchArgs) -> Result<ActionOutcome, BoxError> {
        let max_chars = args.max_chars.unwrap_or(DEFAULT_MAX_CHARS);
        debug!("◆ FETCHING: {}", args.url);

        let response = self
            .client
            .get(&args.url)
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        let status = response.status();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await?;

        if !status.is_success() {
            return Ok(ActionOutcome::failure_with_details(
                format!("HTTP {}", status.as_u16()),
                args.url,
            ));
        }

        let text = if content_type.contains("html") {
            strip_tags(&body)?
        } else {
            body
        };
        let truncated = text.chars().count() > max_chars;
        let text: String = if truncated {
            text.chars().take(max_chars).collect()
        } else {
            text
        };

        Ok(ActionOutcome::success_with_message(
            json!({
                "url": args.url,
                "final_url": final_url,
                "status": status.as_u16(),
                "truncated": truncated,
                "length": text.len(),
                "text": text,
            }),
            format!("fetched {} ({} chars)", final_url, text.len()),
        ))
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    count: Option<u32>,
}

#[derive(Deserialize)]
struct FetchArgs {
    url: String,
    max_chars: Option<usize>,
}

/// Drop scripts, styles and tags; collapse whitespace
pub fn strip_tags(html: &str) -> Result<String, regex::Error> {
    let blocks = Regex::new(r"(?is)<script.*?</script>|<style.*?</style>")?;
    let tags = Regex::new(r"<[^>]+>")?;
    let spaces = Regex::new(r"[ \t]+")?;
    let blank_lines = Regex::new(r"\n\s*\n+")?;

    let text = blocks.replace_all(html, "");
    let text = tags.replace_all(&text, " ");
    let text = decode_html_entities(&text);
    let text = spaces.replace_all(&text, " ");
    let text = blank_lines.replace_all(&text, "\n\n");
    Ok(text.trim().to_string())
}

fn decode_html_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[async_trait]
impl Capability for WebProvider {
    fn name(&self) -> &str {
        "web"
    }

    fn description(&self) -> &str {
        "Search the web and fetch pages as plain text."
    }

    fn actions(&self) -> Vec<ActionSpec> {
        vec![
            ActionSpec::new("search", "Web search. Returns titles, URLs and snippets.")
                .param(ParamSpec::required("query", "Search query"))
                .param(ParamSpec::optional("count", "Number of results (1-10)")),
            ActionSpec::new("fetch", "Fetch a URL and return its readable text.")
                .param(ParamSpec::required("url", "URL to fetch"))
                .param(ParamSpec::optional("max_chars", "Truncate the text to this length")),
        ]
    }

    async fn execute(&self, action: &str, params: &Params) -> Result<ActionOutcome, BoxError> {
        match action {
            "search" => self.search(parse_args(params)?).await,
            "fetch" => self.fetch(parse_args(params)?).await,
            other => Err(format!("◆ web HAS NO ACTION '{}'", other).into()),
        }
    }
}
