//! Web search tool: schema offered to the model, argument parsing and the
//! transcript text the model receives back.

use serde::{Deserialize, Serialize};

use super::ports::{SearchDepth, WebSearchParams, WebSearchResponse};
use crate::completions::ToolSchema;

pub const WEB_SEARCH_TOOL_NAME: &str = "web_search";

const DEFAULT_MAX_RESULTS: u32 = 5;
const SNIPPET_CHARS: usize = 200;

/// System turn placed first in the transcript whenever web search is available
pub const WEB_SEARCH_SYSTEM_PROMPT: &str = r#"You are a helpful AI assistant with access to real-time web search. When you receive web search results, you MUST provide structured, comprehensive responses with proper citations.

MANDATORY RESPONSE STRUCTURE when using web search results:

1. **Overview**: Start with a clear, comprehensive summary paragraph
2. **Structured Content**: Use markdown headings (##) to organize information
3. **Citations**: Every fact MUST have a citation: [Source Title](URL)
4. **Details**: Include specific dates, numbers, quotes, and locations
5. **Sources Section**: End with a ## Sources section listing all references

CITATION RULES:
- Format: [Source Name](URL) - never just (URL) or plain text
- Cite EVERY fact, statistic, quote, or claim
- Use the exact source titles provided in the search results

EXAMPLE FORMAT:
The incident occurred on January 15, 2024, according to [BBC News](https://bbc.com/news), with [CNN](https://cnn.com) confirming the timeline.

You have access to the following tools:
- web_search: Search the web for current information"#;

pub fn web_search_tool_schema() -> ToolSchema {
    ToolSchema {
        name: WEB_SEARCH_TOOL_NAME.to_string(),
        description: "Search the web for current information, news, facts, or recent events. \
            Use this when you need up-to-date information that might not be in your training data."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to find relevant information"
                },
                "search_depth": {
                    "type": "string",
                    "enum": ["basic", "advanced"],
                    "description": "The depth of search - basic for quick results, advanced for comprehensive search"
                },
                "max_results": {
                    "type": "number",
                    "description": "Maximum number of search results to return (1-10)",
                    "minimum": 1,
                    "maximum": 10
                }
            },
            "required": ["query"]
        }),
    }
}

/// Arguments the model supplies for a web search call
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebSearchArgs {
    pub query: String,
    #[serde(default)]
    pub search_depth: Option<SearchDepth>,
    #[serde(default)]
    pub max_results: Option<f64>,
}

impl WebSearchArgs {
    pub fn parse(arguments: &str) -> Result<Self, String> {
        let args: WebSearchArgs = serde_json::from_str(arguments)
            .map_err(|e| format!("Invalid web_search arguments: {e}"))?;
        if args.query.trim().is_empty() {
            return Err("web_search requires a non-empty query".to_string());
        }
        Ok(args)
    }

    pub fn into_params(self) -> WebSearchParams {
        let max_results = self
            .max_results
            .filter(|n| n.is_finite())
            .map(|n| n.round().clamp(1.0, 10.0) as u32)
            .unwrap_or(DEFAULT_MAX_RESULTS);
        WebSearchParams {
            query: self.query,
            search_depth: self.search_depth.unwrap_or_default(),
            max_results,
            include_answer: true,
        }
    }
}

/// Source reference surfaced to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub fn citations(response: &WebSearchResponse) -> Vec<Citation> {
    response
        .results
        .iter()
        .map(|r| Citation {
            title: r.title.clone(),
            url: r.url.clone(),
            snippet: format!("{}...", r.content.chars().take(SNIPPET_CHARS).collect::<String>()),
        })
        .collect()
}

/// Render search results as the tool turn handed back to the model
pub fn format_search_results(query: &str, response: &WebSearchResponse) -> String {
    let mut text = format!("Web Search Results for: \"{query}\"\n\n");

    if let Some(answer) = &response.answer {
        text.push_str(&format!("QUICK SUMMARY: {answer}\n\n"));
    }

    text.push_str("DETAILED SOURCES:\n");
    text.push_str(
        "Please use ALL of this information to provide a comprehensive response. \
         Cite each source using [Source Title](URL) format.\n\n",
    );

    for (idx, result) in response.results.iter().enumerate() {
        text.push_str(&format!("SOURCE {}: {}\n", idx + 1, result.title));
        text.push_str(&format!("URL: {}\n", result.url));
        if let Some(published) = &result.published_date {
            text.push_str(&format!("Published: {published}\n"));
        }
        text.push_str(&format!("Content: {}\n", result.content));
        text.push_str("---\n\n");
    }

    text.push_str("CRITICAL INSTRUCTION: You MUST structure your response exactly as follows:\n");
    text.push_str("1. Start with a comprehensive overview paragraph\n");
    text.push_str("2. Organize information with clear headings (use ## for sections)\n");
    text.push_str(
        "3. For EVERY fact, data point, or claim, include a citation in the format [Source Title](URL)\n",
    );
    text.push_str("4. Include specific details: dates, numbers, quotes, locations\n");
    text.push_str("5. End with a 'Sources' section listing all references\n");
    text.push_str("6. Use markdown formatting for better readability\n\n");
    text.push_str(
        "CITATION FORMAT EXAMPLE: According to [BBC News](https://bbc.com/news/example), \
         the event occurred on June 12, 2025.\n\n",
    );
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ports::WebSearchResult;

    fn response() -> WebSearchResponse {
        WebSearchResponse {
            answer: Some("It rained.".to_string()),
            results: vec![
                WebSearchResult {
                    title: "Weather Today".to_string(),
                    url: "https://weather.example/today".to_string(),
                    content: "x".repeat(250),
                    score: 0.9,
                    published_date: Some("2025-06-12".to_string()),
                },
                WebSearchResult {
                    title: "Local News".to_string(),
                    url: "https://news.example".to_string(),
                    content: "Short".to_string(),
                    score: 0.5,
                    published_date: None,
                },
            ],
        }
    }

    #[test]
    fn test_args_defaults_and_clamping() {
        let params = WebSearchArgs::parse(r#"{"query":"weather"}"#)
            .unwrap()
            .into_params();
        assert_eq!(params.search_depth, SearchDepth::Basic);
        assert_eq!(params.max_results, 5);
        assert!(params.include_answer);

        let params = WebSearchArgs::parse(r#"{"query":"weather","search_depth":"advanced","max_results":50}"#)
            .unwrap()
            .into_params();
        assert_eq!(params.search_depth, SearchDepth::Advanced);
        assert_eq!(params.max_results, 10);
    }

    #[test]
    fn test_args_rejects_missing_or_empty_query() {
        assert!(WebSearchArgs::parse("{}").is_err());
        assert!(WebSearchArgs::parse(r#"{"query":"  "}"#).is_err());
        assert!(WebSearchArgs::parse("{not json").is_err());
    }

    #[test]
    fn test_format_lists_sources_in_order() {
        let text = format_search_results("weather", &response());

        assert!(text.starts_with("Web Search Results for: \"weather\"\n\n"));
        assert!(text.contains("QUICK SUMMARY: It rained.\n\n"));
        let first = text.find("SOURCE 1: Weather Today").unwrap();
        let second = text.find("SOURCE 2: Local News").unwrap();
        assert!(first < second);
        assert!(text.contains("Published: 2025-06-12\n"));
        assert_eq!(text.matches("Published:").count(), 1);
        assert!(text.contains("CRITICAL INSTRUCTION"));
    }

    #[test]
    fn test_format_without_answer_omits_summary() {
        let mut response = response();
        response.answer = None;
        assert!(!format_search_results("q", &response).contains("QUICK SUMMARY"));
    }

    #[test]
    fn test_citation_snippets_are_truncated() {
        let citations = citations(&response());
        assert_eq!(citations[0].snippet.chars().count(), 203);
        assert!(citations[0].snippet.ends_with("..."));
        assert_eq!(citations[1].snippet, "Short...");
    }
}
