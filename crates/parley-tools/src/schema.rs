//! Function-calling schemas for the five retrieval tools.

use serde_json::{json, Value};

pub const TOOL_GET_BIO: &str = "get_bio";
pub const TOOL_SEARCH_IMAGES: &str = "search_images";
pub const TOOL_GET_NEWS: &str = "get_news";
pub const TOOL_WEB_SEARCH: &str = "web_search";
pub const TOOL_GET_DATETIME: &str = "get_datetime";

/// The tool schemas offered on every decision call.
pub fn tool_schemas() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "function": {
                "name": TOOL_GET_BIO,
                "description": "Get biographical information about a person, celebrity, historical figure, or public personality. Use this when users ask 'who is [person]', want background information, or ask about someone's life story.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "subject": {
                            "type": "string",
                            "description": "The name of the person to get biography for (e.g., 'Virat Kohli', 'Elon Musk', 'Albert Einstein')"
                        }
                    },
                    "required": ["subject"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": TOOL_SEARCH_IMAGES,
                "description": "Search for and display images related to any topic, person, place, object, animal, or concept. Use this when users want to see, show, find, display images/pictures, or ask for visual content.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "subject": {
                            "type": "string",
                            "description": "What to search images for (e.g., 'Virat Kohli', 'sunset', 'Tesla car', 'lion')"
                        },
                        "max_results": {
                            "type": "integer",
                            "description": "Number of images to return (1-10)",
                            "default": 2
                        }
                    },
                    "required": ["subject"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": TOOL_GET_NEWS,
                "description": "Get recent news articles about a topic, sorted newest first. Kept to a few articles to avoid response truncation.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "topic": {
                            "type": "string",
                            "description": "The news topic to search for (e.g., 'Virat Kohli', 'artificial intelligence', 'India', 'stock market')"
                        },
                        "max_items": {
                            "type": "integer",
                            "description": "Number of news articles to return (1-10)",
                            "default": 3
                        }
                    },
                    "required": ["topic"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": TOOL_WEB_SEARCH,
                "description": "Perform a general web search to find current information, facts, prices, status, market data, weather, or any up-to-date information. Use this for factual questions, current prices (stocks, crypto), live data, weather, or when you need the most recent information.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query (e.g., 'Nifty 50 current price', 'weather Mumbai today', 'Bitcoin price now')"
                        },
                        "num_results": {
                            "type": "integer",
                            "description": "Number of search results to return (1-10)",
                            "default": 5
                        }
                    },
                    "required": ["query"]
                }
            }
        }),
        json!({
            "type": "function",
            "function": {
                "name": TOOL_GET_DATETIME,
                "description": "Get the current date and time in Indian Standard Time (IST). Use this when users ask for current date, time, today's date, what day it is, or any time-related queries.",
                "parameters": { "type": "object", "properties": {} }
            }
        }),
    ]
}
