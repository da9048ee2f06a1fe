//! skillminer - Mine structured IT skill and domain records from the web
//!
//! Searches the web for a skill or domain, asks an LLM to fill a fixed field schema from
//! each page, parses the replies into records and merges them into JSON or CSV stores.
//! Supports multiple LLM providers (OpenAI, Anthropic, OpenAI-compatible servers) and
//! search providers (DuckDuckGo, Tavily).

pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod search;
pub mod store;
pub mod util;
