//! chat-relay: streaming chat relay for an OpenAI-compatible provider.
//!
//! Forwards chat prompts to an external LLM provider and re-streams the
//! generated text to the caller as it arrives. A second endpoint records
//! leaderboard scores in a hosted Supabase database and returns the ranked
//! neighbourhood around the new entry.
//!
//! - [`config`]: CLI arguments and runtime configuration
//! - [`provider`]: LLM provider client and streaming delta decoding
//! - [`leaderboard`]: leaderboard store backends
//! - [`server`]: HTTP routes, error mapping and the streaming relay

pub mod config;
pub mod leaderboard;
pub mod provider;
pub mod server;
