//! Interest-driven personalization of computer science textbook chapters.
//!
//! A chapter is decomposed (by concept or by section), rewritten through an
//! LLM for one reader interest, critiqued by an LLM judge, refined, and
//! optionally compared against a competing rewrite. Every stage persists its
//! output under a per-run directory.

pub mod artifacts;
pub mod config;
pub mod context;
pub mod errors;
pub mod gateway;
pub mod judge;
pub mod personalizer;
pub mod prompts;
pub mod report;
pub mod strategy;
