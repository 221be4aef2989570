//! Per-agent command construction for the Prompt Pipeline (§4.6).
//!
//! `cursor` and `opencode` live here rather than in their own crates: their
//! command construction is a handful of lines with no reconciliation-side
//! parsing to speak of, unlike codex's JSONL walk or claude's session-id
//! bookkeeping (both of which warranted a dedicated crate).

pub mod cursor;
pub mod custom;
pub mod opencode;
