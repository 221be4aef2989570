//! Pure state-transition functions for the Prompt Pipeline and
//! Reconciliation Pipeline (§4.6, §4.7). Kept free of I/O so they can be
//! unit tested directly against recorded timestamps.

use drone_hub_protocol::{BuiltinAgent, Chat, PromptState};

/// `shouldDeferQueued`: true iff the agent needs a discovered session id
/// (codex, opencode), that id isn't known yet, and some earlier prompt in
/// this chat is still in flight and hasn't landed in `turns`. Also defers
/// (to preserve ordering) if any earlier prompt is itself still `queued`.
pub fn should_defer_queued(chat: &Chat) -> bool {
    let agent = chat.inferred_agent_kind();
    let session_known = chat.known_session_id().is_some();

    let any_queued = chat
        .pending_prompts
        .iter()
        .any(|p| p.state == PromptState::Queued);
    if any_queued {
        return true;
    }

    if !agent.requires_session_discipline() || session_known {
        return false;
    }

    chat.pending_prompts.iter().any(|p| {
        matches!(p.state, PromptState::Sending | PromptState::Sent)
            && !chat.turns.iter().any(|t| t.id == p.id)
    })
}

/// `stalePendingPromptState`: only `sending`/`sent` can go stale on daemon
/// lookup failure. `sending` stales after `max(enqueue_timeout, 180s)`;
/// `sent` after `max(2*enqueue_timeout, 600s)`. Monotone in `now`: once a
/// state is stale, it stays stale for any larger `now`.
pub fn stale_pending_prompt_state(
    state: PromptState,
    updated_at_ms: i64,
    enqueue_timeout_ms: i64,
    now_ms: i64,
) -> bool {
    let elapsed = now_ms - updated_at_ms;
    match state {
        PromptState::Sending => elapsed > enqueue_timeout_ms.max(180_000),
        PromptState::Sent => elapsed > (2 * enqueue_timeout_ms).max(600_000),
        PromptState::Queued | PromptState::Failed => false,
    }
}

/// Human-readable staleness message for a prompt transitioned to `failed`
/// by [`stale_pending_prompt_state`].
pub fn stale_failure_message(state: PromptState) -> String {
    match state {
        PromptState::Sending => "prompt timed out before the daemon accepted it".to_string(),
        PromptState::Sent => "prompt timed out waiting for the daemon to report completion".to_string(),
        PromptState::Queued | PromptState::Failed => {
            "prompt timed out".to_string()
        }
    }
}

/// Per-agent transcript output extraction for builtins other than codex and
/// opencode (§4.7: "transcript output = stdout (fallback stderr), trimmed,
/// or (no output)").
pub fn extract_builtin_output(stdout: Option<&str>, stderr: Option<&str>) -> String {
    let stdout_trimmed = stdout.map(str::trim).filter(|s| !s.is_empty());
    let stderr_trimmed = stderr.map(str::trim).filter(|s| !s.is_empty());
    stdout_trimmed
        .or(stderr_trimmed)
        .map(str::to_string)
        .unwrap_or_else(|| "(no output)".to_string())
}

/// Preferred opencode session title for discovery (§4.7).
pub fn opencode_session_title(drone_name: &str, chat_name: &str) -> String {
    format!("drone-hub-{drone_name}-{chat_name}")
}

/// Tmux session name for the `custom` agent connector (§4.6).
pub fn custom_agent_tmux_session(chat_name: &str) -> String {
    format!("drone-hub-chat-{chat_name}")
}

/// Variant of [`should_defer_queued`] used by the pending-prompt pumper to
/// ask "is `exclude_id` (itself still `queued`) promotable right now?" —
/// excludes the candidate's own `queued` state from the "any earlier prompt
/// is still queued" check, which would otherwise always be true for the
/// prompt being evaluated. "Earlier" means strictly before `exclude_id` in
/// append order: a later `queued` prompt must never block the one ahead of
/// it from being promoted, or two simultaneously-queued followers deadlock
/// each other forever (spec §8 Scenario 2: P2 promotes while P3 stays queued
/// behind it, not the reverse).
pub fn should_defer_queued_excluding(chat: &Chat, exclude_id: &str) -> bool {
    let agent = chat.inferred_agent_kind();
    let session_known = chat.known_session_id().is_some();

    let Some(exclude_index) = chat.pending_prompts.iter().position(|p| p.id == exclude_id) else {
        return false;
    };
    let earlier = &chat.pending_prompts[..exclude_index];

    let any_earlier_queued = earlier.iter().any(|p| p.state == PromptState::Queued);
    if any_earlier_queued {
        return true;
    }

    if !agent.requires_session_discipline() || session_known {
        return false;
    }

    earlier.iter().any(|p| {
        matches!(p.state, PromptState::Sending | PromptState::Sent) && !chat.turns.iter().any(|t| t.id == p.id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use drone_hub_protocol::{Agent, PendingPrompt, Turn};

    fn chat_with(agent: Agent, session: Option<&str>) -> Chat {
        let mut chat = Chat::new(agent, "2026-01-01T00:00:00Z");
        chat.codex_thread_id = session.map(str::to_string);
        chat
    }

    fn pending(id: &str, state: PromptState) -> PendingPrompt {
        PendingPrompt {
            id: id.to_string(),
            at: "2026-01-01T00:00:00Z".to_string(),
            prompt: "do the thing".to_string(),
            cwd: None,
            state,
            error: None,
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn codex_defers_when_session_unknown_and_prior_inflight() {
        let mut chat = chat_with(
            Agent::Builtin {
                id: BuiltinAgent::Codex,
            },
            None,
        );
        chat.pending_prompts.push(pending("p1", PromptState::Sending));
        assert!(should_defer_queued(&chat));
    }

    #[test]
    fn codex_does_not_defer_once_session_known() {
        let mut chat = chat_with(
            Agent::Builtin {
                id: BuiltinAgent::Codex,
            },
            Some("thread-1"),
        );
        chat.pending_prompts.push(pending("p1", PromptState::Sending));
        assert!(!should_defer_queued(&chat));
    }

    #[test]
    fn codex_does_not_defer_when_prior_already_in_turns() {
        let mut chat = chat_with(
            Agent::Builtin {
                id: BuiltinAgent::Codex,
            },
            None,
        );
        chat.pending_prompts.push(pending("p1", PromptState::Sending));
        chat.turns.push(Turn {
            at: "2026-01-01T00:00:00Z".to_string(),
            prompt_at: None,
            completed_at: None,
            id: "p1".to_string(),
            prompt: "do the thing".to_string(),
            ok: true,
            output: "done".to_string(),
            error: None,
        });
        assert!(!should_defer_queued(&chat));
    }

    #[test]
    fn claude_never_defers_on_session_discipline() {
        let mut chat = chat_with(
            Agent::Builtin {
                id: BuiltinAgent::Claude,
            },
            None,
        );
        chat.pending_prompts.push(pending("p1", PromptState::Sending));
        assert!(!should_defer_queued(&chat));
    }

    #[test]
    fn any_queued_prior_forces_defer_for_ordering() {
        let mut chat = chat_with(
            Agent::Builtin {
                id: BuiltinAgent::Claude,
            },
            Some("sess-1"),
        );
        chat.pending_prompts.push(pending("p0", PromptState::Queued));
        assert!(should_defer_queued(&chat));
    }

    #[test]
    fn sending_stales_after_180s_floor() {
        assert!(!stale_pending_prompt_state(
            PromptState::Sending,
            0,
            5_000,
            179_000
        ));
        assert!(stale_pending_prompt_state(
            PromptState::Sending,
            0,
            5_000,
            180_001
        ));
    }

    #[test]
    fn sending_respects_larger_enqueue_timeout() {
        assert!(!stale_pending_prompt_state(
            PromptState::Sending,
            0,
            300_000,
            300_000
        ));
        assert!(stale_pending_prompt_state(
            PromptState::Sending,
            0,
            300_000,
            300_001
        ));
    }

    #[test]
    fn sent_stales_after_10min_floor() {
        assert!(!stale_pending_prompt_state(
            PromptState::Sent,
            0,
            5_000,
            600_000
        ));
        assert!(stale_pending_prompt_state(
            PromptState::Sent,
            0,
            5_000,
            600_001
        ));
    }

    #[test]
    fn queued_and_failed_never_go_stale() {
        assert!(!stale_pending_prompt_state(
            PromptState::Queued,
            0,
            1,
            i64::MAX
        ));
        assert!(!stale_pending_prompt_state(
            PromptState::Failed,
            0,
            1,
            i64::MAX
        ));
    }

    #[test]
    fn staleness_is_monotone_in_now() {
        let state = PromptState::Sending;
        let updated_at = 0;
        let timeout = 5_000;
        let threshold = (0..=400_000)
            .find(|&now| stale_pending_prompt_state(state, updated_at, timeout, now));
        let threshold = threshold.expect("should go stale eventually");
        for now in threshold..threshold + 10_000 {
            assert!(stale_pending_prompt_state(state, updated_at, timeout, now));
        }
    }

    #[test]
    fn builtin_output_prefers_stdout_then_stderr_then_placeholder() {
        assert_eq!(extract_builtin_output(Some(" hi "), None), "hi");
        assert_eq!(extract_builtin_output(Some("  "), Some(" oops ")), "oops");
        assert_eq!(extract_builtin_output(None, None), "(no output)");
    }

    /// Spec §8 Scenario 2, post-P1-reconcile shape: `[P1:Sent(in turns),
    /// P2:Queued, P3:Queued]`. P2 has no earlier-queued sibling and must be
    /// promotable; P3 sits behind P2 and must keep deferring. Before the
    /// fix, `any_other_queued` saw every *other* queued prompt regardless of
    /// position, so both P2 and P3 deferred to each other forever.
    #[test]
    fn earlier_queued_blocks_later_but_not_itself() {
        let mut chat = chat_with(
            Agent::Builtin {
                id: BuiltinAgent::Codex,
            },
            None,
        );
        chat.pending_prompts.push(pending("p1", PromptState::Sent));
        chat.pending_prompts.push(pending("p2", PromptState::Queued));
        chat.pending_prompts.push(pending("p3", PromptState::Queued));
        chat.turns.push(Turn {
            at: "2026-01-01T00:00:00Z".to_string(),
            prompt_at: None,
            completed_at: None,
            id: "p1".to_string(),
            prompt: "do the thing".to_string(),
            ok: true,
            output: "done".to_string(),
            error: None,
        });

        assert!(
            !should_defer_queued_excluding(&chat, "p2"),
            "p2 has no earlier queued sibling and should be promotable"
        );
        assert!(
            should_defer_queued_excluding(&chat, "p3"),
            "p3 sits behind queued p2 and must keep deferring"
        );
    }

    #[test]
    fn unknown_exclude_id_never_defers() {
        let chat = chat_with(
            Agent::Builtin {
                id: BuiltinAgent::Codex,
            },
            None,
        );
        assert!(!should_defer_queued_excluding(&chat, "missing"));
    }
}
