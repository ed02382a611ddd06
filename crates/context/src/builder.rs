//! Context Builder (§4.2): assembles the bounded prompt for one participant's
//! turn from a conversation's message history.

use parley_domain::model::{Conversation, Message, MessageRole, Participant};

/// A role-tagged prompt message, collapsed from the conversation's
/// three-role schema into the two-role shape every completion provider
/// speaks (system + the rest).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

/// Deterministic sliding-window prompt builder.
///
/// Pure function of its inputs: never mutates the conversation, never
/// reorders history, never summarizes. Long debates are bounded by
/// `context_window_rounds` rather than compaction.
pub struct ContextBuilder {
    /// Absolute input-token cap (model-dependent upper bound).
    pub input_token_cap: u32,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            input_token_cap: 100_000,
        }
    }
}

impl ContextBuilder {
    pub fn new(input_token_cap: u32) -> Self {
        Self { input_token_cap }
    }

    /// Build the bounded prompt for `participant`'s upcoming turn.
    ///
    /// `history` must be sorted ascending by `sequence_number` (oldest
    /// first); `count_tokens` estimates a message's token cost under the
    /// target provider's tokenizer (fall back to
    /// [`crate::tokens::estimate_tokens`] when the provider doesn't expose
    /// one).
    pub fn build(
        &self,
        conversation: &Conversation,
        participant: &Participant,
        history: &[Message],
        reserved_output_tokens: u32,
        count_tokens: impl Fn(&str) -> u32,
    ) -> Vec<PromptMessage> {
        let mut messages = Vec::new();

        // 1. System preamble.
        let system_content = build_system_preamble(conversation, participant);
        let system_tokens = count_tokens(&system_content);
        messages.push(PromptMessage {
            role: PromptRole::System,
            content: system_content,
        });

        // 2. Walk history newest-to-oldest, restricted to the trailing
        // context_window_rounds rounds, accumulating until the budget is
        // spent. Collect in reverse, then re-reverse to restore chronology.
        let min_round = conversation
            .current_round
            .saturating_sub(conversation.context_window_rounds.saturating_sub(1));

        let budget = self
            .input_token_cap
            .saturating_sub(reserved_output_tokens)
            .saturating_sub(system_tokens);

        let mut used_tokens: u32 = 0;
        let mut window: Vec<PromptMessage> = Vec::new();

        for msg in history
            .iter()
            .rev()
            .filter(|m| m.round_number >= min_round)
        {
            let prompt_msg = collapse_message(msg, participant);
            let msg_tokens = count_tokens(&prompt_msg.content);

            // The single most recent message is always included even if it
            // overflows the remainder on its own.
            if window.is_empty() {
                used_tokens = used_tokens.saturating_add(msg_tokens);
                window.push(prompt_msg);
                continue;
            }

            if used_tokens.saturating_add(msg_tokens) > budget {
                break;
            }
            used_tokens += msg_tokens;
            window.push(prompt_msg);
        }

        window.reverse();
        messages.extend(window);

        // 4. Final nudge.
        messages.push(PromptMessage {
            role: PromptRole::User,
            content: format!(
                "It is now {}'s turn (round {}). Continue the debate.",
                participant.name, conversation.current_round
            ),
        });

        messages
    }
}

fn build_system_preamble(conversation: &Conversation, participant: &Participant) -> String {
    let roster: Vec<String> = conversation
        .participants
        .iter()
        .map(|p| p.name.clone())
        .collect();

    format!(
        "{}\n\n---\nDebate topic: {}\nParticipants: {}\nRound: {}\n",
        participant.system_prompt,
        conversation.topic,
        roster.join(", "),
        conversation.current_round
    )
}

/// Collapse a persisted message's three-role schema into the prompt's
/// system/user/assistant shape from the perspective of `participant`.
fn collapse_message(msg: &Message, participant: &Participant) -> PromptMessage {
    if msg.participant_index == participant.index && msg.role == MessageRole::Assistant {
        PromptMessage {
            role: PromptRole::Assistant,
            content: msg.content.clone(),
        }
    } else {
        PromptMessage {
            role: PromptRole::User,
            content: format!("{}: {}", msg.participant_name, msg.content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_domain::model::{ConversationStatus, CostLevel, JudgeCadence};
    use uuid::Uuid;

    fn participant(index: u32, name: &str) -> Participant {
        Participant {
            index,
            name: name.into(),
            model: "stub/model".into(),
            system_prompt: format!("You are {name}, argue your position."),
            temperature: 0.7,
            max_output_tokens: 512,
        }
    }

    fn conversation(round: u32, window: u32, participants: Vec<Participant>) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            topic: "Should cats wear hats".into(),
            participants,
            max_rounds: 10,
            context_window_rounds: window,
            cost_warning_threshold: 5.0,
            judge_model: None,
            judge_cadence: JudgeCadence::default(),
            status: ConversationStatus::Running,
            current_round: round,
            current_turn_index: 0,
            total_cost_usd: 0.0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            current_health_score: None,
            last_cost_level: CostLevel::None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn message(seq: u32, round: u32, participant_index: u32, name: &str, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            participant_index,
            participant_name: name.into(),
            model: "stub/model".into(),
            role: MessageRole::Assistant,
            content: content.into(),
            sequence_number: seq,
            round_number: round,
            turn_index: participant_index,
            input_tokens: 10,
            output_tokens: 10,
            response_time_ms: 100,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn build_includes_system_preamble_and_final_nudge() {
        let pro = participant(0, "Pro");
        let con = participant(1, "Con");
        let convo = conversation(1, 10, vec![pro.clone(), con.clone()]);
        let history = vec![message(0, 0, 0, "Pro", "Opening statement.")];

        let builder = ContextBuilder::new(100_000);
        let prompt = builder.build(&convo, &con, &history, 512, crate::tokens::estimate_tokens);

        assert!(matches!(prompt.first().unwrap().role, PromptRole::System));
        let last = prompt.last().unwrap();
        assert!(matches!(last.role, PromptRole::User));
        assert!(last.content.contains("Con's turn"));
    }

    #[test]
    fn own_messages_map_to_assistant_others_to_attributed_user() {
        let pro = participant(0, "Pro");
        let con = participant(1, "Con");
        let convo = conversation(1, 10, vec![pro.clone(), con.clone()]);
        let history = vec![
            message(0, 0, 0, "Pro", "Cats deserve dignity."),
            message(1, 0, 1, "Con", "Hats undermine feline autonomy."),
        ];

        let builder = ContextBuilder::new(100_000);
        let prompt = builder.build(&convo, &pro, &history, 512, crate::tokens::estimate_tokens);

        let own = prompt.iter().find(|m| m.content.contains("dignity")).unwrap();
        assert!(matches!(own.role, PromptRole::Assistant));

        let other = prompt
            .iter()
            .find(|m| m.content.contains("autonomy"))
            .unwrap();
        assert!(matches!(other.role, PromptRole::User));
        assert!(other.content.starts_with("Con:"));
    }

    #[test]
    fn restricts_to_context_window_rounds() {
        let pro = participant(0, "Pro");
        let con = participant(1, "Con");
        let convo = conversation(5, 3, vec![pro.clone(), con.clone()]);
        let history = vec![
            message(0, 0, 0, "Pro", "ancient argument"),
            message(1, 3, 1, "Con", "recent argument one"),
            message(2, 4, 0, "Pro", "recent argument two"),
        ];

        let builder = ContextBuilder::new(100_000);
        let prompt = builder.build(&convo, &con, &history, 512, crate::tokens::estimate_tokens);

        assert!(!prompt.iter().any(|m| m.content.contains("ancient")));
        assert!(prompt.iter().any(|m| m.content.contains("recent argument one")));
    }

    #[test]
    fn stops_greedily_without_truncating_mid_message_but_keeps_newest() {
        let pro = participant(0, "Pro");
        let con = participant(1, "Con");
        let convo = conversation(1, 10, vec![pro.clone(), con.clone()]);
        let big = "x".repeat(4000); // ~1000 tokens under the 4-char estimator
        let history = vec![
            message(0, 0, 0, "Pro", &big),
            message(1, 0, 1, "Con", &big),
        ];

        // Cap so small only one oversized message fits, but the newest
        // message is always included regardless.
        let builder = ContextBuilder::new(50);
        let prompt = builder.build(&convo, &con, &history, 0, crate::tokens::estimate_tokens);

        // newest message (Con's, index 1) should be present despite being
        // oversized on its own.
        assert_eq!(prompt.len(), 3); // system + one history msg + nudge
    }
}
