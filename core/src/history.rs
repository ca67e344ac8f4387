use chatline_protocol::ChatTurn;

/// Every turn of the conversation, oldest first.
///
/// The whole history is kept for the life of the process. Only a trailing
/// window of it is sent with each request.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<ChatTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ChatTurn::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(ChatTurn::assistant(content));
    }

    /// The most recent `size` turns, oldest first.
    pub fn window(&self, size: usize) -> Vec<ChatTurn> {
        let start = self.turns.len().saturating_sub(size);
        self.turns[start..].to_vec()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_protocol::Role;
    use pretty_assertions::assert_eq;

    #[test]
    fn window_keeps_most_recent_turns_in_order() {
        let mut history = ConversationHistory::new();
        for i in 0..12 {
            history.push_user(format!("q{i}"));
        }
        let window = history.window(10);
        let contents: Vec<&str> = window.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["q2", "q3", "q4", "q5", "q6", "q7", "q8", "q9", "q10", "q11"]
        );
        assert_eq!(history.len(), 12);
    }

    #[test]
    fn window_larger_than_history_returns_everything() {
        let mut history = ConversationHistory::new();
        history.push_user("hi");
        history.push_assistant("hello");
        let roles: Vec<Role> = history.window(10).iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }
}
