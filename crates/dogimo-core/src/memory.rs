//! Bounded conversation memory used as model context.

use std::collections::VecDeque;

use crate::model::{ChatMessage, Role};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryEntry {
    pub role: Role,
    pub author: String,
    pub content: String,
}

/// FIFO of the most recent channel messages; the oldest entry is dropped once
/// `capacity` is reached.
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    capacity: usize,
    entries: VecDeque<MemoryEntry>,
}

impl ConversationMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.iter()
    }

    pub fn remember_user(&mut self, author: impl Into<String>, content: impl Into<String>) {
        self.push(Role::User, author.into(), content.into());
    }

    pub fn remember_assistant(&mut self, author: impl Into<String>, content: impl Into<String>) {
        self.push(Role::Assistant, author.into(), content.into());
    }

    fn push(&mut self, role: Role, author: String, content: String) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(MemoryEntry {
            role,
            author,
            content,
        });
    }

    /// System prompt followed by every remembered message, attributed to its author.
    pub fn context(&self, system_prompt: &str) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.entries.len() + 1);
        out.push(ChatMessage::system(system_prompt));
        for e in &self.entries {
            out.push(ChatMessage {
                role: e.role,
                content: format!("{} said: {}", e.author, e.content),
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_when_full() {
        let mut m = ConversationMemory::new(2);
        m.remember_user("a", "one");
        m.remember_user("b", "two");
        m.remember_assistant("Dogimo", "three");

        assert_eq!(m.len(), 2);
        let contents: Vec<_> = m.entries().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "three"]);
    }

    #[test]
    fn context_starts_with_system_prompt() {
        let mut m = ConversationMemory::new(10);
        m.remember_user("testuser", "test message");
        m.remember_assistant("Dogimo", "hi!");

        let ctx = m.context("be brief");
        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx[0], ChatMessage::system("be brief"));
        assert_eq!(ctx[1].role, Role::User);
        assert_eq!(ctx[1].content, "testuser said: test message");
        assert_eq!(ctx[2].role, Role::Assistant);
        assert_eq!(ctx[2].content, "Dogimo said: hi!");
    }

    #[test]
    fn zero_capacity_remembers_nothing() {
        let mut m = ConversationMemory::new(0);
        m.remember_user("a", "b");
        assert!(m.is_empty());
        assert_eq!(m.context("s").len(), 1);
    }
}
