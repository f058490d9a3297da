use anyhow::Result;
use serde::Serialize;

use crate::core::storage::TranscriptStore;
use crate::models::openai::{ChatMessage, ContentPart, ImageUrl, MessageContent};
use crate::models::project::Project;
use crate::models::turn::{Role, Turn};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
/// Text sent alongside an image when the user supplied none.
pub const IMAGE_PROMPT_PLACEHOLDER: &str = "Analyze this image";

/// The bounded prompt sent to the provider for a single submission:
/// one system entry followed by recent turns, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptWindow {
    messages: Vec<ChatMessage>,
}

impl PromptWindow {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ContextWindowBuilder {
    max_turns: usize,
    default_instruction: String,
}

impl ContextWindowBuilder {
    pub fn new(max_turns: usize, default_instruction: impl Into<String>) -> Self {
        Self {
            max_turns,
            default_instruction: default_instruction.into(),
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Read the most recent turns of `project` and assemble the window.
    ///
    /// The store is expected to already contain the new user turn.
    pub async fn build(
        &self,
        store: &dyn TranscriptStore,
        project: &Project,
        text: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<PromptWindow> {
        let mut recent = store.recent(&project.id, self.max_turns).await?;
        recent.reverse();

        Ok(self.assemble(project.system_prompt.as_deref(), &recent, text, image_url))
    }

    /// Pure assembly over turns given oldest first.
    pub fn assemble(
        &self,
        instruction: Option<&str>,
        turns: &[Turn],
        text: Option<&str>,
        image_url: Option<&str>,
    ) -> PromptWindow {
        let instruction = instruction
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.default_instruction.as_str());

        let window = &turns[turns.len().saturating_sub(self.max_turns)..];

        let mut messages = Vec::with_capacity(window.len() + 1);
        messages.push(ChatMessage::text(Role::System.as_str(), instruction));
        messages.extend(
            window
                .iter()
                .map(|turn| ChatMessage::text(turn.role.as_str(), turn.content.clone())),
        );

        if let Some(url) = image_url {
            let text = text
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(IMAGE_PROMPT_PLACEHOLDER);
            let content = MessageContent::Array(vec![
                ContentPart::Text {
                    text: text.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: url.to_string(),
                    },
                },
            ]);

            // The window always ends with the new user turn once it is persisted
            match messages.last_mut() {
                Some(last) if last.role == Role::User.as_str() => last.content = content,
                _ => messages.push(ChatMessage {
                    role: Role::User.as_str().to_string(),
                    content,
                }),
            }
        }

        PromptWindow { messages }
    }
}

impl Default for ContextWindowBuilder {
    fn default() -> Self {
        Self::new(20, DEFAULT_SYSTEM_PROMPT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::InMemoryTranscriptStore;
    use crate::models::turn::NewTurn;
    use chrono::Utc;

    fn turn(sequence: u64, role: Role, content: &str, image_url: Option<&str>) -> Turn {
        Turn {
            id: format!("t{sequence}"),
            project_id: "p1".to_string(),
            sequence,
            role,
            content: content.to_string(),
            image_url: image_url.map(String::from),
            created_at: Utc::now(),
        }
    }

    fn project(system_prompt: Option<&str>) -> Project {
        Project {
            id: "p1".to_string(),
            owner_id: "alice".to_string(),
            name: "Demo".to_string(),
            description: None,
            system_prompt: system_prompt.map(String::from),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_system_entry_defaults_when_unset_or_blank() {
        let builder = ContextWindowBuilder::default();
        let turns = vec![turn(0, Role::User, "Hello", None)];

        for instruction in [None, Some("   ")] {
            let window = builder.assemble(instruction, &turns, Some("Hello"), None);
            assert_eq!(window.len(), 2);
            assert_eq!(window.messages()[0].role, "system");
            assert_eq!(
                window.messages()[0].content.as_text(),
                Some(DEFAULT_SYSTEM_PROMPT)
            );
        }

        let window = builder.assemble(Some("Answer in French."), &turns, Some("Hello"), None);
        assert_eq!(
            window.messages()[0].content.as_text(),
            Some("Answer in French.")
        );
    }

    #[test]
    fn test_image_rewrites_only_last_entry() {
        let builder = ContextWindowBuilder::default();
        let turns = vec![
            turn(0, Role::User, "Earlier", Some("https://img/old.png")),
            turn(1, Role::Assistant, "Sure", None),
            turn(2, Role::User, "What is this?", Some("https://img/new.png")),
        ];

        let window = builder.assemble(
            None,
            &turns,
            Some("What is this?"),
            Some("https://img/new.png"),
        );

        let messages = window.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content.as_text(), Some("Earlier"));
        assert_eq!(messages[2].content.as_text(), Some("Sure"));
        assert_eq!(
            messages[3].content,
            MessageContent::Array(vec![
                ContentPart::Text {
                    text: "What is this?".to_string()
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "https://img/new.png".to_string()
                    }
                },
            ])
        );
    }

    #[test]
    fn test_image_without_text_uses_placeholder() {
        let builder = ContextWindowBuilder::default();
        let turns = vec![turn(0, Role::User, "Image analysis request", None)];

        let window = builder.assemble(None, &turns, None, Some("data:image/png;base64,AAAA"));
        match &window.messages()[1].content {
            MessageContent::Array(parts) => {
                assert_eq!(
                    parts[0],
                    ContentPart::Text {
                        text: IMAGE_PROMPT_PLACEHOLDER.to_string()
                    }
                );
            },
            other => panic!("expected multi-part content, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_build_takes_most_recent_turns_oldest_first() {
        let store = InMemoryTranscriptStore::new();
        for i in 0..25 {
            store
                .append("p1", NewTurn::user(format!("message {i}"), None))
                .await
                .unwrap();
        }

        let builder = ContextWindowBuilder::default();
        let window = builder
            .build(&store, &project(None), Some("message 24"), None)
            .await
            .unwrap();

        let messages = window.messages();
        assert_eq!(messages.len(), 21);
        assert_eq!(messages.iter().filter(|m| m.role == "system").count(), 1);
        assert_eq!(messages[1].content.as_text(), Some("message 5"));
        assert_eq!(messages[20].content.as_text(), Some("message 24"));
    }
}
