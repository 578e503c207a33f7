/// Why a submit did not produce a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRejection {
    /// A turn is still streaming.
    Disabled,
    Blank,
}

/// Draft state of the follow-up input bar.
#[derive(Debug, Default)]
pub struct MessageInput {
    draft: String,
    disabled: bool,
}

impl MessageInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    /// Takes the draft for sending. A rejected submit keeps the draft.
    pub fn submit(&mut self) -> Result<String, InputRejection> {
        if self.disabled {
            return Err(InputRejection::Disabled);
        }

        let content = self.draft.trim_end_matches(['\r', '\n']);
        if content.trim().is_empty() {
            return Err(InputRejection::Blank);
        }

        let content = content.to_string();
        self.draft.clear();
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_returns_and_clears_draft() {
        let mut input = MessageInput::new();
        input.set_draft("Why is the sky blue?\n");

        assert_eq!(input.submit(), Ok("Why is the sky blue?".to_string()));
        assert_eq!(input.draft(), "");
    }

    #[test]
    fn blank_draft_is_rejected() {
        let mut input = MessageInput::new();
        input.set_draft("  \t\r\n");

        assert_eq!(input.submit(), Err(InputRejection::Blank));
    }

    #[test]
    fn disabled_input_keeps_draft() {
        let mut input = MessageInput::new();
        input.set_draft("next question");
        input.set_disabled(true);

        assert_eq!(input.submit(), Err(InputRejection::Disabled));
        assert_eq!(input.draft(), "next question");

        input.set_disabled(false);
        assert_eq!(input.submit(), Ok("next question".to_string()));
    }
}
