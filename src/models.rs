use serde::{Deserialize, Serialize};

pub const MAX_CONTACT_MESSAGE_CHARS: usize = 5000;
pub const MAX_CHAT_MESSAGE_CHARS: usize = 1000;

// Contact form submission
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
    // honeypot: hidden in the form, only bots fill it
    #[serde(default)]
    pub website: Option<String>,
}

impl ContactRequest {
    pub fn is_spam(&self) -> bool {
        self.website.as_deref().is_some_and(|w| !w.trim().is_empty())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() || self.message.trim().is_empty() {
            return Err("name, email and message are required".to_string());
        }
        if !self.email.contains('@') {
            return Err("email address is not valid".to_string());
        }
        if self.message.chars().count() > MAX_CONTACT_MESSAGE_CHARS {
            return Err(format!("message is limited to {MAX_CONTACT_MESSAGE_CHARS} characters"));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ContactResponse {
    pub success: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("message is required".to_string());
        }
        if self.message.chars().count() > MAX_CHAT_MESSAGE_CHARS {
            return Err(format!("message is limited to {MAX_CHAT_MESSAGE_CHARS} characters"));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct ProjectsQuery {
    #[serde(default)]
    pub featured: bool,
}

// OpenAI-compatible chat completion wire format, only the fields we use
#[derive(Serialize, Debug)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<CompletionMessage<'a>>,
}

#[derive(Serialize, Debug)]
pub struct CompletionMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

#[derive(Deserialize, Debug)]
pub struct CompletionChoice {
    pub message: CompletionReply,
}

#[derive(Deserialize, Debug)]
pub struct CompletionReply {
    pub content: String,
}
