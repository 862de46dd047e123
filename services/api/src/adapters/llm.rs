//! services/api/src/adapters/llm.rs
//!
//! This module contains the adapter for the generative model.
//! It implements the `GenerativeModel` port from the core crate against any
//! OpenAI-compatible chat completions endpoint (Gemini exposes one as well).

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use study_assistant_core::domain::FilePart;
use study_assistant_core::ports::{GenerativeModel, PortError, PortResult};
use tracing::{debug, warn};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `GenerativeModel` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiGenerativeAdapter {
    client: Client<OpenAIConfig>,
}

impl OpenAiGenerativeAdapter {
    pub fn new(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }

    /// Builds the client from an API key and an optional base URL.
    pub fn from_key(api_key: &str, base_url: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = base_url {
            config = config.with_api_base(base);
        }
        Self::new(Client::with_config(config))
    }
}

fn build_error(e: OpenAIError) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Text first, then every attachment inline as a data URI.
fn user_parts(
    instruction: &str,
    attachments: &[FilePart],
) -> PortResult<Vec<ChatCompletionRequestUserMessageContentPart>> {
    let mut parts = Vec::with_capacity(attachments.len() + 1);
    parts.push(
        ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(instruction)
            .build()
            .map_err(build_error)?
            .into(),
    );
    for file in attachments {
        let url = if file.data.starts_with("data:") {
            file.data.clone()
        } else {
            format!("data:{};base64,{}", file.mime_type, file.payload())
        };
        parts.push(
            ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(
                    ImageUrlArgs::default()
                        .url(url)
                        .detail(ImageDetail::High)
                        .build()
                        .map_err(build_error)?,
                )
                .build()
                .map_err(build_error)?
                .into(),
        );
    }
    Ok(parts)
}

//=========================================================================================
// `GenerativeModel` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerativeModel for OpenAiGenerativeAdapter {
    async fn generate_content(
        &self,
        model: &str,
        instruction: &str,
        attachments: &[FilePart],
    ) -> PortResult<String> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(user_parts(instruction, attachments)?)
            .build()
            .map_err(build_error)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(vec![message.into()])
            .n(1)
            .build()
            .map_err(build_error)?;

        debug!(model, attachments = attachments.len(), "Calling chat completions.");
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        match response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
        {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => {
                warn!(model, "Model returned no text.");
                Err(PortError::Unexpected(
                    "The model returned an empty response.".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachments_follow_the_instruction() {
        let files = vec![
            FilePart::from_bytes(b"img", "image/png", "a.png"),
            FilePart {
                data: "cGRm".to_string(),
                mime_type: "application/pdf".to_string(),
                name: "b.pdf".to_string(),
            },
        ];
        let parts = user_parts("prompt", &files).unwrap();
        assert_eq!(parts.len(), 3);
        assert!(matches!(
            parts[0],
            ChatCompletionRequestUserMessageContentPart::Text(_)
        ));
        match &parts[2] {
            ChatCompletionRequestUserMessageContentPart::ImageUrl(image) => {
                assert_eq!(image.image_url.url, "data:application/pdf;base64,cGRm");
            }
            other => panic!("unexpected part: {:?}", other),
        }
    }
}
