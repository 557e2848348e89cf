use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use taskgraph_core::config::ModelConfig;
use taskgraph_core::error::{Result, TaskgraphError};
use taskgraph_core::traits::{AgentCapability, CapabilityFactory, TeamCapability};
use taskgraph_core::types::{AgentSpec, CapabilityOutput, TeamSpec};
use taskgraph_engine::AgentTeam;

/// Chat-completions endpoint for each supported OpenAI-compatible provider.
/// `custom` has no default and needs an explicit `base_url`.
fn provider_endpoint(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("https://api.openai.com/v1/chat/completions"),
        "ollama" => Some("http://localhost:11434/v1/chat/completions"),
        "groq" => Some("https://api.groq.com/openai/v1/chat/completions"),
        "openrouter" => Some("https://openrouter.ai/api/v1/chat/completions"),
        "together" => Some("https://api.together.xyz/v1/chat/completions"),
        "mistral" => Some("https://api.mistral.ai/v1/chat/completions"),
        "deepseek" => Some("https://api.deepseek.com/v1/chat/completions"),
        _ => None,
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Agent backed by an OpenAI-compatible chat-completions endpoint.
/// Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
pub struct ChatAgent {
    name: String,
    instructions: Option<String>,
    model: ModelConfig,
    url: String,
    http: Client,
}

impl ChatAgent {
    fn request_body(&self, task: String) -> ChatRequest {
        let mut messages = Vec::new();
        if let Some(instructions) = &self.instructions {
            messages.push(ChatMessage {
                role: "system",
                content: instructions.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: task,
        });

        ChatRequest {
            model: self.model.model_id.clone(),
            messages,
            max_tokens: self.model.max_tokens,
            temperature: self.model.temperature,
        }
    }

    fn failure(&self, message: impl Into<String>) -> TaskgraphError {
        TaskgraphError::Capability {
            name: self.name.clone(),
            message: message.into(),
        }
    }
}

impl AgentCapability for ChatAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, task: String) -> BoxFuture<'_, Result<CapabilityOutput>> {
        Box::pin(async move {
            let mut req = self.http.post(&self.url).json(&self.request_body(task));
            if let Some(api_key) = &self.model.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            let response = req.send().await.map_err(|e| self.failure(e.to_string()))?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(self.failure(format!("HTTP {}: {}", status, body)));
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| self.failure(e.to_string()))?;
            let content = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| self.failure("response had no content"))?;

            debug!(agent = %self.name, chars = content.len(), "Chat completion received");
            Ok(CapabilityOutput::new(content))
        })
    }
}

/// Builds `ChatAgent`s from the `[model]` config; teams are composed of them.
pub struct ModelCapabilities {
    model: ModelConfig,
    url: String,
    http: Client,
}

impl ModelCapabilities {
    /// Fails for providers that do not speak the OpenAI chat format, and for
    /// `custom` without a `base_url`.
    pub fn new(model: ModelConfig) -> Result<Self> {
        let preset = provider_endpoint(&model.provider);
        if preset.is_none() && model.provider != "custom" {
            return Err(TaskgraphError::Config(format!(
                "unsupported model provider '{}': expected an OpenAI-compatible provider \
                 (openai, ollama, groq, openrouter, together, mistral, deepseek, custom)",
                model.provider
            )));
        }
        let url = model
            .base_url
            .clone()
            .or_else(|| preset.map(String::from))
            .ok_or_else(|| {
                TaskgraphError::Config("provider 'custom' requires model.base_url".into())
            })?;
        debug!(provider = %model.provider, url = %url, "Chat endpoint resolved");

        Ok(Self {
            model,
            url,
            http: Client::new(),
        })
    }

    fn chat_agent(&self, spec: &AgentSpec) -> ChatAgent {
        let mut model = self.model.clone();
        if let Some(model_id) = &spec.model {
            model.model_id = model_id.clone();
        }
        ChatAgent {
            name: spec.name.clone(),
            instructions: spec.instructions.clone(),
            model,
            url: self.url.clone(),
            http: self.http.clone(),
        }
    }
}

impl CapabilityFactory for ModelCapabilities {
    fn create_agent(&self, spec: &AgentSpec) -> Result<Arc<dyn AgentCapability>> {
        Ok(Arc::new(self.chat_agent(spec)))
    }

    fn create_team(&self, spec: &TeamSpec) -> Result<Arc<dyn TeamCapability>> {
        Ok(Arc::new(AgentTeam::build(spec, self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ModelConfig {
        ModelConfig {
            provider: "openai".into(),
            model_id: "gpt-4o-mini".into(),
            api_key: None,
            base_url: None,
            max_tokens: 512,
            temperature: 0.0,
        }
    }

    #[test]
    fn test_request_body_includes_instructions() {
        let factory = ModelCapabilities::new(model()).unwrap();
        let agent = factory.chat_agent(
            &AgentSpec::new("writer").with_instructions("Be brief."),
        );

        let body = serde_json::to_value(agent.request_body("Summarize".into())).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Summarize");
    }

    #[test]
    fn test_model_override() {
        let factory = ModelCapabilities::new(model()).unwrap();
        let spec = AgentSpec {
            model: Some("llama3".into()),
            ..AgentSpec::new("local")
        };

        let agent = factory.chat_agent(&spec);
        assert_eq!(agent.name(), "local");
        let body = serde_json::to_value(agent.request_body("hi".into())).unwrap();
        assert_eq!(body["model"], "llama3");

        let default = factory.chat_agent(&AgentSpec::new("plain"));
        let body = serde_json::to_value(default.request_body("hi".into())).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
    }

    #[test]
    fn test_provider_endpoints() {
        let factory = ModelCapabilities::new(model()).unwrap();
        assert_eq!(factory.url, "https://api.openai.com/v1/chat/completions");

        let ollama = ModelConfig {
            provider: "ollama".into(),
            ..model()
        };
        assert_eq!(
            ModelCapabilities::new(ollama).unwrap().url,
            "http://localhost:11434/v1/chat/completions"
        );

        let overridden = ModelConfig {
            base_url: Some("http://gpu-box:8000/v1/chat/completions".into()),
            ..model()
        };
        assert_eq!(
            ModelCapabilities::new(overridden).unwrap().url,
            "http://gpu-box:8000/v1/chat/completions"
        );
    }

    #[test]
    fn test_rejects_non_openai_providers() {
        let anthropic = ModelConfig {
            provider: "anthropic".into(),
            ..model()
        };
        let err = ModelCapabilities::new(anthropic).err().unwrap();
        assert!(err.to_string().contains("unsupported model provider 'anthropic'"));

        let custom = ModelConfig {
            provider: "custom".into(),
            ..model()
        };
        assert!(ModelCapabilities::new(custom).is_err());

        let custom = ModelConfig {
            provider: "custom".into(),
            base_url: Some("http://localhost:8080/v1/chat/completions".into()),
            ..model()
        };
        assert!(ModelCapabilities::new(custom).is_ok());
    }

    #[test]
    fn test_team_requires_members() {
        let factory = ModelCapabilities::new(model()).unwrap();
        assert!(factory.create_team(&TeamSpec::default()).is_err());
    }
}
