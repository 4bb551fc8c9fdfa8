mod config;

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assistant_core::ports::{CompletionError, CompletionPort};
use assistant_core::session::SessionId;
use assistant_core::{Assistant, AssistantConfig};
use fmp::FmpClient;
use llm::{ChatMessage, ChatOptions, Client as LlmClient, LlmError, Provider};

use config::Config;

/// Bridges the engine's completion port onto the Groq client.
struct LlmCompletion {
    client: LlmClient,
    timeout: Duration,
}

#[async_trait]
impl CompletionPort for LlmCompletion {
    async fn complete(
        &self,
        prompt: &str,
        context: Option<&str>,
        json: bool,
    ) -> Result<String, CompletionError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(context) = context {
            messages.push(ChatMessage::system(context));
        }
        messages.push(ChatMessage::user(prompt));

        let opts = ChatOptions {
            temperature: Some(0.0),
            json_object: json,
            timeout: self.timeout,
        };
        self.client
            .chat(&messages, opts)
            .await
            .map_err(|e| match e {
                LlmError::Transport(m) => CompletionError::Unavailable(m),
                LlmError::Api { status, body } => {
                    CompletionError::Unavailable(format!("provider returned {}: {}", status, body))
                }
                LlmError::Malformed(m) => CompletionError::Unavailable(m),
                LlmError::MissingKey(k) => CompletionError::Unavailable(format!("{} not set", k)),
            })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "assistant=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let llm = LlmClient::new(
        Provider::Groq,
        config.groq_api_key.clone(),
        config.groq_model.clone(),
    )?;
    info!(model = llm.model(), "completion client ready");

    let completion = LlmCompletion {
        client: llm,
        timeout,
    };
    let market = FmpClient::new(config.fmp_api_key.clone())
        .map_err(|e| anyhow::anyhow!("market data client: {}", e))?;

    let assistant = Assistant::with_config(
        completion,
        market,
        AssistantConfig {
            request_timeout: timeout,
        },
    );

    let user = std::env::var("USER").unwrap_or_else(|_| "local".to_string());
    let session = SessionId::new(user);
    info!(session = %session.key(), "session started");

    println!("Financial assistant ready. Ask about a company, or type /quit.");
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                assistant.reset(&session).await;
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        match assistant.handle(&session, line).await {
            Ok(payload) => println!("{}\n", payload.text),
            Err(e) => eprintln!("error: {}\n", e),
        }
    }

    Ok(())
}
