//! AI argument generation port
//!
//! The engine talks to a generator through [`ArgumentGenerator`]; the HTTP
//! implementation and the templated fallback sit behind the same interface,
//! so degrading on provider failure is a swap, not a special case.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde_json::json;
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::types::{Stance, StanceCertainty, Submitter, MAX_ARGUMENT_CHARS};

/// Everything the generator needs to produce one argument.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub topic: String,
    pub stance: Stance,
    pub round: u32,
    pub max_rounds: u32,
    pub personality: String,
    /// Full prior transcript, oldest first.
    pub transcript: Vec<(Stance, Submitter, String)>,
    /// The human opponent's declared certainty; "unsure" asks for a more
    /// exploratory register.
    pub opponent_certainty: Option<StanceCertainty>,
}

#[async_trait]
pub trait ArgumentGenerator: Send + Sync {
    async fn generate(&self, ctx: &GenerationContext) -> anyhow::Result<String>;
}

/// Calls the Anthropic messages API with a bounded timeout.
pub struct HttpGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
}

impl HttpGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn build_prompt(ctx: &GenerationContext) -> (String, String) {
        let mut system = format!(
            "You are debating the topic \"{}\" and you argue {} it. \
             Your persona: {}. Reply with a single argument of at most {} \
             characters. No preamble, no meta commentary.",
            ctx.topic,
            match ctx.stance {
                Stance::For => "FOR",
                Stance::Against => "AGAINST",
            },
            ctx.personality,
            MAX_ARGUMENT_CHARS,
        );
        if ctx.opponent_certainty == Some(StanceCertainty::Unsure) {
            system.push_str(
                " Your opponent is unsure of their own position, so be \
                 exploratory: probe assumptions and offer perspectives rather \
                 than hammering a single line.",
            );
        }

        let mut user = format!(
            "Round {} of {}.",
            ctx.round, ctx.max_rounds
        );
        if ctx.transcript.is_empty() {
            user.push_str(" You open the debate.");
        } else {
            user.push_str(" Transcript so far:\n");
            for (stance, by, text) in &ctx.transcript {
                user.push_str(&format!("[{} / {}] {}\n", stance.as_str(), by.as_str(), text));
            }
            user.push_str("Now give your next argument.");
        }
        (system, user)
    }
}

#[async_trait]
impl ArgumentGenerator for HttpGenerator {
    async fn generate(&self, ctx: &GenerationContext) -> anyhow::Result<String> {
        if self.config.api_key.is_empty() {
            anyhow::bail!("ANTHROPIC_API_KEY not set, generator unavailable");
        }

        let (system, user) = Self::build_prompt(ctx);
        // One deadline covers the whole call: connect, headers, and the body
        // read. A provider that streams the body slowly is cut off too.
        let call = async {
            let response = self
                .client
                .post(&self.config.api_url)
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .json(&json!({
                    "model": self.config.model,
                    "max_tokens": self.config.max_tokens,
                    "system": system,
                    "messages": [{"role": "user", "content": user}],
                }))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                anyhow::bail!("provider returned {}: {}", status, detail);
            }

            let body: serde_json::Value = response.json().await?;
            Ok::<serde_json::Value, anyhow::Error>(body)
        };

        let body = tokio::time::timeout(self.config.request_timeout, call)
            .await
            .map_err(|_| anyhow::anyhow!("generation timed out"))??;

        let text = body["content"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("malformed generator response: {}", body))?
            .trim()
            .to_string();
        if text.is_empty() {
            anyhow::bail!("generator returned empty argument");
        }

        debug!(round = ctx.round, chars = text.chars().count(), "argument generated");
        Ok(text)
    }
}

/// Templated arguments used when the real generator fails or is not
/// configured. Bounded, deterministic in shape, randomized in pick, so a
/// debate never stalls on a provider outage.
pub struct FallbackGenerator;

const FOR_TEMPLATES: &[&str] = &[
    "The strongest case for {topic} is practical: the measurable benefits show up \
     quickly, while the objections tend to rest on worst cases that rarely occur.",
    "Supporting {topic} follows from weighing outcomes. The upside is concrete and \
     near-term; the downside is speculative and manageable with ordinary safeguards.",
    "On {topic}, history favors the affirmative: similar changes drew the same \
     objections, and in hindsight the fears were overstated and the gains real.",
];

const AGAINST_TEMPLATES: &[&str] = &[
    "The case against {topic} starts with irreversibility: once committed, the \
     costs of being wrong are far larger than the benefits of being right.",
    "Opposing {topic} is the prudent reading of the evidence. The claimed benefits \
     assume best-case execution, and the burden of proof sits with the proposal.",
    "On {topic}, the second-order effects cut against it: each supposed gain \
     creates a new dependency or risk the affirmative side has not priced in.",
];

#[async_trait]
impl ArgumentGenerator for FallbackGenerator {
    async fn generate(&self, ctx: &GenerationContext) -> anyhow::Result<String> {
        let templates = match ctx.stance {
            Stance::For => FOR_TEMPLATES,
            Stance::Against => AGAINST_TEMPLATES,
        };
        let template = templates
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| anyhow::anyhow!("no fallback templates"))?;
        Ok(template.replace("{topic}", &ctx.topic))
    }
}

/// Enforce the character ceiling on generator output: cut at the last
/// sentence boundary within the limit, else the last word boundary, else
/// hard at the limit. Input at or under the limit passes through unchanged.
pub fn truncate_to_boundary(text: &str, max_chars: usize) -> String {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }
    let window_end = chars[max_chars].0;
    let window = &text[..window_end];

    let sentence_end = window
        .char_indices()
        .filter(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(i, c)| i + c.len_utf8())
        .last();
    if let Some(end) = sentence_end {
        return window[..end].trim_end().to_string();
    }

    match window.rfind(char::is_whitespace) {
        Some(end) if end > 0 => window[..end].trim_end().to_string(),
        _ => window.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(stance: Stance) -> GenerationContext {
        GenerationContext {
            topic: "school uniforms".to_string(),
            stance,
            round: 1,
            max_rounds: 10,
            personality: "measured analyst".to_string(),
            transcript: Vec::new(),
            opponent_certainty: None,
        }
    }

    #[test]
    fn test_truncate_passthrough_under_limit() {
        assert_eq!(truncate_to_boundary("short text.", 500), "short text.");
        let exact = "a".repeat(500);
        assert_eq!(truncate_to_boundary(&exact, 500), exact);
    }

    #[test]
    fn test_truncate_at_sentence_boundary() {
        let text = format!("First sentence. Second sentence. {}", "x".repeat(500));
        let cut = truncate_to_boundary(&text, 500);
        assert_eq!(cut, "First sentence. Second sentence.");
    }

    #[test]
    fn test_truncate_at_word_boundary() {
        let text = "word ".repeat(200); // 1000 chars, no sentence punctuation
        let cut = truncate_to_boundary(&text, 500);
        assert!(cut.chars().count() <= 500);
        assert!(cut.ends_with("word"));
    }

    #[test]
    fn test_truncate_hard_cut_without_boundaries() {
        let text = "y".repeat(600);
        let cut = truncate_to_boundary(&text, 500);
        assert_eq!(cut.chars().count(), 500);
    }

    #[test]
    fn test_prompt_exploratory_when_unsure() {
        let mut c = ctx(Stance::For);
        c.opponent_certainty = Some(StanceCertainty::Unsure);
        let (system, user) = HttpGenerator::build_prompt(&c);
        assert!(system.contains("exploratory"));
        assert!(system.contains("FOR"));
        assert!(user.contains("You open the debate"));

        c.opponent_certainty = Some(StanceCertainty::Certain);
        let (system, _) = HttpGenerator::build_prompt(&c);
        assert!(!system.contains("exploratory"));
    }

    #[test]
    fn test_prompt_includes_transcript() {
        let mut c = ctx(Stance::Against);
        c.transcript.push((Stance::For, Submitter::Human, "uniforms build equality".into()));
        c.round = 1;
        let (_, user) = HttpGenerator::build_prompt(&c);
        assert!(user.contains("[for / human] uniforms build equality"));
        assert!(user.contains("next argument"));
    }

    #[tokio::test]
    async fn test_fallback_generates_bounded_text() {
        for stance in [Stance::For, Stance::Against] {
            let text = FallbackGenerator.generate(&ctx(stance)).await.unwrap();
            assert!(text.contains("school uniforms"));
            assert!(text.chars().count() <= MAX_ARGUMENT_CHARS);
        }
    }

    #[tokio::test]
    async fn test_http_generator_fails_fast_without_key() {
        let config = GeneratorConfig {
            api_key: String::new(),
            ..GeneratorConfig::default()
        };
        let err = HttpGenerator::new(config)
            .generate(&ctx(Stance::For))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("generator unavailable"));
    }

    #[tokio::test]
    async fn test_generation_call_bounded_by_one_deadline() {
        // A provider that accepts the connection and then goes silent
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_held, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });

        let config = GeneratorConfig {
            api_url: format!("http://{}/v1/messages", addr),
            api_key: "test-key".to_string(),
            request_timeout: std::time::Duration::from_millis(200),
            ..GeneratorConfig::default()
        };
        let start = std::time::Instant::now();
        let err = HttpGenerator::new(config)
            .generate(&ctx(Stance::For))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"), "got: {}", err);
        assert!(start.elapsed() < std::time::Duration::from_secs(5));
    }
}
