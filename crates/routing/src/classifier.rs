use std::{collections::BTreeMap, sync::Arc};

use {
    anyhow::Context,
    tokio::task::JoinHandle,
    tracing::{debug, info, warn},
};

use {
    supportbot_agents::{ChatMessage, LlmProvider},
    supportbot_config::{CategoriesConfig, DEFAULT_CATEGORY, SupportbotConfig},
    supportbot_protocol::{AiResponseRequest, CALLBACK_PATH, ClassifyResponse, UserId, WorkerRequest},
};

use crate::history::HistoryStore;

pub const CLASSIFIER_SYSTEM_PROMPT: &str = "You are a customer service question classifier. \
Decide which category the user's question belongs to and reply with the category label only.";

/// `source` of answers the classifier sends on its own behalf.
pub const FALLBACK_SOURCE: &str = "classifier";

/// How a label was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The reasoning provider named a configured label.
    Label,
    /// A category keyword appears in the question.
    Keyword,
    /// Nothing matched.
    Default,
}

impl MatchKind {
    pub fn confidence(self) -> f64 {
        match self {
            Self::Label => 0.9,
            Self::Keyword => 0.6,
            Self::Default => 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub kind: MatchKind,
}

// ── Prompt and parsing ───────────────────────────────────────────────────────

pub fn build_prompt(question: &str, history: &[String], categories: &CategoriesConfig) -> String {
    let mut prompt = String::from("Classify the following question.\n\n");
    if !history.is_empty() {
        prompt.push_str("Conversation history:\n");
        for h in history {
            prompt.push_str(h);
            prompt.push('\n');
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!("User question: {question}\n\n"));
    prompt.push_str("Categories:\n");
    for (label, category) in categories.iter() {
        prompt.push_str(&format!("- {label}: {}\n", category.description));
    }
    prompt.push_str("\nReply with the category label only, one word.");
    prompt
}

/// The first configured label contained in `reply`, ignoring case.
pub fn parse_label(reply: &str, categories: &CategoriesConfig) -> Option<String> {
    let reply = reply.to_lowercase();
    categories
        .iter()
        .find(|(label, _)| reply.contains(&label.to_lowercase()))
        .map(|(label, _)| label.clone())
}

/// The category whose keywords occur most often in `question`; ties go to
/// the first label.
pub fn keyword_match(question: &str, categories: &CategoriesConfig) -> Option<String> {
    let text = normalize(question);
    let mut best: Option<(&String, usize)> = None;
    for (label, category) in categories.iter() {
        let hits = category
            .keywords
            .iter()
            .filter(|k| contains_keyword(&text, k))
            .count();
        if hits > 0 && best.is_none_or(|(_, n)| hits > n) {
            best = Some((label, hits));
        }
    }
    best.map(|(label, _)| label.clone())
}

/// Lowercase, words separated by single spaces, padded on both ends.
fn normalize(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

fn contains_keyword(normalized: &str, keyword: &str) -> bool {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return false;
    }
    if keyword.is_ascii() {
        // Whole words only, so "hi" does not match "shipping".
        normalized.contains(&normalize(keyword))
    } else {
        normalized.contains(&keyword.to_lowercase())
    }
}

// ── Classifier ───────────────────────────────────────────────────────────────

/// Labels questions and forwards them to the worker for their category.
pub struct Classifier {
    provider: Arc<dyn LlmProvider>,
    categories: CategoriesConfig,
    routes: BTreeMap<String, String>,
    history: HistoryStore,
    client: reqwest::Client,
    callback_url: Arc<str>,
    failure_message: Arc<str>,
}

impl Classifier {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &SupportbotConfig) -> Self {
        let routes = config
            .categories
            .iter()
            .filter_map(|(label, _)| Some((label.clone(), config.route_for(label)?)))
            .collect();
        Self {
            provider,
            categories: config.categories.clone(),
            routes,
            history: HistoryStore::default(),
            client: reqwest::Client::new(),
            callback_url: format!(
                "{}{CALLBACK_PATH}",
                config.services.gateway.trim_end_matches('/')
            )
            .into(),
            failure_message: config.gateway.dispatch_failure_message.as_str().into(),
        }
    }

    pub fn with_history(mut self, history: HistoryStore) -> Self {
        self.history = history;
        self
    }

    pub fn route_of(&self, label: &str) -> Option<&str> {
        self.routes.get(label).map(String::as_str)
    }

    /// Label a question. Never fails: a provider error falls back to keyword
    /// matching and then to the default category.
    pub async fn classify(&self, user_id: UserId, question: &str) -> Classification {
        let history = self.history.recent(user_id).await;
        let prompt = build_prompt(question, &history, &self.categories);
        let messages = [
            ChatMessage::system(CLASSIFIER_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];

        let from_provider = match self.provider.complete(&messages, &[]).await {
            Ok(resp) => {
                let reply = resp.text.unwrap_or_default();
                debug!(user_id, reply = %reply, "classifier reply");
                parse_label(&reply, &self.categories)
            },
            Err(e) => {
                warn!(user_id, error = %e, "classification call failed, using keywords");
                None
            },
        };

        let result = if let Some(label) = from_provider {
            Classification {
                label,
                kind: MatchKind::Label,
            }
        } else if let Some(label) = keyword_match(question, &self.categories) {
            Classification {
                label,
                kind: MatchKind::Keyword,
            }
        } else {
            Classification {
                label: DEFAULT_CATEGORY.to_string(),
                kind: MatchKind::Default,
            }
        };

        self.history.push(user_id, question).await;
        info!(user_id, category = %result.label, kind = ?result.kind, "question classified");
        result
    }

    /// Classify, answer, and forward the question to its worker in the
    /// background.
    pub async fn classify_and_route(&self, user_id: UserId, question: &str) -> ClassifyResponse {
        let result = self.classify(user_id, question).await;
        self.route(user_id, question, &result.label);
        ClassifyResponse {
            description: self
                .categories
                .get(&result.label)
                .map(|c| c.description.clone())
                .unwrap_or_default(),
            confidence: result.kind.confidence(),
            category: result.label,
        }
    }

    /// Post the job to the category's worker in a spawned task. If the
    /// worker cannot take it, the user gets the failure message through the
    /// gateway callback instead. Returns `None` when the category has no
    /// route.
    pub fn route(&self, user_id: UserId, question: &str, label: &str) -> Option<JoinHandle<()>> {
        let Some(url) = self.routes.get(label).cloned() else {
            warn!(category = %label, "no worker route for category");
            return None;
        };
        let client = self.client.clone();
        let callback_url = Arc::clone(&self.callback_url);
        let failure_message = Arc::clone(&self.failure_message);
        let body = WorkerRequest {
            user_id,
            question: question.to_string(),
            category: Some(label.to_string()),
        };
        let label = label.to_string();
        Some(tokio::spawn(async move {
            let Err(e) = post_job(&client, &url, &body).await else {
                info!(user_id, category = %label, %url, "job handed to worker");
                return;
            };
            warn!(user_id, category = %label, %url, error = %e, "worker dispatch failed");
            let fallback = AiResponseRequest {
                user_id,
                content: failure_message.to_string(),
                source: FALLBACK_SOURCE.to_string(),
            };
            if let Err(e) = post_job(&client, &callback_url, &fallback).await {
                warn!(user_id, error = %e, "could not deliver fallback answer");
            }
        }))
    }
}

async fn post_job<T: serde::Serialize>(
    client: &reqwest::Client,
    url: &str,
    body: &T,
) -> anyhow::Result<()> {
    client
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("{url} unreachable"))?
        .error_for_status()
        .with_context(|| format!("{url} rejected the request"))?;
    Ok(())
}
