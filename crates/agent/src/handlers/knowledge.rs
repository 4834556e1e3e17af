use tracing::warn;

use concierge_core::domain::intent::IntentType;
use concierge_core::domain::knowledge::KnowledgeArticle;
use concierge_core::ChatResponse;

use super::{HandlerOutcome, HandlerServices, TurnContext};

const MAX_ARTICLES: usize = 2;
const EXCERPT_CHARS: usize = 280;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "how", "what", "who", "can", "does", "with", "you", "your", "are",
    "about", "there", "here", "this", "that", "tell", "need", "want", "know", "get", "into",
    "from", "have", "has", "any", "should", "would", "could", "where", "when", "which", "north",
    "cyprus", "trnc",
];

/// Lowercase words of three or more letters that carry meaning.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in query
        .split(|character: char| !character.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() >= 3 && !STOPWORDS.contains(&word.as_str()))
    {
        if !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

fn excerpt(article: &KnowledgeArticle) -> String {
    let body = article.body.trim();
    if body.chars().count() <= EXCERPT_CHARS {
        return body.to_string();
    }
    let cut: String = body.chars().take(EXCERPT_CHARS).collect();
    match cut.rfind(". ") {
        Some(end) => cut[..=end].to_string(),
        None => format!("{}...", cut.trim_end()),
    }
}

pub async fn handle(
    services: &HandlerServices,
    turn: &TurnContext<'_>,
    query: &str,
) -> HandlerOutcome {
    let terms = query_terms(query);
    let articles = if terms.is_empty() {
        Vec::new()
    } else {
        match services.knowledge.search(&terms, MAX_ARTICLES).await {
            Ok(articles) => articles,
            Err(error) => {
                warn!(
                    event_name = "knowledge.search_failed",
                    conversation_id = %turn.conversation_id,
                    error = %error,
                );
                Vec::new()
            }
        }
    };

    let message = if articles.is_empty() {
        "I don't have an article on that yet. Could you rephrase, or ask me about residency, \
         banking or utilities?"
            .to_string()
    } else {
        let sections: Vec<String> = articles
            .iter()
            .map(|article| format!("**{}**\n{}", article.title, excerpt(article)))
            .collect();
        format!("Here's what I found:\n\n{}", sections.join("\n\n"))
    };

    HandlerOutcome::reply(
        Some(IntentType::KnowledgeQuery),
        ChatResponse::text(message, turn.language),
    )
}
