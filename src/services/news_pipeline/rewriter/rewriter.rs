//! Calls the chat-completion service to produce a tighter headline for
//! cluster-lead articles, and guards the result with a conservative accept
//! filter before persisting it.

use serde::Serialize;
use sqlx::PgPool;

use crate::error::Result;
use crate::services::news_pipeline::processing::ChatClient;

const REWRITE_WINDOW_DAYS: i64 = 14;
const MAX_TITLE_LEN: usize = 140;

const SYSTEM_PROMPT: &str = "You rewrite news headlines to be shorter and clearer without changing \
their meaning. Respond with the rewritten headline only, no quotes, no commentary. Do not add any \
name, place, organization, or number that is not already present in the supplied title or summary.";

const BANNED_PHRASES: &[&str] = &[
    "click here",
    "you won't believe",
    "shocking",
    "breaking:",
    "exclusive:",
];

#[derive(Debug, Default, Serialize)]
pub struct RewriteResult {
    pub processed: u32,
    pub updated: u32,
    pub skipped: u32,
}

struct Candidate {
    id: i64,
    title: String,
    dek: Option<String>,
}

pub async fn rewrite(pool: &PgPool, chat_client: &ChatClient, limit: u32) -> Result<RewriteResult> {
    let candidates: Vec<Candidate> = sqlx::query_as!(
        Candidate,
        r#"
        SELECT a.id, a.title, a.dek
        FROM articles a
        LEFT JOIN cluster_scores cs ON cs.lead_article_id = a.id
        WHERE a.published_at IS NOT NULL
          AND a.rewritten_title IS NULL
          AND a.published_at > now() - ($1 || ' days')::interval
        ORDER BY (cs.lead_article_id IS NOT NULL) DESC, a.published_at DESC
        LIMIT $2
        "#,
        REWRITE_WINDOW_DAYS,
        limit as i64,
    )
    .fetch_all(pool)
    .await?;

    let mut result = RewriteResult::default();
    for candidate in candidates {
        result.processed += 1;

        let user_message = match &candidate.dek {
            Some(dek) if !dek.is_empty() => format!("Title: {}\nSummary: {}", candidate.title, dek),
            _ => format!("Title: {}", candidate.title),
        };

        let raw = match chat_client.complete(SYSTEM_PROMPT, &user_message).await {
            Ok(text) => text.trim().trim_matches('"').to_string(),
            Err(_) => {
                persist_rejection(pool, candidate.id, None, "chat_completion_failed").await?;
                result.skipped += 1;
                continue;
            }
        };

        match validate(&raw, &candidate.title, candidate.dek.as_deref()) {
            Ok(()) => {
                persist_acceptance(pool, candidate.id, &raw, chat_client.model_id()).await?;
                result.updated += 1;
            }
            Err(reason) => {
                persist_rejection(pool, candidate.id, Some(&raw), reason).await?;
                result.skipped += 1;
            }
        }
    }

    Ok(result)
}

/// Accept iff: not empty, within length, not identical to original, clears
/// the banned-phrase filter, and introduces no proper noun or number absent
/// from the original title + dek.
fn validate(rewritten: &str, original_title: &str, original_dek: Option<&str>) -> std::result::Result<(), &'static str> {
    if rewritten.is_empty() {
        return Err("empty_response");
    }
    if rewritten.chars().count() > MAX_TITLE_LEN {
        return Err("too_long");
    }
    if rewritten.eq_ignore_ascii_case(original_title) {
        return Err("identical_to_original");
    }

    let lowered = rewritten.to_lowercase();
    if BANNED_PHRASES.iter().any(|phrase| lowered.contains(phrase)) {
        return Err("banned_phrase");
    }

    let mut source_text = original_title.to_string();
    if let Some(dek) = original_dek {
        source_text.push(' ');
        source_text.push_str(dek);
    }
    let source_words: std::collections::HashSet<String> = source_text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();

    for (index, word) in rewritten.split_whitespace().enumerate() {
        let cleaned = word.trim_matches(|c: char| !c.is_alphanumeric());
        if cleaned.is_empty() {
            continue;
        }
        let has_digit = cleaned.chars().any(|c| c.is_ascii_digit());
        let is_capitalized = cleaned.chars().next().is_some_and(|c| c.is_uppercase()) && index > 0;

        if (has_digit || is_capitalized) && !source_words.contains(&cleaned.to_lowercase()) {
            return Err(if has_digit {
                "added_number"
            } else {
                "added_proper_noun"
            });
        }
    }

    Ok(())
}

async fn persist_acceptance(pool: &PgPool, article_id: i64, rewritten_title: &str, model: &str) -> Result<()> {
    sqlx::query!(
        r#"
        UPDATE articles
        SET rewritten_title = $1, rewritten_at = now(), rewrite_model = $2, rewrite_notes = NULL
        WHERE id = $3
        "#,
        rewritten_title,
        model,
        article_id,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn persist_rejection(pool: &PgPool, article_id: i64, attempted: Option<&str>, reason: &str) -> Result<()> {
    let notes = match attempted {
        Some(text) => format!("{reason}: {text}"),
        None => reason.to_string(),
    };
    sqlx::query!(
        r#"UPDATE articles SET rewrite_notes = $1 WHERE id = $2"#,
        notes,
        article_id,
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_shorter_reworded_title() {
        let result = validate(
            "IEA: 2030 renewables target still reachable",
            "IEA says 2030 renewables target in reach",
            None,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_added_proper_noun() {
        let result = validate(
            "Bill Gates predicts renewables boom by 2030",
            "IEA says 2030 renewables target in reach",
            None,
        );
        assert_eq!(result, Err("added_proper_noun"));
    }

    #[test]
    fn rejects_identical_title() {
        let result = validate("Same title here", "Same title here", None);
        assert_eq!(result, Err("identical_to_original"));
    }

    #[test]
    fn rejects_overlong_title() {
        let long = "a".repeat(MAX_TITLE_LEN + 1);
        let result = validate(&long, "short title", None);
        assert_eq!(result, Err("too_long"));
    }

    #[test]
    fn rejects_banned_phrase() {
        let result = validate("Shocking new climate data released", "New climate data released", None);
        assert_eq!(result, Err("banned_phrase"));
    }
}
