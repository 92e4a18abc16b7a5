//! Public leaderboard.
//!
//! Scores are recomputed from raw events on every read rather than taken from
//! the cached score table.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::errors::DomainError;
use crate::models::{Account, LeaderboardEntry, SubscriptionTier, TopTool, UsageEvent};
use crate::ports::Stores;
use crate::services::scoring;

pub const DEFAULT_LEADERBOARD_SIZE: i64 = 100;

const TOP_TOOL_COUNT: usize = 3;
const UNMAPPED_NAME_LEN: usize = 12;

/// Known AI tool domains, matched by substring in this order.
const TOOL_NAMES: &[(&str, &str)] = &[
    ("chat.openai.com", "ChatGPT"),
    ("chatgpt.com", "ChatGPT"),
    ("openai.com", "OpenAI"),
    ("claude.ai", "Claude"),
    ("anthropic.com", "Claude"),
    ("gemini.google.com", "Gemini"),
    ("bard.google.com", "Bard"),
    ("google.com", "Google AI"),
    ("perplexity.ai", "Perplexity"),
    ("you.com", "You.com"),
    ("cursor.sh", "Cursor"),
    ("copilot.github.com", "GitHub Copilot"),
    ("github.com", "GitHub"),
    ("poe.com", "Poe"),
    ("huggingface.co", "Hugging Face"),
    ("deepseek.com", "DeepSeek"),
    ("www.deepseek.com", "DeepSeek"),
    ("chat.deepseek.com", "DeepSeek"),
];

/// Display name for a stored domain.
///
/// Unknown domains use their first label with everything but ASCII word
/// characters removed, truncated to 12 characters.
pub fn tool_name(domain: &str) -> String {
    let domain = domain.to_lowercase();
    if let Some((_, name)) = TOOL_NAMES.iter().find(|(key, _)| domain.contains(key)) {
        return (*name).to_string();
    }

    let label: String = domain
        .split('.')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(UNMAPPED_NAME_LEN)
        .collect();
    if label.is_empty() {
        "Unknown".to_string()
    } else {
        label
    }
}

/// Up to three most visited tools, with their share of all visits.
///
/// An event without a visit but with active time counts as one visit here.
pub fn top_tools(events: &[&UsageEvent]) -> Vec<TopTool> {
    let mut counts: HashMap<String, (i64, i64)> = HashMap::new();
    for event in events.iter().filter(|e| !e.domain.trim().is_empty()) {
        let visits = if event.visits > 0 {
            i64::from(event.visits)
        } else if event.active_ms > 0 {
            1
        } else {
            0
        };
        let entry = counts.entry(tool_name(&event.domain)).or_default();
        entry.0 += visits;
        entry.1 += event.active_ms.max(0);
    }

    let visit_total: i64 = counts.values().map(|(visits, _)| visits).sum();
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|(a_name, a), (b_name, b)| {
        b.0.cmp(&a.0)
            .then(b.1.cmp(&a.1))
            .then_with(|| a_name.cmp(b_name))
    });

    ranked
        .into_iter()
        .take(TOP_TOOL_COUNT)
        .map(|(name, (visits, active_ms))| TopTool {
            name,
            visits,
            active_ms,
            percent: if visit_total > 0 {
                (visits as f64 / visit_total as f64 * 100.0).round() as u8
            } else {
                0
            },
        })
        .collect()
}

/// Ranks accounts by their event-derived score, highest first.
pub fn build_leaderboard(
    accounts: &[Account],
    events: &[UsageEvent],
    now: DateTime<Utc>,
) -> Vec<LeaderboardEntry> {
    let mut by_account: HashMap<i64, Vec<&UsageEvent>> = HashMap::new();
    for event in events {
        by_account.entry(event.account_id).or_default().push(event);
    }

    let mut entries: Vec<LeaderboardEntry> = accounts
        .iter()
        .map(|account| {
            let own = by_account.get(&account.id).map(Vec::as_slice).unwrap_or(&[]);
            let score = scoring::aggregate(own.iter().copied(), |_| true).score();
            let is_active = account
                .last_sync_at
                .map_or(false, |at| now - at < Duration::hours(24));

            LeaderboardEntry {
                rank: 0,
                user_id: account.id,
                username: account.public_username(),
                display_name: account.public_display_name(),
                profile_image: account.profile_image.clone(),
                score,
                is_active,
                last_seen: account.last_sync_at.unwrap_or(account.created_at),
                tier: SubscriptionTier::normalize(account.subscription_tier.as_deref()),
                top_tools: top_tools(own),
            }
        })
        .collect();

    entries.sort_by(|a, b| b.score.cmp(&a.score));
    for (idx, entry) in entries.iter_mut().enumerate() {
        entry.rank = idx + 1;
    }
    entries
}

#[derive(Clone)]
pub struct LeaderboardService {
    stores: Stores,
    size: i64,
}

impl LeaderboardService {
    pub fn new(stores: Stores, size: i64) -> Self {
        Self { stores, size }
    }

    pub async fn leaderboard(&self, now: DateTime<Utc>) -> Result<Vec<LeaderboardEntry>, DomainError> {
        let accounts = self.stores.accounts.list_accounts(self.size).await?;
        if accounts.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = accounts.iter().map(|account| account.id).collect();
        let events = self.stores.events.events_for_accounts(&ids).await?;
        let entries = build_leaderboard(&accounts, &events, now);

        tracing::debug!(accounts = entries.len(), events = events.len(), "Built leaderboard");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap()
    }

    fn account(id: i64, username: Option<&str>, last_sync_at: Option<DateTime<Utc>>) -> Account {
        Account {
            id,
            username: username.map(str::to_string),
            display_name: None,
            profile_image: None,
            subscription_tier: Some("pro".to_string()),
            active_device_id: None,
            last_sync_at,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    fn usage(account_id: i64, domain: &str, active_ms: i64, visits: i32) -> UsageEvent {
        UsageEvent {
            id: 0,
            device_id: None,
            account_id,
            occurred_at: now(),
            domain: domain.to_string(),
            active_ms,
            total_ms: active_ms,
            visits,
            client_version: None,
            created_at: now(),
        }
    }

    #[test]
    fn test_tool_name_mapping() {
        assert_eq!(tool_name("chatgpt.com"), "ChatGPT");
        assert_eq!(tool_name("chat.openai.com"), "ChatGPT");
        assert_eq!(tool_name("platform.openai.com"), "OpenAI");
        assert_eq!(tool_name("gemini.google.com"), "Gemini");
        assert_eq!(tool_name("chat.deepseek.com"), "DeepSeek");
        assert_eq!(tool_name("mistral-chat.example.org"), "mistralchat");
        assert_eq!(tool_name("averyveryverylongname.io"), "averyveryver");
        assert_eq!(tool_name("bücher-ai.de"), "bcherai");
        assert_eq!(tool_name("日本.jp"), "Unknown");
    }

    #[test]
    fn test_top_tools_ranking() {
        let events = vec![
            usage(1, "claude.ai", 0, 1),
            usage(1, "claude.ai", 0, 1),
            usage(1, "chatgpt.com", 5_000, 0),
            usage(1, "chat.openai.com", 0, 1),
            usage(1, "perplexity.ai", 100, 1),
            usage(1, "poe.com", 0, 1),
        ];
        let refs: Vec<&UsageEvent> = events.iter().collect();
        let tools = top_tools(&refs);

        assert_eq!(tools.len(), 3);
        assert_eq!(tools[0].name, "ChatGPT");
        assert_eq!(tools[0].visits, 2);
        assert_eq!(tools[1].name, "Claude");
        assert_eq!(tools[2].name, "Perplexity");
        assert_eq!(tools[0].percent, 33);
    }

    #[test]
    fn test_build_leaderboard_ranks_by_event_score() {
        let accounts = vec![
            account(1, Some("alice"), Some(now() - Duration::hours(1))),
            account(2, None, Some(now() - Duration::hours(30))),
            account(3, Some("carol"), None),
        ];
        let events = vec![
            usage(1, "claude.ai", 0, 1),
            usage(2, "claude.ai", 60_000, 2),
        ];

        let board = build_leaderboard(&accounts, &events, now());
        assert_eq!(board.len(), 3);

        assert_eq!(board[0].user_id, 2);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].score, 160);
        assert_eq!(board[0].username, "User2");
        assert!(!board[0].is_active);

        assert_eq!(board[1].user_id, 1);
        assert!(board[1].is_active);
        assert_eq!(board[1].tier, SubscriptionTier::Pro);

        assert_eq!(board[2].score, 0);
        assert_eq!(board[2].rank, 3);
        assert_eq!(board[2].last_seen, accounts[2].created_at);
        assert!(board[2].top_tools.is_empty());
    }
}
