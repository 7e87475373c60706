//! Conversation directory
//!
//! Paged, searchable list of conversation metadata. The directory owns the
//! locally known conversations, loads further pages on demand, and keeps
//! each entry's message count and preview in step with the transcript after
//! every exchange.
//!
//! Grouping by age compares calendar days in the caller's time zone:
//!
//! | Days before today | Group       |
//! |-------------------|-------------|
//! | 0 (or future)     | Today       |
//! | 1                 | Yesterday   |
//! | 2..=7             | This Week   |
//! | more than 7       | Older       |

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::backend::{ChatBackend, CreateConversation, ListQuery};
use crate::config::ChatConfig;
use crate::error::{DocuchatError, Result};
use crate::text::{single_line, truncate_with_ellipsis, TitleUnit};
use crate::transcript::TranscriptStore;
use crate::types::Conversation;

/// Inclusive bounds on a conversation's last-update time
///
/// A missing bound leaves that side open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    /// Earliest accepted update time
    pub start: Option<DateTime<Utc>>,
    /// Latest accepted update time
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Range with both bounds set
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// True when `at` lies within the range, bounds included
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at <= end)
    }
}

/// Age bucket of a conversation relative to "now"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgeGroup {
    /// Updated today
    Today,
    /// Updated yesterday
    Yesterday,
    /// Updated two to seven days ago
    ThisWeek,
    /// Updated more than a week ago
    Older,
}

impl AgeGroup {
    /// Heading shown above the group
    pub fn label(&self) -> &'static str {
        match self {
            AgeGroup::Today => "Today",
            AgeGroup::Yesterday => "Yesterday",
            AgeGroup::ThisWeek => "This Week",
            AgeGroup::Older => "Older",
        }
    }

    /// Bucket for a conversation last updated on `date` when it is `today`
    pub fn for_dates(date: NaiveDate, today: NaiveDate) -> Self {
        match today.signed_duration_since(date).num_days() {
            days if days <= 0 => AgeGroup::Today,
            1 => AgeGroup::Yesterday,
            2..=7 => AgeGroup::ThisWeek,
            _ => AgeGroup::Older,
        }
    }
}

impl std::fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Conversations sharing one age bucket, most recent first
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationGroup {
    /// The bucket
    pub group: AgeGroup,
    /// Members of the bucket
    pub conversations: Vec<Conversation>,
}

/// Splits `conversations` into age buckets relative to `now`
///
/// Buckets appear in Today, Yesterday, This Week, Older order; empty
/// buckets are omitted. Calendar days are taken in `now`'s time zone.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use docuchat::directory::{group_by_age, AgeGroup};
/// use docuchat::types::Conversation;
///
/// let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
/// let mut recent = Conversation::new("a", "Recent", None);
/// recent.updated_at = now;
/// let mut old = Conversation::new("b", "Old", None);
/// old.updated_at = now - Duration::days(40);
///
/// let groups = group_by_age(&[recent, old], &now);
/// assert_eq!(groups.len(), 2);
/// assert_eq!(groups[0].group, AgeGroup::Today);
/// assert_eq!(groups[1].group, AgeGroup::Older);
/// ```
pub fn group_by_age<Tz: TimeZone>(
    conversations: &[Conversation],
    now: &DateTime<Tz>,
) -> Vec<ConversationGroup> {
    let tz = now.timezone();
    let today = now.date_naive();

    let mut groups: Vec<ConversationGroup> = [
        AgeGroup::Today,
        AgeGroup::Yesterday,
        AgeGroup::ThisWeek,
        AgeGroup::Older,
    ]
    .into_iter()
    .map(|group| ConversationGroup {
        group,
        conversations: Vec::new(),
    })
    .collect();

    for conversation in conversations {
        let local_date = conversation.updated_at.with_timezone(&tz).date_naive();
        let bucket = AgeGroup::for_dates(local_date, today);
        if let Some(group) = groups.iter_mut().find(|g| g.group == bucket) {
            group.conversations.push(conversation.clone());
        }
    }

    groups.retain(|g| !g.conversations.is_empty());
    groups
}

/// Derives a conversation title from the first user message
///
/// The content is collapsed to one line and truncated to `max` units with an
/// ellipsis when longer.
pub fn derive_title(content: &str, max: usize, unit: TitleUnit) -> String {
    truncate_with_ellipsis(&single_line(content.trim()), max, unit)
}

/// Result of deleting a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Some other conversation was removed
    Removed,
    /// The active conversation was removed; the caller must start afresh
    ActiveRemoved,
}

/// Locally known conversation metadata with paging state
#[derive(Debug, Clone)]
pub struct ConversationDirectory {
    conversations: Vec<Conversation>,
    page_size: usize,
    owner_id: Option<String>,
    title_max_len: usize,
    title_unit: TitleUnit,
    preview_max_len: usize,
    has_more: bool,
    total: Option<usize>,
    /// Ids received through list pages; their count is the next offset
    listed: HashSet<String>,
}

impl ConversationDirectory {
    /// Creates an empty directory using the `chat` configuration
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            conversations: Vec::new(),
            page_size: config.page_size.max(1),
            owner_id: config.owner_id.clone(),
            title_max_len: config.title_max_len,
            title_unit: config.title_unit,
            preview_max_len: config.preview_max_len,
            has_more: false,
            total: None,
            listed: HashSet::new(),
        }
    }

    /// Replaces the list with the most recent page
    pub async fn load_first_page(&mut self, backend: &dyn ChatBackend) -> Result<()> {
        let page = backend
            .list_conversations(&ListQuery {
                user_id: self.owner_id.clone(),
                limit: self.page_size,
                offset: 0,
            })
            .await?;
        tracing::debug!(
            count = page.conversations.len(),
            total = page.total,
            "Loaded first conversation page"
        );
        self.has_more = page.conversations.len() == self.page_size;
        self.total = Some(page.total);
        self.listed = page.conversations.iter().map(|c| c.id.clone()).collect();
        self.conversations = page.conversations;
        self.sort();
        Ok(())
    }

    /// Appends the next page; returns how many new conversations arrived
    ///
    /// The offset counts only conversations received from earlier pages, so
    /// entries added locally (created, or selected before they were listed)
    /// never shift it. Conversations already present are not duplicated.
    pub async fn load_more(&mut self, backend: &dyn ChatBackend) -> Result<usize> {
        if !self.has_more {
            return Ok(0);
        }
        let page = backend
            .list_conversations(&ListQuery {
                user_id: self.owner_id.clone(),
                limit: self.page_size,
                offset: self.listed.len(),
            })
            .await?;
        self.has_more = page.conversations.len() == self.page_size;
        self.total = Some(page.total);

        let mut added = 0;
        for conversation in page.conversations {
            self.listed.insert(conversation.id.clone());
            if self.get(&conversation.id).is_none() {
                self.conversations.push(conversation);
                added += 1;
            }
        }
        self.sort();
        tracing::debug!(added, "Loaded more conversations");
        Ok(added)
    }

    /// Creates a conversation titled from `first_message` and lists it first
    pub async fn create(
        &mut self,
        backend: &dyn ChatBackend,
        first_message: &str,
    ) -> Result<Conversation> {
        let title = derive_title(first_message, self.title_max_len, self.title_unit);
        let id = backend
            .create_conversation(&CreateConversation {
                title: title.clone(),
                user_id: self.owner_id.clone(),
            })
            .await?;
        tracing::info!(conversation_id = %id, title = %title, "Created conversation");

        let conversation = Conversation::new(id, title, self.owner_id.clone());
        self.conversations.insert(0, conversation.clone());
        if let Some(total) = self.total.as_mut() {
            *total += 1;
        }
        Ok(conversation)
    }

    /// Deletes a conversation on the backend and locally
    ///
    /// `active` is the id of the conversation currently shown, if any. A
    /// conversation the backend no longer knows counts as deleted.
    pub async fn delete(
        &mut self,
        backend: &dyn ChatBackend,
        id: &str,
        active: Option<&str>,
    ) -> Result<DeleteOutcome> {
        if let Err(e) = backend.delete_conversation(id).await {
            match e.downcast_ref::<DocuchatError>() {
                Some(DocuchatError::NotFound(_)) => {
                    tracing::warn!(conversation_id = %id, "Conversation already gone on the backend");
                }
                _ => return Err(e),
            }
        }
        self.listed.remove(id);
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.conversations.len() < before {
            if let Some(total) = self.total.as_mut() {
                *total = total.saturating_sub(1);
            }
        }
        tracing::info!(conversation_id = %id, "Deleted conversation");

        if active == Some(id) {
            Ok(DeleteOutcome::ActiveRemoved)
        } else {
            Ok(DeleteOutcome::Removed)
        }
    }

    /// Brings the entry for `id` in line with `transcript`
    ///
    /// Sets the message count and preview from the transcript, stamps the
    /// update time and moves the entry to the front.
    pub fn record_exchange(&mut self, id: &str, transcript: &TranscriptStore) {
        let Some(position) = self.conversations.iter().position(|c| c.id == id) else {
            tracing::debug!(conversation_id = %id, "Exchange for unlisted conversation");
            return;
        };
        let mut conversation = self.conversations.remove(position);
        conversation.message_count = transcript.len();
        conversation.last_message = transcript.last().map(|m| {
            truncate_with_ellipsis(
                &single_line(&m.content),
                self.preview_max_len,
                TitleUnit::Chars,
            )
        });
        conversation.updated_at = Utc::now();
        self.conversations.insert(0, conversation);
    }

    /// Inserts or refreshes metadata for a conversation loaded elsewhere
    pub fn upsert(&mut self, mut conversation: Conversation) {
        conversation.messages = None;
        match self.conversations.iter_mut().find(|c| c.id == conversation.id) {
            Some(existing) => *existing = conversation,
            None => self.conversations.push(conversation),
        }
        self.sort();
    }

    /// Conversations whose title or preview contains `text`, ignoring case
    pub fn search(&self, text: &str) -> Vec<Conversation> {
        self.filter(text, None)
    }

    /// Conversations last updated within `range`
    pub fn filter_by_date_range(&self, range: &DateRange) -> Vec<Conversation> {
        self.filter("", Some(range))
    }

    /// Combined text and date filter, most recently updated first
    ///
    /// An empty `text` matches everything.
    pub fn filter(&self, text: &str, range: Option<&DateRange>) -> Vec<Conversation> {
        let needle = text.trim().to_lowercase();
        let mut matches: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|c| needle.is_empty() || matches_query(c, &needle))
            .filter(|c| range.map_or(true, |r| r.contains(c.updated_at)))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        matches
    }

    /// Buckets the given conversations by age relative to `now`
    pub fn group<Tz: TimeZone>(
        &self,
        filtered: &[Conversation],
        now: &DateTime<Tz>,
    ) -> Vec<ConversationGroup> {
        group_by_age(filtered, now)
    }

    /// Looks up one conversation
    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// All known conversations, most recently updated first
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// True when the last page was full
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Total reported by the backend, when a page has been loaded
    pub fn total(&self) -> Option<usize> {
        self.total
    }

    fn sort(&mut self) {
        self.conversations
            .sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    }
}

fn matches_query(conversation: &Conversation, needle: &str) -> bool {
    conversation.title.to_lowercase().contains(needle)
        || conversation
            .last_message
            .as_deref()
            .is_some_and(|preview| preview.to_lowercase().contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ConversationPage, MockChatBackend};
    use crate::types::Message;
    use crate::test_utils::{chat_config, conversation_at as conversation, fixed_now as noon};
    use chrono::{Duration, FixedOffset};

    fn directory_with(conversations: Vec<Conversation>) -> ConversationDirectory {
        let mut directory = ConversationDirectory::new(&chat_config(20));
        for c in conversations {
            directory.upsert(c);
        }
        directory
    }

    #[test]
    fn test_group_by_age_one_entry_per_bucket() {
        let now = noon();
        let items = vec![
            conversation("t0", "now", now),
            conversation("t1", "yesterday", now - Duration::hours(25)),
            conversation("t3", "days", now - Duration::days(3)),
            conversation("t40", "old", now - Duration::days(40)),
        ];
        let groups = group_by_age(&items, &now);
        let labels: Vec<&str> = groups.iter().map(|g| g.group.label()).collect();
        assert_eq!(labels, vec!["Today", "Yesterday", "This Week", "Older"]);
        assert!(groups.iter().all(|g| g.conversations.len() == 1));
    }

    #[test]
    fn test_group_by_age_omits_empty_buckets() {
        let now = noon();
        let items = vec![
            conversation("a", "a", now - Duration::days(10)),
            conversation("b", "b", now - Duration::days(30)),
        ];
        let groups = group_by_age(&items, &now);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group, AgeGroup::Older);
        assert_eq!(groups[0].conversations.len(), 2);
    }

    #[test]
    fn test_group_by_age_uses_calendar_days_in_callers_zone() {
        // 23:30 UTC on the 9th is already the 10th at UTC+2.
        let late = Utc.with_ymd_and_hms(2024, 5, 9, 23, 30, 0).unwrap();
        let items = vec![conversation("a", "a", late)];

        let utc_now = noon();
        assert_eq!(group_by_age(&items, &utc_now)[0].group, AgeGroup::Yesterday);

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let local_now = utc_now.with_timezone(&plus_two);
        assert_eq!(group_by_age(&items, &local_now)[0].group, AgeGroup::Today);
    }

    #[test]
    fn test_age_group_boundaries() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let days_ago = |n: i64| today - Duration::days(n);
        assert_eq!(AgeGroup::for_dates(today + Duration::days(1), today), AgeGroup::Today);
        assert_eq!(AgeGroup::for_dates(days_ago(2), today), AgeGroup::ThisWeek);
        assert_eq!(AgeGroup::for_dates(days_ago(7), today), AgeGroup::ThisWeek);
        assert_eq!(AgeGroup::for_dates(days_ago(8), today), AgeGroup::Older);
    }

    #[test]
    fn test_filter_matches_title_or_preview_case_insensitively() {
        let now = noon();
        let mut with_preview = conversation("p", "Budget", now - Duration::hours(2));
        with_preview.last_message = Some("See the QUARTERLY report".to_string());
        let directory = directory_with(vec![
            conversation("t", "Quarterly planning", now - Duration::hours(5)),
            with_preview,
            conversation("x", "Unrelated", now),
        ]);

        let ids: Vec<String> = directory
            .search("quarterly")
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["p", "t"]);
    }

    #[test]
    fn test_filter_combines_text_and_inclusive_range() {
        let now = noon();
        let directory = directory_with(vec![
            conversation("a", "report one", now - Duration::days(1)),
            conversation("b", "report two", now - Duration::days(5)),
            conversation("c", "notes", now - Duration::days(1)),
        ]);
        let range = DateRange::between(now - Duration::days(1), now);

        let ids: Vec<String> = directory
            .filter("report", Some(&range))
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn test_filter_by_date_range_sorted_descending() {
        let now = noon();
        let directory = directory_with(vec![
            conversation("old", "x", now - Duration::days(3)),
            conversation("new", "y", now - Duration::days(1)),
            conversation("out", "z", now - Duration::days(9)),
        ]);
        let range = DateRange {
            start: Some(now - Duration::days(3)),
            end: None,
        };
        let ids: Vec<String> = directory
            .filter_by_date_range(&range)
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_derive_title_truncates_with_ellipsis() {
        let long = "a".repeat(60);
        let title = derive_title(&long, 50, TitleUnit::Chars);
        assert_eq!(title, format!("{}...", "a".repeat(50)));
        assert_eq!(derive_title("  Short\nquestion ", 50, TitleUnit::Chars), "Short question");
    }

    #[test]
    fn test_record_exchange_updates_count_preview_and_order() {
        let now = noon();
        let mut directory = directory_with(vec![
            conversation("a", "first", now - Duration::days(2)),
            conversation("b", "second", now - Duration::days(1)),
        ]);
        let mut transcript = TranscriptStore::new();
        transcript.append(Message::user("Q"));
        transcript.append(Message::assistant("The answer", vec![]));

        directory.record_exchange("a", &transcript);

        let first = &directory.conversations()[0];
        assert_eq!(first.id, "a");
        assert_eq!(first.message_count, 2);
        assert_eq!(first.last_message.as_deref(), Some("The answer"));
    }

    #[tokio::test]
    async fn test_load_more_concatenates_and_tracks_has_more() {
        let now = noon();
        let mut backend = MockChatBackend::new();
        backend
            .expect_list_conversations()
            .withf(|q| q.offset == 0 && q.limit == 2)
            .returning(move |_| {
                Ok(ConversationPage {
                    conversations: vec![
                        conversation("a", "a", now),
                        conversation("b", "b", now - Duration::hours(1)),
                    ],
                    total: 3,
                })
            });
        backend
            .expect_list_conversations()
            .withf(|q| q.offset == 2)
            .returning(move |_| {
                Ok(ConversationPage {
                    conversations: vec![conversation("c", "c", now - Duration::hours(2))],
                    total: 3,
                })
            });

        let mut directory = ConversationDirectory::new(&chat_config(2));
        directory.load_first_page(&backend).await.unwrap();
        assert!(directory.has_more());

        let added = directory.load_more(&backend).await.unwrap();
        assert_eq!(added, 1);
        assert!(!directory.has_more());
        assert_eq!(directory.conversations().len(), 3);
        assert_eq!(directory.total(), Some(3));

        // No further request once the last page was short.
        assert_eq!(directory.load_more(&backend).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_load_more_offset_ignores_locally_added_entries() {
        let now = noon();
        let mut backend = MockChatBackend::new();
        backend
            .expect_list_conversations()
            .withf(|q| q.offset == 0)
            .returning(move |_| {
                Ok(ConversationPage {
                    conversations: vec![
                        conversation("a", "a", now),
                        conversation("b", "b", now - Duration::hours(1)),
                    ],
                    total: 5,
                })
            });
        backend
            .expect_list_conversations()
            .withf(|q| q.offset == 2)
            .times(1)
            .returning(move |_| {
                Ok(ConversationPage {
                    conversations: vec![
                        conversation("c", "c", now - Duration::hours(2)),
                        conversation("d", "d", now - Duration::hours(3)),
                    ],
                    total: 5,
                })
            });

        let mut directory = ConversationDirectory::new(&chat_config(2));
        directory.load_first_page(&backend).await.unwrap();
        directory.upsert(conversation("e", "e", now - Duration::hours(4)));

        assert_eq!(directory.load_more(&backend).await.unwrap(), 2);
        assert!(directory.get("c").is_some());
    }

    #[tokio::test]
    async fn test_delete_of_conversation_gone_on_backend_still_removes() {
        let mut backend = MockChatBackend::new();
        backend.expect_delete_conversation().returning(|id| {
            Err(crate::error::DocuchatError::NotFound(format!("conversation {}", id)).into())
        });

        let mut directory = directory_with(vec![conversation("a", "a", noon())]);
        let outcome = directory.delete(&backend, "a", Some("a")).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::ActiveRemoved);
        assert!(directory.get("a").is_none());
    }

    #[tokio::test]
    async fn test_delete_reports_active_removal() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_delete_conversation()
            .times(2)
            .returning(|_| Ok(()));

        let now = noon();
        let mut directory = directory_with(vec![
            conversation("a", "a", now),
            conversation("b", "b", now),
        ]);

        let outcome = directory.delete(&backend, "a", Some("b")).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Removed);
        let outcome = directory.delete(&backend, "b", Some("b")).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::ActiveRemoved);
        assert!(directory.conversations().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_entry() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_delete_conversation()
            .returning(|_| Err(crate::error::DocuchatError::Backend("down".to_string()).into()));

        let mut directory = directory_with(vec![conversation("a", "a", noon())]);
        assert!(directory.delete(&backend, "a", None).await.is_err());
        assert_eq!(directory.conversations().len(), 1);
    }

    #[tokio::test]
    async fn test_create_titles_and_lists_first() {
        let mut backend = MockChatBackend::new();
        backend
            .expect_create_conversation()
            .withf(|req| req.title == "Summarize chapter 1")
            .returning(|_| Ok("conv-9".to_string()));

        let mut directory = directory_with(vec![conversation("a", "a", noon())]);
        let created = directory
            .create(&backend, "Summarize chapter 1")
            .await
            .unwrap();
        assert_eq!(created.id, "conv-9");
        assert_eq!(directory.conversations()[0].id, "conv-9");
    }
}
