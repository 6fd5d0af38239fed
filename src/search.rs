//! Search-as-you-type
//!
//! Keystrokes only move a deadline; the filter is applied once input has
//! been quiet for the debounce delay. The event loop calls
//! [`SearchController::poll`] on every tick, so no timer thread is needed.
//! Enter skips the wait and also records the query in the search history.

use std::time::{Duration, Instant};

use crate::error::StoreError;
use crate::events::{AppEvent, EventBus};
use crate::kv::KeyValueStore;
use crate::record::PromptRecord;
use crate::settings::Settings;
use crate::storage::Storage;
use crate::tree::{compare_titles, TreeView};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchRequest {
    Apply(String),
    Clear,
}

impl SearchRequest {
    fn for_query(query: &str) -> Self {
        let query = query.trim();
        if query.is_empty() {
            SearchRequest::Clear
        } else {
            SearchRequest::Apply(query.to_string())
        }
    }
}

/// Ids of records matching `query`, best first
pub fn rank(records: &[PromptRecord], query: &str) -> Vec<String> {
    let mut hits: Vec<(&PromptRecord, u32)> = records
        .iter()
        .filter(|r| r.matches_query(query))
        .map(|r| (r, r.relevance_score(query)))
        .collect();
    hits.sort_by(|(a, score_a), (b, score_b)| {
        score_b
            .cmp(score_a)
            .then_with(|| compare_titles(&a.title, &b.title))
    });
    hits.into_iter().map(|(r, _)| r.id.clone()).collect()
}

pub struct SearchController {
    query: String,
    debounce: Duration,
    deadline: Option<Instant>,
    events: EventBus,
}

impl SearchController {
    pub fn new(debounce: Duration, events: EventBus) -> Self {
        Self {
            query: String::new(),
            debounce,
            deadline: None,
            events,
        }
    }

    pub fn from_settings(settings: &Settings, events: EventBus) -> Self {
        Self::new(Duration::from_millis(settings.search_debounce_ms), events)
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_debounce(&mut self, debounce: Duration) {
        self.debounce = debounce;
    }

    /// A search is scheduled but has not fired yet
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Replace the query text and restart the debounce window
    pub fn input(&mut self, text: impl Into<String>, now: Instant) {
        self.query = text.into();
        self.deadline = Some(now + self.debounce);
    }

    pub fn push_char(&mut self, c: char, now: Instant) {
        let mut text = std::mem::take(&mut self.query);
        text.push(c);
        self.input(text, now);
    }

    pub fn pop_char(&mut self, now: Instant) {
        let mut text = std::mem::take(&mut self.query);
        text.pop();
        self.input(text, now);
    }

    /// Fire the scheduled search once its deadline has passed
    pub fn poll(&mut self, now: Instant) -> Option<SearchRequest> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(SearchRequest::for_query(&self.query))
            }
            _ => None,
        }
    }

    /// Enter: search right away and remember the query
    pub fn submit<S: KeyValueStore>(
        &mut self,
        storage: &mut Storage<S>,
    ) -> Result<SearchRequest, StoreError> {
        self.deadline = None;
        let request = SearchRequest::for_query(&self.query);
        if let SearchRequest::Apply(query) = &request {
            storage.record_search(query)?;
        }
        Ok(request)
    }

    /// Escape: forget the query and drop the filter
    pub fn escape(&mut self) -> SearchRequest {
        self.query.clear();
        self.deadline = None;
        SearchRequest::Clear
    }

    /// Reflect a request into the tree; returns the number of visible records
    pub fn apply<S: KeyValueStore>(
        &self,
        request: &SearchRequest,
        tree: &mut TreeView,
        storage: &Storage<S>,
    ) -> usize {
        match request {
            SearchRequest::Apply(query) => {
                let results = tree.apply_filter(storage, query);
                tracing::debug!(query = %query, results, "Search applied");
                self.events.emit(AppEvent::SearchPerformed {
                    query: query.clone(),
                    results,
                });
                results
            }
            SearchRequest::Clear => {
                tree.clear_filter();
                storage.records().len()
            }
        }
    }
}
