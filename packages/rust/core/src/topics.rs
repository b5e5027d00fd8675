//! Topic bucketing for the triage queue.
//!
//! Each configured topic is a set of case-insensitive title patterns. The
//! queue is shown unclassified items first (they are the ones that need a
//! human to look at them), then each topic's items in configured order,
//! alphabetized within the topic so related headlines end up adjacent.

use regex::{Regex, RegexBuilder};

use newswatch_shared::{NewswatchError, Result, Titled, TopicDefinition};

#[derive(Debug, Clone)]
struct Topic {
    name: String,
    pattern: Regex,
}

/// Compiled topic definitions, in priority order.
#[derive(Debug, Clone, Default)]
pub struct TopicSet {
    topics: Vec<Topic>,
}

impl TopicSet {
    pub fn compile(definitions: &[TopicDefinition]) -> Result<Self> {
        let topics = definitions
            .iter()
            .filter(|def| !def.keywords.is_empty())
            .map(|def| {
                let alternation = def
                    .keywords
                    .iter()
                    .map(|k| format!("(?:{k})"))
                    .collect::<Vec<_>>()
                    .join("|");
                let pattern = RegexBuilder::new(&alternation)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        NewswatchError::parse(format!("bad keyword in topic '{}': {e}", def.name))
                    })?;
                Ok(Topic {
                    name: def.name.clone(),
                    pattern,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { topics })
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// First topic (in priority order) whose patterns match `title`.
    pub fn topic_of(&self, title: &str) -> Option<&str> {
        self.topics
            .iter()
            .find(|t| t.pattern.is_match(title))
            .map(|t| t.name.as_str())
    }

    /// Reorder `items` for display. The result is a permutation of the input:
    /// unclassified items in their original order, then each topic's matches
    /// sorted by title.
    pub fn reorder<T: Titled>(&self, items: Vec<T>) -> Vec<T> {
        let mut remaining = items;
        let mut classified = Vec::with_capacity(remaining.len());

        for topic in &self.topics {
            let (mut matched, rest): (Vec<T>, Vec<T>) = remaining
                .into_iter()
                .partition(|item| topic.pattern.is_match(item.title()));
            matched.sort_by(|a, b| a.title().cmp(b.title()));
            classified.extend(matched);
            remaining = rest;
        }

        remaining.extend(classified);
        remaining
    }
}
