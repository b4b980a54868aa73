//! Topic rules
//!
//! A [`RuleTable`] is built once from the `[[topics]]` entries and never
//! changes afterwards.

use crate::conf::TopicConfig;
use std::collections::HashMap;
use thiserror::Error;

/// Every subscription uses QoS 0 (at most once)
pub const SUBSCRIPTION_QOS: u8 = 0;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RuleError {
    #[error("topic `{0}` is defined more than once")]
    DuplicateTopic(String),
    #[error("rule #{index} has an empty `{field}`")]
    EmptyField { index: usize, field: &'static str },
}

/// What to do when `payload` arrives on `topic`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub topic: String,
    pub payload: String,
    pub command: Option<String>,
    pub notification: Option<String>,
}

impl Rule {
    /// A rule with neither action is legal, it just does nothing
    pub fn has_actions(&self) -> bool {
        self.command.is_some() || self.notification.is_some()
    }
}

impl From<TopicConfig> for Rule {
    fn from(config: TopicConfig) -> Self {
        Self {
            topic: config.topic,
            payload: config.payload,
            command: config.command,
            notification: config.osd,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub qos: u8,
}

/// Rules keyed by topic, in configuration order
#[derive(Debug, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
    index: HashMap<String, usize>,
    subscriptions: Vec<Subscription>,
}

impl RuleTable {
    /// Build the table, rejecting duplicate and empty topics
    ///
    /// An empty payload is a valid match target.
    pub fn build<I>(definitions: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = TopicConfig>,
    {
        let mut table = Self::default();

        for (index, definition) in definitions.into_iter().enumerate() {
            if definition.topic.is_empty() {
                return Err(RuleError::EmptyField {
                    index,
                    field: "topic",
                });
            }
            if table.index.contains_key(&definition.topic) {
                return Err(RuleError::DuplicateTopic(definition.topic));
            }

            let rule = Rule::from(definition);
            if !rule.has_actions() {
                tracing::warn!(topic = %rule.topic, "rule has no command and no osd text");
            }

            table.index.insert(rule.topic.clone(), table.rules.len());
            table.subscriptions.push(Subscription {
                topic: rule.topic.clone(),
                qos: SUBSCRIPTION_QOS,
            });
            table.rules.push(rule);
        }

        Ok(table)
    }

    pub fn lookup(&self, topic: &str) -> Option<&Rule> {
        self.index.get(topic).map(|&i| &self.rules[i])
    }

    /// Topics to subscribe to, in configuration order
    pub fn subscription_topics(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(topic: &str, payload: &str) -> TopicConfig {
        TopicConfig {
            topic: topic.to_string(),
            payload: payload.to_string(),
            command: Some("true".to_string()),
            osd: None,
        }
    }

    #[test]
    fn test_lookup_exact_match() {
        let table = RuleTable::build([def("/motion/office", "away"), def("/alert", "fire")]).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("/alert").unwrap().payload, "fire");
        assert!(table.lookup("/alert/").is_none());
        assert!(table.lookup("/ALERT").is_none());
        assert!(table.lookup("/motion/#").is_none());
    }

    #[test]
    fn test_subscriptions_keep_config_order() {
        let table = RuleTable::build([def("/b", "1"), def("/a", "2"), def("/c", "3")]).unwrap();

        let topics: Vec<_> = table
            .subscription_topics()
            .iter()
            .map(|s| s.topic.as_str())
            .collect();
        assert_eq!(topics, ["/b", "/a", "/c"]);
        assert!(table.subscription_topics().iter().all(|s| s.qos == 0));
    }

    #[test]
    fn test_duplicate_topic_rejected() {
        let err = RuleTable::build([def("/a", "1"), def("/a", "2")]).unwrap_err();
        assert_eq!(err, RuleError::DuplicateTopic("/a".to_string()));
    }

    #[test]
    fn test_empty_fields_rejected() {
        assert_eq!(
            RuleTable::build([def("/a", "1"), def("", "2")]).unwrap_err(),
            RuleError::EmptyField {
                index: 1,
                field: "topic"
            }
        );
    }

    #[test]
    fn test_empty_payload_is_a_valid_match() {
        let table = RuleTable::build([def("/t", "")]).unwrap();
        let rule = table.lookup("/t").unwrap();
        assert_eq!(rule.payload, "");
    }

    #[test]
    fn test_rule_without_actions_is_legal() {
        let table = RuleTable::build([TopicConfig {
            topic: "/noop".to_string(),
            payload: "x".to_string(),
            command: None,
            osd: None,
        }])
        .unwrap();

        assert!(!table.lookup("/noop").unwrap().has_actions());
    }

    #[test]
    fn test_empty_table() {
        let table = RuleTable::build(Vec::new()).unwrap();
        assert!(table.is_empty());
        assert!(table.subscription_topics().is_empty());
    }
}
