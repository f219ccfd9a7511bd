//! Profile store — tracked-field completion state and extracted values.
//!
//! Two parallel structures back a session's profile: a `CompletionMap`
//! recording which fields are still being solicited (with an importance
//! weight each), and `ProfileValues` holding whatever has actually been
//! extracted. The map is the *active schema* and is replaced wholesale when
//! a goal template is selected; values are never deleted during a session.

use std::collections::HashMap;

use serde_json::Value;

use crate::templates::Template;

/// Completion state of one tracked field.
///
/// `importance` is fixed at registration time; `collected` only ever moves
/// false→true while the field is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionEntry {
    pub collected: bool,
    pub importance: u8,
}

/// Readiness verdict over a completion map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readiness {
    /// Weighted completion met the threshold and no critical field is open.
    pub ready: bool,
    /// Some maximum-importance field is still uncollected.
    pub needs_critical: bool,
    /// Importance-weighted fraction of collected fields, in [0, 1].
    pub ratio: f64,
}

/// Ordered mapping of tracked field → completion entry.
///
/// Registration order is preserved and observable: the interviewer breaks
/// importance ties by asking for the earlier-registered field first.
#[derive(Debug, Clone, Default)]
pub struct CompletionMap {
    entries: Vec<(String, CompletionEntry)>,
}

impl CompletionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The goal-discovery schema every session starts with.
    pub fn goal_discovery() -> Self {
        let mut map = Self::new();
        map.register("goal", 5);
        map.register("age", 2);
        map.register("salary", 3);
        map.register("savings", 4);
        map.register("location", 5);
        map
    }

    /// Track a new field. Re-registering an existing field is a no-op, so
    /// importance cannot change while a field is tracked.
    pub fn register(&mut self, field: &str, importance: u8) {
        if self.get(field).is_none() {
            self.entries.push((
                field.to_string(),
                CompletionEntry {
                    collected: false,
                    importance,
                },
            ));
        }
    }

    pub fn get(&self, field: &str) -> Option<&CompletionEntry> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, entry)| entry)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Mark a tracked field collected. Returns false for unknown fields.
    /// Monotonic: there is no way to un-collect a field.
    pub fn mark_collected(&mut self, field: &str) -> bool {
        match self.entries.iter_mut().find(|(name, _)| name == field) {
            Some((_, entry)) => {
                entry.collected = true;
                true
            }
            None => false,
        }
    }

    /// Tracked fields in registration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &CompletionEntry)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all_collected(&self) -> bool {
        self.entries.iter().all(|(_, entry)| entry.collected)
    }

    /// Uncollected fields, sorted by importance descending. The sort is
    /// stable, so equally-important fields come out in registration order.
    pub fn missing_by_importance(&self) -> Vec<(&str, u8)> {
        let mut missing: Vec<(&str, u8)> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.collected)
            .map(|(name, entry)| (name.as_str(), entry.importance))
            .collect();
        missing.sort_by(|a, b| b.1.cmp(&a.1));
        missing
    }

    /// Evaluate readiness against a weighted-completion threshold.
    ///
    /// An empty map reads as ratio 0 with no critical need, and is never
    /// ready regardless of threshold.
    pub fn readiness(&self, threshold: f64, max_importance: u8) -> Readiness {
        let mut total = 0u32;
        let mut collected = 0u32;
        let mut needs_critical = false;
        for (_, entry) in &self.entries {
            total += u32::from(entry.importance);
            if entry.collected {
                collected += u32::from(entry.importance);
            } else if entry.importance >= max_importance {
                needs_critical = true;
            }
        }
        let ratio = if total == 0 {
            0.0
        } else {
            f64::from(collected) / f64::from(total)
        };
        Readiness {
            ready: !self.is_empty() && !needs_critical && ratio >= threshold,
            needs_critical,
            ratio,
        }
    }

    /// Replace the tracked field set with a template's fields.
    ///
    /// Fields outside the new template stop being tracked. Fields whose
    /// value was already extracted under the old schema start out collected
    /// instead of being reset, reconciled against `values`.
    pub fn switch_template(&mut self, template: &Template, values: &ProfileValues) {
        self.entries = template
            .fields()
            .map(|(name, importance)| {
                (
                    name.to_string(),
                    CompletionEntry {
                        collected: values.contains(name),
                        importance,
                    },
                )
            })
            .collect();
    }
}

/// Extracted field values. Insert/overwrite only — last write wins, which is
/// what lets a user correct an earlier answer.
#[derive(Debug, Clone, Default)]
pub struct ProfileValues {
    values: HashMap<String, Value>,
}

impl ProfileValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: &str, value: Value) {
        self.values.insert(field.to_string(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Render a field's value as plain text (strings unquoted).
    pub fn as_text(&self, field: &str) -> Option<String> {
        self.values.get(field).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// One-line `field: value` rendering for prompt construction.
    pub fn render_block(&self) -> String {
        let mut lines: Vec<String> = self
            .values
            .iter()
            .map(|(field, value)| match value {
                Value::String(s) => format!("- {}: {}", field, s),
                other => format!("- {}: {}", field, other),
            })
            .collect();
        lines.sort();
        if lines.is_empty() {
            "(nothing collected yet)".to_string()
        } else {
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::TemplateRegistry;

    fn map_with(entries: &[(&str, u8, bool)]) -> CompletionMap {
        let mut map = CompletionMap::new();
        for (name, importance, collected) in entries {
            map.register(name, *importance);
            if *collected {
                map.mark_collected(name);
            }
        }
        map
    }

    #[test]
    fn empty_map_ratio_is_zero_without_critical_need() {
        let readiness = CompletionMap::new().readiness(1.0, 5);
        assert_eq!(readiness.ratio, 0.0);
        assert!(!readiness.needs_critical);
        assert!(!readiness.ready);
    }

    #[test]
    fn empty_map_never_ready_even_at_zero_threshold() {
        assert!(!CompletionMap::new().readiness(0.0, 5).ready);
    }

    #[test]
    fn ratio_is_importance_weighted() {
        let map = map_with(&[("a", 4, true), ("b", 4, false), ("c", 2, true)]);
        let readiness = map.readiness(1.0, 5);
        assert!((readiness.ratio - 0.6).abs() < 1e-9);
        assert!(readiness.ratio >= 0.0 && readiness.ratio <= 1.0);
    }

    #[test]
    fn uncollected_critical_field_blocks_readiness() {
        // ratio passes a lenient threshold, but the importance-5 hole vetoes
        let map = map_with(&[("a", 5, false), ("b", 4, true), ("c", 4, true)]);
        let readiness = map.readiness(0.5, 5);
        assert!(readiness.needs_critical);
        assert!(!readiness.ready);
    }

    #[test]
    fn full_collection_is_ready() {
        let map = map_with(&[("a", 5, true), ("b", 2, true)]);
        let readiness = map.readiness(1.0, 5);
        assert_eq!(readiness.ratio, 1.0);
        assert!(readiness.ready);
    }

    #[test]
    fn partial_threshold_ready_without_critical_holes() {
        let map = map_with(&[("a", 5, true), ("b", 3, true), ("c", 2, false)]);
        let readiness = map.readiness(0.5, 5);
        assert!(!readiness.needs_critical);
        assert!(readiness.ready);
    }

    #[test]
    fn mark_collected_rejects_unknown_fields() {
        let mut map = map_with(&[("a", 3, false)]);
        assert!(!map.mark_collected("nope"));
        assert!(map.mark_collected("a"));
        assert!(map.get("a").unwrap().collected);
    }

    #[test]
    fn register_is_idempotent_and_importance_is_fixed() {
        let mut map = CompletionMap::new();
        map.register("a", 3);
        map.register("a", 5);
        assert_eq!(map.get("a").unwrap().importance, 3);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn missing_sorted_by_importance_with_registration_tie_break() {
        let map = map_with(&[
            ("low", 2, false),
            ("first_critical", 5, false),
            ("mid", 4, true),
            ("second_critical", 5, false),
        ]);
        let missing = map.missing_by_importance();
        assert_eq!(
            missing,
            vec![("first_critical", 5), ("second_critical", 5), ("low", 2)]
        );
    }

    #[test]
    fn goal_discovery_schema() {
        let map = CompletionMap::goal_discovery();
        let fields: Vec<(&str, u8)> = map
            .fields()
            .map(|(name, entry)| (name, entry.importance))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("goal", 5),
                ("age", 2),
                ("salary", 3),
                ("savings", 4),
                ("location", 5)
            ]
        );
    }

    #[test]
    fn switch_template_replaces_tracked_set_exactly() {
        let registry = TemplateRegistry::builtin();
        let mut map = CompletionMap::goal_discovery();
        map.mark_collected("goal");
        map.switch_template(registry.get("spend").unwrap(), &ProfileValues::new());

        assert_eq!(map.len(), 5);
        assert!(!map.contains("goal"));
        assert!(map.contains("retirement_age"));
        assert!(map.missing_by_importance().len() == 5);
    }

    #[test]
    fn switch_template_reconciles_already_collected_values() {
        let registry = TemplateRegistry::builtin();
        let mut map = CompletionMap::goal_discovery();
        let mut values = ProfileValues::new();

        // retirement_age answered before the template switch under another key
        // set, plus a shared key that must carry over
        values.insert("goal", Value::String("spend it all".into()));
        values.insert("retirement_age", Value::from(62));
        map.mark_collected("goal");

        map.switch_template(registry.get("spend").unwrap(), &values);
        assert!(map.get("retirement_age").unwrap().collected);
        assert!(!map.get("desired_monthly_spending").unwrap().collected);
    }

    #[test]
    fn profile_values_overwrite_wins() {
        let mut values = ProfileValues::new();
        values.insert("age", Value::from(40));
        values.insert("age", Value::from(41));
        assert_eq!(values.get("age"), Some(&Value::from(41)));
        assert_eq!(values.as_text("age").as_deref(), Some("41"));
    }

    #[test]
    fn as_text_unquotes_strings() {
        let mut values = ProfileValues::new();
        values.insert("goal", Value::String("travel".into()));
        assert_eq!(values.as_text("goal").as_deref(), Some("travel"));
    }
}
