use std::borrow::Cow;

use log::{debug, error};
use regex::{Regex, RegexBuilder};

use crate::mappings::Mapping;

struct Rule {
    compiled: Result<Regex, regex::Error>,
    replacement: String,
}

/// Applies a [`Mapping`] to text, one rule after another, ignoring case.
///
/// Patterns are compiled once. A pattern that fails to compile does not stop
/// the run: every line it would touch is reported and passed through untouched.
pub struct Substituter {
    rules: Vec<Rule>,
}

impl Substituter {
    pub fn new(mapping: &Mapping) -> Self {
        let rules = mapping
            .entries()
            .iter()
            .map(|entry| {
                let compiled = RegexBuilder::new(&entry.pattern)
                    .case_insensitive(true)
                    .build();
                if let Err(err) = &compiled {
                    debug!("pattern '{}' does not compile: {err}", entry.pattern);
                }
                Rule {
                    compiled,
                    replacement: entry.replacement.clone(),
                }
            })
            .collect();
        Self { rules }
    }

    /// Returns the substituted text, or `text` itself when any rule is unusable.
    /// Partial results are never returned.
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        match self.try_apply(text) {
            Ok(replaced) => replaced,
            Err(err) => {
                error!("Error replacing location names: {err}");
                Cow::Borrowed(text)
            }
        }
    }

    /// Substitutes a line read from a file. The `\r\n` or `\n` terminator is
    /// kept out of the text the patterns see, so `$` anchors at the end of the
    /// line's content, and is handed back unchanged.
    pub fn apply_line<'t>(&self, line: &'t str) -> (Cow<'t, str>, &'t str) {
        let (body, terminator) = split_terminator(line);
        (self.apply(body), terminator)
    }

    fn try_apply<'t>(&self, text: &'t str) -> Result<Cow<'t, str>, &regex::Error> {
        let mut current = Cow::Borrowed(text);
        for rule in &self.rules {
            let regex = rule.compiled.as_ref()?;
            let replaced = match regex.replace_all(&current, rule.replacement.as_str()) {
                Cow::Owned(updated) => Some(updated),
                Cow::Borrowed(_) => None,
            };
            if let Some(updated) = replaced {
                current = Cow::Owned(updated);
            }
        }
        Ok(current)
    }
}

fn split_terminator(line: &str) -> (&str, &str) {
    let cut = if line.ends_with("\r\n") {
        line.len() - 2
    } else if line.ends_with('\n') {
        line.len() - 1
    } else {
        line.len()
    };
    line.split_at(cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Substituter {
        Substituter::new(&Mapping::default_locations())
    }

    #[test]
    fn lines_without_location_terms_are_untouched() {
        let line = "Nothing to see here, just a quiet meadow.\n";
        let out = defaults().apply(line);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out, line);
    }

    #[test]
    fn street_suffixes_become_road_in_any_case() {
        let sub = defaults();
        assert_eq!(sub.apply("1 Elm Street"), "1 Elm Road");
        assert_eq!(sub.apply("1 elm STREET"), "1 elm Road");
        assert_eq!(sub.apply("4 Oak ave and 9 Pine Blvd"), "4 Oak Road and 9 Pine Road");
        assert_eq!(sub.apply("Route rd."), "Route Road.");
    }

    #[test]
    fn city_and_town_become_region() {
        let sub = defaults();
        assert_eq!(sub.apply("Springfield City"), "Springfield Region");
        assert_eq!(sub.apply("old town square"), "old Region square");
    }

    #[test]
    fn word_boundaries_protect_longer_words() {
        let sub = defaults();
        assert_eq!(sub.apply("Streetlight near the Township"), "Streetlight near the Township");
        assert_eq!(sub.apply("Cityscape"), "Cityscape");
    }

    #[test]
    fn transformed_text_is_a_fixed_point() {
        let sub = defaults();
        let once = sub.apply("123 Main Street, Springfield City").into_owned();
        assert_eq!(once, "123 Main Road, Springfield Region");
        assert_eq!(sub.apply(&once), once);
    }

    #[test]
    fn earlier_rules_feed_later_ones() {
        let mapping: Mapping = [("cat", "dog"), ("dog", "wolf")].into_iter().collect();
        let sub = Substituter::new(&mapping);
        assert_eq!(sub.apply("Cat and dog"), "wolf and wolf");
    }

    #[test]
    fn capture_groups_expand_in_replacements() {
        let mapping: Mapping = [(r"\b(\d+)(st|nd|rd|th) Street\b", "Road ${1}")]
            .into_iter()
            .collect();
        let sub = Substituter::new(&mapping);
        assert_eq!(sub.apply("West 42nd Street"), "West Road 42");
    }

    #[test]
    fn end_anchor_matches_before_the_newline() {
        let mapping: Mapping = [(r"\bStreet$", "Road")].into_iter().collect();
        let sub = Substituter::new(&mapping);
        let (body, terminator) = sub.apply_line("Main Street\n");
        assert_eq!(body, "Main Road");
        assert_eq!(terminator, "\n");
    }

    #[test]
    fn crlf_terminator_is_kept_apart_from_the_text() {
        let mapping: Mapping = [(r"\bStreet$", "Road")].into_iter().collect();
        let sub = Substituter::new(&mapping);
        let (body, terminator) = sub.apply_line("Main Street\r\n");
        assert_eq!(body, "Main Road");
        assert_eq!(terminator, "\r\n");

        let (body, terminator) = sub.apply_line("Elm Street");
        assert_eq!(body, "Elm Road");
        assert_eq!(terminator, "");
    }

    #[test]
    fn dollar_in_replacement_refers_to_groups() {
        let mapping: Mapping = [(r"\bToll Road\b", "$5 Road"), (r"\bFerry\b", "$$5 Crossing")]
            .into_iter()
            .collect();
        let sub = Substituter::new(&mapping);
        assert_eq!(sub.apply("Old Toll Road"), "Old  Road");
        assert_eq!(sub.apply("Ferry"), "$5 Crossing");
        assert_eq!(
            Substituter::new(&[(r"\b(Street)\b", r"\1")].into_iter().collect()).apply("Main Street"),
            r"Main \1"
        );
    }

    #[test]
    fn broken_pattern_returns_the_original_line() {
        let mapping: Mapping = [(r"\bStreet\b", "Road"), (r"(unclosed", "x")]
            .into_iter()
            .collect();
        let sub = Substituter::new(&mapping);
        let out = sub.apply("Main Street\n");
        assert_eq!(out, "Main Street\n");
    }

    #[test]
    fn empty_mapping_is_identity() {
        let sub = Substituter::new(&Mapping::default());
        assert_eq!(sub.apply("Main Street"), "Main Street");
    }
}
