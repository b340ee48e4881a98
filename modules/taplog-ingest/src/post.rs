//! Parse a raw checkin post into a structured record.
//!
//! Titles have the fixed shape `"<actor> is drinking <beverage> at <venue>"`
//! with the `" at "` part optional. Some beverage names contain `" at "` as
//! a whole word themselves; for those the venue split must use the second
//! occurrence. That set is a named exception table, configuration data
//! rather than parsing logic.

use taplog_common::PostRecord;

use crate::feed::RawPost;

const DRINKING_DELIMITER: &str = " is drinking ";
const VENUE_DELIMITER: &str = " at ";
const RATING_SUFFIX: &str = "/5 Stars)";

/// Lowercased beverage-name fragments that themselves contain `" at "`.
/// Membership forces the venue split to the second delimiter occurrence.
#[derive(Debug, Clone)]
pub struct TitleExceptions(Vec<String>);

impl Default for TitleExceptions {
    fn default() -> Self {
        Self(vec![
            "victory at sea".to_string(),
            "murder at schrute farm...death by fire".to_string(),
        ])
    }
}

impl TitleExceptions {
    pub fn new(entries: impl IntoIterator<Item = String>) -> Self {
        Self(entries.into_iter().map(|e| e.to_lowercase()).collect())
    }

    fn applies_to(&self, title: &str) -> bool {
        let lowered = title.to_lowercase();
        self.0.iter().any(|e| lowered.contains(e))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostParser {
    exceptions: TitleExceptions,
}

impl PostParser {
    pub fn new(exceptions: TitleExceptions) -> Self {
        Self { exceptions }
    }

    /// Parsing never fails: missing pieces become empty fields or an absent
    /// rating, not errors.
    pub fn parse(&self, brewery: &str, raw: &RawPost) -> PostRecord {
        let occurrence = if self.exceptions.applies_to(&raw.title) {
            2
        } else {
            1
        };
        let (head, venue) = split_at_occurrence(&raw.title, VENUE_DELIMITER, occurrence);

        let (actor, beverage) = match head.split_once(DRINKING_DELIMITER) {
            Some((actor, beverage)) => (actor.to_string(), beverage.to_string()),
            // Not a checkin-shaped title; keep it whole as the actor so
            // nothing is silently dropped from the record.
            None => (head.to_string(), String::new()),
        };

        let (comment, rating) = split_rating(&raw.summary);

        PostRecord {
            global_id: raw.id,
            actor,
            brewery: brewery.to_string(),
            beverage,
            venue,
            comment,
            rating,
            published: raw.published.clone(),
            permalink: raw.link.clone(),
        }
    }
}

/// Split `s` at the nth occurrence (1-based) of `sep`. When fewer
/// occurrences exist, the tail is empty and the head is the whole string.
fn split_at_occurrence(s: &str, sep: &str, n: usize) -> (String, String) {
    let parts: Vec<&str> = s.split(sep).collect();
    if parts.len() <= n {
        return (s.to_string(), String::new());
    }
    (parts[..n].join(sep), parts[n..].join(sep))
}

/// Split a summary into comment and optional trailing `"(<n>/5 Stars)"`
/// rating. An unparsable numeric substring yields an absent rating; a
/// summary without the rating shape passes through unchanged.
fn split_rating(summary: &str) -> (String, Option<f64>) {
    match summary.rsplit_once('(') {
        Some((comment, tail)) if tail.ends_with(RATING_SUFFIX) => {
            let digits = &tail[..tail.len() - RATING_SUFFIX.len()];
            (comment.to_string(), digits.parse().ok())
        }
        _ => (summary.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(title: &str, summary: &str) -> RawPost {
        RawPost {
            id: 756802330,
            title: title.to_string(),
            summary: summary.to_string(),
            link: "https://untappd.com/user/alice/checkin/756802330".to_string(),
            published: "2020-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn plain_title_splits_on_first_at() {
        let parser = PostParser::default();
        let rec = parser.parse("68", &raw("bob is drinking IPA at Taproom", ""));
        assert_eq!(rec.actor, "bob");
        assert_eq!(rec.beverage, "IPA");
        assert_eq!(rec.venue, "Taproom");
    }

    #[test]
    fn exception_beverage_splits_on_second_at() {
        let parser = PostParser::default();
        let rec = parser.parse(
            "68",
            &raw("alice is drinking Victory at Sea Stout at The Brewery", ""),
        );
        assert_eq!(rec.beverage, "Victory at Sea Stout");
        assert_eq!(rec.venue, "The Brewery");
    }

    #[test]
    fn exception_title_without_venue_yields_empty_venue() {
        let parser = PostParser::default();
        let rec = parser.parse("68", &raw("alice is drinking Victory at Sea Stout", ""));
        assert_eq!(rec.beverage, "Victory at Sea Stout");
        assert_eq!(rec.venue, "");
    }

    #[test]
    fn title_without_delimiter_yields_empty_venue() {
        let parser = PostParser::default();
        let rec = parser.parse("68", &raw("carol is drinking Pilsner", ""));
        assert_eq!(rec.actor, "carol");
        assert_eq!(rec.beverage, "Pilsner");
        assert_eq!(rec.venue, "");
    }

    #[test]
    fn rating_is_parsed_from_trailing_fragment() {
        let parser = PostParser::default();
        let rec = parser.parse("68", &raw("bob is drinking IPA", "Great stuff (4.5/5 Stars)"));
        assert_eq!(rec.comment, "Great stuff ");
        assert_eq!(rec.rating, Some(4.5));
    }

    #[test]
    fn summary_without_rating_passes_through() {
        let parser = PostParser::default();
        let rec = parser.parse("68", &raw("bob is drinking IPA", "No rating here"));
        assert_eq!(rec.comment, "No rating here");
        assert_eq!(rec.rating, None);
    }

    #[test]
    fn unparsable_rating_is_absent_not_fatal() {
        let parser = PostParser::default();
        let rec = parser.parse("68", &raw("bob is drinking IPA", "Odd one (x.y/5 Stars)"));
        assert_eq!(rec.comment, "Odd one ");
        assert_eq!(rec.rating, None);
    }

    #[test]
    fn parenthetical_without_rating_shape_is_kept_in_comment() {
        let parser = PostParser::default();
        let rec = parser.parse("68", &raw("bob is drinking IPA", "nice (really)"));
        assert_eq!(rec.comment, "nice (really)");
        assert_eq!(rec.rating, None);
    }

    #[test]
    fn custom_exception_table_is_honored() {
        let parser = PostParser::new(TitleExceptions::new(["Stone At Large".to_string()]));
        let rec = parser.parse("68", &raw("dan is drinking Stone at Large at The Yard", ""));
        assert_eq!(rec.beverage, "Stone at Large");
        assert_eq!(rec.venue, "The Yard");
    }
}
