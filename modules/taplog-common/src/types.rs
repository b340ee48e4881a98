use serde::{Deserialize, Serialize};

/// Per-attribute resolution state for a venue column.
///
/// Every data column of a [`VenueRecord`] is independently in one of three
/// states. A reconciliation step may only move a field out of `Unresolved`;
/// `Resolved` and `Unavailable` are terminal for the automatic enrichment
/// path (the premium backfill pass is the one sanctioned exception, see
/// [`FieldState::refill`]).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldState<T> {
    /// Never attempted, or a prior attempt failed transiently. Eligible for
    /// retry on the next run.
    Unresolved,
    /// Concrete value obtained.
    Resolved(T),
    /// The authoritative source was reachable and explicitly had no data.
    /// Never retried automatically.
    Unavailable,
}

impl<T> FieldState<T> {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, FieldState::Unresolved)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, FieldState::Resolved(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, FieldState::Unavailable)
    }

    pub fn as_resolved(&self) -> Option<&T> {
        match self {
            FieldState::Resolved(v) => Some(v),
            _ => None,
        }
    }

    /// Apply the outcome of a reconciliation attempt. Only an `Unresolved`
    /// field changes; `Resolved` and `Unavailable` are never downgraded or
    /// overwritten. Returns true if the field changed.
    pub fn fill(&mut self, outcome: FieldState<T>) -> bool {
        if self.is_unresolved() && !outcome.is_unresolved() {
            *self = outcome;
            true
        } else {
            false
        }
    }

    /// Premium-backfill variant of [`fill`](Self::fill): also re-attempts
    /// `Unavailable` fields. `Resolved` values still never change.
    pub fn refill(&mut self, outcome: FieldState<T>) -> bool {
        if !self.is_resolved() && !outcome.is_unresolved() {
            *self = outcome;
            true
        } else {
            false
        }
    }
}

impl<T> Default for FieldState<T> {
    fn default() -> Self {
        FieldState::Unresolved
    }
}

/// Whether a venue's country matched the home country ("United States").
///
/// Two upstream call shapes report this differently: the search path always
/// has a country and yields `UnitedStates`/`Foreign`; the fetch-by-id path
/// may be missing the country field entirely, which is the distinct
/// `Unknown` outcome. Kept as four explicit variants rather than a bool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountryMatch {
    #[default]
    Unresolved,
    UnitedStates,
    Foreign,
    /// The source answered, but its own country field was absent.
    Unknown,
}

impl CountryMatch {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, CountryMatch::Unresolved)
    }

    /// Same monotonic contract as [`FieldState::fill`].
    pub fn fill(&mut self, outcome: CountryMatch) -> bool {
        if self.is_unresolved() && !outcome.is_unresolved() {
            *self = outcome;
            true
        } else {
            false
        }
    }

    /// Premium-backfill variant: `Unknown` may be re-attempted, a settled
    /// `UnitedStates`/`Foreign` answer never changes.
    pub fn refill(&mut self, outcome: CountryMatch) -> bool {
        if !matches!(self, CountryMatch::UnitedStates | CountryMatch::Foreign)
            && !outcome.is_unresolved()
        {
            *self = outcome;
            true
        } else {
            false
        }
    }
}

/// One row of the venue registry, keyed by venue name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VenueRecord {
    pub name: String,
    pub untappd_url: FieldState<String>,
    pub foursquare_url: FieldState<String>,
    pub address: FieldState<String>,
    pub latitude: FieldState<f64>,
    pub longitude: FieldState<f64>,
    /// Comma-joined category names. An empty upstream category list resolves
    /// to the literal value `Uncategorized` — categorization ran and found
    /// none, which is an answer, not an absence.
    pub categories: FieldState<String>,
    pub country: CountryMatch,
}

impl VenueRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// True when the scrape-derived source still needs to be consulted.
    pub fn needs_scrape(&self) -> bool {
        self.untappd_url.is_unresolved()
    }

    /// True when any lookup-API column is still unresolved.
    pub fn needs_lookup(&self) -> bool {
        self.address.is_unresolved()
            || self.latitude.is_unresolved()
            || self.longitude.is_unresolved()
            || self.categories.is_unresolved()
            || self.country.is_unresolved()
    }

    pub fn fully_settled(&self) -> bool {
        !self.needs_scrape() && !self.needs_lookup()
    }

    /// Structural invariant: a record cannot hold resolved location data
    /// while both source URLs are still unresolved — resolved attributes can
    /// only ever have come from one of the two sources.
    pub fn is_consistent(&self) -> bool {
        let any_data_resolved = self.address.is_resolved()
            || self.latitude.is_resolved()
            || self.longitude.is_resolved()
            || self.categories.is_resolved()
            || matches!(
                self.country,
                CountryMatch::UnitedStates | CountryMatch::Foreign | CountryMatch::Unknown
            );
        if any_data_resolved {
            !(self.untappd_url.is_unresolved() && self.foursquare_url.is_unresolved())
        } else {
            true
        }
    }
}

/// A venue name plus the checkin permalink it was first seen on. The
/// permalink is the entry point for the scrape-derived source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueSeed {
    pub name: String,
    pub checkin_url: String,
}

/// A parsed checkin post. Created once from the raw feed payload, appended
/// to the aggregate log, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub global_id: u64,
    pub actor: String,
    pub brewery: String,
    pub beverage: String,
    /// Empty when the post did not mention a venue. Valid state.
    pub venue: String,
    pub comment: String,
    pub rating: Option<f64>,
    pub published: String,
    pub permalink: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_only_moves_out_of_unresolved() {
        let mut f: FieldState<String> = FieldState::Unresolved;
        assert!(f.fill(FieldState::Resolved("a".into())));
        assert_eq!(f, FieldState::Resolved("a".into()));

        // Resolved never changes
        assert!(!f.fill(FieldState::Resolved("b".into())));
        assert!(!f.fill(FieldState::Unavailable));
        assert_eq!(f, FieldState::Resolved("a".into()));

        let mut g: FieldState<String> = FieldState::Unavailable;
        assert!(!g.fill(FieldState::Resolved("c".into())));
        assert_eq!(g, FieldState::Unavailable);
    }

    #[test]
    fn fill_with_unresolved_outcome_is_a_noop() {
        let mut f: FieldState<f64> = FieldState::Unresolved;
        assert!(!f.fill(FieldState::Unresolved));
        assert!(f.is_unresolved());
    }

    #[test]
    fn refill_reattempts_unavailable_but_not_resolved() {
        let mut f: FieldState<String> = FieldState::Unavailable;
        assert!(f.refill(FieldState::Resolved("addr".into())));
        assert_eq!(f, FieldState::Resolved("addr".into()));
        assert!(!f.refill(FieldState::Unavailable));
        assert_eq!(f, FieldState::Resolved("addr".into()));
    }

    #[test]
    fn country_match_unknown_can_be_refilled() {
        let mut c = CountryMatch::Unknown;
        assert!(c.refill(CountryMatch::Foreign));
        assert_eq!(c, CountryMatch::Foreign);
        assert!(!c.refill(CountryMatch::UnitedStates));
    }

    #[test]
    fn consistency_requires_a_source_url() {
        let mut rec = VenueRecord::new("Taproom");
        assert!(rec.is_consistent());

        rec.address = FieldState::Resolved("123 Main St".into());
        assert!(!rec.is_consistent());

        rec.untappd_url = FieldState::Resolved("https://untappd.com/v/1".into());
        assert!(rec.is_consistent());
    }

    #[test]
    fn settled_record_needs_nothing() {
        let rec = VenueRecord {
            name: "Taproom".into(),
            untappd_url: FieldState::Resolved("u".into()),
            foursquare_url: FieldState::Unavailable,
            address: FieldState::Unavailable,
            latitude: FieldState::Resolved(32.7),
            longitude: FieldState::Resolved(-117.1),
            categories: FieldState::Unavailable,
            country: CountryMatch::Unknown,
        };
        assert!(!rec.needs_scrape());
        assert!(!rec.needs_lookup());
        assert!(rec.fully_settled());
    }
}
