//! Object key layout. Posts live under `<brewery>/<brewery>-<id>`; the
//! metadata files are flat names at the bucket root.

use chrono::NaiveDate;

pub const VENUE_LOCATIONS: &str = "venue_locations.csv";
pub const VENUE_LIST: &str = "venue_list.csv";
pub const AGGREGATE_DATA: &str = "untappd_aggregate_data.csv";
pub const LAST_PARSED: &str = "last_parsed.json";
pub const LAST_UPDATE: &str = "last_update.json";

/// The non-post files covered by the daily backup rotation.
pub const METADATA_FILES: [&str; 5] = [
    LAST_PARSED,
    LAST_UPDATE,
    AGGREGATE_DATA,
    VENUE_LIST,
    VENUE_LOCATIONS,
];

pub fn post_key(brewery: &str, id: u64) -> String {
    format!("{brewery}/{brewery}-{id}")
}

pub fn post_prefix(brewery: &str) -> String {
    format!("{brewery}/{brewery}-")
}

/// Numeric post id from a post object key, e.g. `68/68-756802330`.
pub fn post_id_from_key(key: &str) -> Option<u64> {
    key.rsplit('-').next()?.parse().ok()
}

pub fn backup_key(date: NaiveDate, file: &str) -> String {
    format!("Backups/{}/{file}", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_key_round_trip() {
        let key = post_key("68", 756802330);
        assert_eq!(key, "68/68-756802330");
        assert_eq!(post_id_from_key(&key), Some(756802330));
    }

    #[test]
    fn malformed_key_yields_none() {
        assert_eq!(post_id_from_key("68/68-abc"), None);
        assert_eq!(post_id_from_key("venue_list.csv"), None);
    }
}
