use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::collections::{Collection, Membership};

/// Lifecycle status of a game record. Labels match the workspace's status
/// property options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    Unreleased,
    Unowned,
    #[serde(rename = "Up Next")]
    UpNext,
    Playing,
    Finished,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Unreleased,
        Status::Unowned,
        Status::UpNext,
        Status::Playing,
        Status::Finished,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unreleased => "Unreleased",
            Self::Unowned => "Unowned",
            Self::UpNext => "Up Next",
            Self::Playing => "Playing",
            Self::Finished => "Finished",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().replace([' ', '_', '-'], "").to_ascii_lowercase();
        Status::ALL
            .into_iter()
            .find(|status| status.as_str().replace(' ', "").to_ascii_lowercase() == normalized)
            .ok_or_else(|| format!("unknown status: {value}"))
    }
}

/// Compute the single status a record should carry.
///
/// Manual curation always wins (Finished, then Playing, then Up Next). Without
/// it, a release date at or before `now` means the game is out but not being
/// played; a missing or future date means it is still unreleased. Ownership
/// does not change the outcome: unowned games simply never carry membership.
pub fn resolve_status(
    release_date: Option<DateTime<Utc>>,
    _is_owned: bool,
    membership: &Membership,
    now: DateTime<Utc>,
) -> Status {
    if membership.contains(&Collection::Finished) {
        Status::Finished
    } else if membership.contains(&Collection::Playing) {
        Status::Playing
    } else if membership.contains(&Collection::UpNext) {
        Status::UpNext
    } else if release_date.is_some_and(|date| date <= now) {
        Status::Unowned
    } else {
        Status::Unreleased
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn membership(items: &[Collection]) -> Membership {
        items.iter().copied().collect()
    }

    #[test]
    fn finished_outranks_everything() {
        let dates = [None, Some(now() - Duration::days(400)), Some(now() + Duration::days(30))];
        let sets = [
            membership(&[Collection::Finished]),
            membership(&[Collection::Finished, Collection::Playing]),
            membership(&[Collection::Finished, Collection::Playing, Collection::UpNext]),
        ];
        for date in dates {
            for set in &sets {
                for owned in [true, false] {
                    assert_eq!(resolve_status(date, owned, set, now()), Status::Finished);
                }
            }
        }
    }

    #[test]
    fn playing_outranks_up_next() {
        let set = membership(&[Collection::UpNext, Collection::Playing]);
        assert_eq!(resolve_status(None, true, &set, now()), Status::Playing);
        let set = membership(&[Collection::UpNext]);
        assert_eq!(
            resolve_status(Some(now() + Duration::days(1)), true, &set, now()),
            Status::UpNext
        );
    }

    #[test]
    fn future_release_is_unreleased() {
        let empty = Membership::new();
        for days in [1, 30, 3650] {
            let date = Some(now() + Duration::days(days));
            assert_eq!(resolve_status(date, false, &empty, now()), Status::Unreleased);
        }
        assert_eq!(
            resolve_status(Some(now() + Duration::seconds(1)), true, &empty, now()),
            Status::Unreleased
        );
    }

    #[test]
    fn elapsed_release_is_unowned() {
        let empty = Membership::new();
        assert_eq!(resolve_status(Some(now()), false, &empty, now()), Status::Unowned);
        for days in [1, 365, 9000] {
            let date = Some(now() - Duration::days(days));
            assert_eq!(resolve_status(date, false, &empty, now()), Status::Unowned);
            assert_eq!(resolve_status(date, true, &empty, now()), Status::Unowned);
        }
    }

    #[test]
    fn missing_date_defaults_to_unreleased() {
        assert_eq!(resolve_status(None, false, &Membership::new(), now()), Status::Unreleased);
    }

    #[test]
    fn labels_round_trip() {
        for status in Status::ALL {
            assert_eq!(status.as_str().parse::<Status>(), Ok(status));
        }
        assert_eq!("up_next".parse::<Status>(), Ok(Status::UpNext));
        assert_eq!("upnext".parse::<Status>(), Ok(Status::UpNext));
        assert!("Completed".parse::<Status>().is_err());
    }
}
