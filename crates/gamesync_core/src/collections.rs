use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

/// A manually curated collection a library game can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Finished,
    Playing,
    UpNext,
}

pub type Membership = BTreeSet<Collection>;

/// Catalog identifiers the user has sorted into each curated collection.
///
/// The storefront does not expose these collections, so they are maintained by
/// hand in the config file. Identifiers may be written as strings or integers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CuratedLists {
    #[serde(default, deserialize_with = "app_id_list")]
    pub finished: Vec<String>,
    #[serde(default, deserialize_with = "app_id_list")]
    pub playing: Vec<String>,
    #[serde(default, deserialize_with = "app_id_list")]
    pub up_next: Vec<String>,
}

impl CuratedLists {
    pub fn is_empty(&self) -> bool {
        self.finished.is_empty() && self.playing.is_empty() && self.up_next.is_empty()
    }

    pub fn len(&self) -> usize {
        self.finished.len() + self.playing.len() + self.up_next.len()
    }
}

/// Collections `external_id` belongs to. A game may sit in several at once.
pub fn classify(external_id: &str, lists: &CuratedLists) -> Membership {
    let mut membership = Membership::new();
    let pairs = [
        (Collection::Finished, &lists.finished),
        (Collection::Playing, &lists.playing),
        (Collection::UpNext, &lists.up_next),
    ];
    for (collection, ids) in pairs {
        if ids.iter().any(|id| id == external_id) {
            membership.insert(collection);
        }
    }
    membership
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AppIdValue {
    Text(String),
    Number(u64),
}

fn app_id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<AppIdValue>::deserialize(deserializer)?;
    Ok(values
        .into_iter()
        .map(|value| match value {
            AppIdValue::Text(text) => text.trim().to_string(),
            AppIdValue::Number(number) => number.to_string(),
        })
        .filter(|id| !id.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lists() -> CuratedLists {
        CuratedLists {
            finished: vec!["367520".to_string(), "1145360".to_string()],
            playing: vec!["1145360".to_string()],
            up_next: vec!["504230".to_string()],
        }
    }

    #[test]
    fn unlisted_game_has_no_membership() {
        assert!(classify("620", &lists()).is_empty());
    }

    #[test]
    fn game_can_sit_in_several_collections() {
        let membership = classify("1145360", &lists());
        assert_eq!(
            membership.into_iter().collect::<Vec<_>>(),
            vec![Collection::Finished, Collection::Playing]
        );
    }

    #[test]
    fn match_is_exact() {
        assert!(classify("36752", &lists()).is_empty());
        assert!(classify("367520 ", &lists()).is_empty());
        assert_eq!(
            classify("504230", &lists()).into_iter().collect::<Vec<_>>(),
            vec![Collection::UpNext]
        );
    }

    #[test]
    fn lists_accept_numbers_and_strings() {
        let parsed: CuratedLists =
            toml::from_str("finished = [367520, \"1145360\"]\nup_next = [\" 504230 \"]\n")
                .expect("parse lists");
        assert_eq!(parsed.finished, vec!["367520", "1145360"]);
        assert!(parsed.playing.is_empty());
        assert_eq!(parsed.up_next, vec!["504230"]);
        assert_eq!(parsed.len(), 3);
    }
}
