use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::id::Id;
use super::poll::{Poll, PollOption};
use super::status::PollStatus;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionTally {
    pub option_id: Id,
    pub text: String,
    pub votes: Option<u64>,
    pub percentage: Option<u8>,
}

/// Vote counts for one poll, recomputed from the stored votes.
///
/// Counts of an anonymous poll stay hidden until the poll has ended.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollTally {
    pub poll_id: Id,
    pub status: PollStatus,
    pub evaluated_at: DateTime<Utc>,
    pub hidden: bool,
    pub total_votes: Option<u64>,
    pub options: Vec<OptionTally>,
}

impl PollTally {
    pub fn evaluate(poll: &Poll, options: &[PollOption], counts: &HashMap<Id, u64>, now: DateTime<Utc>) -> PollTally {
        let status = poll.status(now);
        let hidden = !poll.is_transparent && status != PollStatus::Ended;

        // counts for options outside this poll are ignored
        let mut options: Vec<&PollOption> = options.iter().filter(|o| o.poll_id == poll.id).collect();
        options.sort_by_key(|o| o.position);
        let total: u64 = options.iter()
            .map(|o| counts.get(&o.id).copied().unwrap_or(0))
            .sum();

        let options = options.into_iter()
            .map(|o| {
                let votes = counts.get(&o.id).copied().unwrap_or(0);
                OptionTally {
                    option_id: o.id,
                    text: o.text.clone(),
                    votes: (!hidden).then_some(votes),
                    percentage: (!hidden).then(|| percentage(votes, total)),
                }
            })
            .collect();

        PollTally {
            poll_id: poll.id,
            status,
            evaluated_at: now,
            hidden,
            total_votes: (!hidden).then_some(total),
            options,
        }
    }

    /// Options holding the most votes, more than one on a tie. Empty while hidden or without votes.
    pub fn leaders(&self) -> Vec<Id> {
        let max = match self.options.iter().filter_map(|o| o.votes).max() {
            Some(0) | None => return vec![],
            Some(max) => max,
        };
        self.options.iter()
            .filter(|o| o.votes == Some(max))
            .map(|o| o.option_id)
            .collect()
    }
}

/// Share of `votes` in `total`, rounded half up.
fn percentage(votes: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((votes * 200 + total) / (total * 2)) as u8
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use super::*;
    use crate::voting::VoterId;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 1, 12, 0, 0).unwrap()
    }

    fn generate_poll(texts: &[&str], transparent: bool) -> (Poll, Vec<PollOption>) {
        let poll = Poll {
            id: Id::new(),
            title: String::from("Test Poll"),
            description: String::from("Test"),
            creator: VoterId::parse("0xcreator").unwrap(),
            start_date: now() - Duration::hours(1),
            end_date: now() + Duration::hours(1),
            is_public: true,
            is_transparent: transparent,
            category: String::from("Governance"),
            created_at: now() - Duration::hours(2),
            stored_status: PollStatus::Upcoming,
        };
        let options = texts.iter()
            .enumerate()
            .map(|(i, text)| PollOption {
                id: Id::new(),
                poll_id: poll.id,
                position: i as u32,
                text: String::from(*text),
            })
            .rev()
            .collect();
        (poll, options)
    }

    #[test]
    fn empty_poll() {
        let (poll, options) = generate_poll(&["Yes", "No"], true);
        let tally = PollTally::evaluate(&poll, &options, &HashMap::new(), now());
        assert_eq!(tally.total_votes, Some(0));
        assert_eq!(tally.options.iter().map(|o| o.percentage).collect::<Vec<_>>(), vec![Some(0), Some(0)]);
        assert!(tally.leaders().is_empty());
    }

    #[test]
    fn counts_in_option_order() {
        let (poll, options) = generate_poll(&["Yes", "No", "Need more information"], true);
        let counts = HashMap::from([(options[2].id, 847), (options[1].id, 280), (options[0].id, 120)]);
        let tally = PollTally::evaluate(&poll, &options, &counts, now());

        assert_eq!(tally.total_votes, Some(1247));
        let texts: Vec<&str> = tally.options.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["Yes", "No", "Need more information"]);
        let percentages: Vec<Option<u8>> = tally.options.iter().map(|o| o.percentage).collect();
        assert_eq!(percentages, vec![Some(68), Some(22), Some(10)]);
        assert_eq!(tally.leaders(), vec![options[2].id]);
    }

    #[test]
    fn tied_leaders() {
        let (poll, options) = generate_poll(&["A", "B", "C"], true);
        let counts = HashMap::from([(options[0].id, 2), (options[1].id, 2)]);
        let tally = PollTally::evaluate(&poll, &options, &counts, now());
        assert_eq!(tally.leaders().len(), 2);
    }

    #[test]
    fn anonymous_counts_hidden_until_ended() {
        let (poll, options) = generate_poll(&["Yes", "No"], false);
        let counts = HashMap::from([(options[0].id, 3)]);

        let running = PollTally::evaluate(&poll, &options, &counts, now());
        assert!(running.hidden);
        assert_eq!(running.total_votes, None);
        assert!(running.options.iter().all(|o| o.votes.is_none()));

        let ended = PollTally::evaluate(&poll, &options, &counts, poll.end_date + Duration::seconds(1));
        assert_eq!(ended.status, PollStatus::Ended);
        assert_eq!(ended.total_votes, Some(3));
    }

    #[test]
    fn serializes_camel_case() {
        let (poll, options) = generate_poll(&["Yes", "No"], true);
        let counts = HashMap::from([(options[0].id, 1)]);
        let json = serde_json::to_value(PollTally::evaluate(&poll, &options, &counts, now())).unwrap();
        assert_eq!(json["pollId"], serde_json::json!(poll.id));
        assert_eq!(json["totalVotes"], 1);
        assert_eq!(json["options"][0]["optionId"], serde_json::json!(options[0].id));
        assert!(json.get("total_votes").is_none());
    }
}
