use std::ops::RangeInclusive;

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Deserialize};

use super::id::{Id, VoterId};
use super::status::PollStatus;
use crate::error::{self, ValidationError};

pub const TITLE_LENGTH: RangeInclusive<usize> = 1..=300;
pub const OPTION_COUNT: RangeInclusive<usize> = 2..=10;
pub const OPTION_LENGTH: RangeInclusive<usize> = 1..=300;
pub const CATEGORY_LENGTH: RangeInclusive<usize> = 1..=50;
pub const DEFAULT_CATEGORY: &str = "General";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub creator: VoterId,

    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_public: bool,
    pub is_transparent: bool,
    pub category: String,

    pub created_at: DateTime<Utc>,
    /// Status as written at creation time. Only a hint for queries, see [`Poll::status`].
    pub stored_status: PollStatus,
}

impl Poll {
    pub fn status(&self, now: DateTime<Utc>) -> PollStatus {
        PollStatus::derive(now, self.start_date, self.end_date)
    }

    /// Time left until the poll closes, or `None` once it has ended.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<TimeRemaining> {
        let left = self.end_date - now;
        if left < Duration::zero() {
            return None;
        }
        Some(TimeRemaining {
            days: left.num_days(),
            hours: left.num_hours() % 24,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRemaining {
    pub days: i64,
    pub hours: i64,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    pub id: Id,
    pub poll_id: Id,
    pub position: u32,
    pub text: String,
}


/// Poll input as received from a client, before any checks.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UnvalidatedCreatePollSettings {
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_public: Option<bool>,
    pub is_transparent: Option<bool>,
    pub category: String,
}

/// Poll input that passed validation against the clock at `now`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreatePollSettings {
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_public: bool,
    pub is_transparent: bool,
    pub category: String,
}

impl TryFrom<(UnvalidatedCreatePollSettings, DateTime<Utc>)> for CreatePollSettings {
    type Error = ValidationError;
    fn try_from((settings, now): (UnvalidatedCreatePollSettings, DateTime<Utc>)) -> Result<Self, Self::Error> {
        let UnvalidatedCreatePollSettings {
            title,
            description,
            options,
            start_date,
            end_date,
            is_public,
            is_transparent,
            category,
        } = settings;

        let title = title.trim().to_string();
        let title_len = title.chars().count();
        if !TITLE_LENGTH.contains(&title_len) {
            return Err(error::poll_title_invalid_size(TITLE_LENGTH, title_len));
        }

        let description = description.trim().to_string();
        if description.is_empty() {
            return Err(error::poll_description_missing());
        }

        if !OPTION_COUNT.contains(&options.len()) {
            return Err(error::poll_option_limit_exceeded(OPTION_COUNT, options.len()));
        }
        let options: Vec<String> = options.iter().map(|o| o.trim().to_string()).collect();
        for (i, option) in options.iter().enumerate() {
            let len = option.chars().count();
            if !OPTION_LENGTH.contains(&len) {
                return Err(error::poll_option_invalid_size(i, OPTION_LENGTH, len));
            }
            let folded = option.to_lowercase();
            if let Some(j) = options[..i].iter().position(|o| o.to_lowercase() == folded) {
                return Err(error::poll_option_duplicate(j, i));
            }
        }

        // a missing start means "open immediately"
        let start_date = start_date.unwrap_or(now);
        let end_date = match end_date {
            Some(end) => end,
            None => return Err(error::poll_end_missing()),
        };
        if end_date < start_date {
            return Err(error::poll_window_inverted(&start_date, &end_date));
        }
        if end_date < now {
            return Err(error::poll_already_ended(&end_date, &now));
        }

        let category = match category.trim() {
            "" => String::from(DEFAULT_CATEGORY),
            c => c.to_string(),
        };
        let category_len = category.chars().count();
        if !CATEGORY_LENGTH.contains(&category_len) {
            return Err(error::poll_category_invalid_size(CATEGORY_LENGTH, category_len));
        }

        Ok(CreatePollSettings {
            title,
            description,
            options,
            start_date,
            end_date,
            is_public: is_public.unwrap_or(true),
            is_transparent: is_transparent.unwrap_or(true),
            category,
        })
    }
}

/// Poll row as handed to the store; the store assigns id and creation time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewPoll {
    pub title: String,
    pub description: String,
    pub creator: VoterId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_public: bool,
    pub is_transparent: bool,
    pub category: String,
    pub status: PollStatus,
}

impl NewPoll {
    /// Splits validated settings into the poll row and its option texts.
    pub fn from(creator: &VoterId, now: DateTime<Utc>, CreatePollSettings {
        title,
        description,
        options,
        start_date,
        end_date,
        is_public,
        is_transparent,
        category,
    }: CreatePollSettings) -> (Self, Vec<String>) {
        let poll = Self {
            title,
            description,
            creator: creator.clone(),
            start_date,
            end_date,
            is_public,
            is_transparent,
            category,
            status: PollStatus::derive(now, start_date, end_date),
        };

        (poll, options)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewPollOption {
    pub poll_id: Id,
    pub position: u32,
    pub text: String,
}

impl NewPollOption {
    pub fn batch(poll_id: Id, options: Vec<String>) -> Vec<NewPollOption> {
        options.into_iter()
            .enumerate()
            .map(|(i, text)| NewPollOption { poll_id, position: i as u32, text })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 15, 10, 0, 0).unwrap()
    }

    fn settings() -> UnvalidatedCreatePollSettings {
        UnvalidatedCreatePollSettings {
            title: String::from("  Should we implement gasless voting? "),
            description: String::from("Treasury covers gas"),
            options: vec![String::from("Yes"), String::from("No")],
            start_date: Some(now() + Duration::hours(1)),
            end_date: Some(now() + Duration::hours(2)),
            is_public: None,
            is_transparent: Some(false),
            category: String::new(),
        }
    }

    fn validate(s: UnvalidatedCreatePollSettings) -> Result<CreatePollSettings, ValidationError> {
        CreatePollSettings::try_from((s, now()))
    }

    #[test]
    fn accepts_and_normalizes() {
        let valid = validate(settings()).unwrap();
        assert_eq!(valid.title, "Should we implement gasless voting?");
        assert_eq!(valid.category, DEFAULT_CATEGORY);
        assert!(valid.is_public);
        assert!(!valid.is_transparent);
    }

    #[test]
    fn missing_start_opens_now() {
        let valid = validate(UnvalidatedCreatePollSettings { start_date: None, ..settings() }).unwrap();
        assert_eq!(valid.start_date, now());
    }

    #[test]
    fn rejects_option_counts() {
        let one = UnvalidatedCreatePollSettings { options: vec![String::from("Yes")], ..settings() };
        assert!(validate(one).is_err());
        let eleven = UnvalidatedCreatePollSettings {
            options: (0..11).map(|i| format!("Option {i}")).collect(),
            ..settings()
        };
        assert!(validate(eleven).is_err());
    }

    #[test]
    fn rejects_blank_and_duplicate_options() {
        let blank = UnvalidatedCreatePollSettings {
            options: vec![String::from("Yes"), String::from("  ")],
            ..settings()
        };
        assert!(validate(blank).is_err());
        let dup = UnvalidatedCreatePollSettings {
            options: vec![String::from("Yes"), String::from("yes ")],
            ..settings()
        };
        assert_eq!(validate(dup), Err(error::poll_option_duplicate(0, 1)));
    }

    #[test]
    fn rejects_bad_windows() {
        let inverted = UnvalidatedCreatePollSettings {
            start_date: Some(now() + Duration::hours(3)),
            ..settings()
        };
        assert!(validate(inverted).is_err());
        let past = UnvalidatedCreatePollSettings {
            start_date: Some(now() - Duration::hours(3)),
            end_date: Some(now() - Duration::hours(2)),
            ..settings()
        };
        assert!(validate(past).is_err());
        let open_ended = UnvalidatedCreatePollSettings { end_date: None, ..settings() };
        assert_eq!(validate(open_ended), Err(error::poll_end_missing()));
    }

    #[test]
    fn rejects_missing_text() {
        assert!(validate(UnvalidatedCreatePollSettings { title: String::from(" "), ..settings() }).is_err());
        assert_eq!(
            validate(UnvalidatedCreatePollSettings { description: String::new(), ..settings() }),
            Err(error::poll_description_missing()),
        );
    }

    #[test]
    fn new_poll_stores_status_hint() {
        let creator = VoterId::parse("0xabc").unwrap();
        let (poll, options) = NewPoll::from(&creator, now(), validate(settings()).unwrap());
        assert_eq!(poll.status, PollStatus::Upcoming);
        assert_eq!(options, vec![String::from("Yes"), String::from("No")]);

        let rows = NewPollOption::batch(Id::nil(), options);
        assert_eq!(rows[1].position, 1);
        assert_eq!(rows[1].text, "No");
    }

    #[test]
    fn time_remaining_counts_down() {
        let poll = Poll {
            id: Id::new(),
            title: String::from("t"),
            description: String::from("d"),
            creator: VoterId::parse("0xabc").unwrap(),
            start_date: now(),
            end_date: now() + Duration::days(2) + Duration::hours(5),
            is_public: true,
            is_transparent: true,
            category: String::from(DEFAULT_CATEGORY),
            created_at: now(),
            stored_status: PollStatus::Active,
        };
        assert_eq!(poll.time_remaining(now()), Some(TimeRemaining { days: 2, hours: 5 }));
        assert_eq!(poll.time_remaining(poll.end_date + Duration::seconds(1)), None);
    }
}
