mod dashboard;
mod filter;
mod id;
mod poll;
mod status;
mod tally;
mod vote;

pub use dashboard::Dashboard;
pub use filter::{BrowseStats, PollFilter};
pub use id::{Id, VoterId};
pub use poll::{
    CreatePollSettings, NewPoll, NewPollOption, Poll, PollOption, TimeRemaining,
    UnvalidatedCreatePollSettings,
};
pub use status::PollStatus;
pub use tally::{OptionTally, PollTally};
pub use vote::{NewVote, Vote, VoteReceipt};
