//! Port implementations: live backends plus cassette recording and replay.

pub mod live;
pub mod recording;
pub mod replaying;
