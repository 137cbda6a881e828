mod attempt;
mod ids;
mod progress;
mod resume;
mod stats;
mod user;

pub use ids::{CardId, IdError, MAX_CATALOG_ID_LEN, TopicId, UserId};

pub use attempt::{AttemptEvent, NewAttempt};
pub use progress::{CardProgress, ProgressDelta, ProgressMap};
pub use resume::TopicResume;
pub use stats::{AdminUserSummary, AttemptTotals, TopicStats};
pub use user::{ChildProfile, Identity, IdentityError, ProfileError, User};
