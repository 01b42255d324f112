pub mod candidate;
pub mod criteria;
pub mod session;

pub use candidate::{CandidateItem, MediaKind, SequencedItem};
pub use criteria::{FilterCriteria, FilterCriteriaRequest};
pub use session::{
    AdvanceOutcome, CursorAdvance, ParticipantDecision, SessionMetadata, SessionStatus,
};
