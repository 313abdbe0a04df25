pub mod message;
pub mod participant;
pub mod study_room;

pub use message::{Message, NewMessage};
pub use participant::{NewParticipant, Participant};
pub use study_room::{NewStudyRoom, StudyRoom};
