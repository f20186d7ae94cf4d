/*!
 * Chapter entities and the chapter status state machine.
 */

pub mod model;
pub mod status;

pub use model::{Chapter, ChapterLogEntry, ChapterUpdate, LogLevel};
pub use status::{ChapterStatus, IllegalTransition};
