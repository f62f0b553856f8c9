mod base;
pub mod codec;

pub use base::{EventBus, RunEvent, RunEventKind};
pub use codec::{read_jsonl, to_jsonl_string, write_jsonl};
