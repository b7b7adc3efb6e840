pub mod wire;

pub use wire::{Command, ExfiltratedEvent, Message, MessageOut};
