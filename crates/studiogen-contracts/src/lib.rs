pub mod chat;
pub mod events;
pub mod product;
pub mod prompts;
pub mod runs;
pub mod tasks;
