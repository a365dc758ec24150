mod anthropic;
mod client;
mod error;
mod openai;
mod retry;

pub use client::Client;
pub use error::Error;
