mod cancellation;
mod client;
mod engine;
mod launcher;
mod proto;
