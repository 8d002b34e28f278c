mod client;
mod embedded;
mod error;
mod helpers;
