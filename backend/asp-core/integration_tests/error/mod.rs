mod engine;
mod launch;
