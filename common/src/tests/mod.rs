mod error_location;
mod secret_key;
