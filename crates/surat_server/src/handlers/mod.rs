pub mod health;
pub mod letter_types;
pub mod submissions;
