pub mod crypto;
pub mod ics;
pub mod time;
pub mod token;
pub mod validation;
