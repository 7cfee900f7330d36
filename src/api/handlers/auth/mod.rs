//! OTP login, admin sessions, and presence.

pub mod login;
pub mod presence;
pub mod principal;
pub mod rate_limit;
pub mod session;
pub mod state;
pub mod types;
pub mod verify;

mod storage;
mod utils;

pub(crate) use utils::{
    is_foreign_key_violation, is_unique_violation, normalize_email, valid_email,
};
