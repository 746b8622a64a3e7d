mod cookie;
mod manager;
mod token;

pub use cookie::SessionCodec;
pub use manager::{Credentials, SessionTokenManager};
pub use token::{AuthUser, REFRESH_ERROR, SessionToken, SessionView, now_ms};
