//! Identity and session handling for the gateway.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod cookie;
mod resolver;
mod login;
mod request_context;

pub use principal::{Principal, Attrs};
pub use session::{Session, SessionManager, SESSIONS_COLLECTION};
pub use cookie::{SessionCookie, parse_cookie, set_session_cookie, clear_session_cookie, DEFAULT_COOKIE_NAME};
pub use resolver::{SessionOutcome, SessionResolver};
pub use login::{login_local, LoginRequest, LoginResponse, User, USERS_COLLECTION};
pub use request_context::{Access, RequestContext};
