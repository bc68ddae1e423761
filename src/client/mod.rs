pub mod http;
pub mod session;

pub use http::HttpSession;
pub use session::{ApiRequest, ApiResponse, Method, Session, SessionError};
