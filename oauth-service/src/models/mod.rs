pub mod activity;
pub mod authorization_code;
pub mod client_application;
pub mod device_code;
pub mod grant;
pub mod refresh_token;
pub mod session;
pub mod user;

pub use activity::{
    AccountPayload, Activity, ActivityKind, ApplicationPayload, RoleChangePayload,
    SessionPayload, TokenIssuedPayload,
};
pub use authorization_code::{AuthorizationCode, CodeChallengeMethod, PkceChallenge};
pub use client_application::{ClientApplication, ClientApplicationResponse};
pub use device_code::{DeviceAuthorization, DeviceCodeStatus};
pub use grant::GrantType;
pub use refresh_token::RefreshToken;
pub use session::{Session, SessionResponse, SessionStatus};
pub use user::{User, UserResponse};
