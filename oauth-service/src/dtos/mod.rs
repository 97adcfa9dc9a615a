pub mod account;
pub mod oauth;

pub use account::{LoginRequest, LoginResponse, PageParams, RegisterRequest};
pub use oauth::{
    AuthorizeRequest, AuthorizeResponse, DeviceAuthorizationRequest,
    DeviceAuthorizationResponse, TokenRequest, TokenResponse,
};
