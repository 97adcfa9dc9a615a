pub mod accounts;
pub mod activity;
pub mod clients;
pub mod email;
pub mod engine;
pub mod error;
pub mod jwt;

pub use accounts::{AccountService, Principal};
pub use activity::ActivityLog;
pub use clients::{ClientRegistry, CreatedApplication};
pub use email::{EmailMessage, EmailPublisher, MockEmailPublisher, NoopEmailPublisher};
pub use engine::{AuthorizationEngine, EngineSettings, Stage};
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService, TokenSigner};
