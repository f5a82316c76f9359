//! Authentication module providing registration, login and the identity gate.
//!
//! This module implements:
//! - Argon2id password hashing with server-side pepper
//! - JWT access tokens (HS256, configurable lifetime)
//! - Identity resolution that rejects inactive and blocked accounts
//! - Account status administration
//!
//! ## Example
//!
//! ```no_run
//! use betzona::auth::{AuthManager, RegisterRequest};
//! use betzona::db::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let auth = AuthManager::new(
//!         store,
//!         "secret_pepper".to_string(),
//!         "jwt_secret".to_string(),
//!     );
//!
//!     let request = RegisterRequest {
//!         name: "Player One".to_string(),
//!         email: "player@example.com".to_string(),
//!         password: "SecurePass123".to_string(),
//!     };
//!
//!     let user = auth.register(request).await?;
//!     println!("Registered user: {}", user.email);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{AuthError, AuthResult};
pub use manager::AuthManager;
pub use models::{
    AccessTokenClaims, Identity, LoginRequest, NewUser, RegisterRequest, Role, User,
    UserCredentials, UserId, UserStatus,
};
