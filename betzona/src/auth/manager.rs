//! Authentication manager implementation.

use super::{
    errors::{AuthError, AuthResult},
    models::{
        AccessTokenClaims, Identity, LoginRequest, NewUser, RegisterRequest, Role, User, UserId,
        UserStatus,
    },
};
use crate::db::UserRepository;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rust_decimal::Decimal;
use std::{collections::HashSet, sync::Arc};

/// Authentication manager
#[derive(Clone)]
pub struct AuthManager {
    users: Arc<dyn UserRepository>,
    pepper: String,
    jwt_secret: String,
    access_token_duration: Duration,
    starting_balance: Decimal,
    admin_emails: HashSet<String>,
}

impl AuthManager {
    /// Create a new authentication manager
    ///
    /// # Arguments
    ///
    /// * `users` - User repository
    /// * `pepper` - Server-side pepper for password hashing
    /// * `jwt_secret` - Secret key for JWT signing
    ///
    /// # Returns
    ///
    /// * `AuthManager` - New authentication manager instance
    pub fn new(users: Arc<dyn UserRepository>, pepper: String, jwt_secret: String) -> Self {
        Self {
            users,
            pepper,
            jwt_secret,
            access_token_duration: Duration::hours(24),
            starting_balance: Decimal::ZERO,
            admin_emails: HashSet::new(),
        }
    }

    /// Balance credited to every newly registered account
    pub fn with_starting_balance(mut self, balance: Decimal) -> Self {
        self.starting_balance = balance;
        self
    }

    /// Emails that receive the admin role on registration
    pub fn with_admin_emails<I, S>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.admin_emails = emails
            .into_iter()
            .map(|e| normalize_email(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn with_token_duration(mut self, duration: Duration) -> Self {
        self.access_token_duration = duration;
        self
    }

    /// Lifetime of issued access tokens, in seconds
    pub fn token_duration_secs(&self) -> i64 {
        self.access_token_duration.num_seconds()
    }

    /// Register a new user
    ///
    /// # Errors
    ///
    /// * `AuthError::EmailTaken` - Email already exists
    /// * `AuthError::InvalidName` / `AuthError::InvalidEmail` - Format invalid
    /// * `AuthError::WeakPassword` - Password too weak
    pub async fn register(&self, request: RegisterRequest) -> AuthResult<User> {
        let name = request.name.trim().to_string();
        let email = normalize_email(&request.email);

        validate_name(&name)?;
        validate_email(&email)?;
        validate_password(&request.password)?;

        let role = if self.admin_emails.contains(&email) {
            Role::Admin
        } else {
            Role::User
        };

        let password_hash = self.hash_password(&request.password)?;

        let user = self
            .users
            .create_user(NewUser {
                name,
                email,
                password_hash,
                role,
                balance: self.starting_balance,
            })
            .await?;

        log::info!("Registered user {} ({}) as {}", user.id, user.email, user.role);
        Ok(user)
    }

    /// Login a user, returning the account and a signed access token
    ///
    /// Unknown email and wrong password produce the same error.
    pub async fn login(&self, request: LoginRequest) -> AuthResult<(User, String)> {
        let email = normalize_email(&request.email);

        let credentials = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        self.verify_password(&request.password, &credentials.password_hash)?;

        let user = credentials.user;
        if user.status != UserStatus::Active {
            log::warn!("Login refused for {} account {}", user.status, user.id);
            return Err(AuthError::AccountDisabled(user.status.to_string()));
        }

        let token = self.generate_access_token(&user)?;
        Ok((user, token))
    }

    /// Verify an access token
    ///
    /// # Arguments
    ///
    /// * `token` - JWT access token
    ///
    /// # Returns
    ///
    /// * `AuthResult<AccessTokenClaims>` - Decoded claims or error
    pub fn verify_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        let token_data = decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }

    /// Resolve a bearer token to the identity of an active account.
    ///
    /// Role and status come from the stored user, not from the token, so a
    /// block or role change takes effect before the token expires.
    pub async fn resolve_identity(&self, token: &str) -> AuthResult<Identity> {
        let claims = self.verify_access_token(token)?;

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if user.status != UserStatus::Active {
            return Err(AuthError::AccountDisabled(user.status.to_string()));
        }

        Ok(Identity {
            user_id: user.id,
            role: user.role,
            status: user.status,
        })
    }

    /// Fetch a user by id
    pub async fn get_user(&self, user_id: UserId) -> AuthResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Change an account's status (admin operation)
    pub async fn set_status(&self, user_id: UserId, status: UserStatus) -> AuthResult<User> {
        let user = self
            .users
            .update_status(user_id, status)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        log::info!("User {} status set to {}", user.id, user.status);
        Ok(user)
    }

    /// Hash password with Argon2id + pepper
    fn hash_password(&self, password: &str) -> AuthResult<String> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        Ok(argon2
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AuthError::HashingFailed)?
            .to_string())
    }

    /// Verify password against hash
    fn verify_password(&self, password: &str, hash: &str) -> AuthResult<()> {
        let peppered = format!("{}{}", password, self.pepper);
        let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;

        Argon2::default()
            .verify_password(peppered.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)
    }

    /// Generate JWT access token
    fn generate_access_token(&self, user: &User) -> AuthResult<String> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            exp: (now + self.access_token_duration).timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        Ok(token)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate display name
fn validate_name(name: &str) -> AuthResult<()> {
    let len = name.chars().count();
    if !(2..=100).contains(&len) {
        return Err(AuthError::InvalidName(
            "Name must be 2-100 characters".to_string(),
        ));
    }

    if name.chars().any(char::is_control) {
        return Err(AuthError::InvalidName(
            "Name cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate email shape (`local@domain.tld`)
fn validate_email(email: &str) -> AuthResult<()> {
    let valid = email.len() <= 254
        && !email.contains(char::is_whitespace)
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        });

    if valid {
        Ok(())
    } else {
        Err(AuthError::InvalidEmail(format!("'{email}' is not a valid address")))
    }
}

/// Validate password strength
fn validate_password(password: &str) -> AuthResult<()> {
    if password.len() < 8 {
        return Err(AuthError::WeakPassword(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    // At least one number, one uppercase, one lowercase
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());

    if !has_digit || !has_uppercase || !has_lowercase {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one number, one uppercase and one lowercase letter"
                .to_string(),
        ));
    }

    Ok(())
}
