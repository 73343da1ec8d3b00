//! Passwords, bearer tokens and login.
//!
//! # Tokens
//!
//! HS256 JWTs signed with `JWT_SECRET`, carrying `sub` (user id), `email`,
//! `role`, `iat` and `exp`. The role in the token is informational; the
//! middleware re-reads the user on every request.
//!
//! # Passwords
//!
//! bcrypt at the default cost. Hashing and verification run on the blocking
//! pool so they never stall the async workers.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use crate::{
    db::DbPool,
    error::AppError,
    models::user::{Claims, LoginResponse, User, UserResponse, UserStatus},
};

/// Hash a password with bcrypt.
pub async fn hash_password(password: &str) -> Result<String, AppError> {
    let password = password.to_owned();
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| anyhow::anyhow!("password hashing task failed: {}", e))?
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hashed)
}

/// Check `password` against a stored bcrypt hash.
///
/// A malformed hash counts as a mismatch.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .map_err(|e| anyhow::anyhow!("password verification task failed: {}", e))?;
    Ok(valid)
}

/// Generate a random initial password (12 bytes, 24 hex characters).
pub fn generate_initial_password() -> String {
    let bytes: [u8; 12] = rand::random();
    hex::encode(bytes)
}

/// Sign a token for `user` valid for `expiry_hours`.
pub fn issue_token(
    user: &User,
    secret: &str,
    expiry_hours: i64,
) -> Result<(String, DateTime<Utc>), AppError> {
    let now = Utc::now();
    let expires_at = Duration::try_hours(expiry_hours)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| anyhow::anyhow!("token expiry of {} hours is out of range", expiry_hours))?;

    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role,
        iat: now.timestamp() as usize,
        exp: expires_at.timestamp() as usize,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| anyhow::anyhow!("failed to sign token: {}", e))?;

    Ok((token, expires_at))
}

/// Verify signature and expiry of a bearer token.
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        AppError::Unauthorized
    })
}

pub async fn find_user_by_email(pool: &DbPool, email: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email.trim())
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Authenticate by email and password and issue a token.
///
/// # Errors
///
/// - `Unauthorized`: unknown email, wrong password, or a user that is not active
pub async fn login(
    pool: &DbPool,
    email: &str,
    password: &str,
    secret: &str,
    expiry_hours: i64,
) -> Result<LoginResponse, AppError> {
    let user = find_user_by_email(pool, email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !verify_password(password, &user.password_hash).await? {
        return Err(AppError::Unauthorized);
    }
    if user.status != UserStatus::Active {
        return Err(AppError::Unauthorized);
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET last_login_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(user.id)
    .fetch_one(pool)
    .await?;

    let (token, expires_at) = issue_token(&user, secret, expiry_hours)?;

    Ok(LoginResponse {
        token,
        expires_at,
        user: UserResponse::from(user),
    })
}
