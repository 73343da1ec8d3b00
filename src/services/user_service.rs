//! Dashboard user management.

use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        pagination::{Page, Pagination},
        user::{CreateUserRequest, Role, UpdateUserRequest, User, UserListQuery, UserResponse, UserStatus},
    },
    services::{auth_service, revenue_query::escape_like},
};

const DUPLICATE_EMAIL: &str = "A user with this email already exists";

pub async fn get_user(pool: &DbPool, id: Uuid) -> Result<User, AppError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User"))
}

/// List users with optional role, status and name/email search.
pub async fn list_users(pool: &DbPool, query: &UserListQuery) -> Result<Page<UserResponse>, AppError> {
    let pagination = Pagination::new(query.page, query.per_page);

    let push_filters = |builder: &mut QueryBuilder<'static, Postgres>| {
        builder.push(" WHERE 1 = 1");
        if let Some(role) = query.role {
            builder.push(" AND role = ").push_bind(role);
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(search));
            builder
                .push(" AND (full_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR email ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    };

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users");
    push_filters(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut select = QueryBuilder::new("SELECT * FROM users");
    push_filters(&mut select);
    select
        .push(" ORDER BY full_name, email LIMIT ")
        .push_bind(pagination.limit())
        .push(" OFFSET ")
        .push_bind(pagination.offset());
    let users = select.build_query_as::<User>().fetch_all(pool).await?;

    Ok(Page::new(
        users.into_iter().map(UserResponse::from).collect(),
        pagination,
        total,
    ))
}

/// Create a user.
///
/// When the request carries no password a random one is generated and
/// returned in `initial_password`. It is not retrievable afterwards.
///
/// # Errors
///
/// - `Conflict`: the email is already registered
pub async fn create_user(pool: &DbPool, request: CreateUserRequest) -> Result<UserResponse, AppError> {
    let (password, generated) = match request.password {
        Some(password) => (password, false),
        None => (auth_service::generate_initial_password(), true),
    };
    let password_hash = auth_service::hash_password(&password).await?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, full_name, password_hash, role)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(request.email.trim().to_lowercase())
    .bind(request.full_name.trim())
    .bind(&password_hash)
    .bind(request.role)
    .fetch_one(pool)
    .await
    .map_err(|e| AppError::on_unique_violation(e, DUPLICATE_EMAIL))?;

    let response = UserResponse::from(user);
    Ok(if generated {
        response.with_initial_password(password)
    } else {
        response
    })
}

/// Reject changes that would lock an admin out of their own account.
pub fn check_self_update(
    actor_id: Uuid,
    target_id: Uuid,
    request: &UpdateUserRequest,
) -> Result<(), AppError> {
    if actor_id != target_id {
        return Ok(());
    }
    if request.role.is_some_and(|role| role != Role::Admin) {
        return Err(AppError::InvalidRequest(
            "You cannot change your own role".to_string(),
        ));
    }
    if request.status.is_some_and(|status| status != UserStatus::Active) {
        return Err(AppError::InvalidRequest(
            "You cannot deactivate your own account".to_string(),
        ));
    }
    Ok(())
}

/// Partially update a user. Absent fields keep their values.
pub async fn update_user(
    pool: &DbPool,
    actor_id: Uuid,
    id: Uuid,
    request: UpdateUserRequest,
) -> Result<UserResponse, AppError> {
    check_self_update(actor_id, id, &request)?;

    let password_hash = match request.password.as_deref() {
        Some(password) => Some(auth_service::hash_password(password).await?),
        None => None,
    };

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET full_name = COALESCE($1, full_name),
            role = COALESCE($2, role),
            status = COALESCE($3, status),
            password_hash = COALESCE($4, password_hash),
            updated_at = NOW()
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(request.full_name.as_deref().map(str::trim))
    .bind(request.role)
    .bind(request.status)
    .bind(password_hash)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("User"))?;

    Ok(UserResponse::from(user))
}

pub async fn delete_user(pool: &DbPool, actor_id: Uuid, id: Uuid) -> Result<(), AppError> {
    if actor_id == id {
        return Err(AppError::InvalidRequest(
            "You cannot delete your own account".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User"));
    }
    Ok(())
}
