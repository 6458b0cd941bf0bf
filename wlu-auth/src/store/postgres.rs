use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

use wlu_shared::clients::db::DbPool;
use wlu_shared::{AppError, AppResult, ErrorCode};

use super::{CredentialStore, RefreshTokenStore};
use crate::models::{NewRefreshToken, NewUser, RefreshToken, User};
use crate::schema::{refresh_tokens, users};

pub struct PgCredentialStore {
    pool: DbPool,
}

impl PgCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn duplicate_error(constraint: Option<&str>) -> AppError {
    match constraint {
        Some(name) if name.contains("email") => {
            AppError::new(ErrorCode::EmailAlreadyExists, "Email already registered")
        }
        _ => AppError::new(ErrorCode::UsernameAlreadyExists, "Username already taken"),
    }
}

impl CredentialStore for PgCredentialStore {
    fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let mut conn = self.pool.get()?;
        let user = users::table
            .filter(users::email.eq(email))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(user)
    }

    fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let mut conn = self.pool.get()?;
        let user = users::table
            .filter(users::username.eq(username))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(user)
    }

    fn find_by_verification_token(&self, token: &str) -> AppResult<Option<User>> {
        let mut conn = self.pool.get()?;
        let user = users::table
            .filter(users::verification_token.eq(token))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(user)
    }

    fn find_by_reset_token(&self, token: &str) -> AppResult<Option<User>> {
        let mut conn = self.pool.get()?;
        let user = users::table
            .filter(users::reset_token.eq(token))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(user)
    }

    fn insert(&self, user: NewUser) -> AppResult<User> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(users::table)
            .values(&user)
            .returning(User::as_returning())
            .get_result(&mut conn)
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                    duplicate_error(info.constraint_name())
                }
                other => AppError::Database(other),
            })
    }

    fn consume_verification_token(&self, user_id: i32, token: &str) -> AppResult<bool> {
        let mut conn = self.pool.get()?;
        let updated = diesel::update(
            users::table
                .filter(users::user_id.eq(user_id))
                .filter(users::verification_token.eq(token)),
        )
        .set((
            users::email_verified.eq(true),
            users::verification_token.eq(None::<String>),
            users::verification_token_expires.eq(None::<DateTime<Utc>>),
        ))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    fn set_verification_token(&self, user_id: i32, token: &str, expires_at: DateTime<Utc>) -> AppResult<()> {
        let mut conn = self.pool.get()?;
        diesel::update(users::table.filter(users::user_id.eq(user_id)))
            .set((
                users::verification_token.eq(Some(token)),
                users::verification_token_expires.eq(Some(expires_at)),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    fn set_reset_token(&self, user_id: i32, token: &str, expires_at: DateTime<Utc>) -> AppResult<()> {
        let mut conn = self.pool.get()?;
        diesel::update(users::table.filter(users::user_id.eq(user_id)))
            .set((
                users::reset_token.eq(Some(token)),
                users::reset_token_expires.eq(Some(expires_at)),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    fn reset_password(&self, user_id: i32, token: &str, password_hash: &str) -> AppResult<bool> {
        let mut conn = self.pool.get()?;
        let updated = diesel::update(
            users::table
                .filter(users::user_id.eq(user_id))
                .filter(users::reset_token.eq(token)),
        )
        .set((
            users::password_hash.eq(password_hash),
            users::reset_token.eq(None::<String>),
            users::reset_token_expires.eq(None::<DateTime<Utc>>),
        ))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    fn ping(&self) -> AppResult<()> {
        let mut conn = self.pool.get()?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }
}

pub struct PgRefreshTokenStore {
    pool: DbPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl RefreshTokenStore for PgRefreshTokenStore {
    fn insert(&self, token: NewRefreshToken) -> AppResult<()> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(refresh_tokens::table)
            .values(&token)
            .execute(&mut conn)?;
        Ok(())
    }

    fn find_valid(&self, token: &str, now: DateTime<Utc>) -> AppResult<Option<RefreshToken>> {
        let mut conn = self.pool.get()?;
        let record = refresh_tokens::table
            .filter(refresh_tokens::token.eq(token))
            .filter(refresh_tokens::expires_at.gt(now))
            .select(RefreshToken::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(record)
    }

    fn delete(&self, token: &str) -> AppResult<usize> {
        let mut conn = self.pool.get()?;
        let deleted = diesel::delete(refresh_tokens::table.filter(refresh_tokens::token.eq(token)))
            .execute(&mut conn)?;
        Ok(deleted)
    }

    fn delete_for_user(&self, username: &str) -> AppResult<usize> {
        let mut conn = self.pool.get()?;
        let deleted = diesel::delete(refresh_tokens::table.filter(refresh_tokens::username.eq(username)))
            .execute(&mut conn)?;
        Ok(deleted)
    }

    fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let mut conn = self.pool.get()?;
        let deleted = diesel::delete(refresh_tokens::table.filter(refresh_tokens::expires_at.lt(now)))
            .execute(&mut conn)?;
        Ok(deleted)
    }
}
