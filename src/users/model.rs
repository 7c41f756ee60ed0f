use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{dto::SignupRequest, password::HashedPassword},
    error::AppError,
};

pub(crate) const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, never exposed in JSON
    pub role: Role,
    pub company_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Signup input that passed every schema rule, password still in plaintext.
#[derive(Clone)]
pub struct ValidSignup {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub company_name: Option<String>,
}

impl std::fmt::Debug for ValidSignup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidSignup")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("password", &"****")
            .field("company_name", &self.company_name)
            .finish()
    }
}

/// A user ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub password: HashedPassword,
    pub role: Role,
    pub company_name: Option<String>,
}

impl NewUser {
    /// Hashes the password; the confirmation is dropped here and never stored.
    pub fn new(input: ValidSignup) -> Result<Self, AppError> {
        Ok(Self {
            password: HashedPassword::hash(&input.password)?,
            full_name: input.full_name,
            email: input.email,
            role: Role::User,
            company_name: input.company_name,
        })
    }
}

/// Fields a user may change on their own profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub company_name: Option<String>,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Runs every schema rule and reports all failures at once.
pub fn validate_signup(req: &SignupRequest) -> Result<ValidSignup, AppError> {
    let mut errors = Vec::new();

    let full_name = trimmed(req.full_name.as_deref());
    if full_name.is_none() {
        errors.push("full name is required".to_string());
    }

    let email = trimmed(req.email.as_deref()).map(|e| normalize_email(&e));
    match email.as_deref() {
        None => errors.push("email is required".into()),
        Some(e) if !is_valid_email(e) => errors.push("please provide a valid email".into()),
        Some(_) => {}
    }

    let password = req.password.as_deref().filter(|p| !p.is_empty());
    match password {
        None => errors.push("password is required".into()),
        Some(p) if p.chars().count() < MIN_PASSWORD_LEN => {
            errors.push("password must be at least 8 characters long".into())
        }
        Some(_) => {}
    }

    match req.confirm_password.as_deref().filter(|p| !p.is_empty()) {
        None => errors.push("please provide a password confirmation".into()),
        Some(confirm) if Some(confirm) != password => {
            errors.push("Passwords are not the same!".into())
        }
        Some(_) => {}
    }

    match (full_name, email, password) {
        (Some(full_name), Some(email), Some(password)) if errors.is_empty() => Ok(ValidSignup {
            full_name,
            email,
            password: password.to_string(),
            company_name: trimmed(req.company_name.as_deref()),
        }),
        _ => Err(AppError::validation(errors)),
    }
}

impl ProfileUpdate {
    pub fn validate(full_name: Option<&str>, company_name: Option<&str>) -> Result<Self, AppError> {
        let update = Self {
            full_name: trimmed(full_name),
            company_name: trimmed(company_name),
        };
        if full_name.is_some() && update.full_name.is_none() {
            return Err(AppError::validation(vec!["full name is required".into()]));
        }
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn request(password: &str, confirm: &str) -> SignupRequest {
        SignupRequest {
            full_name: Some("  Jane Doe ".into()),
            email: Some(" Jane@Example.COM ".into()),
            password: Some(password.into()),
            confirm_password: Some(confirm.into()),
            company_name: Some("  ".into()),
        }
    }

    fn messages(err: AppError) -> Vec<String> {
        match err.kind() {
            ErrorKind::Validation(m) => m.clone(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_signup_is_normalized() {
        let ok = validate_signup(&request("password123", "password123")).unwrap();
        assert_eq!(ok.full_name, "Jane Doe");
        assert_eq!(ok.email, "jane@example.com");
        assert_eq!(ok.company_name, None);
    }

    #[test]
    fn debug_output_hides_plaintext_password() {
        let ok = validate_signup(&request("password123", "password123")).unwrap();
        let shown = format!("{ok:?}");
        assert!(shown.contains("jane@example.com"));
        assert!(shown.contains("****"));
        assert!(!shown.contains("password123"));
    }

    #[test]
    fn mismatched_confirmation_is_rejected() {
        let err = validate_signup(&request("password123", "password124")).unwrap_err();
        assert_eq!(messages(err), vec!["Passwords are not the same!"]);
    }

    #[test]
    fn all_failures_are_aggregated() {
        let req = SignupRequest {
            full_name: None,
            email: Some("not-an-email".into()),
            password: Some("short".into()),
            confirm_password: None,
            company_name: None,
        };
        let err = validate_signup(&req).unwrap_err();
        assert_eq!(
            err.message(),
            "Invalid input data. full name is required. please provide a valid email. \
             password must be at least 8 characters long. please provide a password confirmation"
        );
    }

    #[test]
    fn missing_fields_are_required() {
        let err = validate_signup(&SignupRequest::default()).unwrap_err();
        assert_eq!(
            messages(err),
            vec![
                "full name is required",
                "email is required",
                "password is required",
                "please provide a password confirmation",
            ]
        );
    }

    #[test]
    fn new_user_never_holds_plaintext() {
        let valid = validate_signup(&request("password123", "password123")).unwrap();
        let user = NewUser::new(valid).unwrap();
        assert_ne!(user.password.as_str(), "password123");
        assert_eq!(user.role, Role::User);
    }

    #[test]
    fn public_json_hides_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            full_name: "Jane".into(),
            email: "jane@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            role: Role::Admin,
            company_name: Some("Acme".into()),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(!json.to_string().contains("argon2"));
        assert_eq!(json["role"], "admin");
        assert_eq!(json["fullName"], "Jane");
        assert_eq!(json["companyName"], "Acme");
    }

    #[test]
    fn profile_update_rejects_blank_name() {
        assert!(ProfileUpdate::validate(Some("   "), None).is_err());
        let update = ProfileUpdate::validate(None, Some(" Acme ")).unwrap();
        assert_eq!(update.company_name.as_deref(), Some("Acme"));
        assert!(update.full_name.is_none());
    }

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("a@b.io"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.io"));
    }
}
